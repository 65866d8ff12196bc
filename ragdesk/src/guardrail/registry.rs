//! Guardrail registry: the named guardrails deployed for an environment.
//!
//! Each [`GuardrailIdentity`] owns one mutable `DRAFT` and any number of
//! immutable published snapshots numbered 1, 2, 3, ... Listing order is
//! declaration order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result, ValidationError};

use super::builder::{self, ContentFilterOverride, PolicyOverride, UseDefaults};
use super::policy::GuardrailPolicy;
use super::selector::{DRAFT, TOKEN_SEPARATOR};
use super::target::{self, ApplyOutcome, GuardrailRef, GuardrailTarget};

/// A guardrail version: the draft or a published number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Version {
    /// The mutable working copy.
    Draft,
    /// An immutable published snapshot.
    Published(u32),
}

impl Version {
    /// Returns `true` for [`Version::Draft`].
    #[must_use]
    pub const fn is_draft(self) -> bool {
        matches!(self, Self::Draft)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => f.write_str(DRAFT),
            Self::Published(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for Version {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == DRAFT {
            return Ok(Self::Draft);
        }
        match s.parse::<u32>() {
            Ok(n) if n > 0 && !s.starts_with('0') => Ok(Self::Published(n)),
            _ => Err(ValidationError::new(
                "version",
                format!("'{s}' is neither {DRAFT} nor a version number"),
            )),
        }
    }
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One version of a guardrail and its policy snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyVersion {
    /// Version label.
    pub version: Version,
    /// Policy at this version.
    pub policy: GuardrailPolicy,
}

/// A deployed guardrail and its versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailIdentity {
    id: String,
    name: String,
    versions: Vec<PolicyVersion>,
}

impl GuardrailIdentity {
    /// Assemble an identity from listing data.
    ///
    /// Listings may carry no version detail at all; such identities can be
    /// displayed by id but never resolve to a policy.
    #[must_use]
    pub fn from_parts(
        id: impl Into<String>,
        name: impl Into<String>,
        versions: Vec<PolicyVersion>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            versions,
        }
    }

    /// Opaque stable identifier. Never contains the token separator.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name. May be empty for listing entries without detail.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Versions in listing order: draft first, then published ascending.
    #[must_use]
    pub fn versions(&self) -> &[PolicyVersion] {
        &self.versions
    }

    /// Look up a version by its wire spelling.
    #[must_use]
    pub fn version(&self, version: &str) -> Option<&PolicyVersion> {
        let wanted = version.parse::<Version>().ok()?;
        self.versions.iter().find(|v| v.version == wanted)
    }

    /// The draft version, if present.
    #[must_use]
    pub fn draft(&self) -> Option<&PolicyVersion> {
        self.versions.iter().find(|v| v.version.is_draft())
    }

    /// The highest published version, if any.
    #[must_use]
    pub fn latest_published(&self) -> Option<&PolicyVersion> {
        self.versions
            .iter()
            .filter(|v| !v.version.is_draft())
            .max_by_key(|v| v.version)
    }

    fn next_version(&self) -> u32 {
        match self.latest_published().map(|v| v.version) {
            Some(Version::Published(n)) => n + 1,
            _ => 1,
        }
    }
}

/// Deployment presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    /// Every default category.
    Full,
    /// Medium-strength content filters only.
    Basic,
    /// Default content filters only.
    ContentOnly,
    /// Default denied topics only. Contentless.
    TopicsOnly,
    /// Default PII handling only. Contentless.
    PiiOnly,
}

impl Preset {
    /// Every preset, in deployment order.
    pub const ALL: [Self; 5] = [
        Self::Full,
        Self::Basic,
        Self::ContentOnly,
        Self::TopicsOnly,
        Self::PiiOnly,
    ];

    /// Human label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Full => "Full",
            Self::Basic => "Basic",
            Self::ContentOnly => "Content-only",
            Self::TopicsOnly => "Topics-only",
            Self::PiiOnly => "PII-only",
        }
    }

    const fn slug(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Basic => "basic",
            Self::ContentOnly => "content-only",
            Self::TopicsOnly => "topics-only",
            Self::PiiOnly => "pii-only",
        }
    }

    const fn description(self) -> &'static str {
        match self {
            Self::Full => "Content filters, denied topics and PII handling",
            Self::Basic => "Medium-strength content filters",
            Self::ContentOnly => "Content filters",
            Self::TopicsOnly => "Denied topics",
            Self::PiiOnly => "PII handling",
        }
    }

    /// Override and default toggles for this preset in `environment`.
    #[must_use]
    pub fn override_for(self, environment: &str) -> (PolicyOverride, UseDefaults) {
        let mut policy_override = PolicyOverride {
            name: Some(format!("{environment}-{}", self.slug())),
            description: Some(self.description().to_owned()),
            ..PolicyOverride::default()
        };
        let use_defaults = match self {
            Self::Full => UseDefaults::all(),
            Self::Basic => {
                policy_override.content_filters = Some(
                    ["SEXUAL", "VIOLENCE", "HATE", "INSULTS", "MISCONDUCT"]
                        .into_iter()
                        .map(|kind| ContentFilterOverride {
                            filter_type: kind.to_owned(),
                            input_strength: Some("MEDIUM".to_owned()),
                            output_strength: Some("MEDIUM".to_owned()),
                        })
                        .collect(),
                );
                UseDefaults::none()
            }
            Self::ContentOnly => UseDefaults {
                content_filters: true,
                ..UseDefaults::none()
            },
            Self::TopicsOnly => UseDefaults {
                topics: true,
                ..UseDefaults::none()
            },
            Self::PiiOnly => UseDefaults {
                pii: true,
                ..UseDefaults::none()
            },
        };
        (policy_override, use_defaults)
    }

    /// Build the policy for this preset in `environment`.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if `environment` yields an empty name.
    pub fn build(self, environment: &str) -> std::result::Result<GuardrailPolicy, ValidationError> {
        let (policy_override, use_defaults) = self.override_for(environment);
        builder::build(&policy_override, use_defaults)
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The set of guardrails deployed for one environment.
#[derive(Debug, Clone, Default)]
pub struct GuardrailRegistry {
    identities: Vec<GuardrailIdentity>,
}

impl GuardrailRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry mirroring a listing fetched from the service.
    #[must_use]
    pub fn from_identities(identities: Vec<GuardrailIdentity>) -> Self {
        Self { identities }
    }

    /// A registry holding every [`Preset`] for `environment`.
    ///
    /// # Errors
    ///
    /// Returns an error if a preset fails to build.
    pub fn with_presets(environment: &str) -> Result<Self> {
        let mut registry = Self::new();
        registry.deploy_presets(environment)?;
        Ok(registry)
    }

    /// Identities in declaration order.
    #[must_use]
    pub fn list_identities(&self) -> &[GuardrailIdentity] {
        &self.identities
    }

    /// Look up an identity.
    #[must_use]
    pub fn identity(&self, id: &str) -> Option<&GuardrailIdentity> {
        self.identities.iter().find(|i| i.id == id)
    }

    /// Number of identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    /// Returns `true` if nothing is deployed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Deploy a guardrail under a generated id.
    ///
    /// # Errors
    ///
    /// Never fails for a generated id; the signature matches
    /// [`create_with_id`](Self::create_with_id).
    pub fn create(&mut self, policy: GuardrailPolicy) -> Result<&GuardrailIdentity> {
        let mut id = generate_id();
        while self.identity(&id).is_some() {
            id = generate_id();
        }
        self.create_with_id(id, policy)
    }

    /// Deploy a guardrail under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `id` is empty, contains the token
    /// separator, or is already taken.
    pub fn create_with_id(
        &mut self,
        id: impl Into<String>,
        policy: GuardrailPolicy,
    ) -> Result<&GuardrailIdentity> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::missing("id").into());
        }
        if id.contains(TOKEN_SEPARATOR) {
            return Err(ValidationError::new(
                "id",
                format!("must not contain '{TOKEN_SEPARATOR}'"),
            )
            .into());
        }
        if self.identity(&id).is_some() {
            return Err(ValidationError::new("id", format!("'{id}' already exists")).into());
        }

        info!(id = %id, name = %policy.name, "guardrail created");
        self.identities.push(GuardrailIdentity {
            name: policy.name.clone(),
            versions: vec![PolicyVersion {
                version: Version::Draft,
                policy,
            }],
            id,
        });
        Ok(&self.identities[self.identities.len() - 1])
    }

    /// Deploy every [`Preset`] for `environment`, returning the new ids.
    ///
    /// # Errors
    ///
    /// Returns an error if a preset fails to build.
    pub fn deploy_presets(&mut self, environment: &str) -> Result<Vec<String>> {
        Preset::ALL
            .iter()
            .map(|preset| {
                let policy = preset.build(environment)?;
                let id = format!("{environment}-{}", preset.slug());
                Ok(self.create_with_id(id, policy)?.id.clone())
            })
            .collect()
    }

    /// Policy for an identity at a version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id and
    /// [`Error::VersionNotFound`] for an unknown version.
    pub fn get_policy(&self, id: &str, version: &str) -> Result<&GuardrailPolicy> {
        let identity = self.identity(id).ok_or_else(|| Error::not_found(id))?;
        identity
            .version(version)
            .map(|v| &v.policy)
            .ok_or_else(|| Error::version_not_found(id, version))
    }

    /// Replace the draft policy of an identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id.
    pub fn update_draft(&mut self, id: &str, policy: GuardrailPolicy) -> Result<()> {
        let identity = self.identity_mut(id)?;
        identity.name.clone_from(&policy.name);
        match identity.versions.iter_mut().find(|v| v.version.is_draft()) {
            Some(draft) => draft.policy = policy,
            None => identity.versions.insert(
                0,
                PolicyVersion {
                    version: Version::Draft,
                    policy,
                },
            ),
        }
        debug!(id, "draft updated");
        Ok(())
    }

    /// Snapshot the draft into the next published version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id and
    /// [`Error::VersionNotFound`] if the identity has no draft.
    pub fn publish(&mut self, id: &str) -> Result<Version> {
        let identity = self.identity_mut(id)?;
        let policy = identity
            .draft()
            .map(|d| d.policy.clone())
            .ok_or_else(|| Error::version_not_found(id, DRAFT))?;
        let version = Version::Published(identity.next_version());
        identity.versions.push(PolicyVersion { version, policy });
        info!(id, %version, "guardrail version published");
        Ok(version)
    }

    /// Associate a guardrail version with an external target.
    ///
    /// The version must exist; the association itself is owned by `target`.
    ///
    /// # Errors
    ///
    /// Returns a lookup error for an unknown id or version and
    /// [`Error::ApplyFailed`] if the target rejects the association.
    pub async fn apply_to_target(
        &self,
        id: &str,
        version: &str,
        target: &dyn GuardrailTarget,
        target_id: &str,
    ) -> Result<ApplyOutcome> {
        self.get_policy(id, version)?;
        target::apply_to_target(target, target_id, &GuardrailRef::new(id, version)).await
    }

    fn identity_mut(&mut self, id: &str) -> Result<&mut GuardrailIdentity> {
        self.identities
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| Error::not_found(id))
    }
}

/// Generate a 12-character lowercase identity id.
fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_owned()
}
