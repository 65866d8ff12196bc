//! Guardrail selection: the token wire format and resolution against a
//! listing.
//!
//! A selection token is `identity-id` for the draft and
//! `identity-id:version` otherwise. The separator is defined once, here, so
//! it can change in one place. Identity ids never contain it; that is
//! enforced when an identity is created, not when a token is decoded.

use tracing::debug;

use crate::error::{Error, Result};

use super::policy::GuardrailPolicy;
use super::registry::{GuardrailIdentity, PolicyVersion};
use super::target::{ApplyOutcome, GuardrailRef};

/// The draft version label.
pub const DRAFT: &str = "DRAFT";

/// Separator between identity id and version in a selection token.
pub const TOKEN_SEPARATOR: char = ':';

/// Encode an (identity, version) pair. The draft version is omitted.
#[must_use]
pub fn encode_token(id: &str, version: &str) -> String {
    if version == DRAFT {
        id.to_owned()
    } else {
        format!("{id}{TOKEN_SEPARATOR}{version}")
    }
}

/// Decode a token, splitting on the first separator.
///
/// A token without a separator names the draft.
#[must_use]
pub fn decode_token(token: &str) -> GuardrailRef {
    match token.split_once(TOKEN_SEPARATOR) {
        Some((id, version)) => GuardrailRef::new(id, version),
        None => GuardrailRef::draft(token),
    }
}

/// Returns `true` only if the token decodes to exactly this pair.
///
/// No defaulting happens on the right-hand side: a draft must be spelled
/// `"DRAFT"`.
#[must_use]
pub fn is_current_selection(token: &str, current_id: &str, current_version: &str) -> bool {
    let decoded = decode_token(token);
    decoded.id == current_id && decoded.version == current_version
}

/// A token resolved against a listing.
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a> {
    /// The selected identity.
    pub identity: &'a GuardrailIdentity,
    /// The selected version.
    pub version: &'a PolicyVersion,
}

impl<'a> Resolved<'a> {
    /// The policy snapshot at the selected version.
    #[must_use]
    pub const fn policy(&self) -> &'a GuardrailPolicy {
        &self.version.policy
    }

    /// The resolved pair.
    #[must_use]
    pub fn reference(&self) -> GuardrailRef {
        GuardrailRef::new(self.identity.id(), self.version.version.to_string())
    }
}

/// Resolve a token strictly, for enforcement.
///
/// # Errors
///
/// Returns [`Error::UnknownGuardrail`] if the identity is absent and
/// [`Error::UnknownVersion`] if the identity lacks the version.
pub fn resolve<'a>(token: &str, identities: &'a [GuardrailIdentity]) -> Result<Resolved<'a>> {
    let GuardrailRef { id, version } = decode_token(token);
    let identity = identities
        .iter()
        .find(|i| i.id() == id)
        .ok_or_else(|| Error::UnknownGuardrail { id: id.clone() })?;
    let policy_version = identity
        .version(&version)
        .ok_or(Error::UnknownVersion { id, version })?;
    Ok(Resolved {
        identity,
        version: policy_version,
    })
}

/// A token resolved for display.
#[derive(Debug, Clone, Copy)]
pub enum DisplaySelection<'a> {
    /// The token resolved exactly.
    Exact(Resolved<'a>),
    /// The version was missing; the identity's first listed version is shown
    /// instead. Never use this for enforcement.
    Fallback {
        /// The identity.
        identity: &'a GuardrailIdentity,
        /// The first listed version, if the listing carried any.
        shown: Option<&'a PolicyVersion>,
    },
    /// The identity was missing; only the id can be shown.
    IdOnly,
}

impl DisplaySelection<'_> {
    /// A one-line label: the name when known, else the id.
    #[must_use]
    pub fn label(&self, token: &str) -> String {
        let reference = decode_token(token);
        match self {
            Self::Exact(resolved) => format!(
                "{} ({})",
                display_name(resolved.identity),
                resolved.version.version
            ),
            Self::Fallback {
                identity,
                shown: Some(shown),
            } => format!(
                "{} ({}, requested {})",
                display_name(identity),
                shown.version,
                reference.version
            ),
            Self::Fallback {
                identity,
                shown: None,
            } => display_name(identity).to_owned(),
            Self::IdOnly => reference.id,
        }
    }
}

fn display_name(identity: &GuardrailIdentity) -> &str {
    if identity.name().is_empty() {
        identity.id()
    } else {
        identity.name()
    }
}

/// Resolve a token leniently, for display. Never fails.
#[must_use]
pub fn resolve_for_display<'a>(
    token: &str,
    identities: &'a [GuardrailIdentity],
) -> DisplaySelection<'a> {
    match resolve(token, identities) {
        Ok(resolved) => DisplaySelection::Exact(resolved),
        Err(Error::UnknownVersion { id, version }) => {
            debug!(%id, %version, "selected version missing, showing first listed");
            identities
                .iter()
                .find(|i| i.id() == id)
                .map_or(DisplaySelection::IdOnly, |identity| {
                    DisplaySelection::Fallback {
                        identity,
                        shown: identity.versions().first(),
                    }
                })
        }
        Err(_) => DisplaySelection::IdOnly,
    }
}

/// Every selectable token in a listing, in listing order.
#[must_use]
pub fn tokens(identities: &[GuardrailIdentity]) -> Vec<String> {
    identities
        .iter()
        .flat_map(|identity| {
            identity
                .versions()
                .iter()
                .map(|v| encode_token(identity.id(), &v.version.to_string()))
        })
        .collect()
}

/// State of the front-end selection affordance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SelectionState {
    /// No guardrail chosen.
    #[default]
    Unselected,
    /// A token is chosen but not applied.
    Selected(String),
    /// An apply for the token is in flight.
    Applying(String),
    /// The token was applied.
    Applied(String),
    /// Applying the token failed.
    ApplyFailed {
        /// The token that failed.
        token: String,
        /// Why it failed.
        error: String,
    },
}

/// Result of asking for a selection transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The transition happened.
    Done,
    /// The transition would discard an active session and was not confirmed.
    NeedsConfirmation,
    /// The transition is not valid from the current state.
    Ignored,
}

impl SelectionState {
    /// The token in this state, if any.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Unselected => None,
            Self::Selected(t) | Self::Applying(t) | Self::Applied(t) => Some(t),
            Self::ApplyFailed { token, .. } => Some(token),
        }
    }

    /// Returns `true` while an apply is in flight.
    #[must_use]
    pub const fn is_applying(&self) -> bool {
        matches!(self, Self::Applying(_))
    }

    /// Choose a token. Ignored while an apply is in flight.
    pub fn select(&mut self, token: impl Into<String>) -> Transition {
        if self.is_applying() {
            return Transition::Ignored;
        }
        *self = Self::Selected(token.into());
        Transition::Done
    }

    /// Clear the selection. Ignored while an apply is in flight.
    pub fn clear(&mut self) -> Transition {
        if self.is_applying() {
            return Transition::Ignored;
        }
        *self = Self::Unselected;
        Transition::Done
    }

    /// Enter [`SelectionState::Applying`].
    ///
    /// When `session_active` is set the apply would discard the
    /// conversation, so it only proceeds with `confirmed`.
    pub fn begin_apply(&mut self, session_active: bool, confirmed: bool) -> Transition {
        let token = match self {
            Self::Selected(t) | Self::ApplyFailed { token: t, .. } => t.clone(),
            _ => return Transition::Ignored,
        };
        if session_active && !confirmed {
            return Transition::NeedsConfirmation;
        }
        *self = Self::Applying(token);
        Transition::Done
    }

    /// Leave [`SelectionState::Applying`] with the apply result.
    pub fn finish_apply(&mut self, result: &Result<ApplyOutcome>) -> Transition {
        let Self::Applying(token) = self else {
            return Transition::Ignored;
        };
        let token = std::mem::take(token);
        *self = match result {
            Ok(_) => Self::Applied(token),
            Err(e) => Self::ApplyFailed {
                token,
                error: e.to_string(),
            },
        };
        Transition::Done
    }

    /// Return an abandoned [`SelectionState::Applying`] to
    /// [`SelectionState::Selected`].
    ///
    /// Only call this when no apply can still be in flight, e.g. when the
    /// future driving it was dropped.
    pub fn abandon_apply(&mut self) -> Transition {
        let Self::Applying(token) = self else {
            return Transition::Ignored;
        };
        *self = Self::Selected(std::mem::take(token));
        Transition::Done
    }

    /// Stale-selection detection after a listing refresh.
    ///
    /// An applied token that no longer resolves drops back to
    /// [`SelectionState::Selected`]. Returns `true` if the state changed.
    pub fn refresh(&mut self, identities: &[GuardrailIdentity]) -> bool {
        let Self::Applied(token) = self else {
            return false;
        };
        if resolve(token.as_str(), identities).is_ok() {
            return false;
        }
        debug!(token = %token, "applied guardrail no longer listed");
        *self = Self::Selected(std::mem::take(token));
        true
    }
}
