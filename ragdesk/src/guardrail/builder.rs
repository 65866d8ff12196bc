//! Guardrail policy builder.
//!
//! Merges a partial [`PolicyOverride`] with catalog defaults into a complete
//! [`GuardrailPolicy`]. Each toggleable category is resolved independently:
//!
//! 1. an explicit, non-empty override list is used verbatim;
//! 2. otherwise the catalog defaults, if the matching [`UseDefaults`] flag is set;
//! 3. otherwise an empty list.
//!
//! There is no field-level merge inside a list. Override entries carry raw
//! strings so a bad enumeration value is reported as a [`ValidationError`]
//! rather than silently replaced by a default.

use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ValidationError;

use super::catalog;
use super::policy::{
    ContentFilter, DeniedTopic, FilterStrength, FilterType, GuardrailPolicy, PiiEntity,
    PiiEntityType, RegexFilter, SensitiveAction,
};

/// Which categories fall back to catalog defaults when not overridden.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct UseDefaults {
    /// Use default content filters.
    pub content_filters: bool,
    /// Use default denied topics.
    pub topics: bool,
    /// Use default PII entities.
    pub pii: bool,
}

impl UseDefaults {
    /// Defaults for every toggleable category.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            content_filters: true,
            topics: true,
            pii: true,
        }
    }

    /// No defaults at all.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            content_filters: false,
            topics: false,
            pii: false,
        }
    }
}

/// A content filter entry as written in an override document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContentFilterOverride {
    /// One of `SEXUAL|VIOLENCE|HATE|INSULTS|MISCONDUCT|PROMPT_ATTACK`.
    #[serde(rename = "type")]
    pub filter_type: String,
    /// One of `NONE|LOW|MEDIUM|HIGH`.
    pub input_strength: Option<String>,
    /// One of `NONE|LOW|MEDIUM|HIGH`.
    pub output_strength: Option<String>,
}

/// A denied topic entry as written in an override document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopicOverride {
    /// Topic name.
    pub name: Option<String>,
    /// Topic definition.
    pub definition: Option<String>,
    /// Example phrases.
    #[serde(default)]
    pub examples: Vec<String>,
}

/// A PII entity entry as written in an override document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PiiOverride {
    /// A PII entity kind such as `EMAIL`.
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Check model input. Defaults to `true`.
    pub input_enabled: Option<bool>,
    /// Check model output. Defaults to `true`.
    pub output_enabled: Option<bool>,
    /// One of `NONE|ANONYMIZE|BLOCK`.
    pub input_action: Option<String>,
    /// One of `NONE|ANONYMIZE|BLOCK`.
    pub output_action: Option<String>,
}

/// A custom regex entry as written in an override document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegexOverride {
    /// Pattern name.
    pub name: Option<String>,
    /// Optional description.
    pub description: Option<String>,
    /// Regular expression.
    pub pattern: Option<String>,
    /// One of `NONE|ANONYMIZE|BLOCK`.
    pub action: Option<String>,
}

/// A partial guardrail policy.
///
/// Every field is optional; absent scalars fall back to catalog constants
/// and absent lists follow [`UseDefaults`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyOverride {
    /// Human label. Must not be empty when given.
    pub name: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Message returned when model input is blocked.
    pub blocked_input_messaging: Option<String>,
    /// Message returned when model output is blocked.
    pub blocked_outputs_messaging: Option<String>,
    /// Content filters.
    pub content_filters: Option<Vec<ContentFilterOverride>>,
    /// Denied topics.
    pub denied_topics: Option<Vec<TopicOverride>>,
    /// PII entities.
    pub pii_entities: Option<Vec<PiiOverride>>,
    /// Custom regexes.
    pub regexes: Option<Vec<RegexOverride>>,
}

impl PolicyOverride {
    /// An override that only sets the name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Parse an override document from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid JSON or has the wrong shape.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// JSON Schema of the override document.
#[must_use]
pub fn override_schema() -> schemars::Schema {
    schemars::schema_for!(PolicyOverride)
}

/// Build a complete policy from an override and default toggles.
///
/// # Errors
///
/// Returns a [`ValidationError`] if an override entry has an
/// out-of-enumeration value, lacks a required field, duplicates a category
/// type, or carries a regex that does not compile.
pub fn build(
    policy_override: &PolicyOverride,
    use_defaults: UseDefaults,
) -> Result<GuardrailPolicy, ValidationError> {
    let name = scalar(
        "name",
        policy_override.name.as_deref(),
        catalog::DEFAULT_NAME,
    )?;

    let content_filters = match non_empty(policy_override.content_filters.as_deref()) {
        Some(entries) => validate_content_filters(entries)?,
        None if use_defaults.content_filters => catalog::default_content_filters(),
        None => Vec::new(),
    };

    let denied_topics = match non_empty(policy_override.denied_topics.as_deref()) {
        Some(entries) => validate_topics(entries)?,
        None if use_defaults.topics => catalog::default_denied_topics(),
        None => Vec::new(),
    };

    let pii_entities = match non_empty(policy_override.pii_entities.as_deref()) {
        Some(entries) => validate_pii(entries)?,
        None if use_defaults.pii => catalog::default_pii_entities(),
        None => Vec::new(),
    };

    let regexes = match non_empty(policy_override.regexes.as_deref()) {
        Some(entries) => validate_regexes(entries)?,
        None => Vec::new(),
    };

    let policy = GuardrailPolicy {
        name,
        description: fallback(
            policy_override.description.as_deref(),
            catalog::DEFAULT_DESCRIPTION,
        ),
        blocked_input_messaging: fallback(
            policy_override.blocked_input_messaging.as_deref(),
            catalog::DEFAULT_BLOCKED_INPUT_MESSAGING,
        ),
        blocked_outputs_messaging: fallback(
            policy_override.blocked_outputs_messaging.as_deref(),
            catalog::DEFAULT_BLOCKED_OUTPUTS_MESSAGING,
        ),
        content_filters,
        denied_topics,
        pii_entities,
        regexes,
    };

    debug!(
        name = %policy.name,
        filters = policy.content_filters.len(),
        topics = policy.denied_topics.len(),
        pii = policy.pii_entities.len(),
        regexes = policy.regexes.len(),
        "policy built"
    );
    Ok(policy)
}

fn non_empty<T>(list: Option<&[T]>) -> Option<&[T]> {
    list.filter(|l| !l.is_empty())
}

/// Required scalar: an explicit empty value is rejected.
fn scalar(field: &str, value: Option<&str>, default: &str) -> Result<String, ValidationError> {
    match value {
        Some(v) if v.trim().is_empty() => Err(ValidationError::new(field, "must not be empty")),
        Some(v) => Ok(v.to_owned()),
        None => Ok(default.to_owned()),
    }
}

/// Optional scalar: an empty value falls back like an absent one.
fn fallback(value: Option<&str>, default: &str) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
        .to_owned()
}

fn required<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str, ValidationError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ValidationError::missing(field))
}

fn parse_strength(field: &str, value: Option<&str>) -> Result<FilterStrength, ValidationError> {
    let raw = required(field, value)?;
    FilterStrength::parse(raw)
        .ok_or_else(|| ValidationError::out_of_range(field, raw, FilterStrength::NAMES))
}

fn parse_action(field: &str, value: Option<&str>) -> Result<SensitiveAction, ValidationError> {
    let raw = required(field, value)?;
    SensitiveAction::parse(raw)
        .ok_or_else(|| ValidationError::out_of_range(field, raw, SensitiveAction::NAMES))
}

fn ensure_unique(
    seen: &mut HashSet<String>,
    field: &str,
    key: &str,
) -> Result<(), ValidationError> {
    if seen.insert(key.to_owned()) {
        Ok(())
    } else {
        Err(ValidationError::new(field, format!("duplicate '{key}'")))
    }
}

fn validate_content_filters(
    entries: &[ContentFilterOverride],
) -> Result<Vec<ContentFilter>, ValidationError> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let field = format!("contentFilters[{i}]");
            let type_field = format!("{field}.type");
            let raw = required(&type_field, Some(entry.filter_type.as_str()))?;
            let filter_type = FilterType::parse(raw)
                .ok_or_else(|| ValidationError::out_of_range(&type_field, raw, FilterType::NAMES))?;
            ensure_unique(&mut seen, &type_field, raw)?;

            let input_strength = parse_strength(
                &format!("{field}.inputStrength"),
                entry.input_strength.as_deref(),
            )?;
            let output_strength = parse_strength(
                &format!("{field}.outputStrength"),
                entry.output_strength.as_deref(),
            )?;
            if filter_type == FilterType::PromptAttack && output_strength != FilterStrength::None {
                return Err(ValidationError::new(
                    format!("{field}.outputStrength"),
                    "PROMPT_ATTACK only applies to input and must be NONE",
                ));
            }
            Ok(ContentFilter::new(filter_type, input_strength, output_strength))
        })
        .collect()
}

fn validate_topics(entries: &[TopicOverride]) -> Result<Vec<DeniedTopic>, ValidationError> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let field = format!("deniedTopics[{i}]");
            let name = required(&format!("{field}.name"), entry.name.as_deref())?;
            ensure_unique(&mut seen, &format!("{field}.name"), name)?;
            let definition =
                required(&format!("{field}.definition"), entry.definition.as_deref())?;
            Ok(DeniedTopic {
                name: name.to_owned(),
                definition: definition.to_owned(),
                examples: entry
                    .examples
                    .iter()
                    .filter(|e| !e.trim().is_empty())
                    .cloned()
                    .collect(),
            })
        })
        .collect()
}

fn validate_pii(entries: &[PiiOverride]) -> Result<Vec<PiiEntity>, ValidationError> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let field = format!("piiEntities[{i}]");
            let type_field = format!("{field}.type");
            let raw = required(&type_field, Some(entry.entity_type.as_str()))?;
            let entity_type = PiiEntityType::parse(raw).ok_or_else(|| {
                ValidationError::new(&type_field, format!("unrecognized PII type '{raw}'"))
            })?;
            ensure_unique(&mut seen, &type_field, raw)?;

            Ok(PiiEntity {
                entity_type,
                input_enabled: entry.input_enabled.unwrap_or(true),
                output_enabled: entry.output_enabled.unwrap_or(true),
                input_action: parse_action(
                    &format!("{field}.inputAction"),
                    entry.input_action.as_deref(),
                )?,
                output_action: parse_action(
                    &format!("{field}.outputAction"),
                    entry.output_action.as_deref(),
                )?,
            })
        })
        .collect()
}

fn validate_regexes(entries: &[RegexOverride]) -> Result<Vec<RegexFilter>, ValidationError> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let field = format!("regexes[{i}]");
            let name = required(&format!("{field}.name"), entry.name.as_deref())?;
            ensure_unique(&mut seen, &format!("{field}.name"), name)?;
            let pattern_field = format!("{field}.pattern");
            let pattern = entry
                .pattern
                .as_deref()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| ValidationError::missing(&pattern_field))?;
            regex::Regex::new(pattern)
                .map_err(|e| ValidationError::new(&pattern_field, e.to_string()))?;

            Ok(RegexFilter {
                name: name.to_owned(),
                description: entry
                    .description
                    .as_deref()
                    .filter(|d| !d.trim().is_empty())
                    .map(str::to_owned),
                pattern: pattern.to_owned(),
                action: parse_action(&format!("{field}.action"), entry.action.as_deref())?,
            })
        })
        .collect()
}

impl From<&ContentFilter> for ContentFilterOverride {
    fn from(filter: &ContentFilter) -> Self {
        Self {
            filter_type: filter.filter_type.as_str().to_owned(),
            input_strength: Some(filter.input_strength.as_str().to_owned()),
            output_strength: Some(filter.output_strength.as_str().to_owned()),
        }
    }
}

impl From<&DeniedTopic> for TopicOverride {
    fn from(topic: &DeniedTopic) -> Self {
        Self {
            name: Some(topic.name.clone()),
            definition: Some(topic.definition.clone()),
            examples: topic.examples.clone(),
        }
    }
}

impl From<&PiiEntity> for PiiOverride {
    fn from(entity: &PiiEntity) -> Self {
        Self {
            entity_type: entity.entity_type.as_str().to_owned(),
            input_enabled: Some(entity.input_enabled),
            output_enabled: Some(entity.output_enabled),
            input_action: Some(entity.input_action.as_str().to_owned()),
            output_action: Some(entity.output_action.as_str().to_owned()),
        }
    }
}

impl From<&RegexFilter> for RegexOverride {
    fn from(regex: &RegexFilter) -> Self {
        Self {
            name: Some(regex.name.clone()),
            description: regex.description.clone(),
            pattern: Some(regex.pattern.clone()),
            action: Some(regex.action.as_str().to_owned()),
        }
    }
}

impl From<&GuardrailPolicy> for PolicyOverride {
    /// Express a complete policy as an override that rebuilds it exactly.
    fn from(policy: &GuardrailPolicy) -> Self {
        Self {
            name: Some(policy.name.clone()),
            description: Some(policy.description.clone()),
            blocked_input_messaging: Some(policy.blocked_input_messaging.clone()),
            blocked_outputs_messaging: Some(policy.blocked_outputs_messaging.clone()),
            content_filters: Some(policy.content_filters.iter().map(Into::into).collect()),
            denied_topics: Some(policy.denied_topics.iter().map(Into::into).collect()),
            pii_entities: Some(policy.pii_entities.iter().map(Into::into).collect()),
            regexes: Some(policy.regexes.iter().map(Into::into).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(kind: &str, input: &str, output: &str) -> ContentFilterOverride {
        ContentFilterOverride {
            filter_type: kind.into(),
            input_strength: Some(input.into()),
            output_strength: Some(output.into()),
        }
    }

    #[test]
    fn test_override_list_replaces_defaults() {
        let policy_override = PolicyOverride {
            content_filters: Some(vec![filter("HATE", "LOW", "MEDIUM")]),
            ..PolicyOverride::default()
        };
        let policy = build(&policy_override, UseDefaults::all()).unwrap();
        assert_eq!(
            policy.content_filters,
            vec![ContentFilter::new(
                FilterType::Hate,
                FilterStrength::Low,
                FilterStrength::Medium
            )]
        );
        // Other categories still follow their own flags.
        assert_eq!(policy.denied_topics, catalog::default_denied_topics());
        assert_eq!(policy.pii_entities, catalog::default_pii_entities());
    }

    #[test]
    fn test_defaults_used_when_not_overridden() {
        let policy = build(&PolicyOverride::default(), UseDefaults::all()).unwrap();
        assert_eq!(policy.content_filters, catalog::default_content_filters());
        assert_eq!(policy.name, catalog::DEFAULT_NAME);
        assert_eq!(
            policy.blocked_input_messaging,
            catalog::DEFAULT_BLOCKED_INPUT_MESSAGING
        );
        assert!(policy.regexes.is_empty());
    }

    #[test]
    fn test_disabled_defaults_are_empty() {
        let policy = build(&PolicyOverride::default(), UseDefaults::none()).unwrap();
        assert!(policy.content_filters.is_empty());
        assert!(policy.is_null());
        assert!(!policy.has_enforceable_content());
    }

    #[test]
    fn test_empty_override_list_counts_as_absent() {
        let policy_override = PolicyOverride {
            content_filters: Some(vec![]),
            ..PolicyOverride::default()
        };
        let policy = build(
            &policy_override,
            UseDefaults {
                content_filters: true,
                ..UseDefaults::none()
            },
        )
        .unwrap();
        assert_eq!(policy.content_filters, catalog::default_content_filters());
    }

    #[test]
    fn test_out_of_range_strength_is_rejected() {
        let policy_override = PolicyOverride {
            content_filters: Some(vec![filter("VIOLENCE", "EXTREME", "HIGH")]),
            ..PolicyOverride::default()
        };
        let err = build(&policy_override, UseDefaults::all()).unwrap_err();
        assert_eq!(err.field, "contentFilters[0].inputStrength");
    }

    #[test]
    fn test_prompt_attack_output_must_be_none() {
        let policy_override = PolicyOverride {
            content_filters: Some(vec![filter("PROMPT_ATTACK", "HIGH", "HIGH")]),
            ..PolicyOverride::default()
        };
        assert!(build(&policy_override, UseDefaults::none()).is_err());
    }

    #[test]
    fn test_duplicate_filter_type_is_rejected() {
        let policy_override = PolicyOverride {
            content_filters: Some(vec![
                filter("HATE", "LOW", "LOW"),
                filter("HATE", "HIGH", "HIGH"),
            ]),
            ..PolicyOverride::default()
        };
        let err = build(&policy_override, UseDefaults::none()).unwrap_err();
        assert_eq!(err.field, "contentFilters[1].type");
    }

    #[test]
    fn test_topic_without_definition_is_rejected() {
        let policy_override = PolicyOverride {
            denied_topics: Some(vec![TopicOverride {
                name: Some("Gambling".into()),
                definition: None,
                examples: vec![],
            }]),
            ..PolicyOverride::default()
        };
        let err = build(&policy_override, UseDefaults::none()).unwrap_err();
        assert_eq!(err.field, "deniedTopics[0].definition");
    }

    #[test]
    fn test_unknown_pii_type_is_rejected() {
        let policy_override = PolicyOverride {
            pii_entities: Some(vec![PiiOverride {
                entity_type: "SHOE_SIZE".into(),
                input_action: Some("BLOCK".into()),
                output_action: Some("BLOCK".into()),
                ..PiiOverride::default()
            }]),
            ..PolicyOverride::default()
        };
        let err = build(&policy_override, UseDefaults::all()).unwrap_err();
        assert_eq!(err.field, "piiEntities[0].type");
        assert!(err.reason.contains("SHOE_SIZE"));
    }

    #[test]
    fn test_regex_must_compile() {
        let policy_override = PolicyOverride {
            regexes: Some(vec![RegexOverride {
                name: Some("ticket".into()),
                description: None,
                pattern: Some("TCK-[0-9".into()),
                action: Some("ANONYMIZE".into()),
            }]),
            ..PolicyOverride::default()
        };
        let err = build(&policy_override, UseDefaults::none()).unwrap_err();
        assert_eq!(err.field, "regexes[0].pattern");

        let fixed = PolicyOverride {
            regexes: Some(vec![RegexOverride {
                name: Some("ticket".into()),
                description: None,
                pattern: Some("TCK-[0-9]+".into()),
                action: Some("ANONYMIZE".into()),
            }]),
            ..PolicyOverride::default()
        };
        let policy = build(&fixed, UseDefaults::none()).unwrap();
        assert_eq!(policy.regexes.len(), 1);
        assert!(!policy.has_enforceable_content());
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let err = build(&PolicyOverride::named("  "), UseDefaults::all()).unwrap_err();
        assert_eq!(err.field, "name");
    }

    #[test]
    fn test_override_from_json_and_back() {
        let json = r#"{
            "name": "Support",
            "contentFilters": [
                {"type": "INSULTS", "inputStrength": "MEDIUM", "outputStrength": "HIGH"}
            ],
            "piiEntities": [
                {"type": "EMAIL", "inputAction": "ANONYMIZE", "outputAction": "ANONYMIZE", "outputEnabled": false}
            ]
        }"#;
        let policy_override = PolicyOverride::from_json(json).unwrap();
        let policy = build(&policy_override, UseDefaults::none()).unwrap();
        assert_eq!(policy.name, "Support");
        assert!(!policy.pii_entities[0].output_enabled);

        let rebuilt = build(&PolicyOverride::from(&policy), UseDefaults::none()).unwrap();
        assert_eq!(rebuilt, policy);
    }

    #[test]
    fn test_override_schema_names_fields() {
        let schema = serde_json::to_value(override_schema()).unwrap();
        let text = schema.to_string();
        assert!(text.contains("contentFilters"));
        assert!(text.contains("blockedOutputsMessaging"));
    }
}
