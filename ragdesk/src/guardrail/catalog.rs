//! Policy catalog: the default category sets and fallback strings.
//!
//! Pure data. Custom regexes have no catalog defaults.

use super::policy::{
    ContentFilter, DeniedTopic, FilterStrength, FilterType, PiiEntity, PiiEntityType,
    SensitiveAction,
};

/// Fallback policy name.
pub const DEFAULT_NAME: &str = "Guardrail";

/// Fallback policy description.
pub const DEFAULT_DESCRIPTION: &str = "Content-safety guardrail for the chat application";

/// Fallback message returned when model input is blocked.
pub const DEFAULT_BLOCKED_INPUT_MESSAGING: &str =
    "Sorry, I cannot respond to that request because it violates our content policy.";

/// Fallback message returned when model output is blocked.
pub const DEFAULT_BLOCKED_OUTPUTS_MESSAGING: &str =
    "Sorry, the generated response was blocked because it violates our content policy.";

/// Default strengths for a content filter category.
///
/// Prompt-attack filtering only applies to input, so its output strength is
/// always [`FilterStrength::None`].
#[must_use]
pub const fn default_content_filter(filter_type: FilterType) -> ContentFilter {
    match filter_type {
        FilterType::PromptAttack => {
            ContentFilter::new(filter_type, FilterStrength::High, FilterStrength::None)
        }
        FilterType::Misconduct => {
            ContentFilter::new(filter_type, FilterStrength::Medium, FilterStrength::Medium)
        }
        _ => ContentFilter::new(filter_type, FilterStrength::High, FilterStrength::High),
    }
}

/// Default content filters: every category at its default strengths.
#[must_use]
pub fn default_content_filters() -> Vec<ContentFilter> {
    FilterType::ALL
        .iter()
        .copied()
        .map(default_content_filter)
        .collect()
}

/// Default denied topics.
#[must_use]
pub fn default_denied_topics() -> Vec<DeniedTopic> {
    [
        (
            "InvestmentAdvice",
            "Recommendations about investing money, buying or selling securities, \
             or managing personal financial assets.",
            &[
                "Which stocks should I buy this year?",
                "Is it a good time to move my savings into crypto?",
            ][..],
        ),
        (
            "MedicalDiagnosis",
            "Diagnosing medical conditions or prescribing treatment for a specific person.",
            &[
                "What illness do I have if my chest hurts?",
                "How much of this medication should I take?",
            ][..],
        ),
        (
            "LegalCounsel",
            "Advice on how a specific person should act in a legal dispute or proceeding.",
            &["Should I sign this settlement agreement?"][..],
        ),
    ]
    .into_iter()
    .map(|(name, definition, examples)| DeniedTopic {
        name: name.to_owned(),
        definition: definition.to_owned(),
        examples: examples.iter().map(|e| (*e).to_owned()).collect(),
    })
    .collect()
}

/// Default action for a PII entity kind.
///
/// Credentials, payment data and government identifiers are blocked;
/// contact and descriptive data is anonymized.
#[must_use]
pub const fn default_pii_action(entity_type: PiiEntityType) -> SensitiveAction {
    use PiiEntityType as P;
    match entity_type {
        P::AwsAccessKey
        | P::AwsSecretKey
        | P::Password
        | P::Pin
        | P::CreditDebitCardCvv
        | P::CreditDebitCardExpiry
        | P::CreditDebitCardNumber
        | P::InternationalBankAccountNumber
        | P::SwiftCode
        | P::UsBankAccountNumber
        | P::UsBankRoutingNumber
        | P::UsSocialSecurityNumber
        | P::UsIndividualTaxIdentificationNumber
        | P::UsPassportNumber
        | P::CaSocialInsuranceNumber
        | P::CaHealthNumber
        | P::UkNationalHealthServiceNumber
        | P::UkNationalInsuranceNumber
        | P::UkUniqueTaxpayerReferenceNumber => SensitiveAction::Block,
        _ => SensitiveAction::Anonymize,
    }
}

/// Default PII entity entry for a kind: enabled both ways, default action.
#[must_use]
pub const fn default_pii_entity(entity_type: PiiEntityType) -> PiiEntity {
    PiiEntity::both(entity_type, default_pii_action(entity_type))
}

/// Default PII entities: every kind with its default flags.
#[must_use]
pub fn default_pii_entities() -> Vec<PiiEntity> {
    PiiEntityType::ALL
        .iter()
        .copied()
        .map(default_pii_entity)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_filter_defaults_cover_every_category() {
        let filters = default_content_filters();
        assert_eq!(filters.len(), FilterType::ALL.len());
        let prompt_attack = filters
            .iter()
            .find(|f| f.filter_type == FilterType::PromptAttack)
            .unwrap();
        assert_eq!(prompt_attack.output_strength, FilterStrength::None);
    }

    #[test]
    fn test_pii_defaults() {
        let entities = default_pii_entities();
        assert_eq!(entities.len(), PiiEntityType::ALL.len());
        assert_eq!(
            default_pii_action(PiiEntityType::UsSocialSecurityNumber),
            SensitiveAction::Block
        );
        assert_eq!(
            default_pii_action(PiiEntityType::Email),
            SensitiveAction::Anonymize
        );
        assert!(entities.iter().all(|e| e.input_enabled && e.output_enabled));
    }

    #[test]
    fn test_topic_defaults_have_definitions() {
        let topics = default_denied_topics();
        assert!(!topics.is_empty());
        assert!(topics.iter().all(|t| !t.definition.is_empty()));
    }
}
