//! Guardrail policy documents and their category entries.
//!
//! A [`GuardrailPolicy`] is the complete, internally consistent document the
//! [builder](super::builder) produces. Enumerated values are closed Rust
//! enums here; raw strings only exist in override documents, before
//! validation.

use serde::{Deserialize, Serialize};

/// Declares a closed string enumeration with a fixed wire spelling.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $wire)] $variant, )+
        }

        impl $name {
            /// Every value, in declaration order.
            pub const ALL: &'static [Self] = &[ $( Self::$variant, )+ ];

            /// Wire spellings of every value, in declaration order.
            pub const NAMES: &'static [&'static str] = &[ $( $wire, )+ ];

            /// The wire spelling of this value.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $wire, )+
                }
            }

            /// Parse a wire spelling. Matching is exact.
            #[must_use]
            pub fn parse(value: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|v| v.as_str() == value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum! {
    /// Content filter category.
    FilterType {
        /// Sexual content.
        Sexual => "SEXUAL",
        /// Violent content.
        Violence => "VIOLENCE",
        /// Hateful content.
        Hate => "HATE",
        /// Insults.
        Insults => "INSULTS",
        /// Criminal or otherwise improper conduct.
        Misconduct => "MISCONDUCT",
        /// Jailbreak and prompt-injection attempts. Input only.
        PromptAttack => "PROMPT_ATTACK",
    }
}

string_enum! {
    /// How aggressively a content filter blocks.
    FilterStrength {
        /// Filter disabled.
        None => "NONE",
        /// Block only high-confidence matches.
        Low => "LOW",
        /// Block medium- and high-confidence matches.
        Medium => "MEDIUM",
        /// Block low-, medium- and high-confidence matches.
        High => "HIGH",
    }
}

string_enum! {
    /// What happens to matched sensitive information.
    SensitiveAction {
        /// Detect only.
        None => "NONE",
        /// Mask the match in place.
        Anonymize => "ANONYMIZE",
        /// Reject the whole message.
        Block => "BLOCK",
    }
}

string_enum! {
    /// Personally identifiable information entity kind.
    PiiEntityType {
        /// Postal address.
        Address => "ADDRESS",
        /// Age.
        Age => "AGE",
        /// AWS access key id.
        AwsAccessKey => "AWS_ACCESS_KEY",
        /// AWS secret access key.
        AwsSecretKey => "AWS_SECRET_KEY",
        /// Canadian health number.
        CaHealthNumber => "CA_HEALTH_NUMBER",
        /// Canadian social insurance number.
        CaSocialInsuranceNumber => "CA_SOCIAL_INSURANCE_NUMBER",
        /// Card verification value.
        CreditDebitCardCvv => "CREDIT_DEBIT_CARD_CVV",
        /// Card expiry date.
        CreditDebitCardExpiry => "CREDIT_DEBIT_CARD_EXPIRY",
        /// Card number.
        CreditDebitCardNumber => "CREDIT_DEBIT_CARD_NUMBER",
        /// Driver licence id.
        DriverId => "DRIVER_ID",
        /// Email address.
        Email => "EMAIL",
        /// IBAN.
        InternationalBankAccountNumber => "INTERNATIONAL_BANK_ACCOUNT_NUMBER",
        /// IP address.
        IpAddress => "IP_ADDRESS",
        /// Vehicle licence plate.
        LicensePlate => "LICENSE_PLATE",
        /// MAC address.
        MacAddress => "MAC_ADDRESS",
        /// Person name.
        Name => "NAME",
        /// Password.
        Password => "PASSWORD",
        /// Phone number.
        Phone => "PHONE",
        /// PIN code.
        Pin => "PIN",
        /// SWIFT/BIC code.
        SwiftCode => "SWIFT_CODE",
        /// UK NHS number.
        UkNationalHealthServiceNumber => "UK_NATIONAL_HEALTH_SERVICE_NUMBER",
        /// UK national insurance number.
        UkNationalInsuranceNumber => "UK_NATIONAL_INSURANCE_NUMBER",
        /// UK unique taxpayer reference.
        UkUniqueTaxpayerReferenceNumber => "UK_UNIQUE_TAXPAYER_REFERENCE_NUMBER",
        /// URL.
        Url => "URL",
        /// Username.
        Username => "USERNAME",
        /// US bank account number.
        UsBankAccountNumber => "US_BANK_ACCOUNT_NUMBER",
        /// US bank routing number.
        UsBankRoutingNumber => "US_BANK_ROUTING_NUMBER",
        /// US ITIN.
        UsIndividualTaxIdentificationNumber => "US_INDIVIDUAL_TAX_IDENTIFICATION_NUMBER",
        /// US passport number.
        UsPassportNumber => "US_PASSPORT_NUMBER",
        /// US social security number.
        UsSocialSecurityNumber => "US_SOCIAL_SECURITY_NUMBER",
        /// Vehicle identification number.
        VehicleIdentificationNumber => "VEHICLE_IDENTIFICATION_NUMBER",
    }
}

/// A content filter entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentFilter {
    /// Filter category, unique within a policy.
    #[serde(rename = "type")]
    pub filter_type: FilterType,
    /// Strength applied to model input.
    pub input_strength: FilterStrength,
    /// Strength applied to model output.
    pub output_strength: FilterStrength,
}

impl ContentFilter {
    /// Create a content filter entry.
    #[must_use]
    pub const fn new(
        filter_type: FilterType,
        input_strength: FilterStrength,
        output_strength: FilterStrength,
    ) -> Self {
        Self {
            filter_type,
            input_strength,
            output_strength,
        }
    }
}

/// A denied topic entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeniedTopic {
    /// Topic name, unique within a policy.
    pub name: String,
    /// Natural-language definition the service classifies against.
    pub definition: String,
    /// Example phrases that belong to the topic.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

/// A PII entity entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PiiEntity {
    /// Entity kind, unique within a policy.
    #[serde(rename = "type")]
    pub entity_type: PiiEntityType,
    /// Whether the entity is checked on model input.
    pub input_enabled: bool,
    /// Whether the entity is checked on model output.
    pub output_enabled: bool,
    /// Action on a match in model input.
    pub input_action: SensitiveAction,
    /// Action on a match in model output.
    pub output_action: SensitiveAction,
}

impl PiiEntity {
    /// Create an entry enabled in both directions with one action.
    #[must_use]
    pub const fn both(entity_type: PiiEntityType, action: SensitiveAction) -> Self {
        Self {
            entity_type,
            input_enabled: true,
            output_enabled: true,
            input_action: action,
            output_action: action,
        }
    }
}

/// A custom regex entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegexFilter {
    /// Pattern name, unique within a policy.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The regular expression. Guaranteed to compile.
    pub pattern: String,
    /// Action on a match.
    pub action: SensitiveAction,
}

/// A complete guardrail policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailPolicy {
    /// Human label, never empty.
    pub name: String,
    /// Description.
    pub description: String,
    /// Message returned when model input is blocked.
    pub blocked_input_messaging: String,
    /// Message returned when model output is blocked.
    pub blocked_outputs_messaging: String,
    /// Content filters.
    #[serde(default)]
    pub content_filters: Vec<ContentFilter>,
    /// Denied topics.
    #[serde(default)]
    pub denied_topics: Vec<DeniedTopic>,
    /// PII entities.
    #[serde(default)]
    pub pii_entities: Vec<PiiEntity>,
    /// Custom regexes.
    #[serde(default)]
    pub regexes: Vec<RegexFilter>,
}

impl GuardrailPolicy {
    /// Returns `true` if the policy has at least one content filter.
    ///
    /// Policies without one are contentless: callers that need an
    /// enforceable guardrail treat them as a no-op.
    #[must_use]
    pub fn has_enforceable_content(&self) -> bool {
        !self.content_filters.is_empty()
    }

    /// Returns `true` for the null guardrail: every category list empty.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.content_filters.is_empty()
            && self.denied_topics.is_empty()
            && self.pii_entities.is_empty()
            && self.regexes.is_empty()
    }

    /// Look up the content filter for a category.
    #[must_use]
    pub fn content_filter(&self, filter_type: FilterType) -> Option<&ContentFilter> {
        self.content_filters
            .iter()
            .find(|f| f.filter_type == filter_type)
    }

    /// Look up the PII entry for an entity kind.
    #[must_use]
    pub fn pii_entity(&self, entity_type: PiiEntityType) -> Option<&PiiEntity> {
        self.pii_entities
            .iter()
            .find(|p| p.entity_type == entity_type)
    }
}

impl std::fmt::Display for GuardrailPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} filters, {} topics, {} PII, {} regexes)",
            self.name,
            self.content_filters.len(),
            self.denied_topics.len(),
            self.pii_entities.len(),
            self.regexes.len()
        )
    }
}
