//! Wire types for the REST surface and their decoding into domain types.
//!
//! Every optional key is inspected once, here. Callers only see
//! [`GuardrailIdentity`], [`CurrentGuardrail`] and [`TurnReply`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::guardrail::builder::{
    ContentFilterOverride, PiiOverride, RegexOverride, TopicOverride,
};
use crate::guardrail::{
    CurrentGuardrail, DRAFT, GuardrailIdentity, GuardrailRef, PolicyOverride, PolicyVersion,
    UseDefaults, Version, build,
};
use crate::session::{Citation, HistoryMessage, SourceReference, Span, TurnReply};

/// `{error}` body returned with a non-2xx status.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    /// Error message.
    pub error: String,
}

// ============================================================================
// Guardrail listing
// ============================================================================

/// `GET /guardrails` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingResponse {
    /// Listed guardrails.
    #[serde(default)]
    pub guardrails: Vec<WireGuardrail>,
}

/// One listed guardrail.
///
/// Fully described entries carry `guardrailId` and `versions`; entries the
/// service could not describe carry only `id`, `name` and `version`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireGuardrail {
    /// Identity id.
    #[serde(alias = "id")]
    pub guardrail_id: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Version detail, when available.
    pub versions: Option<Vec<WireVersion>>,
}

/// One version as described by the guardrail service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireVersion {
    /// `DRAFT` or a version number.
    pub version: Option<String>,
    /// Policy name.
    pub name: Option<String>,
    /// Policy description.
    pub description: Option<String>,
    /// Message returned when input is blocked.
    pub blocked_input_messaging: Option<String>,
    /// Message returned when output is blocked.
    pub blocked_outputs_messaging: Option<String>,
    /// Content filters.
    pub content_policy: Option<ContentPolicy>,
    /// Denied topics.
    pub topic_policy: Option<TopicPolicy>,
    /// PII entities and regexes.
    pub sensitive_information_policy: Option<SensitiveInformationPolicy>,
}

/// `contentPolicy` block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentPolicy {
    /// Filter entries.
    #[serde(default)]
    pub filters: Vec<ContentFilterOverride>,
}

/// `topicPolicy` block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopicPolicy {
    /// Topic entries.
    #[serde(default)]
    pub topics: Vec<TopicOverride>,
}

/// `sensitiveInformationPolicy` block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitiveInformationPolicy {
    /// PII entries.
    #[serde(default)]
    pub pii_entities: Vec<WirePiiEntity>,
    /// Custom regexes.
    #[serde(default)]
    pub regexes: Vec<RegexOverride>,
}

/// A PII entry as the service reports it. `action` is the legacy single
/// action applied to both directions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePiiEntity {
    /// Entity kind.
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Legacy action.
    pub action: Option<String>,
    /// Input action.
    pub input_action: Option<String>,
    /// Output action.
    pub output_action: Option<String>,
    /// Input check flag.
    pub input_enabled: Option<bool>,
    /// Output check flag.
    pub output_enabled: Option<bool>,
}

impl From<WirePiiEntity> for PiiOverride {
    fn from(entity: WirePiiEntity) -> Self {
        Self {
            entity_type: entity.entity_type,
            input_enabled: entity.input_enabled,
            output_enabled: entity.output_enabled,
            input_action: entity.input_action.or_else(|| entity.action.clone()),
            output_action: entity.output_action.or(entity.action),
        }
    }
}

impl WireVersion {
    /// The version label, `DRAFT` when absent.
    #[must_use]
    pub fn label(&self) -> &str {
        self.version.as_deref().unwrap_or(DRAFT)
    }

    /// The policy override this description amounts to.
    #[must_use]
    pub fn into_override(self) -> PolicyOverride {
        let (pii_entities, regexes): (Vec<PiiOverride>, Vec<RegexOverride>) = self
            .sensitive_information_policy
            .map(|p| {
                (
                    p.pii_entities.into_iter().map(PiiOverride::from).collect(),
                    p.regexes,
                )
            })
            .unwrap_or_default();
        PolicyOverride {
            name: self.name.filter(|n| !n.is_empty()),
            description: self.description.filter(|d| !d.is_empty()),
            blocked_input_messaging: self.blocked_input_messaging.filter(|m| !m.is_empty()),
            blocked_outputs_messaging: self.blocked_outputs_messaging.filter(|m| !m.is_empty()),
            content_filters: self.content_policy.map(|p| p.filters),
            denied_topics: self.topic_policy.map(|p| p.topics),
            pii_entities: Some(pii_entities),
            regexes: Some(regexes),
        }
    }
}

/// Decode a listing into identities, in listing order.
///
/// Entries without an id are dropped. Versions with an unrecognised label
/// or a policy that fails validation are dropped with a warning; the rest
/// of the identity is kept.
#[must_use]
pub fn decode_listing(response: ListingResponse) -> Vec<GuardrailIdentity> {
    response
        .guardrails
        .into_iter()
        .filter_map(|entry| {
            let Some(id) = entry.guardrail_id.filter(|id| !id.is_empty()) else {
                warn!(name = ?entry.name, "listed guardrail has no id, skipping");
                return None;
            };
            let versions = entry
                .versions
                .unwrap_or_default()
                .into_iter()
                .filter_map(|v| decode_version(&id, v))
                .collect();
            Some(GuardrailIdentity::from_parts(
                id,
                entry.name.unwrap_or_default(),
                versions,
            ))
        })
        .collect()
}

fn decode_version(id: &str, wire: WireVersion) -> Option<PolicyVersion> {
    let version = match wire.label().parse::<Version>() {
        Ok(version) => version,
        Err(e) => {
            warn!(id, error = %e, "unrecognised guardrail version, skipping");
            return None;
        }
    };
    match build(&wire.into_override(), UseDefaults::none()) {
        Ok(policy) => Some(PolicyVersion { version, policy }),
        Err(e) => {
            warn!(id, %version, error = %e, "guardrail version failed validation, skipping");
            None
        }
    }
}

// ============================================================================
// Current guardrail and apply
// ============================================================================

/// `GET /guardrails/{agentId}` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentGuardrailResponse {
    /// The agent asked about.
    pub agent_id: Option<String>,
    /// `null` when nothing is attached.
    pub guardrail: Option<WireAttachedGuardrail>,
}

/// An attached guardrail, detailed or basic.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAttachedGuardrail {
    /// Identity id.
    #[serde(alias = "id")]
    pub guardrail_id: Option<String>,
    /// Attached version, `DRAFT` when absent.
    pub version: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Description.
    pub description: Option<String>,
}

impl From<Option<WireAttachedGuardrail>> for CurrentGuardrail {
    fn from(wire: Option<WireAttachedGuardrail>) -> Self {
        match wire {
            Some(WireAttachedGuardrail {
                guardrail_id: Some(id),
                version,
                name,
                description,
            }) if !id.is_empty() => Self::Attached {
                guardrail: GuardrailRef::new(id, version.unwrap_or_else(|| DRAFT.to_owned())),
                name,
                description,
            },
            _ => Self::NotAttached,
        }
    }
}

/// `PUT /guardrails` request. A `None` guardrail id detaches.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest<'a> {
    /// Target agent.
    pub agent_id: &'a str,
    /// Identity to attach, or `None` to detach.
    pub guardrail_id: Option<&'a str>,
    /// Version to attach.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guardrail_version: Option<&'a str>,
}

/// `PUT /guardrails` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResponse {
    /// Human readable result.
    pub message: Option<String>,
    /// The guardrail now attached.
    pub current_guardrail: Option<WireAttachedGuardrail>,
}

// ============================================================================
// Chat turns
// ============================================================================

/// A text content block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBlock {
    /// The text.
    pub text: String,
}

/// A message in a `POST /llm/query` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireMessage {
    /// `user` or `assistant`.
    pub role: &'static str,
    /// Content blocks.
    pub content: Vec<TextBlock>,
}

impl WireMessage {
    fn text(role: &'static str, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![TextBlock { text: text.into() }],
        }
    }
}

impl From<&HistoryMessage> for WireMessage {
    fn from(message: &HistoryMessage) -> Self {
        Self::text(message.role.as_str(), message.content.clone())
    }
}

/// `POST /llm/query` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelQueryRequest<'a> {
    /// Full dialogue ending with the new user message.
    pub messages: Vec<WireMessage>,
    /// Session id from a previous reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
    /// Guardrail to enforce.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guardrail_id: Option<&'a str>,
    /// Guardrail version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guardrail_version: Option<&'a str>,
}

impl<'a> ModelQueryRequest<'a> {
    /// Build from history plus the new message.
    #[must_use]
    pub fn new(
        history: &[HistoryMessage],
        content: &str,
        session_id: Option<&'a str>,
        guardrail: Option<&'a GuardrailRef>,
    ) -> Self {
        let mut messages: Vec<WireMessage> = history.iter().map(WireMessage::from).collect();
        messages.push(WireMessage::text("user", content));
        Self {
            messages,
            session_id,
            guardrail_id: guardrail.map(|g| g.id.as_str()),
            guardrail_version: guardrail.map(|g| g.version.as_str()),
        }
    }
}

/// `POST /knowledge-base/query` and `POST /agent/invoke` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest<'a> {
    /// The user's message.
    pub query: &'a str,
    /// Session id from a previous reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
    /// Guardrail to enforce.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guardrail_id: Option<&'a str>,
    /// Guardrail version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guardrail_version: Option<&'a str>,
}

impl<'a> QueryRequest<'a> {
    /// Build a query request.
    #[must_use]
    pub fn new(
        query: &'a str,
        session_id: Option<&'a str>,
        guardrail: Option<&'a GuardrailRef>,
    ) -> Self {
        Self {
            query,
            session_id,
            guardrail_id: guardrail.map(|g| g.id.as_str()),
            guardrail_version: guardrail.map(|g| g.version.as_str()),
        }
    }
}

/// Model and knowledge-base reply.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    /// Answer and citations.
    pub results: Option<QueryResults>,
    /// Session id.
    pub session_id: Option<String>,
}

/// `results` of a model or knowledge-base reply.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResults {
    /// Generated answer.
    pub output: Option<TextBlock>,
    /// Knowledge-base citations.
    #[serde(default)]
    pub citations: Vec<KbCitation>,
    /// Session id echoed inside the results.
    pub session_id: Option<String>,
}

/// A knowledge-base citation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KbCitation {
    /// The cited part of the answer.
    pub generated_response_part: Option<GeneratedResponsePart>,
    /// Sources backing it.
    #[serde(default)]
    pub retrieved_references: Vec<KbReference>,
}

/// `generatedResponsePart` of a citation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedResponsePart {
    /// The cited text.
    pub text_response_part: Option<TextResponsePart>,
}

/// `textResponsePart` of a citation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextResponsePart {
    /// Cited text.
    #[serde(default)]
    pub text: String,
    /// Range in the answer.
    pub span: Option<Span>,
}

/// A knowledge-base source reference.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KbReference {
    /// Retrieved text.
    pub content: Option<TextBlock>,
    /// Source location.
    pub location: Option<Value>,
    /// Source metadata.
    pub metadata: Option<Value>,
}

impl From<KbCitation> for Citation {
    fn from(citation: KbCitation) -> Self {
        let part = citation
            .generated_response_part
            .and_then(|p| p.text_response_part)
            .unwrap_or_default();
        Self {
            text: part.text,
            span: part.span,
            references: citation
                .retrieved_references
                .into_iter()
                .map(|r| SourceReference {
                    content: r.content.map(|c| c.text).unwrap_or_default(),
                    location: r.location,
                    metadata: r.metadata,
                })
                .collect(),
        }
    }
}

impl From<QueryResponse> for TurnReply {
    fn from(response: QueryResponse) -> Self {
        let results = response.results.unwrap_or_default();
        Self {
            session_id: response.session_id.or(results.session_id),
            answer: results.output.map(|o| o.text).unwrap_or_default(),
            citations: results.citations.into_iter().map(Citation::from).collect(),
        }
    }
}

/// Agent reply.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    /// Answer, citations and any agent error.
    pub results: Option<AgentResults>,
    /// Session id.
    pub session_id: Option<String>,
}

/// `results` of an agent reply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentResults {
    /// Answer text.
    #[serde(default)]
    pub text: String,
    /// Citations.
    #[serde(default)]
    pub citations: Vec<AgentCitation>,
    /// Trace events; only counted.
    #[serde(default)]
    pub traces: Vec<Value>,
    /// A string or a `{type, message}` object.
    pub error: Option<Value>,
}

/// An agent citation, already flattened by the service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentCitation {
    /// Cited text.
    #[serde(default)]
    pub text: String,
    /// Range in the answer.
    pub span: Option<Span>,
    /// Sources.
    #[serde(default)]
    pub references: Vec<AgentReference>,
}

/// An agent source reference.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentReference {
    /// Retrieved text.
    #[serde(default)]
    pub content: String,
    /// Source location.
    pub location: Option<Value>,
    /// Source metadata.
    pub metadata: Option<Value>,
}

impl TryFrom<AgentResponse> for TurnReply {
    type Error = TransportError;

    fn try_from(response: AgentResponse) -> Result<Self, Self::Error> {
        let results = response.results.unwrap_or_default();
        if let Some(error) = results.error {
            let message = match &error {
                Value::String(s) => s.clone(),
                other => other
                    .get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| other.to_string(), ToOwned::to_owned),
            };
            return Err(TransportError::service(message));
        }
        debug!(traces = results.traces.len(), "agent reply decoded");
        Ok(Self {
            session_id: response.session_id,
            answer: results.text,
            citations: results
                .citations
                .into_iter()
                .map(|c| Citation {
                    text: c.text,
                    span: c.span,
                    references: c
                        .references
                        .into_iter()
                        .map(|r| SourceReference {
                            content: r.content,
                            location: r.location,
                            metadata: r.metadata,
                        })
                        .collect(),
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrail::{FilterStrength, FilterType, PiiEntityType, SensitiveAction};
    use crate::session::TurnRole;
    use serde_json::json;

    fn listing_json() -> Value {
        json!({
            "guardrails": [
                {
                    "guardrailId": "gr1",
                    "name": "support",
                    "versions": [
                        {
                            "version": "DRAFT",
                            "name": "support",
                            "description": "Support desk guardrail",
                            "blockedInputMessaging": "Sorry, I cannot help with that.",
                            "blockedOutputsMessaging": "Sorry, I cannot answer that.",
                            "contentPolicy": {"filters": [
                                {"type": "HATE", "inputStrength": "HIGH", "outputStrength": "HIGH"},
                                {"type": "PROMPT_ATTACK", "inputStrength": "HIGH", "outputStrength": "NONE"}
                            ]},
                            "topicPolicy": {"topics": [
                                {"name": "Refunds", "definition": "Promising refunds.", "examples": [], "type": "DENY"}
                            ]},
                            "sensitiveInformationPolicy": {
                                "piiEntities": [{"type": "EMAIL", "action": "ANONYMIZE"}],
                                "regexes": [{"name": "ticket", "pattern": "TCK-\\d+", "action": "BLOCK"}]
                            }
                        },
                        {"version": "1", "name": "support"},
                        {"version": "v2", "name": "support"},
                        {"version": "2", "name": "support",
                         "contentPolicy": {"filters": [{"type": "HATE", "inputStrength": "EXTREME"}]}}
                    ]
                },
                {"id": "gr2", "name": "basic-only", "version": "DRAFT", "status": "READY"},
                {"name": "nameless"}
            ]
        })
    }

    #[test]
    fn test_decode_listing() {
        let response: ListingResponse = serde_json::from_value(listing_json()).unwrap();
        let identities = decode_listing(response);
        assert_eq!(identities.len(), 2);

        let gr1 = &identities[0];
        assert_eq!(gr1.id(), "gr1");
        let labels: Vec<_> = gr1.versions().iter().map(|v| v.version.to_string()).collect();
        assert_eq!(labels, ["DRAFT", "1"]);

        let draft = &gr1.versions()[0].policy;
        assert_eq!(draft.description, "Support desk guardrail");
        assert_eq!(
            draft.content_filter(FilterType::Hate).unwrap().input_strength,
            FilterStrength::High
        );
        assert_eq!(draft.denied_topics[0].name, "Refunds");
        let email = draft.pii_entity(PiiEntityType::Email).unwrap();
        assert_eq!(email.input_action, SensitiveAction::Anonymize);
        assert_eq!(email.output_action, SensitiveAction::Anonymize);
        assert_eq!(draft.regexes[0].pattern, "TCK-\\d+");

        // Version 1 has no policy blocks: a null guardrail.
        assert!(gr1.versions()[1].policy.is_null());

        let gr2 = &identities[1];
        assert_eq!(gr2.id(), "gr2");
        assert_eq!(gr2.name(), "basic-only");
        assert!(gr2.versions().is_empty());
    }

    #[test]
    fn test_current_guardrail_decoding() {
        let detailed: CurrentGuardrailResponse = serde_json::from_value(json!({
            "agentId": "A1",
            "guardrail": {"guardrailId": "gr1", "version": "3", "name": "support"}
        }))
        .unwrap();
        let current = CurrentGuardrail::from(detailed.guardrail);
        assert!(current.is(&GuardrailRef::new("gr1", "3")));

        let basic: CurrentGuardrailResponse =
            serde_json::from_value(json!({"agentId": "A1", "guardrail": {"id": "gr1"}})).unwrap();
        assert!(CurrentGuardrail::from(basic.guardrail).is(&GuardrailRef::draft("gr1")));

        let none: CurrentGuardrailResponse =
            serde_json::from_value(json!({"agentId": "A1", "guardrail": null})).unwrap();
        assert_eq!(CurrentGuardrail::from(none.guardrail), CurrentGuardrail::NotAttached);
    }

    #[test]
    fn test_apply_request_shape() {
        let attach = ApplyRequest {
            agent_id: "A1",
            guardrail_id: Some("gr1"),
            guardrail_version: Some("DRAFT"),
        };
        assert_eq!(
            serde_json::to_value(attach).unwrap(),
            json!({"agentId": "A1", "guardrailId": "gr1", "guardrailVersion": "DRAFT"})
        );
        let detach = ApplyRequest {
            agent_id: "A1",
            guardrail_id: None,
            guardrail_version: None,
        };
        assert_eq!(
            serde_json::to_value(detach).unwrap(),
            json!({"agentId": "A1", "guardrailId": null})
        );
    }

    #[test]
    fn test_model_request_shape() {
        let history = [
            HistoryMessage {
                role: TurnRole::User,
                content: "hi".into(),
            },
            HistoryMessage {
                role: TurnRole::Assistant,
                content: "hello".into(),
            },
        ];
        let guardrail = GuardrailRef::new("gr1", "2");
        let request = ModelQueryRequest::new(&history, "how are you?", Some("s1"), Some(&guardrail));
        assert_eq!(
            serde_json::to_value(request).unwrap(),
            json!({
                "messages": [
                    {"role": "user", "content": [{"text": "hi"}]},
                    {"role": "assistant", "content": [{"text": "hello"}]},
                    {"role": "user", "content": [{"text": "how are you?"}]}
                ],
                "sessionId": "s1",
                "guardrailId": "gr1",
                "guardrailVersion": "2"
            })
        );

        let bare = QueryRequest::new("what is rag?", None, None);
        assert_eq!(serde_json::to_value(bare).unwrap(), json!({"query": "what is rag?"}));
    }

    #[test]
    fn test_kb_reply_decoding() {
        let response: QueryResponse = serde_json::from_value(json!({
            "results": {
                "output": {"text": "RAG combines retrieval with generation."},
                "citations": [{
                    "generatedResponsePart": {"textResponsePart": {
                        "text": "RAG combines retrieval", "span": {"start": 0, "end": 21}
                    }},
                    "retrievedReferences": [{
                        "content": {"text": "Retrieval-augmented generation..."},
                        "location": {"type": "S3", "s3Location": {"uri": "s3://kb/rag.pdf"}},
                        "metadata": {"page": 3}
                    }]
                }],
                "sessionId": "inner"
            },
            "sessionId": "outer"
        }))
        .unwrap();
        let reply = TurnReply::from(response);
        assert_eq!(reply.session_id.as_deref(), Some("outer"));
        assert_eq!(reply.answer, "RAG combines retrieval with generation.");
        assert_eq!(reply.citations[0].span, Some(Span { start: 0, end: 21 }));
        assert_eq!(
            reply.citations[0].references[0].location_label().as_deref(),
            Some("s3://kb/rag.pdf")
        );
    }

    #[test]
    fn test_agent_reply_decoding() {
        let ok: AgentResponse = serde_json::from_value(json!({
            "results": {
                "text": "Done.",
                "citations": [{"text": "Done", "references": [{"content": "source"}]}],
                "traces": [{"step": 1}]
            },
            "sessionId": "s9"
        }))
        .unwrap();
        let reply = TurnReply::try_from(ok).unwrap();
        assert_eq!(reply.session_id.as_deref(), Some("s9"));
        assert_eq!(reply.citations[0].references[0].content, "source");

        let failed: AgentResponse = serde_json::from_value(json!({
            "results": {"text": "", "error": {"type": "throttlingException", "message": "Rate exceeded"}},
            "sessionId": "s9"
        }))
        .unwrap();
        let err = TurnReply::try_from(failed).unwrap_err();
        assert_eq!(err.to_string(), "Rate exceeded");
    }
}
