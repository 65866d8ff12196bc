//! Conversation transcript: turns, citations and the server-issued session id.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::util::timestamp_ms;

/// Which answering service a turn is sent to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// A raw language model.
    #[default]
    Model,
    /// Retrieval over a document knowledge base.
    #[serde(rename = "kb", alias = "knowledge-base")]
    KnowledgeBase,
    /// An autonomous agent.
    Agent,
}

impl ChatMode {
    /// All modes.
    pub const ALL: [Self; 3] = [Self::Model, Self::KnowledgeBase, Self::Agent];

    /// Short name used on the command line and in config files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::KnowledgeBase => "kb",
            Self::Agent => "agent",
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Model => "Model",
            Self::KnowledgeBase => "Knowledge Base",
            Self::Agent => "Agent",
        })
    }
}

impl FromStr for ChatMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "model" | "llm" => Ok(Self::Model),
            "kb" | "knowledge-base" | "knowledgebase" => Ok(Self::KnowledgeBase),
            "agent" => Ok(Self::Agent),
            other => Err(Error::config(format!(
                "unknown chat mode '{other}' (expected model, kb or agent)"
            ))),
        }
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// The person chatting.
    User,
    /// The answering service.
    Assistant,
    /// Local notices such as the welcome message.
    System,
    /// A failed turn, shown inline.
    Error,
}

impl TurnRole {
    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Error => "error",
        }
    }
}

/// A source passage backing part of an answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceReference {
    /// Retrieved text.
    pub content: String,
    /// Where the passage came from (service specific).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<serde_json::Value>,
    /// Extra attributes attached by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl SourceReference {
    /// A best-effort human readable location, e.g. an S3 URI or web URL.
    #[must_use]
    pub fn location_label(&self) -> Option<String> {
        let location = self.location.as_ref()?;
        ["s3Location", "webLocation", "confluenceLocation", "sharePointLocation"]
            .iter()
            .filter_map(|key| location.get(*key))
            .find_map(|loc| {
                loc.get("uri")
                    .or_else(|| loc.get("url"))
                    .and_then(serde_json::Value::as_str)
            })
            .map(ToOwned::to_owned)
    }
}

/// Character range of the answer a citation covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// First character.
    pub start: usize,
    /// Last character.
    pub end: usize,
}

/// A citation attached to an assistant turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// The cited part of the answer.
    pub text: String,
    /// Where in the answer the cited part sits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
    /// Sources backing it.
    #[serde(default)]
    pub references: Vec<SourceReference>,
}

/// A single turn in the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Locally generated identifier.
    pub id: Uuid,
    /// Who produced the turn.
    pub role: TurnRole,
    /// Turn text.
    pub content: String,
    /// Timestamp (Unix milliseconds).
    pub timestamp: u64,
    /// Citations, for assistant turns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    /// Whether the citation sources are shown expanded.
    #[serde(default)]
    pub sources_expanded: bool,
}

impl Turn {
    /// Create a turn.
    #[must_use]
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: timestamp_ms(),
            citations: Vec::new(),
            sources_expanded: false,
        }
    }

    /// Create a user turn.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    /// Create an assistant turn with citations.
    #[must_use]
    pub fn assistant(content: impl Into<String>, citations: Vec<Citation>) -> Self {
        Self {
            citations,
            ..Self::new(TurnRole::Assistant, content)
        }
    }

    /// Create a system turn.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(TurnRole::System, content)
    }

    /// Create an error turn.
    #[must_use]
    pub fn error(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Error, content)
    }

    /// Total number of source passages across all citations.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.citations.iter().map(|c| c.references.len()).sum()
    }
}

/// The conversation transcript plus the server-issued session id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    session_id: Option<String>,
    turns: Vec<Turn>,
}

impl Transcript {
    /// Create a transcript holding a single system turn.
    #[must_use]
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        Self {
            session_id: None,
            turns: vec![Turn::system(greeting)],
        }
    }

    /// The session id issued by the service, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// All turns in order.
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The most recent turn.
    #[must_use]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Returns `true` once the user has said anything.
    #[must_use]
    pub fn has_conversation(&self) -> bool {
        self.turns.iter().any(|t| t.role == TurnRole::User)
    }

    /// User and assistant turns, the history sent to a model.
    pub fn dialogue(&self) -> impl Iterator<Item = &Turn> {
        self.turns
            .iter()
            .filter(|t| matches!(t.role, TurnRole::User | TurnRole::Assistant))
    }

    /// Append a turn and return it.
    pub fn push(&mut self, turn: Turn) -> &Turn {
        self.turns.push(turn);
        &self.turns[self.turns.len() - 1]
    }

    /// Adopt the id from a response. `None` keeps the current id.
    pub fn adopt_session_id(&mut self, session_id: Option<String>) {
        if let Some(id) = session_id.filter(|id| !id.is_empty()) {
            self.session_id = Some(id);
        }
    }

    /// Drop everything and start over with a single system turn.
    pub fn reset(&mut self, greeting: impl Into<String>) {
        *self = Self::with_greeting(greeting);
    }

    /// Flip source expansion on the turn at `index`.
    ///
    /// Returns the new state, or `None` if there is no such turn or it has
    /// no citations.
    pub fn toggle_sources(&mut self, index: usize) -> Option<bool> {
        let turn = self.turns.get_mut(index)?;
        if turn.citations.is_empty() {
            return None;
        }
        turn.sources_expanded = !turn.sources_expanded;
        Some(turn.sources_expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("kb".parse::<ChatMode>().unwrap(), ChatMode::KnowledgeBase);
        assert_eq!("Agent".parse::<ChatMode>().unwrap(), ChatMode::Agent);
        assert!("rag".parse::<ChatMode>().is_err());
        for mode in ChatMode::ALL {
            assert_eq!(mode.as_str().parse::<ChatMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_mode_serde() {
        assert_eq!(
            serde_json::to_string(&ChatMode::KnowledgeBase).unwrap(),
            "\"kb\""
        );
        let mode: ChatMode = serde_json::from_str("\"knowledge-base\"").unwrap();
        assert_eq!(mode, ChatMode::KnowledgeBase);
    }

    #[test]
    fn test_session_id_adoption() {
        let mut transcript = Transcript::with_greeting("hi");
        transcript.adopt_session_id(None);
        assert_eq!(transcript.session_id(), None);
        transcript.adopt_session_id(Some("s1".into()));
        transcript.adopt_session_id(None);
        assert_eq!(transcript.session_id(), Some("s1"));
        transcript.adopt_session_id(Some(String::new()));
        assert_eq!(transcript.session_id(), Some("s1"));
        transcript.adopt_session_id(Some("s2".into()));
        assert_eq!(transcript.session_id(), Some("s2"));
    }

    #[test]
    fn test_reset_leaves_single_system_turn() {
        let mut transcript = Transcript::with_greeting("hi");
        transcript.push(Turn::user("question"));
        transcript.adopt_session_id(Some("s1".into()));
        assert!(transcript.has_conversation());

        transcript.reset("fresh start");
        assert_eq!(transcript.turns().len(), 1);
        assert_eq!(transcript.turns()[0].role, TurnRole::System);
        assert_eq!(transcript.session_id(), None);
        assert!(!transcript.has_conversation());
    }

    #[test]
    fn test_toggle_sources() {
        let mut transcript = Transcript::with_greeting("hi");
        transcript.push(Turn::assistant(
            "answer",
            vec![Citation {
                text: "answer".into(),
                span: None,
                references: vec![SourceReference::default()],
            }],
        ));
        assert_eq!(transcript.toggle_sources(0), None);
        assert_eq!(transcript.toggle_sources(1), Some(true));
        assert_eq!(transcript.toggle_sources(1), Some(false));
        assert_eq!(transcript.toggle_sources(9), None);
    }

    #[test]
    fn test_location_label() {
        let reference = SourceReference {
            content: "text".into(),
            location: Some(serde_json::json!({
                "type": "S3",
                "s3Location": {"uri": "s3://docs/guide.pdf"}
            })),
            metadata: None,
        };
        assert_eq!(
            reference.location_label().as_deref(),
            Some("s3://docs/guide.pdf")
        );
        assert_eq!(SourceReference::default().location_label(), None);
    }
}
