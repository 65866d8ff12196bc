//! The answering-service seam used by the conversation controller.

use async_trait::async_trait;

use crate::error::Result;
use crate::guardrail::GuardrailRef;

use super::transcript::{ChatMode, Citation, TurnRole};

/// A prior message forwarded as conversation history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    /// `User` or `Assistant`.
    pub role: TurnRole,
    /// Message text.
    pub content: String,
}

/// One turn to send to the answering service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    /// Which service answers.
    pub mode: ChatMode,
    /// The user's message.
    pub content: String,
    /// Earlier dialogue, oldest first. Only the model path uses it.
    pub history: Vec<HistoryMessage>,
    /// Session id from a previous reply.
    pub session_id: Option<String>,
    /// Guardrail the service should enforce, if any.
    pub guardrail: Option<GuardrailRef>,
}

/// A decoded reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnReply {
    /// Session id issued by the service, if it sent one.
    pub session_id: Option<String>,
    /// Answer text.
    pub answer: String,
    /// Supporting citations.
    pub citations: Vec<Citation>,
}

/// Something that answers chat turns.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send one turn and wait for the reply.
    async fn submit(&self, request: &TurnRequest) -> Result<TurnReply>;
}
