//! Session module for client-side conversation state.
//!
//! - [`transcript`] holds turns, citations and the server-issued session id.
//! - [`backend`] is the seam to the answering service.
//! - [`controller`] owns the whole chat state and its transitions.

pub mod backend;
pub mod controller;
pub mod transcript;

pub use backend::{ChatBackend, HistoryMessage, TurnReply, TurnRequest};
pub use controller::{Conversation, ConversationOptions, DEFAULT_WELCOME_MESSAGE};
pub use transcript::{ChatMode, Citation, SourceReference, Span, Transcript, Turn, TurnRole};
