//! Ragdesk - a retrieval-augmented chat client with guardrail management.
//!
//! A user converses with a raw language model, a document knowledge base or
//! an autonomous agent, optionally through a content-safety guardrail.
//! Retrieval, inference, enforcement and orchestration are done by managed
//! services behind a small REST surface; this crate decides which guardrail
//! is active and keeps the client-side conversation state.
//!
//! # Architecture
//!
//! - **Guardrails** ([`guardrail`]) - policy catalog, builder, registry,
//!   selection tokens and target association
//! - **Session** ([`session`]) - transcript and the [`Conversation`](session::Conversation)
//!   controller
//! - **API** ([`api`]) - REST client and wire decoding
//! - **Config** ([`config`]) - layered application settings
//! - **Telemetry** ([`telemetry`]) - tracing spans and session counters
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragdesk::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::load(None)?;
//!     let client = Arc::new(ApiClient::from_config(&config)?);
//!
//!     let mut chat = Conversation::new(client.clone(), config.conversation_options());
//!     chat.refresh_listing(client.list_guardrails().await?);
//!     chat.select_guardrail(Some("gr1:2"));
//!
//!     let reply = chat.submit_turn("What is in the handbook?").await?;
//!     println!("{}", reply.content);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod guardrail;
pub mod session;
pub mod telemetry;
pub mod util;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::api::ApiClient;
    pub use crate::config::{AppConfig, HttpClientConfig};
    pub use crate::error::{Error, Result, TransportError, ValidationError};
    pub use crate::guardrail::{
        ApplyOutcome, CurrentGuardrail, GuardrailIdentity, GuardrailPolicy, GuardrailRef,
        GuardrailRegistry, GuardrailTarget, PolicyOverride, Preset, SelectionState, Transition,
        UseDefaults, Version, decode_token, encode_token, resolve, resolve_for_display,
    };
    pub use crate::session::{
        ChatBackend, ChatMode, Citation, Conversation, ConversationOptions, Turn, TurnRole,
    };
    pub use crate::telemetry::{SessionMetrics, Telemetry};
}
