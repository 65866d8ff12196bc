//! Ragdesk CLI - interactive retrieval-augmented chat and guardrail
//! administration from the terminal.
//!
//! The `ragdesk` binary wraps [`ChatRepl`] for the interactive loop and the
//! [`commands`] module for one-shot guardrail and config operations.

pub mod chat;
pub mod commands;

pub use chat::{ChatRepl, ReplCommand, parse_command, render_listing, render_turn};
