//! REST boundary.
//!
//! [`ApiClient`] speaks the HTTP surface; [`types`] holds the wire shapes and
//! decodes them into tagged domain values exactly once.

pub mod client;
pub mod types;

pub use client::{ApiClient, ApiClientBuilder};
pub use crate::config::DEFAULT_API_URL;
pub use types::decode_listing;
