//! Unified error types for ragdesk.
//!
//! This module provides the error hierarchy shared by every component:
//! - Policy validation errors raised by the builder
//! - Registry and selector lookup misses
//! - Guardrail association failures
//! - Transport failures at the REST boundary

use std::fmt;

/// Result type alias for ragdesk operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for ragdesk.
///
/// No variant is fatal: every error is recoverable at the call site.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A policy override was malformed.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The registry has no identity with this id.
    #[error("Guardrail '{id}' not found")]
    NotFound {
        /// The requested identity id.
        id: String,
    },

    /// The identity exists but the version does not.
    #[error("Guardrail '{id}' has no version '{version}'")]
    VersionNotFound {
        /// The identity id.
        id: String,
        /// The requested version.
        version: String,
    },

    /// A selection token named an identity absent from the listing.
    #[error("Unknown guardrail '{id}'")]
    UnknownGuardrail {
        /// The decoded identity id.
        id: String,
    },

    /// A selection token named a version absent from the identity.
    #[error("Unknown version '{version}' for guardrail '{id}'")]
    UnknownVersion {
        /// The decoded identity id.
        id: String,
        /// The decoded version.
        version: String,
    },

    /// The external target rejected the guardrail association.
    #[error("Failed to apply guardrail to '{target}': {reason}")]
    ApplyFailed {
        /// The target identifier.
        target: String,
        /// Why the association was rejected.
        reason: String,
    },

    /// Network or boundary failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration could not be loaded or is invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a registry not-found error.
    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a registry version-not-found error.
    #[must_use]
    pub fn version_not_found(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self::VersionNotFound {
            id: id.into(),
            version: version.into(),
        }
    }

    /// Create an apply-failed error.
    #[must_use]
    pub fn apply_failed(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ApplyFailed {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns `true` for lookup misses that display code may degrade
    /// instead of aborting.
    #[must_use]
    pub const fn is_lookup_miss(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::VersionNotFound { .. }
                | Self::UnknownGuardrail { .. }
                | Self::UnknownVersion { .. }
        )
    }
}

/// A malformed policy override.
///
/// `field` is a dotted path into the override document, e.g.
/// `contentFilters[2].inputStrength`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    /// Path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub reason: String,
}

impl ValidationError {
    /// Create a validation error for a field.
    #[must_use]
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// A required field was absent or empty.
    #[must_use]
    pub fn missing(field: impl Into<String>) -> Self {
        Self::new(field, "is required")
    }

    /// A value fell outside its enumeration.
    #[must_use]
    pub fn out_of_range(field: impl Into<String>, value: &str, allowed: &[&str]) -> Self {
        Self::new(
            field,
            format!("'{value}' is not one of {}", allowed.join("|")),
        )
    }
}

/// Error type for failures at the REST boundary.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct TransportError {
    /// The error kind.
    pub kind: TransportErrorKind,
    /// HTTP status, when the server answered.
    pub status: Option<u16>,
    /// Error message, preserved from the cause.
    pub message: String,
}

/// Categories of transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportErrorKind {
    /// Connection, timeout or other network failure.
    Network,
    /// Non-success HTTP status.
    HttpStatus,
    /// The response body did not have the expected shape.
    Decode,
    /// The service answered successfully but reported an error payload.
    Service,
}

impl TransportError {
    /// Create a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Network,
            status: None,
            message: message.into(),
        }
    }

    /// Create an HTTP status error.
    #[must_use]
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::HttpStatus,
            status: Some(status),
            message: message.into(),
        }
    }

    /// Create a decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Decode,
            status: None,
            message: message.into(),
        }
    }

    /// Create a service error.
    #[must_use]
    pub fn service(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Service,
            status: None,
            message: message.into(),
        }
    }

    /// Returns `true` if the server answered 404.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(status) = self.status {
            write!(f, "HTTP {status}: ")?;
        }
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network("Request timed out")
        } else if err.is_connect() {
            Self::network(format!("Connection failed: {err}"))
        } else if err.is_decode() {
            Self::decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::http_status(status.as_u16(), err.to_string())
        } else {
            Self::network(err.to_string())
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.into())
    }
}
