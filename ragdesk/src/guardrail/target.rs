//! Guardrail targets: external consumers a guardrail can be attached to.
//!
//! The association itself lives with the target (for example a managed
//! agent). Neither the registry nor the selector keeps "currently applied"
//! state; they read it through [`GuardrailTarget::current_guardrail`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::selector::{self, DRAFT};

/// An (identity, version) pair as exchanged with the REST surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailRef {
    /// Identity id.
    #[serde(rename = "guardrailId")]
    pub id: String,
    /// `"DRAFT"` or a published version number.
    #[serde(rename = "guardrailVersion")]
    pub version: String,
}

impl GuardrailRef {
    /// Create a reference.
    #[must_use]
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }

    /// Reference the draft version of an identity.
    #[must_use]
    pub fn draft(id: impl Into<String>) -> Self {
        Self::new(id, DRAFT)
    }

    /// The selection token for this pair.
    #[must_use]
    pub fn token(&self) -> String {
        selector::encode_token(&self.id, &self.version)
    }
}

/// Renders the selection token, so output can be pasted back as input.
impl std::fmt::Display for GuardrailRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.token())
    }
}

/// The guardrail currently associated with a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentGuardrail {
    /// A guardrail is attached.
    Attached {
        /// Which guardrail and version.
        guardrail: GuardrailRef,
        /// Display name, when the service reported one.
        name: Option<String>,
        /// Description, when the service reported one.
        description: Option<String>,
    },
    /// No guardrail is attached.
    NotAttached,
}

impl CurrentGuardrail {
    /// The attached reference, if any.
    #[must_use]
    pub const fn guardrail(&self) -> Option<&GuardrailRef> {
        match self {
            Self::Attached { guardrail, .. } => Some(guardrail),
            Self::NotAttached => None,
        }
    }

    /// Returns `true` if exactly this reference is attached.
    #[must_use]
    pub fn is(&self, reference: &GuardrailRef) -> bool {
        self.guardrail() == Some(reference)
    }
}

/// What [`apply_to_target`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The same reference was already attached; nothing was sent.
    Unchanged,
    /// The association was written.
    Attached,
    /// The association was removed.
    Detached,
}

/// An external consumer that guardrails can be attached to.
#[async_trait]
pub trait GuardrailTarget: Send + Sync {
    /// Read the guardrail currently attached to `target_id`.
    async fn current_guardrail(&self, target_id: &str) -> Result<CurrentGuardrail>;

    /// Attach `guardrail` to `target_id`, replacing any previous association.
    async fn attach_guardrail(&self, target_id: &str, guardrail: &GuardrailRef) -> Result<()>;

    /// Remove any guardrail from `target_id`.
    async fn detach_guardrail(&self, target_id: &str) -> Result<()>;
}

/// Associate `guardrail` with `target_id`.
///
/// Idempotent: when the target already reports exactly this reference the
/// call succeeds without writing. If the current association cannot be read
/// the write is attempted anyway, since the write itself replaces state.
///
/// # Errors
///
/// Returns [`Error::ApplyFailed`] if the target rejects the association.
pub async fn apply_to_target(
    target: &dyn GuardrailTarget,
    target_id: &str,
    guardrail: &GuardrailRef,
) -> Result<ApplyOutcome> {
    match target.current_guardrail(target_id).await {
        Ok(current) if current.is(guardrail) => {
            debug!(target_id, guardrail = %guardrail, "guardrail already applied");
            return Ok(ApplyOutcome::Unchanged);
        }
        Ok(_) => {}
        Err(e) => warn!(target_id, error = %e, "could not read current guardrail"),
    }

    target
        .attach_guardrail(target_id, guardrail)
        .await
        .map_err(|e| match e {
            Error::ApplyFailed { .. } => e,
            other => Error::apply_failed(target_id, other.to_string()),
        })?;
    info!(target_id, guardrail = %guardrail, "guardrail applied");
    Ok(ApplyOutcome::Attached)
}

/// Remove any guardrail from `target_id`.
///
/// Idempotent: a target that reports nothing attached is not written to.
///
/// # Errors
///
/// Returns [`Error::ApplyFailed`] if the target rejects the change.
pub async fn detach_from_target(
    target: &dyn GuardrailTarget,
    target_id: &str,
) -> Result<ApplyOutcome> {
    match target.current_guardrail(target_id).await {
        Ok(CurrentGuardrail::NotAttached) => {
            debug!(target_id, "no guardrail attached");
            return Ok(ApplyOutcome::Unchanged);
        }
        Ok(CurrentGuardrail::Attached { .. }) => {}
        Err(e) => warn!(target_id, error = %e, "could not read current guardrail"),
    }

    target
        .detach_guardrail(target_id)
        .await
        .map_err(|e| match e {
            Error::ApplyFailed { .. } => e,
            other => Error::apply_failed(target_id, other.to_string()),
        })?;
    info!(target_id, "guardrail detached");
    Ok(ApplyOutcome::Detached)
}

/// In-memory [`GuardrailTarget`].
///
/// Useful for local runs and tests; it counts writes so callers can observe
/// idempotence.
#[derive(Debug, Default)]
pub struct InMemoryTarget {
    bindings: RwLock<HashMap<String, GuardrailRef>>,
    writes: AtomicUsize,
    rejection: Option<String>,
}

impl InMemoryTarget {
    /// Create a target store with no associations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A target store whose writes always fail with `reason`.
    #[must_use]
    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            rejection: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Number of successful attach/detach writes.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl GuardrailTarget for InMemoryTarget {
    async fn current_guardrail(&self, target_id: &str) -> Result<CurrentGuardrail> {
        Ok(self.bindings.read().await.get(target_id).map_or(
            CurrentGuardrail::NotAttached,
            |guardrail| CurrentGuardrail::Attached {
                guardrail: guardrail.clone(),
                name: None,
                description: None,
            },
        ))
    }

    async fn attach_guardrail(&self, target_id: &str, guardrail: &GuardrailRef) -> Result<()> {
        if let Some(reason) = &self.rejection {
            return Err(Error::apply_failed(target_id, reason.clone()));
        }
        self.bindings
            .write()
            .await
            .insert(target_id.to_owned(), guardrail.clone());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn detach_guardrail(&self, target_id: &str) -> Result<()> {
        if let Some(reason) = &self.rejection {
            return Err(Error::apply_failed(target_id, reason.clone()));
        }
        self.bindings.write().await.remove(target_id);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_apply_twice_is_idempotent() {
        let target = InMemoryTarget::new();
        let reference = GuardrailRef::new("gr1", "3");

        let first = apply_to_target(&target, "agent-1", &reference).await.unwrap();
        let second = apply_to_target(&target, "agent-1", &reference).await.unwrap();

        assert_eq!(first, ApplyOutcome::Attached);
        assert_eq!(second, ApplyOutcome::Unchanged);
        assert_eq!(target.writes(), 1);
        assert!(
            target
                .current_guardrail("agent-1")
                .await
                .unwrap()
                .is(&reference)
        );
    }

    #[tokio::test]
    async fn test_apply_different_version_writes() {
        let target = InMemoryTarget::new();
        apply_to_target(&target, "agent-1", &GuardrailRef::draft("gr1"))
            .await
            .unwrap();
        let outcome = apply_to_target(&target, "agent-1", &GuardrailRef::new("gr1", "1"))
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Attached);
        assert_eq!(target.writes(), 2);
    }

    #[test]
    fn test_rejection_surfaces_apply_failed() {
        let target = InMemoryTarget::rejecting("agent is being prepared");
        let err = tokio_test::block_on(apply_to_target(
            &target,
            "agent-1",
            &GuardrailRef::draft("gr1"),
        ))
        .unwrap_err();
        assert!(matches!(err, Error::ApplyFailed { ref target, .. } if target == "agent-1"));
    }

    #[tokio::test]
    async fn test_detach_only_writes_when_attached() {
        let target = InMemoryTarget::new();
        let outcome = detach_from_target(&target, "agent-1").await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Unchanged);
        assert_eq!(target.writes(), 0);

        apply_to_target(&target, "agent-1", &GuardrailRef::draft("gr1"))
            .await
            .unwrap();
        let outcome = detach_from_target(&target, "agent-1").await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Detached);
        assert_eq!(target.writes(), 2);
        assert_eq!(
            target.current_guardrail("agent-1").await.unwrap(),
            CurrentGuardrail::NotAttached
        );
    }

    #[tokio::test]
    async fn test_detach_rejection_surfaces_apply_failed() {
        let target = InMemoryTarget::rejecting("agent is being prepared");
        target
            .bindings
            .write()
            .await
            .insert("agent-1".to_owned(), GuardrailRef::draft("gr1"));
        let err = detach_from_target(&target, "agent-1").await.unwrap_err();
        assert!(matches!(err, Error::ApplyFailed { ref target, .. } if target == "agent-1"));
    }

    #[test]
    fn test_ref_token() {
        assert_eq!(GuardrailRef::draft("gr1").token(), "gr1");
        assert_eq!(GuardrailRef::new("gr1", "2").token(), "gr1:2");
        assert_eq!(GuardrailRef::new("gr1", "2").to_string(), "gr1:2");
        assert_eq!(GuardrailRef::draft("gr1").to_string(), "gr1");
    }
}
