//! Conversation telemetry using the `tracing` ecosystem.
//!
//! Spans and events go to whatever subscriber the binary installs; the
//! counters below are a lightweight summary kept alongside them.
//!
//! # Usage
//!
//! ```rust,ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter(EnvFilter::new("ragdesk=debug"))
//!     .init();
//! ```

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{Span, debug, info, info_span};

use crate::session::ChatMode;

/// Counters for one conversation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// Turns answered successfully.
    pub turns: usize,
    /// Turns that ended in an error.
    pub errors: usize,
    /// Citations received.
    pub citations: usize,
    /// Successful guardrail applications.
    pub guardrail_changes: usize,
    /// Time since the collector was created or reset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
}

impl SessionMetrics {
    /// Share of submitted turns that failed.
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        let total = self.turns + self.errors;
        if total == 0 {
            0.0
        } else {
            self.errors as f64 / total as f64
        }
    }
}

impl std::fmt::Display for SessionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Session Metrics")?;
        writeln!(f, "  Turns:      {}", self.turns)?;
        writeln!(f, "  Errors:     {}", self.errors)?;
        writeln!(f, "  Citations:  {}", self.citations)?;
        writeln!(f, "  Guardrails: {}", self.guardrail_changes)?;
        if let Some(d) = self.duration {
            writeln!(f, "  Duration:   {:.2}s", d.as_secs_f64())?;
        }
        Ok(())
    }
}

/// Telemetry collector that emits tracing events while counting.
#[derive(Debug, Clone, Copy)]
pub struct Telemetry {
    start: Instant,
    metrics: SessionMetrics,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    /// Create a new collector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            metrics: SessionMetrics::default(),
        }
    }

    /// Reset for a new session.
    pub fn reset(&mut self) {
        self.start = Instant::now();
        self.metrics = SessionMetrics::default();
    }

    /// Record an answered turn.
    pub fn record_turn(&mut self, mode: ChatMode, citations: usize) {
        self.metrics.turns += 1;
        self.metrics.citations += citations;
        info!(mode = mode.as_str(), citations, "turn_completed");
    }

    /// Record a failed turn.
    pub fn record_error(&mut self, error: &str) {
        self.metrics.errors += 1;
        debug!(error, "turn_error");
    }

    /// Record a successful guardrail application.
    pub fn record_guardrail_change(&mut self, token: &str) {
        self.metrics.guardrail_changes += 1;
        info!(token, "guardrail_changed");
    }

    /// Snapshot the counters with the elapsed time filled in.
    #[must_use]
    pub fn snapshot(&self) -> SessionMetrics {
        SessionMetrics {
            duration: Some(self.start.elapsed()),
            ..self.metrics
        }
    }

    /// Current counters.
    #[must_use]
    pub const fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// Create a span for a chat turn.
    #[must_use]
    pub fn turn_span(mode: ChatMode, session_id: Option<&str>) -> Span {
        info_span!("chat_turn", mode = mode.as_str(), session_id = session_id.unwrap_or("-"))
    }

    /// Create a span for a guardrail application.
    #[must_use]
    pub fn apply_span(target_id: &str, token: &str) -> Span {
        info_span!("guardrail_apply", target_id = %target_id, token = %token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_metrics() {
        let mut telemetry = Telemetry::new();
        telemetry.record_turn(ChatMode::KnowledgeBase, 3);
        telemetry.record_turn(ChatMode::Model, 0);
        telemetry.record_error("timeout");
        telemetry.record_guardrail_change("gr1:2");

        let metrics = telemetry.snapshot();
        assert_eq!(metrics.turns, 2);
        assert_eq!(metrics.citations, 3);
        assert_eq!(metrics.errors, 1);
        assert_eq!(metrics.guardrail_changes, 1);
        assert!(metrics.duration.is_some());
        assert!((metrics.error_rate() - 1.0 / 3.0).abs() < f64::EPSILON);
        assert!(metrics.to_string().contains("Citations:  3"));
    }

    #[test]
    fn test_reset() {
        let mut telemetry = Telemetry::new();
        telemetry.record_error("boom");
        telemetry.reset();
        assert_eq!(telemetry.metrics().errors, 0);
        assert!(SessionMetrics::default().error_rate().abs() < f64::EPSILON);
    }
}
