//! The conversation controller.
//!
//! [`Conversation`] is the single owner of client-side chat state: the
//! chat mode, the transcript, the cached guardrail listing and the
//! selection. Every user action is a method on it; there is no other
//! mutable state.

use std::sync::Arc;

use tracing::{Instrument, debug, info, warn};

use crate::error::{Error, Result, ValidationError};
use crate::guardrail::{
    ApplyOutcome, GuardrailIdentity, GuardrailRef, GuardrailTarget, SelectionState, Transition,
    apply_to_target, decode_token, resolve, resolve_for_display,
};
use crate::telemetry::{SessionMetrics, Telemetry};

use super::backend::{ChatBackend, HistoryMessage, TurnRequest};
use super::transcript::{ChatMode, Transcript, Turn};

/// Greeting used when none is configured.
pub const DEFAULT_WELCOME_MESSAGE: &str =
    "Hello! Ask me anything. Type /help to see what else I can do.";

/// Behaviour switches for a [`Conversation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationOptions {
    /// System turn shown at the start of every session.
    pub welcome_message: String,
    /// Forward the selected guardrail on agent turns. When off, the agent
    /// relies on the guardrail attached to it.
    pub agent_request_guardrails: bool,
}

impl Default for ConversationOptions {
    fn default() -> Self {
        Self {
            welcome_message: DEFAULT_WELCOME_MESSAGE.to_owned(),
            agent_request_guardrails: false,
        }
    }
}

#[derive(Clone)]
struct TargetBinding {
    target: Arc<dyn GuardrailTarget>,
    target_id: String,
}

/// Client-side chat state and its transitions.
pub struct Conversation {
    backend: Arc<dyn ChatBackend>,
    target: Option<TargetBinding>,
    options: ConversationOptions,
    mode: ChatMode,
    transcript: Transcript,
    listing: Vec<GuardrailIdentity>,
    selection: SelectionState,
    telemetry: Telemetry,
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("mode", &self.mode)
            .field("session_id", &self.transcript.session_id())
            .field("turns", &self.transcript.turns().len())
            .field("listing", &self.listing.len())
            .field("selection", &self.selection)
            .finish_non_exhaustive()
    }
}

impl Conversation {
    /// Start a conversation in [`ChatMode::Model`].
    #[must_use]
    pub fn new(backend: Arc<dyn ChatBackend>, options: ConversationOptions) -> Self {
        Self {
            backend,
            target: None,
            transcript: Transcript::with_greeting(&options.welcome_message),
            options,
            mode: ChatMode::default(),
            listing: Vec::new(),
            selection: SelectionState::default(),
            telemetry: Telemetry::new(),
        }
    }

    /// Set the starting mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: ChatMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set where [`Conversation::apply_selection`] attaches guardrails.
    #[must_use]
    pub fn with_target(
        mut self,
        target: Arc<dyn GuardrailTarget>,
        target_id: impl Into<String>,
    ) -> Self {
        self.target = Some(TargetBinding {
            target,
            target_id: target_id.into(),
        });
        self
    }

    /// Current chat mode.
    #[must_use]
    pub const fn mode(&self) -> ChatMode {
        self.mode
    }

    /// The transcript.
    #[must_use]
    pub const fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// The server-issued session id, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.transcript.session_id()
    }

    /// The cached guardrail listing.
    #[must_use]
    pub fn listing(&self) -> &[GuardrailIdentity] {
        &self.listing
    }

    /// The guardrail selection.
    #[must_use]
    pub const fn selection(&self) -> &SelectionState {
        &self.selection
    }

    /// Behaviour switches.
    #[must_use]
    pub const fn options(&self) -> &ConversationOptions {
        &self.options
    }

    /// Counters for this conversation.
    #[must_use]
    pub fn metrics(&self) -> SessionMetrics {
        self.telemetry.snapshot()
    }

    /// A label for the selected guardrail, degraded when the listing no
    /// longer has it.
    #[must_use]
    pub fn selection_label(&self) -> Option<String> {
        let token = self.selection.token()?;
        Some(resolve_for_display(token, &self.listing).label(token))
    }

    /// Send a user message and record the reply.
    ///
    /// The selected guardrail is forwarded as its decoded (id, version)
    /// pair whether or not the cached listing knows it; the service
    /// enforces it. Transport failures do not surface as `Err`; they become
    /// an [`TurnRole::Error`](super::TurnRole::Error) turn and leave the
    /// session id untouched. The returned turn is the one appended last.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `content` is blank.
    pub async fn submit_turn(&mut self, content: &str) -> Result<&Turn> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ValidationError::missing("content").into());
        }

        let history = if self.mode == ChatMode::Model {
            self.transcript
                .dialogue()
                .map(|t| HistoryMessage {
                    role: t.role,
                    content: t.content.clone(),
                })
                .collect()
        } else {
            Vec::new()
        };
        self.transcript.push(Turn::user(content));

        let request = TurnRequest {
            mode: self.mode,
            content: content.to_owned(),
            history,
            session_id: self.transcript.session_id().map(ToOwned::to_owned),
            guardrail: self.request_guardrail(),
        };
        let span = Telemetry::turn_span(self.mode, request.session_id.as_deref());
        let result = self.backend.submit(&request).instrument(span).await;

        let turn = match result {
            Ok(reply) => {
                self.transcript.adopt_session_id(reply.session_id);
                self.telemetry
                    .record_turn(self.mode, reply.citations.len());
                Turn::assistant(reply.answer, reply.citations)
            }
            Err(e) => {
                warn!(mode = self.mode.as_str(), error = %e, "turn failed");
                self.telemetry.record_error(&e.to_string());
                Turn::error(e.to_string())
            }
        };
        Ok(self.transcript.push(turn))
    }

    /// Clear the transcript and session id.
    pub fn reset_session(&mut self) {
        debug!(session_id = ?self.transcript.session_id(), "resetting session");
        self.transcript.reset(&self.options.welcome_message);
    }

    /// Choose a guardrail token, or clear the choice with `None`.
    ///
    /// The token is not checked here; enforcement resolves it strictly.
    pub fn select_guardrail(&mut self, token: Option<&str>) -> Transition {
        match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => self.selection.select(token),
            None => self.selection.clear(),
        }
    }

    /// Switch the chat mode. Switching starts a new session, so with a
    /// conversation in progress it needs `confirmed`.
    pub fn switch_mode(&mut self, mode: ChatMode, confirmed: bool) -> Transition {
        if mode == self.mode {
            return Transition::Ignored;
        }
        if self.transcript.has_conversation() && !confirmed {
            return Transition::NeedsConfirmation;
        }
        info!(from = self.mode.as_str(), to = mode.as_str(), "switching mode");
        self.mode = mode;
        self.reset_session();
        Transition::Done
    }

    /// Flip source expansion on the turn at `index`. See
    /// [`Transcript::toggle_sources`].
    pub fn toggle_source_expansion(&mut self, index: usize) -> Option<bool> {
        self.transcript.toggle_sources(index)
    }

    /// Attach the selected guardrail to the configured target.
    ///
    /// A successful change starts a new session, so with a conversation in
    /// progress it needs `confirmed`. Re-applying an applied selection that
    /// the target still reports is a no-op returning [`Transition::Done`].
    /// Returns [`Transition::NeedsConfirmation`] or [`Transition::Ignored`]
    /// without side effects when the apply does not start.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no target is configured,
    /// [`Error::UnknownGuardrail`] / [`Error::UnknownVersion`] if the token
    /// does not resolve against the listing, and [`Error::ApplyFailed`] if
    /// the target rejects it. The selection records the failure either way.
    pub async fn apply_selection(&mut self, confirmed: bool) -> Result<Transition> {
        let Some(binding) = self.target.clone() else {
            return Err(Error::config("no guardrail target configured"));
        };
        // Nothing else can hold `&mut self`, so a leftover Applying state
        // belongs to a dropped future.
        self.selection.abandon_apply();

        if let SelectionState::Applied(token) = &self.selection {
            let token = token.clone();
            match binding.target.current_guardrail(&binding.target_id).await {
                Ok(current) if current.is(&decode_token(&token)) => {
                    debug!(token, "guardrail already applied");
                    return Ok(Transition::Done);
                }
                Ok(_) => debug!(token, "target changed since apply"),
                Err(e) => warn!(token, error = %e, "could not read current guardrail"),
            }
            self.selection.select(token);
        }

        let transition = self
            .selection
            .begin_apply(self.transcript.has_conversation(), confirmed);
        if transition != Transition::Done {
            return Ok(transition);
        }
        let token = self.selection.token().unwrap_or_default().to_owned();

        let result = match resolve(&token, &self.listing).map(|r| r.reference()) {
            Ok(reference) => {
                let span = Telemetry::apply_span(&binding.target_id, &token);
                apply_to_target(binding.target.as_ref(), &binding.target_id, &reference)
                    .instrument(span)
                    .await
            }
            Err(e) => Err(e),
        };
        self.selection.finish_apply(&result);

        match result? {
            ApplyOutcome::Attached | ApplyOutcome::Detached => {
                self.telemetry.record_guardrail_change(&token);
                self.reset_session();
            }
            ApplyOutcome::Unchanged => debug!(token, "guardrail already applied"),
        }
        Ok(Transition::Done)
    }

    /// Replace the cached listing.
    ///
    /// Returns `true` if the applied guardrail vanished and the selection
    /// fell back to [`SelectionState::Selected`].
    pub fn refresh_listing(&mut self, identities: Vec<GuardrailIdentity>) -> bool {
        debug!(identities = identities.len(), "guardrail listing refreshed");
        self.listing = identities;
        self.selection.abandon_apply();
        self.selection.refresh(&self.listing)
    }

    fn request_guardrail(&self) -> Option<GuardrailRef> {
        if self.mode == ChatMode::Agent && !self.options.agent_request_guardrails {
            return None;
        }
        let token = self.selection.token()?;
        let reference = decode_token(token);
        if let Err(e) = resolve(token, &self.listing) {
            // Listings may carry an identity without version detail.
            let undetailed = self
                .listing
                .iter()
                .any(|i| i.id() == reference.id && i.versions().is_empty());
            if !undetailed {
                warn!(token, error = %e, "selected guardrail is not in the cached listing");
            }
        }
        Some(reference)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::TransportError;
    use crate::guardrail::{GuardrailRegistry, InMemoryTarget};
    use crate::session::{Citation, SourceReference, TurnReply, TurnRole};

    /// Replays canned replies and records every request.
    struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<TurnReply>>>,
        requests: Mutex<Vec<TurnRequest>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<TurnReply>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::default(),
            })
        }

        fn requests(&self) -> Vec<TurnRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn submit(&self, request: &TurnRequest) -> Result<TurnReply> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(TurnReply::default()))
        }
    }

    fn reply(session_id: Option<&str>, answer: &str) -> Result<TurnReply> {
        Ok(TurnReply {
            session_id: session_id.map(ToOwned::to_owned),
            answer: answer.to_owned(),
            citations: Vec::new(),
        })
    }

    fn listing() -> Vec<GuardrailIdentity> {
        let mut registry = GuardrailRegistry::with_presets("dev").unwrap();
        registry.publish("dev-full").unwrap();
        registry.list_identities().to_vec()
    }

    #[tokio::test]
    async fn test_session_continuity() {
        let backend = ScriptedBackend::new(vec![
            reply(Some("s1"), "first"),
            reply(None, "second"),
            reply(Some("s2"), "third"),
        ]);
        let mut conversation = Conversation::new(Arc::<ScriptedBackend>::clone(&backend), ConversationOptions::default());

        conversation.submit_turn("one").await.unwrap();
        assert_eq!(conversation.session_id(), Some("s1"));
        conversation.submit_turn("two").await.unwrap();
        assert_eq!(conversation.session_id(), Some("s1"));
        conversation.submit_turn("three").await.unwrap();
        assert_eq!(conversation.session_id(), Some("s2"));

        let sent: Vec<_> = backend
            .requests()
            .into_iter()
            .map(|r| r.session_id)
            .collect();
        assert_eq!(sent, [None, Some("s1".into()), Some("s1".into())]);
    }

    #[tokio::test]
    async fn test_model_history_excludes_system_turns() {
        let backend = ScriptedBackend::new(vec![reply(Some("s1"), "hello back")]);
        let mut conversation = Conversation::new(Arc::<ScriptedBackend>::clone(&backend), ConversationOptions::default());
        conversation.submit_turn("hello").await.unwrap();
        conversation.submit_turn("again").await.unwrap();

        let requests = backend.requests();
        assert!(requests[0].history.is_empty());
        let roles: Vec<_> = requests[1].history.iter().map(|m| m.role).collect();
        assert_eq!(roles, [TurnRole::User, TurnRole::Assistant]);
        assert_eq!(requests[1].content, "again");
    }

    #[tokio::test]
    async fn test_session_reset() {
        let backend = ScriptedBackend::new(vec![reply(Some("s1"), "answer")]);
        let mut conversation = Conversation::new(backend, ConversationOptions::default());
        conversation.submit_turn("question").await.unwrap();
        assert_eq!(conversation.transcript().turns().len(), 3);

        conversation.reset_session();
        let turns = conversation.transcript().turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, TurnRole::System);
        assert_eq!(turns[0].content, DEFAULT_WELCOME_MESSAGE);
        assert_eq!(conversation.session_id(), None);
    }

    #[tokio::test]
    async fn test_transport_error_becomes_error_turn() {
        let backend = ScriptedBackend::new(vec![
            reply(Some("s1"), "ok"),
            Err(TransportError::http_status(502, "Bad Gateway").into()),
        ]);
        let mut conversation = Conversation::new(backend, ConversationOptions::default());
        conversation.submit_turn("one").await.unwrap();

        let turn = conversation.submit_turn("two").await.unwrap();
        assert_eq!(turn.role, TurnRole::Error);
        assert!(turn.content.contains("Bad Gateway"));
        assert_eq!(conversation.session_id(), Some("s1"));
        assert_eq!(conversation.metrics().errors, 1);
        assert_eq!(conversation.metrics().turns, 1);
    }

    #[tokio::test]
    async fn test_blank_input_rejected() {
        let backend = ScriptedBackend::new(vec![]);
        let mut conversation = Conversation::new(Arc::<ScriptedBackend>::clone(&backend), ConversationOptions::default());
        let err = conversation.submit_turn("   ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_guardrail_forwarding_by_mode() {
        let backend = ScriptedBackend::new(vec![]);
        let mut conversation = Conversation::new(Arc::<ScriptedBackend>::clone(&backend), ConversationOptions::default())
            .with_mode(ChatMode::KnowledgeBase);
        conversation.refresh_listing(listing());
        conversation.select_guardrail(Some("dev-full:1"));

        conversation.submit_turn("kb question").await.unwrap();
        conversation.switch_mode(ChatMode::Agent, true);
        conversation.submit_turn("agent question").await.unwrap();

        let requests = backend.requests();
        assert_eq!(
            requests[0].guardrail,
            Some(GuardrailRef::new("dev-full", "1"))
        );
        assert_eq!(requests[1].guardrail, None);
    }

    #[tokio::test]
    async fn test_agent_forwards_when_enabled() {
        let backend = ScriptedBackend::new(vec![]);
        let options = ConversationOptions {
            agent_request_guardrails: true,
            ..ConversationOptions::default()
        };
        let mut conversation =
            Conversation::new(Arc::<ScriptedBackend>::clone(&backend), options).with_mode(ChatMode::Agent);
        conversation.refresh_listing(listing());
        conversation.select_guardrail(Some("dev-basic"));
        conversation.submit_turn("hi").await.unwrap();

        assert_eq!(
            backend.requests()[0].guardrail,
            Some(GuardrailRef::draft("dev-basic"))
        );
    }

    #[tokio::test]
    async fn test_unlisted_selection_is_still_forwarded() {
        let backend = ScriptedBackend::new(vec![reply(Some("s1"), "answer")]);
        let mut conversation = Conversation::new(Arc::<ScriptedBackend>::clone(&backend), ConversationOptions::default());
        conversation.refresh_listing(listing());
        conversation.select_guardrail(Some("dev-full:7"));

        let turn = conversation.submit_turn("hi").await.unwrap();
        assert_eq!(turn.role, TurnRole::Assistant);
        assert_eq!(
            backend.requests()[0].guardrail,
            Some(GuardrailRef::new("dev-full", "7"))
        );
        assert_eq!(
            conversation.selection_label().as_deref(),
            Some("dev-full (DRAFT, requested 7)")
        );
    }

    #[tokio::test]
    async fn test_listing_without_versions_forwards_draft() {
        let backend = ScriptedBackend::new(vec![reply(Some("s1"), "answer")]);
        let mut conversation = Conversation::new(Arc::<ScriptedBackend>::clone(&backend), ConversationOptions::default());
        conversation.refresh_listing(vec![GuardrailIdentity::from_parts(
            "gr-basic",
            "basic",
            Vec::new(),
        )]);
        conversation.select_guardrail(Some("gr-basic"));

        let turn = conversation.submit_turn("hi").await.unwrap();
        assert_eq!(turn.role, TurnRole::Assistant);
        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].guardrail, Some(GuardrailRef::draft("gr-basic")));
    }

    #[tokio::test]
    async fn test_selection_forwarded_without_listing() {
        let backend = ScriptedBackend::new(vec![]);
        let mut conversation = Conversation::new(Arc::<ScriptedBackend>::clone(&backend), ConversationOptions::default());
        conversation.select_guardrail(Some("gr1:2"));
        conversation.submit_turn("hi").await.unwrap();
        assert_eq!(
            backend.requests()[0].guardrail,
            Some(GuardrailRef::new("gr1", "2"))
        );
    }

    #[tokio::test]
    async fn test_switch_mode_needs_confirmation() {
        let backend = ScriptedBackend::new(vec![reply(Some("s1"), "answer")]);
        let mut conversation = Conversation::new(backend, ConversationOptions::default());
        assert_eq!(conversation.switch_mode(ChatMode::Model, false), Transition::Ignored);
        conversation.submit_turn("question").await.unwrap();

        assert_eq!(
            conversation.switch_mode(ChatMode::KnowledgeBase, false),
            Transition::NeedsConfirmation
        );
        assert_eq!(conversation.mode(), ChatMode::Model);
        assert_eq!(
            conversation.switch_mode(ChatMode::KnowledgeBase, true),
            Transition::Done
        );
        assert_eq!(conversation.mode(), ChatMode::KnowledgeBase);
        assert_eq!(conversation.session_id(), None);
    }

    #[tokio::test]
    async fn test_apply_selection_flow() {
        let backend = ScriptedBackend::new(vec![reply(Some("s1"), "answer")]);
        let target = Arc::new(InMemoryTarget::new());
        let mut conversation = Conversation::new(backend, ConversationOptions::default())
            .with_target(Arc::<InMemoryTarget>::clone(&target), "agent-1");
        conversation.refresh_listing(listing());
        conversation.submit_turn("question").await.unwrap();
        conversation.select_guardrail(Some("dev-full:1"));

        assert_eq!(
            conversation.apply_selection(false).await.unwrap(),
            Transition::NeedsConfirmation
        );
        assert_eq!(target.writes(), 0);

        assert_eq!(
            conversation.apply_selection(true).await.unwrap(),
            Transition::Done
        );
        assert_eq!(
            conversation.selection(),
            &SelectionState::Applied("dev-full:1".into())
        );
        assert_eq!(target.writes(), 1);
        assert_eq!(conversation.session_id(), None);
        assert_eq!(conversation.metrics().guardrail_changes, 1);

        // Re-applying what the target already has succeeds without a write.
        conversation.submit_turn("another question").await.unwrap();
        assert_eq!(
            conversation.apply_selection(false).await.unwrap(),
            Transition::Done
        );
        assert_eq!(
            conversation.selection(),
            &SelectionState::Applied("dev-full:1".into())
        );
        assert_eq!(target.writes(), 1);
        assert!(conversation.transcript().has_conversation());
        assert_eq!(conversation.metrics().guardrail_changes, 1);

        // Vanishing from the listing demotes the applied selection.
        assert!(conversation.refresh_listing(Vec::new()));
        assert_eq!(
            conversation.selection(),
            &SelectionState::Selected("dev-full:1".into())
        );
    }

    #[tokio::test]
    async fn test_apply_failure_is_recorded() {
        let backend = ScriptedBackend::new(vec![]);
        let target = Arc::new(InMemoryTarget::rejecting("agent is preparing"));
        let mut conversation = Conversation::new(backend, ConversationOptions::default())
            .with_target(target, "agent-1");
        conversation.refresh_listing(listing());
        conversation.select_guardrail(Some("dev-basic"));

        let err = conversation.apply_selection(false).await.unwrap_err();
        assert!(matches!(err, Error::ApplyFailed { .. }));
        assert!(matches!(
            conversation.selection(),
            SelectionState::ApplyFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_apply_without_target() {
        let backend = ScriptedBackend::new(vec![]);
        let mut conversation = Conversation::new(backend, ConversationOptions::default());
        conversation.select_guardrail(Some("dev-basic"));
        assert!(matches!(
            conversation.apply_selection(true).await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_toggle_source_expansion() {
        let backend = ScriptedBackend::new(vec![Ok(TurnReply {
            session_id: Some("s1".into()),
            answer: "cited".into(),
            citations: vec![Citation {
                text: "cited".into(),
                span: None,
                references: vec![SourceReference {
                    content: "passage".into(),
                    ..SourceReference::default()
                }],
            }],
        })]);
        let mut conversation = Conversation::new(backend, ConversationOptions::default());
        conversation.submit_turn("q").await.unwrap();

        assert_eq!(conversation.toggle_source_expansion(2), Some(true));
        assert!(conversation.transcript().turns()[2].sources_expanded);
        assert_eq!(conversation.toggle_source_expansion(1), None);
        assert_eq!(conversation.metrics().citations, 1);
    }
}
