//! REST client for the answering and guardrail-management services.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use crate::config::{AppConfig, DEFAULT_API_URL, HttpClientConfig, parse_api_url};
use crate::error::{Error, Result, TransportError};
use crate::guardrail::{CurrentGuardrail, GuardrailIdentity, GuardrailRef, GuardrailTarget};
use crate::session::{ChatBackend, ChatMode, TurnReply, TurnRequest};

use super::types::{
    AgentResponse, ApplyRequest, ApplyResponse, CurrentGuardrailResponse, ErrorBody,
    ListingResponse, ModelQueryRequest, QueryRequest, QueryResponse, decode_listing,
};

/// Client for the REST surface.
///
/// Implements [`ChatBackend`] for chat turns and [`GuardrailTarget`] for
/// agent guardrail association, so one client can drive a whole
/// [`Conversation`](crate::session::Conversation).
///
/// # Example
///
/// ```rust,ignore
/// use ragdesk::api::ApiClient;
///
/// let client = ApiClient::builder()
///     .base_url("https://abc123.execute-api.us-east-1.amazonaws.com/prod/")
///     .timeout_secs(30)
///     .build()?;
///
/// let identities = client.list_guardrails().await?;
/// ```
#[derive(Clone)]
pub struct ApiClient {
    http_client: reqwest::Client,
    base_url: Url,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a new client builder.
    #[must_use]
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Create a client from application config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid `api_url` and
    /// [`Error::Transport`] if the HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::builder()
            .base_url(&config.api_url)
            .http_config(config.http.clone())
            .build()
    }

    /// The API base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Fetch every guardrail with its version detail.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the request fails.
    #[instrument(skip(self))]
    pub async fn list_guardrails(&self) -> Result<Vec<GuardrailIdentity>> {
        let response: ListingResponse = self.get(&["guardrails"]).await?;
        let identities = decode_listing(response);
        debug!(count = identities.len(), "guardrail listing fetched");
        Ok(identities)
    }

    /// Attach a guardrail to an agent, or detach with `None`.
    ///
    /// Returns what the service reports as attached afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the request fails.
    #[instrument(skip(self))]
    pub async fn set_guardrail(
        &self,
        agent_id: &str,
        guardrail: Option<&GuardrailRef>,
    ) -> Result<CurrentGuardrail> {
        let body = ApplyRequest {
            agent_id,
            guardrail_id: guardrail.map(|g| g.id.as_str()),
            guardrail_version: guardrail.map(|g| g.version.as_str()),
        };
        let response: ApplyResponse = self
            .send(reqwest::Method::PUT, &["guardrails"], &body)
            .await?;
        if let Some(message) = &response.message {
            debug!(agent_id, message, "guardrail update acknowledged");
        }
        Ok(response.current_guardrail.into())
    }

    async fn query_model(&self, request: &TurnRequest) -> Result<TurnReply> {
        let body = ModelQueryRequest::new(
            &request.history,
            &request.content,
            request.session_id.as_deref(),
            request.guardrail.as_ref(),
        );
        let response: QueryResponse = self
            .send(reqwest::Method::POST, &["llm", "query"], &body)
            .await?;
        Ok(response.into())
    }

    async fn query_knowledge_base(&self, request: &TurnRequest) -> Result<TurnReply> {
        let body = QueryRequest::new(
            &request.content,
            request.session_id.as_deref(),
            request.guardrail.as_ref(),
        );
        let response: QueryResponse = self
            .send(reqwest::Method::POST, &["knowledge-base", "query"], &body)
            .await?;
        Ok(response.into())
    }

    async fn invoke_agent(&self, request: &TurnRequest) -> Result<TurnReply> {
        let body = QueryRequest::new(
            &request.content,
            request.session_id.as_deref(),
            request.guardrail.as_ref(),
        );
        let response: AgentResponse = self
            .send(reqwest::Method::POST, &["agent", "invoke"], &body)
            .await?;
        Ok(TurnReply::try_from(response)?)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::config(format!("'{}' cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(2);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.endpoint(segments)?;
        debug!(%url, "GET");
        let response = self
            .http_client
            .get(url)
            .headers(Self::headers())
            .send()
            .await?;
        Self::read(response).await
    }

    async fn send<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        segments: &[&str],
        body: &B,
    ) -> Result<T> {
        let url = self.endpoint(segments)?;
        debug!(%method, %url, "sending request");
        let response = self
            .http_client
            .request(method, url)
            .headers(Self::headers())
            .json(body)
            .send()
            .await?;
        Self::read(response).await
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.error)
                .unwrap_or_else(|_| {
                    if text.is_empty() {
                        status.canonical_reason().unwrap_or("request failed").to_owned()
                    } else {
                        text
                    }
                });
            return Err(TransportError::http_status(status.as_u16(), message).into());
        }
        serde_json::from_str(&text).map_err(|e| {
            TransportError::decode(format!("unexpected response body: {e}")).into()
        })
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn submit(&self, request: &TurnRequest) -> Result<TurnReply> {
        debug!(
            mode = request.mode.as_str(),
            guardrail = ?request.guardrail,
            history = request.history.len(),
            "submitting turn"
        );
        match request.mode {
            ChatMode::Model => self.query_model(request).await,
            ChatMode::KnowledgeBase => self.query_knowledge_base(request).await,
            ChatMode::Agent => self.invoke_agent(request).await,
        }
    }
}

#[async_trait]
impl GuardrailTarget for ApiClient {
    async fn current_guardrail(&self, target_id: &str) -> Result<CurrentGuardrail> {
        let response: CurrentGuardrailResponse = self.get(&["guardrails", target_id]).await?;
        if let Some(agent_id) = response.agent_id.as_deref() {
            if agent_id != target_id {
                debug!(target_id, agent_id, "service answered for a different agent id");
            }
        }
        Ok(response.guardrail.into())
    }

    async fn attach_guardrail(&self, target_id: &str, guardrail: &GuardrailRef) -> Result<()> {
        self.set_guardrail(target_id, Some(guardrail))
            .await
            .map(|_| ())
            .map_err(|e| Error::apply_failed(target_id, e.to_string()))
    }

    async fn detach_guardrail(&self, target_id: &str) -> Result<()> {
        self.set_guardrail(target_id, None)
            .await
            .map(|_| ())
            .map_err(|e| Error::apply_failed(target_id, e.to_string()))
    }
}

/// Builder for [`ApiClient`].
#[derive(Debug, Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    http: HttpClientConfig,
}

impl ApiClientBuilder {
    /// Set the base URL. A path prefix such as a deployment stage is kept.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the request timeout in seconds.
    #[must_use]
    pub const fn timeout_secs(mut self, timeout: u64) -> Self {
        self.http.timeout_secs = Some(timeout);
        self
    }

    /// Replace the HTTP settings wholesale.
    #[must_use]
    pub fn http_config(mut self, http: HttpClientConfig) -> Self {
        self.http = http;
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a base URL that is not an absolute
    /// http(s) URL and [`Error::Transport`] if the HTTP client cannot be
    /// built.
    pub fn build(self) -> Result<ApiClient> {
        let base_url = parse_api_url(self.base_url.as_deref().unwrap_or(DEFAULT_API_URL))?;
        Ok(ApiClient {
            http_client: self.http.build_client()?,
            base_url,
        })
    }
}
