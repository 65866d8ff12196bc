//! Application configuration.
//!
//! Values are layered: built-in defaults, then a JSON file, then
//! environment variables. The CLI applies its flags last.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result, TransportError};
use crate::session::{ChatMode, ConversationOptions, DEFAULT_WELCOME_MESSAGE};

/// Default API base URL (local development server).
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Environment variable overriding [`AppConfig::api_url`].
pub const ENV_API_URL: &str = "RAGDESK_API_URL";
/// Environment variable overriding [`AppConfig::agent_id`].
pub const ENV_AGENT_ID: &str = "RAGDESK_AGENT_ID";

const CONFIG_FILE: &str = "config.json";

/// Shared HTTP client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// User agent string.
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Some(60),
            user_agent: Some(concat!("ragdesk/", env!("CARGO_PKG_VERSION")).to_owned()),
        }
    }
}

impl HttpClientConfig {
    /// Build a reqwest client with this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the TLS backend cannot be initialised.
    pub fn build_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = self.timeout_secs {
            builder = builder.timeout(std::time::Duration::from_secs(timeout));
        }

        if let Some(ref user_agent) = self.user_agent {
            builder = builder.user_agent(user_agent);
        }

        builder
            .build()
            .map_err(|e| TransportError::network(format!("failed to build HTTP client: {e}")).into())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the REST surface.
    pub api_url: String,
    /// Agent that guardrails are applied to.
    pub agent_id: Option<String>,
    /// Mode a new chat starts in.
    pub default_mode: ChatMode,
    /// System turn shown at the start of every session.
    pub welcome_message: String,
    /// Forward the selected guardrail on agent turns.
    pub agent_request_guardrails: bool,
    /// Environment name used to prefix deployed presets.
    pub environment: String,
    /// HTTP client settings.
    pub http: HttpClientConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            agent_id: None,
            default_mode: ChatMode::default(),
            welcome_message: DEFAULT_WELCOME_MESSAGE.to_owned(),
            agent_request_guardrails: false,
            environment: "dev".to_owned(),
            http: HttpClientConfig::default(),
        }
    }
}

/// Parse an API base URL.
///
/// # Errors
///
/// Returns [`Error::Config`] unless `raw` is an absolute http(s) URL that
/// can carry a path.
pub fn parse_api_url(raw: &str) -> Result<Url> {
    let url =
        Url::parse(raw).map_err(|e| Error::config(format!("invalid API URL '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" if !url.cannot_be_a_base() => Ok(url),
        "http" | "https" => Err(Error::config(format!("'{raw}' is not a base URL"))),
        other => Err(Error::config(format!(
            "API URL must use http or https, not '{other}'"
        ))),
    }
}

/// Directory holding the config file, e.g. `~/.config/ragdesk`.
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs_next::config_dir()
        .or_else(dirs_next::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ragdesk")
}

/// Default config file path.
#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one the default path is read
    /// if present, else defaults are used. Environment overrides apply
    /// either way.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = config_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    debug!(path = %default.display(), "no config file, using defaults");
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read a JSON config file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = serde_json::from_str(&content).map_err(|e| {
            Error::config(format!("failed to parse {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Write the config as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] or [`Error::Json`] on failure.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.is_empty()) {
            self.api_url = url;
        }
        if let Some(agent_id) = lookup(ENV_AGENT_ID).filter(|v| !v.is_empty()) {
            self.agent_id = Some(agent_id);
        }
    }

    /// The parsed API base URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] unless `api_url` is an absolute http(s) URL.
    pub fn api_base(&self) -> Result<Url> {
        parse_api_url(&self.api_url)
    }

    /// Check the configuration for errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.api_base()?;
        if self.agent_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(Error::config("agent_id must not be blank"));
        }
        if self.environment.trim().is_empty() {
            return Err(Error::config("environment must not be blank"));
        }
        if self.http.timeout_secs == Some(0) {
            return Err(Error::config("http.timeout_secs must be positive"));
        }
        Ok(())
    }

    /// Controller options derived from this config.
    #[must_use]
    pub fn conversation_options(&self) -> ConversationOptions {
        ConversationOptions {
            welcome_message: self.welcome_message.clone(),
            agent_request_guardrails: self.agent_request_guardrails,
        }
    }
}
