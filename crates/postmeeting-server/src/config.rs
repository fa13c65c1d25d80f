//! Server configuration.
//!
//! All settings live in a single `config.toml`, by default at
//! `~/.config/postmeeting/config.toml`. Secret values (`client_secret`,
//! `api_key`, `cron_secret`) accept `pass::` and `env::` references.
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//! cron_secret = "env::CRON_SECRET"
//!
//! [google]
//! client_id = "xxx.apps.googleusercontent.com"
//! client_secret = "pass::postmeeting/google"
//!
//! [recall]
//! api_key = "env::RECALL_API_KEY"
//!
//! [scheduler]
//! enabled = true
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use postmeeting_core::{TracingConfig, TracingOutputFormat};
use postmeeting_providers::{
    FacebookConfig, GoogleConfig, LinkedInConfig, OAuthCredentials, OpenAiConfig, RecallConfig,
};
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};
use crate::poller::DEFAULT_POLL_CONCURRENCY;
use crate::scheduler::SchedulerConfig;
use crate::secret;

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: HttpSettings,
    pub google: Option<OAuthSettings>,
    pub linkedin: Option<OAuthSettings>,
    pub facebook: Option<OAuthSettings>,
    pub recall: Option<RecallSettings>,
    pub openai: Option<OpenAiSettings>,
    pub scheduler: SchedulerSettings,
    pub logging: LoggingSettings,
}

/// `[server]`
///
/// User routes take the caller's identity from the `X-User-Id` header as
/// is. The service must therefore only be reachable through a proxy that
/// authenticates the session and sets that header itself. Binding to a
/// non-loopback address is refused unless `allow_remote` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Listen address, loopback by default.
    pub bind: SocketAddr,
    /// Permits a non-loopback `bind`. Only set this when every request
    /// reaches the service through an authenticating proxy that overwrites
    /// `X-User-Id`.
    pub allow_remote: bool,
    /// Base URL of the frontend that receives OAuth redirects. Redirect URIs
    /// are `{redirect_base}/connections/{provider}/callback`.
    pub redirect_base: String,
    /// Bearer secret for the cron routes. Cron routes are refused when unset.
    pub cron_secret: Option<String>,
    /// JSON snapshot of the store. Defaults to the data directory.
    pub store_path: Option<PathBuf>,
    /// Keep everything in memory only.
    pub in_memory: bool,
    pub poll_concurrency: usize,
    /// How long an authorization URL stays redeemable.
    pub oauth_state_ttl_secs: u64,
    /// Timeout for outgoing provider requests.
    pub request_timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            allow_remote: false,
            redirect_base: "http://localhost:3000".to_string(),
            cron_secret: None,
            store_path: None,
            in_memory: false,
            poll_concurrency: DEFAULT_POLL_CONCURRENCY,
            oauth_state_ttl_secs: 600,
            request_timeout_secs: 30,
        }
    }
}

impl HttpSettings {
    /// Fails when `bind` is reachable from other hosts without `allow_remote`.
    pub fn check_exposure(&self) -> ServerResult<()> {
        if self.bind.ip().is_loopback() || self.allow_remote {
            return Ok(());
        }
        Err(ServerError::config(format!(
            "refusing to listen on {}: X-User-Id is trusted as sent, \
             set [server] allow_remote = true only behind an authenticating proxy",
            self.bind
        )))
    }
}

/// `[google]`, `[linkedin]`, `[facebook]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Overrides the consent page URL.
    pub auth_url: Option<String>,
    /// Overrides the token endpoint.
    pub token_url: Option<String>,
    /// Overrides the API base URL (Graph base for Facebook).
    pub api_base: Option<String>,
}

/// `[recall]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub bot_name: Option<String>,
}

/// `[openai]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

/// `[scheduler]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub poll_interval_secs: u64,
    pub join_interval_secs: u64,
    pub jitter: f64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_secs: 300,
            join_interval_secs: 60,
            jitter: 0.1,
        }
    }
}

impl SchedulerSettings {
    pub fn poll_config(&self) -> SchedulerConfig {
        SchedulerConfig::new(Duration::from_secs(self.poll_interval_secs.max(1)))
            .with_jitter(self.jitter)
    }

    pub fn join_config(&self) -> SchedulerConfig {
        SchedulerConfig::new(Duration::from_secs(self.join_interval_secs.max(1)))
            .with_jitter(self.jitter)
    }
}

/// `[logging]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `pretty`, `compact` or `json`.
    pub format: String,
    /// Filter directive used when `RUST_LOG` is unset.
    pub filter: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
            filter: None,
        }
    }
}

impl LoggingSettings {
    pub fn tracing_config(&self) -> ServerResult<TracingConfig> {
        let format: TracingOutputFormat = self
            .format
            .parse()
            .map_err(|e| ServerError::config(format!("[logging] {}", e)))?;
        let mut config = TracingConfig::server().with_format(format);
        if let Some(filter) = &self.filter {
            config = config.with_env_filter(filter.clone());
        }
        Ok(config)
    }
}

impl ServerConfig {
    /// Loads `path`, or the default path when `None`. A missing default file
    /// yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> ServerResult<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> ServerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServerError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> ServerResult<Self> {
        toml::from_str(content)
            .map_err(|e| ServerError::config(format!("failed to parse config: {}", e)))
    }

    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("postmeeting")
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("postmeeting")
    }

    /// Where the store snapshot lives, or `None` for in-memory operation.
    pub fn store_path(&self) -> Option<PathBuf> {
        if self.server.in_memory {
            return None;
        }
        Some(
            self.server
                .store_path
                .clone()
                .unwrap_or_else(|| Self::default_data_dir().join("store.json")),
        )
    }

    pub fn cron_secret(&self) -> ServerResult<Option<String>> {
        secret::resolve_optional(self.server.cron_secret.as_deref())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs.max(1))
    }

    pub fn oauth_state_ttl(&self) -> Duration {
        Duration::from_secs(self.server.oauth_state_ttl_secs)
    }

    pub fn google_config(&self) -> ServerResult<Option<GoogleConfig>> {
        let Some(settings) = &self.google else {
            return Ok(None);
        };
        let mut config = GoogleConfig::new(settings.credentials("google")?)
            .with_timeout(self.request_timeout());
        if let Some(url) = &settings.auth_url {
            config = config.with_auth_url(url);
        }
        if let Some(url) = &settings.token_url {
            config = config.with_token_url(url);
        }
        if let Some(url) = &settings.api_base {
            config = config.with_api_base(url);
        }
        Ok(Some(config))
    }

    pub fn linkedin_config(&self) -> ServerResult<Option<LinkedInConfig>> {
        let Some(settings) = &self.linkedin else {
            return Ok(None);
        };
        let mut config = LinkedInConfig::new(settings.credentials("linkedin")?)
            .with_timeout(self.request_timeout());
        if let Some(url) = &settings.auth_url {
            config.auth_url = url.clone();
        }
        if let Some(url) = &settings.token_url {
            config = config.with_token_url(url);
        }
        if let Some(url) = &settings.api_base {
            config = config.with_api_base(url);
        }
        Ok(Some(config))
    }

    pub fn facebook_config(&self) -> ServerResult<Option<FacebookConfig>> {
        let Some(settings) = &self.facebook else {
            return Ok(None);
        };
        let mut config = FacebookConfig::new(settings.credentials("facebook")?)
            .with_timeout(self.request_timeout());
        if let Some(url) = &settings.auth_url {
            config.auth_url = url.clone();
        }
        if let Some(url) = &settings.api_base {
            config = config.with_graph_base(url);
        }
        Ok(Some(config))
    }

    pub fn recall_config(&self) -> ServerResult<Option<RecallConfig>> {
        let Some(settings) = &self.recall else {
            return Ok(None);
        };
        let api_key = secret::resolve_optional(settings.api_key.as_deref())?
            .ok_or_else(|| ServerError::config("[recall] api_key is required"))?;
        let mut config = RecallConfig::new(api_key).with_timeout(self.request_timeout());
        if let Some(url) = &settings.base_url {
            config = config.with_base_url(url);
        }
        if let Some(name) = &settings.bot_name {
            config = config.with_default_bot_name(name);
        }
        Ok(Some(config))
    }

    pub fn openai_config(&self) -> ServerResult<Option<OpenAiConfig>> {
        let Some(settings) = &self.openai else {
            return Ok(None);
        };
        let api_key = secret::resolve_optional(settings.api_key.as_deref())?
            .ok_or_else(|| ServerError::config("[openai] api_key is required"))?;
        let mut config = OpenAiConfig::new(api_key);
        if let Some(url) = &settings.base_url {
            config = config.with_base_url(url);
        }
        if let Some(model) = &settings.model {
            config = config.with_model(model);
        }
        Ok(Some(config))
    }
}

impl OAuthSettings {
    /// Resolves and validates the client credentials of `[section]`.
    pub(crate) fn credentials(&self, section: &str) -> ServerResult<OAuthCredentials> {
        let client_id = secret::resolve_optional(self.client_id.as_deref())?.unwrap_or_default();
        let client_secret =
            secret::resolve_optional(self.client_secret.as_deref())?.unwrap_or_default();
        let credentials = OAuthCredentials::new(client_id, client_secret);
        credentials
            .validate()
            .map_err(|e| ServerError::config(format!("[{}] {}", section, e)))?;
        Ok(credentials)
    }
}
