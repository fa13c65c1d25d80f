//! Recall.ai HTTP client.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{BotClient, CreateBotRequest, ExternalBot, ExternalTranscript};
use crate::error::{ProviderError, ProviderResult};
use crate::http;
use crate::provider::BoxFuture;

const RECALL_API_BASE: &str = "https://api.recall.ai/api/v1";

/// Bot name used when a request does not set one.
pub const DEFAULT_BOT_NAME: &str = "Post-Meeting Assistant";

/// Configuration for the Recall client.
#[derive(Clone)]
pub struct RecallConfig {
    pub api_key: String,
    pub base_url: String,
    pub default_bot_name: String,
    pub timeout: Duration,
}

impl RecallConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: RECALL_API_BASE.to_string(),
            default_bot_name: DEFAULT_BOT_NAME.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_default_bot_name(mut self, name: impl Into<String>) -> Self {
        self.default_bot_name = name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for RecallConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecallConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("default_bot_name", &self.default_bot_name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// HTTP client for the Recall.ai bot API.
#[derive(Debug, Clone)]
pub struct RecallClient {
    config: RecallConfig,
    http_client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct CreateBotBody<'a> {
    meeting_url: &'a str,
    bot_name: &'a str,
    auto_join: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    meeting_start_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiBot {
    id: String,
    status: Option<String>,
    recording_started_at: Option<String>,
    recording_ended_at: Option<String>,
    transcript: Option<ApiTranscriptRef>,
}

#[derive(Debug, Deserialize)]
struct ApiTranscriptRef {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiTranscript {
    id: Option<String>,
    status: Option<String>,
    transcript: Option<String>,
    summary: Option<String>,
    duration_seconds: Option<f64>,
    participant_count: Option<u32>,
    #[serde(default)]
    participants: Vec<String>,
}

/// Parses a service timestamp, dropping (with a warning) what cannot be read.
fn parse_timestamp(bot_id: &str, field: &str, value: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = value.filter(|v| !v.is_empty())?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            warn!(bot_id, field, value = raw, error = %e, "ignoring unparseable timestamp");
            None
        }
    }
}

impl From<ApiBot> for ExternalBot {
    fn from(bot: ApiBot) -> Self {
        let started_at = parse_timestamp(
            &bot.id,
            "recording_started_at",
            bot.recording_started_at.as_deref(),
        );
        let ended_at = parse_timestamp(
            &bot.id,
            "recording_ended_at",
            bot.recording_ended_at.as_deref(),
        );
        let transcript_available = bot
            .transcript
            .and_then(|t| t.id)
            .is_some_and(|id| !id.is_empty());
        Self {
            id: bot.id,
            status: bot.status,
            started_at,
            ended_at,
            transcript_available,
        }
    }
}

impl From<ApiTranscript> for ExternalTranscript {
    fn from(t: ApiTranscript) -> Self {
        Self {
            id: t.id,
            status: t.status,
            content: t.transcript,
            summary: t.summary,
            duration_seconds: t
                .duration_seconds
                .filter(|d| d.is_finite() && *d >= 0.0)
                .map(|d| d.round() as u64),
            participant_count: t.participant_count,
            participants: t.participants,
        }
    }
}

impl RecallClient {
    pub fn new(config: RecallConfig) -> ProviderResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::configuration("recall api_key is not configured")
                .with_provider("recall"));
        }
        let http_client = http::build_client(config.timeout)?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header(
            reqwest::header::AUTHORIZATION,
            format!("Token {}", self.config.api_key),
        )
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> ProviderResult<T> {
        let (status, body) = http::execute(self.authorize(request))
            .await
            .map_err(|e| e.with_provider("recall"))?;

        if !status.is_success() {
            return Err(http::status_error(
                status,
                format!("{} failed ({}): {}", what, status, http::snippet(&body)),
            )
            .with_provider("recall"));
        }

        http::parse_json(&body, what).map_err(|e| e.with_provider("recall"))
    }

    fn bot_url(&self, bot_id: &str, suffix: &str) -> String {
        format!(
            "{}/bots/{}/{}",
            self.config.base_url,
            urlencoding::encode(bot_id),
            suffix
        )
    }

    async fn create(&self, request: &CreateBotRequest) -> ProviderResult<ExternalBot> {
        let body = CreateBotBody {
            meeting_url: &request.meeting_url,
            bot_name: request
                .bot_name
                .as_deref()
                .unwrap_or(&self.config.default_bot_name),
            auto_join: true,
            meeting_start_time: request.meeting_start_time.map(|t| t.to_rfc3339()),
        };
        let url = format!("{}/bots/", self.config.base_url);
        let bot: ApiBot = self
            .send(self.http_client.post(&url).json(&body), "create bot")
            .await?;
        info!(bot_id = %bot.id, meeting_url = %request.meeting_url, "created bot");
        Ok(bot.into())
    }

    async fn fetch_bot(&self, bot_id: &str) -> ProviderResult<ExternalBot> {
        let bot: ApiBot = self
            .send(self.http_client.get(self.bot_url(bot_id, "")), "get bot")
            .await?;
        debug!(bot_id, status = ?bot.status, "fetched bot");
        Ok(bot.into())
    }

    async fn fetch_transcript(&self, bot_id: &str) -> ProviderResult<ExternalTranscript> {
        let transcript: ApiTranscript = self
            .send(
                self.http_client.get(self.bot_url(bot_id, "transcript/")),
                "get transcript",
            )
            .await?;
        Ok(transcript.into())
    }
}

impl BotClient for RecallClient {
    fn create_bot<'a>(
        &'a self,
        request: &'a CreateBotRequest,
    ) -> BoxFuture<'a, ProviderResult<ExternalBot>> {
        Box::pin(self.create(request))
    }

    fn get_bot<'a>(&'a self, bot_id: &'a str) -> BoxFuture<'a, ProviderResult<ExternalBot>> {
        Box::pin(self.fetch_bot(bot_id))
    }

    fn get_transcript<'a>(
        &'a self,
        bot_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<ExternalTranscript>> {
        Box::pin(self.fetch_transcript(bot_id))
    }
}
