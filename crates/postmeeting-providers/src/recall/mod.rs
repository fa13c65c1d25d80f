//! Meeting recording bots (Recall.ai).
//!
//! [`BotClient`] is the seam the poller and the meeting service use;
//! [`RecallClient`] is the HTTP implementation.

mod client;

pub use client::{DEFAULT_BOT_NAME, RecallClient, RecallConfig};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;
use crate::provider::BoxFuture;

/// Request to send a bot into a meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBotRequest {
    pub meeting_url: String,
    /// Display name of the bot; the client default is used when `None`.
    pub bot_name: Option<String>,
    pub meeting_start_time: Option<DateTime<Utc>>,
}

impl CreateBotRequest {
    pub fn new(meeting_url: impl Into<String>) -> Self {
        Self {
            meeting_url: meeting_url.into(),
            bot_name: None,
            meeting_start_time: None,
        }
    }

    pub fn with_bot_name(mut self, name: impl Into<String>) -> Self {
        self.bot_name = Some(name.into());
        self
    }

    pub fn with_start_time(mut self, start: DateTime<Utc>) -> Self {
        self.meeting_start_time = Some(start);
        self
    }
}

/// A bot as reported by the recording service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalBot {
    pub id: String,
    /// Raw status string; mapping to `BotStatus` happens in the poller.
    pub status: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Whether the service advertises a transcript for this bot.
    pub transcript_available: bool,
}

/// A transcript as returned by the recording service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalTranscript {
    pub id: Option<String>,
    pub status: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub duration_seconds: Option<u64>,
    pub participant_count: Option<u32>,
    pub participants: Vec<String>,
}

impl ExternalTranscript {
    /// Returns the transcript text if it is non-blank.
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.trim().is_empty())
    }
}

/// Client for a meeting recording service.
pub trait BotClient: Send + Sync {
    fn create_bot<'a>(
        &'a self,
        request: &'a CreateBotRequest,
    ) -> BoxFuture<'a, ProviderResult<ExternalBot>>;

    fn get_bot<'a>(&'a self, bot_id: &'a str) -> BoxFuture<'a, ProviderResult<ExternalBot>>;

    fn get_transcript<'a>(
        &'a self,
        bot_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<ExternalTranscript>>;
}
