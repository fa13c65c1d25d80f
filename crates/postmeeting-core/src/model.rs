//! Persisted records shared by the provider and server crates.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::links::MeetingPlatform;

/// An OAuth provider a user can connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    LinkedIn,
    Facebook,
}

impl Provider {
    /// All providers, in a stable order.
    pub const ALL: [Provider; 3] = [Provider::Google, Provider::LinkedIn, Provider::Facebook];

    /// Lowercase identifier used in routes, storage and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::LinkedIn => "linkedin",
            Self::Facebook => "facebook",
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Google => "Google",
            Self::LinkedIn => "LinkedIn",
            Self::Facebook => "Facebook",
        }
    }

    /// Returns true for providers that can publish posts.
    pub fn is_social(&self) -> bool {
        matches!(self, Self::LinkedIn | Self::Facebook)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "linkedin" => Ok(Self::LinkedIn),
            "facebook" => Ok(Self::Facebook),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// One provider's grant for one user.
///
/// At most one credential exists per `(user_id, provider)`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub user_id: String,
    pub provider: Provider,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Absolute expiry. `None` is treated as already expired.
    pub expires_at: Option<DateTime<Utc>>,
    /// Provider-issued account identifier, when known.
    pub account_id: Option<String>,
    pub scope: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Creates a credential with no refresh token, expiry or account id.
    pub fn new(
        user_id: impl Into<String>,
        provider: Provider,
        access_token: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            provider,
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            account_id: None,
            scope: None,
            updated_at: now,
        }
    }

    /// Builder: set the refresh token.
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    /// Builder: set the absolute expiry.
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Builder: set the provider account id.
    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    /// Returns true unless `now` is strictly before the stored expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at,
            None => true,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("provider", &self.provider)
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .field("account_id", &self.account_id)
            .field("scope", &self.scope)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Lifecycle state of a recording bot.
///
/// `pending → joining → recording → processing → completed`, or `failed`
/// from any state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    #[default]
    Pending,
    Joining,
    Recording,
    Processing,
    Completed,
    Failed,
}

impl BotStatus {
    /// States that are still polled.
    pub const ACTIVE: [BotStatus; 4] = [
        BotStatus::Pending,
        BotStatus::Joining,
        BotStatus::Recording,
        BotStatus::Processing,
    ];

    /// Maps an external status string. Unknown or missing values map to
    /// `Pending` so a scheduled poll never fails on a new upstream state.
    pub fn from_external(status: Option<&str>) -> Self {
        match status.map(str::to_ascii_lowercase).as_deref() {
            Some("pending") => Self::Pending,
            Some("joining") => Self::Joining,
            Some("recording") => Self::Recording,
            Some("processing") => Self::Processing,
            Some("completed") => Self::Completed,
            Some("failed") => Self::Failed,
            _ => Self::Pending,
        }
    }

    /// Returns true for `completed` and `failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Joining => "joining",
            Self::Recording => "recording",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One external recording bot tied to one meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotJob {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub external_bot_id: String,
    pub status: BotStatus,
    pub meeting_url: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BotJob {
    /// Creates a `pending` job for a bot the provider has just accepted.
    pub fn new(
        meeting_id: Uuid,
        external_bot_id: impl Into<String>,
        meeting_url: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            meeting_id,
            external_bot_id: external_bot_id.into(),
            status: BotStatus::Pending,
            meeting_url: meeting_url.into(),
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: now,
        }
    }
}

/// Durable result of a completed bot job. One per bot job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub bot_job_id: Uuid,
    pub content: String,
    pub summary: Option<String>,
    pub duration_seconds: Option<u64>,
    pub participant_count: Option<u32>,
    pub participants: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// A calendar event synced from Google.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: Uuid,
    pub user_id: String,
    pub calendar_id: String,
    pub external_event_id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub meeting_url: Option<String>,
    pub platform: MeetingPlatform,
    pub attendees: Vec<String>,
    pub notetaker_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

/// Per-user preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    /// How many minutes before a meeting the bot should join.
    pub bot_join_minutes_before: u32,
}

impl UserSettings {
    pub const DEFAULT_JOIN_MINUTES_BEFORE: u32 = 5;
    pub const MAX_JOIN_MINUTES_BEFORE: u32 = 60;

    /// Returns an error message when a value is out of range.
    pub fn validate(&self) -> Result<(), String> {
        if self.bot_join_minutes_before > Self::MAX_JOIN_MINUTES_BEFORE {
            return Err(format!(
                "bot_join_minutes_before must be between 0 and {}",
                Self::MAX_JOIN_MINUTES_BEFORE
            ));
        }
        Ok(())
    }
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            bot_join_minutes_before: Self::DEFAULT_JOIN_MINUTES_BEFORE,
        }
    }
}

/// A post the provider confirmed as published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: Uuid,
    pub user_id: String,
    pub provider: Provider,
    pub content: String,
    pub external_post_id: Option<String>,
    pub meeting_id: Option<Uuid>,
    pub posted_at: DateTime<Utc>,
}
