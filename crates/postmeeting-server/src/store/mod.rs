//! Persistence seams.
//!
//! Each record family has its own trait so services only see what they
//! touch. Every method is a single atomic operation against the backing
//! store; [`LocalStore`] implements all of them.

mod local;

pub use local::LocalStore;

use chrono::{DateTime, Utc};
use postmeeting_core::{
    BotJob, BotStatus, Credential, Meeting, PostRecord, Provider, Transcript, UserSettings,
};
use postmeeting_providers::BoxFuture;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record an update targets does not exist.
    #[error("{what} does not exist")]
    Missing { what: String },

    /// Snapshot file IO failed.
    #[error("snapshot IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization failed.
    #[error("snapshot format error: {0}")]
    Format(#[from] serde_json::Error),
}

impl StoreError {
    pub fn missing(what: impl Into<String>) -> Self {
        Self::Missing { what: what.into() }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Whether an upsert created or replaced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

/// Fields a poll writes back to a bot job.
///
/// Timestamps only ever fill in; `None` leaves the stored value alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotJobUpdate {
    pub status: BotStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// OAuth credentials keyed by `(user_id, provider)`.
pub trait CredentialStore: Send + Sync {
    fn get_credential<'a>(
        &'a self,
        user_id: &'a str,
        provider: Provider,
    ) -> BoxFuture<'a, StoreResult<Option<Credential>>>;

    /// Inserts or replaces the user's credential for its provider.
    fn upsert_credential(&self, credential: Credential) -> BoxFuture<'_, StoreResult<()>>;

    /// Replaces the access token and expiry in one write.
    fn update_access_token<'a>(
        &'a self,
        user_id: &'a str,
        provider: Provider,
        access_token: &'a str,
        expires_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<()>>;

    /// Returns false when nothing was stored.
    fn delete_credential<'a>(
        &'a self,
        user_id: &'a str,
        provider: Provider,
    ) -> BoxFuture<'a, StoreResult<bool>>;
}

/// Recording bot jobs.
pub trait BotJobStore: Send + Sync {
    fn insert_bot_job(&self, job: BotJob) -> BoxFuture<'_, StoreResult<()>>;

    /// Inserts `job` unless its meeting already has one, in a single write.
    ///
    /// Returns the stored job and whether it is the one just inserted.
    fn insert_bot_job_if_absent(
        &self,
        job: BotJob,
    ) -> BoxFuture<'_, StoreResult<(BotJob, bool)>>;

    fn get_bot_job(&self, id: Uuid) -> BoxFuture<'_, StoreResult<Option<BotJob>>>;

    fn bot_job_for_meeting(&self, meeting_id: Uuid) -> BoxFuture<'_, StoreResult<Option<BotJob>>>;

    /// Jobs whose status is not terminal.
    fn list_active_bot_jobs(&self) -> BoxFuture<'_, StoreResult<Vec<BotJob>>>;

    /// Writes status and newly known timestamps in one write.
    fn update_bot_job(&self, id: Uuid, update: BotJobUpdate) -> BoxFuture<'_, StoreResult<BotJob>>;

    fn record_bot_error<'a>(&'a self, id: Uuid, message: &'a str)
    -> BoxFuture<'a, StoreResult<()>>;
}

/// Transcripts, one per bot job.
pub trait TranscriptStore: Send + Sync {
    /// Inserts, or updates the transcript already stored for the bot job.
    fn upsert_transcript(&self, transcript: Transcript) -> BoxFuture<'_, StoreResult<Upsert>>;

    fn transcript_for_bot_job(
        &self,
        bot_job_id: Uuid,
    ) -> BoxFuture<'_, StoreResult<Option<Transcript>>>;

    /// Most recently updated transcript of a meeting.
    fn transcript_for_meeting(
        &self,
        meeting_id: Uuid,
    ) -> BoxFuture<'_, StoreResult<Option<Transcript>>>;
}

/// Calendar meetings.
pub trait MeetingStore: Send + Sync {
    /// Inserts or updates by `(user_id, calendar_id, external_event_id)`; an
    /// update keeps the stored id and notetaker flag.
    fn upsert_meeting(&self, meeting: Meeting) -> BoxFuture<'_, StoreResult<Meeting>>;

    fn get_meeting(&self, id: Uuid) -> BoxFuture<'_, StoreResult<Option<Meeting>>>;

    fn set_notetaker(&self, id: Uuid, enabled: bool) -> BoxFuture<'_, StoreResult<Meeting>>;

    /// Notetaker-enabled meetings with a URL starting in `[from, to)`.
    fn notetaker_meetings_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<Vec<Meeting>>>;
}

/// Log of published posts.
pub trait PostLogStore: Send + Sync {
    fn append_post(&self, record: PostRecord) -> BoxFuture<'_, StoreResult<()>>;

    fn posts_for_user<'a>(&'a self, user_id: &'a str)
    -> BoxFuture<'a, StoreResult<Vec<PostRecord>>>;
}

/// Per-user settings.
pub trait SettingsStore: Send + Sync {
    /// Stored settings, or the defaults.
    fn get_settings<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<UserSettings>>;

    fn put_settings<'a>(
        &'a self,
        user_id: &'a str,
        settings: UserSettings,
    ) -> BoxFuture<'a, StoreResult<()>>;
}
