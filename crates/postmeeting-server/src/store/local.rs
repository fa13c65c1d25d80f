//! In-memory store with an optional JSON snapshot on disk.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use postmeeting_core::{
    BotJob, Credential, Meeting, PostRecord, Provider, Transcript, UserSettings,
};
use postmeeting_providers::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    BotJobStore, BotJobUpdate, CredentialStore, MeetingStore, PostLogStore, SettingsStore,
    StoreError, StoreResult, TranscriptStore, Upsert,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct Tables {
    credentials: BTreeMap<String, BTreeMap<Provider, Credential>>,
    bot_jobs: BTreeMap<Uuid, BotJob>,
    /// Keyed by bot job id.
    transcripts: BTreeMap<Uuid, Transcript>,
    meetings: BTreeMap<Uuid, Meeting>,
    posts: Vec<PostRecord>,
    settings: BTreeMap<String, UserSettings>,
}

/// Store backed by in-memory tables.
///
/// With a snapshot path, every write rewrites the JSON snapshot (temp file
/// then rename, `0600` on Unix) before the lock is released. A write whose
/// snapshot fails is not applied.
#[derive(Debug)]
pub struct LocalStore {
    tables: RwLock<Tables>,
    path: Option<PathBuf>,
}

impl LocalStore {
    /// Creates a store that keeps nothing on disk.
    pub fn in_memory() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            path: None,
        }
    }

    /// Opens a snapshot-backed store, loading the snapshot when it exists.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let tables = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let tables: Tables = serde_json::from_str(&content)?;
            info!(path = %path.display(), "loaded store snapshot");
            tables
        } else {
            debug!(path = %path.display(), "no store snapshot yet");
            Tables::default()
        };

        Ok(Self {
            tables: RwLock::new(tables),
            path: Some(path),
        })
    }

    /// The snapshot path, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self, tables: &Tables) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(tables)?;
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
        }

        Ok(())
    }

    /// Runs `change` under the write lock.
    ///
    /// With a snapshot, the change is applied to a copy that replaces the
    /// live tables only once the snapshot is on disk, so a failed write
    /// leaves memory as it was.
    async fn write<T>(
        &self,
        change: impl FnOnce(&mut Tables) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut tables = self.tables.write().await;
        if self.path.is_none() {
            return change(&mut *tables);
        }

        let mut next = tables.clone();
        let value = change(&mut next)?;
        self.persist(&next)?;
        *tables = next;
        Ok(value)
    }
}

impl Tables {
    fn bot_job_mut(&mut self, id: Uuid) -> StoreResult<&mut BotJob> {
        self.bot_jobs
            .get_mut(&id)
            .ok_or_else(|| StoreError::missing(format!("bot job {}", id)))
    }
}

impl CredentialStore for LocalStore {
    fn get_credential<'a>(
        &'a self,
        user_id: &'a str,
        provider: Provider,
    ) -> BoxFuture<'a, StoreResult<Option<Credential>>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            Ok(tables
                .credentials
                .get(user_id)
                .and_then(|by_provider| by_provider.get(&provider))
                .cloned())
        })
    }

    fn upsert_credential(&self, credential: Credential) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(self.write(move |tables| {
            tables
                .credentials
                .entry(credential.user_id.clone())
                .or_default()
                .insert(credential.provider, credential);
            Ok(())
        }))
    }

    fn update_access_token<'a>(
        &'a self,
        user_id: &'a str,
        provider: Provider,
        access_token: &'a str,
        expires_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(self.write(move |tables| {
            let credential = tables
                .credentials
                .get_mut(user_id)
                .and_then(|by_provider| by_provider.get_mut(&provider))
                .ok_or_else(|| StoreError::missing(format!("{} credential", provider)))?;
            credential.access_token = access_token.to_string();
            credential.expires_at = expires_at;
            credential.updated_at = updated_at;
            Ok(())
        }))
    }

    fn delete_credential<'a>(
        &'a self,
        user_id: &'a str,
        provider: Provider,
    ) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move {
            let present = self
                .get_credential(user_id, provider)
                .await?
                .is_some();
            if !present {
                return Ok(false);
            }
            self.write(|tables| {
                Ok(tables
                    .credentials
                    .get_mut(user_id)
                    .and_then(|by_provider| by_provider.remove(&provider))
                    .is_some())
            })
            .await
        })
    }
}

impl BotJobStore for LocalStore {
    fn insert_bot_job(&self, job: BotJob) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(self.write(move |tables| {
            tables.bot_jobs.insert(job.id, job);
            Ok(())
        }))
    }

    fn insert_bot_job_if_absent(
        &self,
        job: BotJob,
    ) -> BoxFuture<'_, StoreResult<(BotJob, bool)>> {
        Box::pin(self.write(move |tables| {
            if let Some(existing) = latest_job_for(tables, job.meeting_id) {
                return Ok((existing.clone(), false));
            }
            tables.bot_jobs.insert(job.id, job.clone());
            Ok((job, true))
        }))
    }

    fn get_bot_job(&self, id: Uuid) -> BoxFuture<'_, StoreResult<Option<BotJob>>> {
        Box::pin(async move { Ok(self.tables.read().await.bot_jobs.get(&id).cloned()) })
    }

    fn bot_job_for_meeting(&self, meeting_id: Uuid) -> BoxFuture<'_, StoreResult<Option<BotJob>>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            Ok(latest_job_for(&tables, meeting_id).cloned())
        })
    }

    fn list_active_bot_jobs(&self) -> BoxFuture<'_, StoreResult<Vec<BotJob>>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            Ok(tables
                .bot_jobs
                .values()
                .filter(|job| !job.status.is_terminal())
                .cloned()
                .collect())
        })
    }

    fn update_bot_job(&self, id: Uuid, update: BotJobUpdate) -> BoxFuture<'_, StoreResult<BotJob>> {
        Box::pin(self.write(move |tables| {
            let job = tables.bot_job_mut(id)?;
            job.status = update.status;
            if update.started_at.is_some() {
                job.started_at = update.started_at;
            }
            if update.completed_at.is_some() {
                job.completed_at = update.completed_at;
            }
            Ok(job.clone())
        }))
    }

    fn record_bot_error<'a>(
        &'a self,
        id: Uuid,
        message: &'a str,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(self.write(move |tables| {
            tables.bot_job_mut(id)?.error_message = Some(message.to_string());
            Ok(())
        }))
    }
}

fn latest_job_for(tables: &Tables, meeting_id: Uuid) -> Option<&BotJob> {
    tables
        .bot_jobs
        .values()
        .filter(|job| job.meeting_id == meeting_id)
        .max_by_key(|job| job.created_at)
}

impl TranscriptStore for LocalStore {
    fn upsert_transcript(&self, transcript: Transcript) -> BoxFuture<'_, StoreResult<Upsert>> {
        Box::pin(self.write(move |tables| {
            Ok(match tables.transcripts.get_mut(&transcript.bot_job_id) {
                Some(existing) => {
                    let id = existing.id;
                    *existing = Transcript { id, ..transcript };
                    Upsert::Updated
                }
                None => {
                    tables.transcripts.insert(transcript.bot_job_id, transcript);
                    Upsert::Inserted
                }
            })
        }))
    }

    fn transcript_for_bot_job(
        &self,
        bot_job_id: Uuid,
    ) -> BoxFuture<'_, StoreResult<Option<Transcript>>> {
        Box::pin(async move { Ok(self.tables.read().await.transcripts.get(&bot_job_id).cloned()) })
    }

    fn transcript_for_meeting(
        &self,
        meeting_id: Uuid,
    ) -> BoxFuture<'_, StoreResult<Option<Transcript>>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            Ok(tables
                .transcripts
                .values()
                .filter(|t| t.meeting_id == meeting_id)
                .max_by_key(|t| t.updated_at)
                .cloned())
        })
    }
}

impl MeetingStore for LocalStore {
    fn upsert_meeting(&self, meeting: Meeting) -> BoxFuture<'_, StoreResult<Meeting>> {
        Box::pin(self.write(move |tables| {
            let existing = tables
                .meetings
                .values()
                .find(|m| {
                    m.user_id == meeting.user_id
                        && m.calendar_id == meeting.calendar_id
                        && m.external_event_id == meeting.external_event_id
                })
                .map(|m| (m.id, m.notetaker_enabled));

            let stored = match existing {
                Some((id, notetaker_enabled)) => Meeting {
                    id,
                    notetaker_enabled,
                    ..meeting
                },
                None => meeting,
            };
            tables.meetings.insert(stored.id, stored.clone());
            Ok(stored)
        }))
    }

    fn get_meeting(&self, id: Uuid) -> BoxFuture<'_, StoreResult<Option<Meeting>>> {
        Box::pin(async move { Ok(self.tables.read().await.meetings.get(&id).cloned()) })
    }

    fn set_notetaker(&self, id: Uuid, enabled: bool) -> BoxFuture<'_, StoreResult<Meeting>> {
        Box::pin(self.write(move |tables| {
            let meeting = tables
                .meetings
                .get_mut(&id)
                .ok_or_else(|| StoreError::missing(format!("meeting {}", id)))?;
            meeting.notetaker_enabled = enabled;
            Ok(meeting.clone())
        }))
    }

    fn notetaker_meetings_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<Vec<Meeting>>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            let mut meetings: Vec<Meeting> = tables
                .meetings
                .values()
                .filter(|m| m.notetaker_enabled && m.meeting_url.is_some())
                .filter(|m| m.start_time >= from && m.start_time < to)
                .cloned()
                .collect();
            meetings.sort_by_key(|m| m.start_time);
            Ok(meetings)
        })
    }
}

impl PostLogStore for LocalStore {
    fn append_post(&self, record: PostRecord) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(self.write(move |tables| {
            tables.posts.push(record);
            Ok(())
        }))
    }

    fn posts_for_user<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Vec<PostRecord>>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            Ok(tables
                .posts
                .iter()
                .filter(|p| p.user_id == user_id)
                .cloned()
                .collect())
        })
    }
}

impl SettingsStore for LocalStore {
    fn get_settings<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, StoreResult<UserSettings>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            Ok(tables.settings.get(user_id).copied().unwrap_or_default())
        })
    }

    fn put_settings<'a>(
        &'a self,
        user_id: &'a str,
        settings: UserSettings,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(self.write(move |tables| {
            tables.settings.insert(user_id.to_string(), settings);
            Ok(())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use postmeeting_core::{BotStatus, MeetingPlatform};
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn meeting(user: &str, event: &str, start: DateTime<Utc>) -> Meeting {
        Meeting {
            id: Uuid::new_v4(),
            user_id: user.into(),
            calendar_id: "primary".into(),
            external_event_id: event.into(),
            title: "Review".into(),
            start_time: start,
            end_time: start + Duration::hours(1),
            meeting_url: Some("https://zoom.us/j/1".into()),
            platform: MeetingPlatform::Zoom,
            attendees: vec![],
            notetaker_enabled: false,
            updated_at: now(),
        }
    }

    fn transcript(job: &BotJob, content: &str) -> Transcript {
        Transcript {
            id: Uuid::new_v4(),
            meeting_id: job.meeting_id,
            bot_job_id: job.id,
            content: content.into(),
            summary: None,
            duration_seconds: None,
            participant_count: None,
            participants: vec![],
            updated_at: now(),
        }
    }

    #[tokio::test]
    async fn credential_upsert_and_token_update() {
        let store = LocalStore::in_memory();
        let cred = Credential::new("u1", Provider::Google, "old", now()).with_refresh_token("r");
        store.upsert_credential(cred).await.unwrap();

        let later = now() + Duration::hours(1);
        store
            .update_access_token("u1", Provider::Google, "new", Some(later), later)
            .await
            .unwrap();

        let stored = store.get_credential("u1", Provider::Google).await.unwrap().unwrap();
        assert_eq!(stored.access_token, "new");
        assert_eq!(stored.refresh_token.as_deref(), Some("r"));
        assert_eq!(stored.expires_at, Some(later));

        assert!(store.get_credential("u1", Provider::LinkedIn).await.unwrap().is_none());
        let err = store
            .update_access_token("u2", Provider::Google, "x", None, later)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Missing { .. }));
    }

    #[tokio::test]
    async fn delete_credential_reports_presence() {
        let store = LocalStore::in_memory();
        store
            .upsert_credential(Credential::new("u1", Provider::Facebook, "t", now()))
            .await
            .unwrap();
        assert!(store.delete_credential("u1", Provider::Facebook).await.unwrap());
        assert!(!store.delete_credential("u1", Provider::Facebook).await.unwrap());
    }

    #[tokio::test]
    async fn bot_job_update_never_clears_timestamps() {
        let store = LocalStore::in_memory();
        let job = BotJob::new(Uuid::new_v4(), "ext", "https://zoom.us/j/1", now());
        let id = job.id;
        store.insert_bot_job(job).await.unwrap();

        let started = now() + Duration::minutes(1);
        store
            .update_bot_job(
                id,
                BotJobUpdate {
                    status: BotStatus::Recording,
                    started_at: Some(started),
                    completed_at: None,
                },
            )
            .await
            .unwrap();
        let updated = store
            .update_bot_job(
                id,
                BotJobUpdate {
                    status: BotStatus::Processing,
                    started_at: None,
                    completed_at: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, BotStatus::Processing);
        assert_eq!(updated.started_at, Some(started));
    }

    #[tokio::test]
    async fn active_jobs_exclude_terminal_states() {
        let store = LocalStore::in_memory();
        let mut done = BotJob::new(Uuid::new_v4(), "a", "u", now());
        done.status = BotStatus::Completed;
        let mut failed = BotJob::new(Uuid::new_v4(), "b", "u", now());
        failed.status = BotStatus::Failed;
        let live = BotJob::new(Uuid::new_v4(), "c", "u", now());
        let live_id = live.id;
        for job in [done, failed, live] {
            store.insert_bot_job(job).await.unwrap();
        }

        let active = store.list_active_bot_jobs().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, live_id);
    }

    #[tokio::test]
    async fn transcript_upsert_keeps_one_row_per_job() {
        let store = LocalStore::in_memory();
        let job = BotJob::new(Uuid::new_v4(), "ext", "u", now());

        let first = transcript(&job, "v1");
        let first_id = first.id;
        assert_eq!(store.upsert_transcript(first).await.unwrap(), Upsert::Inserted);
        assert_eq!(
            store.upsert_transcript(transcript(&job, "v2")).await.unwrap(),
            Upsert::Updated
        );

        let stored = store.transcript_for_bot_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.id, first_id);
        assert_eq!(stored.content, "v2");
        assert_eq!(
            store.transcript_for_meeting(job.meeting_id).await.unwrap().unwrap().content,
            "v2"
        );
    }

    #[tokio::test]
    async fn meeting_upsert_preserves_id_and_notetaker() {
        let store = LocalStore::in_memory();
        let first = store
            .upsert_meeting(meeting("u1", "evt", now()))
            .await
            .unwrap();
        store.set_notetaker(first.id, true).await.unwrap();

        let mut changed = meeting("u1", "evt", now() + Duration::hours(2));
        changed.title = "Moved".into();
        let second = store.upsert_meeting(changed).await.unwrap();
        assert_eq!(second.id, first.id);
        assert!(second.notetaker_enabled);
        assert_eq!(second.title, "Moved");

        let other_user = store.upsert_meeting(meeting("u2", "evt", now())).await.unwrap();
        assert_ne!(other_user.id, first.id);
    }

    #[tokio::test]
    async fn same_event_in_two_calendars_is_two_meetings() {
        let store = LocalStore::in_memory();
        let primary = store
            .upsert_meeting(meeting("u1", "shared", now()))
            .await
            .unwrap();
        let mut team_copy = meeting("u1", "shared", now());
        team_copy.calendar_id = "team@group.calendar.google.com".into();
        let team = store.upsert_meeting(team_copy).await.unwrap();
        assert_ne!(team.id, primary.id);

        let mut moved = meeting("u1", "shared", now() + Duration::hours(1));
        moved.calendar_id = "team@group.calendar.google.com".into();
        assert_eq!(store.upsert_meeting(moved).await.unwrap().id, team.id);

        let untouched = store.get_meeting(primary.id).await.unwrap().unwrap();
        assert_eq!(untouched.calendar_id, "primary");
        assert_eq!(untouched.start_time, now());
    }

    #[tokio::test]
    async fn conditional_bot_insert_keeps_the_first_job() {
        let store = LocalStore::in_memory();
        let meeting_id = Uuid::new_v4();
        let first = BotJob::new(meeting_id, "bot-1", "https://zoom.us/j/1", now());
        let second = BotJob::new(meeting_id, "bot-2", "https://zoom.us/j/1", now());

        let (a, b) = tokio::join!(
            store.insert_bot_job_if_absent(first),
            store.insert_bot_job_if_absent(second)
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(a.1 ^ b.1, "exactly one insert wins");
        assert_eq!(a.0.id, b.0.id);

        let stored = store.bot_job_for_meeting(meeting_id).await.unwrap().unwrap();
        assert_eq!(stored.id, a.0.id);
        let all = store.list_active_bot_jobs().await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn failed_snapshot_leaves_memory_untouched() {
        let dir = TempDir::new().unwrap();
        let state_dir = dir.path().join("state");
        let store = LocalStore::open(state_dir.join("store.json")).unwrap();
        let expires = now() - Duration::minutes(5);
        store
            .upsert_credential(
                Credential::new("u1", Provider::Google, "stale", now())
                    .with_refresh_token("r1")
                    .with_expires_at(expires),
            )
            .await
            .unwrap();

        fs::remove_dir_all(&state_dir).unwrap();
        fs::write(&state_dir, "not a directory").unwrap();

        let later = now() + Duration::hours(1);
        let err = store
            .update_access_token("u1", Provider::Google, "fresh", Some(later), later)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        let stored = store.get_credential("u1", Provider::Google).await.unwrap().unwrap();
        assert_eq!(stored.access_token, "stale");
        assert_eq!(stored.expires_at, Some(expires));

        let job = BotJob::new(Uuid::new_v4(), "ext", "https://zoom.us/j/1", now());
        assert!(store.insert_bot_job_if_absent(job).await.is_err());
        assert!(store.list_active_bot_jobs().await.unwrap().is_empty());
        assert!(store.delete_credential("u1", Provider::Google).await.is_err());
        assert!(store.get_credential("u1", Provider::Google).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn notetaker_window_query() {
        let store = LocalStore::in_memory();
        let soon = store
            .upsert_meeting(meeting("u1", "soon", now() + Duration::minutes(10)))
            .await
            .unwrap();
        store.set_notetaker(soon.id, true).await.unwrap();
        let late = store
            .upsert_meeting(meeting("u1", "late", now() + Duration::hours(3)))
            .await
            .unwrap();
        store.set_notetaker(late.id, true).await.unwrap();
        store
            .upsert_meeting(meeting("u1", "off", now() + Duration::minutes(5)))
            .await
            .unwrap();

        let found = store
            .notetaker_meetings_between(now(), now() + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, soon.id);
    }

    #[tokio::test]
    async fn settings_default_until_written() {
        let store = LocalStore::in_memory();
        assert_eq!(store.get_settings("u1").await.unwrap(), UserSettings::default());
        let custom = UserSettings {
            bot_join_minutes_before: 2,
        };
        store.put_settings("u1", custom).await.unwrap();
        assert_eq!(store.get_settings("u1").await.unwrap(), custom);
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("store.json");

        {
            let store = LocalStore::open(&path).unwrap();
            store
                .upsert_credential(
                    Credential::new("u1", Provider::LinkedIn, "tok", now()).with_account_id("m1"),
                )
                .await
                .unwrap();
            store
                .append_post(PostRecord {
                    id: Uuid::new_v4(),
                    user_id: "u1".into(),
                    provider: Provider::LinkedIn,
                    content: "hello".into(),
                    external_post_id: Some("p1".into()),
                    meeting_id: None,
                    posted_at: now(),
                })
                .await
                .unwrap();
        }
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let reopened = LocalStore::open(&path).unwrap();
        let cred = reopened
            .get_credential("u1", Provider::LinkedIn)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cred.account_id.as_deref(), Some("m1"));
        assert_eq!(reopened.posts_for_user("u1").await.unwrap().len(), 1);
    }
}
