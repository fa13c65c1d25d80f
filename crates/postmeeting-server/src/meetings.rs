//! Meeting orchestration: calendar sync, recording bots, follow-up content.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use postmeeting_core::{
    BotJob, Clock, Meeting, Provider, TimeWindow, detect_platform, extract_meeting_url,
};
use postmeeting_providers::{
    BotClient, CalendarEvent, CalendarSource, ContentGenerator, CreateBotRequest, PostStyle,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::poller::{BotPoller, PollOutcome};
use crate::store::{BotJobStore, MeetingStore, SettingsStore, TranscriptStore};
use crate::tokens::TokenManager;

/// How far ahead calendar sync looks.
pub const SYNC_DAYS_AHEAD: i64 = 90;

/// Meetings starting within this many minutes are candidates for auto-join.
const JOIN_HORIZON_MINUTES: i64 = 60;

/// Allowed distance in minutes between now and a meeting's join time.
const JOIN_TOLERANCE_MINUTES: i64 = 5;

/// Request to send a recording bot to a meeting.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateBot {
    pub meeting_id: Uuid,
    /// Overrides the meeting's own URL.
    #[serde(default)]
    pub meeting_url: Option<String>,
    #[serde(default)]
    pub meeting_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bot_name: Option<String>,
}

/// The bot job for a meeting and whether this call created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotCreation {
    pub bot: BotJob,
    pub created: bool,
}

/// A bot sent by `join_upcoming`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinedMeeting {
    pub meeting_id: Uuid,
    pub bot_job_id: Uuid,
    pub external_bot_id: String,
}

/// A meeting `join_upcoming` could not send a bot to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinFailure {
    pub meeting_id: Uuid,
    pub error: String,
}

/// Result of one auto-join pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JoinReport {
    pub joined: Vec<JoinedMeeting>,
    pub failures: Vec<JoinFailure>,
}

pub struct MeetingService {
    tokens: Arc<TokenManager>,
    calendar: Arc<dyn CalendarSource>,
    bots: Arc<dyn BotClient>,
    poller: Arc<BotPoller>,
    generator: Option<Arc<dyn ContentGenerator>>,
    meetings: Arc<dyn MeetingStore>,
    jobs: Arc<dyn BotJobStore>,
    transcripts: Arc<dyn TranscriptStore>,
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    /// Held while a bot is being created for the meeting.
    creating: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl MeetingService {
    pub fn new<S>(
        store: Arc<S>,
        tokens: Arc<TokenManager>,
        calendar: Arc<dyn CalendarSource>,
        bots: Arc<dyn BotClient>,
        poller: Arc<BotPoller>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        S: MeetingStore + BotJobStore + TranscriptStore + SettingsStore + 'static,
    {
        Self {
            tokens,
            calendar,
            bots,
            poller,
            generator: None,
            meetings: store.clone(),
            jobs: store.clone(),
            transcripts: store.clone(),
            settings: store,
            clock,
            creating: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn ContentGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Pulls the user's Google events for the next 90 days into the store.
    ///
    /// Returns the number of meetings written.
    pub async fn sync_calendar(&self, user_id: &str) -> ServerResult<usize> {
        let token = self
            .tokens
            .get_valid_access_token(user_id, Provider::Google)
            .await?;

        let now = self.clock.now();
        let window = TimeWindow::days_ahead(now, SYNC_DAYS_AHEAD);
        let events = self
            .calendar
            .list_events(&token, window)
            .await
            .map_err(ServerError::ExternalService)?;

        let mut synced = 0;
        for event in events {
            self.meetings
                .upsert_meeting(meeting_from_event(user_id, event, now))
                .await?;
            synced += 1;
        }

        info!(user_id, synced, "calendar synced");
        Ok(synced)
    }

    /// Loads a meeting and checks it belongs to `user_id`.
    pub async fn owned_meeting(&self, user_id: &str, meeting_id: Uuid) -> ServerResult<Meeting> {
        self.meetings
            .get_meeting(meeting_id)
            .await?
            .filter(|m| m.user_id == user_id)
            .ok_or_else(|| ServerError::not_found("meeting"))
    }

    pub async fn set_notetaker(
        &self,
        user_id: &str,
        meeting_id: Uuid,
        enabled: bool,
    ) -> ServerResult<Meeting> {
        self.owned_meeting(user_id, meeting_id).await?;
        let meeting = self.meetings.set_notetaker(meeting_id, enabled).await?;
        info!(user_id, %meeting_id, enabled, "notetaker toggled");
        Ok(meeting)
    }

    /// Sends a bot to the user's meeting unless one already exists.
    pub async fn create_bot(&self, user_id: &str, request: CreateBot) -> ServerResult<BotCreation> {
        let meeting = self.owned_meeting(user_id, request.meeting_id).await?;

        if let Some(existing) = self.jobs.bot_job_for_meeting(meeting.id).await? {
            debug!(meeting_id = %meeting.id, bot_job_id = %existing.id, "bot already exists");
            return Ok(BotCreation {
                bot: existing,
                created: false,
            });
        }

        let meeting_url = request
            .meeting_url
            .filter(|u| !u.trim().is_empty())
            .or_else(|| meeting.meeting_url.clone())
            .ok_or_else(|| ServerError::validation("meeting_url is required"))?;

        let bot_request = CreateBotRequest::new(meeting_url)
            .with_bot_name(
                request
                    .bot_name
                    .unwrap_or_else(|| format!("Bot for {}", meeting.title)),
            )
            .with_start_time(request.meeting_start_time.unwrap_or(meeting.start_time));

        let (bot, created) = self.send_bot_once(&meeting, &bot_request).await?;
        Ok(BotCreation { bot, created })
    }

    /// Sends a bot unless the meeting already has one.
    ///
    /// Calls for the same meeting run one at a time, so a meeting never
    /// gets two external bots from this process.
    async fn send_bot_once(
        &self,
        meeting: &Meeting,
        request: &CreateBotRequest,
    ) -> ServerResult<(BotJob, bool)> {
        let lock = self
            .creating
            .lock()
            .await
            .entry(meeting.id)
            .or_default()
            .clone();

        let result = {
            let _guard = lock.lock().await;
            match self.jobs.bot_job_for_meeting(meeting.id).await {
                Ok(Some(existing)) => {
                    debug!(
                        meeting_id = %meeting.id,
                        bot_job_id = %existing.id,
                        "bot already exists"
                    );
                    Ok((existing, false))
                }
                Ok(None) => self.send_bot(meeting, request).await,
                Err(e) => Err(e.into()),
            }
        };

        let mut creating = self.creating.lock().await;
        if Arc::strong_count(&lock) == 2 {
            creating.remove(&meeting.id);
        }
        result
    }

    async fn send_bot(
        &self,
        meeting: &Meeting,
        request: &CreateBotRequest,
    ) -> ServerResult<(BotJob, bool)> {
        let external = self
            .bots
            .create_bot(request)
            .await
            .map_err(ServerError::ExternalService)?;

        let mut job = BotJob::new(
            meeting.id,
            external.id,
            request.meeting_url.clone(),
            self.clock.now(),
        );
        job.started_at = external.started_at;
        let (stored, inserted) = self.jobs.insert_bot_job_if_absent(job).await?;
        if inserted {
            info!(
                meeting_id = %meeting.id,
                bot_job_id = %stored.id,
                external_bot_id = %stored.external_bot_id,
                "bot created"
            );
        } else {
            warn!(
                meeting_id = %meeting.id,
                bot_job_id = %stored.id,
                "meeting got a bot job concurrently, new external bot is unused"
            );
        }
        Ok((stored, inserted))
    }

    /// Polls one of the user's bot jobs.
    pub async fn poll_for_user(
        &self,
        user_id: &str,
        bot_job_id: Uuid,
    ) -> ServerResult<PollOutcome> {
        let job = self
            .jobs
            .get_bot_job(bot_job_id)
            .await?
            .ok_or_else(|| ServerError::not_found("bot job"))?;
        self.owned_meeting(user_id, job.meeting_id)
            .await
            .map_err(|_| ServerError::not_found("bot job"))?;

        self.poller.poll_once(&job).await
    }

    /// Sends bots to notetaker meetings whose join time is now.
    ///
    /// A meeting qualifies when it starts within the next hour, has no bot
    /// yet, and `start - bot_join_minutes_before` is within five minutes of
    /// now. Failures are reported per meeting.
    pub async fn join_upcoming(&self) -> ServerResult<JoinReport> {
        let now = self.clock.now();
        let candidates = self
            .meetings
            .notetaker_meetings_between(now, now + Duration::minutes(JOIN_HORIZON_MINUTES))
            .await?;

        let mut report = JoinReport::default();
        for meeting in candidates {
            match self.join_if_due(&meeting, now).await {
                Ok(Some(job)) => report.joined.push(JoinedMeeting {
                    meeting_id: meeting.id,
                    bot_job_id: job.id,
                    external_bot_id: job.external_bot_id,
                }),
                Ok(None) => {}
                Err(e) => {
                    warn!(meeting_id = %meeting.id, error = %e, "failed to join meeting");
                    report.failures.push(JoinFailure {
                        meeting_id: meeting.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            joined = report.joined.len(),
            failed = report.failures.len(),
            "auto-join pass finished"
        );
        Ok(report)
    }

    async fn join_if_due(
        &self,
        meeting: &Meeting,
        now: DateTime<Utc>,
    ) -> ServerResult<Option<BotJob>> {
        let Some(url) = meeting.meeting_url.as_deref() else {
            return Ok(None);
        };
        if self.jobs.bot_job_for_meeting(meeting.id).await?.is_some() {
            return Ok(None);
        }

        let settings = self.settings.get_settings(&meeting.user_id).await?;
        let join_at =
            meeting.start_time - Duration::minutes(i64::from(settings.bot_join_minutes_before));
        if (now - join_at).abs() > Duration::minutes(JOIN_TOLERANCE_MINUTES) {
            debug!(meeting_id = %meeting.id, %join_at, "not yet time to join");
            return Ok(None);
        }

        let request = CreateBotRequest::new(url).with_start_time(meeting.start_time);
        let (job, created) = self.send_bot_once(meeting, &request).await?;
        Ok(created.then_some(job))
    }

    fn generator(&self) -> ServerResult<&Arc<dyn ContentGenerator>> {
        self.generator
            .as_ref()
            .ok_or_else(|| ServerError::config("content generation is not configured"))
    }

    /// Drafts a follow-up email from the meeting's transcript.
    pub async fn generate_email(&self, user_id: &str, meeting_id: Uuid) -> ServerResult<String> {
        let meeting = self.owned_meeting(user_id, meeting_id).await?;
        let transcript = self
            .transcripts
            .transcript_for_meeting(meeting.id)
            .await?
            .ok_or_else(|| ServerError::not_found("transcript"))?;

        let participants = if transcript.participants.is_empty() {
            meeting.attendees
        } else {
            transcript.participants
        };

        self.generator()?
            .generate_email(&transcript.content, &participants)
            .await
            .map_err(ServerError::Generation)
    }

    /// Drafts a social post from the meeting's transcript.
    pub async fn generate_post(
        &self,
        user_id: &str,
        meeting_id: Uuid,
        style: PostStyle,
    ) -> ServerResult<String> {
        let meeting = self.owned_meeting(user_id, meeting_id).await?;
        let transcript = self
            .transcripts
            .transcript_for_meeting(meeting.id)
            .await?
            .ok_or_else(|| ServerError::not_found("transcript"))?;

        self.generator()?
            .generate_post(&transcript.content, &style)
            .await
            .map_err(ServerError::Generation)
    }
}

fn meeting_from_event(user_id: &str, event: CalendarEvent, now: DateTime<Utc>) -> Meeting {
    let meeting_url = extract_meeting_url(
        event.hangout_link.as_deref(),
        event.location.as_deref(),
        event.description.as_deref(),
    );
    let platform = match &meeting_url {
        Some(url) => detect_platform(url),
        None => detect_platform(event.location.as_deref().unwrap_or_default()),
    };

    Meeting {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        calendar_id: event.calendar_id,
        external_event_id: event.id,
        title: event.title,
        start_time: event.start,
        end_time: event.end,
        meeting_url,
        platform,
        attendees: event.attendees,
        notetaker_enabled: false,
        updated_at: now,
    }
}
