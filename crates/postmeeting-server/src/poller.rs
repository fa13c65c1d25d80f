//! Recording bot polling.
//!
//! One poll reads the bot's external status, writes the mapped status and any
//! newly known timestamps, and on completion stores the transcript. Polling
//! is externally triggered (cron routes or the scheduler) and idempotent: a
//! job polled twice ends in the same state with one transcript.

use std::sync::Arc;

use futures_util::{StreamExt, stream};
use postmeeting_core::{BotJob, BotStatus, Clock, Transcript};
use postmeeting_providers::{BotClient, ExternalBot};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::store::{BotJobStore, BotJobUpdate, TranscriptStore, Upsert};

/// Default number of jobs polled at the same time.
pub const DEFAULT_POLL_CONCURRENCY: usize = 4;

/// What happened to the transcript during a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TranscriptOutcome {
    /// The bot is not completed or advertises no transcript.
    NotAvailable,
    /// Transcript stored; `inserted` is false when an existing one was updated.
    Saved { inserted: bool },
    /// The service returned an empty transcript; nothing was written.
    Empty,
    /// Fetching or storing the transcript failed. The job stays completed.
    Failed { message: String },
}

/// Result of polling one bot job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollOutcome {
    pub bot_job_id: Uuid,
    pub status: BotStatus,
    pub transcript: TranscriptOutcome,
}

/// A job whose poll failed inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollFailure {
    pub bot_job_id: Uuid,
    pub error: String,
}

/// Result of polling every active job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    pub outcomes: Vec<PollOutcome>,
    pub failures: Vec<PollFailure>,
}

impl PollReport {
    pub fn processed(&self) -> usize {
        self.outcomes.len() + self.failures.len()
    }
}

/// Drives bot jobs through their lifecycle.
pub struct BotPoller {
    bots: Arc<dyn BotClient>,
    jobs: Arc<dyn BotJobStore>,
    transcripts: Arc<dyn TranscriptStore>,
    clock: Arc<dyn Clock>,
    concurrency: usize,
}

impl BotPoller {
    pub fn new(
        bots: Arc<dyn BotClient>,
        jobs: Arc<dyn BotJobStore>,
        transcripts: Arc<dyn TranscriptStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bots,
            jobs,
            transcripts,
            clock,
            concurrency: DEFAULT_POLL_CONCURRENCY,
        }
    }

    /// Sets how many jobs `poll_all_active` polls at once (at least one).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Polls one job.
    ///
    /// There is no guard against terminal states here; a completed job can
    /// be polled again and its transcript is updated in place.
    pub async fn poll_once(&self, job: &BotJob) -> ServerResult<PollOutcome> {
        let external = match self.bots.get_bot(&job.external_bot_id).await {
            Ok(bot) => bot,
            Err(e) => {
                warn!(
                    bot_job_id = %job.id,
                    external_bot_id = %job.external_bot_id,
                    error = %e,
                    "bot status query failed"
                );
                let message = e.to_string();
                if let Err(store_err) = self.jobs.record_bot_error(job.id, &message).await {
                    warn!(bot_job_id = %job.id, error = %store_err, "failed to record bot error");
                }
                return Err(ServerError::ExternalService(e));
            }
        };

        let status = BotStatus::from_external(external.status.as_deref());
        let update = BotJobUpdate {
            status,
            started_at: external.started_at,
            completed_at: external.ended_at,
        };
        self.jobs.update_bot_job(job.id, update).await?;

        if status != job.status {
            info!(bot_job_id = %job.id, from = %job.status, to = %status, "bot status changed");
        } else {
            debug!(bot_job_id = %job.id, status = %status, "bot status unchanged");
        }

        let transcript = if status == BotStatus::Completed && external.transcript_available {
            self.save_transcript(job, &external).await
        } else {
            TranscriptOutcome::NotAvailable
        };

        Ok(PollOutcome {
            bot_job_id: job.id,
            status,
            transcript,
        })
    }

    async fn save_transcript(&self, job: &BotJob, external: &ExternalBot) -> TranscriptOutcome {
        let fetched = match self.bots.get_transcript(&external.id).await {
            Ok(t) => t,
            Err(e) => {
                warn!(bot_job_id = %job.id, error = %e, "transcript fetch failed");
                return TranscriptOutcome::Failed {
                    message: format!("failed to fetch transcript: {}", e),
                };
            }
        };

        let Some(content) = fetched.text() else {
            debug!(bot_job_id = %job.id, "transcript is empty, nothing stored");
            return TranscriptOutcome::Empty;
        };

        let transcript = Transcript {
            id: Uuid::new_v4(),
            meeting_id: job.meeting_id,
            bot_job_id: job.id,
            content: content.to_string(),
            summary: fetched.summary.clone(),
            duration_seconds: fetched.duration_seconds,
            participant_count: fetched.participant_count,
            participants: fetched.participants.clone(),
            updated_at: self.clock.now(),
        };

        match self.transcripts.upsert_transcript(transcript).await {
            Ok(upsert) => {
                info!(bot_job_id = %job.id, ?upsert, "transcript saved");
                TranscriptOutcome::Saved {
                    inserted: upsert == Upsert::Inserted,
                }
            }
            Err(e) => {
                warn!(bot_job_id = %job.id, error = %e, "transcript write failed");
                TranscriptOutcome::Failed {
                    message: format!("failed to store transcript: {}", e),
                }
            }
        }
    }

    /// Polls every non-terminal job with bounded concurrency.
    ///
    /// Per-job errors are collected into the report; only listing the jobs
    /// can fail the call.
    pub async fn poll_all_active(&self) -> ServerResult<PollReport> {
        let jobs = self.jobs.list_active_bot_jobs().await?;
        if jobs.is_empty() {
            debug!("no active bot jobs to poll");
            return Ok(PollReport::default());
        }

        info!(count = jobs.len(), concurrency = self.concurrency, "polling active bot jobs");
        let results: Vec<(Uuid, ServerResult<PollOutcome>)> = stream::iter(jobs)
            .map(|job| async move { (job.id, self.poll_once(&job).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = PollReport::default();
        for (bot_job_id, result) in results {
            match result {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => report.failures.push(PollFailure {
                    bot_job_id,
                    error: e.to_string(),
                }),
            }
        }
        report.outcomes.sort_by_key(|o| o.bot_job_id);
        report.failures.sort_by_key(|f| f.bot_job_id);

        info!(
            succeeded = report.outcomes.len(),
            failed = report.failures.len(),
            "bot poll finished"
        );
        Ok(report)
    }
}
