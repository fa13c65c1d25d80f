//! Fakes shared by the service tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use postmeeting_core::{Credential, FixedClock, Provider, TimeWindow};
use postmeeting_providers::{
    BotClient, BoxFuture, CalendarEvent, CalendarSource, ContentGenerator, CreateBotRequest,
    ExternalBot, ExternalTranscript, PostReceipt, PostStyle, ProviderError, ProviderErrorCode,
    ProviderResult, RefreshedToken, SocialPost, SocialPublisher, TokenRefresher,
};

use crate::store::{CredentialStore, LocalStore, StoreResult};

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 15, 10, 0, 0).unwrap()
}

pub(crate) fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(t0()))
}

/// A provider error that can be re-created on every call.
#[derive(Debug, Clone)]
pub(crate) struct ScriptedError {
    code: ProviderErrorCode,
    message: String,
}

impl ScriptedError {
    pub(crate) fn new(error: ProviderError) -> Self {
        Self {
            code: error.code(),
            message: error.message().to_string(),
        }
    }

    pub(crate) fn build(&self) -> ProviderError {
        ProviderError::new(self.code, self.message.clone())
    }
}

/// Credential store wrapper that counts writes.
pub(crate) struct CountingCredentials {
    inner: LocalStore,
    writes: AtomicUsize,
}

impl CountingCredentials {
    pub(crate) fn new(inner: LocalStore) -> Self {
        Self {
            inner,
            writes: AtomicUsize::new(0),
        }
    }

    pub(crate) fn inner(&self) -> &LocalStore {
        &self.inner
    }

    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl CredentialStore for CountingCredentials {
    fn get_credential<'a>(
        &'a self,
        user_id: &'a str,
        provider: Provider,
    ) -> BoxFuture<'a, StoreResult<Option<Credential>>> {
        self.inner.get_credential(user_id, provider)
    }

    fn upsert_credential(&self, credential: Credential) -> BoxFuture<'_, StoreResult<()>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert_credential(credential)
    }

    fn update_access_token<'a>(
        &'a self,
        user_id: &'a str,
        provider: Provider,
        access_token: &'a str,
        expires_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<()>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner
            .update_access_token(user_id, provider, access_token, expires_at, updated_at)
    }

    fn delete_credential<'a>(
        &'a self,
        user_id: &'a str,
        provider: Provider,
    ) -> BoxFuture<'a, StoreResult<bool>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_credential(user_id, provider)
    }
}

/// Refresher returning a fixed result.
pub(crate) struct FakeRefresher {
    provider: Provider,
    result: Result<(String, Option<i64>), ScriptedError>,
    calls: AtomicUsize,
    last: Mutex<Option<String>>,
}

impl FakeRefresher {
    pub(crate) fn succeeding(provider: Provider, token: &str, expires_in: Option<i64>) -> Self {
        Self {
            provider,
            result: Ok((token.to_string(), expires_in)),
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    pub(crate) fn failing(provider: Provider, error: ProviderError) -> Self {
        Self {
            provider,
            result: Err(ScriptedError::new(error)),
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_refresh_token(&self) -> Option<String> {
        self.last.lock().unwrap().clone()
    }
}

impl TokenRefresher for FakeRefresher {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, ProviderResult<RefreshedToken>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(refresh_token.to_string());
            match &self.result {
                Ok((token, expires_in)) => Ok(RefreshedToken {
                    access_token: token.clone(),
                    expires_in: *expires_in,
                }),
                Err(e) => Err(e.build()),
            }
        })
    }
}

/// Bot client answering from per-bot scripts.
#[derive(Default)]
pub(crate) struct ScriptedBots {
    bots: Mutex<HashMap<String, Result<ExternalBot, ScriptedError>>>,
    transcripts: Mutex<HashMap<String, Result<ExternalTranscript, ScriptedError>>>,
    create_error: Mutex<Option<ScriptedError>>,
    created: Mutex<Vec<CreateBotRequest>>,
    transcript_calls: AtomicUsize,
    next_id: AtomicUsize,
}

impl ScriptedBots {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_bot(&self, bot: ExternalBot) {
        self.bots.lock().unwrap().insert(bot.id.clone(), Ok(bot));
    }

    pub(crate) fn fail_bot(&self, id: &str, error: ProviderError) {
        self.bots
            .lock()
            .unwrap()
            .insert(id.to_string(), Err(ScriptedError::new(error)));
    }

    pub(crate) fn set_transcript(&self, id: &str, transcript: ExternalTranscript) {
        self.transcripts
            .lock()
            .unwrap()
            .insert(id.to_string(), Ok(transcript));
    }

    pub(crate) fn fail_transcript(&self, id: &str, error: ProviderError) {
        self.transcripts
            .lock()
            .unwrap()
            .insert(id.to_string(), Err(ScriptedError::new(error)));
    }

    pub(crate) fn fail_create(&self, error: ProviderError) {
        *self.create_error.lock().unwrap() = Some(ScriptedError::new(error));
    }

    pub(crate) fn created(&self) -> Vec<CreateBotRequest> {
        self.created.lock().unwrap().clone()
    }

    pub(crate) fn transcript_calls(&self) -> usize {
        self.transcript_calls.load(Ordering::SeqCst)
    }
}

impl BotClient for ScriptedBots {
    fn create_bot<'a>(
        &'a self,
        request: &'a CreateBotRequest,
    ) -> BoxFuture<'a, ProviderResult<ExternalBot>> {
        Box::pin(async move {
            if let Some(e) = self.create_error.lock().unwrap().as_ref() {
                return Err(e.build());
            }
            tokio::task::yield_now().await;
            self.created.lock().unwrap().push(request.clone());
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(ExternalBot {
                id: format!("bot-{}", n + 1),
                status: Some("pending".into()),
                ..ExternalBot::default()
            })
        })
    }

    fn get_bot<'a>(&'a self, bot_id: &'a str) -> BoxFuture<'a, ProviderResult<ExternalBot>> {
        Box::pin(async move {
            match self.bots.lock().unwrap().get(bot_id) {
                Some(Ok(bot)) => Ok(bot.clone()),
                Some(Err(e)) => Err(e.build()),
                None => Err(ProviderError::not_found(format!("bot {} not found", bot_id))),
            }
        })
    }

    fn get_transcript<'a>(
        &'a self,
        bot_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<ExternalTranscript>> {
        Box::pin(async move {
            self.transcript_calls.fetch_add(1, Ordering::SeqCst);
            match self.transcripts.lock().unwrap().get(bot_id) {
                Some(Ok(t)) => Ok(t.clone()),
                Some(Err(e)) => Err(e.build()),
                None => Err(ProviderError::not_found("transcript not ready")),
            }
        })
    }
}

/// Publisher recording what it was asked to post.
pub(crate) struct FakePublisher {
    network: Provider,
    error: Option<ScriptedError>,
    posts: Mutex<Vec<(String, SocialPost)>>,
}

impl FakePublisher {
    pub(crate) fn succeeding(network: Provider) -> Self {
        Self {
            network,
            error: None,
            posts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(network: Provider, error: ProviderError) -> Self {
        Self {
            network,
            error: Some(ScriptedError::new(error)),
            posts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn posts(&self) -> Vec<(String, SocialPost)> {
        self.posts.lock().unwrap().clone()
    }
}

impl SocialPublisher for FakePublisher {
    fn network(&self) -> Provider {
        self.network
    }

    fn publish<'a>(
        &'a self,
        access_token: &'a str,
        post: &'a SocialPost,
    ) -> BoxFuture<'a, ProviderResult<PostReceipt>> {
        Box::pin(async move {
            self.posts
                .lock()
                .unwrap()
                .push((access_token.to_string(), post.clone()));
            match &self.error {
                Some(e) => Err(e.build()),
                None => Ok(PostReceipt {
                    post_id: Some(format!("{}-post-1", self.network)),
                }),
            }
        })
    }
}

/// Calendar returning a fixed event list.
#[derive(Default)]
pub(crate) struct FakeCalendar {
    events: Vec<CalendarEvent>,
    windows: Mutex<Vec<TimeWindow>>,
}

impl FakeCalendar {
    pub(crate) fn with_events(events: Vec<CalendarEvent>) -> Self {
        Self {
            events,
            windows: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn windows(&self) -> Vec<TimeWindow> {
        self.windows.lock().unwrap().clone()
    }
}

impl CalendarSource for FakeCalendar {
    fn list_events<'a>(
        &'a self,
        _access_token: &'a str,
        window: TimeWindow,
    ) -> BoxFuture<'a, ProviderResult<Vec<CalendarEvent>>> {
        Box::pin(async move {
            self.windows.lock().unwrap().push(window);
            Ok(self.events.clone())
        })
    }
}

/// Generator echoing its inputs.
#[derive(Default)]
pub(crate) struct EchoGenerator {
    error: Option<ScriptedError>,
}

impl EchoGenerator {
    pub(crate) fn failing(error: ProviderError) -> Self {
        Self {
            error: Some(ScriptedError::new(error)),
        }
    }
}

impl ContentGenerator for EchoGenerator {
    fn generate_email<'a>(
        &'a self,
        transcript: &'a str,
        attendees: &'a [String],
    ) -> BoxFuture<'a, ProviderResult<String>> {
        Box::pin(async move {
            match &self.error {
                Some(e) => Err(e.build()),
                None => Ok(format!("email to {}: {}", attendees.join(","), transcript)),
            }
        })
    }

    fn generate_post<'a>(
        &'a self,
        transcript: &'a str,
        style: &'a PostStyle,
    ) -> BoxFuture<'a, ProviderResult<String>> {
        Box::pin(async move {
            match &self.error {
                Some(e) => Err(e.build()),
                None => Ok(format!(
                    "post ({}, {} tags): {}",
                    style.tone, style.hashtag_count, transcript
                )),
            }
        })
    }
}
