//! Wires configuration, adapters, and services into an [`AppState`].

use std::collections::HashMap;
use std::sync::Arc;

use postmeeting_core::{Clock, Provider, SystemClock};
use postmeeting_providers::{
    FacebookClient, GoogleCalendar, GoogleOAuth, LinkedInClient, OAuthProvider, OpenAiGenerator,
    ProviderError, RecallClient,
};
use tracing::{info, warn};

use crate::authorizations::PendingAuthorizations;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::http::AppState;
use crate::meetings::MeetingService;
use crate::poller::BotPoller;
use crate::scheduler::{BackgroundJobs, spawn_periodic};
use crate::social::SocialService;
use crate::store::LocalStore;
use crate::tokens::TokenManager;

fn adapter_error(e: ProviderError) -> ServerError {
    ServerError::config(e.to_string())
}

/// Builds the application state from `config`, backed by `store`.
///
/// `[google]` and `[recall]` are required; the other providers and the
/// content generator are optional.
pub fn build_state(config: &ServerConfig, store: Arc<LocalStore>) -> ServerResult<AppState> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let google = config
        .google_config()?
        .ok_or_else(|| ServerError::config("[google] section is required"))?;
    let recall = config
        .recall_config()?
        .ok_or_else(|| ServerError::config("[recall] section is required"))?;

    let google_oauth = Arc::new(GoogleOAuth::new(google.clone()).map_err(adapter_error)?);
    let calendar = Arc::new(GoogleCalendar::new(google).map_err(adapter_error)?);
    let bots = Arc::new(RecallClient::new(recall).map_err(adapter_error)?);

    let linkedin = config
        .linkedin_config()?
        .map(LinkedInClient::new)
        .transpose()
        .map_err(adapter_error)?
        .map(Arc::new);
    let facebook = config
        .facebook_config()?
        .map(FacebookClient::new)
        .transpose()
        .map_err(adapter_error)?
        .map(Arc::new);

    let mut tokens =
        TokenManager::new(store.clone(), clock.clone()).with_refresher(google_oauth.clone());
    let mut oauth: HashMap<Provider, Arc<dyn OAuthProvider>> = HashMap::new();
    oauth.insert(Provider::Google, google_oauth);
    if let Some(client) = &linkedin {
        tokens = tokens.with_refresher(client.clone());
        oauth.insert(Provider::LinkedIn, client.clone());
    }
    if let Some(client) = &facebook {
        tokens = tokens.with_refresher(client.clone());
        oauth.insert(Provider::Facebook, client.clone());
    }
    let tokens = Arc::new(tokens);

    let poller = Arc::new(
        BotPoller::new(bots.clone(), store.clone(), store.clone(), clock.clone())
            .with_concurrency(config.server.poll_concurrency),
    );

    let mut meetings = MeetingService::new(
        store.clone(),
        tokens.clone(),
        calendar,
        bots,
        poller.clone(),
        clock.clone(),
    );
    match config.openai_config()? {
        Some(openai) => {
            let generator = OpenAiGenerator::new(openai).map_err(adapter_error)?;
            meetings = meetings.with_generator(Arc::new(generator));
        }
        None => warn!("no [openai] section, content generation is disabled"),
    }

    let mut social = SocialService::new(tokens.clone(), store.clone(), clock.clone());
    if let Some(client) = &linkedin {
        social = social.with_publisher(client.clone());
    }
    if let Some(client) = &facebook {
        social = social.with_publisher(client.clone());
    }

    let cron_secret = config.cron_secret()?;
    if cron_secret.is_none() {
        warn!("no cron_secret configured, cron routes are disabled");
    }

    info!(
        providers = ?oauth.keys().collect::<Vec<_>>(),
        "application state ready"
    );

    Ok(AppState {
        tokens,
        meetings: Arc::new(meetings),
        social: Arc::new(social),
        poller,
        settings: store,
        oauth: Arc::new(oauth),
        facebook,
        authorizations: Arc::new(PendingAuthorizations::new(config.oauth_state_ttl(), clock)),
        cron_secret: cron_secret.map(Arc::from),
        redirect_base: Arc::from(config.server.redirect_base.as_str()),
    })
}

/// Starts the in-process poll and join loops when `[scheduler]` enables them.
pub fn spawn_background(config: &ServerConfig, state: &AppState) -> BackgroundJobs {
    let mut jobs = BackgroundJobs::default();
    if !config.scheduler.enabled {
        return jobs;
    }

    let poller = state.poller.clone();
    jobs.push(spawn_periodic("poll-all", config.scheduler.poll_config(), move || {
        let poller = poller.clone();
        async move {
            let report = poller.poll_all_active().await.map_err(|e| e.to_string())?;
            info!(
                processed = report.processed(),
                failed = report.failures.len(),
                "poll-all finished"
            );
            Ok(())
        }
    }));

    let meetings = state.meetings.clone();
    jobs.push(spawn_periodic(
        "join-meetings",
        config.scheduler.join_config(),
        move || {
            let meetings = meetings.clone();
            async move {
                let report = meetings.join_upcoming().await.map_err(|e| e.to_string())?;
                info!(
                    joined = report.joined.len(),
                    failed = report.failures.len(),
                    "join-meetings finished"
                );
                Ok(())
            }
        },
    ));

    jobs
}
