//! HTTP surface.
//!
//! | Route | Guard |
//! |-------|-------|
//! | `/health` | none |
//! | `/api/cron/*` | `Authorization: Bearer {cron_secret}` |
//! | everything else under `/api` | `X-User-Id` |

mod auth;
mod connections;
mod error;
mod handlers;

pub use auth::{USER_ID_HEADER, UserId};
pub use error::ErrorBody;

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use postmeeting_core::Provider;
use postmeeting_providers::{FacebookClient, OAuthProvider};
use tower_http::trace::TraceLayer;

use crate::authorizations::PendingAuthorizations;
use crate::error::{ServerError, ServerResult};
use crate::meetings::MeetingService;
use crate::poller::BotPoller;
use crate::social::SocialService;
use crate::store::SettingsStore;
use crate::tokens::TokenManager;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenManager>,
    pub meetings: Arc<MeetingService>,
    pub social: Arc<SocialService>,
    pub poller: Arc<BotPoller>,
    pub settings: Arc<dyn SettingsStore>,
    pub oauth: Arc<HashMap<Provider, Arc<dyn OAuthProvider>>>,
    pub facebook: Option<Arc<FacebookClient>>,
    pub authorizations: Arc<PendingAuthorizations>,
    pub cron_secret: Option<Arc<str>>,
    pub redirect_base: Arc<str>,
}

impl AppState {
    pub(crate) fn oauth_provider(
        &self,
        provider: Provider,
    ) -> ServerResult<&Arc<dyn OAuthProvider>> {
        self.oauth
            .get(&provider)
            .ok_or_else(|| ServerError::validation(format!("{} is not configured", provider)))
    }

    pub(crate) fn redirect_uri(&self, provider: Provider) -> String {
        format!(
            "{}/connections/{}/callback",
            self.redirect_base.trim_end_matches('/'),
            provider
        )
    }
}

/// Builds the router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cron = Router::new()
        .route("/api/cron/poll-all", get(handlers::cron_poll_all))
        .route("/api/cron/join-meetings", get(handlers::cron_join_meetings))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_cron,
        ));

    let user = Router::new()
        .route("/api/calendar/sync", post(handlers::sync_calendar))
        .route("/api/meetings/{id}/notetaker", post(handlers::set_notetaker))
        .route("/api/bots", post(handlers::create_bot))
        .route("/api/bots/{id}/poll", post(handlers::poll_bot))
        .route("/api/ai/email", post(handlers::generate_email))
        .route("/api/ai/post", post(handlers::generate_post))
        .route("/api/social/post", post(handlers::publish_post))
        .route("/api/social/posts", get(handlers::post_history))
        .route(
            "/api/settings",
            get(handlers::get_settings).put(handlers::put_settings),
        )
        .route(
            "/api/connections/{provider}",
            get(connections::status).delete(connections::disconnect),
        )
        .route(
            "/api/connections/{provider}/authorize",
            get(connections::authorize),
        )
        .route(
            "/api/connections/{provider}/callback",
            post(connections::callback),
        )
        .route("/api/facebook/pages", get(connections::facebook_pages))
        .layer(axum::middleware::from_fn(auth::require_user));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(cron)
        .merge(user)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
