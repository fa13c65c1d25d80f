//! Provider connection routes: consent URL, callback, status, disconnect.

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use postmeeting_core::Provider;
use postmeeting_providers::{FacebookPage, PkceFlow, generate_state};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::AppState;
use super::auth::UserId;
use crate::error::{ServerError, ServerResult};
use crate::tokens::ConnectionStatus;

fn parse_provider(raw: &str) -> ServerResult<Provider> {
    raw.parse::<Provider>().map_err(ServerError::validation)
}

#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub url: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackRequest {
    pub code: String,
    pub state: String,
}

pub async fn status(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(provider): Path<String>,
) -> ServerResult<Json<ConnectionStatus>> {
    let provider = parse_provider(&provider)?;
    Ok(Json(state.tokens.status(&user_id, provider).await?))
}

pub async fn authorize(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(provider): Path<String>,
) -> ServerResult<Json<AuthorizeResponse>> {
    let provider = parse_provider(&provider)?;
    let oauth = state.oauth_provider(provider)?;
    let redirect_uri = state.redirect_uri(provider);

    let (csrf_state, url, verifier) = if oauth.uses_pkce() {
        let flow = PkceFlow::new();
        let url = oauth.authorization_url(&redirect_uri, &flow.state, Some(&flow.challenge));
        (flow.state, url, Some(flow.verifier))
    } else {
        let csrf_state = generate_state();
        let url = oauth.authorization_url(&redirect_uri, &csrf_state, None);
        (csrf_state, url, None)
    };

    state
        .authorizations
        .insert(csrf_state.clone(), &user_id, provider, redirect_uri, verifier)
        .await;

    Ok(Json(AuthorizeResponse {
        url,
        state: csrf_state,
    }))
}

pub async fn callback(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(provider): Path<String>,
    Json(request): Json<CallbackRequest>,
) -> ServerResult<Json<ConnectionStatus>> {
    let provider = parse_provider(&provider)?;
    if request.code.trim().is_empty() {
        return Err(ServerError::validation("code is required"));
    }
    let oauth = state.oauth_provider(provider)?;
    let pending = state
        .authorizations
        .take(&request.state, &user_id, provider)
        .await?;

    let grant = oauth
        .exchange_code(
            &request.code,
            &pending.redirect_uri,
            pending.code_verifier.as_deref(),
        )
        .await
        .map_err(ServerError::ExternalService)?;

    state.tokens.connect(&user_id, provider, grant).await?;
    info!(user_id, provider = %provider, "OAuth callback completed");
    Ok(Json(state.tokens.status(&user_id, provider).await?))
}

pub async fn disconnect(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(provider): Path<String>,
) -> ServerResult<StatusCode> {
    let provider = parse_provider(&provider)?;
    state.tokens.disconnect(&user_id, provider).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Pages the connected Facebook user manages, for choosing a post target.
pub async fn facebook_pages(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
) -> ServerResult<Json<Vec<FacebookPage>>> {
    let facebook = state
        .facebook
        .as_ref()
        .ok_or_else(|| ServerError::validation("facebook is not configured"))?;
    let token = state
        .tokens
        .get_valid_access_token(&user_id, Provider::Facebook)
        .await?;
    let pages = facebook
        .list_pages(&token)
        .await
        .map_err(ServerError::ExternalService)?;
    Ok(Json(pages))
}
