//! Request authentication.
//!
//! User routes trust the `X-User-Id` header set by the session layer in front
//! of this service; see `[server] allow_remote`. Cron routes need `Authorization: Bearer {cron_secret}`.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use super::AppState;
use crate::error::ServerError;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated user, stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

pub async fn require_user(mut request: Request, next: Next) -> Result<Response, ServerError> {
    let user_id = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServerError::unauthorized("missing user identity"))?
        .to_string();

    request.extensions_mut().insert(UserId(user_id));
    Ok(next.run(request).await)
}

pub async fn require_cron(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let Some(secret) = state.cron_secret.as_deref() else {
        return Err(ServerError::unauthorized("cron routes are disabled"));
    };

    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ServerError::unauthorized("missing cron secret"))?;

    if !constant_time_eq(token.as_bytes(), secret.as_bytes()) {
        return Err(ServerError::unauthorized("invalid cron secret"));
    }

    Ok(next.run(request).await)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
