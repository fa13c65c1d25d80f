//! Google adapter.
//!
//! - [`GoogleOAuth`] - consent URL, code exchange and refresh grant
//! - [`GoogleCalendar`] - events across every calendar the user can read
//!
//! Both share a [`GoogleConfig`], so endpoint URLs can be pointed at a mock
//! server in tests.

mod client;
mod config;
mod oauth;

pub use client::GoogleCalendar;
pub use config::{DEFAULT_SCOPES, GoogleConfig};
pub use oauth::GoogleOAuth;

use serde::Deserialize;

use crate::oauth::token_error_message;

/// `{"error": {"code": 401, "message": "..."}}` as returned by Google APIs.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Extracts the message from either Google error shape.
///
/// Token endpoints answer `{"error", "error_description"}`, REST APIs
/// answer `{"error": {"message"}}`.
pub(crate) fn error_message(body: &str) -> Option<String> {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
        return Some(parsed.error.message);
    }
    token_error_message(body)
}
