//! Shared HTTP plumbing for the adapters.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::{ProviderError, ProviderResult};

const USER_AGENT: &str = concat!("postmeeting/", env!("CARGO_PKG_VERSION"));

/// Builds a client with a per-request timeout.
pub(crate) fn build_client(timeout: Duration) -> ProviderResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ProviderError::internal(format!("failed to create HTTP client: {}", e)))
}

/// Converts a transport failure into a network error.
pub(crate) fn send_error(err: reqwest::Error) -> ProviderError {
    let message = if err.is_timeout() {
        "request timeout".to_string()
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        format!("request failed: {}", err)
    };
    ProviderError::network(message).with_source(err)
}

/// Maps a non-success HTTP status onto the error taxonomy.
pub(crate) fn status_error(status: StatusCode, message: impl Into<String>) -> ProviderError {
    ProviderError::from_status(status.as_u16(), message)
}

/// Sends a request and returns the status and body text.
pub(crate) async fn execute(
    request: reqwest::RequestBuilder,
) -> ProviderResult<(StatusCode, String)> {
    let response = request.send().await.map_err(send_error)?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::network(format!("failed to read response: {}", e)))?;
    Ok((status, body))
}

/// Parses a JSON body, reporting what was being parsed on failure.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &str, what: &str) -> ProviderResult<T> {
    serde_json::from_str(body)
        .map_err(|e| ProviderError::invalid_response(format!("invalid {} response: {}", what, e)))
}

/// Truncates a response body for inclusion in an error message.
pub(crate) fn snippet(body: &str) -> String {
    const MAX: usize = 300;
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(MAX).collect();
        format!("{}…", cut)
    }
}
