//! Google adapter configuration.

use std::time::Duration;

use crate::oauth::OAuthCredentials;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Scopes requested at consent time.
pub const DEFAULT_SCOPES: &[&str] = &[
    "openid",
    "email",
    "profile",
    "https://www.googleapis.com/auth/calendar.readonly",
];

/// Configuration for the Google adapter.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub credentials: OAuthCredentials,
    pub auth_url: String,
    pub token_url: String,
    /// Base URL of the Calendar v3 API.
    pub api_base: String,
    pub scopes: Vec<String>,
    /// Upper bound on events fetched per calendar.
    pub max_results_per_calendar: u32,
    /// Lifetime assumed when a refresh response omits `expires_in`.
    pub default_expires_in: i64,
    pub timeout: Duration,
}

impl GoogleConfig {
    pub fn new(credentials: OAuthCredentials) -> Self {
        Self {
            credentials,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            api_base: CALENDAR_API_BASE.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            max_results_per_calendar: 250,
            default_expires_in: 3600,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn with_api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }
}
