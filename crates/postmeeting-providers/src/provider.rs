//! Adapter traits.
//!
//! Every external API sits behind one of these traits so the token manager,
//! the bot poller and the orchestration services can be driven by fakes.
//!
//! - [`TokenRefresher`] - refresh grant
//! - [`OAuthProvider`] - authorization URL and code exchange
//! - [`CalendarSource`] - list a user's calendar events (Google)
//! - [`SocialPublisher`] - publish a post (LinkedIn, Facebook)

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use postmeeting_core::{Provider, TimeWindow};
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of a successful refresh grant.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Lifetime in seconds, as reported by the provider.
    pub expires_in: Option<i64>,
}

impl std::fmt::Debug for RefreshedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshedToken")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Result of exchanging an authorization code.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
    pub account_id: Option<String>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("account_id", &self.account_id)
            .finish()
    }
}

/// Exchanges refresh tokens for new access tokens.
pub trait TokenRefresher: Send + Sync {
    /// Which provider this adapter talks to.
    fn provider(&self) -> Provider;

    /// Exchanges a refresh token for a new access token.
    ///
    /// Any network failure or provider rejection is an error; the caller
    /// decides what to do with the stored credential.
    fn refresh<'a>(&'a self, refresh_token: &'a str)
    -> BoxFuture<'a, ProviderResult<RefreshedToken>>;
}

/// The consent half of an OAuth 2.0 provider.
pub trait OAuthProvider: TokenRefresher {
    /// Builds the consent page URL.
    ///
    /// `code_challenge` is only used by providers that support PKCE.
    fn authorization_url(
        &self,
        redirect_uri: &str,
        state: &str,
        code_challenge: Option<&str>,
    ) -> String;

    /// Whether the consent flow carries a PKCE challenge.
    fn uses_pkce(&self) -> bool {
        false
    }

    /// Exchanges an authorization code for a grant.
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        redirect_uri: &'a str,
        code_verifier: Option<&'a str>,
    ) -> BoxFuture<'a, ProviderResult<TokenGrant>>;
}

/// A calendar event, already reduced to what the service stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub calendar_id: String,
    pub calendar_name: Option<String>,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub hangout_link: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub attendees: Vec<String>,
}

/// Reads calendar events with an access token.
pub trait CalendarSource: Send + Sync {
    /// Lists events starting inside `window` across all readable calendars.
    fn list_events<'a>(
        &'a self,
        access_token: &'a str,
        window: TimeWindow,
    ) -> BoxFuture<'a, ProviderResult<Vec<CalendarEvent>>>;
}

/// Content of a post to publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialPost {
    pub text: String,
    /// Facebook page to post to. `None` posts to the user's own feed.
    pub page_id: Option<String>,
}

impl SocialPost {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            page_id: None,
        }
    }

    pub fn with_page_id(mut self, page_id: impl Into<String>) -> Self {
        self.page_id = Some(page_id.into());
        self
    }
}

/// What a provider returns for a published post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReceipt {
    pub post_id: Option<String>,
}

/// Publishes posts on a social network.
pub trait SocialPublisher: Send + Sync {
    /// The network this publisher posts to.
    fn network(&self) -> Provider;

    fn publish<'a>(
        &'a self,
        access_token: &'a str,
        post: &'a SocialPost,
    ) -> BoxFuture<'a, ProviderResult<PostReceipt>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn social_post_builder() {
        let post = SocialPost::new("Hello").with_page_id("123");
        assert_eq!(post.text, "Hello");
        assert_eq!(post.page_id.as_deref(), Some("123"));
    }

    #[test]
    fn token_debug_is_redacted() {
        let grant = TokenGrant {
            access_token: "sekrit".into(),
            refresh_token: Some("also-sekrit".into()),
            expires_in: Some(3600),
            scope: None,
            account_id: None,
        };
        let debug = format!("{:?}", grant);
        assert!(!debug.contains("sekrit"));
        assert!(debug.contains("has_refresh_token: true"));

        let refreshed = RefreshedToken {
            access_token: "sekrit".into(),
            expires_in: None,
        };
        assert!(!format!("{:?}", refreshed).contains("sekrit"));
    }
}
