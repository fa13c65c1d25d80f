//! LinkedIn adapter: OAuth and member posts through the UGC API.

use std::time::Duration;

use postmeeting_core::Provider;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};
use crate::http;
use crate::oauth::{OAuthCredentials, post_token_form, token_error_message, with_query};
use crate::provider::{
    BoxFuture, OAuthProvider, PostReceipt, RefreshedToken, SocialPost, SocialPublisher, TokenGrant,
    TokenRefresher,
};

const LINKEDIN_AUTH_URL: &str = "https://www.linkedin.com/oauth/v2/authorization";
const LINKEDIN_TOKEN_URL: &str = "https://www.linkedin.com/oauth/v2/accessToken";
const LINKEDIN_API_BASE: &str = "https://api.linkedin.com";
const PERSON_URN_PREFIX: &str = "urn:li:person:";

/// Configuration for the LinkedIn adapter.
#[derive(Debug, Clone)]
pub struct LinkedInConfig {
    pub credentials: OAuthCredentials,
    pub auth_url: String,
    pub token_url: String,
    pub api_base: String,
    pub scopes: Vec<String>,
    pub timeout: Duration,
}

impl LinkedInConfig {
    pub fn new(credentials: OAuthCredentials) -> Self {
        Self {
            credentials,
            auth_url: LINKEDIN_AUTH_URL.to_string(),
            token_url: LINKEDIN_TOKEN_URL.to_string(),
            api_base: LINKEDIN_API_BASE.to_string(),
            scopes: vec![
                "openid".to_string(),
                "profile".to_string(),
                "w_member_social".to_string(),
            ],
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

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// LinkedIn OAuth client and post publisher.
#[derive(Debug, Clone)]
pub struct LinkedInClient {
    config: LinkedInConfig,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Profile {
    id: Option<String>,
    sub: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedPost {
    id: Option<String>,
}

/// Extracts the message from a LinkedIn error body.
fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<MessageBody>(body)
        .ok()
        .map(|b| b.message)
        .or_else(|| token_error_message(body))
}

/// `urn:li:person:{id}`, leaving ids that already are URNs alone.
pub fn person_urn(profile_id: &str) -> String {
    if profile_id.starts_with(PERSON_URN_PREFIX) {
        profile_id.to_string()
    } else {
        format!("{}{}", PERSON_URN_PREFIX, profile_id)
    }
}

impl LinkedInClient {
    pub fn new(config: LinkedInConfig) -> ProviderResult<Self> {
        let http_client = http::build_client(config.timeout)?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn fail(status: reqwest::StatusCode, what: &str, body: &str) -> ProviderError {
        let detail = error_message(body).unwrap_or_else(|| http::snippet(body));
        http::status_error(status, format!("{} failed ({}): {}", what, status, detail))
            .with_provider("linkedin")
    }

    /// Looks up the member id behind an access token.
    pub async fn profile_id(&self, access_token: &str) -> ProviderResult<String> {
        let url = format!("{}/v2/me", self.config.api_base);
        let (status, body) = http::execute(self.http_client.get(&url).bearer_auth(access_token))
            .await
            .map_err(|e| e.with_provider("linkedin"))?;

        if !status.is_success() {
            return Err(Self::fail(status, "profile lookup", &body));
        }

        let profile: Profile =
            http::parse_json(&body, "profile").map_err(|e| e.with_provider("linkedin"))?;
        profile
            .id
            .or(profile.sub)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                ProviderError::invalid_response("profile has neither id nor sub")
                    .with_provider("linkedin")
            })
    }

    async fn create_post(&self, access_token: &str, text: &str) -> ProviderResult<PostReceipt> {
        let author = person_urn(&self.profile_id(access_token).await?);
        debug!(author = %author, "publishing LinkedIn post");

        let payload = json!({
            "author": author,
            "lifecycleState": "PUBLISHED",
            "specificContent": {
                "com.linkedin.ugc.ShareContent": {
                    "shareCommentary": { "text": text },
                    "shareMediaCategory": "NONE"
                }
            },
            "visibility": {
                "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC"
            }
        });

        let url = format!("{}/v2/ugcPosts", self.config.api_base);
        let request = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&payload);
        let (status, body) = http::execute(request)
            .await
            .map_err(|e| e.with_provider("linkedin"))?;

        if !status.is_success() {
            return Err(Self::fail(status, "post", &body));
        }

        let post_id = serde_json::from_str::<CreatedPost>(&body)
            .ok()
            .and_then(|p| p.id);
        info!(post_id = ?post_id, "published LinkedIn post");
        Ok(PostReceipt { post_id })
    }

    async fn refresh_grant(&self, refresh_token: &str) -> ProviderResult<RefreshedToken> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.credentials.client_id.as_str()),
            ("client_secret", self.config.credentials.client_secret.as_str()),
        ];
        let response = post_token_form(
            &self.http_client,
            &self.config.token_url,
            &params,
            Provider::LinkedIn,
            error_message,
        )
        .await?;
        info!(provider = "linkedin", "refreshed access token");
        Ok(response.into_refreshed())
    }

    async fn exchange(&self, code: &str, redirect_uri: &str) -> ProviderResult<TokenGrant> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.config.credentials.client_id.as_str()),
            ("client_secret", self.config.credentials.client_secret.as_str()),
        ];
        let response = post_token_form(
            &self.http_client,
            &self.config.token_url,
            &params,
            Provider::LinkedIn,
            error_message,
        )
        .await?;

        let mut grant = response.into_grant();
        grant.account_id = Some(self.profile_id(&grant.access_token).await?);
        info!(provider = "linkedin", "obtained tokens");
        Ok(grant)
    }
}

impl TokenRefresher for LinkedInClient {
    fn provider(&self) -> Provider {
        Provider::LinkedIn
    }

    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, ProviderResult<RefreshedToken>> {
        Box::pin(self.refresh_grant(refresh_token))
    }
}

impl OAuthProvider for LinkedInClient {
    fn authorization_url(
        &self,
        redirect_uri: &str,
        state: &str,
        _code_challenge: Option<&str>,
    ) -> String {
        let scope = self.config.scopes.join(" ");
        with_query(
            &self.config.auth_url,
            &[
                ("response_type", "code"),
                ("client_id", self.config.credentials.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("state", state),
                ("scope", scope.as_str()),
            ],
        )
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        redirect_uri: &'a str,
        _code_verifier: Option<&'a str>,
    ) -> BoxFuture<'a, ProviderResult<TokenGrant>> {
        Box::pin(self.exchange(code, redirect_uri))
    }
}

impl SocialPublisher for LinkedInClient {
    fn network(&self) -> Provider {
        Provider::LinkedIn
    }

    fn publish<'a>(
        &'a self,
        access_token: &'a str,
        post: &'a SocialPost,
    ) -> BoxFuture<'a, ProviderResult<PostReceipt>> {
        Box::pin(self.create_post(access_token, &post.text))
    }
}
