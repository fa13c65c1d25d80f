//! Facebook adapter: Graph API OAuth, long-lived token exchange, feed posts.

use std::time::Duration;

use postmeeting_core::Provider;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};
use crate::http;
use crate::oauth::{OAuthCredentials, post_token_form, with_query};
use crate::provider::{
    BoxFuture, OAuthProvider, PostReceipt, RefreshedToken, SocialPost, SocialPublisher, TokenGrant,
    TokenRefresher,
};

const FACEBOOK_AUTH_URL: &str = "https://www.facebook.com/v18.0/dialog/oauth";
const GRAPH_API_BASE: &str = "https://graph.facebook.com/v18.0";

/// Configuration for the Facebook adapter.
#[derive(Debug, Clone)]
pub struct FacebookConfig {
    pub credentials: OAuthCredentials,
    pub auth_url: String,
    /// Versioned Graph API base, also hosting `/oauth/access_token`.
    pub graph_base: String,
    pub scopes: Vec<String>,
    pub timeout: Duration,
}

impl FacebookConfig {
    pub fn new(credentials: OAuthCredentials) -> Self {
        Self {
            credentials,
            auth_url: FACEBOOK_AUTH_URL.to_string(),
            graph_base: GRAPH_API_BASE.to_string(),
            scopes: vec![
                "public_profile".to_string(),
                "pages_show_list".to_string(),
                "pages_manage_posts".to_string(),
            ],
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_graph_base(mut self, url: impl Into<String>) -> Self {
        self.graph_base = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn token_url(&self) -> String {
        format!("{}/oauth/access_token", self.graph_base)
    }
}

/// A page the user manages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacebookPage {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: GraphErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GraphErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct PageList {
    #[serde(default)]
    data: Vec<FacebookPage>,
}

#[derive(Debug, Deserialize)]
struct GraphObject {
    id: Option<String>,
}

/// Extracts `error.message` from a Graph API error body.
fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<GraphErrorBody>(body)
        .ok()
        .map(|b| b.error.message)
}

/// Facebook OAuth client and feed publisher.
#[derive(Debug, Clone)]
pub struct FacebookClient {
    config: FacebookConfig,
    http_client: reqwest::Client,
}

impl FacebookClient {
    pub fn new(config: FacebookConfig) -> ProviderResult<Self> {
        let http_client = http::build_client(config.timeout)?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn fail(status: reqwest::StatusCode, what: &str, body: &str) -> ProviderError {
        let detail = error_message(body).unwrap_or_else(|| http::snippet(body));
        http::status_error(status, format!("{} failed ({}): {}", what, status, detail))
            .with_provider("facebook")
    }

    async fn get_graph<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
        what: &str,
    ) -> ProviderResult<T> {
        let url = format!("{}/{}", self.config.graph_base, path);
        let request = self
            .http_client
            .get(&url)
            .query(&[("access_token", access_token)]);
        let (status, body) = http::execute(request)
            .await
            .map_err(|e| e.with_provider("facebook"))?;

        if !status.is_success() {
            return Err(Self::fail(status, what, &body));
        }
        http::parse_json(&body, what).map_err(|e| e.with_provider("facebook"))
    }

    /// Lists the pages the user manages.
    pub async fn list_pages(&self, access_token: &str) -> ProviderResult<Vec<FacebookPage>> {
        let pages: PageList = self.get_graph("me/accounts", access_token, "page list").await?;
        Ok(pages.data)
    }

    async fn user_id(&self, access_token: &str) -> ProviderResult<Option<String>> {
        let me: GraphObject = self.get_graph("me", access_token, "profile lookup").await?;
        Ok(me.id)
    }

    async fn create_post(
        &self,
        access_token: &str,
        post: &SocialPost,
    ) -> ProviderResult<PostReceipt> {
        let target = post.page_id.as_deref().filter(|p| !p.is_empty()).unwrap_or("me");
        debug!(target, "publishing Facebook post");

        let url = format!("{}/{}/feed", self.config.graph_base, target);
        let request = self.http_client.post(&url).json(&json!({
            "message": post.text,
            "access_token": access_token,
        }));
        let (status, body) = http::execute(request)
            .await
            .map_err(|e| e.with_provider("facebook"))?;

        if !status.is_success() {
            return Err(Self::fail(status, "post", &body));
        }

        let post_id = serde_json::from_str::<GraphObject>(&body)
            .ok()
            .and_then(|o| o.id);
        info!(post_id = ?post_id, "published Facebook post");
        Ok(PostReceipt { post_id })
    }

    /// Exchanges a token for a long-lived one.
    async fn long_lived(&self, token: &str) -> ProviderResult<RefreshedToken> {
        let params = [
            ("grant_type", "fb_exchange_token"),
            ("client_id", self.config.credentials.client_id.as_str()),
            ("client_secret", self.config.credentials.client_secret.as_str()),
            ("fb_exchange_token", token),
        ];
        let response = post_token_form(
            &self.http_client,
            &self.config.token_url(),
            &params,
            Provider::Facebook,
            error_message,
        )
        .await?;
        Ok(response.into_refreshed())
    }

    async fn refresh_grant(&self, refresh_token: &str) -> ProviderResult<RefreshedToken> {
        let refreshed = self.long_lived(refresh_token).await?;
        info!(provider = "facebook", "exchanged long-lived token");
        Ok(refreshed)
    }

    async fn exchange(&self, code: &str, redirect_uri: &str) -> ProviderResult<TokenGrant> {
        let params = [
            ("client_id", self.config.credentials.client_id.as_str()),
            ("client_secret", self.config.credentials.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("code", code),
        ];
        let short_lived = post_token_form(
            &self.http_client,
            &self.config.token_url(),
            &params,
            Provider::Facebook,
            error_message,
        )
        .await?;

        let long_lived = self.long_lived(&short_lived.access_token).await?;
        let account_id = self.user_id(&long_lived.access_token).await?;
        info!(provider = "facebook", "obtained long-lived token");

        Ok(TokenGrant {
            access_token: long_lived.access_token,
            refresh_token: None,
            expires_in: long_lived.expires_in,
            scope: short_lived.scope,
            account_id,
        })
    }
}

impl TokenRefresher for FacebookClient {
    fn provider(&self) -> Provider {
        Provider::Facebook
    }

    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, ProviderResult<RefreshedToken>> {
        Box::pin(self.refresh_grant(refresh_token))
    }
}

impl OAuthProvider for FacebookClient {
    fn authorization_url(
        &self,
        redirect_uri: &str,
        state: &str,
        _code_challenge: Option<&str>,
    ) -> String {
        let scope = self.config.scopes.join(",");
        with_query(
            &self.config.auth_url,
            &[
                ("client_id", self.config.credentials.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("state", state),
                ("response_type", "code"),
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

impl SocialPublisher for FacebookClient {
    fn network(&self) -> Provider {
        Provider::Facebook
    }

    fn publish<'a>(
        &'a self,
        access_token: &'a str,
        post: &'a SocialPost,
    ) -> BoxFuture<'a, ProviderResult<PostReceipt>> {
        Box::pin(self.create_post(access_token, post))
    }
}
