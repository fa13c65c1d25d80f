//! Google OAuth 2.0: consent URL, code exchange, refresh grant.

use postmeeting_core::Provider;
use tracing::info;

use super::config::GoogleConfig;
use crate::error::ProviderResult;
use crate::http;
use crate::oauth::{post_token_form, with_query};
use crate::provider::{BoxFuture, OAuthProvider, RefreshedToken, TokenGrant, TokenRefresher};

/// OAuth client for Google accounts.
#[derive(Debug, Clone)]
pub struct GoogleOAuth {
    config: GoogleConfig,
    http_client: reqwest::Client,
}

impl GoogleOAuth {
    pub fn new(config: GoogleConfig) -> ProviderResult<Self> {
        let http_client = http::build_client(config.timeout)?;
        Ok(Self {
            config,
            http_client,
        })
    }

    async fn refresh_grant(&self, refresh_token: &str) -> ProviderResult<RefreshedToken> {
        let params = [
            ("client_id", self.config.credentials.client_id.as_str()),
            ("client_secret", self.config.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let response = post_token_form(
            &self.http_client,
            &self.config.token_url,
            &params,
            Provider::Google,
            super::error_message,
        )
        .await?;

        let mut refreshed = response.into_refreshed();
        if refreshed.expires_in.is_none() {
            refreshed.expires_in = Some(self.config.default_expires_in);
        }
        info!(provider = "google", "refreshed access token");
        Ok(refreshed)
    }

    async fn exchange(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> ProviderResult<TokenGrant> {
        let mut params = vec![
            ("client_id", self.config.credentials.client_id.as_str()),
            ("client_secret", self.config.credentials.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];
        if let Some(verifier) = code_verifier {
            params.push(("code_verifier", verifier));
        }
        let response = post_token_form(
            &self.http_client,
            &self.config.token_url,
            &params,
            Provider::Google,
            super::error_message,
        )
        .await?;

        info!(provider = "google", "obtained tokens");
        Ok(response.into_grant())
    }
}

impl TokenRefresher for GoogleOAuth {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, ProviderResult<RefreshedToken>> {
        Box::pin(self.refresh_grant(refresh_token))
    }
}

impl OAuthProvider for GoogleOAuth {
    fn authorization_url(
        &self,
        redirect_uri: &str,
        state: &str,
        code_challenge: Option<&str>,
    ) -> String {
        let scope = self.config.scopes.join(" ");
        let mut params = vec![
            ("client_id", self.config.credentials.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("state", state),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ];
        if let Some(challenge) = code_challenge {
            params.push(("code_challenge", challenge));
            params.push(("code_challenge_method", "S256"));
        }
        with_query(&self.config.auth_url, &params)
    }

    fn uses_pkce(&self) -> bool {
        true
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        redirect_uri: &'a str,
        code_verifier: Option<&'a str>,
    ) -> BoxFuture<'a, ProviderResult<TokenGrant>> {
        Box::pin(self.exchange(code, redirect_uri, code_verifier))
    }
}
