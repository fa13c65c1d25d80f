//! OAuth 2.0 plumbing shared by the Google, LinkedIn and Facebook adapters.
//!
//! - [`OAuthCredentials`] - registered client id and secret
//! - [`PkceFlow`] - RFC 7636 verifier/challenge plus a CSRF `state`
//! - token endpoint form posts and response parsing

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use postmeeting_core::Provider;
use rand::Rng as _;
use reqwest::StatusCode;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::http;
use crate::provider::{RefreshedToken, TokenGrant};

/// The PKCE code verifier length (in bytes, before base64 encoding).
const CODE_VERIFIER_LENGTH: usize = 32;

/// Length of the random `state` value (in bytes, before base64 encoding).
const STATE_LENGTH: usize = 16;

/// OAuth 2.0 client credentials registered with a provider.
#[derive(Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Checks that both values are present.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.trim().is_empty() {
            return Err("client_id is required");
        }
        if self.client_secret.trim().is_empty() {
            return Err("client_secret is required");
        }
        Ok(())
    }
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// PKCE flow state.
#[derive(Debug, Clone)]
pub struct PkceFlow {
    /// The code verifier (high-entropy random string).
    pub verifier: String,
    /// SHA-256 of the verifier, base64url encoded.
    pub challenge: String,
    /// Random state for CSRF protection.
    pub state: String,
}

impl PkceFlow {
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: generate_state(),
        }
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

/// Generates a random state string for CSRF protection.
pub fn generate_state() -> String {
    random_token(STATE_LENGTH)
}

/// Computes the S256 challenge for a code verifier.
pub fn compute_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// Appends form-encoded query parameters to an endpoint URL.
pub(crate) fn with_query(base: &str, params: &[(&str, &str)]) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base, separator, query)
}

/// Standard token endpoint response (RFC 6749 §5.1).
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    pub fn into_grant(self) -> TokenGrant {
        TokenGrant {
            access_token: self.access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            expires_in: self.expires_in,
            scope: self.scope,
            account_id: None,
        }
    }

    pub fn into_refreshed(self) -> RefreshedToken {
        RefreshedToken {
            access_token: self.access_token,
            expires_in: self.expires_in,
        }
    }
}

/// Standard token endpoint error (RFC 6749 §5.2).
#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Extracts `error: error_description` from a standard token error body.
pub(crate) fn token_error_message(body: &str) -> Option<String> {
    let parsed: TokenErrorBody = serde_json::from_str(body).ok()?;
    Some(match parsed.error_description {
        Some(description) => format!("{}: {}", parsed.error, description),
        None => parsed.error,
    })
}

/// POSTs a form to a token endpoint and parses the response.
///
/// A 400/401 answer is an authentication failure (revoked or invalid grant);
/// `describe` extracts the provider's error text from the body.
pub(crate) async fn post_token_form(
    client: &reqwest::Client,
    url: &str,
    params: &[(&str, &str)],
    provider: Provider,
    describe: fn(&str) -> Option<String>,
) -> ProviderResult<TokenResponse> {
    debug!(provider = %provider, url, "calling token endpoint");

    let (status, body) = http::execute(client.post(url).form(params))
        .await
        .map_err(|e| e.with_provider(provider.as_str()))?;

    if !status.is_success() {
        let detail = describe(&body).unwrap_or_else(|| http::snippet(&body));
        let message = format!("token request failed ({}): {}", status, detail);
        let err = if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            ProviderError::authentication(message).with_status(status.as_u16())
        } else {
            http::status_error(status, message)
        };
        return Err(err.with_provider(provider.as_str()));
    }

    http::parse_json(&body, "token").map_err(|e| e.with_provider(provider.as_str()))
}
