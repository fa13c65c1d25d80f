//! Token lifecycle: hand out valid access tokens, refreshing when expired.
//!
//! A stored token is used as long as `now < expires_at`; there is no skew
//! margin. A missing expiry counts as expired. Refresh results are written
//! back in a single store operation, and concurrent refreshes for the same
//! credential are last-writer-wins.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use postmeeting_core::{Clock, Credential, Provider, expiry_from_now};
use postmeeting_providers::{TokenGrant, TokenRefresher};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ServerError, ServerResult};
use crate::store::CredentialStore;

/// Connection state of one provider for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub provider: Provider,
    pub connected: bool,
    pub expired: bool,
    pub has_refresh_token: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub account_id: Option<String>,
}

/// Hands out valid access tokens and persists grants.
pub struct TokenManager {
    store: Arc<dyn CredentialStore>,
    refreshers: HashMap<Provider, Arc<dyn TokenRefresher>>,
    clock: Arc<dyn Clock>,
}

impl TokenManager {
    pub fn new(store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            refreshers: HashMap::new(),
            clock,
        }
    }

    /// Registers the refresher for the provider it reports.
    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refreshers.insert(refresher.provider(), refresher);
        self
    }

    /// Returns a usable access token for `(user_id, provider)`.
    ///
    /// - no credential: `NotConnected`
    /// - not expired: the stored token, without any write
    /// - expired, no refresh token: `ReauthRequired`, without any write
    /// - expired with refresh token: one refresh call, then one write on
    ///   success; `RefreshFailed` with the credential untouched otherwise
    pub async fn get_valid_access_token(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> ServerResult<String> {
        let credential = self
            .store
            .get_credential(user_id, provider)
            .await?
            .ok_or(ServerError::NotConnected { provider })?;

        let now = self.clock.now();
        if !credential.is_expired_at(now) {
            return Ok(credential.access_token);
        }

        let Some(refresh_token) = credential.refresh_token.as_deref() else {
            info!(user_id, provider = %provider, "token expired without refresh token");
            return Err(ServerError::ReauthRequired { provider });
        };

        let refresher = self.refreshers.get(&provider).ok_or_else(|| {
            ServerError::config(format!("no token refresher configured for {}", provider))
        })?;

        debug!(user_id, provider = %provider, "refreshing expired token");
        let refreshed = refresher.refresh(refresh_token).await.map_err(|source| {
            warn!(user_id, provider = %provider, error = %source, "token refresh failed");
            ServerError::RefreshFailed { provider, source }
        })?;

        let now = self.clock.now();
        let expires_at = refreshed.expires_in.map(|secs| expiry_from_now(now, secs));
        self.store
            .update_access_token(user_id, provider, &refreshed.access_token, expires_at, now)
            .await?;

        info!(user_id, provider = %provider, expires_at = ?expires_at, "token refreshed");
        Ok(refreshed.access_token)
    }

    /// Stores a freshly exchanged grant, replacing any previous credential.
    ///
    /// A grant without a refresh token keeps the one already stored.
    pub async fn connect(
        &self,
        user_id: &str,
        provider: Provider,
        grant: TokenGrant,
    ) -> ServerResult<Credential> {
        let now = self.clock.now();
        let previous_refresh = match grant.refresh_token {
            Some(_) => None,
            None => self
                .store
                .get_credential(user_id, provider)
                .await?
                .and_then(|c| c.refresh_token),
        };

        let credential = Credential {
            user_id: user_id.to_string(),
            provider,
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.or(previous_refresh),
            expires_at: grant.expires_in.map(|secs| expiry_from_now(now, secs)),
            account_id: grant.account_id,
            scope: grant.scope,
            updated_at: now,
        };
        self.store.upsert_credential(credential.clone()).await?;

        info!(user_id, provider = %provider, "provider connected");
        Ok(credential)
    }

    /// Removes the stored credential.
    pub async fn disconnect(&self, user_id: &str, provider: Provider) -> ServerResult<()> {
        if !self.store.delete_credential(user_id, provider).await? {
            return Err(ServerError::not_found(format!("{} connection", provider)));
        }
        info!(user_id, provider = %provider, "provider disconnected");
        Ok(())
    }

    /// Reports the connection state without refreshing.
    pub async fn status(
        &self,
        user_id: &str,
        provider: Provider,
    ) -> ServerResult<ConnectionStatus> {
        let now = self.clock.now();
        let status = match self.store.get_credential(user_id, provider).await? {
            Some(c) => ConnectionStatus {
                provider,
                connected: true,
                expired: c.is_expired_at(now),
                has_refresh_token: c.refresh_token.is_some(),
                expires_at: c.expires_at,
                account_id: c.account_id,
            },
            None => ConnectionStatus {
                provider,
                connected: false,
                expired: false,
                has_refresh_token: false,
                expires_at: None,
                account_id: None,
            },
        };
        Ok(status)
    }
}
