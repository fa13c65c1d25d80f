//! In-flight OAuth consent flows.
//!
//! An authorization URL carries a random `state`. The callback must present
//! the same state for the same user and provider before it expires; a state
//! can be redeemed once.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use postmeeting_core::{Clock, Provider};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ServerError, ServerResult};

/// A consent flow waiting for its callback.
#[derive(Clone, PartialEq, Eq)]
pub struct PendingAuthorization {
    pub user_id: String,
    pub provider: Provider,
    pub redirect_uri: String,
    /// PKCE verifier, for providers that use PKCE.
    pub code_verifier: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for PendingAuthorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAuthorization")
            .field("user_id", &self.user_id)
            .field("provider", &self.provider)
            .field("redirect_uri", &self.redirect_uri)
            .field("code_verifier", &self.code_verifier.as_ref().map(|_| "<redacted>"))
            .field("created_at", &self.created_at)
            .finish()
    }
}

pub struct PendingAuthorizations {
    pending: Mutex<HashMap<String, PendingAuthorization>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl PendingAuthorizations {
    pub fn new(ttl: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::minutes(10)),
            clock,
        }
    }

    /// Remembers a flow under `state`, dropping any expired ones.
    pub async fn insert(
        &self,
        state: String,
        user_id: &str,
        provider: Provider,
        redirect_uri: String,
        code_verifier: Option<String>,
    ) {
        let now = self.clock.now();
        let mut pending = self.pending.lock().await;
        pending.retain(|_, p| now - p.created_at < self.ttl);
        pending.insert(
            state,
            PendingAuthorization {
                user_id: user_id.to_string(),
                provider,
                redirect_uri,
                code_verifier,
                created_at: now,
            },
        );
    }

    /// Redeems `state`. Unknown, expired, or mismatched states are rejected;
    /// a mismatched state is not consumed.
    pub async fn take(
        &self,
        state: &str,
        user_id: &str,
        provider: Provider,
    ) -> ServerResult<PendingAuthorization> {
        let now = self.clock.now();
        let mut pending = self.pending.lock().await;

        let matches = pending
            .get(state)
            .is_some_and(|p| p.user_id == user_id && p.provider == provider);
        if !matches {
            debug!(user_id, provider = %provider, "unknown OAuth state");
            return Err(ServerError::validation("invalid or expired OAuth state"));
        }

        match pending.remove(state) {
            Some(p) if now - p.created_at < self.ttl => Ok(p),
            _ => Err(ServerError::validation("invalid or expired OAuth state")),
        }
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }
}
