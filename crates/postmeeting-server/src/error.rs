//! Server error types.

use std::io;

use postmeeting_core::Provider;
use postmeeting_providers::ProviderError;
use thiserror::Error;

use crate::store::StoreError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors surfaced by the services and the HTTP layer.
#[derive(Debug, Error)]
pub enum ServerError {
    /// No credential is stored for the provider.
    #[error("{provider} is not connected")]
    NotConnected { provider: Provider },

    /// The access token expired and there is no refresh token.
    #[error("{provider} authorization expired, please reconnect")]
    ReauthRequired { provider: Provider },

    /// The provider rejected or failed the refresh grant.
    #[error("failed to refresh {provider} token: {source}")]
    RefreshFailed {
        provider: Provider,
        #[source]
        source: ProviderError,
    },

    /// An external API call failed.
    #[error("external service error: {0}")]
    ExternalService(#[source] ProviderError),

    /// Content generation failed.
    #[error("content generation failed: {0}")]
    Generation(#[source] ProviderError),

    /// The record does not exist or belongs to another user.
    #[error("{what} not found")]
    NotFound { what: String },

    /// The request is malformed.
    #[error("{message}")]
    Validation { message: String },

    /// The caller is not authenticated.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Persistence failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// IO error (listener, config file, etc.).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ServerError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true when the user has to go through the consent flow again.
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            Self::NotConnected { .. } | Self::ReauthRequired { .. }
        )
    }

    /// The provider involved in a token failure, if any.
    pub fn provider(&self) -> Option<Provider> {
        match self {
            Self::NotConnected { provider }
            | Self::ReauthRequired { provider }
            | Self::RefreshFailed { provider, .. } => Some(*provider),
            _ => None,
        }
    }
}
