//! HTTP service for the post-meeting workflow.
//!
//! - [`tokens`] - valid access tokens, refreshing on demand
//! - [`poller`] - recording bot state machine and transcript capture
//! - [`meetings`] - calendar sync, bot dispatch, follow-up content
//! - [`social`] - LinkedIn and Facebook publishing
//! - [`http`] - axum routes over the services
//! - [`scheduler`] - in-process periodic poll and join loops
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use postmeeting_server::{LocalStore, ServerConfig, build_state, router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::load(None)?;
//!     let state = build_state(&config, Arc::new(LocalStore::in_memory()))?;
//!     let listener = tokio::net::TcpListener::bind(config.server.bind).await?;
//!     axum::serve(listener, router(state)).await?;
//!     Ok(())
//! }
//! ```

mod app;
pub mod authorizations;
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod meetings;
pub mod poller;
pub mod scheduler;
pub mod secret;
pub mod social;
pub mod store;
pub mod tokens;

#[cfg(test)]
mod testing;

pub use app::{build_state, spawn_background};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use http::{AppState, router};
pub use meetings::{CreateBot, JoinReport, MeetingService};
pub use poller::{BotPoller, PollOutcome, PollReport, TranscriptOutcome};
pub use scheduler::{BackgroundJobs, JobStats, SchedulerCommand, SchedulerConfig, SchedulerHandle};
pub use social::{PublishRequest, SocialService};
pub use store::LocalStore;
pub use tokens::{ConnectionStatus, TokenManager};
