//! Adapters for every external service the post-meeting workflow touches.
//!
//! - [`google`] - OAuth and Google Calendar events
//! - [`linkedin`] - OAuth and member posts
//! - [`facebook`] - OAuth, long-lived tokens, page/feed posts
//! - [`recall`] - meeting recording bots
//! - [`content`] - follow-up email and social post generation
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │ GoogleOAuth  │  │LinkedInClient│  │FacebookClient│
//! └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!        │  TokenRefresher + OAuthProvider   │
//!        └─────────────────┼─────────────────┘
//!                          ▼
//!                   token manager
//! ```
//!
//! Every adapter reports failures as [`ProviderError`]; no caller ever
//! inspects a provider's own error JSON.

pub mod content;
pub mod error;
pub mod facebook;
pub mod google;
mod http;
pub mod linkedin;
pub mod oauth;
pub mod provider;
pub mod recall;

pub use content::{ContentGenerator, OpenAiConfig, OpenAiGenerator, PostStyle};
pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use facebook::{FacebookClient, FacebookConfig, FacebookPage};
pub use google::{GoogleCalendar, GoogleConfig, GoogleOAuth};
pub use linkedin::{LinkedInClient, LinkedInConfig};
pub use oauth::{OAuthCredentials, PkceFlow, generate_state};
pub use provider::{
    BoxFuture, CalendarEvent, CalendarSource, OAuthProvider, PostReceipt, RefreshedToken,
    SocialPost, SocialPublisher, TokenGrant, TokenRefresher,
};
pub use recall::{
    BotClient, CreateBotRequest, ExternalBot, ExternalTranscript, RecallClient, RecallConfig,
};
