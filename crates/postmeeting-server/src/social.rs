//! Publishing to LinkedIn and Facebook.

use std::collections::HashMap;
use std::sync::Arc;

use postmeeting_core::{Clock, PostRecord, Provider};
use postmeeting_providers::{SocialPost, SocialPublisher};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::store::PostLogStore;
use crate::tokens::TokenManager;

/// A post to publish on behalf of a user.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishRequest {
    pub provider: Provider,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub page_id: Option<String>,
    #[serde(default)]
    pub meeting_id: Option<Uuid>,
}

pub struct SocialService {
    tokens: Arc<TokenManager>,
    publishers: HashMap<Provider, Arc<dyn SocialPublisher>>,
    posts: Arc<dyn PostLogStore>,
    clock: Arc<dyn Clock>,
}

impl SocialService {
    pub fn new(
        tokens: Arc<TokenManager>,
        posts: Arc<dyn PostLogStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tokens,
            publishers: HashMap::new(),
            posts,
            clock,
        }
    }

    /// Registers the publisher for the network it reports.
    pub fn with_publisher(mut self, publisher: Arc<dyn SocialPublisher>) -> Self {
        self.publishers.insert(publisher.network(), publisher);
        self
    }

    /// Publishes a post and logs it.
    ///
    /// A record is appended only after the provider confirmed the post; any
    /// token or provider failure returns an error and logs nothing.
    pub async fn publish(
        &self,
        user_id: &str,
        request: PublishRequest,
    ) -> ServerResult<PostRecord> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(ServerError::validation("text is required"));
        }
        if !request.provider.is_social() {
            return Err(ServerError::validation(format!(
                "cannot publish to {}; use linkedin or facebook",
                request.provider
            )));
        }
        let publisher = self.publishers.get(&request.provider).ok_or_else(|| {
            ServerError::config(format!("{} publishing is not configured", request.provider))
        })?;

        let token = self
            .tokens
            .get_valid_access_token(user_id, request.provider)
            .await?;

        let mut post = SocialPost::new(text);
        if let Some(page_id) = request.page_id.filter(|p| !p.trim().is_empty()) {
            post = post.with_page_id(page_id);
        }

        let receipt = publisher.publish(&token, &post).await.map_err(|e| {
            warn!(user_id, provider = %request.provider, error = %e, "publish failed");
            ServerError::ExternalService(e)
        })?;

        let record = PostRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            provider: request.provider,
            content: post.text,
            external_post_id: receipt.post_id,
            meeting_id: request.meeting_id,
            posted_at: self.clock.now(),
        };
        self.posts.append_post(record.clone()).await?;

        info!(
            user_id,
            provider = %record.provider,
            post_id = ?record.external_post_id,
            "post published"
        );
        Ok(record)
    }

    /// Posts the user has published, oldest first.
    pub async fn history(&self, user_id: &str) -> ServerResult<Vec<PostRecord>> {
        Ok(self.posts.posts_for_user(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CredentialStore, LocalStore};
    use crate::testing::{FakePublisher, FakeRefresher, fixed_clock, t0};
    use chrono::Duration;
    use postmeeting_core::Credential;
    use postmeeting_providers::{ProviderError, TokenRefresher};

    struct Fixture {
        store: Arc<LocalStore>,
        linkedin: Arc<FakePublisher>,
        service: SocialService,
    }

    fn fixture(linkedin: FakePublisher, refresher: FakeRefresher) -> Fixture {
        let store = Arc::new(LocalStore::in_memory());
        let clock = fixed_clock();
        let tokens = Arc::new(
            TokenManager::new(store.clone(), clock.clone())
                .with_refresher(Arc::new(refresher) as Arc<dyn TokenRefresher>),
        );
        let linkedin = Arc::new(linkedin);
        let service = SocialService::new(tokens, store.clone(), clock)
            .with_publisher(linkedin.clone())
            .with_publisher(Arc::new(FakePublisher::succeeding(Provider::Facebook)));
        Fixture {
            store,
            linkedin,
            service,
        }
    }

    fn ok_fixture() -> Fixture {
        fixture(
            FakePublisher::succeeding(Provider::LinkedIn),
            FakeRefresher::succeeding(Provider::LinkedIn, "refreshed", Some(3600)),
        )
    }

    fn request(provider: Provider, text: &str) -> PublishRequest {
        PublishRequest {
            provider,
            text: text.into(),
            page_id: None,
            meeting_id: None,
        }
    }

    async fn connect(f: &Fixture, provider: Provider, credential_expiry: Duration) {
        f.store
            .upsert_credential(
                Credential::new("u1", provider, "token", t0())
                    .with_refresh_token("r")
                    .with_expires_at(t0() + credential_expiry),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn successful_publish_is_logged_once() {
        let f = ok_fixture();
        connect(&f, Provider::LinkedIn, Duration::hours(1)).await;

        let meeting_id = Uuid::new_v4();
        let record = f
            .service
            .publish(
                "u1",
                PublishRequest {
                    meeting_id: Some(meeting_id),
                    ..request(Provider::LinkedIn, "  Great meeting today.  ")
                },
            )
            .await
            .unwrap();

        assert_eq!(record.content, "Great meeting today.");
        assert_eq!(record.external_post_id.as_deref(), Some("linkedin-post-1"));
        assert_eq!(record.meeting_id, Some(meeting_id));
        assert_eq!(record.posted_at, t0());

        let posts = f.linkedin.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "token");

        assert_eq!(f.service.history("u1").await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_before_publishing() {
        let f = ok_fixture();
        connect(&f, Provider::LinkedIn, Duration::hours(-1)).await;

        f.service
            .publish("u1", request(Provider::LinkedIn, "hello"))
            .await
            .unwrap();
        assert_eq!(f.linkedin.posts()[0].0, "refreshed");
    }

    #[tokio::test]
    async fn page_id_is_forwarded() {
        let f = ok_fixture();
        connect(&f, Provider::LinkedIn, Duration::hours(1)).await;

        f.service
            .publish(
                "u1",
                PublishRequest {
                    page_id: Some("page-1".into()),
                    ..request(Provider::LinkedIn, "hello")
                },
            )
            .await
            .unwrap();
        assert_eq!(f.linkedin.posts()[0].1.page_id.as_deref(), Some("page-1"));
    }

    #[tokio::test]
    async fn provider_failure_logs_nothing() {
        let f = fixture(
            FakePublisher::failing(Provider::LinkedIn, ProviderError::authorization("no scope")),
            FakeRefresher::succeeding(Provider::LinkedIn, "n", None),
        );
        connect(&f, Provider::LinkedIn, Duration::hours(1)).await;

        let err = f
            .service
            .publish("u1", request(Provider::LinkedIn, "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::ExternalService(_)));
        assert!(f.service.history("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn token_failure_skips_provider_and_log() {
        let f = fixture(
            FakePublisher::succeeding(Provider::LinkedIn),
            FakeRefresher::failing(Provider::LinkedIn, ProviderError::authentication("revoked")),
        );
        connect(&f, Provider::LinkedIn, Duration::hours(-1)).await;

        let err = f
            .service
            .publish("u1", request(Provider::LinkedIn, "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::RefreshFailed { .. }));
        assert!(f.linkedin.posts().is_empty());
        assert!(f.service.history("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn not_connected_is_reported() {
        let f = ok_fixture();
        let err = f
            .service
            .publish("u1", request(Provider::Facebook, "hello"))
            .await
            .unwrap_err();
        assert!(err.requires_reconnect());
    }

    #[tokio::test]
    async fn request_validation() {
        let f = ok_fixture();
        connect(&f, Provider::LinkedIn, Duration::hours(1)).await;

        let err = f
            .service
            .publish("u1", request(Provider::LinkedIn, "   "))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Validation { .. }));

        let err = f
            .service
            .publish("u1", request(Provider::Google, "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Validation { .. }));
        assert!(f.linkedin.posts().is_empty());
    }
}
