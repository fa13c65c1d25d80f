//! End-to-end tests of the HTTP surface against mocked providers.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::{Duration, Utc};
use postmeeting_core::{Meeting, MeetingPlatform};
use postmeeting_server::store::{MeetingStore, TranscriptStore};
use postmeeting_server::{LocalStore, ServerConfig, build_state, router};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER: &str = "user-1";
const CRON_SECRET: &str = "cron-s3cret";

struct TestApp {
    router: Router,
    store: Arc<LocalStore>,
    mock: MockServer,
}

async fn app() -> TestApp {
    let mock = MockServer::start().await;
    let config = ServerConfig::parse(&format!(
        r#"
[server]
in_memory = true
cron_secret = "{secret}"
redirect_base = "http://app.test"

[google]
client_id = "google-id"
client_secret = "google-secret"
token_url = "{base}/google/token"
api_base = "{base}/calendar/v3"

[linkedin]
client_id = "linkedin-id"
client_secret = "linkedin-secret"
token_url = "{base}/linkedin/token"
api_base = "{base}/linkedin"

[recall]
api_key = "recall-key"
base_url = "{base}/recall/api/v1"

[openai]
api_key = "sk-test"
base_url = "{base}/openai"
"#,
        secret = CRON_SECRET,
        base = mock.uri()
    ))
    .unwrap();

    let store = Arc::new(LocalStore::in_memory());
    let state = build_state(&config, store.clone()).unwrap();
    TestApp {
        router: router(state),
        store,
        mock,
    }
}

async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn cron(app: &TestApp, uri: &str, bearer: Option<&str>) -> StatusCode {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let response = app
        .router
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    response.status()
}

/// Runs the Google consent flow for `USER` against the mocked token endpoint.
async fn connect_google(app: &TestApp) {
    Mock::given(method("POST"))
        .and(path("/google/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code"))
        .and(body_string_contains("code_verifier="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "google-access",
            "refresh_token": "google-refresh",
            "expires_in": 3600,
            "scope": "openid email",
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&app.mock)
        .await;

    let (status, authorize) = send(
        app,
        Method::GET,
        "/api/connections/google/authorize",
        Some(USER),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let url = authorize["url"].as_str().unwrap();
    assert!(url.contains("code_challenge="));
    assert!(url.contains("app.test%2Fconnections%2Fgoogle%2Fcallback"));

    let (status, connected) = send(
        app,
        Method::POST,
        "/api/connections/google/callback",
        Some(USER),
        Some(json!({ "code": "auth-code", "state": authorize["state"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(connected["connected"], true);
    assert_eq!(connected["has_refresh_token"], true);
}

async fn seed_meeting(app: &TestApp) -> Meeting {
    let now = Utc::now();
    let meeting = Meeting {
        id: Uuid::new_v4(),
        user_id: USER.to_string(),
        calendar_id: "primary".to_string(),
        external_event_id: "evt-1".to_string(),
        title: "Quarterly review".to_string(),
        start_time: now + Duration::hours(2),
        end_time: now + Duration::hours(3),
        meeting_url: Some("https://zoom.us/j/123456".to_string()),
        platform: MeetingPlatform::Zoom,
        attendees: vec!["client@example.com".to_string()],
        notetaker_enabled: false,
        updated_at: now,
    };
    app.store.upsert_meeting(meeting).await.unwrap()
}

#[tokio::test]
async fn health_needs_no_identity() {
    let app = app().await;
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn user_routes_require_identity() {
    let app = app().await;
    let (status, body) = send(&app, Method::GET, "/api/settings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
    assert_eq!(body["requires_reconnect"], false);
}

#[tokio::test]
async fn cron_routes_check_the_bearer_secret() {
    let app = app().await;
    assert_eq!(
        cron(&app, "/api/cron/poll-all", None).await,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        cron(&app, "/api/cron/poll-all", Some("wrong")).await,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        cron(&app, "/api/cron/poll-all", Some(CRON_SECRET)).await,
        StatusCode::OK
    );
    assert_eq!(
        cron(&app, "/api/cron/join-meetings", Some(CRON_SECRET)).await,
        StatusCode::OK
    );
}

#[tokio::test]
async fn settings_round_trip_and_validation() {
    let app = app().await;

    let (status, body) = send(&app, Method::GET, "/api/settings", Some(USER), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bot_join_minutes_before"], 5);

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/settings",
        Some(USER),
        Some(json!({ "bot_join_minutes_before": 15 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/settings",
        Some(USER),
        Some(json!({ "bot_join_minutes_before": 90 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (_, body) = send(&app, Method::GET, "/api/settings", Some(USER), None).await;
    assert_eq!(body["bot_join_minutes_before"], 15);

    let (_, other) = send(&app, Method::GET, "/api/settings", Some("user-2"), None).await;
    assert_eq!(other["bot_join_minutes_before"], 5);
}

#[tokio::test]
async fn connection_lifecycle() {
    let app = app().await;

    let (status, body) = send(&app, Method::GET, "/api/connections/google", Some(USER), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], false);

    let (status, _) = send(&app, Method::GET, "/api/connections/myspace", Some(USER), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/connections/facebook/authorize",
        Some(USER),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    connect_google(&app).await;

    let (status, _) = send(&app, Method::DELETE, "/api/connections/google", Some(USER), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) =
        send(&app, Method::DELETE, "/api/connections/google", Some(USER), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn callback_rejects_foreign_state() {
    let app = app().await;
    let (_, authorize) = send(
        &app,
        Method::GET,
        "/api/connections/linkedin/authorize",
        Some(USER),
        None,
    )
    .await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/connections/linkedin/callback",
        Some("user-2"),
        Some(json!({ "code": "c", "state": authorize["state"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "invalid or expired OAuth state");
}

#[tokio::test]
async fn calendar_sync_requires_google() {
    let app = app().await;
    let (status, body) = send(&app, Method::POST, "/api/calendar/sync", Some(USER), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "not_connected");
    assert_eq!(body["requires_reconnect"], true);
    assert_eq!(body["provider"], "google");
}

#[tokio::test]
async fn calendar_sync_stores_events() {
    let app = app().await;
    connect_google(&app).await;

    let start = Utc::now() + Duration::days(1);
    Mock::given(method("GET"))
        .and(path("/calendar/v3/users/me/calendarList"))
        .and(header("authorization", "Bearer google-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "id": "primary", "summary": "Work", "accessRole": "owner" }]
        })))
        .mount(&app.mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "id": "evt-9",
                "summary": "Planning",
                "hangoutLink": "https://meet.google.com/abc-defg-hij",
                "start": { "dateTime": start.to_rfc3339() },
                "end": { "dateTime": (start + Duration::hours(1)).to_rfc3339() },
                "attendees": [{ "email": "a@example.com" }]
            }]
        })))
        .mount(&app.mock)
        .await;

    let (status, body) = send(&app, Method::POST, "/api/calendar/sync", Some(USER), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["synced"], 1);
}

#[tokio::test]
async fn bot_is_created_once_and_polled_to_completion() {
    let app = app().await;
    let meeting = seed_meeting(&app).await;

    Mock::given(method("POST"))
        .and(path("/recall/api/v1/bots/"))
        .and(header("authorization", "Token recall-key"))
        .and(body_string_contains("Bot for Quarterly review"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "bot-42",
            "status": "pending"
        })))
        .expect(1)
        .mount(&app.mock)
        .await;

    let request = json!({ "meeting_id": meeting.id });
    let (status, first) =
        send(&app, Method::POST, "/api/bots", Some(USER), Some(request.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["created"], true);
    assert_eq!(first["bot"]["external_bot_id"], "bot-42");

    let (_, second) = send(&app, Method::POST, "/api/bots", Some(USER), Some(request)).await;
    assert_eq!(second["created"], false);
    assert_eq!(second["bot"]["id"], first["bot"]["id"]);

    Mock::given(method("GET"))
        .and(path("/recall/api/v1/bots/bot-42/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "bot-42",
            "status": "completed",
            "recording_started_at": "2025-03-15T10:00:00Z",
            "recording_ended_at": "2025-03-15T10:45:00Z",
            "transcript": { "id": "tr-1" }
        })))
        .mount(&app.mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/recall/api/v1/bots/bot-42/transcript/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "tr-1",
            "transcript": "We agreed to rebalance the portfolio.",
            "duration_seconds": 2700.0,
            "participants": ["client@example.com"]
        })))
        .mount(&app.mock)
        .await;

    let bot_job_id = first["bot"]["id"].as_str().unwrap();
    let uri = format!("/api/bots/{}/poll", bot_job_id);
    let (status, outcome) = send(&app, Method::POST, &uri, Some(USER), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["status"], "completed");
    assert_eq!(outcome["transcript"]["state"], "saved");
    assert_eq!(outcome["transcript"]["inserted"], true);

    let stored = app
        .store
        .transcript_for_meeting(meeting.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.content, "We agreed to rebalance the portfolio.");
    assert_eq!(stored.duration_seconds, Some(2700));

    let (status, _) = send(&app, Method::POST, &uri, Some("user-2"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Mock::given(method("POST"))
        .and(path("/openai/chat/completions"))
        .and(body_string_contains("rebalance the portfolio"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "Dear client, thanks." } }]
        })))
        .mount(&app.mock)
        .await;

    let (status, email) = send(
        &app,
        Method::POST,
        "/api/ai/email",
        Some(USER),
        Some(json!({ "meeting_id": meeting.id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(email["content"], "Dear client, thanks.");
}

#[tokio::test]
async fn bot_creation_failure_is_a_gateway_error() {
    let app = app().await;
    let meeting = seed_meeting(&app).await;

    Mock::given(method("POST"))
        .and(path("/recall/api/v1/bots/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&app.mock)
        .await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/bots",
        Some(USER),
        Some(json!({ "meeting_id": meeting.id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "external_service_error");
}

#[tokio::test]
async fn notetaker_toggle_is_owner_only() {
    let app = app().await;
    let meeting = seed_meeting(&app).await;
    let uri = format!("/api/meetings/{}/notetaker", meeting.id);

    let enable = Some(json!({ "enabled": true }));
    let (status, body) = send(&app, Method::POST, &uri, Some(USER), enable).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notetaker_enabled"], true);

    let disable = Some(json!({ "enabled": false }));
    let (status, _) = send(&app, Method::POST, &uri, Some("user-2"), disable).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn social_post_validation() {
    let app = app().await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/social/post",
        Some(USER),
        Some(json!({ "provider": "linkedin", "text": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/social/post",
        Some(USER),
        Some(json!({ "provider": "google", "text": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/social/post",
        Some(USER),
        Some(json!({ "provider": "linkedin", "text": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "not_connected");
    assert_eq!(body["provider"], "linkedin");

    let (status, history) = send(&app, Method::GET, "/api/social/posts", Some(USER), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history, json!([]));
}
