use axum::Json;
use axum::extract::{Extension, Path, State};
use postmeeting_core::{Meeting, PostRecord, UserSettings};
use postmeeting_providers::PostStyle;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use super::AppState;
use super::auth::UserId;
use crate::error::{ServerError, ServerResult};
use crate::meetings::{BotCreation, CreateBot, JoinReport};
use crate::poller::{PollOutcome, PollReport};
use crate::social::PublishRequest;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn cron_poll_all(State(state): State<AppState>) -> ServerResult<Json<PollReport>> {
    Ok(Json(state.poller.poll_all_active().await?))
}

pub async fn cron_join_meetings(State(state): State<AppState>) -> ServerResult<Json<JoinReport>> {
    Ok(Json(state.meetings.join_upcoming().await?))
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub synced: usize,
}

pub async fn sync_calendar(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
) -> ServerResult<Json<SyncResponse>> {
    let synced = state.meetings.sync_calendar(&user_id).await?;
    Ok(Json(SyncResponse { synced }))
}

#[derive(Debug, Deserialize)]
pub struct NotetakerRequest {
    pub enabled: bool,
}

pub async fn set_notetaker(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(meeting_id): Path<Uuid>,
    Json(request): Json<NotetakerRequest>,
) -> ServerResult<Json<Meeting>> {
    let meeting = state
        .meetings
        .set_notetaker(&user_id, meeting_id, request.enabled)
        .await?;
    Ok(Json(meeting))
}

pub async fn create_bot(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    Json(request): Json<CreateBot>,
) -> ServerResult<Json<BotCreation>> {
    Ok(Json(state.meetings.create_bot(&user_id, request).await?))
}

pub async fn poll_bot(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(bot_job_id): Path<Uuid>,
) -> ServerResult<Json<PollOutcome>> {
    Ok(Json(state.meetings.poll_for_user(&user_id, bot_job_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub meeting_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PostRequest {
    pub meeting_id: Uuid,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub hashtag_count: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct GeneratedContent {
    pub content: String,
}

pub async fn generate_email(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    Json(request): Json<EmailRequest>,
) -> ServerResult<Json<GeneratedContent>> {
    let content = state
        .meetings
        .generate_email(&user_id, request.meeting_id)
        .await?;
    Ok(Json(GeneratedContent { content }))
}

pub async fn generate_post(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    Json(request): Json<PostRequest>,
) -> ServerResult<Json<GeneratedContent>> {
    let style = PostStyle::from_options(request.tone, request.hashtag_count);
    let content = state
        .meetings
        .generate_post(&user_id, request.meeting_id, style)
        .await?;
    Ok(Json(GeneratedContent { content }))
}

pub async fn publish_post(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    Json(request): Json<PublishRequest>,
) -> ServerResult<Json<PostRecord>> {
    Ok(Json(state.social.publish(&user_id, request).await?))
}

pub async fn post_history(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
) -> ServerResult<Json<Vec<PostRecord>>> {
    Ok(Json(state.social.history(&user_id).await?))
}

pub async fn get_settings(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
) -> ServerResult<Json<UserSettings>> {
    Ok(Json(state.settings.get_settings(&user_id).await?))
}

pub async fn put_settings(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    Json(settings): Json<UserSettings>,
) -> ServerResult<Json<UserSettings>> {
    settings.validate().map_err(ServerError::validation)?;
    state.settings.put_settings(&user_id, settings).await?;
    Ok(Json(settings))
}
