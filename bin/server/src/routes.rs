//! JSON API routes over the messaging service.

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use threadline_core::{ConversationId, MessageId, ParseIdError, SideChatId, UserId};
use threadline_messaging::{
    AttachmentUpload, Conversation, ConversationSummary, MessageView, SendRequest, SideChatView,
};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Room for JSON framing around a base64-encoded attachment.
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    // Base64 inflates uploads by a third.
    let body_limit = state.max_attachment_bytes / 3 * 4 + BODY_OVERHEAD_BYTES;
    let attachments = ServeDir::new(&state.attachment_dir);

    Router::new()
        .route("/health", get(health))
        .route("/api/conversations/start", post(start_conversation))
        .route("/api/users/{user_id}/conversations", get(list_conversations))
        .route("/api/conversations/{id}", delete(delete_conversation))
        .route(
            "/api/conversations/{id}/messages",
            get(list_messages).post(send_message),
        )
        .route(
            "/api/conversations/{id}/side-chats",
            get(list_side_chats).post(create_side_chat),
        )
        .route(
            "/api/messages/{message_id}",
            put(edit_message).delete(delete_message),
        )
        .route("/api/side-chats/{id}", delete(delete_side_chat))
        .route(
            "/api/side-chats/{id}/messages",
            get(list_side_chat_messages).post(send_side_chat_message),
        )
        .nest_service("/attachments", attachments)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn parse_id<T>(kind: &'static str, value: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = ParseIdError>,
{
    T::from_str(value).map_err(|_| ApiError::InvalidId {
        kind,
        value: value.to_string(),
    })
}

/// Body of a conversation start request.
#[derive(Debug, Deserialize)]
pub struct StartConversationRequest {
    user_a: String,
    user_b: String,
}

/// Inline attachment upload.
#[derive(Debug, Deserialize)]
pub struct AttachmentPayload {
    file_name: String,
    media_type: String,
    /// Standard base64.
    data: String,
}

impl AttachmentPayload {
    fn decode(self) -> Result<AttachmentUpload, ApiError> {
        let data = STANDARD
            .decode(self.data.as_bytes())
            .map_err(|e| ApiError::InvalidAttachment {
                reason: e.to_string(),
            })?;
        Ok(AttachmentUpload {
            file_name: self.file_name,
            media_type: self.media_type,
            data,
        })
    }
}

/// Body of a send request, for either scope.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    sender_id: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    attachment: Option<AttachmentPayload>,
}

impl SendMessageRequest {
    fn into_request(self) -> Result<SendRequest, ApiError> {
        let sender = parse_id::<UserId>("user", &self.sender_id)?;
        let mut request = SendRequest::text(sender, self.content);
        if let Some(payload) = self.attachment {
            request = request.with_attachment(payload.decode()?);
        }
        Ok(request)
    }
}

/// Body of an edit request.
#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    content: String,
}

/// Body of a side-chat creation request.
#[derive(Debug, Deserialize)]
pub struct CreateSideChatRequest {
    title: String,
    creator_id: String,
}

async fn health() -> &'static str {
    "ok"
}

async fn start_conversation(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartConversationRequest>,
) -> Result<Json<Conversation>, ApiError> {
    let user_a = parse_id::<UserId>("user", &body.user_a)?;
    let user_b = parse_id::<UserId>("user", &body.user_b)?;
    let conversation = state.service.start_conversation(user_a, user_b).await?;
    Ok(Json(conversation))
}

async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let user = parse_id::<UserId>("user", &user_id)?;
    Ok(Json(state.service.list_conversations(user).await?))
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let id = parse_id::<ConversationId>("conversation", &id)?;
    Ok(Json(state.service.list_messages(id).await?))
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageView>), ApiError> {
    let id = parse_id::<ConversationId>("conversation", &id)?;
    let message = state
        .service
        .send_message(id, body.into_request()?)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn edit_message(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<String>,
    Json(body): Json<EditMessageRequest>,
) -> Result<Json<MessageView>, ApiError> {
    let id = parse_id::<MessageId>("message", &message_id)?;
    Ok(Json(state.service.edit_message(id, body.content).await?))
}

async fn delete_message(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id::<MessageId>("message", &message_id)?;
    state.service.delete_message(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_side_chats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<SideChatView>>, ApiError> {
    let id = parse_id::<ConversationId>("conversation", &id)?;
    Ok(Json(state.service.list_side_chats(id).await?))
}

async fn create_side_chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<CreateSideChatRequest>,
) -> Result<(StatusCode, Json<SideChatView>), ApiError> {
    let id = parse_id::<ConversationId>("conversation", &id)?;
    let creator = parse_id::<UserId>("user", &body.creator_id)?;
    let side_chat = state
        .service
        .create_side_chat(id, body.title, creator)
        .await?;
    Ok((StatusCode::CREATED, Json(side_chat)))
}

async fn list_side_chat_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let id = parse_id::<SideChatId>("side-chat", &id)?;
    Ok(Json(state.service.list_side_chat_messages(id).await?))
}

async fn send_side_chat_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageView>), ApiError> {
    let id = parse_id::<SideChatId>("side-chat", &id)?;
    let message = state
        .service
        .send_side_chat_message(id, body.into_request()?)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn delete_side_chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id::<SideChatId>("side-chat", &id)?;
    state.service.delete_side_chat(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id::<ConversationId>("conversation", &id)?;
    state.service.delete_conversation(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
