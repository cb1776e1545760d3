//! HTTP request handlers

use super::auth::user_id;
use super::types::{
    ChatMessageRequest, ChatMessageResponse, ClearResponse, ConversationWithMessagesResponse,
    ErrorResponse,
};
use super::AppState;
use crate::runtime::{TriageError, TurnRequest};
use crate::state_machine::prompts::FALLBACK;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio_util::sync::CancellationToken;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat/message", post(send_message))
        .route("/api/chat/conversation", get(get_active_conversation))
        .route("/api/chat/conversations/:id", get(get_conversation))
        .route("/api/chat/clear", post(clear_conversation))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Chat
// ============================================================

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatMessageRequest>,
) -> Result<Json<ChatMessageResponse>, AppError> {
    let user_id = user_id(&headers)?;

    let text = req.text.trim();
    if text.is_empty() {
        return Err(AppError::BadRequest("Message text is empty".to_string()));
    }

    // Dropping this handler (client went away) cancels the turn
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let request = TurnRequest {
        text: text.to_string(),
        conversation_id: req.conversation_id,
        message_id: req.message_id,
    };

    let outcome = state
        .runtime
        .submit_turn(&user_id, request, cancel)
        .await?;

    Ok(Json(outcome.into()))
}

async fn get_active_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ConversationWithMessagesResponse>, AppError> {
    let user_id = user_id(&headers)?;
    let view = state
        .runtime
        .active_conversation(&user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No active conversation".to_string()))?;
    Ok(Json(view.into()))
}

async fn get_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ConversationWithMessagesResponse>, AppError> {
    let user_id = user_id(&headers)?;
    let view = state.runtime.conversation(&user_id, &id).await?;
    Ok(Json(view.into()))
}

async fn clear_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ClearResponse>, AppError> {
    let user_id = user_id(&headers)?;
    let conversation_id = state.runtime.clear(&user_id).await?;
    Ok(Json(ClearResponse {
        cleared: conversation_id.is_some(),
        conversation_id,
    }))
}

async fn get_version() -> &'static str {
    concat!("triage-assistant ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    NotFound(String),
    Conflict { active_conversation_id: String },
    Unavailable,
    Internal(String),
}

impl From<TriageError> for AppError {
    fn from(e: TriageError) -> Self {
        match e {
            TriageError::ConversationNotFound(id) => {
                AppError::NotFound(format!("Conversation not found: {id}"))
            }
            TriageError::StaleConversation { active } => AppError::Conflict {
                active_conversation_id: active,
            },
            TriageError::Cancelled | TriageError::RuntimeUnavailable => AppError::Unavailable,
            TriageError::Persistence(_) | TriageError::Transition(_) => {
                AppError::Internal(e.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse::new(msg)),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new("Missing user identity"),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorResponse::new(msg)),
            AppError::Conflict {
                active_conversation_id,
            } => (
                StatusCode::CONFLICT,
                ErrorResponse {
                    error: "Conversation is no longer active".to_string(),
                    active_conversation_id: Some(active_conversation_id),
                },
            ),
            AppError::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, ErrorResponse::new(FALLBACK)),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::new(FALLBACK))
            }
        };

        (status, Json(body)).into_response()
    }
}
