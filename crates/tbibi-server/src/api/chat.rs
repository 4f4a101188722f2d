//! Chat REST handlers.
//!
//! Store calls run on the blocking pool through [`run_store`]. Sending a
//! message over REST stores it first, then pushes it to the recipient if
//! they are online. A recipient outside the chat is rejected before
//! anything is stored.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use tbibi_store::{ChatSummary, MessageRow, StoreError, UserProfile};
use tracing::{debug, info};

use super::run_store;
use crate::errors::{ApiError, ApiResult};
use crate::realtime::ChatMessage;
use crate::server::AppState;

/// `?userID=` of the chat list.
#[derive(Debug, Deserialize)]
pub struct ChatsQuery {
    #[serde(rename = "userID", default)]
    user_id: Option<String>,
}

/// Query of `findOrCreateChat`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindOrCreateQuery {
    #[serde(default)]
    current_user_id: Option<String>,
    #[serde(default)]
    selected_user_id: Option<String>,
}

/// `{"chatId": ...}`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatIdResponse {
    /// Chat shared by the two users.
    pub chat_id: String,
}

/// `{"messages": [...]}`
#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesResponse {
    /// Oldest first.
    pub messages: Vec<MessageRow>,
}

/// `{"users": [...]}`
#[derive(Debug, Serialize, Deserialize)]
pub struct UsersResponse {
    /// Matching directory entries.
    pub users: Vec<UserProfile>,
}

/// `{"status": ...}`
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Human-readable result.
    pub status: String,
}

fn required(value: Option<String>, name: &str) -> ApiResult<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{name} is required")))
}

/// GET `/api/v1/chats?userID=<id>`
pub async fn list_chats(
    State(state): State<AppState>,
    Query(query): Query<ChatsQuery>,
) -> ApiResult<Json<Vec<ChatSummary>>> {
    let user_id = required(query.user_id, "userID")?;
    let chats = run_store(&state.store, move |s| s.list_chats_for_user(&user_id)).await?;
    Ok(Json(chats))
}

/// GET `/api/v1/messages/{chat_id}`
pub async fn list_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> ApiResult<Json<MessagesResponse>> {
    let messages = run_store(&state.store, move |s| s.list_messages(&chat_id)).await?;
    Ok(Json(MessagesResponse { messages }))
}

/// GET `/api/findOrCreateChat?currentUserId=&selectedUserId=`
pub async fn find_or_create_chat(
    State(state): State<AppState>,
    Query(query): Query<FindOrCreateQuery>,
) -> ApiResult<Json<ChatIdResponse>> {
    let current = required(query.current_user_id, "currentUserId")?;
    let selected = required(query.selected_user_id, "selectedUserId")?;
    let chat_id = run_store(&state.store, move |s| {
        s.create_or_find_chat(&current, &selected)
    })
    .await?;
    Ok(Json(ChatIdResponse { chat_id }))
}

/// POST `/api/v1/SendMessage` with a wire message as body.
pub async fn send_message(
    State(state): State<AppState>,
    body: Result<Json<ChatMessage>, JsonRejection>,
) -> ApiResult<Json<StatusResponse>> {
    let Json(message) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if message.chat_id.is_empty() {
        return Err(ApiError::BadRequest("chat_id is required".into()));
    }

    let stored = message.clone();
    let row = run_store(&state.store, move |s| {
        if !stored.recipient_id.is_empty()
            && !s.is_participant(&stored.chat_id, &stored.recipient_id)?
        {
            return Err(StoreError::InvalidOperation(format!(
                "{} is not a participant of chat {}",
                stored.recipient_id, stored.chat_id
            )));
        }
        s.append_message(&stored.chat_id, &stored.sender_id, &stored.content)
    })
    .await?;
    info!(chat_id = %row.chat_id, message_id = %row.id, "message stored");

    if message.recipient_id.is_empty() {
        debug!(chat_id = %row.chat_id, "no recipient, not forwarding");
    } else {
        let payload = message
            .to_json()
            .map_err(|e| ApiError::Internal(format!("failed to encode message: {e}")))?;
        let _outcome = state.lifecycle.router().forward(&message, Arc::from(payload));
    }

    Ok(Json(StatusResponse {
        status: "Message sent successfully".into(),
    }))
}

/// GET `/api/v1/search/{username}`
pub async fn search_users(
    State(state): State<AppState>,
    Path(fragment): Path<String>,
) -> ApiResult<Json<UsersResponse>> {
    let users = run_store(&state.store, move |s| s.search_users(&fragment)).await?;
    Ok(Json(UsersResponse { users }))
}

/// GET `/api/v1/users/{user_id}`
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserProfile>> {
    let lookup = user_id.clone();
    run_store(&state.store, move |s| s.resolve_user(&lookup))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("user not found: {user_id}")))
}
