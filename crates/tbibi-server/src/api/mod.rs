//! HTTP routes: the WebSocket endpoint and the chat REST surface.

pub mod chat;
pub mod ws;

use axum::Router;
use axum::routing::{get, post};
use tbibi_store::ChatStore;

use crate::errors::{ApiError, ApiResult};
use crate::server::AppState;

/// Routes served next to `/health` and `/metrics`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/v1/chats", get(chat::list_chats))
        .route("/api/v1/messages/{chat_id}", get(chat::list_messages))
        .route("/api/findOrCreateChat", get(chat::find_or_create_chat))
        .route("/api/v1/SendMessage", post(chat::send_message))
        .route("/api/v1/search/{username}", get(chat::search_users))
        .route("/api/v1/users/{user_id}", get(chat::get_user))
}

/// Run a store call on the blocking pool.
pub(crate) async fn run_store<T, F>(store: &ChatStore, call: F) -> ApiResult<T>
where
    F: FnOnce(&ChatStore) -> tbibi_store::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || call(&store))
        .await
        .map_err(|e| ApiError::Internal(format!("store task failed: {e}")))?
        .map_err(ApiError::from)
}
