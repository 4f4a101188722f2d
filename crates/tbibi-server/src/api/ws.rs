//! `GET /ws?userId=<id>`: upgrade and hand the socket to the session lifecycle.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::errors::{ApiError, ApiResult};
use crate::server::AppState;

/// Query string of the upgrade request.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// User the connection belongs to.
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
}

/// Upgrade handler. The user id must be present and non-empty.
#[instrument(skip_all)]
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> ApiResult<Response> {
    let user_id = query
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("userId is required".into()))?;
    let upgrade = upgrade.map_err(|e| ApiError::UpgradeFailed(e.body_text()))?;

    info!(user_id = %user_id, "websocket upgrade");
    let lifecycle = Arc::clone(&state.lifecycle);
    Ok(upgrade
        .max_message_size(state.config.max_message_size)
        .on_failed_upgrade(|e| warn!(error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| async move {
            let _session = lifecycle.accept(user_id, socket);
        }))
}
