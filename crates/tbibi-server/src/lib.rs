//! # tbibi-server
//!
//! Realtime chat core and the Axum HTTP + `WebSocket` surface around it.
//!
//! - [`realtime`]: connection registry, per-connection sessions and pumps,
//!   message router, session lifecycle
//! - [`api`]: `/ws` upgrade and the chat REST routes
//! - Health and Prometheus metrics endpoints
//! - Graceful shutdown via `CancellationToken` + `TaskTracker`

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod realtime;
pub mod server;
pub mod shutdown;

pub use config::{Heartbeat, ServerConfig};
pub use errors::{ApiError, ApiResult};
pub use server::{AppState, ChatServer};
pub use shutdown::ShutdownCoordinator;
