//! # tbibi-logging
//!
//! Structured logging with `tracing`.
//!
//! Every crate in the workspace logs through `tracing` macros with
//! structured fields (`user_id`, `session_id`, `chat_id`). This crate owns
//! the one-time subscriber setup: an [`EnvFilter`] (where `RUST_LOG` wins
//! over the configured level) and a stderr formatter that is either compact
//! text or JSON lines.
//!
//! [`EnvFilter`]: tracing_subscriber::EnvFilter

#![deny(unsafe_code)]

pub mod types;

pub use types::{LogFormat, LogLevel};

/// Initialize the global tracing subscriber.
///
/// Call once at application startup. Subsequent calls are no-ops.
pub fn init_subscriber(level: LogLevel, format: LogFormat) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init is a no-op if a global subscriber is already set
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
