//! Repository implementations for `SQLite` database operations.
//!
//! Each repository is a stateless struct whose methods take a `&Connection`
//! parameter, so every operation is a function from (connection, input) to
//! output and can be tested against a bare in-memory connection.

pub mod chat;
pub mod directory;
pub mod message;

pub use chat::ChatRepo;
pub use directory::DirectoryRepo;
pub use message::MessageRepo;

use chrono::{SecondsFormat, Utc};

/// Current time as stored in every timestamp column.
pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
