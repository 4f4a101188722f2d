//! # tbibi-store
//!
//! Chat persistence and user directory for the tbibi backend.
//!
//! - **Chat store**: [`ChatStore`] creates or finds two-party chats, lists a
//!   user's chats, appends and lists messages. Writes are transactional.
//! - **Directory**: resolves and searches patient/doctor profiles mirrored
//!   from the account service.
//! - **`SQLite` backend**: `r2d2` pool, embedded migrations, stateless
//!   repositories.

#![deny(unsafe_code)]

pub mod errors;
pub mod sqlite;
pub mod store;
pub mod types;

pub use errors::{Result, StoreError};
pub use sqlite::{ConnectionConfig, ConnectionPool};
pub use store::ChatStore;
pub use types::{ChatSummary, MessageRow, UserProfile, UserType};
