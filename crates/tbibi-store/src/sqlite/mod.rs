//! `SQLite` backend for the chat store.
//!
//! - **[`connection`]**: `r2d2` pool with WAL mode, foreign keys and
//!   performance pragmas applied to every connection, plus `fold_case`.
//! - **[`migrations`]**: version-tracked schema, embedded at compile time.
//! - **[`repositories`]**: stateless repository structs, each method takes
//!   `&Connection`.

pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{
    ConnectionConfig, ConnectionPool, PooledConnection, PragmaState, new_file, new_in_memory,
    register_functions, verify_pragmas,
};
pub use migrations::{current_version, latest_version, run_migrations};
