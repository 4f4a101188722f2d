//! Pooled `SQLite` handles for the chat database.
//!
//! Every connection the pool opens is configured the same way on
//! acquisition: write-ahead journal, a busy timeout long enough to ride out
//! concurrent chat writers, enforced foreign keys (messages and participants
//! point at chats). Each connection also gets the `fold_case` SQL function,
//! a Unicode-aware replacement for `SQLite`'s ASCII-only `LOWER()`.

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use rusqlite::functions::FunctionFlags;

use crate::errors::Result;

/// Pool shared by the store and the migration runner.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// A connection checked out of [`ConnectionPool`].
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pool sizing and per-connection tuning.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Connections kept open for file databases (default 8).
    pub pool_size: u32,
    /// How long a writer waits on a locked database, in ms (default 30 s).
    pub busy_timeout_ms: u32,
    /// Page cache per connection in KiB (default 8 MiB).
    pub cache_size_kib: i64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            busy_timeout_ms: 30_000,
            cache_size_kib: 8192,
        }
    }
}

#[derive(Debug)]
struct ChatPragmas {
    busy_timeout_ms: u32,
    cache_size_kib: i64,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ChatPragmas {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = {};\
             PRAGMA foreign_keys = ON;\
             PRAGMA cache_size = -{};\
             PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms, self.cache_size_kib
        ))?;
        register_functions(conn)
    }
}

/// Install the chat database's SQL functions on `conn`.
///
/// `fold_case(text)` lowercases with Rust's full Unicode mapping, so
/// "ÉMILE" and "émile" compare equal. `NULL` folds to `NULL`.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "fold_case",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
}

/// Pool over a private in-memory database, for tests.
///
/// Each `:memory:` connection would be a separate database, so the pool
/// holds exactly one connection whatever `config.pool_size` says.
pub fn new_in_memory(config: &ConnectionConfig) -> Result<ConnectionPool> {
    build(SqliteConnectionManager::memory(), 1, config)
}

/// Pool over the database file at `path`, created if missing.
pub fn new_file(path: &str, config: &ConnectionConfig) -> Result<ConnectionPool> {
    build(SqliteConnectionManager::file(path), config.pool_size, config)
}

fn build(
    manager: SqliteConnectionManager,
    max_size: u32,
    config: &ConnectionConfig,
) -> Result<ConnectionPool> {
    let pool = Pool::builder()
        .max_size(max_size)
        .connection_timeout(Duration::from_secs(5))
        .connection_customizer(Box::new(ChatPragmas {
            busy_timeout_ms: config.busy_timeout_ms,
            cache_size_kib: config.cache_size_kib,
        }))
        .build(manager)?;
    Ok(pool)
}

/// Effective settings read back from a live connection.
#[derive(Debug)]
pub struct PragmaState {
    /// `wal` for file databases, `memory` for in-memory ones.
    pub journal_mode: String,
    /// `PRAGMA foreign_keys` is on.
    pub foreign_keys_enabled: bool,
}

/// Read back the settings applied on acquisition.
pub fn verify_pragmas(conn: &Connection) -> Result<PragmaState> {
    let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
    Ok(PragmaState {
        journal_mode,
        foreign_keys_enabled: foreign_keys == 1,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
