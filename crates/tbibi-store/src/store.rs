//! High-level transactional [`ChatStore`] API.
//!
//! Composes the repositories into the operations the chat service needs.
//! Every write runs inside a single `SQLite` transaction so callers never
//! observe a chat without its participants or a message without the chat's
//! activity bump.

use rusqlite::{Transaction, TransactionBehavior};
use tracing::{debug, instrument};

use crate::errors::{Result, StoreError};
use crate::sqlite::connection::{self, ConnectionConfig, ConnectionPool, PooledConnection};
use crate::sqlite::migrations::run_migrations;
use crate::sqlite::repositories::{ChatRepo, DirectoryRepo, MessageRepo, now};
use crate::types::{ChatSummary, MessageRow, UserProfile};

/// Chat persistence and user directory over a pooled `SQLite` database.
#[derive(Clone)]
pub struct ChatStore {
    pool: ConnectionPool,
}

impl ChatStore {
    /// Wrap an existing pool. The schema must already be migrated.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Open a file-backed store and apply pending migrations.
    pub fn open_file(path: &str, config: &ConnectionConfig) -> Result<Self> {
        let pool = connection::new_file(path, config)?;
        let _ = run_migrations(&*pool.get()?)?;
        Ok(Self::new(pool))
    }

    /// Open a migrated in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let pool = connection::new_in_memory(&ConnectionConfig::default())?;
        let _ = run_migrations(&*pool.get()?)?;
        Ok(Self::new(pool))
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Chats
    // ─────────────────────────────────────────────────────────────────────

    /// Return the chat shared by `user_a` and `user_b`, creating it (with
    /// both participants) if none exists.
    ///
    /// Runs under an immediate transaction so two concurrent calls for the
    /// same pair cannot both create a chat.
    #[instrument(skip(self), err)]
    pub fn create_or_find_chat(&self, user_a: &str, user_b: &str) -> Result<String> {
        if user_a.is_empty() || user_b.is_empty() {
            return Err(StoreError::InvalidOperation(
                "both user ids are required".into(),
            ));
        }
        if user_a == user_b {
            return Err(StoreError::InvalidOperation(format!(
                "cannot open a chat between {user_a} and themselves"
            )));
        }

        let conn = self.conn()?;
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;

        if let Some(chat_id) = ChatRepo::find_between(&tx, user_a, user_b)? {
            debug!(chat_id = %chat_id, "found existing chat");
            return Ok(chat_id);
        }

        let type_a = DirectoryRepo::get(&tx, user_a)?.map(|p| p.user_type);
        let type_b = DirectoryRepo::get(&tx, user_b)?.map(|p| p.user_type);

        let chat_id = ChatRepo::create(&tx)?;
        ChatRepo::add_participant(&tx, &chat_id, user_a, type_a)?;
        ChatRepo::add_participant(&tx, &chat_id, user_b, type_b)?;
        tx.commit()?;

        debug!(chat_id = %chat_id, "created chat");
        Ok(chat_id)
    }

    /// Chats `user_id` takes part in, most recently active first.
    pub fn list_chats_for_user(&self, user_id: &str) -> Result<Vec<ChatSummary>> {
        let conn = self.conn()?;
        ChatRepo::list_for_user(&conn, user_id)
    }

    /// Whether `user_id` belongs to `chat_id`. Unknown chats are
    /// [`StoreError::ChatNotFound`].
    pub fn is_participant(&self, chat_id: &str, user_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        if !ChatRepo::exists(&conn, chat_id)? {
            return Err(StoreError::ChatNotFound(chat_id.to_string()));
        }
        ChatRepo::is_participant(&conn, chat_id, user_id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Messages
    // ─────────────────────────────────────────────────────────────────────

    /// Store a message and bump the chat's activity time.
    ///
    /// The chat must exist and `sender_id` must be one of its participants.
    #[instrument(skip(self, content), fields(len = content.len()), err)]
    pub fn append_message(
        &self,
        chat_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<MessageRow> {
        if sender_id.is_empty() {
            return Err(StoreError::InvalidOperation("sender id is required".into()));
        }

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        if !ChatRepo::exists(&tx, chat_id)? {
            return Err(StoreError::ChatNotFound(chat_id.to_string()));
        }
        if !ChatRepo::is_participant(&tx, chat_id, sender_id)? {
            return Err(StoreError::InvalidOperation(format!(
                "{sender_id} is not a participant of chat {chat_id}"
            )));
        }

        let at = now();
        let row = MessageRepo::insert(&tx, chat_id, sender_id, content, &at)?;
        let _ = ChatRepo::touch(&tx, chat_id, &at)?;
        tx.commit()?;
        Ok(row)
    }

    /// Messages of a chat, oldest first. Unknown chats yield an empty list.
    pub fn list_messages(&self, chat_id: &str) -> Result<Vec<MessageRow>> {
        let conn = self.conn()?;
        MessageRepo::list_for_chat(&conn, chat_id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Directory
    // ─────────────────────────────────────────────────────────────────────

    /// Resolve a user id to its directory profile.
    pub fn resolve_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let conn = self.conn()?;
        DirectoryRepo::get(&conn, user_id)
    }

    /// Search the directory by name fragment.
    pub fn search_users(&self, fragment: &str) -> Result<Vec<UserProfile>> {
        let conn = self.conn()?;
        DirectoryRepo::search(&conn, fragment)
    }

    /// Insert or refresh a directory profile. Returns `true` if it was new.
    pub fn upsert_user(&self, profile: &UserProfile) -> Result<bool> {
        let conn = self.conn()?;
        DirectoryRepo::upsert(&conn, profile)
    }
}

impl std::fmt::Debug for ChatStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStore")
            .field("max_connections", &self.pool.max_size())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;

    use super::*;
    use crate::types::UserType;

    fn store() -> ChatStore {
        ChatStore::open_in_memory().unwrap()
    }

    #[test]
    fn create_or_find_is_stable_and_symmetric() {
        let store = store();
        let first = store.create_or_find_chat("p1", "d1").unwrap();
        let again = store.create_or_find_chat("p1", "d1").unwrap();
        let reversed = store.create_or_find_chat("d1", "p1").unwrap();
        assert_eq!(first, again);
        assert_eq!(first, reversed);
    }

    #[test]
    fn create_or_find_rejects_self_chat() {
        let store = store();
        assert_matches!(
            store.create_or_find_chat("p1", "p1"),
            Err(StoreError::InvalidOperation(_))
        );
        assert_matches!(
            store.create_or_find_chat("", "p1"),
            Err(StoreError::InvalidOperation(_))
        );
    }

    #[test]
    fn create_records_directory_user_types() {
        let store = store();
        store
            .upsert_user(&UserProfile {
                user_id: "d1".into(),
                first_name: "Leila".into(),
                last_name: "Trabelsi".into(),
                user_type: UserType::Doctor,
            })
            .unwrap();
        let chat = store.create_or_find_chat("p1", "d1").unwrap();

        let conn = store.conn().unwrap();
        let recorded: Option<String> = conn
            .query_row(
                "SELECT user_type FROM participants WHERE chat_id = ?1 AND user_id = 'd1'",
                [&chat],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(recorded.as_deref(), Some("doctor"));
    }

    #[test]
    fn append_and_list_messages_in_order() {
        let store = store();
        let chat = store.create_or_find_chat("p1", "d1").unwrap();
        for i in 0..5 {
            store.append_message(&chat, "p1", &format!("m{i}")).unwrap();
        }
        let contents: Vec<String> = store
            .list_messages(&chat)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn append_to_unknown_chat_fails() {
        let store = store();
        assert_matches!(
            store.append_message("missing", "p1", "hi"),
            Err(StoreError::ChatNotFound(id)) if id == "missing"
        );
    }

    #[test]
    fn append_by_non_participant_fails() {
        let store = store();
        let chat = store.create_or_find_chat("p1", "d1").unwrap();
        assert_matches!(
            store.append_message(&chat, "intruder", "hi"),
            Err(StoreError::InvalidOperation(_))
        );
        assert!(store.list_messages(&chat).unwrap().is_empty());
    }

    #[test]
    fn membership_is_per_chat() {
        let store = store();
        let chat = store.create_or_find_chat("p1", "d1").unwrap();
        let other = store.create_or_find_chat("p1", "d2").unwrap();
        assert!(store.is_participant(&chat, "d1").unwrap());
        assert!(!store.is_participant(&chat, "d2").unwrap());
        assert!(store.is_participant(&other, "d2").unwrap());
        assert_matches!(
            store.is_participant("missing", "p1"),
            Err(StoreError::ChatNotFound(_))
        );
    }

    #[test]
    fn append_bumps_chat_in_listing() {
        let store = store();
        let quiet = store.create_or_find_chat("p1", "d1").unwrap();
        let busy = store.create_or_find_chat("p1", "d2").unwrap();
        store.append_message(&busy, "d2", "ping").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        store.append_message(&quiet, "d1", "pong").unwrap();

        let chats = store.list_chats_for_user("p1").unwrap();
        assert_eq!(chats[0].chat_id, quiet);
        assert_eq!(chats[1].chat_id, busy);
    }

    #[test]
    fn list_messages_for_unknown_chat_is_empty() {
        let store = store();
        assert!(store.list_messages("nope").unwrap().is_empty());
    }

    #[test]
    fn directory_round_trip() {
        let store = store();
        let profile = UserProfile {
            user_id: "p1".into(),
            first_name: "Amina".into(),
            last_name: "Haddad".into(),
            user_type: UserType::Patient,
        };
        assert!(store.upsert_user(&profile).unwrap());
        assert_eq!(store.resolve_user("p1").unwrap(), Some(profile));
        assert_eq!(store.search_users("hadd").unwrap().len(), 1);
        assert!(store.resolve_user("p2").unwrap().is_none());
    }

    #[test]
    fn concurrent_find_or_create_yields_one_chat() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        let store = Arc::new(
            ChatStore::open_file(path.to_str().unwrap(), &ConnectionConfig::default()).unwrap(),
        );

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        store.create_or_find_chat("p1", "d1").unwrap()
                    } else {
                        store.create_or_find_chat("d1", "p1").unwrap()
                    }
                })
            })
            .collect();
        let ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.iter().all(|id| id == &ids[0]));
        assert_eq!(store.list_chats_for_user("p1").unwrap().len(), 1);
    }
}
