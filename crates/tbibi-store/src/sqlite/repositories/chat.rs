//! Chat repository: the `chats` and `participants` tables.
//!
//! A chat is a two-party conversation. Both rows and participants are
//! soft-deleted via `deleted_at` and every read filters those out.

use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use super::now;
use crate::errors::Result;
use crate::types::{ChatSummary, UserType, display_name};

/// Chat repository. Stateless, every method takes `&Connection`.
pub struct ChatRepo;

impl ChatRepo {
    /// Insert an empty chat and return its id.
    pub fn create(conn: &Connection) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let now = now();
        let _ = conn.execute(
            "INSERT INTO chats (id, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![id, now],
        )?;
        Ok(id)
    }

    /// Add a participant to a chat.
    pub fn add_participant(
        conn: &Connection,
        chat_id: &str,
        user_id: &str,
        user_type: Option<UserType>,
    ) -> Result<()> {
        let now = now();
        let _ = conn.execute(
            "INSERT INTO participants (id, chat_id, user_id, user_type, joined_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?5)",
            params![Uuid::now_v7().to_string(), chat_id, user_id, user_type, now],
        )?;
        Ok(())
    }

    /// Whether a live (not deleted) chat with this id exists.
    pub fn exists(conn: &Connection, chat_id: &str) -> Result<bool> {
        let found = conn
            .query_row(
                "SELECT 1 FROM chats WHERE id = ?1 AND deleted_at IS NULL",
                params![chat_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Whether `user_id` is an active participant of `chat_id`.
    pub fn is_participant(conn: &Connection, chat_id: &str, user_id: &str) -> Result<bool> {
        let found = conn
            .query_row(
                "SELECT 1 FROM participants
                 WHERE chat_id = ?1 AND user_id = ?2 AND deleted_at IS NULL",
                params![chat_id, user_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Find the live chat both users participate in, if any.
    pub fn find_between(conn: &Connection, user_a: &str, user_b: &str) -> Result<Option<String>> {
        let id = conn
            .query_row(
                "SELECT c.id FROM chats c
                 JOIN participants p1 ON p1.chat_id = c.id
                 JOIN participants p2 ON p2.chat_id = c.id
                 WHERE p1.user_id = ?1 AND p2.user_id = ?2
                   AND p1.deleted_at IS NULL AND p2.deleted_at IS NULL
                   AND c.deleted_at IS NULL
                 ORDER BY c.created_at ASC
                 LIMIT 1",
                params![user_a, user_b],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Bump `updated_at` so the chat sorts first in chat lists.
    pub fn touch(conn: &Connection, chat_id: &str, at: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE chats SET updated_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
            params![chat_id, at],
        )?;
        Ok(changed > 0)
    }

    /// Soft-delete a chat.
    #[cfg(test)]
    pub(crate) fn soft_delete(conn: &Connection, chat_id: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE chats SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
            params![chat_id, now()],
        )?;
        Ok(changed > 0)
    }

    /// Chats `user_id` takes part in, one row per other participant, most
    /// recently active first. Names come from the directory when known.
    pub fn list_for_user(conn: &Connection, user_id: &str) -> Result<Vec<ChatSummary>> {
        let mut stmt = conn.prepare(
            "SELECT c.id, p.user_id,
                    COALESCE(d.first_name, ''), COALESCE(d.last_name, ''),
                    c.updated_at
             FROM chats c
             JOIN participants p ON p.chat_id = c.id
             LEFT JOIN user_directory d ON d.user_id = p.user_id
             WHERE p.user_id != ?1
               AND p.deleted_at IS NULL
               AND c.deleted_at IS NULL
               AND c.id IN (SELECT chat_id FROM participants
                            WHERE user_id = ?1 AND deleted_at IS NULL)
             ORDER BY c.updated_at DESC, c.id ASC",
        )?;
        let rows = stmt
            .query_map(params![user_id], Self::map_summary)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatSummary> {
        let other_user_id: String = row.get(1)?;
        let first_name: String = row.get(2)?;
        let last_name: String = row.get(3)?;
        Ok(ChatSummary {
            chat_id: row.get(0)?,
            display_name: display_name(&first_name, &last_name, &other_user_id),
            other_user_id,
            first_name,
            last_name,
            updated_at: row.get(4)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
