//! Message repository: the `messages` table.

use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::errors::Result;
use crate::types::MessageRow;

/// Message repository. Stateless, every method takes `&Connection`.
pub struct MessageRepo;

impl MessageRepo {
    /// Insert a message stamped with `at`. Does not check membership.
    pub fn insert(
        conn: &Connection,
        chat_id: &str,
        sender_id: &str,
        content: &str,
        at: &str,
    ) -> Result<MessageRow> {
        let id = Uuid::now_v7().to_string();
        let _ = conn.execute(
            "INSERT INTO messages (id, chat_id, sender_id, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![id, chat_id, sender_id, content, at],
        )?;
        Ok(MessageRow {
            id,
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            created_at: at.to_string(),
            updated_at: at.to_string(),
        })
    }

    /// Live messages of a chat, oldest first. Messages sharing a timestamp
    /// keep insertion order.
    pub fn list_for_chat(conn: &Connection, chat_id: &str) -> Result<Vec<MessageRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, sender_id, content, created_at, updated_at
             FROM messages
             WHERE chat_id = ?1 AND deleted_at IS NULL
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![chat_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Soft-delete a message.
    #[cfg(test)]
    pub(crate) fn soft_delete(conn: &Connection, message_id: &str, at: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE messages SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
            params![message_id, at],
        )?;
        Ok(changed > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
        Ok(MessageRow {
            id: row.get(0)?,
            chat_id: row.get(1)?,
            sender_id: row.get(2)?,
            content: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
