//! Directory repository: the `user_directory` table.
//!
//! Account handlers own patient and doctor records. They mirror the
//! identity fields the chat service needs here via [`DirectoryRepo::upsert`].

use rusqlite::{Connection, OptionalExtension, params};

use super::now;
use crate::errors::Result;
use crate::types::UserProfile;

/// Directory repository. Stateless, every method takes `&Connection`.
pub struct DirectoryRepo;

impl DirectoryRepo {
    /// Insert or update a profile. Returns `true` when a new row was created.
    pub fn upsert(conn: &Connection, profile: &UserProfile) -> Result<bool> {
        let existed = Self::get(conn, &profile.user_id)?.is_some();
        let now = now();
        let _ = conn.execute(
            "INSERT INTO user_directory (user_id, first_name, last_name, user_type, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                 first_name = excluded.first_name,
                 last_name = excluded.last_name,
                 user_type = excluded.user_type,
                 updated_at = excluded.updated_at",
            params![
                profile.user_id,
                profile.first_name,
                profile.last_name,
                profile.user_type,
                now
            ],
        )?;
        Ok(!existed)
    }

    /// Look up a profile by user id.
    pub fn get(conn: &Connection, user_id: &str) -> Result<Option<UserProfile>> {
        let row = conn
            .query_row(
                "SELECT user_id, first_name, last_name, user_type
                 FROM user_directory WHERE user_id = ?1",
                params![user_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Case-insensitive substring match on "first last".
    ///
    /// Folding uses `fold_case` (see
    /// [`register_functions`](crate::sqlite::connection::register_functions)),
    /// so non-ASCII names match regardless of case.
    pub fn search(conn: &Connection, fragment: &str) -> Result<Vec<UserProfile>> {
        let pattern = format!("%{}%", escape_like(&fragment.to_lowercase()));
        let mut stmt = conn.prepare(
            "SELECT user_id, first_name, last_name, user_type
             FROM user_directory
             WHERE fold_case(first_name || ' ' || last_name) LIKE ?1 ESCAPE '\\'
             ORDER BY last_name ASC, first_name ASC, user_id ASC",
        )?;
        let rows = stmt
            .query_map(params![pattern], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProfile> {
        Ok(UserProfile {
            user_id: row.get(0)?,
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            user_type: row.get(3)?,
        })
    }
}

fn escape_like(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
