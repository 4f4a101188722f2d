//! Public types returned by the chat store.
//!
//! Field names serialize in `snake_case` so the REST handlers can return
//! them to web clients as-is.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Account kind of a directory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    /// A patient account.
    Patient,
    /// A doctor account.
    Doctor,
}

impl UserType {
    /// Stored and wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Doctor => "doctor",
        }
    }
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(Self::Patient),
            "doctor" => Ok(Self::Doctor),
            other => Err(format!("unknown user type: {other}")),
        }
    }
}

impl ToSql for UserType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for UserType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// A directory entry for a patient or doctor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Stable account identifier (the id clients connect with).
    pub user_id: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Patient or doctor.
    pub user_type: UserType,
}

impl UserProfile {
    /// "First Last", falling back to the user id when both names are blank.
    pub fn display_name(&self) -> String {
        display_name(&self.first_name, &self.last_name, &self.user_id)
    }
}

/// One row of a user's chat list: the chat and the other participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    /// Chat identifier.
    #[serde(rename = "id")]
    pub chat_id: String,
    /// The participant who is not the requesting user.
    #[serde(rename = "user_id")]
    pub other_user_id: String,
    /// Other participant's given name (empty when not in the directory).
    pub first_name: String,
    /// Other participant's family name (empty when not in the directory).
    pub last_name: String,
    /// Name to show for the other participant.
    pub display_name: String,
    /// Last activity in the chat (RFC 3339).
    pub updated_at: String,
}

/// A stored chat message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRow {
    /// Message identifier.
    pub id: String,
    /// Owning chat.
    pub chat_id: String,
    /// Author.
    pub sender_id: String,
    /// Text body.
    pub content: String,
    /// Creation time (RFC 3339).
    pub created_at: String,
    /// Last update time (RFC 3339).
    pub updated_at: String,
}

pub(crate) fn display_name(first: &str, last: &str, fallback: &str) -> String {
    let joined = format!("{} {}", first.trim(), last.trim());
    let joined = joined.trim();
    if joined.is_empty() {
        fallback.to_string()
    } else {
        joined.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
