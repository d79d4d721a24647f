//! Domain model structs persisted in the local database.

use chrono::{DateTime, Utc};
use musick_shared::MessageKind;

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// A locally provisioned user. `token` is what the client presents to
/// authenticate when the relay runs against the SQLite backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub email: String,
    /// Display name shown next to messages.
    pub user_name: Option<String>,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// A chat room. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    /// UUID v4, rendered as text.
    pub id: String,
    /// Short shareable join code, unique across rooms.
    pub code: String,
    pub owner_id: String,
    pub title: String,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Autoincrement id; monotonic, used as the pagination cursor.
    pub id: i64,
    pub room_id: String,
    pub sender_id: String,
    pub body: String,
    pub kind: MessageKind,
    pub sent_at: DateTime<Utc>,
}

/// Parameters of a history page query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQuery {
    pub room_id: String,
    /// Only rows with `id < before_id` are eligible.
    pub before_id: Option<i64>,
    /// Maximum number of rows returned.
    pub limit: u32,
    /// When false only `text` rows are returned.
    pub include_system: bool,
}
