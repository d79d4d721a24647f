//! Durable room membership rows.

use rusqlite::params;

use crate::database::{db_now, to_db_time, Database};
use crate::error::Result;

impl Database {
    /// Record that `account_id` belongs to `room_id`.
    ///
    /// Idempotent: an existing row is left untouched. Returns `true` when a
    /// new row was written.
    pub fn upsert_member(&self, room_id: &str, account_id: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT INTO room_members (room_id, account_id, role, joined_at)
             VALUES (?1, ?2, 'member', ?3)
             ON CONFLICT(room_id, account_id) DO NOTHING",
            params![room_id, account_id, to_db_time(&db_now())],
        )?;
        Ok(affected > 0)
    }
}
