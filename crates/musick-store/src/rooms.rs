//! CRUD operations for [`Room`] records.

use musick_shared::constants::ROOM_CODE_LEN;
use rand::Rng;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::database::{db_now, from_db_time, to_db_time, Database};
use crate::error::{Result, StoreError};
use crate::models::Room;

/// Unambiguous characters only (no 0/O, 1/I).
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const CODE_ATTEMPTS: usize = 16;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create a room with a fresh join code and record the owner as its
    /// first durable member.
    pub fn create_room(&self, owner_id: &str, title: &str, is_private: bool) -> Result<Room> {
        let tx = self.conn().unchecked_transaction()?;

        let mut code = None;
        for _ in 0..CODE_ATTEMPTS {
            let candidate = generate_code();
            let taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM rooms WHERE code = ?1)",
                params![candidate],
                |row| row.get(0),
            )?;
            if !taken {
                code = Some(candidate);
                break;
            }
        }
        let code = code.ok_or(StoreError::CodeSpaceExhausted(CODE_ATTEMPTS))?;

        let room = Room {
            id: Uuid::new_v4().to_string(),
            code,
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            is_private,
            created_at: db_now(),
        };

        tx.execute(
            "INSERT INTO rooms (id, code, owner_id, title, is_private, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                room.id,
                room.code,
                room.owner_id,
                room.title,
                room.is_private,
                to_db_time(&room.created_at),
            ],
        )?;
        tx.execute(
            "INSERT INTO room_members (room_id, account_id, role, joined_at)
             VALUES (?1, ?2, 'owner', ?3)",
            params![room.id, room.owner_id, to_db_time(&room.created_at)],
        )?;
        tx.commit()?;

        tracing::debug!(room = %room.id, code = %room.code, "room created");
        Ok(room)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Look a room up by its join code.
    pub fn room_by_code(&self, code: &str) -> Result<Option<Room>> {
        let room = self
            .conn()
            .query_row(
                "SELECT id, code, owner_id, title, is_private, created_at
                 FROM rooms WHERE code = ?1",
                params![code],
                row_to_room,
            )
            .optional()?;
        Ok(room)
    }
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_room(row: &rusqlite::Row<'_>) -> rusqlite::Result<Room> {
    let created_str: String = row.get(5)?;
    Ok(Room {
        id: row.get(0)?,
        code: row.get(1)?,
        owner_id: row.get(2)?,
        title: row.get(3)?,
        is_private: row.get(4)?,
        created_at: from_db_time(5, &created_str)?,
    })
}
