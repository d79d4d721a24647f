use musick_shared::MessageKind;
use rusqlite::params;

use crate::database::{db_now, from_db_time, to_db_time, Database};
use crate::error::Result;
use crate::models::{Message, MessageQuery};

impl Database {
    /// Persist a message and return it with its assigned id and timestamp.
    pub fn insert_message(
        &self,
        room_id: &str,
        sender_id: &str,
        body: &str,
        kind: MessageKind,
    ) -> Result<Message> {
        let sent_at = db_now();
        self.conn().execute(
            "INSERT INTO messages (room_id, sender_id, body, type, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![room_id, sender_id, body, kind.as_str(), to_db_time(&sent_at)],
        )?;

        Ok(Message {
            id: self.conn().last_insert_rowid(),
            room_id: room_id.to_string(),
            sender_id: sender_id.to_string(),
            body: body.to_string(),
            kind,
            sent_at,
        })
    }

    /// Newest-first page of a room's messages, ordered by `(sent_at, id)` desc.
    pub fn list_messages(&self, query: &MessageQuery) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, room_id, sender_id, body, type, sent_at
             FROM messages
             WHERE room_id = ?1
               AND (?2 IS NULL OR id < ?2)
               AND (?3 = 1 OR type = 'text')
             ORDER BY sent_at DESC, id DESC
             LIMIT ?4",
        )?;

        let rows = stmt.query_map(
            params![
                query.room_id,
                query.before_id,
                query.include_system,
                query.limit
            ],
            row_to_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let kind: String = row.get(4)?;
    let ts_str: String = row.get(5)?;

    Ok(Message {
        id: row.get(0)?,
        room_id: row.get(1)?,
        sender_id: row.get(2)?,
        body: row.get(3)?,
        kind: MessageKind::from_str_lossy(&kind),
        sent_at: from_db_time(5, &ts_str)?,
    })
}
