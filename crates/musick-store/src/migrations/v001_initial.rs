//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `accounts`, `rooms`, `room_members` and
//! `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Accounts (local identity provider)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS accounts (
    id         TEXT PRIMARY KEY NOT NULL,
    email      TEXT NOT NULL,
    user_name  TEXT,
    token      TEXT NOT NULL UNIQUE,        -- bearer token presented on authenticate
    created_at TEXT NOT NULL                -- RFC-3339, UTC
);

-- ----------------------------------------------------------------
-- Rooms
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS rooms (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    code       TEXT NOT NULL UNIQUE,        -- short shareable join code
    owner_id   TEXT NOT NULL,
    title      TEXT NOT NULL,
    is_private INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    created_at TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Durable memberships
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS room_members (
    room_id    TEXT NOT NULL,
    account_id TEXT NOT NULL,
    role       TEXT NOT NULL DEFAULT 'member',
    joined_at  TEXT NOT NULL,

    PRIMARY KEY (room_id, account_id),
    FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    room_id   TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    body      TEXT NOT NULL,
    type      TEXT NOT NULL DEFAULT 'text',
    sent_at   TEXT NOT NULL,

    FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_room_sent
    ON messages(room_id, sent_at DESC, id DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
