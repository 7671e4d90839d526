//! v001 -- Initial schema creation.
//!
//! Directory tables (`users`, `blocks`) and the delivery tables
//! (`conversations`, `messages`, `conversation_messages`).

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (display profile only; accounts live elsewhere)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,  -- opaque identity
    full_name     TEXT NOT NULL DEFAULT '',
    profile_photo TEXT NOT NULL DEFAULT '',
    updated_at    TEXT NOT NULL               -- RFC-3339
);

-- ----------------------------------------------------------------
-- Blocks: directed edge blocker -> blocked
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS blocks (
    blocker_id TEXT NOT NULL,
    blocked_id TEXT NOT NULL,
    created_at TEXT NOT NULL,

    PRIMARY KEY (blocker_id, blocked_id)
);

-- ----------------------------------------------------------------
-- Conversations: one row per unordered identity pair
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id            TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    participant_a TEXT NOT NULL,              -- lexicographically smaller
    participant_b TEXT NOT NULL,
    created_at    TEXT NOT NULL,

    UNIQUE (participant_a, participant_b)
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    conversation_id TEXT NOT NULL,
    sender_id       TEXT NOT NULL,
    receiver_id     TEXT NOT NULL,
    body            TEXT NOT NULL DEFAULT '',
    attachments     TEXT NOT NULL DEFAULT '[]', -- JSON array
    reply_to        TEXT,
    reply_preview   TEXT,                       -- JSON object
    edited          INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    edited_at       TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id)
);

-- ----------------------------------------------------------------
-- Ordered message references per conversation
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversation_messages (
    conversation_id TEXT NOT NULL,
    seq             INTEGER NOT NULL,
    message_id      TEXT NOT NULL UNIQUE,

    PRIMARY KEY (conversation_id, seq),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id),
    FOREIGN KEY (message_id) REFERENCES messages(id)
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
