//! v001 -- Initial schema creation.
//!
//! Auth users and sessions, profiles, conversations, messages and notes.

use rusqlite::Connection;

const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Auth
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS auth_users (
    id            TEXT PRIMARY KEY NOT NULL,            -- UUID v4
    email         TEXT NOT NULL UNIQUE COLLATE NOCASE,
    password_hash TEXT NOT NULL,                        -- hex BLAKE3
    salt          TEXT NOT NULL,                        -- hex, 16 bytes
    created_at    TEXT NOT NULL                         -- RFC-3339
);

CREATE TABLE IF NOT EXISTS auth_sessions (
    token      TEXT PRIMARY KEY NOT NULL,               -- hex, 32 random bytes
    user_id    TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES auth_users(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Profiles (one per auth user, same id)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profiles (
    id           TEXT PRIMARY KEY NOT NULL,
    username     TEXT NOT NULL UNIQUE COLLATE NOCASE,
    display_name TEXT NOT NULL,
    avatar_url   TEXT,
    bio          TEXT,
    badges       TEXT NOT NULL DEFAULT '[]',            -- JSON array
    role         TEXT NOT NULL DEFAULT 'user',
    theme        TEXT NOT NULL DEFAULT 'system',
    created_at   TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Conversations / messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id              TEXT PRIMARY KEY NOT NULL,
    participant_ids TEXT NOT NULL,                      -- JSON array of user ids
    created_at      TEXT NOT NULL,
    last_message    TEXT,
    last_message_at TEXT
);

CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY NOT NULL,
    conversation_id TEXT NOT NULL,
    sender_id       TEXT NOT NULL,
    content         TEXT NOT NULL,
    created_at      TEXT NOT NULL,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts
    ON messages(conversation_id, created_at);

-- ----------------------------------------------------------------
-- Notes
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS notes (
    id         TEXT PRIMARY KEY NOT NULL,
    user_id    TEXT NOT NULL,
    title      TEXT NOT NULL DEFAULT '',
    content    TEXT NOT NULL DEFAULT '',
    is_public  INTEGER NOT NULL DEFAULT 0,              -- boolean 0/1
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notes_user ON notes(user_id, updated_at DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
