use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS comments (
    id         TEXT PRIMARY KEY NOT NULL,
    note_id    TEXT NOT NULL,                           -- FK -> notes(id)
    user_id    TEXT NOT NULL,
    content    TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (note_id) REFERENCES notes(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_comments_note ON comments(note_id, created_at);

CREATE TABLE IF NOT EXISTS likes (
    id         TEXT PRIMARY KEY NOT NULL,
    note_id    TEXT NOT NULL,
    user_id    TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (note_id) REFERENCES notes(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_likes_unique ON likes(note_id, user_id);

CREATE TABLE IF NOT EXISTS saved_notes (
    id         TEXT PRIMARY KEY NOT NULL,
    note_id    TEXT NOT NULL,
    user_id    TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (note_id) REFERENCES notes(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_saved_notes_unique ON saved_notes(note_id, user_id);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
