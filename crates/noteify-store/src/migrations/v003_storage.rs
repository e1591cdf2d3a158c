use rusqlite::Connection;

const UP_SQL: &str = r#"
-- Object storage: bucket-scoped paths with inline content
CREATE TABLE IF NOT EXISTS storage_objects (
    bucket       TEXT NOT NULL,
    path         TEXT NOT NULL,
    content_type TEXT NOT NULL,
    size         INTEGER NOT NULL,
    blake3_hash  TEXT NOT NULL,                         -- hex content hash
    data         BLOB NOT NULL,
    created_at   TEXT NOT NULL,

    PRIMARY KEY (bucket, path)
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
