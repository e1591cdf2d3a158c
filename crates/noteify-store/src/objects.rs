//! Bucket-scoped object storage kept inline in the database.

use bytes::Bytes;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::schema;

/// A stored object with its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bucket: String,
    pub path: String,
    pub content_type: String,
    pub blake3_hash: String,
    pub data: Bytes,
}

impl Database {
    /// Store (or overwrite) `bucket/path`.
    pub fn put_object(
        &self,
        bucket: &str,
        path: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<()> {
        validate_segment(bucket)?;
        validate_path(path)?;

        let hash = blake3::hash(data).to_hex().to_string();
        self.conn().execute(
            "INSERT INTO storage_objects (bucket, path, content_type, size, blake3_hash, data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (bucket, path) DO UPDATE SET
                content_type = excluded.content_type,
                size = excluded.size,
                blake3_hash = excluded.blake3_hash,
                data = excluded.data",
            params![
                bucket,
                path,
                content_type,
                data.len() as i64,
                hash,
                data,
                schema::now_text(),
            ],
        )?;

        tracing::debug!(bucket, path, size = data.len(), "object stored");
        Ok(())
    }

    pub fn get_object(&self, bucket: &str, path: &str) -> Result<StoredObject> {
        validate_segment(bucket)?;
        validate_path(path)?;

        let row: Option<(String, String, Vec<u8>)> = self
            .conn()
            .query_row(
                "SELECT content_type, blake3_hash, data FROM storage_objects
                 WHERE bucket = ?1 AND path = ?2",
                params![bucket, path],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let (content_type, blake3_hash, data) = row.ok_or(StoreError::NotFound)?;
        Ok(StoredObject {
            bucket: bucket.to_string(),
            path: path.to_string(),
            content_type,
            blake3_hash,
            data: Bytes::from(data),
        })
    }
}

fn validate_segment(segment: &str) -> Result<()> {
    let ok = !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidPath(segment.to_string()))
    }
}

/// Relative `a/b/c.ext` paths only: no empty, `.` or `..` segments.
fn validate_path(path: &str) -> Result<()> {
    if path.starts_with('/') || path.split('/').any(|s| validate_segment(s).is_err()) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_and_overwrite() {
        let db = Database::open_in_memory().unwrap();
        db.put_object("avatars", "u1/a.png", b"one", "image/png").unwrap();
        db.put_object("avatars", "u1/a.png", b"two!", "image/webp").unwrap();

        let object = db.get_object("avatars", "u1/a.png").unwrap();
        assert_eq!(object.data, Bytes::from_static(b"two!"));
        assert_eq!(object.content_type, "image/webp");
        assert_eq!(object.blake3_hash, blake3::hash(b"two!").to_hex().to_string());
    }

    #[test]
    fn traversal_paths_are_rejected() {
        let db = Database::open_in_memory().unwrap();
        for path in ["../x.png", "/abs.png", "a//b.png", "a/./b.png", ""] {
            assert!(
                matches!(
                    db.put_object("avatars", path, b"x", "image/png"),
                    Err(StoreError::InvalidPath(_))
                ),
                "{path} accepted"
            );
        }
        assert!(db.put_object("..", "a.png", b"x", "image/png").is_err());
    }

    #[test]
    fn missing_object_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.get_object("avatars", "nope.png"),
            Err(StoreError::NotFound)
        ));
    }
}
