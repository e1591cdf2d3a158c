//! Email/password accounts and bearer sessions for the local data service.
//!
//! Passwords are stored as a keyed BLAKE3 hash over a random per-user salt.
//! Session tokens are 32 random bytes, hex-encoded.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde_json::Value;
use uuid::Uuid;

use noteify_shared::types::{AuthUser, Session, SignUpMetadata, UserId};
use noteify_shared::Table;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::schema;

/// Lifetime of an access token.
pub const SESSION_TTL_SECS: i64 = 3_600;

const PASSWORD_CONTEXT: &str = "noteify 2024-05 local auth password v1";

impl Database {
    /// Register an account and create its profile row in one transaction.
    ///
    /// Returns the new user and the stored profile row. A taken email or
    /// username is reported as [`StoreError::Conflict`].
    pub fn create_user(
        &mut self,
        email: &str,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> Result<(AuthUser, Value)> {
        let id = UserId::new();
        let salt = random_hex::<16>();
        let hash = hash_password(&salt, password);
        let now = schema::now_text();

        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO auth_users (id, email, password_hash, salt, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id.to_string(), email, hash, salt, now],
        )
        .map_err(StoreError::from_write)?;
        tx.execute(
            "INSERT INTO profiles (id, username, display_name, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![id.to_string(), metadata.username, metadata.display_name, now],
        )
        .map_err(StoreError::from_write)?;
        tx.commit()?;

        tracing::info!(user_id = %id, username = %metadata.username, "account created");

        let profile = self.row_by_id(Table::Profiles, &id.to_string())?;
        Ok((
            AuthUser {
                id,
                email: Some(email.to_string()),
            },
            profile,
        ))
    }

    /// Check an email/password pair.
    pub fn verify_password(&self, email: &str, password: &str) -> Result<AuthUser> {
        let row: Option<(String, String, String, String)> = self
            .conn()
            .query_row(
                "SELECT id, email, password_hash, salt FROM auth_users WHERE email = ?1",
                params![email],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((id, email, stored, salt)) = row else {
            return Err(StoreError::InvalidCredentials);
        };

        let stored = blake3::Hash::from_hex(&stored).map_err(|_| StoreError::InvalidCredentials)?;
        let candidate = blake3::Hash::from_hex(hash_password(&salt, password))
            .map_err(|_| StoreError::InvalidCredentials)?;

        // blake3::Hash equality is constant-time
        if stored != candidate {
            return Err(StoreError::InvalidCredentials);
        }

        Ok(AuthUser {
            id: parse_user_id(&id)?,
            email: Some(email),
        })
    }

    pub fn create_session(&self, user: &AuthUser) -> Result<Session> {
        let token = random_hex::<32>();
        let now = Utc::now();
        let expires_at = now + Duration::seconds(SESSION_TTL_SECS);

        self.conn().execute(
            "INSERT INTO auth_sessions (token, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                token,
                user.id.to_string(),
                schema::timestamp_text(now),
                schema::timestamp_text(expires_at),
            ],
        )?;

        Ok(Session {
            access_token: token,
            refresh_token: None,
            expires_at: Some(expires_at),
            user: user.clone(),
        })
    }

    /// Resolve a bearer token. Expired or unknown tokens yield `None`.
    pub fn session_user(&self, token: &str) -> Result<Option<AuthUser>> {
        let row: Option<(String, String, String)> = self
            .conn()
            .query_row(
                "SELECT u.id, u.email, s.expires_at
                 FROM auth_sessions s JOIN auth_users u ON u.id = s.user_id
                 WHERE s.token = ?1",
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((id, email, expires_at)) = row else {
            return Ok(None);
        };

        let expires_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&expires_at)?.with_timezone(&Utc);
        if expires_at <= Utc::now() {
            self.revoke_session(token)?;
            return Ok(None);
        }

        Ok(Some(AuthUser {
            id: parse_user_id(&id)?,
            email: Some(email),
        }))
    }

    pub fn revoke_session(&self, token: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM auth_sessions WHERE token = ?1", params![token])?;
        Ok(affected > 0)
    }
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = blake3::Hasher::new_derive_key(PASSWORD_CONTEXT);
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher.finalize().to_hex().to_string()
}

fn random_hex<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn parse_user_id(id: &str) -> Result<UserId> {
    Uuid::parse_str(id)
        .map(UserId)
        .map_err(|e| StoreError::InvalidValue {
            column: "id".into(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(username: &str) -> SignUpMetadata {
        SignUpMetadata {
            username: username.into(),
            display_name: username.to_uppercase(),
        }
    }

    #[test]
    fn sign_up_creates_profile() {
        let mut db = Database::open_in_memory().unwrap();
        let (user, profile) = db.create_user("ada@example.com", "secret1", &meta("ada")).unwrap();

        assert_eq!(profile["id"], json!(user.id));
        assert_eq!(profile["username"], "ada");
        assert_eq!(profile["badges"], json!([]));
        assert_eq!(profile["theme"], "system");
    }

    #[test]
    fn duplicate_email_or_username_conflicts() {
        let mut db = Database::open_in_memory().unwrap();
        db.create_user("ada@example.com", "secret1", &meta("ada")).unwrap();

        assert!(matches!(
            db.create_user("ADA@example.com", "secret1", &meta("other")),
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            db.create_user("alan@example.com", "secret1", &meta("ADA")),
            Err(StoreError::Conflict(_))
        ));
        // the failed sign-up left no half-created account behind
        assert!(db.verify_password("alan@example.com", "secret1").is_err());
    }

    #[test]
    fn password_check() {
        let mut db = Database::open_in_memory().unwrap();
        let (user, _) = db.create_user("ada@example.com", "secret1", &meta("ada")).unwrap();

        assert_eq!(db.verify_password("ada@example.com", "secret1").unwrap().id, user.id);
        assert!(matches!(
            db.verify_password("ada@example.com", "wrong!!"),
            Err(StoreError::InvalidCredentials)
        ));
        assert!(matches!(
            db.verify_password("nobody@example.com", "secret1"),
            Err(StoreError::InvalidCredentials)
        ));
    }

    #[test]
    fn sessions_resolve_until_revoked() {
        let mut db = Database::open_in_memory().unwrap();
        let (user, _) = db.create_user("ada@example.com", "secret1", &meta("ada")).unwrap();
        let session = db.create_session(&user).unwrap();

        assert_eq!(session.access_token.len(), 64);
        assert_eq!(db.session_user(&session.access_token).unwrap(), Some(user));
        assert!(db.revoke_session(&session.access_token).unwrap());
        assert_eq!(db.session_user(&session.access_token).unwrap(), None);
    }

    #[test]
    fn expired_sessions_are_dropped() {
        let mut db = Database::open_in_memory().unwrap();
        let (user, _) = db.create_user("ada@example.com", "secret1", &meta("ada")).unwrap();
        let session = db.create_session(&user).unwrap();
        db.conn()
            .execute(
                "UPDATE auth_sessions SET expires_at = '2000-01-01T00:00:00.000000Z'",
                [],
            )
            .unwrap();

        assert_eq!(db.session_user(&session.access_token).unwrap(), None);
        assert!(!db.revoke_session(&session.access_token).unwrap());
    }
}
