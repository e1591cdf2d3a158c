use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use noteify_shared::constants::{AVATAR_BUCKET, MAX_AVATAR_SIZE};
use noteify_shared::query::escape_like;
use noteify_shared::types::{Note, Profile, Theme, UserId};
use noteify_shared::{
    decode_row, validation, Backend, BackendError, Filter, Query, Table, ValidationError,
};

use crate::commands::notes::NoteService;
use crate::error::{ClientError, ClientResult};

/// Editable profile fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub username: String,
    pub display_name: String,
    #[serde(default)]
    pub bio: String,
}

/// What a visitor sees on someone's profile page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicProfile {
    pub profile: Profile,
    pub notes: Vec<Note>,
}

pub struct ProfileService<B> {
    backend: Arc<B>,
}

impl<B> Clone for ProfileService<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: Backend> ProfileService<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub async fn get_profile(&self, id: &str) -> ClientResult<Profile> {
        let id = UserId::parse(id).map_err(|_| ClientError::NotFound("Profile"))?;
        self.profile_by_id(id).await
    }

    pub async fn profile_by_id(&self, id: UserId) -> ClientResult<Profile> {
        let rows = self
            .backend
            .select(Table::Profiles, Query::new().eq("id", id).limit(1))
            .await?;
        let row = rows.into_iter().next().ok_or(ClientError::NotFound("Profile"))?;
        Ok(decode_row(row)?)
    }

    /// Case-insensitive exact handle lookup. Malformed handles are simply
    /// not found.
    pub async fn find_by_username(&self, username: &str) -> ClientResult<Profile> {
        let username = username.trim();
        if !validation::is_valid_username(username) {
            return Err(ClientError::NotFound("Profile"));
        }
        let rows = self
            .backend
            .select(
                Table::Profiles,
                Query::new()
                    .filter(Filter::ilike("username", escape_like(username)))
                    .limit(1),
            )
            .await?;
        let row = rows.into_iter().next().ok_or(ClientError::NotFound("Profile"))?;
        Ok(decode_row(row)?)
    }

    pub async fn update_profile(&self, id: UserId, update: &ProfileUpdate) -> ClientResult<Profile> {
        let username = validation::username(&update.username)?;
        let display_name = validation::display_name(&update.display_name)?;
        let bio = validation::bio(&update.bio)?;

        match self.find_by_username(username).await {
            Ok(existing) if existing.id != id => return Err(ValidationError::UsernameTaken.into()),
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let rows = self
            .backend
            .update(
                Table::Profiles,
                vec![Filter::eq("id", id)],
                json!({ "username": username, "display_name": display_name, "bio": bio }),
            )
            .await
            .map_err(|e| match e {
                BackendError::Conflict(_) => ClientError::from(ValidationError::UsernameTaken),
                other => other.into(),
            })?;
        let row = rows.into_iter().next().ok_or(ClientError::NotFound("Profile"))?;
        info!(user_id = %id, "profile updated");
        Ok(decode_row(row)?)
    }

    pub async fn set_theme(&self, id: UserId, theme: Theme) -> ClientResult<Profile> {
        let rows = self
            .backend
            .update(
                Table::Profiles,
                vec![Filter::eq("id", id)],
                json!({ "theme": theme.as_str() }),
            )
            .await?;
        let row = rows.into_iter().next().ok_or(ClientError::NotFound("Profile"))?;
        Ok(decode_row(row)?)
    }

    /// Store a new profile picture under `avatars/<user>/<random>.<ext>` and
    /// point the profile at its public URL.
    pub async fn upload_avatar(
        &self,
        id: UserId,
        data: Bytes,
        content_type: &str,
    ) -> ClientResult<Profile> {
        if data.len() > MAX_AVATAR_SIZE {
            return Err(ValidationError::PayloadTooLarge {
                size: data.len(),
                max: MAX_AVATAR_SIZE,
            }
            .into());
        }
        let ext = image_extension(content_type)
            .ok_or_else(|| ValidationError::UnsupportedFileType(content_type.to_string()))?;

        let path = format!("{id}/{}.{ext}", Uuid::new_v4());
        let stored = self
            .backend
            .upload(AVATAR_BUCKET, &path, data, content_type)
            .await?;
        let url = self.backend.public_url(AVATAR_BUCKET, &stored);

        let rows = self
            .backend
            .update(
                Table::Profiles,
                vec![Filter::eq("id", id)],
                json!({ "avatar_url": url }),
            )
            .await?;
        let row = rows.into_iter().next().ok_or(ClientError::NotFound("Profile"))?;
        info!(user_id = %id, path = %stored, "avatar uploaded");
        Ok(decode_row(row)?)
    }

    /// Profile plus public notes, looked up by handle.
    pub async fn public_profile(&self, username: &str) -> ClientResult<PublicProfile> {
        let profile = self.find_by_username(username).await?;
        self.with_public_notes(profile).await
    }

    pub async fn public_profile_by_id(&self, id: &str) -> ClientResult<PublicProfile> {
        let profile = self.get_profile(id).await?;
        self.with_public_notes(profile).await
    }

    async fn with_public_notes(&self, profile: Profile) -> ClientResult<PublicProfile> {
        let notes = NoteService::new(Arc::clone(&self.backend))
            .public_notes_of(profile.id)
            .await?;
        Ok(PublicProfile { profile, notes })
    }
}

fn image_extension(content_type: &str) -> Option<&'static str> {
    match content_type.trim().to_ascii_lowercase().as_str() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sign_up, store};

    #[tokio::test]
    async fn lookup_by_handle_ignores_case() {
        let server = store();
        let ada = sign_up(&server, "Ada_L").await;
        let profiles = ProfileService::new(Arc::new(server.client()));

        assert_eq!(profiles.find_by_username("ada_l").await.unwrap().id, ada);
        assert!(profiles.find_by_username("adaxl").await.unwrap_err().is_not_found());
        assert!(profiles.find_by_username("../x").await.unwrap_err().is_not_found());
        assert!(profiles.get_profile("nope").await.unwrap_err().is_not_found());
        assert_eq!(profiles.get_profile(&ada.to_string()).await.unwrap().username, "Ada_L");
    }

    #[tokio::test]
    async fn update_checks_rules_and_uniqueness() {
        let server = store();
        let ada = sign_up(&server, "ada").await;
        sign_up(&server, "alan").await;
        let profiles = ProfileService::new(Arc::new(server.client()));

        let taken = ProfileUpdate {
            username: "ALAN".into(),
            display_name: "Ada".into(),
            bio: String::new(),
        };
        assert!(matches!(
            profiles.update_profile(ada, &taken).await,
            Err(ClientError::Validation(ValidationError::UsernameTaken))
        ));

        let bad = ProfileUpdate {
            username: "a d".into(),
            ..taken.clone()
        };
        assert!(matches!(
            profiles.update_profile(ada, &bad).await,
            Err(ClientError::Validation(ValidationError::InvalidUsername))
        ));

        let ok = ProfileUpdate {
            username: "ADA".into(),
            display_name: " Ada Lovelace ".into(),
            bio: "  ".into(),
        };
        let profile = profiles.update_profile(ada, &ok).await.unwrap();
        assert_eq!(profile.username, "ADA");
        assert_eq!(profile.display_name, "Ada Lovelace");
        assert_eq!(profile.bio, None);
    }

    #[tokio::test]
    async fn theme_is_persisted() {
        let server = store();
        let ada = sign_up(&server, "ada").await;
        let profiles = ProfileService::new(Arc::new(server.client()));

        assert_eq!(profiles.set_theme(ada, Theme::Dark).await.unwrap().theme, Theme::Dark);
    }

    #[tokio::test]
    async fn avatar_upload_sets_public_url() {
        let server = store().with_public_url("http://cdn.test");
        let ada = sign_up(&server, "ada").await;
        let profiles = ProfileService::new(Arc::new(server.client()));

        let profile = profiles
            .upload_avatar(ada, Bytes::from_static(b"\x89PNG"), "image/png")
            .await
            .unwrap();
        let url = profile.avatar_url.unwrap();
        let prefix = format!("http://cdn.test/storage/v1/object/public/avatars/{ada}/");
        assert!(url.starts_with(&prefix));
        assert!(url.ends_with(".png"));

        let path = url.trim_start_matches("http://cdn.test/storage/v1/object/public/avatars/");
        assert_eq!(
            server.download("avatars", path).await.unwrap().data,
            Bytes::from_static(b"\x89PNG")
        );
    }

    #[tokio::test]
    async fn avatar_limits() {
        let profiles = ProfileService::new(Arc::new(store()));
        let big = Bytes::from(vec![0u8; MAX_AVATAR_SIZE + 1]);
        assert!(matches!(
            profiles.upload_avatar(UserId::new(), big, "image/png").await,
            Err(ClientError::Validation(ValidationError::PayloadTooLarge { .. }))
        ));
        assert!(matches!(
            profiles
                .upload_avatar(UserId::new(), Bytes::from_static(b"x"), "text/html")
                .await,
            Err(ClientError::Validation(ValidationError::UnsupportedFileType(_)))
        ));
    }
}
