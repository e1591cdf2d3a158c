use std::sync::Arc;

use tracing::info;

use noteify_shared::types::{Profile, SignUpMetadata};
use noteify_shared::{validation, Backend, ValidationError};

use crate::commands::profile::ProfileService;
use crate::error::{ClientError, ClientResult};

pub struct AuthService<B> {
    backend: Arc<B>,
    profiles: ProfileService<B>,
}

impl<B: Backend> AuthService<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            profiles: ProfileService::new(Arc::clone(&backend)),
            backend,
        }
    }

    /// Create an account and its profile, leaving the new user signed in.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
        display_name: &str,
    ) -> ClientResult<Profile> {
        let email = validation::email(email)?;
        let password = validation::password(password)?;
        let username = validation::username(username)?;
        let display_name = validation::display_name(display_name)?;

        match self.profiles.find_by_username(username).await {
            Ok(_) => return Err(ValidationError::UsernameTaken.into()),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let session = self
            .backend
            .sign_up(
                email,
                password,
                SignUpMetadata {
                    username: username.to_string(),
                    display_name: display_name.to_string(),
                },
            )
            .await?;
        info!(user_id = %session.user.id, "signed up");

        self.profiles.profile_by_id(session.user.id).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> ClientResult<Profile> {
        let email = validation::email(email)?;
        if password.is_empty() {
            return Err(ValidationError::Required("Password").into());
        }
        let session = self.backend.sign_in(email, password).await?;
        self.profiles.profile_by_id(session.user.id).await
    }

    pub async fn sign_out(&self) -> ClientResult<()> {
        self.backend.sign_out().await?;
        Ok(())
    }

    /// Profile of the signed-in user, `None` when signed out.
    pub async fn current_user(&self) -> ClientResult<Option<Profile>> {
        let Some(user) = self.backend.get_user().await? else {
            return Ok(None);
        };
        match self.profiles.profile_by_id(user.id).await {
            Ok(profile) => Ok(Some(profile)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Like [`current_user`](Self::current_user) but an error when signed out.
    pub async fn require_user(&self) -> ClientResult<Profile> {
        self.current_user()
            .await?
            .ok_or(ClientError::NotAuthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::store;

    #[tokio::test]
    async fn sign_up_in_out() {
        let server = store();
        let auth = AuthService::new(Arc::new(server.client()));

        let profile = auth
            .sign_up("ada@example.com", "secret1", "ada", "Ada")
            .await
            .unwrap();
        assert_eq!(profile.username, "ada");
        assert_eq!(auth.current_user().await.unwrap(), Some(profile.clone()));

        auth.sign_out().await.unwrap();
        assert_eq!(auth.current_user().await.unwrap(), None);
        assert!(matches!(
            auth.require_user().await,
            Err(ClientError::NotAuthenticated)
        ));

        let again = auth.sign_in("ada@example.com", "secret1").await.unwrap();
        assert_eq!(again.id, profile.id);
    }

    #[tokio::test]
    async fn sign_up_validates_before_calling_out() {
        let auth = AuthService::new(Arc::new(store()));
        assert!(matches!(
            auth.sign_up("nope", "secret1", "ada", "Ada").await,
            Err(ClientError::Validation(ValidationError::InvalidEmail))
        ));
        assert!(matches!(
            auth.sign_up("ada@example.com", "123", "ada", "Ada").await,
            Err(ClientError::Validation(ValidationError::TooShort { .. }))
        ));
    }

    #[tokio::test]
    async fn taken_username_is_reported() {
        let server = store();
        AuthService::new(Arc::new(server.client()))
            .sign_up("ada@example.com", "secret1", "ada", "Ada")
            .await
            .unwrap();

        let err = AuthService::new(Arc::new(server.client()))
            .sign_up("other@example.com", "secret1", "ADA", "Other")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Validation(ValidationError::UsernameTaken)
        ));
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let server = store();
        let auth = AuthService::new(Arc::new(server.client()));
        auth.sign_up("ada@example.com", "secret1", "ada", "Ada")
            .await
            .unwrap();

        let err = auth.sign_in("ada@example.com", "secret2").await.unwrap_err();
        assert_eq!(err.user_message(), "Invalid email or password");
    }
}
