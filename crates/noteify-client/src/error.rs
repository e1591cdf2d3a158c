use noteify_shared::{BackendError, ConfigError, ValidationError};
use thiserror::Error;

/// Errors surfaced by the client services.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Missing, private, or malformed id / handle.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("You need to be signed in")]
    NotAuthenticated,
}

impl ClientError {
    /// Short text suitable for a transient notice.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Validation(e) => e.to_string(),
            ClientError::NotFound(what) => format!("{what} not found"),
            ClientError::NotAuthenticated | ClientError::Backend(BackendError::NotAuthenticated) => {
                "You need to be signed in".to_string()
            }
            ClientError::Backend(BackendError::InvalidCredentials) => {
                "Invalid email or password".to_string()
            }
            ClientError::Backend(BackendError::Conflict(_)) => "That already exists".to_string(),
            ClientError::Backend(BackendError::Transport(_)) => {
                "Could not reach the server".to_string()
            }
            ClientError::Backend(_) => "Something went wrong, please try again".to_string(),
            ClientError::Config(e) => e.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ClientError::NotFound(_) | ClientError::Backend(BackendError::Api { status: 404, .. })
        )
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_hide_transport_detail() {
        let err = ClientError::from(BackendError::Transport("tcp reset by 10.0.0.3".into()));
        assert_eq!(err.user_message(), "Could not reach the server");

        let err = ClientError::from(ValidationError::SelfConversation);
        assert_eq!(err.user_message(), "Cannot start a conversation with yourself");
    }

    #[test]
    fn remote_404_counts_as_not_found() {
        let err = ClientError::from(BackendError::Api {
            status: 404,
            message: "gone".into(),
        });
        assert!(err.is_not_found());
        assert!(ClientError::NotFound("Note").is_not_found());
        assert!(!ClientError::NotAuthenticated.is_not_found());
    }
}
