use thiserror::Error;

/// Failures reported by a remote data service.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Network or transport-level failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("Remote service error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The operation needs a signed-in session.
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Invalid email or password")]
    InvalidCredentials,

    /// A uniqueness rule was violated (e.g. email already registered).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unknown column, malformed filter value, etc.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Input rejected before any remote call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} must be at least {min} characters")]
    TooShort { field: &'static str, min: usize },

    #[error("Username may only contain letters, digits and underscores")]
    InvalidUsername,

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Username is already taken")]
    UsernameTaken,

    #[error("Cannot start a conversation with yourself")]
    SelfConversation,

    #[error("File too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),
}

/// Missing or malformed runtime configuration. Fatal at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}
