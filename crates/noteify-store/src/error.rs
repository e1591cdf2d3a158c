use noteify_shared::BackendError;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Column name not part of the table schema.
    #[error("Unknown column '{column}' on table '{table}'")]
    UnknownColumn { table: &'static str, column: String },

    /// A JSON value that does not fit its column.
    #[error("Invalid value for column '{column}': {reason}")]
    InvalidValue { column: String, reason: String },

    /// Unique / foreign key constraint violated.
    #[error("Constraint violated: {0}")]
    Conflict(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Chrono parsing error.
    #[error("Timestamp parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),
}

impl StoreError {
    /// Map constraint failures to [`StoreError::Conflict`], everything else
    /// to [`StoreError::Sqlite`].
    pub(crate) fn from_write(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(message.unwrap_or_else(|| "constraint violation".into()))
            }
            other => StoreError::Sqlite(other),
        }
    }
}

impl From<StoreError> for BackendError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownColumn { .. } | StoreError::InvalidValue { .. } => {
                BackendError::InvalidQuery(err.to_string())
            }
            StoreError::Conflict(message) => BackendError::Conflict(message),
            StoreError::InvalidCredentials => BackendError::InvalidCredentials,
            StoreError::InvalidPath(path) => BackendError::Storage(format!("invalid path '{path}'")),
            StoreError::NotFound => BackendError::Api {
                status: 404,
                message: err.to_string(),
            },
            StoreError::Json(e) => BackendError::Serialization(e),
            other => BackendError::Transport(other.to_string()),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
