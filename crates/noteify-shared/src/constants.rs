/// Quiet period before a note edit is written back (milliseconds)
pub const AUTOSAVE_DEBOUNCE_MS: u64 = 1_500;

/// Maximum message length in characters
pub const MAX_MESSAGE_LEN: usize = 4_000;

/// Maximum comment length in characters
pub const MAX_COMMENT_LEN: usize = 1_000;

/// Maximum note title length in characters
pub const MAX_NOTE_TITLE_LEN: usize = 200;

/// Username length bounds
pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 24;

/// Maximum display name length in characters
pub const MAX_DISPLAY_NAME_LEN: usize = 50;

/// Maximum bio length in characters
pub const MAX_BIO_LEN: usize = 160;

/// Minimum password length accepted at sign-up
pub const PASSWORD_MIN_LEN: usize = 6;

/// Maximum avatar upload size in bytes (5 MiB)
pub const MAX_AVATAR_SIZE: usize = 5 * 1024 * 1024;

/// Storage bucket holding profile pictures
pub const AVATAR_BUCKET: &str = "avatars";

/// Default page size of the explore feed
pub const EXPLORE_PAGE_SIZE: usize = 50;

/// Realtime websocket heartbeat interval in seconds
pub const REALTIME_HEARTBEAT_SECS: u64 = 30;

/// Buffered change events per subscription
pub const SUBSCRIPTION_BUFFER: usize = 64;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;
