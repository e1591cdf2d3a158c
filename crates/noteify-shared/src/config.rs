//! Remote service configuration loaded from environment variables.
//!
//! Both values are required: without them no component can reach the
//! backend, so their absence is reported as a fatal [`ConfigError`].

use std::fmt;
use std::path::PathBuf;

use crate::error::ConfigError;

const URL_VARS: [&str; 2] = ["NOTEIFY_URL", "SUPABASE_URL"];
const KEY_VARS: [&str; 2] = ["NOTEIFY_ANON_KEY", "SUPABASE_ANON_KEY"];

const SQLITE_SCHEME: &str = "sqlite:";

#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Base URL of the data service.
    /// Env: `NOTEIFY_URL` (or `SUPABASE_URL`)
    /// `sqlite:<path>` selects the local SQLite backend (`sqlite:` alone for
    /// the platform data directory, `sqlite::memory:` for a throwaway one).
    pub url: String,

    /// Public (anonymous) API key.
    /// Env: `NOTEIFY_ANON_KEY` (or `SUPABASE_ANON_KEY`)
    pub anon_key: String,
}

/// Where a [`RemoteConfig`] points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendTarget {
    /// Hosted service over HTTP(S).
    Remote(String),
    /// Local SQLite file; `None` for an in-memory database.
    Sqlite(Option<PathBuf>),
    /// Local SQLite file in the platform data directory (`sqlite:`).
    SqliteDefault,
}

impl RemoteConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source (used by tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let first = |names: &[&'static str]| {
            names
                .iter()
                .filter_map(|name| lookup(*name))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty())
        };

        let url = first(&URL_VARS[..]).ok_or(ConfigError::Missing(URL_VARS[0]))?;
        let anon_key = first(&KEY_VARS[..]).ok_or(ConfigError::Missing(KEY_VARS[0]))?;

        if !url.starts_with(SQLITE_SCHEME)
            && !url.starts_with("http://")
            && !url.starts_with("https://")
        {
            return Err(ConfigError::Invalid {
                name: URL_VARS[0],
                reason: format!("expected http(s):// or sqlite: URL, got '{url}'"),
            });
        }

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key,
        })
    }

    pub fn target(&self) -> BackendTarget {
        match self.url.strip_prefix(SQLITE_SCHEME) {
            Some(rest) => {
                let path = rest.trim_start_matches("//");
                if path.is_empty() {
                    BackendTarget::SqliteDefault
                } else if path == ":memory:" {
                    BackendTarget::Sqlite(None)
                } else {
                    BackendTarget::Sqlite(Some(PathBuf::from(path)))
                }
            }
            None => BackendTarget::Remote(self.url.clone()),
        }
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("url", &self.url)
            .field("anon_key", &"<redacted>")
            .finish()
    }
}
