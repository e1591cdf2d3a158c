//! Server configuration loaded from environment variables.
//!
//! Only the data service settings are required; everything else has a
//! default so the server starts against a local store with no setup beyond
//! `NOTEIFY_URL=sqlite::memory:` and a key.

use std::net::SocketAddr;

use noteify_shared::config::RemoteConfig;
use noteify_shared::constants::DEFAULT_HTTP_PORT;
use noteify_shared::ConfigError;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP API.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Sustained requests per second allowed per client IP.
    /// Env: `RATE_LIMIT_PER_SEC`
    /// Default: `10`
    pub rate_limit_per_sec: f64,

    /// Burst size per client IP.
    /// Env: `RATE_LIMIT_BURST`
    /// Default: `30`
    pub rate_limit_burst: f64,

    /// Base of the public object URLs handed out by the local store.
    /// Env: `PUBLIC_URL`
    /// Default: `http://<HTTP_ADDR>`
    pub public_url: Option<String>,

    /// Data service to serve from.
    pub remote: RemoteConfig,
}

impl ServerConfig {
    pub fn with_remote(remote: RemoteConfig) -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            rate_limit_per_sec: 10.0,
            rate_limit_burst: 30.0,
            public_url: None,
            remote,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source. Missing data service settings
    /// are fatal; bad optional values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::with_remote(RemoteConfig::from_lookup(&lookup)?);

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.trim().parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(rate) = positive(&lookup, "RATE_LIMIT_PER_SEC") {
            config.rate_limit_per_sec = rate;
        }
        if let Some(burst) = positive(&lookup, "RATE_LIMIT_BURST") {
            config.rate_limit_burst = burst;
        }

        if let Some(url) = lookup("PUBLIC_URL") {
            let url = url.trim().trim_end_matches('/');
            if !url.is_empty() {
                config.public_url = Some(url.to_string());
            }
        }

        Ok(config)
    }

    pub fn public_url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.http_addr))
    }
}

fn positive(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<f64> {
    let value = lookup(name)?;
    match value.trim().parse::<f64>() {
        Ok(n) if n > 0.0 && n.is_finite() => Some(n),
        _ => {
            tracing::warn!(name, value = %value, "Invalid rate limit setting, using default");
            None
        }
    }
}
