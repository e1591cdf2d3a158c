//! # noteify-server
//!
//! HTTP surface of Noteify.
//!
//! This binary provides:
//! - **Public JSON views**: profiles by id or handle, the username lookup
//!   redirect, shared notes and the explore feed
//! - **Object serving** for avatars kept in a local SQLite store
//! - **Per-IP rate limiting** with periodic eviction of idle clients
//!
//! The data service is picked from `NOTEIFY_URL`: a `sqlite:` URL serves
//! straight from a local store, anything else talks to the hosted backend.

mod api;
mod config;
mod error;
mod rate_limit;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use noteify_client::RestBackend;
use noteify_shared::config::BackendTarget;
use noteify_store::LocalBackend;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::rate_limit::RateLimiter;

const PURGE_EVERY: Duration = Duration::from_secs(300);
const MAX_IDLE: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,noteify_server=debug")),
        )
        .init();

    info!("Starting Noteify server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_env()?;
    info!(?config, "Loaded configuration");

    let rate_limiter = RateLimiter::new(config.rate_limit_per_sec, config.rate_limit_burst);
    let _purge = rate_limiter.spawn_purge(PURGE_EVERY, MAX_IDLE);

    tokio::select! {
        result = run(&config, rate_limiter) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

async fn run(config: &ServerConfig, rate_limiter: RateLimiter) -> anyhow::Result<()> {
    match config.remote.target() {
        target @ (BackendTarget::Sqlite(_) | BackendTarget::SqliteDefault) => {
            let store = match &target {
                BackendTarget::Sqlite(Some(path)) => LocalBackend::open(path)?,
                BackendTarget::Sqlite(None) => LocalBackend::open_in_memory()?,
                _ => LocalBackend::open_default()?,
            }
            .with_public_url(config.public_url());
            info!(?target, "Serving from local store");

            let store = Arc::new(store);
            let state =
                AppState::new(Arc::new(store.client()), rate_limiter).with_storage(store);
            api::serve(state, config.http_addr).await
        }
        BackendTarget::Remote(url) => {
            info!(url = %url, "Serving from hosted backend");
            let backend = Arc::new(RestBackend::from_config(&config.remote));
            api::serve(AppState::new(backend, rate_limiter), config.http_addr).await
        }
    }
}
