use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use noteify_client::commands::notes::NoteService;
use noteify_client::commands::profile::{ProfileService, PublicProfile};
use noteify_client::commands::social::SocialService;
use noteify_shared::types::{Comment, Note, UserId};
use noteify_shared::Backend;
use noteify_store::LocalBackend;

use crate::error::ServerError;
use crate::rate_limit::{rate_limit_middleware, RateLimiter};

pub struct AppState<B> {
    pub notes: NoteService<B>,
    pub social: SocialService<B>,
    pub profiles: ProfileService<B>,
    pub rate_limiter: RateLimiter,
    /// Object storage served by this process; `None` for a hosted backend.
    pub storage: Option<Arc<LocalBackend>>,
}

impl<B> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            notes: self.notes.clone(),
            social: self.social.clone(),
            profiles: self.profiles.clone(),
            rate_limiter: self.rate_limiter.clone(),
            storage: self.storage.clone(),
        }
    }
}

impl<B: Backend> AppState<B> {
    pub fn new(backend: Arc<B>, rate_limiter: RateLimiter) -> Self {
        Self {
            notes: NoteService::new(Arc::clone(&backend)),
            social: SocialService::new(Arc::clone(&backend)),
            profiles: ProfileService::new(backend),
            rate_limiter,
            storage: None,
        }
    }

    pub fn with_storage(mut self, storage: Arc<LocalBackend>) -> Self {
        self.storage = Some(storage);
        self
    }
}

pub fn build_router<B: Backend>(state: AppState<B>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/users/:username", get(resolve_username::<B>))
        .route("/profile/:id", get(profile_by_id::<B>))
        .route("/u/:username", get(profile_by_username::<B>))
        .route("/explore", get(explore::<B>))
        .route("/notes/:id", get(shared_note::<B>))
        .route(
            "/storage/v1/object/public/:bucket/*path",
            get(public_object::<B>),
        )
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct UserIdResponse {
    id: UserId,
}

#[derive(Deserialize)]
struct ExploreParams {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct SharedNoteResponse {
    note: Note,
    comments: Vec<Comment>,
    like_count: usize,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Username to profile id, answered as a redirect to the profile page.
async fn resolve_username<B: Backend>(
    State(state): State<AppState<B>>,
    Path(username): Path<String>,
) -> Result<Response, ServerError> {
    let profile = state.profiles.find_by_username(&username).await?;
    let location = format!("/profile/{}", profile.id);
    Ok((
        StatusCode::TEMPORARY_REDIRECT,
        [(header::LOCATION, location)],
        Json(UserIdResponse { id: profile.id }),
    )
        .into_response())
}

async fn profile_by_id<B: Backend>(
    State(state): State<AppState<B>>,
    Path(id): Path<String>,
) -> Result<Json<PublicProfile>, ServerError> {
    Ok(Json(state.profiles.public_profile_by_id(&id).await?))
}

async fn profile_by_username<B: Backend>(
    State(state): State<AppState<B>>,
    Path(username): Path<String>,
) -> Result<Json<PublicProfile>, ServerError> {
    Ok(Json(state.profiles.public_profile(&username).await?))
}

async fn explore<B: Backend>(
    State(state): State<AppState<B>>,
    Query(params): Query<ExploreParams>,
) -> Result<Json<Vec<Note>>, ServerError> {
    Ok(Json(state.notes.explore_feed(params.limit).await?))
}

async fn shared_note<B: Backend>(
    State(state): State<AppState<B>>,
    Path(id): Path<String>,
) -> Result<Json<SharedNoteResponse>, ServerError> {
    let note = state.notes.get_shared_note(&id).await?;
    let comments = state.social.list_comments(note.id).await?;
    let like_count = state.social.like_count(note.id).await?;
    Ok(Json(SharedNoteResponse {
        note,
        comments,
        like_count,
    }))
}

async fn public_object<B: Backend>(
    State(state): State<AppState<B>>,
    Path((bucket, path)): Path<(String, String)>,
) -> Result<Response, ServerError> {
    let Some(storage) = state.storage.as_ref() else {
        return Err(ServerError::NotFound("Object not found".into()));
    };
    let object = storage
        .download(&bucket, path.trim_start_matches('/'))
        .await
        .map_err(noteify_client::ClientError::from)?;
    Ok((
        [(header::CONTENT_TYPE, object.content_type)],
        object.data,
    )
        .into_response())
}

pub async fn serve<B: Backend>(state: AppState<B>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
