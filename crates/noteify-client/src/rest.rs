//! [`Backend`] over the hosted service's HTTP APIs: PostgREST tables under
//! `/rest/v1`, GoTrue auth under `/auth/v1` and object storage under
//! `/storage/v1`. Realtime feeds go through [`crate::realtime`].

use std::sync::RwLock;

use bytes::Bytes;
use chrono::{Duration, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use noteify_shared::config::RemoteConfig;
use noteify_shared::types::{AuthUser, Session, SignUpMetadata};
use noteify_shared::{Backend, BackendError, Direction, Filter, Query, Subscription, Table};

use crate::realtime;

pub struct RestBackend {
    http_client: reqwest::Client,
    api_url: String,
    anon_key: String,
    session: RwLock<Option<Session>>,
}

fn transport(e: reqwest::Error) -> BackendError {
    BackendError::Transport(e.to_string())
}

impl RestBackend {
    pub fn new(api_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            session: RwLock::new(None),
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Self {
        Self::new(&config.url, &config.anon_key)
    }

    fn rest_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.api_url, table)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.api_url, path)
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.api_url, bucket, path)
    }

    fn current_session(&self) -> Option<Session> {
        self.session.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn store_session(&self, session: Option<Session>) {
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = session;
    }

    /// User token when signed in, otherwise the anonymous key.
    fn bearer(&self) -> String {
        self.current_session()
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.anon_key.clone())
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.bearer()))
    }

    async fn rows(&self, builder: RequestBuilder) -> Result<Vec<Value>, BackendError> {
        let response = builder.send().await.map_err(transport)?;
        let response = check_response(response).await?;
        response.json().await.map_err(transport)
    }

    async fn token_request(&self, url: &str, body: Value) -> Result<Session, BackendError> {
        let response = self
            .request(Method::POST, url)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let response = check_response(response).await?;
        let token: TokenResponse = response.json().await.map_err(transport)?;
        let session = token.into_session();
        self.store_session(Some(session.clone()));
        Ok(session)
    }
}

impl std::fmt::Debug for RestBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestBackend")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
            user: self.user,
        }
    }
}

/// Map a non-success response onto [`BackendError`].
async fn check_response(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!("request failed: {} - {}", status, body);
    Err(match status {
        StatusCode::UNAUTHORIZED => BackendError::NotAuthenticated,
        StatusCode::CONFLICT => BackendError::Conflict(body),
        _ => BackendError::Api {
            status: status.as_u16(),
            message: body,
        },
    })
}

// ---------------------------------------------------------------------------
// Query encoding
// ---------------------------------------------------------------------------

fn scalar(value: &Value) -> Result<String, BackendError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(_) | Value::Number(_) => Ok(value.to_string()),
        other => Err(BackendError::InvalidQuery(format!(
            "cannot filter on value {other}"
        ))),
    }
}

/// Element of an `in.(..)` or `cs.{..}` list. Strings are double-quoted so
/// commas and parentheses survive.
fn list_item(value: &Value) -> Result<String, BackendError> {
    match value {
        Value::String(s) => Ok(format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))),
        other => scalar(other),
    }
}

fn join_list(values: &[Value]) -> Result<String, BackendError> {
    Ok(values
        .iter()
        .map(list_item)
        .collect::<Result<Vec<_>, _>>()?
        .join(","))
}

/// `(column, operator.value)` query pair for one filter.
pub(crate) fn filter_param(filter: &Filter) -> Result<(String, String), BackendError> {
    let value = match filter {
        Filter::Eq(_, Value::Null) => "is.null".to_string(),
        Filter::Eq(_, value) => format!("eq.{}", scalar(value)?),
        Filter::In(_, values) => format!("in.({})", join_list(values)?),
        Filter::Contains(_, values) => format!("cs.{{{}}}", join_list(values)?),
        Filter::ILike(_, pattern) => format!("ilike.{pattern}"),
    };
    Ok((filter.column().to_string(), value))
}

fn filter_params(filters: &[Filter]) -> Result<Vec<(String, String)>, BackendError> {
    filters.iter().map(filter_param).collect()
}

pub(crate) fn query_params(query: &Query) -> Result<Vec<(String, String)>, BackendError> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    params.extend(filter_params(&query.filters)?);
    if let Some(order) = &query.order {
        let direction = match order.direction {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        };
        params.push(("order".into(), format!("{}.{direction}", order.column)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".into(), limit.to_string()));
    }
    Ok(params)
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

impl Backend for RestBackend {
    async fn select(&self, table: Table, query: Query) -> Result<Vec<Value>, BackendError> {
        let params = query_params(&query)?;
        debug!(%table, ?params, "select");
        self.rows(self.request(Method::GET, &self.rest_url(table)).query(&params))
            .await
    }

    async fn insert(&self, table: Table, row: Value) -> Result<Value, BackendError> {
        debug!(%table, "insert");
        let rows = self
            .rows(
                self.request(Method::POST, &self.rest_url(table))
                    .header("Prefer", "return=representation")
                    .json(&row),
            )
            .await?;
        rows.into_iter().next().ok_or_else(|| BackendError::Api {
            status: 200,
            message: format!("insert into {table} returned no row"),
        })
    }

    async fn update(
        &self,
        table: Table,
        filters: Vec<Filter>,
        patch: Value,
    ) -> Result<Vec<Value>, BackendError> {
        let params = filter_params(&filters)?;
        debug!(%table, ?params, "update");
        self.rows(
            self.request(Method::PATCH, &self.rest_url(table))
                .query(&params)
                .header("Prefer", "return=representation")
                .json(&patch),
        )
        .await
    }

    async fn delete(&self, table: Table, filters: Vec<Filter>) -> Result<u64, BackendError> {
        let params = filter_params(&filters)?;
        debug!(%table, ?params, "delete");
        let rows = self
            .rows(
                self.request(Method::DELETE, &self.rest_url(table))
                    .query(&params)
                    .header("Prefer", "return=representation"),
            )
            .await?;
        Ok(rows.len() as u64)
    }

    async fn subscribe(
        &self,
        table: Table,
        filter: Option<Filter>,
    ) -> Result<Subscription, BackendError> {
        let token = self.current_session().map(|s| s.access_token);
        realtime::subscribe(&self.api_url, &self.anon_key, token, table, filter).await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> Result<Session, BackendError> {
        let body = json!({
            "email": email,
            "password": password,
            "data": {
                "username": metadata.username,
                "display_name": metadata.display_name,
            },
        });
        let session = self
            .token_request(&self.auth_url("signup"), body)
            .await
            .map_err(|e| match e {
                BackendError::Api { status: 400 | 422, message }
                    if message.contains("already registered") || message.contains("user_already_exists") =>
                {
                    BackendError::Conflict(message)
                }
                other => other,
            })?;
        info!(user_id = %session.user.id, "signed up");
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let body = json!({ "email": email, "password": password });
        let session = self
            .token_request(&self.auth_url("token?grant_type=password"), body)
            .await
            .map_err(|e| match e {
                BackendError::Api { status: 400, .. } => BackendError::InvalidCredentials,
                other => other,
            })?;
        info!(user_id = %session.user.id, "signed in");
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if self.current_session().is_none() {
            return Ok(());
        }
        let result = self
            .request(Method::POST, &self.auth_url("logout"))
            .send()
            .await
            .map_err(transport);
        // the local session goes away even if the server call fails
        self.store_session(None);
        match check_response(result?).await {
            Ok(_) | Err(BackendError::NotAuthenticated) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn get_user(&self) -> Result<Option<AuthUser>, BackendError> {
        if self.current_session().is_none() {
            return Ok(None);
        }
        let response = self
            .request(Method::GET, &self.auth_url("user"))
            .send()
            .await
            .map_err(transport)?;
        match check_response(response).await {
            Ok(response) => Ok(Some(response.json().await.map_err(transport)?)),
            Err(BackendError::NotAuthenticated) => {
                warn!("session rejected by auth service, clearing");
                self.store_session(None);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        Ok(self
            .current_session()
            .filter(|s| s.expires_at.map_or(true, |at| at > Utc::now())))
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, BackendError> {
        debug!(bucket, path, size = data.len(), "uploading object");
        let response = self
            .request(Method::POST, &self.object_url(bucket, path))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(data)
            .send()
            .await
            .map_err(transport)?;
        check_response(response).await.map_err(|e| match e {
            BackendError::Api { status, message } => {
                BackendError::Storage(format!("{status}: {message}"))
            }
            other => other,
        })?;
        Ok(path.to_string())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.api_url, bucket, path
        )
    }
}
