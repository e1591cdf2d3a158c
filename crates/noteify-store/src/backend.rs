//! [`Backend`] implementation over the local SQLite store.
//!
//! All handles created with [`LocalBackend::client`] share one database and
//! one change hub but carry their own auth session, so several simulated
//! users can talk to the same store from one process.

use std::path::Path;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use serde_json::Value;

use noteify_shared::constants::DEFAULT_HTTP_PORT;
use noteify_shared::types::{AuthUser, Session, SignUpMetadata};
use noteify_shared::{
    Backend, BackendError, ChangeEvent, ChangeKind, Filter, Query, Subscription, Table,
};

use crate::database::Database;
use crate::error::{Result as StoreResult, StoreError};
use crate::objects::StoredObject;
use crate::realtime::ChangeHub;

pub struct LocalBackend {
    db: Arc<Mutex<Database>>,
    hub: ChangeHub,
    session: Mutex<Option<Session>>,
    public_base: String,
}

impl LocalBackend {
    /// Open (or create) a store at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Ok(Self::from_database(Database::open_at(path)?))
    }

    /// Open the store in the platform data directory.
    pub fn open_default() -> StoreResult<Self> {
        Ok(Self::from_database(Database::new()?))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    pub fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            hub: ChangeHub::new(),
            session: Mutex::new(None),
            public_base: format!("http://localhost:{DEFAULT_HTTP_PORT}"),
        }
    }

    /// Base URL that [`Backend::public_url`] builds on (the HTTP server
    /// serving this store).
    pub fn with_public_url(mut self, base: impl Into<String>) -> Self {
        self.public_base = base.into().trim_end_matches('/').to_string();
        self
    }

    /// A new handle on the same store with its own (signed-out) session.
    pub fn client(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            hub: self.hub.clone(),
            session: Mutex::new(None),
            public_base: self.public_base.clone(),
        }
    }

    pub fn hub(&self) -> &ChangeHub {
        &self.hub
    }

    pub async fn download(&self, bucket: &str, path: &str) -> Result<StoredObject, BackendError> {
        self.with_db(|db| db.get_object(bucket, path))
    }

    fn with_db<T>(&self, f: impl FnOnce(&mut Database) -> StoreResult<T>) -> Result<T, BackendError> {
        let mut db = self.db.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&mut db)?)
    }

    fn session(&self) -> Result<Option<Session>, BackendError> {
        let guard = self.session.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(guard.clone())
    }

    fn set_session(&self, session: Option<Session>) -> Result<(), BackendError> {
        let mut guard = self.session.lock().map_err(|_| StoreError::LockPoisoned)?;
        *guard = session;
        Ok(())
    }

    fn publish(&self, table: Table, kind: ChangeKind, new: Option<Value>, old: Option<Value>) {
        self.hub.publish(ChangeEvent {
            table,
            kind,
            new,
            old,
        });
    }

    fn start_session(&self, user: &AuthUser) -> Result<Session, BackendError> {
        let session = self.with_db(|db| db.create_session(user))?;
        self.set_session(Some(session.clone()))?;
        Ok(session)
    }
}

impl Backend for LocalBackend {
    async fn select(&self, table: Table, query: Query) -> Result<Vec<Value>, BackendError> {
        let rows = self.with_db(|db| db.select_rows(table, &query))?;
        tracing::debug!(%table, rows = rows.len(), "select");
        Ok(rows)
    }

    async fn insert(&self, table: Table, row: Value) -> Result<Value, BackendError> {
        let row = self.with_db(|db| db.insert_row(table, &row))?;
        tracing::debug!(%table, id = ?row.get("id"), "insert");
        self.publish(table, ChangeKind::Insert, Some(row.clone()), None);
        Ok(row)
    }

    async fn update(
        &self,
        table: Table,
        filters: Vec<Filter>,
        patch: Value,
    ) -> Result<Vec<Value>, BackendError> {
        let changes = self.with_db(|db| db.update_rows(table, &filters, &patch))?;
        tracing::debug!(%table, rows = changes.len(), "update");

        let mut rows = Vec::with_capacity(changes.len());
        for change in changes {
            rows.push(change.new.clone());
            self.publish(table, ChangeKind::Update, Some(change.new), Some(change.old));
        }
        Ok(rows)
    }

    async fn delete(&self, table: Table, filters: Vec<Filter>) -> Result<u64, BackendError> {
        let removed = self.with_db(|db| db.delete_rows(table, &filters))?;
        tracing::debug!(%table, rows = removed.len(), "delete");

        let count = removed.len() as u64;
        for old in removed {
            self.publish(table, ChangeKind::Delete, None, Some(old));
        }
        Ok(count)
    }

    async fn subscribe(
        &self,
        table: Table,
        filter: Option<Filter>,
    ) -> Result<Subscription, BackendError> {
        Ok(self.hub.subscribe(table, filter))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> Result<Session, BackendError> {
        let (user, profile) = self.with_db(|db| db.create_user(email, password, &metadata))?;
        self.publish(Table::Profiles, ChangeKind::Insert, Some(profile), None);
        self.start_session(&user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let user = self.with_db(|db| db.verify_password(email, password))?;
        tracing::info!(user_id = %user.id, "signed in");
        self.start_session(&user)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if let Some(session) = self.session()? {
            self.with_db(|db| db.revoke_session(&session.access_token))?;
            tracing::info!(user_id = %session.user.id, "signed out");
        }
        self.set_session(None)
    }

    async fn get_user(&self) -> Result<Option<AuthUser>, BackendError> {
        Ok(self.get_session().await?.map(|s| s.user))
    }

    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        let Some(session) = self.session()? else {
            return Ok(None);
        };
        match self.with_db(|db| db.session_user(&session.access_token))? {
            Some(_) => Ok(Some(session)),
            None => {
                self.set_session(None)?;
                Ok(None)
            }
        }
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, BackendError> {
        self.with_db(|db| db.put_object(bucket, path, &data, content_type))?;
        Ok(path.to_string())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{bucket}/{path}",
            self.public_base
        )
    }
}
