//! The remote data service contract.
//!
//! Every component receives its backend as an explicit `Arc<B: Backend>`
//! dependency instead of reaching for a process-wide client, which is what
//! lets the tests run the same code against an in-process store.

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::BackendError;
use crate::query::{Filter, Query};
use crate::realtime::Subscription;
use crate::types::{AuthUser, Session, SignUpMetadata};

/// Tables exposed by the data service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Profiles,
    Conversations,
    Messages,
    Notes,
    Comments,
    Likes,
    SavedNotes,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::Profiles,
        Table::Conversations,
        Table::Messages,
        Table::Notes,
        Table::Comments,
        Table::Likes,
        Table::SavedNotes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Profiles => "profiles",
            Table::Conversations => "conversations",
            Table::Messages => "messages",
            Table::Notes => "notes",
            Table::Comments => "comments",
            Table::Likes => "likes",
            Table::SavedNotes => "saved_notes",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| BackendError::InvalidQuery(format!("unknown table '{s}'")))
    }
}

/// Query, mutation, auth, storage and realtime operations of the hosted
/// backend. Rows travel as JSON objects keyed by column name.
pub trait Backend: Send + Sync + 'static {
    fn select(
        &self,
        table: Table,
        query: Query,
    ) -> impl Future<Output = Result<Vec<Value>, BackendError>> + Send;

    /// Insert one row and return it with server-side defaults filled in.
    fn insert(
        &self,
        table: Table,
        row: Value,
    ) -> impl Future<Output = Result<Value, BackendError>> + Send;

    /// Apply `patch` to every row matching `filters`; returns the new rows.
    fn update(
        &self,
        table: Table,
        filters: Vec<Filter>,
        patch: Value,
    ) -> impl Future<Output = Result<Vec<Value>, BackendError>> + Send;

    /// Delete every row matching `filters`; returns how many went away.
    fn delete(
        &self,
        table: Table,
        filters: Vec<Filter>,
    ) -> impl Future<Output = Result<u64, BackendError>> + Send;

    /// Open a change feed for `table`, optionally restricted by `filter`.
    fn subscribe(
        &self,
        table: Table,
        filter: Option<Filter>,
    ) -> impl Future<Output = Result<Subscription, BackendError>> + Send;

    fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> impl Future<Output = Result<Session, BackendError>> + Send;

    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<Session, BackendError>> + Send;

    fn sign_out(&self) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// The signed-in user, `None` when there is no session.
    fn get_user(&self) -> impl Future<Output = Result<Option<AuthUser>, BackendError>> + Send;

    fn get_session(&self) -> impl Future<Output = Result<Option<Session>, BackendError>> + Send;

    /// Store `data` at `bucket/path` (overwriting) and return the path.
    fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> impl Future<Output = Result<String, BackendError>> + Send;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}

pub fn decode_row<T: DeserializeOwned>(row: Value) -> Result<T, BackendError> {
    Ok(serde_json::from_value(row)?)
}

pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, BackendError> {
    rows.into_iter().map(decode_row).collect()
}
