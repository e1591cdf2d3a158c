//! Column layout of every table exposed through the data service.
//!
//! The generic row helpers in [`crate::rows`] use this to validate column
//! names coming from queries and to convert between JSON and SQLite values.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::Value;

use noteify_shared::Table;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// UUID stored as text.
    Id,
    Text,
    /// Stored as 0/1.
    Bool,
    /// Arbitrary JSON stored as text (arrays such as `participant_ids`).
    Json,
    /// RFC 3339 with fixed microsecond precision so text order is time order.
    Timestamp,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    /// Filled in by the store when an insert omits it.
    pub generated: bool,
}

const fn col(name: &'static str, kind: ColumnKind) -> Column {
    Column {
        name,
        kind,
        generated: false,
    }
}

const fn generated(name: &'static str, kind: ColumnKind) -> Column {
    Column {
        name,
        kind,
        generated: true,
    }
}

use ColumnKind::*;

const PROFILES: &[Column] = &[
    col("id", Id),
    col("username", Text),
    col("display_name", Text),
    col("avatar_url", Text),
    col("bio", Text),
    col("badges", Json),
    col("role", Text),
    col("theme", Text),
    generated("created_at", Timestamp),
];

const CONVERSATIONS: &[Column] = &[
    generated("id", Id),
    col("participant_ids", Json),
    generated("created_at", Timestamp),
    col("last_message", Text),
    col("last_message_at", Timestamp),
];

const MESSAGES: &[Column] = &[
    generated("id", Id),
    col("conversation_id", Id),
    col("sender_id", Id),
    col("content", Text),
    generated("created_at", Timestamp),
];

const NOTES: &[Column] = &[
    generated("id", Id),
    col("user_id", Id),
    col("title", Text),
    col("content", Text),
    col("is_public", Bool),
    generated("created_at", Timestamp),
    generated("updated_at", Timestamp),
];

const COMMENTS: &[Column] = &[
    generated("id", Id),
    col("note_id", Id),
    col("user_id", Id),
    col("content", Text),
    generated("created_at", Timestamp),
];

const MARKS: &[Column] = &[
    generated("id", Id),
    col("note_id", Id),
    col("user_id", Id),
    generated("created_at", Timestamp),
];

pub fn columns(table: Table) -> &'static [Column] {
    match table {
        Table::Profiles => PROFILES,
        Table::Conversations => CONVERSATIONS,
        Table::Messages => MESSAGES,
        Table::Notes => NOTES,
        Table::Comments => COMMENTS,
        Table::Likes | Table::SavedNotes => MARKS,
    }
}

pub fn column(table: Table, name: &str) -> Result<Column> {
    columns(table)
        .iter()
        .copied()
        .find(|c| c.name == name)
        .ok_or_else(|| StoreError::UnknownColumn {
            table: table.as_str(),
            column: name.to_string(),
        })
}

/// Canonical text form of a timestamp.
pub fn timestamp_text(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now_text() -> String {
    timestamp_text(Utc::now())
}

fn invalid(column: &Column, reason: impl Into<String>) -> StoreError {
    StoreError::InvalidValue {
        column: column.name.to_string(),
        reason: reason.into(),
    }
}

/// Convert a JSON value into the SQLite value stored in `column`.
pub fn to_sql(column: &Column, value: &Value) -> Result<SqlValue> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }
    match column.kind {
        Id => match value {
            Value::String(s) => uuid::Uuid::parse_str(s)
                .map(|id| SqlValue::Text(id.to_string()))
                .map_err(|e| invalid(column, e.to_string())),
            _ => Err(invalid(column, "expected a UUID string")),
        },
        Text => match value {
            Value::String(s) => Ok(SqlValue::Text(s.clone())),
            _ => Err(invalid(column, "expected a string")),
        },
        Bool => value
            .as_bool()
            .map(|b| SqlValue::Integer(b as i64))
            .ok_or_else(|| invalid(column, "expected a boolean")),
        Json => Ok(SqlValue::Text(serde_json::to_string(value)?)),
        Timestamp => match value {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| SqlValue::Text(timestamp_text(dt.with_timezone(&Utc))))
                .map_err(|e| invalid(column, e.to_string())),
            _ => Err(invalid(column, "expected an RFC 3339 string")),
        },
    }
}

/// Convert a scalar used inside a JSON array column (`json_each.value`).
pub fn element_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real))
            .unwrap_or(SqlValue::Null),
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Convert a stored SQLite value back into JSON.
pub fn from_sql(column: &Column, value: ValueRef<'_>) -> Result<Value> {
    let value = match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => match column.kind {
            Bool => Value::Bool(i != 0),
            _ => Value::from(i),
        },
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(bytes) => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| invalid(column, format!("stored text is not UTF-8: {e}")))?;
            match column.kind {
                Json => serde_json::from_str(text)?,
                _ => Value::String(text.to_string()),
            }
        }
        ValueRef::Blob(_) => return Err(invalid(column, "unexpected blob")),
    };
    Ok(value)
}
