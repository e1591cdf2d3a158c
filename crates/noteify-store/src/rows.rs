//! Generic row access for the service tables.
//!
//! Rows come in and go out as JSON objects keyed by column name; every
//! column referenced by a filter, ordering or write is checked against
//! [`crate::schema`] before it reaches SQL.

use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value};

use noteify_shared::{Direction, Filter, Query, Table};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::schema::{self, Column, ColumnKind};

/// Before/after images of one updated row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowChange {
    pub old: Value,
    pub new: Value,
}

impl Database {
    /// Read rows matching `query`.
    pub fn select_rows(&self, table: Table, query: &Query) -> Result<Vec<Value>> {
        let (where_sql, params) = where_clause(table, &query.filters)?;

        let mut sql = format!(
            "SELECT {} FROM {} t{}",
            column_list(table),
            table.as_str(),
            where_sql
        );

        match &query.order {
            Some(order) => {
                let column = schema::column(table, &order.column)?;
                let dir = match order.direction {
                    Direction::Asc => "ASC",
                    Direction::Desc => "DESC",
                };
                sql.push_str(&format!(" ORDER BY t.{} {dir}, t.rowid {dir}", column.name));
            }
            None => sql.push_str(" ORDER BY t.rowid ASC"),
        }

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        self.query_rows(table, &sql, params)
    }

    /// Insert one row; missing generated columns (`id`, timestamps) are
    /// filled in. Returns the stored row.
    pub fn insert_row(&self, table: Table, row: &Value) -> Result<Value> {
        let object = as_object(row)?;
        let mut names = Vec::new();
        let mut params = Vec::new();

        for (name, value) in object {
            let column = schema::column(table, name)?;
            names.push(column.name);
            params.push(schema::to_sql(&column, value)?);
        }

        for column in schema::columns(table).iter().filter(|c| c.generated) {
            if !object.contains_key(column.name) {
                names.push(column.name);
                params.push(generate(column));
            }
        }

        let id = names
            .iter()
            .position(|n| *n == "id")
            .and_then(|i| match &params[i] {
                SqlValue::Text(id) => Some(id.clone()),
                _ => None,
            })
            .ok_or_else(|| StoreError::InvalidValue {
                column: "id".into(),
                reason: "an id is required".into(),
            })?;

        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            table.as_str(),
            names.join(", ")
        );
        self.conn()
            .execute(&sql, params_from_iter(params))
            .map_err(StoreError::from_write)?;

        self.row_by_id(table, &id)
    }

    /// Apply `patch` to every row matching `filters`.
    pub fn update_rows(
        &mut self,
        table: Table,
        filters: &[Filter],
        patch: &Value,
    ) -> Result<Vec<RowChange>> {
        let object = as_object(patch)?;
        let mut assignments = Vec::new();
        let mut values = Vec::new();
        for (name, value) in object {
            let column = schema::column(table, name)?;
            if column.name == "id" {
                return Err(StoreError::InvalidValue {
                    column: "id".into(),
                    reason: "ids are immutable".into(),
                });
            }
            assignments.push(format!("{} = ?", column.name));
            values.push(schema::to_sql(&column, value)?);
        }

        let query = Query {
            filters: filters.to_vec(),
            ..Query::default()
        };
        let before = self.select_rows(table, &query)?;
        if before.is_empty() || assignments.is_empty() {
            return Ok(Vec::new());
        }

        let tx = self.conn_mut().transaction()?;
        {
            let sql = format!(
                "UPDATE {} SET {} WHERE id = ?",
                table.as_str(),
                assignments.join(", ")
            );
            let mut stmt = tx.prepare(&sql)?;
            for row in &before {
                let mut params = values.clone();
                params.push(SqlValue::Text(row_id(row)?));
                stmt.execute(params_from_iter(params))
                    .map_err(StoreError::from_write)?;
            }
        }
        tx.commit()?;

        before
            .into_iter()
            .map(|old| {
                let new = self.row_by_id(table, &row_id(&old)?)?;
                Ok(RowChange { old, new })
            })
            .collect()
    }

    /// Delete every row matching `filters`; returns the deleted rows.
    pub fn delete_rows(&mut self, table: Table, filters: &[Filter]) -> Result<Vec<Value>> {
        let query = Query {
            filters: filters.to_vec(),
            ..Query::default()
        };
        let doomed = self.select_rows(table, &query)?;
        if doomed.is_empty() {
            return Ok(doomed);
        }

        let tx = self.conn_mut().transaction()?;
        {
            let sql = format!("DELETE FROM {} WHERE id = ?1", table.as_str());
            let mut stmt = tx.prepare(&sql)?;
            for row in &doomed {
                stmt.execute([row_id(row)?]).map_err(StoreError::from_write)?;
            }
        }
        tx.commit()?;

        Ok(doomed)
    }

    pub fn row_by_id(&self, table: Table, id: &str) -> Result<Value> {
        let sql = format!(
            "SELECT {} FROM {} t WHERE t.id = ?",
            column_list(table),
            table.as_str()
        );
        self.query_rows(table, &sql, vec![SqlValue::Text(id.to_string())])?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound)
    }

    fn query_rows(&self, table: Table, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Value>> {
        let columns = schema::columns(table);
        let mut stmt = self.conn().prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(params))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut object = Map::with_capacity(columns.len());
            for (i, column) in columns.iter().enumerate() {
                object.insert(
                    column.name.to_string(),
                    schema::from_sql(column, row.get_ref(i)?)?,
                );
            }
            out.push(Value::Object(object));
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn column_list(table: Table) -> String {
    schema::columns(table)
        .iter()
        .map(|c| format!("t.{}", c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn where_clause(table: Table, filters: &[Filter]) -> Result<(String, Vec<SqlValue>)> {
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    for filter in filters {
        let column = schema::column(table, filter.column())?;
        match filter {
            Filter::Eq(_, Value::Null) => clauses.push(format!("t.{} IS NULL", column.name)),
            Filter::Eq(_, value) => {
                clauses.push(format!("t.{} = ?", column.name));
                params.push(schema::to_sql(&column, value)?);
            }
            Filter::In(_, values) if values.is_empty() => clauses.push("0".to_string()),
            Filter::In(_, values) => {
                let marks = vec!["?"; values.len()].join(", ");
                clauses.push(format!("t.{} IN ({marks})", column.name));
                for value in values {
                    params.push(schema::to_sql(&column, value)?);
                }
            }
            Filter::Contains(_, values) => {
                if column.kind != ColumnKind::Json {
                    return Err(StoreError::InvalidValue {
                        column: column.name.to_string(),
                        reason: "contains needs an array column".into(),
                    });
                }
                for value in values {
                    clauses.push(format!(
                        "EXISTS (SELECT 1 FROM json_each(t.{}) WHERE json_each.value = ?)",
                        column.name
                    ));
                    params.push(schema::element_to_sql(value));
                }
            }
            Filter::ILike(_, pattern) => {
                clauses.push(format!("t.{} LIKE ? ESCAPE '\\'", column.name));
                params.push(SqlValue::Text(pattern.clone()));
            }
        }
    }

    if clauses.is_empty() {
        Ok((String::new(), params))
    } else {
        Ok((format!(" WHERE {}", clauses.join(" AND ")), params))
    }
}

fn generate(column: &Column) -> SqlValue {
    match column.kind {
        ColumnKind::Id => SqlValue::Text(uuid::Uuid::new_v4().to_string()),
        ColumnKind::Timestamp => SqlValue::Text(schema::now_text()),
        _ => SqlValue::Null,
    }
}

fn as_object(value: &Value) -> Result<&Map<String, Value>> {
    value.as_object().ok_or_else(|| StoreError::InvalidValue {
        column: "*".into(),
        reason: "row must be a JSON object".into(),
    })
}

fn row_id(row: &Value) -> Result<String> {
    row.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(StoreError::NotFound)
}
