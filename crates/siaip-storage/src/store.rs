//! Table-agnostic storage interface used by the correlation pipeline.
//!
//! The pipeline only needs three operations: `select`, `insert` and a
//! conditional `update`. Conditional updates are single `UPDATE ... WHERE`
//! statements, so the read-check-write happens atomically inside the
//! database and concurrent events never lose an update.
//!
//! Table and column names are `&'static str` supplied by this crate, never by
//! input data; only values are bound as parameters.

use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteArguments, SqlitePool, SqliteRow};
use sqlx::query::Query;
use sqlx::{Row as _, Sqlite, TypeInfo, ValueRef};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;

/// A single bound value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// One predicate of a `WHERE` clause. Predicates are joined with `AND`.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column = ?`, or `column IS NULL` when the value is [`Value::Null`].
    Eq(&'static str, Value),
    /// `LENGTH(column) = ?`
    LengthEq(&'static str, i64),
}

impl Condition {
    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Condition::Eq(column, value.into())
    }

    pub fn is_null(column: &'static str) -> Self {
        Condition::Eq(column, Value::Null)
    }

    fn render(&self) -> String {
        match self {
            Condition::Eq(column, Value::Null) => format!("{} IS NULL", quote(column)),
            Condition::Eq(column, _) => format!("{} = ?", quote(column)),
            Condition::LengthEq(column, _) => format!("LENGTH({}) = ?", quote(column)),
        }
    }

    fn into_bound(self) -> Option<Value> {
        match self {
            Condition::Eq(_, Value::Null) => None,
            Condition::Eq(_, value) => Some(value),
            Condition::LengthEq(_, length) => Some(Value::Integer(length)),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Ordered column/value pairs for `INSERT` and `UPDATE ... SET`.
pub type Fields = Vec<(&'static str, Value)>;

/// One selected row, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Storage collaborator consumed by the correlation pipeline.
///
/// Methods return `Send` futures so pipelines can run on spawned tasks.
pub trait EventStore: Send + Sync {
    /// `SELECT columns FROM table WHERE conditions`
    fn select(
        &self,
        table: &'static str,
        columns: &'static [&'static str],
        conditions: Vec<Condition>,
    ) -> impl Future<Output = StorageResult<Vec<Row>>> + Send;

    /// `INSERT INTO table (...) VALUES (...)`, returning the generated id
    fn insert(
        &self,
        table: &'static str,
        fields: Fields,
    ) -> impl Future<Output = StorageResult<i64>> + Send;

    /// `UPDATE table SET ... WHERE conditions`, returning the affected row count
    fn update(
        &self,
        table: &'static str,
        set: Fields,
        conditions: Vec<Condition>,
    ) -> impl Future<Output = StorageResult<u64>> + Send;
}

/// SQLite implementation of [`EventStore`]
#[derive(Debug, Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    /// Create a new store over an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl EventStore for SqliteEventStore {
    async fn select(
        &self,
        table: &'static str,
        columns: &'static [&'static str],
        conditions: Vec<Condition>,
    ) -> StorageResult<Vec<Row>> {
        if columns.is_empty() {
            return Err(invalid(table, "no columns selected"));
        }

        let sql = format!(
            "SELECT {} FROM {}{}",
            columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "),
            quote(table),
            where_clause(&conditions)
        );

        let query = bind_all(sqlx::query(&sql), conditions.into_iter().filter_map(Condition::into_bound));
        let rows = query.fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(index, column)| Ok((column.to_string(), decode_value(row, index)?)))
                    .collect::<StorageResult<Row>>()
            })
            .collect()
    }

    async fn insert(&self, table: &'static str, fields: Fields) -> StorageResult<i64> {
        if fields.is_empty() {
            return Err(invalid(table, "no fields to insert"));
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(table),
            fields.iter().map(|(c, _)| quote(c)).collect::<Vec<_>>().join(", "),
            vec!["?"; fields.len()].join(", ")
        );

        let query = bind_all(sqlx::query(&sql), fields.into_iter().map(|(_, value)| value));
        let result = query.execute(&self.pool).await?;
        Ok(result.last_insert_rowid())
    }

    async fn update(
        &self,
        table: &'static str,
        set: Fields,
        conditions: Vec<Condition>,
    ) -> StorageResult<u64> {
        if set.is_empty() {
            return Err(invalid(table, "no fields to update"));
        }

        let sql = format!(
            "UPDATE {} SET {}{}",
            quote(table),
            set.iter()
                .map(|(c, _)| format!("{} = ?", quote(c)))
                .collect::<Vec<_>>()
                .join(", "),
            where_clause(&conditions)
        );

        let values = set
            .into_iter()
            .map(|(_, value)| value)
            .chain(conditions.into_iter().filter_map(Condition::into_bound));
        let result = bind_all(sqlx::query(&sql), values).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn where_clause(conditions: &[Condition]) -> String {
    if conditions.is_empty() {
        return String::new();
    }
    let predicates: Vec<String> = conditions.iter().map(Condition::render).collect();
    format!(" WHERE {}", predicates.join(" AND "))
}

fn invalid(table: &str, reason: &str) -> StorageError {
    StorageError::InvalidStatement {
        table: table.to_string(),
        reason: reason.to_string(),
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: impl IntoIterator<Item = Value>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            Value::Null => query.bind(None::<i64>),
            Value::Integer(v) => query.bind(v),
            Value::Real(v) => query.bind(v),
            Value::Text(v) => query.bind(v),
            Value::Timestamp(v) => query.bind(v),
        };
    }
    query
}

fn decode_value(row: &SqliteRow, index: usize) -> StorageResult<Value> {
    let kind = {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        raw.type_info().name().to_ascii_uppercase()
    };

    let value = if kind.contains("INT") {
        Value::Integer(row.try_get_unchecked::<i64, _>(index)?)
    } else if kind.contains("REAL") || kind.contains("FLOA") || kind.contains("DOUB") {
        Value::Real(row.try_get_unchecked::<f64, _>(index)?)
    } else {
        Value::Text(row.try_get_unchecked::<String, _>(index)?)
    };
    Ok(value)
}
