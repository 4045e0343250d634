//! Connection/transaction gateway.
//!
//! A [`Gateway`] wraps exactly one logical connection for the duration of a
//! request. Statements run strictly one after another (`&mut self`), and the
//! gateway tracks whether a transaction is open so that illegal sequencing is
//! reported as a [`TransactionError`] regardless of the backend.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use super::error::{QueryError, TransactionError, TxOp};

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Date(NaiveDate),
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

impl From<&SqlValue> for Value {
    fn from(v: &SqlValue) -> Self {
        match v {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(b) => Value::Bool(*b),
            SqlValue::Int(i) => Value::from(*i),
            SqlValue::Text(s) => Value::String(s.clone()),
            SqlValue::Date(d) => Value::String(d.to_string()),
        }
    }
}

/// One result row, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(Map<String, Value>);

impl Row {
    pub fn new(columns: Map<String, Value>) -> Self {
        Self(columns)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Decode the row into an entity.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, QueryError> {
        Ok(serde_json::from_value(Value::Object(self.0))?)
    }
}

impl From<Map<String, Value>> for Row {
    fn from(columns: Map<String, Value>) -> Self {
        Self(columns)
    }
}

/// Result of one executed statement.
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
}

impl QueryOutcome {
    /// Identity generated by an `INSERT ... RETURNING id`.
    pub fn insert_id(&self) -> Option<i64> {
        self.rows.first()?.get("id")?.as_i64()
    }

    pub fn decode<T: DeserializeOwned>(self) -> Result<Vec<T>, QueryError> {
        self.rows.into_iter().map(Row::decode).collect()
    }
}

/// Backend capability: one logical database connection.
#[async_trait]
pub trait Connection: Send {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<QueryOutcome, QueryError>;
    async fn begin(&mut self) -> Result<(), QueryError>;
    async fn commit(&mut self) -> Result<(), QueryError>;
    async fn rollback(&mut self) -> Result<(), QueryError>;
}

/// Request-scoped handle over a single connection.
pub struct Gateway {
    conn: Box<dyn Connection>,
    in_transaction: bool,
    trace_sql: bool,
}

impl Gateway {
    pub fn new(conn: impl Connection + 'static) -> Self {
        Self {
            conn: Box::new(conn),
            in_transaction: false,
            trace_sql: false,
        }
    }

    /// Emit `SQL =>` / `args =>` traces for every statement.
    #[must_use]
    pub fn trace_sql(mut self, enabled: bool) -> Self {
        self.trace_sql = enabled;
        self
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Run one statement. Never retried.
    pub async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<QueryOutcome, QueryError> {
        if self.trace_sql {
            debug!(target: "rollcall::sql", "---------");
            debug!(target: "rollcall::sql", "SQL  => {}", sql.trim());
            debug!(target: "rollcall::sql", "args => {:?}", params);
        }
        self.conn.execute(sql, params).await
    }

    /// Run a query and decode every row.
    pub async fn fetch<T: DeserializeOwned>(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<T>, QueryError> {
        self.execute(sql, params).await?.decode()
    }

    pub async fn begin(&mut self) -> Result<(), TransactionError> {
        if self.in_transaction {
            return Err(TransactionError::AlreadyOpen);
        }
        self.conn.begin().await.map_err(|source| TransactionError::Backend {
            op: TxOp::Begin,
            source,
        })?;
        self.in_transaction = true;
        Ok(())
    }

    /// Commit the open transaction. A rejected commit leaves the transaction
    /// open so the caller can still roll back.
    pub async fn commit(&mut self) -> Result<(), TransactionError> {
        if !self.in_transaction {
            return Err(TransactionError::NotOpen(TxOp::Commit));
        }
        self.conn.commit().await.map_err(|source| TransactionError::Backend {
            op: TxOp::Commit,
            source,
        })?;
        self.in_transaction = false;
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<(), TransactionError> {
        if !self.in_transaction {
            return Err(TransactionError::NotOpen(TxOp::Rollback));
        }
        // The transaction is over either way once a rollback was attempted.
        self.in_transaction = false;
        self.conn.rollback().await.map_err(|source| TransactionError::Backend {
            op: TxOp::Rollback,
            source,
        })
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("in_transaction", &self.in_transaction)
            .field("trace_sql", &self.trace_sql)
            .finish()
    }
}

/// Placeholder list for a multi-row insert: `($1,$2),($3,$4)` for two rows
/// of width two.
pub fn values_list(rows: usize, width: usize) -> String {
    (0..rows)
        .map(|row| {
            let cols: Vec<String> = (1..=width).map(|col| format!("${}", row * width + col)).collect();
            format!("({})", cols.join(","))
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Most bind parameters one PostgreSQL statement accepts.
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Rows of `width` columns that fit in one multi-row insert.
pub fn rows_per_statement(width: usize) -> usize {
    (MAX_BIND_PARAMS / width.max(1)).max(1)
}

/// `SET a = $1, b = $2` clause for a partial update. Returns `None` when
/// there is nothing to set.
pub fn set_clause(columns: &[&str]) -> Option<String> {
    if columns.is_empty() {
        return None;
    }
    let assignments: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{} = ${}", col, i + 1))
        .collect();
    Some(assignments.join(", "))
}
