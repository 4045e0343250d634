//! PostgreSQL backend.
//!
//! Uses a sqlx `PgPool` with explicit connection limits. Transactions go
//! through `pool.begin()`, so a [`Gateway`] dropped mid-transaction (a
//! cancelled request) rolls back when the connection returns to the pool
//! instead of handing an open transaction to the next request.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgConnection, PgPool, Postgres, Row as _, Transaction, TypeInfo};
use tracing::info;

use async_trait::async_trait;

use super::error::QueryError;
use super::gateway::{Connection, Gateway, QueryOutcome, Row, SqlValue};

/// Schema migrations, applied at startup unless disabled.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Default maximum connections for the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Pooled PostgreSQL database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
    trace_sql: bool,
}

impl Database {
    /// Connect with the given URL and pool size.
    ///
    /// # Errors
    /// Returns error if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, QueryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL (max {} connections)", max_connections);

        Ok(Self {
            pool,
            trace_sql: false,
        })
    }

    /// Trace every statement on gateways handed out by this database.
    #[must_use]
    pub fn trace_sql(mut self, enabled: bool) -> Self {
        self.trace_sql = enabled;
        self
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        MIGRATOR.run(&self.pool).await?;
        info!("Migrations applied");
        Ok(())
    }

    /// Check out a connection for one request.
    pub async fn gateway(&self) -> Result<Gateway, QueryError> {
        let conn = self.pool.acquire().await?;
        let session = PgSession {
            pool: self.pool.clone(),
            conn: Some(conn),
            tx: None,
        };
        Ok(Gateway::new(session).trace_sql(self.trace_sql))
    }
}

/// Request-scoped session: an idle pooled connection outside transactions,
/// a sqlx [`Transaction`] inside one. Dropping an open transaction queues its
/// rollback.
pub struct PgSession {
    pool: PgPool,
    conn: Option<PoolConnection<Postgres>>,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSession {
    async fn connection(&mut self) -> Result<&mut PoolConnection<Postgres>, QueryError> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.pool.acquire().await?,
        };
        Ok(self.conn.insert(conn))
    }
}

async fn run(conn: &mut PgConnection, sql: &str, params: &[SqlValue]) -> Result<QueryOutcome, QueryError> {
    let query = bind(sqlx::query(sql), params);

    if returns_rows(sql) {
        let rows = query.fetch_all(&mut *conn).await?;
        let rows = rows.iter().map(to_row).collect::<Result<Vec<_>, _>>()?;
        Ok(QueryOutcome {
            rows_affected: rows.len() as u64,
            rows,
        })
    } else {
        let done = query.execute(&mut *conn).await?;
        Ok(QueryOutcome {
            rows: Vec::new(),
            rows_affected: done.rows_affected(),
        })
    }
}

fn bind<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Date(v) => query.bind(*v),
        };
    }
    query
}

fn returns_rows(sql: &str) -> bool {
    let sql = sql.trim_start();
    sql.starts_with("SELECT") || sql.contains(" RETURNING ")
}

/// Convert a row to column-name keyed JSON by the column's Postgres type.
fn to_row(row: &PgRow) -> Result<Row, QueryError> {
    let mut columns = Map::new();
    for column in row.columns() {
        let i = column.ordinal();
        let value = match column.type_info().name() {
            "INT2" => row.try_get::<Option<i16>, _>(i)?.map(Value::from),
            "INT4" => row.try_get::<Option<i32>, _>(i)?.map(Value::from),
            "INT8" => row.try_get::<Option<i64>, _>(i)?.map(Value::from),
            "BOOL" => row.try_get::<Option<bool>, _>(i)?.map(Value::from),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
                row.try_get::<Option<String>, _>(i)?.map(Value::from)
            }
            "DATE" => row
                .try_get::<Option<NaiveDate>, _>(i)?
                .map(|d| Value::from(d.to_string())),
            "TIMESTAMPTZ" => row
                .try_get::<Option<DateTime<Utc>>, _>(i)?
                .map(|t| Value::from(t.to_rfc3339())),
            "TIMESTAMP" => row
                .try_get::<Option<NaiveDateTime>, _>(i)?
                .map(|t| Value::from(t.and_utc().to_rfc3339())),
            other => {
                return Err(QueryError::Backend(format!(
                    "unsupported column type {} for {}",
                    other,
                    column.name()
                )));
            }
        };
        columns.insert(column.name().to_string(), value.unwrap_or(Value::Null));
    }
    Ok(Row::new(columns))
}

#[async_trait]
impl Connection for PgSession {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<QueryOutcome, QueryError> {
        if let Some(tx) = self.tx.as_mut() {
            return run(&mut **tx, sql, params).await;
        }
        let conn = self.connection().await?;
        run(&mut **conn, sql, params).await
    }

    async fn begin(&mut self) -> Result<(), QueryError> {
        // Release the idle connection first so a pool of one can serve the
        // transaction.
        self.conn = None;
        self.tx = Some(self.pool.begin().await?);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), QueryError> {
        match self.tx.take() {
            Some(tx) => tx.commit().await.map_err(QueryError::from),
            None => Err(QueryError::Backend("commit without an open transaction".into())),
        }
    }

    /// A no-op when the transaction already ended (e.g. a failed commit).
    async fn rollback(&mut self) -> Result<(), QueryError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}
