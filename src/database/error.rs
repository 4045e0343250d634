//! Error taxonomy for the data layer.
//!
//! - [`QueryError`] - a single statement failed
//! - [`TransactionError`] - begin/commit/rollback was rejected
//! - [`CompositeWriteError`] - a multi-statement write failed and was rolled back
//!
//! Nothing in this crate retries; every error is surfaced to the caller.

use std::fmt;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DataError>;

/// Failure of a single statement.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The statement was rejected by the store (syntax, unknown column, ...).
    #[error("malformed statement: {0}")]
    Malformed(String),

    /// A unique, foreign key, not-null or check constraint was violated.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// The connection to the store was lost or could not be used.
    #[error("connection failure: {0}")]
    Connection(String),

    /// Any other backend failure.
    #[error("database error: {0}")]
    Backend(String),

    /// A result row did not match the expected shape.
    #[error("failed to decode row: {0}")]
    Decode(#[from] serde_json::Error),

    /// An insert did not report the generated identity.
    #[error("insert into {0} returned no id")]
    MissingInsertId(&'static str),
}

/// Transaction state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOp {
    Begin,
    Commit,
    Rollback,
}

impl fmt::Display for TxOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TxOp::Begin => "begin",
            TxOp::Commit => "commit",
            TxOp::Rollback => "rollback",
        })
    }
}

/// Illegal or rejected transaction state transition.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("cannot begin: a transaction is already open")]
    AlreadyOpen,

    #[error("cannot {0}: no transaction is open")]
    NotOpen(TxOp),

    #[error("{op} rejected by the connection: {source}")]
    Backend {
        op: TxOp,
        #[source]
        source: QueryError,
    },
}

/// A composite write failed; the transaction was rolled back before this
/// error was returned.
#[derive(Debug, Error)]
#[error("{operation} rolled back: {source}")]
pub struct CompositeWriteError {
    /// Name of the composite operation (e.g. `create group`).
    pub operation: &'static str,

    /// The failure that aborted the write.
    #[source]
    pub source: Box<DataError>,

    /// Set when the rollback itself also failed.
    pub rollback: Option<TransactionError>,
}

/// Umbrella error returned by repositories.
#[derive(Debug, Error)]
pub enum DataError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    CompositeWrite(#[from] CompositeWriteError),
}

impl From<sqlx::Error> for QueryError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        match err {
            sqlx::Error::Database(db) => match db.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => QueryError::Constraint(db.message().to_string()),
                _ => QueryError::Malformed(db.message().to_string()),
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => QueryError::Connection(err.to_string()),
            other => QueryError::Backend(other.to_string()),
        }
    }
}
