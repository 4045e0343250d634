//! Database module exports.

mod error;
mod gateway;
#[cfg(test)]
pub(crate) mod memory;
pub mod models;
mod postgres;
pub mod repository;
pub mod sql;

pub use error::{CompositeWriteError, DataError, QueryError, Result, TransactionError, TxOp};
pub use gateway::{
    rows_per_statement, set_clause, values_list, Connection, Gateway, QueryOutcome, Row, SqlValue,
    MAX_BIND_PARAMS,
};
pub use models::*;
pub use postgres::{Database, PgSession, DEFAULT_MAX_CONNECTIONS, MIGRATOR};
pub use repository::{
    CurriculumRepository, GroupRepository, TeacherRepository, TimelineRepository, UserRepository,
};
