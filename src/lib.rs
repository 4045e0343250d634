//! rollcall - cached data access for class groups, users and timelines
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `database` - Gateway, PostgreSQL backend, models and repositories
//! - `cache` - Snapshot caches and the invalidation bus that clears them
//! - `state` - Repositories wired to one shared bus
//!
//! Reads are served from whole-table snapshots. Every write signals the
//! topics whose snapshots it affects, after its transaction has finished,
//! so the next read repopulates from committed data.

pub mod cache;
pub mod config;
pub mod database;
pub mod state;

pub use config::Config;
pub use database::{DataError, Database, Gateway};
pub use state::DataLayer;
