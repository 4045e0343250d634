//! Configuration module for rollcall.
//!
//! Loads configuration from environment variables.

use std::env;

use anyhow::{Context, Result};

use crate::database::DEFAULT_MAX_CONNECTIONS;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    // PostgreSQL
    pub database_url: String,
    pub max_connections: u32,

    /// Trace every SQL statement and its arguments (`DB_DEBUG=1`).
    pub db_debug: bool,

    /// Apply pending migrations at startup (`RUN_MIGRATIONS=0` skips).
    pub run_migrations: bool,
}

impl Config {
    /// Load configuration from the process environment (and `.env`).
    ///
    /// # Errors
    /// Returns error if `DATABASE_URL` is missing or a numeric variable does
    /// not parse.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .filter(|s| !s.trim().is_empty())
            .context("DATABASE_URL must be set")?;

        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("DB_MAX_CONNECTIONS is not a number: {}", raw))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let db_debug = lookup("DB_DEBUG").is_some_and(|v| v.trim() == "1");
        let run_migrations = lookup("RUN_MIGRATIONS").is_none_or(|v| v.trim() != "0");

        Ok(Self {
            database_url,
            max_connections,
            db_debug,
            run_migrations,
        })
    }
}
