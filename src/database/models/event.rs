//! Audit event model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest occurrence of a named event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastEvent {
    pub username: String,
    pub date_created: DateTime<Utc>,
}
