//! Group model.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A class group (row of the `groups` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Generated identity
    pub id: i64,

    /// Display name, e.g. `class5`
    pub group_name: String,

    /// First day of the group's schedule
    pub starting_date: NaiveDate,

    /// Archived groups are hidden from active listings
    pub archived: bool,
}

/// Input for creating a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGroup {
    pub group_name: String,
    pub starting_date: NaiveDate,
    #[serde(default)]
    pub archived: bool,
}

impl NewGroup {
    pub fn new(group_name: impl Into<String>, starting_date: NaiveDate) -> Self {
        Self {
            group_name: group_name.into(),
            starting_date,
            archived: false,
        }
    }
}

/// Partial update of a group. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupUpdate {
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub starting_date: Option<NaiveDate>,
    #[serde(default)]
    pub archived: Option<bool>,
}

impl GroupUpdate {
    /// Archive (or unarchive) a group.
    pub fn archived(archived: bool) -> Self {
        Self {
            archived: Some(archived),
            ..Default::default()
        }
    }
}
