//! Curriculum module templates.

use serde::{Deserialize, Serialize};

/// A teachable unit and its default duration in weeks.
///
/// Templates are read-only for the data layer; running modules are
/// instantiated from them when a group is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurriculumModule {
    pub id: i64,
    pub module_name: String,
    pub default_duration: i32,
    /// Position of the template in the curriculum
    #[serde(default)]
    pub seq_number: i32,
}
