//! Running module model.

use serde::{Deserialize, Serialize};

use super::CurriculumModule;

/// A curriculum module scheduled for a specific group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningModule {
    pub id: i64,
    pub module_id: i64,
    pub group_id: i64,
    /// Duration in weeks
    pub duration: i32,
    /// Zero-based slot in the group's timeline
    pub position: i32,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A running module that has not been inserted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRunningModule {
    pub module_id: i64,
    pub group_id: i64,
    pub duration: i32,
    pub position: i32,
}

impl NewRunningModule {
    /// One running module per template, in template order.
    pub fn from_templates(group_id: i64, templates: &[CurriculumModule]) -> Vec<Self> {
        templates
            .iter()
            .enumerate()
            .map(|(position, module)| Self {
                module_id: module.id,
                group_id,
                duration: module.default_duration,
                position: position as i32,
            })
            .collect()
    }
}
