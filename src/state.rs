//! Shared data-layer state.
//!
//! Built once at startup and cloned into every task. Holds one invalidation
//! bus and the repositories subscribed to it.

use std::sync::Arc;

use crate::cache::InvalidationBus;
use crate::database::{
    CurriculumRepository, GroupRepository, TeacherRepository, TimelineRepository, UserRepository,
};

/// Repositories sharing one invalidation bus.
#[derive(Clone)]
pub struct DataLayer {
    /// Invalidation bus shared by every cache below.
    pub bus: Arc<InvalidationBus>,

    /// Groups and group creation.
    pub groups: Arc<GroupRepository>,

    /// Users and group memberships.
    pub users: Arc<UserRepository>,

    /// Teacher assignments per running module.
    pub teachers: Arc<TeacherRepository>,

    /// Running modules of every group.
    pub timeline: Arc<TimelineRepository>,

    /// Curriculum templates.
    pub curriculum: CurriculumRepository,
}

impl DataLayer {
    /// Create the repositories on a fresh bus.
    pub fn new() -> Self {
        Self::with_bus(Arc::new(InvalidationBus::new()))
    }

    /// Create the repositories on an existing bus.
    pub fn with_bus(bus: Arc<InvalidationBus>) -> Self {
        let groups = Arc::new(GroupRepository::new(Arc::clone(&bus)));
        let users = Arc::new(UserRepository::new(Arc::clone(&bus)));
        let teachers = Arc::new(TeacherRepository::new(Arc::clone(&bus)));
        let timeline = Arc::new(TimelineRepository::new(Arc::clone(&bus)));

        Self {
            bus,
            groups,
            users,
            teachers,
            timeline,
            curriculum: CurriculumRepository::new(),
        }
    }
}

impl Default for DataLayer {
    fn default() -> Self {
        Self::new()
    }
}
