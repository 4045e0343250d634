//! Teacher roster repository.
//!
//! One snapshot holds the teacher assignments of *every* running module; a
//! per-module roster is an in-memory filter over it. Subscribed to
//! `teachers` and `users` (the rows embed user columns).

use std::sync::Arc;

use tracing::debug;

use crate::cache::{InvalidationBus, SnapshotCache, Topic};
use crate::database::error::Result;
use crate::database::gateway::Gateway;
use crate::database::models::TeacherAssignment;
use crate::database::sql;

/// Repository for running-module teacher assignments.
pub struct TeacherRepository {
    bus: Arc<InvalidationBus>,
    cache: SnapshotCache<TeacherAssignment>,
}

impl TeacherRepository {
    pub fn new(bus: Arc<InvalidationBus>) -> Self {
        let cache = SnapshotCache::new("teachers");
        cache.subscribe_to(&bus, Topic::TEACHERS);
        cache.subscribe_to(&bus, Topic::USERS);

        Self { bus, cache }
    }

    /// Every assignment, ordered by teacher name.
    pub async fn all(&self, gw: &mut Gateway) -> Result<Arc<Vec<TeacherAssignment>>> {
        let assignments = self
            .cache
            .get_or_try_populate(gw.fetch(sql::SELECT_TEACHERS, &[]))
            .await?;
        Ok(assignments)
    }

    /// Teachers assigned to one running module.
    pub async fn by_running_module(
        &self,
        gw: &mut Gateway,
        running_module_id: i64,
    ) -> Result<Vec<TeacherAssignment>> {
        let assignments = self.all(gw).await?;
        Ok(assignments
            .iter()
            .filter(|t| t.running_module_id == running_module_id)
            .cloned()
            .collect())
    }

    /// Assign a teacher. Returns the number of rows inserted (0 when the
    /// user does not exist).
    pub async fn add_teacher(
        &self,
        gw: &mut Gateway,
        running_module_id: i64,
        user_id: i64,
    ) -> Result<u64> {
        let result = gw
            .execute(sql::INSERT_TEACHER, &[running_module_id.into(), user_id.into()])
            .await;
        self.bus.signal(&Topic::TEACHERS);

        let inserted = result?.rows_affected;
        debug!(
            "Assigned user {} to running module {} ({} rows)",
            user_id, running_module_id, inserted
        );
        Ok(inserted)
    }

    /// Remove a teacher assignment. Returns the number of rows deleted.
    pub async fn remove_teacher(
        &self,
        gw: &mut Gateway,
        running_module_id: i64,
        user_id: i64,
    ) -> Result<u64> {
        let result = gw
            .execute(sql::DELETE_TEACHER, &[running_module_id.into(), user_id.into()])
            .await;
        self.bus.signal(&Topic::TEACHERS);

        Ok(result?.rows_affected)
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_present()
    }
}
