//! Group repository with a whole-table snapshot.
//!
//! Every lookup is an in-memory filter over the snapshot ordered by
//! starting date. Writes signal `groups` and `timeline`.

use std::sync::Arc;

use tracing::debug;

use crate::cache::{InvalidationBus, SnapshotCache, Topic};
use crate::database::error::Result;
use crate::database::gateway::{set_clause, Gateway, SqlValue};
use crate::database::models::{Group, GroupUpdate};
use crate::database::sql;

use super::CurriculumRepository;

/// Topics affected by any write to the groups table.
pub(super) const GROUP_TOPICS: [Topic; 2] = [Topic::GROUPS, Topic::TIMELINE];

/// Repository for class groups.
pub struct GroupRepository {
    pub(super) bus: Arc<InvalidationBus>,
    pub(super) cache: SnapshotCache<Group>,
    pub(super) curriculum: CurriculumRepository,
}

impl GroupRepository {
    pub fn new(bus: Arc<InvalidationBus>) -> Self {
        let cache = SnapshotCache::new("groups");
        cache.subscribe_to(&bus, Topic::GROUPS);

        Self {
            bus,
            cache,
            curriculum: CurriculumRepository::new(),
        }
    }

    /// All groups, ordered by starting date.
    pub async fn all(&self, gw: &mut Gateway) -> Result<Arc<Vec<Group>>> {
        let groups = self
            .cache
            .get_or_try_populate(gw.fetch(sql::SELECT_GROUPS, &[]))
            .await?;
        Ok(groups)
    }

    pub async fn by_id(&self, gw: &mut Gateway, id: i64) -> Result<Option<Group>> {
        let groups = self.all(gw).await?;
        Ok(groups.iter().find(|g| g.id == id).cloned())
    }

    /// First group with the given name, in starting-date order.
    pub async fn by_name(&self, gw: &mut Gateway, name: &str) -> Result<Option<Group>> {
        let groups = self.all(gw).await?;
        Ok(groups.iter().find(|g| g.group_name == name).cloned())
    }

    /// Groups that are not archived, in starting-date order.
    pub async fn active(&self, gw: &mut Gateway) -> Result<Vec<Group>> {
        let groups = self.all(gw).await?;
        Ok(groups.iter().filter(|g| !g.archived).cloned().collect())
    }

    /// Apply a partial update. Returns the number of rows changed.
    ///
    /// Caches are invalidated even when nothing changed or the statement
    /// failed.
    pub async fn update(&self, gw: &mut Gateway, id: i64, update: &GroupUpdate) -> Result<u64> {
        let mut columns = Vec::new();
        let mut params: Vec<SqlValue> = Vec::new();

        if let Some(name) = &update.group_name {
            columns.push("group_name");
            params.push(name.as_str().into());
        }
        if let Some(date) = update.starting_date {
            columns.push("starting_date");
            params.push(date.into());
        }
        if let Some(archived) = update.archived {
            columns.push("archived");
            params.push(archived.into());
        }

        let Some(set) = set_clause(&columns) else {
            debug!("Empty update for group {}", id);
            self.bus.signal_all(&GROUP_TOPICS);
            return Ok(0);
        };

        params.push(id.into());
        let statement = format!("{}{} WHERE id = ${}", sql::UPDATE_GROUP, set, params.len());

        let result = gw.execute(&statement, &params).await;
        self.bus.signal_all(&GROUP_TOPICS);

        let affected = result?.rows_affected;
        debug!("Updated group {} ({} rows)", id, affected);
        Ok(affected)
    }

    /// Whether the groups snapshot is currently held.
    pub fn is_cached(&self) -> bool {
        self.cache.is_present()
    }
}
