//! Timeline repository.
//!
//! Snapshot of every running module, ordered by group then position.
//! Invalidated through the `timeline` topic. Positions within a group stay
//! contiguous: inserting or deleting shifts the modules behind it inside the
//! same transaction.

use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::{InvalidationBus, SnapshotCache, Topic};
use crate::database::error::{QueryError, Result};
use crate::database::gateway::{rows_per_statement, values_list, Gateway, SqlValue};
use crate::database::models::{NewRunningModule, RunningModule};
use crate::database::sql;

use super::abort;

/// Topics affected by deleting a running module (teacher assignments cascade).
const DELETE_TOPICS: [Topic; 2] = [Topic::TIMELINE, Topic::TEACHERS];

/// Repository for the running-module timeline.
pub struct TimelineRepository {
    bus: Arc<InvalidationBus>,
    cache: SnapshotCache<RunningModule>,
}

impl TimelineRepository {
    pub fn new(bus: Arc<InvalidationBus>) -> Self {
        let cache = SnapshotCache::new("timeline");
        cache.subscribe_to(&bus, Topic::TIMELINE);

        Self { bus, cache }
    }

    /// Every running module, ordered by group and position.
    pub async fn all(&self, gw: &mut Gateway) -> Result<Arc<Vec<RunningModule>>> {
        let modules = self
            .cache
            .get_or_try_populate(gw.fetch(sql::SELECT_TIMELINE, &[]))
            .await?;
        Ok(modules)
    }

    /// Running modules of one group, in position order.
    pub async fn for_group(&self, gw: &mut Gateway, group_id: i64) -> Result<Vec<RunningModule>> {
        let modules = self.all(gw).await?;
        Ok(modules
            .iter()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect())
    }

    pub async fn by_id(&self, gw: &mut Gateway, id: i64) -> Result<Option<RunningModule>> {
        let modules = self.all(gw).await?;
        Ok(modules.iter().find(|m| m.id == id).cloned())
    }

    /// Insert a running module for `module_id` at `position` in a group,
    /// shifting later modules back by one. Returns the new id.
    pub async fn add_running_module(
        &self,
        gw: &mut Gateway,
        module_id: i64,
        group_id: i64,
        position: i32,
    ) -> Result<i64> {
        let outcome = Self::add_in_transaction(gw, module_id, group_id, position).await;
        self.bus.signal(&Topic::TIMELINE);
        outcome
    }

    async fn add_in_transaction(
        gw: &mut Gateway,
        module_id: i64,
        group_id: i64,
        position: i32,
    ) -> Result<i64> {
        const OPERATION: &str = "add running module";

        gw.begin().await?;
        let id = match Self::shift_then_insert(gw, module_id, group_id, position).await {
            Ok(id) => id,
            Err(err) => return Err(abort(gw, OPERATION, err).await),
        };
        if let Err(err) = gw.commit().await {
            return Err(abort(gw, OPERATION, err.into()).await);
        }

        info!(
            "Added running module {} (module {}) to group {} at position {}",
            id, module_id, group_id, position
        );
        Ok(id)
    }

    async fn shift_then_insert(
        gw: &mut Gateway,
        module_id: i64,
        group_id: i64,
        position: i32,
    ) -> Result<i64> {
        gw.execute(sql::SHIFT_RUNNING_MODULES_UP, &[group_id.into(), position.into()])
            .await?;
        let inserted = gw
            .execute(
                sql::INSERT_RUNNING_MODULE,
                &[module_id.into(), group_id.into(), position.into()],
            )
            .await?;
        inserted
            .insert_id()
            .ok_or_else(|| QueryError::MissingInsertId("running_modules").into())
    }

    /// Delete the running module at `position` in a group, closing the gap
    /// behind it. Returns the number of modules deleted (0 or 1).
    pub async fn delete_running_module(
        &self,
        gw: &mut Gateway,
        group_id: i64,
        position: i32,
    ) -> Result<u64> {
        let outcome = Self::delete_in_transaction(gw, group_id, position).await;
        self.bus.signal_all(&DELETE_TOPICS);
        outcome
    }

    async fn delete_in_transaction(gw: &mut Gateway, group_id: i64, position: i32) -> Result<u64> {
        const OPERATION: &str = "delete running module";

        gw.begin().await?;
        let deleted = match Self::delete_then_shift(gw, group_id, position).await {
            Ok(n) => n,
            Err(err) => return Err(abort(gw, OPERATION, err).await),
        };
        if let Err(err) = gw.commit().await {
            return Err(abort(gw, OPERATION, err.into()).await);
        }
        Ok(deleted)
    }

    async fn delete_then_shift(gw: &mut Gateway, group_id: i64, position: i32) -> Result<u64> {
        let deleted = gw
            .execute(sql::DELETE_RUNNING_MODULE, &[group_id.into(), position.into()])
            .await?
            .rows_affected;
        if deleted > 0 {
            gw.execute(sql::SHIFT_RUNNING_MODULES_DOWN, &[group_id.into(), position.into()])
                .await?;
        }
        Ok(deleted)
    }

    /// Replace the notes of one running module. `None` clears them.
    pub async fn update_notes(
        &self,
        gw: &mut Gateway,
        running_module_id: i64,
        notes: Option<&str>,
    ) -> Result<u64> {
        let result = gw
            .execute(sql::UPDATE_NOTES, &[notes.into(), running_module_id.into()])
            .await;
        self.bus.signal(&Topic::TIMELINE);

        let updated = result?.rows_affected;
        debug!("Saved notes of running module {} ({} rows)", running_module_id, updated);
        Ok(updated)
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_present()
    }
}

/// Insert running modules, one statement per chunk that fits the bind
/// parameter limit. No-op for an empty slice.
///
/// Does not signal: callers own the invalidation of the write they are part
/// of.
pub(crate) async fn insert_running_modules(
    gw: &mut Gateway,
    rows: &[NewRunningModule],
) -> std::result::Result<u64, QueryError> {
    if rows.is_empty() {
        debug!("No running modules to insert");
        return Ok(0);
    }

    let mut inserted = 0;
    for chunk in rows.chunks(rows_per_statement(4)) {
        let statement = format!(
            "{}{}",
            sql::INSERT_RUNNING_MODULES_VALUES,
            values_list(chunk.len(), 4)
        );
        let params: Vec<SqlValue> = chunk
            .iter()
            .flat_map(|r| {
                [
                    SqlValue::from(r.module_id),
                    SqlValue::from(r.group_id),
                    SqlValue::from(r.duration),
                    SqlValue::from(r.position),
                ]
            })
            .collect();

        inserted += gw.execute(&statement, &params).await?.rows_affected;
    }
    Ok(inserted)
}
