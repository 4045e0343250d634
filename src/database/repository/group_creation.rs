//! Group creation - the composite write that bootstraps a group's timeline.
//!
//! Inside one transaction: insert the group, read the curriculum templates,
//! bulk insert one running module per template. On failure the transaction
//! is rolled back before the error is returned. `groups` and `timeline` are
//! signalled once the transaction has reached its terminal state.

use tracing::info;

use crate::database::error::{QueryError, Result};
use crate::database::gateway::Gateway;
use crate::database::models::{NewGroup, NewRunningModule};
use crate::database::sql;

use super::group_repository::{GroupRepository, GROUP_TOPICS};
use super::{abort, timeline_repository};

const OPERATION: &str = "create group";

impl GroupRepository {
    /// Create a group and its running modules atomically.
    ///
    /// Returns the new group id. Fails with
    /// [`CompositeWriteError`](crate::database::CompositeWriteError) when any
    /// step after `BEGIN` fails; nothing from this call is visible afterwards.
    pub async fn create(&self, gw: &mut Gateway, group: &NewGroup) -> Result<i64> {
        let outcome = self.create_in_transaction(gw, group).await;

        // After commit (or rollback), never before: a reader repopulating
        // between these two points sees the committed rows.
        self.bus.signal_all(&GROUP_TOPICS);

        outcome
    }

    async fn create_in_transaction(&self, gw: &mut Gateway, group: &NewGroup) -> Result<i64> {
        gw.begin().await?;

        let group_id = match self.insert_with_modules(gw, group).await {
            Ok(id) => id,
            Err(err) => return Err(abort(gw, OPERATION, err).await),
        };

        if let Err(err) = gw.commit().await {
            return Err(abort(gw, OPERATION, err.into()).await);
        }

        info!("Created group '{}' (id {})", group.group_name, group_id);
        Ok(group_id)
    }

    async fn insert_with_modules(&self, gw: &mut Gateway, group: &NewGroup) -> Result<i64> {
        let inserted = gw
            .execute(
                sql::INSERT_GROUP,
                &[
                    group.group_name.as_str().into(),
                    group.starting_date.into(),
                    group.archived.into(),
                ],
            )
            .await?;
        let group_id = inserted
            .insert_id()
            .ok_or(QueryError::MissingInsertId("groups"))?;

        let templates = self.curriculum.templates(gw).await?;
        let running = NewRunningModule::from_templates(group_id, &templates);
        timeline_repository::insert_running_modules(gw, &running).await?;

        Ok(group_id)
    }
}
