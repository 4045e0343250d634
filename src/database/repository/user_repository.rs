//! User repository with a whole-table snapshot.
//!
//! The snapshot is the `users ⟕ group_students ⟕ groups` join ordered by full
//! name, so a user with two memberships appears twice. Lookups by id or
//! username therefore return every matching row.
//!
//! Subscribed to `users` and `groups` (group renames and archiving change the
//! joined columns).

use std::sync::Arc;

use tracing::debug;

use crate::cache::{InvalidationBus, SnapshotCache, Topic};
use crate::database::error::{QueryError, Result};
use crate::database::gateway::{rows_per_statement, set_clause, values_list, Gateway, SqlValue};
use crate::database::models::{LastEvent, Membership, NewUser, User, UserUpdate};
use crate::database::sql;

use super::abort;

const REPLACE_MEMBERSHIPS: &str = "replace memberships";

/// Repository for users and their group memberships.
pub struct UserRepository {
    bus: Arc<InvalidationBus>,
    cache: SnapshotCache<User>,
}

impl UserRepository {
    pub fn new(bus: Arc<InvalidationBus>) -> Self {
        let cache = SnapshotCache::new("users");
        cache.subscribe_to(&bus, Topic::USERS);
        cache.subscribe_to(&bus, Topic::GROUPS);

        Self { bus, cache }
    }

    /// All user rows, ordered by full name.
    pub async fn all(&self, gw: &mut Gateway) -> Result<Arc<Vec<User>>> {
        let users = self
            .cache
            .get_or_try_populate(gw.fetch(sql::SELECT_USERS, &[]))
            .await?;
        Ok(users)
    }

    pub async fn teachers(&self, gw: &mut Gateway) -> Result<Vec<User>> {
        self.filtered(gw, User::is_teacher).await
    }

    pub async fn by_username(&self, gw: &mut Gateway, username: &str) -> Result<Vec<User>> {
        self.filtered(gw, |u| u.username == username).await
    }

    pub async fn by_id(&self, gw: &mut Gateway, id: i64) -> Result<Vec<User>> {
        self.filtered(gw, |u| u.id == id).await
    }

    /// Members of a group, ordered by full name.
    pub async fn by_group(&self, gw: &mut Gateway, group_id: i64) -> Result<Vec<User>> {
        self.filtered(gw, |u| u.group_id == Some(group_id)).await
    }

    async fn filtered<F>(&self, gw: &mut Gateway, keep: F) -> Result<Vec<User>>
    where
        F: Fn(&User) -> bool,
    {
        let users = self.all(gw).await?;
        Ok(users.iter().filter(|u| keep(*u)).cloned().collect())
    }

    /// Insert one user. Returns the generated id.
    pub async fn add(&self, gw: &mut Gateway, user: &NewUser) -> Result<i64> {
        let result = gw.execute(sql::INSERT_USER, &user_params(user)).await;
        self.bus.signal(&Topic::USERS);

        let id = result?
            .insert_id()
            .ok_or(QueryError::MissingInsertId("users"))?;
        debug!("Added user {} (id {})", user.username, id);
        Ok(id)
    }

    /// Insert many users, one multi-row statement per chunk that fits the
    /// bind parameter limit.
    ///
    /// Not transactional by itself: a failing chunk stops the batch and
    /// earlier chunks stay inserted. Run it inside a transaction on `gw` for
    /// all-or-nothing.
    pub async fn bulk_insert(&self, gw: &mut Gateway, users: &[NewUser]) -> Result<u64> {
        let result = Self::insert_chunks(gw, users).await;
        self.bus.signal(&Topic::USERS);
        result
    }

    async fn insert_chunks(gw: &mut Gateway, users: &[NewUser]) -> Result<u64> {
        let mut inserted = 0;
        for chunk in users.chunks(rows_per_statement(4)) {
            let statement = format!("{}{}", sql::INSERT_USERS_VALUES, values_list(chunk.len(), 4));
            let params: Vec<SqlValue> = chunk.iter().flat_map(user_params).collect();
            inserted += gw.execute(&statement, &params).await?.rows_affected;
        }
        Ok(inserted)
    }

    /// Update name, email and role of existing users, matched by username.
    ///
    /// Statements run one after another; the first failure stops the batch.
    pub async fn bulk_update(&self, gw: &mut Gateway, users: &[NewUser]) -> Result<u64> {
        let result = Self::update_each(gw, users).await;
        self.bus.signal(&Topic::USERS);
        result
    }

    async fn update_each(gw: &mut Gateway, users: &[NewUser]) -> Result<u64> {
        let mut affected = 0;
        for user in users {
            let params = [
                SqlValue::from(user.full_name.as_str()),
                SqlValue::from(user.email.clone()),
                SqlValue::from(user.role.as_str()),
                SqlValue::from(user.username.as_str()),
            ];
            affected += gw
                .execute(sql::UPDATE_USER_BY_USERNAME, &params)
                .await?
                .rows_affected;
        }
        Ok(affected)
    }

    /// Replace every group membership with `memberships`, atomically.
    pub async fn replace_memberships(
        &self,
        gw: &mut Gateway,
        memberships: &[Membership],
    ) -> Result<u64> {
        let result = Self::replace_in_transaction(gw, memberships).await;
        self.bus.signal(&Topic::USERS);
        result
    }

    async fn replace_in_transaction(gw: &mut Gateway, memberships: &[Membership]) -> Result<u64> {
        gw.begin().await?;

        let inserted = match Self::delete_then_insert(gw, memberships).await {
            Ok(n) => n,
            Err(err) => return Err(abort(gw, REPLACE_MEMBERSHIPS, err).await),
        };

        if let Err(err) = gw.commit().await {
            return Err(abort(gw, REPLACE_MEMBERSHIPS, err.into()).await);
        }
        Ok(inserted)
    }

    async fn delete_then_insert(gw: &mut Gateway, memberships: &[Membership]) -> Result<u64> {
        gw.execute(sql::DELETE_MEMBERSHIPS, &[]).await?;

        let mut inserted = 0;
        for chunk in memberships.chunks(rows_per_statement(2)) {
            let statement = format!(
                "{}{}",
                sql::INSERT_MEMBERSHIPS_VALUES,
                values_list(chunk.len(), 2)
            );
            let params: Vec<SqlValue> = chunk
                .iter()
                .flat_map(|m| [SqlValue::from(m.group_id), SqlValue::from(m.user_id)])
                .collect();
            inserted += gw.execute(&statement, &params).await?.rows_affected;
        }
        Ok(inserted)
    }

    /// Apply a partial update and return the refreshed user rows.
    pub async fn update(&self, gw: &mut Gateway, id: i64, update: &UserUpdate) -> Result<Vec<User>> {
        let mut columns = Vec::new();
        let mut params: Vec<SqlValue> = Vec::new();

        if let Some(full_name) = &update.full_name {
            columns.push("full_name");
            params.push(full_name.as_str().into());
        }
        if let Some(email) = &update.email {
            columns.push("email");
            params.push(email.as_str().into());
        }
        if let Some(role) = update.role {
            columns.push("role");
            params.push(role.as_str().into());
        }

        if let Some(set) = set_clause(&columns) {
            params.push(id.into());
            let statement = format!("{}{} WHERE id = ${}", sql::UPDATE_USER, set, params.len());
            let result = gw.execute(&statement, &params).await;
            self.bus.signal(&Topic::USERS);
            result?;
        } else {
            self.bus.signal(&Topic::USERS);
        }

        self.by_id(gw, id).await
    }

    /// Most recent occurrence of `event_name`. Not cached.
    pub async fn last_event(&self, gw: &mut Gateway, event_name: &str) -> Result<Option<LastEvent>> {
        let events: Vec<LastEvent> = gw
            .fetch(sql::SELECT_LAST_EVENT, &[event_name.into()])
            .await?;
        Ok(events.into_iter().next())
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_present()
    }
}

fn user_params(user: &NewUser) -> [SqlValue; 4] {
    [
        SqlValue::from(user.username.as_str()),
        SqlValue::from(user.full_name.as_str()),
        SqlValue::from(user.email.clone()),
        SqlValue::from(user.role.as_str()),
    ]
}
