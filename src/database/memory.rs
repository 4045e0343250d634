//! In-memory store used by the test suite.
//!
//! Implements [`Connection`] for the statements in [`sql`](super::sql) only.
//! Each connection stages its own copy of the tables while a transaction is
//! open; commit publishes the copy (or fails if another connection committed
//! a write in the meantime), rollback drops it. Identities come from one
//! shared sequence. Every executed
//! statement is logged so tests can count round trips, and statements can be
//! made to fail by prefix.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};

use super::error::QueryError;
use super::gateway::{Connection, Gateway, QueryOutcome, Row, SqlValue};
use super::models::{CurriculumModule, Group, Membership, Role, RunningModule};
use super::sql;

#[derive(Debug, Clone)]
struct StoredUser {
    id: i64,
    username: String,
    full_name: String,
    email: Option<String>,
    role: String,
}

#[derive(Debug, Clone)]
struct StoredEvent {
    event_name: String,
    username: String,
    date_created: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    /// Identity sequence, shared by every staged copy like a database sequence.
    ids: Arc<AtomicI64>,
    /// Bumped by every committed write.
    version: u64,
    groups: Vec<Group>,
    modules: Vec<CurriculumModule>,
    running: Vec<RunningModule>,
    users: Vec<StoredUser>,
    memberships: Vec<Membership>,
    teachers: Vec<(i64, i64)>,
    events: Vec<StoredEvent>,
}

#[derive(Default)]
struct Shared {
    tables: Mutex<Tables>,
    log: Mutex<Vec<String>>,
    failing: Mutex<Vec<String>>,
    fail_commits: AtomicBool,
}

/// Shared in-memory database. Clones share the same tables.
#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A new connection wrapped in a gateway.
    pub(crate) fn gateway(&self) -> Gateway {
        Gateway::new(MemoryConnection {
            shared: Arc::clone(&self.shared),
            pending: None,
        })
    }

    /// Make every statement starting with `prefix` fail with a constraint
    /// violation.
    pub(crate) fn fail_on(&self, prefix: &str) {
        self.shared.failing.lock().push(prefix.to_string());
    }

    pub(crate) fn fail_commits(&self) {
        self.shared.fail_commits.store(true, Ordering::SeqCst);
    }

    /// Number of executed statements starting with `prefix`.
    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.shared
            .log
            .lock()
            .iter()
            .filter(|s| s.starts_with(prefix))
            .count()
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.shared.log.lock().clone()
    }

    pub(crate) fn committed_running_modules(&self) -> usize {
        self.shared.tables.lock().running.len()
    }

    // --- Seeding (bypasses the statement log) ---

    pub(crate) fn seed_group(&self, name: &str, starting_date: &str, archived: bool) -> i64 {
        let mut tables = self.shared.tables.lock();
        let id = tables.next_id();
        tables.groups.push(Group {
            id,
            group_name: name.to_string(),
            starting_date: starting_date.parse().expect("valid date"),
            archived,
        });
        id
    }

    pub(crate) fn seed_module(&self, name: &str, default_duration: i32) -> i64 {
        let mut tables = self.shared.tables.lock();
        let id = tables.next_id();
        let seq_number = tables.modules.len() as i32;
        tables.modules.push(CurriculumModule {
            id,
            module_name: name.to_string(),
            default_duration,
            seq_number,
        });
        id
    }

    pub(crate) fn seed_running_module(&self, module_id: i64, group_id: i64, duration: i32, position: i32) -> i64 {
        let mut tables = self.shared.tables.lock();
        let id = tables.next_id();
        tables.running.push(RunningModule {
            id,
            module_id,
            group_id,
            duration,
            position,
            notes: None,
        });
        id
    }

    pub(crate) fn seed_user(&self, username: &str, full_name: &str, role: Role) -> i64 {
        let mut tables = self.shared.tables.lock();
        let id = tables.next_id();
        tables.users.push(StoredUser {
            id,
            username: username.to_string(),
            full_name: full_name.to_string(),
            email: None,
            role: role.as_str().to_string(),
        });
        id
    }

    pub(crate) fn seed_membership(&self, group_id: i64, user_id: i64) {
        self.shared
            .tables
            .lock()
            .memberships
            .push(Membership { group_id, user_id });
    }

    pub(crate) fn seed_teacher(&self, running_module_id: i64, user_id: i64) {
        self.shared
            .tables
            .lock()
            .teachers
            .push((running_module_id, user_id));
    }

    pub(crate) fn seed_event(&self, event_name: &str, username: &str, date_created: &str) {
        self.shared.tables.lock().events.push(StoredEvent {
            event_name: event_name.to_string(),
            username: username.to_string(),
            date_created: date_created.parse().expect("valid timestamp"),
        });
    }
}

/// One connection to a [`MemoryStore`].
///
/// A transaction stages a private copy of the tables. Commit publishes the
/// copy only if no other connection committed a write since `BEGIN`;
/// otherwise it fails like a serialization failure and the copy is dropped.
pub(crate) struct MemoryConnection {
    shared: Arc<Shared>,
    pending: Option<Tables>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<QueryOutcome, QueryError> {
        // Give concurrent callers a chance to interleave.
        tokio::task::yield_now().await;

        self.shared.log.lock().push(sql.to_string());

        let injected = self
            .shared
            .failing
            .lock()
            .iter()
            .find(|prefix| sql.starts_with(prefix.as_str()))
            .cloned();
        if let Some(prefix) = injected {
            return Err(QueryError::Constraint(format!("injected failure on '{}'", prefix)));
        }

        match self.pending.as_mut() {
            Some(tables) => tables.apply(sql, params),
            None => {
                let mut tables = self.shared.tables.lock();
                let outcome = tables.apply(sql, params)?;
                if !sql.starts_with("SELECT") {
                    tables.version += 1;
                }
                Ok(outcome)
            }
        }
    }

    async fn begin(&mut self) -> Result<(), QueryError> {
        // The staged copy carries the version it was taken at.
        self.pending = Some(self.shared.tables.lock().clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), QueryError> {
        if self.shared.fail_commits.load(Ordering::SeqCst) {
            return Err(QueryError::Connection("injected commit failure".into()));
        }
        let Some(mut staged) = self.pending.take() else {
            return Ok(());
        };

        let mut tables = self.shared.tables.lock();
        if tables.version != staged.version {
            return Err(QueryError::Backend(
                "could not serialize access due to concurrent update".into(),
            ));
        }
        staged.version += 1;
        *tables = staged;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), QueryError> {
        self.pending = None;
        Ok(())
    }
}

fn to_row<T: Serialize>(value: &T) -> Row {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Row::new(map),
        _ => Row::default(),
    }
}

fn json_row(value: Value) -> Row {
    match value {
        Value::Object(map) => Row::new(map),
        _ => Row::default(),
    }
}

fn select(rows: Vec<Row>) -> Result<QueryOutcome, QueryError> {
    Ok(QueryOutcome {
        rows,
        rows_affected: 0,
    })
}

fn affected(n: usize) -> Result<QueryOutcome, QueryError> {
    Ok(QueryOutcome {
        rows: Vec::new(),
        rows_affected: n as u64,
    })
}

fn inserted(id: i64) -> Result<QueryOutcome, QueryError> {
    Ok(QueryOutcome {
        rows: vec![json_row(json!({ "id": id }))],
        rows_affected: 1,
    })
}

fn param(params: &[SqlValue], i: usize) -> Result<&SqlValue, QueryError> {
    params
        .get(i)
        .ok_or_else(|| QueryError::Malformed(format!("missing parameter ${}", i + 1)))
}

fn int(params: &[SqlValue], i: usize) -> Result<i64, QueryError> {
    match param(params, i)? {
        SqlValue::Int(v) => Ok(*v),
        other => Err(QueryError::Malformed(format!("expected integer, got {:?}", other))),
    }
}

fn text(params: &[SqlValue], i: usize) -> Result<String, QueryError> {
    match param(params, i)? {
        SqlValue::Text(v) => Ok(v.clone()),
        other => Err(QueryError::Malformed(format!("expected text, got {:?}", other))),
    }
}

fn opt_text(params: &[SqlValue], i: usize) -> Result<Option<String>, QueryError> {
    match param(params, i)? {
        SqlValue::Null => Ok(None),
        _ => text(params, i).map(Some),
    }
}

fn boolean(params: &[SqlValue], i: usize) -> Result<bool, QueryError> {
    match param(params, i)? {
        SqlValue::Bool(v) => Ok(*v),
        other => Err(QueryError::Malformed(format!("expected boolean, got {:?}", other))),
    }
}

fn date(params: &[SqlValue], i: usize) -> Result<NaiveDate, QueryError> {
    match param(params, i)? {
        SqlValue::Date(v) => Ok(*v),
        other => Err(QueryError::Malformed(format!("expected date, got {:?}", other))),
    }
}

/// Column names of a `SET a = $1, b = $2 WHERE id = $3` tail.
fn set_columns<'a>(tail: &'a str) -> Result<Vec<&'a str>, QueryError> {
    let (set, _) = tail
        .split_once(" WHERE id = ")
        .ok_or_else(|| QueryError::Malformed(format!("update without id filter: {}", tail)))?;
    Ok(set
        .split(", ")
        .filter_map(|assignment| assignment.split(" = ").next())
        .collect())
}

impl Tables {
    fn next_id(&self) -> i64 {
        self.ids.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn user_exists(&self, id: i64) -> bool {
        self.users.iter().any(|u| u.id == id)
    }

    fn apply(&mut self, statement: &str, params: &[SqlValue]) -> Result<QueryOutcome, QueryError> {
        match statement {
            sql::SELECT_GROUPS => {
                let mut groups = self.groups.clone();
                groups.sort_by_key(|g| (g.starting_date, g.id));
                select(groups.iter().map(to_row).collect())
            }
            sql::INSERT_GROUP => {
                let id = self.next_id();
                self.groups.push(Group {
                    id,
                    group_name: text(params, 0)?,
                    starting_date: date(params, 1)?,
                    archived: boolean(params, 2)?,
                });
                inserted(id)
            }
            sql::SELECT_CURRICULUM => {
                let mut modules = self.modules.clone();
                modules.sort_by_key(|m| (m.seq_number, m.id));
                select(modules.iter().map(to_row).collect())
            }
            sql::SELECT_TIMELINE => {
                let mut running = self.running.clone();
                running.sort_by_key(|m| (m.group_id, m.position));
                select(running.iter().map(to_row).collect())
            }
            sql::INSERT_RUNNING_MODULE => {
                let module_id = int(params, 0)?;
                let group_id = int(params, 1)?;
                let position = int(params, 2)? as i32;
                let Some(duration) = self
                    .modules
                    .iter()
                    .find(|m| m.id == module_id)
                    .map(|m| m.default_duration)
                else {
                    return select(Vec::new());
                };
                if !self.groups.iter().any(|g| g.id == group_id) {
                    return Err(QueryError::Constraint("running module references missing group".into()));
                }
                if self.running.iter().any(|m| m.group_id == group_id && m.position == position) {
                    return Err(QueryError::Constraint("duplicate running module position".into()));
                }
                let id = self.next_id();
                self.running.push(RunningModule {
                    id,
                    module_id,
                    group_id,
                    duration,
                    position,
                    notes: None,
                });
                inserted(id)
            }
            sql::SHIFT_RUNNING_MODULES_UP | sql::SHIFT_RUNNING_MODULES_DOWN => {
                let group_id = int(params, 0)?;
                let from = int(params, 1)? as i32;
                let up = statement == sql::SHIFT_RUNNING_MODULES_UP;
                let mut n = 0;
                for module in self.running.iter_mut().filter(|m| m.group_id == group_id) {
                    if up && module.position >= from {
                        module.position += 1;
                        n += 1;
                    } else if !up && module.position > from {
                        module.position -= 1;
                        n += 1;
                    }
                }
                affected(n)
            }
            sql::DELETE_RUNNING_MODULE => {
                let group_id = int(params, 0)?;
                let position = int(params, 1)? as i32;
                let removed: Vec<i64> = self
                    .running
                    .iter()
                    .filter(|m| m.group_id == group_id && m.position == position)
                    .map(|m| m.id)
                    .collect();
                self.running.retain(|m| !removed.contains(&m.id));
                // ON DELETE CASCADE
                self.teachers.retain(|(rm, _)| !removed.contains(rm));
                affected(removed.len())
            }
            sql::UPDATE_NOTES => {
                let notes = opt_text(params, 0)?;
                let id = int(params, 1)?;
                let mut n = 0;
                for module in self.running.iter_mut().filter(|m| m.id == id) {
                    module.notes = notes.clone();
                    n += 1;
                }
                affected(n)
            }
            sql::SELECT_USERS => select(self.users_join()),
            sql::INSERT_USER => {
                let username = text(params, 0)?;
                if self.users.iter().any(|u| u.username == username) {
                    return Err(QueryError::Constraint(format!("duplicate username {}", username)));
                }
                let id = self.next_id();
                self.users.push(StoredUser {
                    id,
                    username,
                    full_name: text(params, 1)?,
                    email: opt_text(params, 2)?,
                    role: text(params, 3)?,
                });
                inserted(id)
            }
            sql::UPDATE_USER_BY_USERNAME => {
                let username = text(params, 3)?;
                let mut n = 0;
                for user in self.users.iter_mut().filter(|u| u.username == username) {
                    user.full_name = text(params, 0)?;
                    user.email = opt_text(params, 1)?;
                    user.role = text(params, 2)?;
                    n += 1;
                }
                affected(n)
            }
            sql::DELETE_MEMBERSHIPS => {
                let n = self.memberships.len();
                self.memberships.clear();
                affected(n)
            }
            sql::SELECT_TEACHERS => select(self.teachers_join()),
            sql::INSERT_TEACHER => {
                let running_module_id = int(params, 0)?;
                let user_id = int(params, 1)?;
                if !self.user_exists(user_id) {
                    return affected(0);
                }
                if self.teachers.contains(&(running_module_id, user_id)) {
                    return Err(QueryError::Constraint("duplicate teacher assignment".into()));
                }
                self.teachers.push((running_module_id, user_id));
                affected(1)
            }
            sql::DELETE_TEACHER => {
                let key = (int(params, 0)?, int(params, 1)?);
                let before = self.teachers.len();
                self.teachers.retain(|t| *t != key);
                affected(before - self.teachers.len())
            }
            sql::SELECT_LAST_EVENT => {
                let name = text(params, 0)?;
                let events: Vec<_> = self.events.iter().filter(|e| e.event_name == name).collect();
                let latest = events.iter().map(|e| e.date_created).max();
                select(
                    events
                        .iter()
                        .filter(|e| Some(e.date_created) == latest)
                        .map(|e| json_row(json!({ "username": e.username, "date_created": e.date_created })))
                        .collect(),
                )
            }
            s if s.starts_with(sql::INSERT_RUNNING_MODULES_VALUES) => {
                let mut n = 0;
                for chunk in params.chunks(4) {
                    let (module_id, group_id) = (int(chunk, 0)?, int(chunk, 1)?);
                    if !self.groups.iter().any(|g| g.id == group_id)
                        || !self.modules.iter().any(|m| m.id == module_id)
                    {
                        return Err(QueryError::Constraint("running module references missing row".into()));
                    }
                    let id = self.next_id();
                    self.running.push(RunningModule {
                        id,
                        module_id,
                        group_id,
                        duration: int(chunk, 2)? as i32,
                        position: int(chunk, 3)? as i32,
                        notes: None,
                    });
                    n += 1;
                }
                affected(n)
            }
            s if s.starts_with(sql::INSERT_USERS_VALUES) => {
                let mut n = 0;
                for chunk in params.chunks(4) {
                    let id = self.next_id();
                    self.users.push(StoredUser {
                        id,
                        username: text(chunk, 0)?,
                        full_name: text(chunk, 1)?,
                        email: opt_text(chunk, 2)?,
                        role: text(chunk, 3)?,
                    });
                    n += 1;
                }
                affected(n)
            }
            s if s.starts_with(sql::INSERT_MEMBERSHIPS_VALUES) => {
                let mut n = 0;
                for chunk in params.chunks(2) {
                    let (group_id, user_id) = (int(chunk, 0)?, int(chunk, 1)?);
                    if !self.groups.iter().any(|g| g.id == group_id) || !self.user_exists(user_id) {
                        return Err(QueryError::Constraint("membership references missing row".into()));
                    }
                    self.memberships.push(Membership { group_id, user_id });
                    n += 1;
                }
                affected(n)
            }
            s if s.starts_with(sql::UPDATE_GROUP) => {
                let columns = set_columns(&s[sql::UPDATE_GROUP.len()..])?;
                let id = int(params, columns.len())?;
                let mut n = 0;
                for group in self.groups.iter_mut().filter(|g| g.id == id) {
                    for (i, column) in columns.iter().enumerate() {
                        match *column {
                            "group_name" => group.group_name = text(params, i)?,
                            "starting_date" => group.starting_date = date(params, i)?,
                            "archived" => group.archived = boolean(params, i)?,
                            other => return Err(QueryError::Malformed(format!("unknown column {}", other))),
                        }
                    }
                    n += 1;
                }
                affected(n)
            }
            s if s.starts_with(sql::UPDATE_USER) => {
                let columns = set_columns(&s[sql::UPDATE_USER.len()..])?;
                let id = int(params, columns.len())?;
                let mut n = 0;
                for user in self.users.iter_mut().filter(|u| u.id == id) {
                    for (i, column) in columns.iter().enumerate() {
                        match *column {
                            "full_name" => user.full_name = text(params, i)?,
                            "email" => user.email = opt_text(params, i)?,
                            "role" => user.role = text(params, i)?,
                            other => return Err(QueryError::Malformed(format!("unknown column {}", other))),
                        }
                    }
                    n += 1;
                }
                affected(n)
            }
            other => Err(QueryError::Malformed(format!("unsupported statement: {}", other))),
        }
    }

    fn users_join(&self) -> Vec<Row> {
        let mut users = self.users.clone();
        users.sort_by(|a, b| (&a.full_name, a.id).cmp(&(&b.full_name, b.id)));

        let mut rows = Vec::new();
        for user in &users {
            let groups: Vec<&Group> = self
                .memberships
                .iter()
                .filter(|m| m.user_id == user.id)
                .filter_map(|m| self.groups.iter().find(|g| g.id == m.group_id))
                .collect();

            let base = json!({
                "id": user.id,
                "username": user.username,
                "full_name": user.full_name,
                "email": user.email,
                "role": user.role,
            });

            if groups.is_empty() {
                rows.push(with_group(&base, Value::Null, Value::Null, Value::Null));
            }
            for group in groups {
                rows.push(with_group(
                    &base,
                    json!(group.id),
                    json!(group.group_name),
                    json!(group.archived),
                ));
            }
        }
        rows
    }

    fn teachers_join(&self) -> Vec<Row> {
        let mut rows: Vec<(&StoredUser, i64)> = self
            .teachers
            .iter()
            .filter_map(|(rm, user_id)| {
                self.users
                    .iter()
                    .find(|u| u.id == *user_id)
                    .map(|u| (u, *rm))
            })
            .collect();
        rows.sort_by(|a, b| (&a.0.full_name, a.1).cmp(&(&b.0.full_name, b.1)));

        rows.into_iter()
            .map(|(user, running_module_id)| {
                json_row(json!({
                    "id": user.id,
                    "username": user.username,
                    "full_name": user.full_name,
                    "email": user.email,
                    "role": user.role,
                    "running_module_id": running_module_id,
                }))
            })
            .collect()
    }
}

fn with_group(base: &Value, group_id: Value, group_name: Value, archived: Value) -> Row {
    let mut base = base.clone();
    if let Value::Object(map) = &mut base {
        map.insert("group_id".into(), group_id);
        map.insert("group_name".into(), group_name);
        map.insert("archived".into(), archived);
    }
    json_row(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_params(name: &str) -> [SqlValue; 3] {
        [
            name.into(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().into(),
            false.into(),
        ]
    }

    #[tokio::test]
    async fn concurrent_commit_is_rejected_not_overwritten() {
        let store = MemoryStore::new();
        let mut staged = store.gateway();
        let mut other = store.gateway();

        staged.begin().await.unwrap();
        let a = staged
            .execute(sql::INSERT_GROUP, &group_params("staged"))
            .await
            .unwrap()
            .insert_id();
        let b = other
            .execute(sql::INSERT_GROUP, &group_params("other"))
            .await
            .unwrap()
            .insert_id();
        assert_ne!(a, b);

        assert!(staged.commit().await.is_err());
        staged.rollback().await.unwrap();

        let groups: Vec<Group> = store.gateway().fetch(sql::SELECT_GROUPS, &[]).await.unwrap();
        let names: Vec<_> = groups.iter().map(|g| g.group_name.as_str()).collect();
        assert_eq!(names, ["other"]);
    }

    #[tokio::test]
    async fn reads_do_not_conflict_with_a_staged_write() {
        let store = MemoryStore::new();
        let mut staged = store.gateway();
        let mut reader = store.gateway();

        staged.begin().await.unwrap();
        staged
            .execute(sql::INSERT_GROUP, &group_params("class5"))
            .await
            .unwrap();
        let seen: Vec<Group> = reader.fetch(sql::SELECT_GROUPS, &[]).await.unwrap();
        assert!(seen.is_empty());

        staged.commit().await.unwrap();
        assert_eq!(reader.fetch::<Group>(sql::SELECT_GROUPS, &[]).await.unwrap().len(), 1);
    }
}
