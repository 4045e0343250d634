//! SQL statements used by the repositories.
//!
//! Every statement binds its parameters; identifiers are never interpolated
//! into statement text. Multi-row inserts append a placeholder list built by
//! [`values_list`](super::gateway::values_list) to the `*_VALUES` prefixes.

// Groups

pub const SELECT_GROUPS: &str =
    r#"SELECT id, group_name, starting_date, archived FROM "groups" ORDER BY starting_date, id"#;

pub const INSERT_GROUP: &str = r#"INSERT INTO "groups" (group_name, starting_date, archived) VALUES ($1, $2, $3) RETURNING id"#;

/// Followed by a `SET` clause and `WHERE id = $n`.
pub const UPDATE_GROUP: &str = r#"UPDATE "groups" SET "#;

// Curriculum and running modules

pub const SELECT_CURRICULUM: &str =
    "SELECT id, module_name, default_duration, seq_number FROM modules ORDER BY seq_number, id";

pub const INSERT_RUNNING_MODULES_VALUES: &str =
    "INSERT INTO running_modules (module_id, group_id, duration, position) VALUES ";

pub const SELECT_TIMELINE: &str = "SELECT id, module_id, group_id, duration, position, notes FROM running_modules ORDER BY group_id, position";

/// Running module from a curriculum template, with the template's default
/// duration. Inserts nothing when the module does not exist.
pub const INSERT_RUNNING_MODULE: &str = "INSERT INTO running_modules (module_id, group_id, duration, position) SELECT modules.id, $2, modules.default_duration, $3 FROM modules WHERE modules.id = $1 RETURNING id";

pub const SHIFT_RUNNING_MODULES_UP: &str =
    "UPDATE running_modules SET position = position + 1 WHERE group_id = $1 AND position >= $2";

pub const SHIFT_RUNNING_MODULES_DOWN: &str =
    "UPDATE running_modules SET position = position - 1 WHERE group_id = $1 AND position > $2";

pub const DELETE_RUNNING_MODULE: &str =
    "DELETE FROM running_modules WHERE group_id = $1 AND position = $2";

pub const UPDATE_NOTES: &str = "UPDATE running_modules SET notes = $1 WHERE id = $2";

// Users

pub const SELECT_USERS: &str = r#"SELECT users.id, users.username, users.full_name, users.email, users.role, "groups".id AS group_id, "groups".group_name, "groups".archived
FROM users
LEFT JOIN group_students ON users.id = group_students.user_id
LEFT JOIN "groups" ON "groups".id = group_students.group_id
ORDER BY users.full_name, users.id"#;

pub const INSERT_USER: &str =
    "INSERT INTO users (username, full_name, email, role) VALUES ($1, $2, $3, $4) RETURNING id";

pub const INSERT_USERS_VALUES: &str = "INSERT INTO users (username, full_name, email, role) VALUES ";

pub const UPDATE_USER_BY_USERNAME: &str =
    "UPDATE users SET full_name = $1, email = $2, role = $3 WHERE username = $4";

/// Followed by a `SET` clause and `WHERE id = $n`.
pub const UPDATE_USER: &str = "UPDATE users SET ";

pub const DELETE_MEMBERSHIPS: &str = "DELETE FROM group_students";

pub const INSERT_MEMBERSHIPS_VALUES: &str = "INSERT INTO group_students (group_id, user_id) VALUES ";

// Teachers

pub const SELECT_TEACHERS: &str = "SELECT users.id, users.username, users.full_name, users.email, users.role, running_module_teachers.running_module_id
FROM users
INNER JOIN running_module_teachers ON running_module_teachers.user_id = users.id
ORDER BY users.full_name, running_module_teachers.running_module_id";

pub const INSERT_TEACHER: &str = "INSERT INTO running_module_teachers (running_module_id, user_id) SELECT $1::bigint, users.id FROM users WHERE users.id = $2";

pub const DELETE_TEACHER: &str =
    "DELETE FROM running_module_teachers WHERE running_module_id = $1 AND user_id = $2";

// Events

pub const SELECT_LAST_EVENT: &str = "SELECT username, date_created FROM events
WHERE event_name = $1 AND date_created = (SELECT MAX(date_created) FROM events WHERE event_name = $1)";
