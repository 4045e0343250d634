//! Database model exports.

pub mod curriculum;
pub mod event;
pub mod group;
pub mod running_module;
pub mod user;

pub use curriculum::CurriculumModule;
pub use event::LastEvent;
pub use group::{Group, GroupUpdate, NewGroup};
pub use running_module::{NewRunningModule, RunningModule};
pub use user::{Membership, NewUser, Role, TeacherAssignment, User, UserUpdate};
