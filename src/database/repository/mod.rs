//! Repository module - cached data access per table family.

mod curriculum_repository;
mod group_creation;
mod group_repository;
mod teacher_repository;
mod timeline_repository;
mod user_repository;

use tracing::warn;

pub use curriculum_repository::CurriculumRepository;
pub use group_repository::GroupRepository;
pub use teacher_repository::TeacherRepository;
pub use timeline_repository::TimelineRepository;
pub use user_repository::UserRepository;

use super::error::{CompositeWriteError, DataError};
use super::gateway::Gateway;

/// Roll back the open transaction and wrap `cause` into a
/// [`CompositeWriteError`]. A failing rollback is recorded, not raised.
pub(crate) async fn abort(gw: &mut Gateway, operation: &'static str, cause: DataError) -> DataError {
    warn!("{} failed, rolling back: {}", operation, cause);

    let rollback = match gw.rollback().await {
        Ok(()) => None,
        Err(err) => {
            warn!("Rollback of {} failed: {}", operation, err);
            Some(err)
        }
    };

    CompositeWriteError {
        operation,
        source: Box::new(cause),
        rollback,
    }
    .into()
}
