//! Curriculum repository.
//!
//! Templates are read straight from the store on every call: group creation
//! reads them inside its own transaction.

use crate::database::error::QueryError;
use crate::database::gateway::Gateway;
use crate::database::models::CurriculumModule;
use crate::database::sql;

/// Read access to curriculum module templates.
#[derive(Debug, Clone, Default)]
pub struct CurriculumRepository;

impl CurriculumRepository {
    pub fn new() -> Self {
        Self
    }

    /// Templates in curriculum order.
    pub async fn templates(&self, gw: &mut Gateway) -> Result<Vec<CurriculumModule>, QueryError> {
        gw.fetch(sql::SELECT_CURRICULUM, &[]).await
    }
}
