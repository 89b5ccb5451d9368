//! SurrealDB repository implementations.

mod audit;
mod membership;
mod password_reset;
mod patient;
mod plan;
mod system_config;
mod tenant;
mod user;

pub use audit::SurrealAuditLogRepository;
pub use membership::SurrealMembershipRepository;
pub use password_reset::SurrealPasswordResetRepository;
pub use patient::SurrealPatientRepository;
pub use plan::SurrealPlanRepository;
pub use system_config::SurrealSystemConfigRepository;
pub use tenant::SurrealTenantRepository;
pub use user::SurrealUserRepository;

use clinic_core::models::role::Role;
use surrealdb_types::SurrealValue;

use crate::error::DbError;

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
pub(crate) struct CountRow {
    pub(crate) total: u64,
}

/// Projection used to detect whether an `UPDATE` matched a record.
#[derive(Debug, SurrealValue)]
pub(crate) struct IdRow {
    #[allow(dead_code)]
    pub(crate) record_id: String,
}

pub(crate) fn parse_role(raw: &str) -> Result<Role, DbError> {
    raw.parse()
        .map_err(|_| DbError::Corrupt(format!("unknown role label: {raw}")))
}

/// First row of a result set, or `NotFound`.
pub(crate) fn first<T>(rows: Vec<T>, entity: &str, id: impl ToString) -> Result<T, DbError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| DbError::not_found(entity, id))
}

pub(crate) fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}
