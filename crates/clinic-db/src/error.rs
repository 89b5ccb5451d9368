//! Database-specific error types and conversions.

use clinic_core::error::ClinicError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Record already exists: {entity}")]
    Conflict { entity: String },

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A query over a tenant-owned table was executed without a scope.
    #[error("Unscoped query over tenant-owned table `{0}`")]
    Unscoped(String),
}

impl DbError {
    /// Classify an error returned by `Response::check()`.
    ///
    /// Unique-index violations and the single-default guard surface as
    /// conflicts; everything else is a query failure.
    pub(crate) fn from_check(entity: &str, err: surrealdb::Error) -> Self {
        let message = err.to_string();
        if is_conflict(&message) {
            DbError::Conflict {
                entity: entity.to_string(),
            }
        } else {
            DbError::Query(message)
        }
    }

    /// Classify the errors of a multi-statement query (from
    /// `take_errors()`), or `None` when every statement succeeded.
    ///
    /// Inside a cancelled transaction the other statements report a
    /// generic "failed transaction" error, so the statement that actually
    /// violated a constraint is searched for explicitly.
    pub(crate) fn from_statement_errors(
        entity: &str,
        errors: impl IntoIterator<Item = (usize, surrealdb::Error)>,
    ) -> Option<Self> {
        let mut errors: Vec<(usize, String)> = errors
            .into_iter()
            .map(|(index, e)| (index, e.to_string()))
            .collect();
        if errors.is_empty() {
            return None;
        }
        errors.sort_by_key(|(index, _)| *index);
        if errors.iter().any(|(_, m)| is_conflict(m)) {
            return Some(DbError::Conflict {
                entity: entity.to_string(),
            });
        }
        let message = errors
            .iter()
            .find(|(_, m)| !m.contains("failed transaction"))
            .unwrap_or(&errors[0])
            .1
            .clone();
        Some(DbError::Query(message))
    }

    pub(crate) fn not_found(entity: &str, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

fn is_conflict(message: &str) -> bool {
    message.contains("already contains") || message.contains("at most one default")
}

impl From<DbError> for ClinicError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ClinicError::NotFound { entity, id },
            DbError::Conflict { entity } => ClinicError::Conflict { entity },
            other => ClinicError::Database(other.to_string()),
        }
    }
}

/// Parse a UUID stored as a string column.
pub(crate) fn parse_uuid(field: &str, raw: &str) -> Result<uuid::Uuid, DbError> {
    uuid::Uuid::parse_str(raw).map_err(|e| DbError::Corrupt(format!("invalid {field} UUID: {e}")))
}

pub(crate) fn parse_opt_uuid(field: &str, raw: Option<&str>) -> Result<Option<uuid::Uuid>, DbError> {
    raw.map(|r| parse_uuid(field, r)).transpose()
}
