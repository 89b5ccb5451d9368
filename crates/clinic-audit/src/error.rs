//! Audit error types.

use clinic_core::error::ClinicError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    /// A synchronous security write failed; the triggering action must
    /// not complete.
    #[error("security audit write failed for {action}: {reason}")]
    SecurityWrite { action: String, reason: String },
}

impl From<AuditError> for ClinicError {
    fn from(err: AuditError) -> Self {
        ClinicError::Internal(err.to_string())
    }
}
