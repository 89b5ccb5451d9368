//! Error taxonomy shared by every layer of the clinic backend.
//!
//! Each variant maps to exactly one HTTP status in the server adapter;
//! lower layers never pick status codes themselves.

use serde::Serialize;
use thiserror::Error;

/// A single field-level validation diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClinicError {
    /// Missing, invalid or expired credentials, or an inactive principal.
    #[error("Not authenticated: {reason}")]
    Unauthenticated { reason: String },

    /// The capability set or tenant scope denies the action.
    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    /// Entity absent after scoping. Deliberately carries no hint about
    /// whether the entity exists in another tenant.
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Validation failed")]
    Validation { errors: Vec<FieldError> },

    #[error("Entity already exists: {entity}")]
    Conflict { entity: String },

    /// An external collaborator (mail, storage) failed.
    #[error("Dependency failure: {0}")]
    Dependency(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClinicError {
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated {
            reason: reason.into(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Shorthand for a validation error on a single field.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            errors: vec![FieldError::new(field, message)],
        }
    }

    pub fn conflict(entity: impl Into<String>) -> Self {
        Self::Conflict {
            entity: entity.into(),
        }
    }
}

pub type ClinicResult<T> = Result<T, ClinicError>;
