//! Clinic Core: domain models, error taxonomy, repository contracts and
//! the data scope value shared by every crate in the workspace.

pub mod error;
pub mod models;
pub mod repository;
pub mod scope;

pub use error::{ClinicError, ClinicResult, FieldError};
pub use scope::DataScope;
