//! Clinic Database: SurrealDB connection management, schema migrations,
//! repository implementations, the scoped query builder and the
//! role-schema evolver.

mod connection;
mod error;
pub mod repository;
pub mod role_evolver;
mod schema;
pub mod scoped;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use schema::{rollback_role_revision, run_migrations, schema_v1};
