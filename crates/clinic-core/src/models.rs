//! Domain models for the clinic backend.
//!
//! These are the core types shared across all crates.

pub mod audit;
pub mod membership;
pub mod password_reset;
pub mod patient;
pub mod plan;
pub mod role;
pub mod system_config;
pub mod tenant;
pub mod user;
