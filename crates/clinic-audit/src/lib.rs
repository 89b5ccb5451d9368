//! Clinic Audit: the single writer of the append-only audit log.
//!
//! Security events are persisted before the triggering action returns.
//! Everything else goes through a bounded in-process queue drained by a
//! background task; overflow drops the oldest queued entry.

pub mod clock;
pub mod config;
pub mod error;
mod queue;
pub mod writer;

pub use config::AuditConfig;
pub use error::AuditError;
pub use writer::{AuditActor, AuditCounters, AuditEvent, AuditWriter};
