//! Audit writer configuration.

/// Configuration for the audit writer.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Capacity of the best-effort queue (default: 1024).
    pub queue_capacity: usize,
    /// Number of recent security entries returned by the stats view
    /// (default: 10).
    pub critical_entries: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            critical_entries: 10,
        }
    }
}
