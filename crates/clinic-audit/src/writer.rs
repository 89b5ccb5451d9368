//! The audit writer.
//!
//! [`AuditWriter::record`] stamps an entry with the writer's monotonic
//! clock and then either appends it inline (security events) or hands it
//! to the background consumer. Entries for one actor are therefore stored
//! with timestamps in emission order even when the two paths interleave.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use clinic_core::error::ClinicResult;
use clinic_core::models::audit::{AuditAction, CreateAuditLogEntry};
use clinic_core::repository::AuditLogRepository;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::clock::MonotonicClock;
use crate::config::AuditConfig;
use crate::error::AuditError;
use crate::queue::BoundedQueue;

/// Who performed an audited action, snapshotted at emission time.
#[derive(Debug, Clone, Default)]
pub struct AuditActor {
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub tenant_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Whether the actor's role may produce non-security records.
    /// Security events are recorded regardless.
    pub can_record: bool,
}

impl AuditActor {
    /// An actor not yet authenticated, such as a failed login. `email` is
    /// whatever was submitted.
    pub fn anonymous(email: Option<String>) -> Self {
        Self {
            email,
            ..Default::default()
        }
    }

    /// Operator tooling acting outside any request.
    pub fn system() -> Self {
        Self {
            email: Some("system".into()),
            can_record: true,
            ..Default::default()
        }
    }

    pub fn with_request(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

/// One event to record.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub details: Value,
}

impl AuditEvent {
    pub fn new(action: AuditAction) -> Self {
        Self {
            action,
            entity_type: None,
            entity_id: None,
            details: Value::Object(Default::default()),
        }
    }

    pub fn entity(mut self, entity_type: &str, entity_id: impl ToString) -> Self {
        self.entity_type = Some(entity_type.to_string());
        self.entity_id = Some(entity_id.to_string());
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Snapshot of the best-effort path's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditCounters {
    /// Entries ever enqueued.
    pub queued: u64,
    /// Entries evicted because the queue was full.
    pub dropped: u64,
    /// Enqueued entries whose write failed.
    pub failed: u64,
    /// Entries waiting right now.
    pub pending: usize,
}

struct Inner<R> {
    repo: R,
    config: AuditConfig,
    clock: MonotonicClock,
    queue: BoundedQueue<CreateAuditLogEntry>,
    // Held while a batch is being written so `flush` observes a quiescent
    // consumer.
    drain_lock: tokio::sync::Mutex<()>,
    queued: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl<R: AuditLogRepository> Inner<R> {
    async fn write_batch(&self, batch: Vec<CreateAuditLogEntry>) {
        for entry in batch {
            let action = entry.action.clone();
            if let Err(e) = self.repo.append(entry).await {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(%action, error = %e, "Best-effort audit write failed");
            }
        }
    }
}

/// Single writer for the audit log.
pub struct AuditWriter<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for AuditWriter<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> AuditWriter<R>
where
    R: AuditLogRepository + 'static,
{
    /// Create the writer and spawn its queue consumer on the current
    /// tokio runtime.
    pub fn new(repo: R, config: AuditConfig) -> Self {
        let inner = Arc::new(Inner {
            repo,
            queue: BoundedQueue::new(config.queue_capacity),
            config,
            clock: MonotonicClock::new(),
            drain_lock: tokio::sync::Mutex::new(()),
            queued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            consumer: Mutex::new(None),
        });

        let worker = Arc::clone(&inner);
        let handle = tokio::spawn(async move {
            loop {
                worker.queue.notified().await;
                let _guard = worker.drain_lock.lock().await;
                let batch = worker.queue.drain();
                worker.write_batch(batch).await;
            }
        });
        *inner.consumer.lock() = Some(handle);

        Self { inner }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.inner.config
    }

    pub fn repository(&self) -> &R {
        &self.inner.repo
    }

    /// Record `event` on behalf of `actor`.
    ///
    /// Security events are appended before this returns and a failed
    /// write is an error. Other events are queued; they are skipped for
    /// actors that may not produce them.
    pub async fn record(&self, actor: &AuditActor, event: AuditEvent) -> ClinicResult<()> {
        let action = event.action;
        let security = action.is_security_event();

        if !security && !actor.can_record {
            debug!(%action, "Audit skipped for actor without record capability");
            return Ok(());
        }

        let entry = CreateAuditLogEntry {
            timestamp: self.inner.clock.now(),
            user_id: actor.user_id,
            user_email: actor.email.clone(),
            tenant_id: actor.tenant_id,
            action: action.as_str().to_string(),
            category: action.category().as_str().to_string(),
            entity_type: event.entity_type,
            entity_id: event.entity_id,
            ip_address: actor.ip_address.clone(),
            user_agent: actor.user_agent.clone(),
            details: event.details,
        };

        if security {
            self.inner.repo.append(entry).await.map_err(|e| {
                error!(%action, error = %e, "Security audit write failed");
                AuditError::SecurityWrite {
                    action: action.to_string(),
                    reason: e.to_string(),
                }
            })?;
            return Ok(());
        }

        self.inner.queued.fetch_add(1, Ordering::Relaxed);
        if let Some(evicted) = self.inner.queue.push(entry) {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                evicted_action = %evicted.action,
                capacity = self.inner.config.queue_capacity,
                "Audit queue full, dropped oldest entry"
            );
        }
        Ok(())
    }

    /// Record `event` for a mutation that has already been applied. If the
    /// record cannot be written, `revert` undoes the mutation and the
    /// original error is returned, so a change never outlives its
    /// missing security record.
    pub async fn record_or_revert<F, Fut>(
        &self,
        actor: &AuditActor,
        event: AuditEvent,
        revert: F,
    ) -> ClinicResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClinicResult<()>>,
    {
        let action = event.action;
        let Err(err) = self.record(actor, event).await else {
            return Ok(());
        };

        match revert().await {
            Ok(()) => warn!(%action, "Mutation reverted after audit write failure"),
            Err(revert_err) => error!(
                %action,
                error = %revert_err,
                "Mutation could not be reverted after audit write failure"
            ),
        }
        Err(err)
    }

    /// Write everything queued so far and wait for any in-flight batch.
    pub async fn flush(&self) {
        let _guard = self.inner.drain_lock.lock().await;
        let batch = self.inner.queue.drain();
        self.inner.write_batch(batch).await;
    }

    /// Flush and stop the consumer.
    pub async fn shutdown(&self) {
        self.flush().await;
        if let Some(handle) = self.inner.consumer.lock().take() {
            handle.abort();
        }
    }

    pub fn counters(&self) -> AuditCounters {
        AuditCounters {
            queued: self.inner.queued.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            pending: self.inner.queue.len(),
        }
    }
}
