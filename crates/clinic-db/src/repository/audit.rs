//! SurrealDB implementation of [`AuditLogRepository`].
//!
//! Append-only because this module issues no UPDATE or DELETE. The
//! table's permissions deny both to record-level sessions only; a root
//! connection like the server's is not bound by them.

use chrono::{DateTime, Utc};
use clinic_core::error::ClinicResult;
use clinic_core::models::audit::{
    AuditCategory, AuditLogEntry, AuditStats, CategoryCount, CreateAuditLogEntry,
};
use clinic_core::repository::{AuditLogFilter, AuditLogRepository, PaginatedResult, Pagination};
use clinic_core::scope::DataScope;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::{DbError, parse_opt_uuid, parse_uuid};
use crate::scoped::{AUDIT_LOGS, ScopedQuery};

#[derive(Debug, SurrealValue)]
struct AuditLogRow {
    record_id: String,
    timestamp: DateTime<Utc>,
    user_id: Option<String>,
    user_email: Option<String>,
    tenant_id: Option<String>,
    action: String,
    category: String,
    entity_type: Option<String>,
    entity_id: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    details: serde_json::Value,
}

impl AuditLogRow {
    fn try_into_entry(self) -> Result<AuditLogEntry, DbError> {
        Ok(AuditLogEntry {
            id: parse_uuid("audit_log", &self.record_id)?,
            timestamp: self.timestamp,
            user_id: parse_opt_uuid("user", self.user_id.as_deref())?,
            user_email: self.user_email,
            tenant_id: parse_opt_uuid("tenant", self.tenant_id.as_deref())?,
            action: self.action,
            category: self.category,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            details: self.details,
        })
    }
}

fn into_entries(rows: Vec<AuditLogRow>) -> Result<Vec<AuditLogEntry>, DbError> {
    rows.into_iter().map(AuditLogRow::try_into_entry).collect()
}

/// Apply the optional filters of an audit query.
fn apply_filter(mut query: ScopedQuery, filter: AuditLogFilter) -> ScopedQuery {
    if let Some(action) = filter.action {
        query = query.filter("action = $action", "action", action);
    }
    if let Some(category) = filter.category {
        query = query.filter("category = $category", "category", category);
    }
    if let Some(user_id) = filter.user_id {
        query = query.filter("user_id = $user_id", "user_id", user_id.to_string());
    }
    if let Some(tenant_id) = filter.tenant_id {
        query = query.filter("tenant_id = $tenant_id", "tenant_id", tenant_id.to_string());
    }
    if let Some(entity_type) = filter.entity_type {
        query = query.filter("entity_type = $entity_type", "entity_type", entity_type);
    }
    if let Some(start) = filter.start_date {
        query = query.filter(
            "timestamp >= <datetime>$start_date",
            "start_date",
            start.to_rfc3339(),
        );
    }
    if let Some(end) = filter.end_date {
        query = query.filter("timestamp <= <datetime>$end_date", "end_date", end.to_rfc3339());
    }
    query
}

/// SurrealDB implementation of the AuditLog repository.
#[derive(Clone)]
pub struct SurrealAuditLogRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAuditLogRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AuditLogRepository for SurrealAuditLogRepository<C> {
    async fn append(&self, input: CreateAuditLogEntry) -> ClinicResult<AuditLogEntry> {
        let id = Uuid::new_v4();

        self.db
            .query(
                "CREATE type::record('audit_log', $id) SET \
                 timestamp = $timestamp, user_id = $user_id, \
                 user_email = $user_email, tenant_id = $tenant_id, \
                 action = $action, category = $category, \
                 entity_type = $entity_type, entity_id = $entity_id, \
                 ip_address = $ip_address, user_agent = $user_agent, \
                 details = $details",
            )
            .bind(("id", id.to_string()))
            .bind(("timestamp", input.timestamp))
            .bind(("user_id", input.user_id.map(|u| u.to_string())))
            .bind(("user_email", input.user_email.clone()))
            .bind(("tenant_id", input.tenant_id.map(|t| t.to_string())))
            .bind(("action", input.action.clone()))
            .bind(("category", input.category.clone()))
            .bind(("entity_type", input.entity_type.clone()))
            .bind(("entity_id", input.entity_id.clone()))
            .bind(("ip_address", input.ip_address.clone()))
            .bind(("user_agent", input.user_agent.clone()))
            .bind(("details", input.details.clone()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(AuditLogEntry {
            id,
            timestamp: input.timestamp,
            user_id: input.user_id,
            user_email: input.user_email,
            tenant_id: input.tenant_id,
            action: input.action,
            category: input.category,
            entity_type: input.entity_type,
            entity_id: input.entity_id,
            ip_address: input.ip_address,
            user_agent: input.user_agent,
            details: input.details,
        })
    }

    async fn list(
        &self,
        scope: &DataScope,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> ClinicResult<PaginatedResult<AuditLogEntry>> {
        let total = apply_filter(ScopedQuery::count(AUDIT_LOGS), filter.clone())
            .scoped(scope)
            .fetch_count(&self.db)
            .await?;

        let rows: Vec<AuditLogRow> = apply_filter(ScopedQuery::select(AUDIT_LOGS), filter)
            .scoped(scope)
            .order_by("timestamp DESC")
            .paginate(&pagination)
            .fetch(&self.db)
            .await?;

        Ok(PaginatedResult {
            items: into_entries(rows)?,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn stats(
        &self,
        scope: &DataScope,
        since: DateTime<Utc>,
        critical_limit: u64,
    ) -> ClinicResult<AuditStats> {
        let total = ScopedQuery::count(AUDIT_LOGS)
            .scoped(scope)
            .fetch_count(&self.db)
            .await?;

        let since_filter = |action: &str| AuditLogFilter {
            action: Some(action.to_string()),
            start_date: Some(since),
            ..Default::default()
        };
        let logins_today = apply_filter(ScopedQuery::count(AUDIT_LOGS), since_filter("login_success"))
            .scoped(scope)
            .fetch_count(&self.db)
            .await?;
        let login_failures_today =
            apply_filter(ScopedQuery::count(AUDIT_LOGS), since_filter("login_failure"))
                .scoped(scope)
                .fetch_count(&self.db)
                .await?;

        let mut by_category = Vec::with_capacity(AuditCategory::ALL.len());
        for category in AuditCategory::ALL {
            let count = ScopedQuery::count(AUDIT_LOGS)
                .filter("category = $category", "category", category.as_str())
                .scoped(scope)
                .fetch_count(&self.db)
                .await?;
            by_category.push(CategoryCount {
                category: category.as_str().to_string(),
                total: count,
            });
        }

        let rows: Vec<AuditLogRow> = ScopedQuery::select(AUDIT_LOGS)
            .filter(
                "category = $category",
                "category",
                AuditCategory::Security.as_str(),
            )
            .scoped(scope)
            .order_by("timestamp DESC")
            .paginate(&Pagination {
                offset: 0,
                limit: critical_limit,
            })
            .fetch(&self.db)
            .await?;

        Ok(AuditStats {
            total,
            logins_today,
            login_failures_today,
            by_category,
            recent_critical: into_entries(rows)?,
        })
    }
}
