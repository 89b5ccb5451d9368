//! `/api/v1/audit-logs`: read-only views over the audit trail.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, NaiveTime, Utc};
use clinic_auth::Capability;
use clinic_core::error::ClinicError;
use clinic_core::models::audit::{AuditCategory, AuditLogEntry, AuditStats};
use clinic_core::repository::{AuditLogFilter, AuditLogRepository, PaginatedResult};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::extract::{ApiQuery, Authenticated, PageParams};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/stats", get(stats))
}

// Kept flat: serde_urlencoded cannot parse numbers through `flatten`.
#[derive(Debug, Default, Deserialize)]
struct AuditQuery {
    action: Option<String>,
    category: Option<String>,
    user_id: Option<Uuid>,
    tenant_id: Option<Uuid>,
    entity_type: Option<String>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    offset: Option<u64>,
    limit: Option<u64>,
}

impl AuditQuery {
    fn filter(&self) -> Result<AuditLogFilter, ClinicError> {
        let category = match &self.category {
            Some(raw) => Some(
                AuditCategory::parse(&raw.to_ascii_lowercase())
                    .ok_or_else(|| ClinicError::invalid("category", "unknown audit category"))?
                    .as_str()
                    .to_string(),
            ),
            None => None,
        };
        if let (Some(start), Some(end)) = (self.start_date, self.end_date)
            && start > end
        {
            return Err(ClinicError::invalid("start_date", "must not be after end_date"));
        }
        Ok(AuditLogFilter {
            action: self.action.clone(),
            category,
            user_id: self.user_id,
            tenant_id: self.tenant_id,
            entity_type: self.entity_type.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
        })
    }
}

async fn list(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    ApiQuery(query): ApiQuery<AuditQuery>,
) -> ApiResult<Json<PaginatedResult<AuditLogEntry>>> {
    ctx.require(Capability::AuditRead)?;
    let scope = ctx.scope()?;
    let filter = query.filter()?;
    let page = PageParams {
        offset: query.offset,
        limit: query.limit,
    }
    .pagination();

    let result = state
        .audit
        .repository()
        .list(&scope, filter, page)
        .await?;
    Ok(Json(result))
}

async fn stats(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
) -> ApiResult<Json<AuditStats>> {
    ctx.require(Capability::AuditRead)?;
    let scope = ctx.scope()?;
    let midnight = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();

    let stats = state
        .audit
        .repository()
        .stats(&scope, midnight, state.audit.config().critical_entries)
        .await?;
    Ok(Json(stats))
}
