//! Platform-wide settings: `/api/v1/plans` and `/api/v1/system-config`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use clinic_audit::AuditEvent;
use clinic_auth::Capability;
use clinic_core::error::{ClinicError, FieldError};
use clinic_core::models::audit::AuditAction;
use clinic_core::models::plan::{CreatePlan, Plan};
use clinic_core::models::system_config::{SystemConfig, UpsertSystemConfig};
use clinic_core::models::tenant::is_valid_slug;
use clinic_core::repository::{PlanRepository, SystemConfigRepository};
use serde_json::json;

use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, Authenticated, Client};
use crate::state::AppState;

use super::actor;

pub fn plans_router() -> Router<AppState> {
    Router::new().route("/", get(list_plans).post(create_plan))
}

pub fn system_config_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_config))
        .route("/{key}", put(upsert_config))
}

async fn list_plans(
    State(state): State<AppState>,
    Authenticated(_ctx): Authenticated,
) -> ApiResult<Json<Vec<Plan>>> {
    Ok(Json(state.plans.list().await?))
}

fn validate_plan(input: &CreatePlan) -> Result<(), ClinicError> {
    let mut errors = Vec::new();
    if input.name.trim().is_empty() {
        errors.push(FieldError::new("name", "must not be empty"));
    }
    if !is_valid_slug(&input.slug) {
        errors.push(FieldError::new(
            "slug",
            "must be lowercase alphanumerics separated by single hyphens",
        ));
    }
    if input.price_monthly < 0.0 || input.price_yearly < 0.0 {
        errors.push(FieldError::new("price_monthly", "prices must not be negative"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ClinicError::Validation { errors })
    }
}

async fn create_plan(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Client(client): Client,
    ApiJson(input): ApiJson<CreatePlan>,
) -> ApiResult<(StatusCode, Json<Plan>)> {
    ctx.require(Capability::ManagePlatform)?;
    validate_plan(&input)?;
    let plan = state.plans.create(input).await?;
    state
        .audit
        .record(
            &actor(&ctx, &client),
            AuditEvent::new(AuditAction::PlanCreated)
                .entity("plan", plan.id)
                .details(json!({ "slug": plan.slug, "is_default": plan.is_default })),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

async fn list_config(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
) -> ApiResult<Json<Vec<SystemConfig>>> {
    ctx.require(Capability::ManagePlatform)?;
    Ok(Json(state.system_config.list().await?))
}

async fn upsert_config(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Client(client): Client,
    ApiPath(key): ApiPath<String>,
    ApiJson(input): ApiJson<UpsertSystemConfig>,
) -> ApiResult<Json<SystemConfig>> {
    ctx.require(Capability::ManagePlatform)?;
    let previous = match state.system_config.get(&key).await {
        Ok(entry) => Some(entry),
        Err(ClinicError::NotFound { .. }) => None,
        Err(e) => return Err(e.into()),
    };
    let entry = state.system_config.upsert(&key, input).await?;
    // Values may be secrets; only the key and type are recorded.
    state
        .audit
        .record_or_revert(
            &actor(&ctx, &client),
            AuditEvent::new(AuditAction::SystemConfigChanged)
                .entity("system_config", &entry.key)
                .details(json!({ "value_type": entry.value_type, "category": entry.category })),
            || async {
                match previous {
                    Some(old) => state
                        .system_config
                        .upsert(
                            &key,
                            UpsertSystemConfig {
                                value: old.value,
                                value_type: old.value_type,
                                category: old.category,
                                description: old.description,
                            },
                        )
                        .await
                        .map(drop),
                    None => state.system_config.delete(&key).await,
                }
            },
        )
        .await?;
    Ok(Json(entry))
}
