//! `/api/v1/tenants`: tenant registry and per-tenant user administration.
//!
//! Tenant-scoped paths take the tenant from the URL, never from the
//! token: a super-administrator may address any tenant, everyone else
//! only the active one.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use clinic_audit::AuditEvent;
use clinic_auth::provisioning::{InviteOutcome, OnboardingOutcome};
use clinic_auth::{Capability, NewMember};
use clinic_core::models::audit::AuditAction;
use clinic_core::models::membership::Membership;
use clinic_core::models::role::Role;
use clinic_core::models::tenant::{CreateTenant, Tenant, UpdateTenant};
use clinic_core::repository::{PaginatedResult, TenantMember, TenantRepository};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, ApiQuery, Authenticated, Client, PageParams};
use crate::state::AppState;

use super::actor;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tenants).post(create_tenant))
        .route("/{tenant_id}", get(get_tenant).patch(update_tenant))
        .route("/{tenant_id}/deactivate", post(deactivate_tenant))
        .route("/{tenant_id}/users", get(list_users).post(invite_user))
        .route(
            "/{tenant_id}/users/{user_id}",
            patch(change_user_role).delete(deactivate_user),
        )
}

async fn list_tenants(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    ApiQuery(page): ApiQuery<PageParams>,
) -> ApiResult<Json<PaginatedResult<Tenant>>> {
    ctx.require(Capability::ManageTenants)?;
    Ok(Json(state.tenants.list(page.pagination()).await?))
}

#[derive(Deserialize)]
struct CreateTenantBody {
    #[serde(flatten)]
    tenant: CreateTenant,
    admin_email: String,
    admin_first_name: String,
    admin_last_name: String,
    admin_phone: Option<String>,
}

async fn create_tenant(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Client(client): Client,
    ApiJson(body): ApiJson<CreateTenantBody>,
) -> ApiResult<(StatusCode, Json<OnboardingOutcome>)> {
    ctx.require(Capability::ManageTenants)?;
    let outcome = state
        .provisioning
        .onboard_tenant(
            &actor(&ctx, &client),
            body.tenant,
            NewMember {
                email: body.admin_email,
                first_name: body.admin_first_name,
                last_name: body.admin_last_name,
                phone: body.admin_phone,
                role: Role::TenantAdmin,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn get_tenant(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    ApiPath(tenant_id): ApiPath<Uuid>,
) -> ApiResult<Json<Tenant>> {
    ctx.scope_for_tenant(tenant_id)?;
    Ok(Json(state.tenants.get_by_id(tenant_id).await?))
}

async fn update_tenant(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Client(client): Client,
    ApiPath(tenant_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<UpdateTenant>,
) -> ApiResult<Json<Tenant>> {
    // Tenant administrators may edit their own tenant's profile, but the
    // subscription plan stays with the platform.
    if !ctx.can(Capability::ManageTenants) {
        ctx.require(Capability::ManageUsers)?;
        ctx.scope_for_tenant(tenant_id)?;
    }
    if body.plan.is_some() {
        ctx.require(Capability::ManagePlatform)?;
    }
    let tenant = state.tenants.update(tenant_id, body).await?;

    let mut actor = actor(&ctx, &client);
    actor.tenant_id = Some(tenant.id);
    state
        .audit
        .record(
            &actor,
            AuditEvent::new(AuditAction::TenantUpdated)
                .entity("tenant", tenant.id)
                .details(json!({ "slug": tenant.slug })),
        )
        .await?;
    Ok(Json(tenant))
}

async fn deactivate_tenant(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Client(client): Client,
    ApiPath(tenant_id): ApiPath<Uuid>,
) -> ApiResult<Json<Tenant>> {
    ctx.require(Capability::ManageTenants)?;
    let previous = state.tenants.get_by_id(tenant_id).await?;
    let tenant = state.tenants.set_active(tenant_id, false).await?;

    let mut actor = actor(&ctx, &client);
    actor.tenant_id = Some(tenant.id);
    state
        .audit
        .record_or_revert(
            &actor,
            AuditEvent::new(AuditAction::TenantDeactivated).entity("tenant", tenant.id),
            || async {
                state
                    .tenants
                    .set_active(tenant_id, previous.is_active)
                    .await
                    .map(drop)
            },
        )
        .await?;
    Ok(Json(tenant))
}

async fn list_users(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    ApiPath(tenant_id): ApiPath<Uuid>,
    ApiQuery(page): ApiQuery<PageParams>,
) -> ApiResult<Json<PaginatedResult<TenantMember>>> {
    let members = state
        .provisioning
        .list_members(&ctx, tenant_id, page.pagination())
        .await?;
    Ok(Json(members))
}

#[derive(Deserialize)]
struct InviteBody {
    email: String,
    first_name: String,
    last_name: String,
    phone: Option<String>,
    role: Role,
}

async fn invite_user(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Client(client): Client,
    ApiPath(tenant_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<InviteBody>,
) -> ApiResult<(StatusCode, Json<InviteOutcome>)> {
    let outcome = state
        .provisioning
        .invite_member(
            &ctx,
            tenant_id,
            NewMember {
                email: body.email,
                first_name: body.first_name,
                last_name: body.last_name,
                phone: body.phone,
                role: body.role,
            },
            &client,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

#[derive(Deserialize)]
struct RoleBody {
    role: Role,
}

async fn change_user_role(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Client(client): Client,
    ApiPath((tenant_id, user_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(body): ApiJson<RoleBody>,
) -> ApiResult<Json<Membership>> {
    let membership = state
        .provisioning
        .change_member_role(&ctx, tenant_id, user_id, body.role, &client)
        .await?;
    Ok(Json(membership))
}

async fn deactivate_user(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Client(client): Client,
    ApiPath((tenant_id, user_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    state
        .provisioning
        .deactivate_member(&ctx, tenant_id, user_id, &client)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
