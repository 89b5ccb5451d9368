//! `/api/v1/patients`: the tenant-owned patient register.
//!
//! All reads go through the caller's [`DataScope`]: staff see their
//! tenant, a patient principal sees only the record linked to it. A
//! record outside the scope is reported as not found.
//!
//! [`DataScope`]: clinic_core::scope::DataScope

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use clinic_audit::AuditEvent;
use clinic_auth::Capability;
use clinic_auth::capability::capabilities_for;
use clinic_core::error::{ClinicError, FieldError};
use clinic_core::models::audit::AuditAction;
use clinic_core::models::patient::{CreatePatient, Patient};
use clinic_core::repository::{MembershipRepository, PaginatedResult, PatientRepository};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, ApiQuery, Authenticated, Client, PageParams};
use crate::state::AppState;

use super::actor;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_patients).post(create_patient))
        .route("/{patient_id}", get(get_patient))
}

fn validate(input: &CreatePatient) -> Result<(), ClinicError> {
    let mut errors = Vec::new();
    if input.first_name.trim().is_empty() {
        errors.push(FieldError::new("first_name", "must not be empty"));
    }
    if input.last_name.trim().is_empty() {
        errors.push(FieldError::new("last_name", "must not be empty"));
    }
    if let Some(email) = &input.email
        && !email.contains('@')
    {
        errors.push(FieldError::new("email", "must be an email address"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ClinicError::Validation { errors })
    }
}

async fn create_patient(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Client(client): Client,
    ApiJson(input): ApiJson<CreatePatient>,
) -> ApiResult<(StatusCode, Json<Patient>)> {
    ctx.require(Capability::PatientRecordsWrite)?;
    let tenant_id = ctx
        .scope()?
        .tenant_id()
        .ok_or_else(|| ClinicError::forbidden("no active tenant"))?;
    validate(&input)?;

    // A linked principal must hold patient self-service in this tenant.
    if let Some(user_id) = input.user_id {
        let linked = match state.memberships.get(user_id, tenant_id).await {
            Ok(m) => {
                m.is_active && capabilities_for(m.role).contains(Capability::PatientSelfData)
            }
            Err(ClinicError::NotFound { .. }) => false,
            Err(e) => return Err(e.into()),
        };
        if !linked {
            return Err(
                ClinicError::invalid("user_id", "not a patient member of this tenant").into(),
            );
        }
    }

    let patient = state.patients.create(tenant_id, input).await?;
    state
        .audit
        .record(
            &actor(&ctx, &client),
            AuditEvent::new(AuditAction::PatientCreated).entity("patient", patient.id),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

async fn list_patients(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    ApiQuery(page): ApiQuery<PageParams>,
) -> ApiResult<Json<PaginatedResult<Patient>>> {
    ctx.require(Capability::PatientRecordsRead)?;
    let scope = ctx.scope()?;
    Ok(Json(state.patients.list(&scope, page.pagination()).await?))
}

async fn get_patient(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    ApiPath(patient_id): ApiPath<Uuid>,
) -> ApiResult<Json<Patient>> {
    ctx.require(Capability::PatientRecordsRead)?;
    let scope = ctx.scope()?;
    Ok(Json(state.patients.get_by_id(&scope, patient_id).await?))
}
