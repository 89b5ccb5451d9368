//! `/api/v1/auth/*`: sessions, passwords, impersonation, memberships.

use axum::{Json, Router};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use clinic_auth::service::{ChangePasswordInput, MembershipSummary, Profile};
use clinic_auth::{LoginInput, LoginOutput};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::extract::{ApiForm, ApiJson, ApiPath, Authenticated, Client};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/switch-tenant", post(switch_tenant))
        .route("/logout", post(logout))
        .route("/change-password", post(change_password))
        .route("/password-reset/request", post(request_password_reset))
        .route("/password-reset/confirm", post(confirm_password_reset))
        .route("/impersonate", post(impersonate))
        .route("/impersonate/end", post(end_impersonation))
        .route("/me", get(me))
        .route("/memberships", get(memberships))
        .route("/memberships/{tenant_id}/default", put(set_default_tenant))
}

/// OAuth2 password-grant style form.
#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    Client(client): Client,
    ApiForm(form): ApiForm<LoginForm>,
) -> ApiResult<Json<LoginOutput>> {
    let output = state
        .auth
        .login(LoginInput {
            email: form.username,
            password: form.password,
            client,
        })
        .await?;
    Ok(Json(output))
}

#[derive(Deserialize)]
struct SwitchTenantBody {
    tenant_id: Uuid,
}

async fn switch_tenant(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Client(client): Client,
    ApiJson(body): ApiJson<SwitchTenantBody>,
) -> ApiResult<Json<LoginOutput>> {
    Ok(Json(state.auth.switch_tenant(&ctx, body.tenant_id, &client).await?))
}

async fn logout(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Client(client): Client,
) -> ApiResult<StatusCode> {
    state.auth.logout(&ctx, &client).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct ChangePasswordBody {
    current_password: String,
    new_password: String,
}

async fn change_password(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Client(client): Client,
    ApiJson(body): ApiJson<ChangePasswordBody>,
) -> ApiResult<Json<LoginOutput>> {
    let output = state
        .auth
        .change_password(
            &ctx,
            ChangePasswordInput {
                current_password: body.current_password,
                new_password: body.new_password,
            },
            &client,
        )
        .await?;
    Ok(Json(output))
}

#[derive(Deserialize)]
struct ResetRequestBody {
    email: String,
}

async fn request_password_reset(
    State(state): State<AppState>,
    Client(client): Client,
    ApiJson(body): ApiJson<ResetRequestBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    state.auth.request_password_reset(&body.email, &client).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "detail": "if the account exists, a reset code has been sent" })),
    ))
}

#[derive(Deserialize)]
struct ResetConfirmBody {
    token: String,
    new_password: String,
}

async fn confirm_password_reset(
    State(state): State<AppState>,
    Client(client): Client,
    ApiJson(body): ApiJson<ResetConfirmBody>,
) -> ApiResult<StatusCode> {
    state
        .auth
        .confirm_password_reset(&body.token, body.new_password, &client)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct ImpersonateBody {
    user_id: Uuid,
    tenant_id: Option<Uuid>,
}

async fn impersonate(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Client(client): Client,
    ApiJson(body): ApiJson<ImpersonateBody>,
) -> ApiResult<Json<LoginOutput>> {
    let output = state
        .auth
        .impersonate(&ctx, body.user_id, body.tenant_id, &client)
        .await?;
    Ok(Json(output))
}

async fn end_impersonation(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Client(client): Client,
) -> ApiResult<Json<LoginOutput>> {
    Ok(Json(state.auth.end_impersonation(&ctx, &client).await?))
}

async fn me(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
) -> ApiResult<Json<Profile>> {
    Ok(Json(state.auth.me(&ctx).await?))
}

async fn memberships(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
) -> ApiResult<Json<Vec<MembershipSummary>>> {
    Ok(Json(state.auth.memberships(&ctx).await?))
}

async fn set_default_tenant(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Client(client): Client,
    ApiPath(tenant_id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    state.auth.set_default_tenant(&ctx, tenant_id, &client).await?;
    Ok(StatusCode::NO_CONTENT)
}
