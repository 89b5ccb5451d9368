//! Authentication service: login, tenant switching, password flows and
//! impersonation.
//!
//! Every flow that touches credentials or sessions emits its audit record
//! through the shared [`AuditWriter`]; security records are written
//! before the flow returns.

use std::sync::Arc;

use chrono::{Duration, Utc};
use clinic_audit::{AuditActor, AuditEvent, AuditWriter};
use clinic_core::error::{ClinicError, ClinicResult};
use clinic_core::models::audit::AuditAction;
use clinic_core::models::membership::Membership;
use clinic_core::models::password_reset::CreatePasswordReset;
use clinic_core::models::role::Role;
use clinic_core::models::tenant::Tenant;
use clinic_core::models::user::User;
use clinic_core::repository::{
    AuditLogRepository, MembershipRepository, PasswordResetRepository, TenantRepository,
    UserRepository,
};
use serde::Serialize;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::kernel::AuthContext;
use crate::mailer::{MailMessage, Mailer};
use crate::password;
use crate::token::{self, TokenSubject};

/// Request metadata copied into audit records.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Input for the login flow.
#[derive(Debug)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
    pub client: ClientInfo,
}

/// An issued session token.
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutput {
    pub access_token: String,
    /// Always `"bearer"`.
    pub token_type: &'static str,
    /// Token lifetime in seconds.
    pub expires_in: u64,
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug)]
pub struct ChangePasswordInput {
    pub current_password: String,
    pub new_password: String,
}

/// The caller as seen by `GET /auth/me`.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub user: User,
    pub role: Role,
    pub tenant: Option<Tenant>,
    pub capabilities: Vec<&'static str>,
    pub impersonator_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MembershipSummary {
    #[serde(flatten)]
    pub membership: Membership,
    pub tenant_name: String,
    pub tenant_slug: String,
    pub tenant_active: bool,
}

/// Actor snapshot for a principal without a session yet. Only security
/// events are recorded for such actors.
fn principal_actor(user: &User, tenant_id: Option<Uuid>, client: &ClientInfo) -> AuditActor {
    AuditActor {
        user_id: Some(user.id),
        email: Some(user.email.clone()),
        tenant_id,
        can_record: false,
        ..Default::default()
    }
    .with_request(client.ip_address.clone(), client.user_agent.clone())
}

fn invalid_reset_token() -> ClinicError {
    ClinicError::invalid("token", "invalid or expired reset token")
}

/// Authentication service.
///
/// Generic over repository implementations so that the auth layer has
/// no dependency on the database crate.
pub struct AuthService<U, T, M, R, A> {
    users: U,
    tenants: T,
    memberships: M,
    resets: R,
    audit: AuditWriter<A>,
    mailer: Arc<dyn Mailer>,
    config: AuthConfig,
    decoy: OnceCell<String>,
}

impl<U, T, M, R, A> AuthService<U, T, M, R, A>
where
    U: UserRepository,
    T: TenantRepository,
    M: MembershipRepository,
    R: PasswordResetRepository,
    A: AuditLogRepository + 'static,
{
    pub fn new(
        users: U,
        tenants: T,
        memberships: M,
        resets: R,
        audit: AuditWriter<A>,
        mailer: Arc<dyn Mailer>,
        config: AuthConfig,
    ) -> Self {
        Self {
            users,
            tenants,
            memberships,
            resets,
            audit,
            mailer,
            config,
            decoy: OnceCell::new(),
        }
    }

    fn issue(&self, subject: &TokenSubject) -> ClinicResult<LoginOutput> {
        Ok(LoginOutput {
            access_token: token::issue_token(subject, &self.config)?,
            token_type: "bearer",
            expires_in: self.config.access_token_lifetime_secs,
            tenant_id: subject.tenant_id,
        })
    }

    async fn login_failure(&self, actor: AuditActor, reason: &str) -> ClinicResult<()> {
        self.audit
            .record(
                &actor,
                AuditEvent::new(AuditAction::LoginFailure).details(json!({ "reason": reason })),
            )
            .await
    }

    /// Spend one verification on an unknown email so it answers in the
    /// same time as a wrong password.
    async fn verify_decoy(&self, plaintext: String) -> ClinicResult<()> {
        let digest = self
            .decoy
            .get_or_try_init(|| {
                let config = self.config.clone();
                async move {
                    tokio::task::spawn_blocking(move || password::decoy_digest(&config))
                        .await
                        .map_err(|e| AuthError::Crypto(format!("hash task failed: {e}")))?
                }
            })
            .await?;
        password::verify_password_blocking(plaintext, digest.clone()).await?;
        Ok(())
    }

    /// Authenticate with email and password and issue a token for the
    /// principal's default tenant.
    ///
    /// Every attempt produces exactly one `login_success` or
    /// `login_failure` record.
    pub async fn login(&self, input: LoginInput) -> ClinicResult<LoginOutput> {
        let submitted = input.email.trim().to_string();

        let user = match self.users.get_by_email(&submitted).await {
            Ok(user) => user,
            Err(ClinicError::NotFound { .. }) => {
                self.verify_decoy(input.password).await?;
                let actor = AuditActor::anonymous(Some(submitted)).with_request(
                    input.client.ip_address.clone(),
                    input.client.user_agent.clone(),
                );
                self.login_failure(actor, "unknown_email").await?;
                return Err(AuthError::InvalidCredentials.into());
            }
            Err(e) => return Err(e),
        };

        let valid =
            password::verify_password_blocking(input.password.clone(), user.password_hash.clone())
                .await?;
        if !valid {
            self.login_failure(principal_actor(&user, None, &input.client), "invalid_password")
                .await?;
            return Err(AuthError::InvalidCredentials.into());
        }
        if !user.is_active {
            self.login_failure(principal_actor(&user, None, &input.client), "inactive")
                .await?;
            return Err(AuthError::AccountInactive.into());
        }

        if password::needs_rehash(&user.password_hash, &self.config) {
            self.rotate_digest(&user, input.password).await;
        }

        let tenant_id = self.login_tenant(&user).await?;
        let output = self.issue(&TokenSubject {
            principal_id: user.id,
            email: user.email.clone(),
            role: user.role,
            tenant_id,
            impersonator_id: None,
        })?;

        self.audit
            .record(
                &principal_actor(&user, tenant_id, &input.client),
                AuditEvent::new(AuditAction::LoginSuccess),
            )
            .await?;

        info!(principal_id = %user.id, ?tenant_id, "Login succeeded");
        Ok(output)
    }

    async fn rotate_digest(&self, user: &User, plaintext: String) {
        let rotated = match password::hash_password_blocking(plaintext, self.config.clone()).await
        {
            Ok(digest) => self.users.set_password(user.id, digest, false).await,
            Err(e) => Err(e.into()),
        };
        match rotated {
            Ok(()) => debug!(principal_id = %user.id, "Password digest rotated"),
            Err(e) => warn!(principal_id = %user.id, error = %e, "Password digest rotation failed"),
        }
    }

    /// The tenant a fresh login lands in: the default membership if it is
    /// usable, otherwise the oldest usable one.
    async fn login_tenant(&self, user: &User) -> ClinicResult<Option<Uuid>> {
        if user.is_superadmin() {
            return Ok(None);
        }
        let mut candidates: Vec<Membership> = self
            .memberships
            .list_for_user(user.id)
            .await?
            .into_iter()
            .filter(|m| m.is_active)
            .collect();
        candidates.sort_by_key(|m| !m.is_default);

        for membership in candidates {
            let tenant = self.tenants.get_by_id(membership.tenant_id).await?;
            if tenant.is_active {
                return Ok(Some(tenant.id));
            }
        }
        Ok(None)
    }

    /// Active membership in an active tenant, or `Forbidden`.
    async fn usable_membership(&self, user_id: Uuid, tenant_id: Uuid) -> ClinicResult<Membership> {
        let membership = match self.memberships.get(user_id, tenant_id).await {
            Ok(m) => m,
            Err(ClinicError::NotFound { .. }) => {
                return Err(ClinicError::forbidden("no membership in tenant"));
            }
            Err(e) => return Err(e),
        };
        if !membership.is_active {
            return Err(ClinicError::forbidden("membership is inactive"));
        }
        if !self.tenants.get_by_id(tenant_id).await?.is_active {
            return Err(ClinicError::forbidden("tenant is inactive"));
        }
        Ok(membership)
    }

    /// Reissue the caller's token for another tenant.
    pub async fn switch_tenant(
        &self,
        ctx: &AuthContext,
        tenant_id: Uuid,
        client: &ClientInfo,
    ) -> ClinicResult<LoginOutput> {
        if ctx.is_superadmin() {
            self.tenants.get_by_id(tenant_id).await?;
        } else {
            self.usable_membership(ctx.principal_id, tenant_id).await?;
        }

        let output = self.issue(&ctx.token_subject(Some(tenant_id)))?;

        let mut actor =
            ctx.audit_actor(client.ip_address.clone(), client.user_agent.clone());
        actor.tenant_id = Some(tenant_id);
        self.audit
            .record(
                &actor,
                AuditEvent::new(AuditAction::TenantSwitched)
                    .entity("tenant", tenant_id)
                    .details(json!({ "from": ctx.tenant_id })),
            )
            .await?;
        Ok(output)
    }

    /// Tokens are stateless; logout is an audit fact.
    pub async fn logout(&self, ctx: &AuthContext, client: &ClientInfo) -> ClinicResult<()> {
        self.audit
            .record(
                &ctx.audit_actor(client.ip_address.clone(), client.user_agent.clone()),
                AuditEvent::new(AuditAction::Logout),
            )
            .await
    }

    /// Rotate the caller's password. Earlier tokens stop validating, so a
    /// fresh one is returned.
    pub async fn change_password(
        &self,
        ctx: &AuthContext,
        input: ChangePasswordInput,
        client: &ClientInfo,
    ) -> ClinicResult<LoginOutput> {
        if ctx.impersonator_id.is_some() {
            return Err(ClinicError::forbidden(
                "password changes are not allowed while impersonating",
            ));
        }
        password::check_policy(&input.new_password, &self.config)?;

        let user = self.users.get_by_id(ctx.principal_id).await?;
        let valid =
            password::verify_password_blocking(input.current_password, user.password_hash.clone())
                .await?;
        if !valid {
            return Err(ClinicError::invalid(
                "current_password",
                "current password is incorrect",
            ));
        }

        let digest =
            password::hash_password_blocking(input.new_password, self.config.clone()).await?;
        self.users.set_password(user.id, digest, true).await?;

        self.audit
            .record_or_revert(
                &ctx.audit_actor(client.ip_address.clone(), client.user_agent.clone()),
                AuditEvent::new(AuditAction::PasswordChanged).entity("user", user.id),
                || {
                    self.users.restore_credentials(
                        user.id,
                        user.password_hash.clone(),
                        user.tokens_invalidated_after,
                    )
                },
            )
            .await?;

        info!(principal_id = %user.id, "Password changed");
        self.issue(&ctx.token_subject(ctx.tenant_id))
    }

    /// Start a reset. Unknown or inactive emails succeed silently.
    pub async fn request_password_reset(
        &self,
        email: &str,
        client: &ClientInfo,
    ) -> ClinicResult<()> {
        let user = match self.users.get_by_email(email).await {
            Ok(user) if user.is_active => user,
            Ok(_) | Err(ClinicError::NotFound { .. }) => {
                debug!("Password reset requested for unknown or inactive principal");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let raw = token::generate_reset_token();
        let lifetime = self.config.password_reset_lifetime_secs;
        let reset = self
            .resets
            .create(CreatePasswordReset {
                user_id: user.id,
                token_hash: token::hash_reset_token(&raw),
                expires_at: Utc::now() + Duration::seconds(lifetime as i64),
            })
            .await?;

        self.audit
            .record_or_revert(
                &principal_actor(&user, None, client),
                AuditEvent::new(AuditAction::PasswordResetRequested)
                    .entity("password_reset", reset.id),
                || self.resets.delete(reset.id),
            )
            .await?;

        if let Err(e) = self
            .mailer
            .send(MailMessage::password_reset(&user.email, &raw, lifetime / 60))
            .await
        {
            warn!(principal_id = %user.id, error = %e, "Password reset mail not delivered");
        }
        Ok(())
    }

    /// Consume a reset token and set a new password.
    pub async fn confirm_password_reset(
        &self,
        raw_token: &str,
        new_password: String,
        client: &ClientInfo,
    ) -> ClinicResult<()> {
        password::check_policy(&new_password, &self.config)?;

        let reset = match self
            .resets
            .get_by_token_hash(&token::hash_reset_token(raw_token))
            .await
        {
            Ok(reset) => reset,
            Err(ClinicError::NotFound { .. }) => return Err(invalid_reset_token()),
            Err(e) => return Err(e),
        };
        if reset.used_at.is_some() || reset.expires_at <= Utc::now() {
            return Err(invalid_reset_token());
        }
        let user = self.users.get_by_id(reset.user_id).await?;
        match self.resets.mark_used(reset.id).await {
            Ok(()) => {}
            Err(ClinicError::Conflict { .. }) => return Err(invalid_reset_token()),
            Err(e) => return Err(e),
        }

        let digest = password::hash_password_blocking(new_password, self.config.clone()).await?;
        self.users.set_password(user.id, digest, true).await?;

        self.audit
            .record_or_revert(
                &principal_actor(&user, None, client),
                AuditEvent::new(AuditAction::PasswordResetCompleted)
                    .entity("password_reset", reset.id),
                || async {
                    self.users
                        .restore_credentials(
                            user.id,
                            user.password_hash.clone(),
                            user.tokens_invalidated_after,
                        )
                        .await?;
                    self.resets.release(reset.id).await
                },
            )
            .await?;

        info!(principal_id = %user.id, "Password reset completed");
        Ok(())
    }

    /// Issue a token acting as `target_id`, carrying the caller as the
    /// impersonator. Super-administrators only; no nesting.
    pub async fn impersonate(
        &self,
        ctx: &AuthContext,
        target_id: Uuid,
        tenant_id: Option<Uuid>,
        client: &ClientInfo,
    ) -> ClinicResult<LoginOutput> {
        ctx.require(crate::capability::Capability::Impersonate)?;
        if ctx.impersonator_id.is_some() {
            return Err(ClinicError::forbidden("already impersonating"));
        }

        let target = self.users.get_by_id(target_id).await?;
        if target.is_superadmin() {
            return Err(ClinicError::forbidden("cannot impersonate a superadmin"));
        }
        if !target.is_active {
            return Err(ClinicError::forbidden("target principal is inactive"));
        }

        let tenant_id = match tenant_id {
            Some(t) => Some(self.usable_membership(target.id, t).await?.tenant_id),
            None => self.login_tenant(&target).await?,
        };

        let output = self.issue(&TokenSubject {
            principal_id: target.id,
            email: target.email.clone(),
            role: target.role,
            tenant_id,
            impersonator_id: Some(ctx.principal_id),
        })?;

        self.audit
            .record(
                &ctx.audit_actor(client.ip_address.clone(), client.user_agent.clone()),
                AuditEvent::new(AuditAction::ImpersonationStarted)
                    .entity("user", target.id)
                    .details(json!({ "target_email": target.email, "tenant_id": tenant_id })),
            )
            .await?;

        info!(impersonator = %ctx.principal_id, target = %target.id, "Impersonation started");
        Ok(output)
    }

    /// Return to the impersonating super-administrator's own session.
    pub async fn end_impersonation(
        &self,
        ctx: &AuthContext,
        client: &ClientInfo,
    ) -> ClinicResult<LoginOutput> {
        let admin_id = ctx
            .impersonator_id
            .ok_or_else(|| ClinicError::invalid("token", "not an impersonation session"))?;
        let admin = self.users.get_by_id(admin_id).await?;

        let output = self.issue(&TokenSubject {
            principal_id: admin.id,
            email: admin.email.clone(),
            role: admin.role,
            tenant_id: None,
            impersonator_id: None,
        })?;

        self.audit
            .record(
                &principal_actor(&admin, None, client),
                AuditEvent::new(AuditAction::ImpersonationEnded).entity("user", ctx.principal_id),
            )
            .await?;
        Ok(output)
    }

    /// Make `tenant_id` the caller's default tenant.
    pub async fn set_default_tenant(
        &self,
        ctx: &AuthContext,
        tenant_id: Uuid,
        client: &ClientInfo,
    ) -> ClinicResult<()> {
        self.memberships
            .set_default(ctx.principal_id, tenant_id)
            .await?;
        self.audit
            .record(
                &ctx.audit_actor(client.ip_address.clone(), client.user_agent.clone()),
                AuditEvent::new(AuditAction::DefaultTenantChanged).entity("tenant", tenant_id),
            )
            .await
    }

    pub async fn me(&self, ctx: &AuthContext) -> ClinicResult<Profile> {
        let user = self.users.get_by_id(ctx.principal_id).await?;
        let tenant = match ctx.tenant_id {
            Some(id) => Some(self.tenants.get_by_id(id).await?),
            None => None,
        };
        Ok(Profile {
            user,
            role: ctx.role,
            tenant,
            capabilities: ctx.capabilities().iter().map(|c| c.as_str()).collect(),
            impersonator_id: ctx.impersonator_id,
        })
    }

    pub async fn memberships(&self, ctx: &AuthContext) -> ClinicResult<Vec<MembershipSummary>> {
        let memberships = self.memberships.list_for_user(ctx.principal_id).await?;
        let mut summaries = Vec::with_capacity(memberships.len());
        for membership in memberships {
            let tenant = self.tenants.get_by_id(membership.tenant_id).await?;
            summaries.push(MembershipSummary {
                membership,
                tenant_name: tenant.name,
                tenant_slug: tenant.slug,
                tenant_active: tenant.is_active,
            });
        }
        Ok(summaries)
    }
}
