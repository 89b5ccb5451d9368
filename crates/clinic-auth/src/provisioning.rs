//! Provisioning: super-administrator bootstrap, tenant onboarding and
//! tenant member administration.
//!
//! Generated passwords reach their owner only through the [`Mailer`]; a
//! failed delivery never undoes the provisioning, it is reported as
//! `welcome_email_sent = false`.

use std::sync::Arc;

use clinic_audit::{AuditActor, AuditEvent, AuditWriter};
use clinic_core::error::{ClinicError, ClinicResult};
use clinic_core::models::audit::AuditAction;
use clinic_core::models::membership::{CreateMembership, Membership};
use clinic_core::models::role::Role;
use clinic_core::models::tenant::{CreateTenant, Tenant};
use clinic_core::models::user::{CreateUser, User};
use clinic_core::repository::{
    AuditLogRepository, MembershipRepository, PaginatedResult, Pagination, TenantAdminSeed,
    TenantMember, TenantRepository, UserRepository,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::capability::Capability;
use crate::config::AuthConfig;
use crate::kernel::AuthContext;
use crate::mailer::{MailMessage, Mailer};
use crate::password;
use crate::service::ClientInfo;
use crate::token;

const GENERATED_PASSWORD_LEN: usize = 16;

#[derive(Debug)]
pub enum SuperadminOutcome {
    Created(User),
    /// A principal with that email already exists; nothing was changed.
    AlreadyExists,
}

#[derive(Debug, Clone)]
pub struct SuperadminInput {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// A principal to attach to a tenant.
#[derive(Debug, Clone)]
pub struct NewMember {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct OnboardingOutcome {
    pub tenant: Tenant,
    pub admin: User,
    pub membership: Membership,
    pub admin_created: bool,
    pub welcome_email_sent: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InviteOutcome {
    pub member: TenantMember,
    pub user_created: bool,
    pub welcome_email_sent: bool,
}

pub struct Provisioning<U, T, M, A> {
    users: U,
    tenants: T,
    memberships: M,
    audit: AuditWriter<A>,
    mailer: Arc<dyn Mailer>,
    config: AuthConfig,
}

impl<U, T, M, A> Provisioning<U, T, M, A>
where
    U: UserRepository,
    T: TenantRepository,
    M: MembershipRepository,
    A: AuditLogRepository + 'static,
{
    pub fn new(
        users: U,
        tenants: T,
        memberships: M,
        audit: AuditWriter<A>,
        mailer: Arc<dyn Mailer>,
        config: AuthConfig,
    ) -> Self {
        Self {
            users,
            tenants,
            memberships,
            audit,
            mailer,
            config,
        }
    }

    async fn deliver(&self, message: MailMessage) -> bool {
        let to = message.to.clone();
        match self.mailer.send(message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%to, error = %e, "Welcome mail not delivered");
                false
            }
        }
    }

    /// Create the super-administrator unless a principal with that email
    /// already exists.
    pub async fn create_superadmin(&self, input: SuperadminInput) -> ClinicResult<SuperadminOutcome> {
        if !input.email.contains('@') {
            return Err(ClinicError::invalid("email", "must be an email address"));
        }
        password::check_policy(&input.password, &self.config)?;

        match self.users.get_by_email(&input.email).await {
            Ok(_) => {
                info!(email = %input.email, "Superadmin bootstrap skipped: principal exists");
                return Ok(SuperadminOutcome::AlreadyExists);
            }
            Err(ClinicError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let digest = password::hash_password_blocking(input.password, self.config.clone()).await?;
        let user = match self
            .users
            .create(CreateUser {
                email: input.email,
                password_hash: digest,
                first_name: input.first_name,
                last_name: input.last_name,
                phone: None,
                locale: None,
                role: Role::Superadmin,
            })
            .await
        {
            Ok(user) => user,
            Err(ClinicError::Conflict { .. }) => return Ok(SuperadminOutcome::AlreadyExists),
            Err(e) => return Err(e),
        };

        self.audit
            .record_or_revert(
                &AuditActor::system(),
                AuditEvent::new(AuditAction::UserCreated)
                    .entity("user", user.id)
                    .details(json!({ "role": Role::Superadmin })),
                || self.users.delete(user.id),
            )
            .await?;

        info!(principal_id = %user.id, "Superadmin created");
        Ok(SuperadminOutcome::Created(user))
    }

    /// Create a tenant with its first administrator in one transaction.
    /// An existing principal only gains the membership. The whole
    /// onboarding is undone when its security records cannot be written.
    pub async fn onboard_tenant(
        &self,
        actor: &AuditActor,
        input: CreateTenant,
        admin: NewMember,
    ) -> ClinicResult<OnboardingOutcome> {
        input.validate()?;
        let generated = token::generate_password(GENERATED_PASSWORD_LEN);
        let digest =
            password::hash_password_blocking(generated.clone(), self.config.clone()).await?;

        let onboarded = self
            .tenants
            .create_with_admin(
                input,
                TenantAdminSeed {
                    email: admin.email,
                    first_name: admin.first_name,
                    last_name: admin.last_name,
                    password_hash: digest,
                    invited_by: actor.user_id,
                },
            )
            .await?;
        let tenant = &onboarded.tenant;

        let mut tenant_actor = actor.clone();
        tenant_actor.tenant_id = Some(tenant.id);
        self.audit
            .record_or_revert(
                &tenant_actor,
                AuditEvent::new(AuditAction::TenantCreated)
                    .entity("tenant", tenant.id)
                    .details(json!({ "slug": tenant.slug })),
                || self.tenants.delete_onboarded(&onboarded),
            )
            .await?;
        if onboarded.admin_created {
            self.audit
                .record_or_revert(
                    &tenant_actor,
                    AuditEvent::new(AuditAction::UserCreated)
                        .entity("user", onboarded.admin.id)
                        .details(json!({ "role": Role::TenantAdmin })),
                    || self.tenants.delete_onboarded(&onboarded),
                )
                .await?;
        }

        let password = onboarded.admin_created.then_some(generated.as_str());
        let welcome_email_sent = self
            .deliver(MailMessage::welcome(&onboarded.admin.email, &tenant.name, password))
            .await;

        info!(tenant_id = %tenant.id, slug = %tenant.slug, "Tenant onboarded");
        Ok(OnboardingOutcome {
            tenant: onboarded.tenant,
            admin: onboarded.admin,
            membership: onboarded.membership,
            admin_created: onboarded.admin_created,
            welcome_email_sent,
        })
    }

    async fn active_tenant(&self, tenant_id: Uuid) -> ClinicResult<Tenant> {
        let tenant = self.tenants.get_by_id(tenant_id).await?;
        if !tenant.is_active {
            return Err(ClinicError::forbidden("tenant is inactive"));
        }
        Ok(tenant)
    }

    pub async fn list_members(
        &self,
        ctx: &AuthContext,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> ClinicResult<PaginatedResult<TenantMember>> {
        ctx.require(Capability::ReadUsers)?;
        let scope = ctx.scope_for_tenant(tenant_id)?;
        self.memberships.list_members(&scope, pagination).await
    }

    /// Add a staff member or patient to a tenant, creating the principal
    /// when the email is new.
    pub async fn invite_member(
        &self,
        ctx: &AuthContext,
        tenant_id: Uuid,
        input: NewMember,
        client: &ClientInfo,
    ) -> ClinicResult<InviteOutcome> {
        ctx.require(Capability::ManageUsers)?;
        ctx.scope_for_tenant(tenant_id)?;
        if !input.role.is_membership_role() {
            return Err(ClinicError::invalid(
                "role",
                "superadmin is a global role and cannot be granted per tenant",
            ));
        }
        let tenant = self.active_tenant(tenant_id).await?;

        let mut generated = None;
        let user = match self.users.get_by_email(&input.email).await {
            Ok(user) if user.is_superadmin() => {
                return Err(ClinicError::invalid(
                    "email",
                    "a superadmin cannot be a tenant member",
                ));
            }
            Ok(user) => user,
            Err(ClinicError::NotFound { .. }) => {
                let password = token::generate_password(GENERATED_PASSWORD_LEN);
                let digest =
                    password::hash_password_blocking(password.clone(), self.config.clone())
                        .await?;
                generated = Some(password);
                self.users
                    .create(CreateUser {
                        email: input.email.clone(),
                        password_hash: digest,
                        first_name: input.first_name,
                        last_name: input.last_name,
                        phone: input.phone,
                        locale: None,
                        role: input.role,
                    })
                    .await?
            }
            Err(e) => return Err(e),
        };

        let has_default = self
            .memberships
            .list_for_user(user.id)
            .await?
            .iter()
            .any(|m| m.is_default);
        let membership = self
            .memberships
            .create(CreateMembership {
                user_id: user.id,
                tenant_id,
                role: input.role,
                is_default: !has_default,
                invited_by: Some(ctx.principal_id),
            })
            .await?;

        let user_created = generated.is_some();
        let user_id = user.id;
        let mut actor = ctx.audit_actor(client.ip_address.clone(), client.user_agent.clone());
        actor.tenant_id = Some(tenant_id);
        self.audit
            .record_or_revert(
                &actor,
                AuditEvent::new(AuditAction::UserCreated)
                    .entity("user", user_id)
                    .details(json!({ "role": input.role, "new_principal": user_created })),
                || async move {
                    self.memberships.delete(tenant_id, user_id).await?;
                    if user_created {
                        self.users.delete(user_id).await?;
                    }
                    Ok(())
                },
            )
            .await?;

        let welcome_email_sent = self
            .deliver(MailMessage::welcome(
                &user.email,
                &tenant.name,
                generated.as_deref(),
            ))
            .await;

        Ok(InviteOutcome {
            member: TenantMember { user, membership },
            user_created,
            welcome_email_sent,
        })
    }

    pub async fn change_member_role(
        &self,
        ctx: &AuthContext,
        tenant_id: Uuid,
        user_id: Uuid,
        role: Role,
        client: &ClientInfo,
    ) -> ClinicResult<Membership> {
        ctx.require(Capability::ManageUsers)?;
        ctx.scope_for_tenant(tenant_id)?;
        if user_id == ctx.principal_id {
            return Err(ClinicError::forbidden("cannot change your own role"));
        }

        let previous = self.memberships.get(user_id, tenant_id).await?;
        let membership = self
            .memberships
            .update_role(tenant_id, user_id, role)
            .await?;

        let mut actor = ctx.audit_actor(client.ip_address.clone(), client.user_agent.clone());
        actor.tenant_id = Some(tenant_id);
        self.audit
            .record_or_revert(
                &actor,
                AuditEvent::new(AuditAction::UserRoleChanged)
                    .entity("user", user_id)
                    .details(json!({ "from": previous.role, "to": role })),
                || async {
                    self.memberships
                        .update_role(tenant_id, user_id, previous.role)
                        .await
                        .map(drop)
                },
            )
            .await?;
        Ok(membership)
    }

    pub async fn deactivate_member(
        &self,
        ctx: &AuthContext,
        tenant_id: Uuid,
        user_id: Uuid,
        client: &ClientInfo,
    ) -> ClinicResult<()> {
        ctx.require(Capability::ManageUsers)?;
        ctx.scope_for_tenant(tenant_id)?;
        if user_id == ctx.principal_id {
            return Err(ClinicError::forbidden("cannot deactivate yourself"));
        }

        let previous = self.memberships.get(user_id, tenant_id).await?;
        self.memberships
            .set_active(tenant_id, user_id, false)
            .await?;

        let mut actor = ctx.audit_actor(client.ip_address.clone(), client.user_agent.clone());
        actor.tenant_id = Some(tenant_id);
        self.audit
            .record_or_revert(
                &actor,
                AuditEvent::new(AuditAction::UserDeactivated).entity("user", user_id),
                || {
                    self.memberships
                        .set_active(tenant_id, user_id, previous.is_active)
                },
            )
            .await
    }
}
