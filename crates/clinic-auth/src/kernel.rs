//! Authorization kernel.
//!
//! Every authenticated request passes through [`Authorizer::authenticate`],
//! which turns a bearer token into an [`AuthContext`]: principal, active
//! tenant, effective role and capability set. Handlers consult the
//! context through `can`/`require` and obtain the [`DataScope`] for data
//! access through `scope`/`scope_for_tenant`. The context is passed
//! explicitly; there is no ambient identity.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use clinic_audit::AuditActor;
use clinic_core::error::{ClinicError, ClinicResult};
use clinic_core::models::role::Role;
use clinic_core::models::user::User;
use clinic_core::repository::{MembershipRepository, TenantRepository, UserRepository};
use clinic_core::scope::DataScope;
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::capability::{Capability, CapabilitySet, capabilities_for};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::token::{self, TokenSubject};

/// The authenticated request context.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub principal_id: Uuid,
    pub email: String,
    pub tenant_id: Option<Uuid>,
    /// Effective role: `superadmin` for super-administrators, the
    /// membership role otherwise.
    pub role: Role,
    /// Role stored on the principal, carried into reissued tokens.
    pub global_role: Role,
    /// Set while a super-administrator acts as this principal.
    pub impersonator_id: Option<Uuid>,
    capabilities: CapabilitySet,
}

impl AuthContext {
    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn require(&self, capability: Capability) -> ClinicResult<()> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(ClinicError::forbidden(format!(
                "missing capability: {capability}"
            )))
        }
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    pub fn is_superadmin(&self) -> bool {
        self.role == Role::Superadmin
    }

    /// Scope for queries over tenant-owned tables.
    pub fn scope(&self) -> ClinicResult<DataScope> {
        match (self.role, self.tenant_id) {
            (Role::Superadmin, None) => Ok(DataScope::Global),
            (Role::Patient, Some(tenant_id)) => Ok(DataScope::Patient {
                tenant_id,
                principal_id: self.principal_id,
            }),
            (_, Some(tenant_id)) => Ok(DataScope::Tenant { tenant_id }),
            (_, None) => Err(ClinicError::forbidden("no active tenant")),
        }
    }

    /// Scope for a tenant named by a path parameter. Super-administrators
    /// may address any tenant; everyone else only their active one.
    pub fn scope_for_tenant(&self, tenant_id: Uuid) -> ClinicResult<DataScope> {
        if self.is_superadmin() {
            return Ok(DataScope::Tenant { tenant_id });
        }
        if self.tenant_id == Some(tenant_id) {
            return self.scope();
        }
        Err(ClinicError::forbidden("tenant mismatch"))
    }

    /// Snapshot of this principal for the audit writer.
    pub fn audit_actor(&self, ip_address: Option<String>, user_agent: Option<String>) -> AuditActor {
        AuditActor {
            user_id: Some(self.principal_id),
            email: Some(self.email.clone()),
            tenant_id: self.tenant_id,
            ip_address,
            user_agent,
            can_record: self.can(Capability::AuditWrite),
        }
    }

    pub(crate) fn token_subject(&self, tenant_id: Option<Uuid>) -> TokenSubject {
        TokenSubject {
            principal_id: self.principal_id,
            email: self.email.clone(),
            role: self.global_role,
            tenant_id,
            impersonator_id: self.impersonator_id,
        }
    }
}

const COALESCER_PRUNE_THRESHOLD: usize = 10_000;

/// Limits `last_access_at` writes to one per interval per membership.
#[derive(Debug)]
pub struct AccessCoalescer {
    interval: Duration,
    last: Mutex<HashMap<(Uuid, Uuid), Instant>>,
}

impl AccessCoalescer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(HashMap::new()),
        }
    }

    pub fn should_touch(&self, user_id: Uuid, tenant_id: Uuid) -> bool {
        self.should_touch_at(user_id, tenant_id, Instant::now())
    }

    fn should_touch_at(&self, user_id: Uuid, tenant_id: Uuid, now: Instant) -> bool {
        let mut last = self.last.lock();
        if let Some(prev) = last.get(&(user_id, tenant_id))
            && now.saturating_duration_since(*prev) < self.interval
        {
            return false;
        }
        if last.len() >= COALESCER_PRUNE_THRESHOLD {
            let interval = self.interval;
            last.retain(|_, at| now.saturating_duration_since(*at) < interval);
        }
        last.insert((user_id, tenant_id), now);
        true
    }
}

/// Turns bearer tokens into [`AuthContext`]s.
pub struct Authorizer<U, T, M> {
    users: U,
    tenants: T,
    memberships: M,
    config: AuthConfig,
    access: AccessCoalescer,
}

impl<U, T, M> Authorizer<U, T, M>
where
    U: UserRepository,
    T: TenantRepository,
    M: MembershipRepository,
{
    pub fn new(users: U, tenants: T, memberships: M, config: AuthConfig) -> Self {
        let access = AccessCoalescer::new(Duration::from_secs(config.last_access_interval_secs));
        Self {
            users,
            tenants,
            memberships,
            config,
            access,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Authenticate `bearer` and resolve the request context.
    ///
    /// Token, principal and revocation problems are `Unauthenticated`;
    /// tenant problems are `Forbidden`.
    pub async fn authenticate(&self, bearer: Option<&str>) -> ClinicResult<AuthContext> {
        let raw = bearer
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ClinicError::unauthenticated("missing bearer token"))?;
        let claims = token::decode_token(raw, &self.config)?;

        let user = self.load_principal(claims.principal_id()?).await?;
        if let Some(cutoff) = user.tokens_invalidated_after
            && claims.iat < cutoff.timestamp()
        {
            return Err(AuthError::TokenRevoked.into());
        }

        let impersonator_id = claims.impersonator()?;
        if let Some(impersonator) = impersonator_id {
            let admin = self.load_principal(impersonator).await?;
            if !admin.is_superadmin() {
                return Err(ClinicError::unauthenticated("impersonator is not a superadmin"));
            }
        }

        let tenant_id = claims.active_tenant()?;
        let role = self.resolve_role(&user, tenant_id).await?;

        debug!(principal_id = %user.id, ?tenant_id, %role, "Request authenticated");
        Ok(AuthContext {
            principal_id: user.id,
            email: user.email,
            tenant_id,
            role,
            global_role: user.role,
            impersonator_id,
            capabilities: capabilities_for(role),
        })
    }

    async fn load_principal(&self, id: Uuid) -> ClinicResult<User> {
        let user = match self.users.get_by_id(id).await {
            Ok(user) => user,
            Err(ClinicError::NotFound { .. }) => {
                return Err(ClinicError::unauthenticated("unknown principal"));
            }
            Err(e) => return Err(e),
        };
        if !user.is_active {
            return Err(AuthError::AccountInactive.into());
        }
        Ok(user)
    }

    /// Check the active tenant and compute the effective role.
    async fn resolve_role(&self, user: &User, tenant_id: Option<Uuid>) -> ClinicResult<Role> {
        if user.is_superadmin() {
            if let Some(tenant_id) = tenant_id {
                match self.tenants.get_by_id(tenant_id).await {
                    Ok(_) => {}
                    Err(ClinicError::NotFound { .. }) => {
                        return Err(ClinicError::forbidden("unknown tenant"));
                    }
                    Err(e) => return Err(e),
                }
            }
            return Ok(Role::Superadmin);
        }

        let tenant_id = tenant_id.ok_or_else(|| ClinicError::forbidden("no active tenant"))?;
        let membership = match self.memberships.get(user.id, tenant_id).await {
            Ok(m) => m,
            Err(ClinicError::NotFound { .. }) => {
                return Err(ClinicError::forbidden("no membership in tenant"));
            }
            Err(e) => return Err(e),
        };
        if !membership.is_active {
            return Err(ClinicError::forbidden("membership is inactive"));
        }
        let tenant = self.tenants.get_by_id(tenant_id).await?;
        if !tenant.is_active {
            return Err(ClinicError::forbidden("tenant is inactive"));
        }

        if self.access.should_touch(user.id, tenant_id)
            && let Err(e) = self
                .memberships
                .touch_last_access(user.id, tenant_id, Utc::now())
                .await
        {
            warn!(principal_id = %user.id, %tenant_id, error = %e, "Failed to record last access");
        }

        Ok(membership.role)
    }
}
