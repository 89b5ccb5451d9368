//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Reads over tenant-owned tables
//! take a [`DataScope`] instead of a bare tenant id so that the scope
//! produced by the authorization kernel is the only way in.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ClinicResult;
use crate::models::{
    audit::{AuditLogEntry, AuditStats, CreateAuditLogEntry},
    membership::{CreateMembership, Membership},
    password_reset::{CreatePasswordReset, PasswordReset},
    patient::{CreatePatient, Patient},
    plan::{CreatePlan, Plan},
    role::Role,
    system_config::{SystemConfig, UpsertSystemConfig},
    tenant::{CreateTenant, Tenant, UpdateTenant},
    user::{CreateUser, UpdateUser, User},
};
use crate::scope::DataScope;

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Identity store (global scope)
// ---------------------------------------------------------------------------

pub trait UserRepository: Send + Sync {
    fn create(&self, input: CreateUser) -> impl Future<Output = ClinicResult<User>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = ClinicResult<User>> + Send;
    /// Case-insensitive lookup.
    fn get_by_email(&self, email: &str) -> impl Future<Output = ClinicResult<User>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateUser,
    ) -> impl Future<Output = ClinicResult<User>> + Send;
    /// Overwrite the password digest. When `invalidate_tokens` is set,
    /// every token issued before now stops validating.
    fn set_password(
        &self,
        id: Uuid,
        password_hash: String,
        invalidate_tokens: bool,
    ) -> impl Future<Output = ClinicResult<()>> + Send;
    /// Put back a digest and token cutoff read earlier, exactly as they
    /// were.
    fn restore_credentials(
        &self,
        id: Uuid,
        password_hash: String,
        tokens_invalidated_after: Option<DateTime<Utc>>,
    ) -> impl Future<Output = ClinicResult<()>> + Send;
    /// Remove a principal that holds no memberships.
    fn delete(&self, id: Uuid) -> impl Future<Output = ClinicResult<()>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = ClinicResult<PaginatedResult<User>>> + Send;
}

// ---------------------------------------------------------------------------
// Tenant registry (global scope)
// ---------------------------------------------------------------------------

/// First administrator of a tenant being onboarded.
#[derive(Debug, Clone)]
pub struct TenantAdminSeed {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Used only when no principal with `email` exists yet.
    pub password_hash: String,
    pub invited_by: Option<Uuid>,
}

/// Result of an atomic tenant onboarding.
#[derive(Debug, Clone)]
pub struct OnboardedTenant {
    pub tenant: Tenant,
    pub admin: User,
    pub membership: Membership,
    /// `false` when the admin principal already existed and only the
    /// membership was added.
    pub admin_created: bool,
}

pub trait TenantRepository: Send + Sync {
    /// Create the tenant, its admin principal (if new) and the
    /// `tenant_admin` default membership in one transaction.
    fn create_with_admin(
        &self,
        input: CreateTenant,
        admin: TenantAdminSeed,
    ) -> impl Future<Output = ClinicResult<OnboardedTenant>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = ClinicResult<Tenant>> + Send;
    fn get_by_slug(&self, slug: &str) -> impl Future<Output = ClinicResult<Tenant>> + Send;
    /// Slug changes are rejected once the tenant has members.
    fn update(
        &self,
        id: Uuid,
        input: UpdateTenant,
    ) -> impl Future<Output = ClinicResult<Tenant>> + Send;
    fn set_active(
        &self,
        id: Uuid,
        is_active: bool,
    ) -> impl Future<Output = ClinicResult<Tenant>> + Send;
    /// Remove everything `create_with_admin` stored for `onboarded`, in
    /// one transaction. The admin principal is kept unless it was created
    /// by that onboarding.
    fn delete_onboarded(
        &self,
        onboarded: &OnboardedTenant,
    ) -> impl Future<Output = ClinicResult<()>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = ClinicResult<PaginatedResult<Tenant>>> + Send;
}

// ---------------------------------------------------------------------------
// Membership graph
// ---------------------------------------------------------------------------

/// A principal as seen from inside one tenant.
#[derive(Debug, Clone, Serialize)]
pub struct TenantMember {
    pub user: User,
    pub membership: Membership,
}

pub trait MembershipRepository: Send + Sync {
    /// Creating a default membership clears the previous default in the
    /// same transaction.
    fn create(
        &self,
        input: CreateMembership,
    ) -> impl Future<Output = ClinicResult<Membership>> + Send;
    fn get(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> impl Future<Output = ClinicResult<Membership>> + Send;
    fn list_for_user(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = ClinicResult<Vec<Membership>>> + Send;
    fn list_members(
        &self,
        scope: &DataScope,
        pagination: Pagination,
    ) -> impl Future<Output = ClinicResult<PaginatedResult<TenantMember>>> + Send;
    fn update_role(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> impl Future<Output = ClinicResult<Membership>> + Send;
    fn set_active(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        is_active: bool,
    ) -> impl Future<Output = ClinicResult<()>> + Send;
    fn delete(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> impl Future<Output = ClinicResult<()>> + Send;
    /// Atomically make `(user_id, tenant_id)` the only default membership.
    fn set_default(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> impl Future<Output = ClinicResult<()>> + Send;
    fn touch_last_access(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = ClinicResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Plans & system configuration (global, super-admin managed)
// ---------------------------------------------------------------------------

pub trait PlanRepository: Send + Sync {
    /// A default plan replaces the previous default atomically.
    fn create(&self, input: CreatePlan) -> impl Future<Output = ClinicResult<Plan>> + Send;
    fn get_by_slug(&self, slug: &str) -> impl Future<Output = ClinicResult<Plan>> + Send;
    fn get_default(&self) -> impl Future<Output = ClinicResult<Option<Plan>>> + Send;
    fn list(&self) -> impl Future<Output = ClinicResult<Vec<Plan>>> + Send;
}

pub trait SystemConfigRepository: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = ClinicResult<SystemConfig>> + Send;
    fn list(&self) -> impl Future<Output = ClinicResult<Vec<SystemConfig>>> + Send;
    fn upsert(
        &self,
        key: &str,
        input: UpsertSystemConfig,
    ) -> impl Future<Output = ClinicResult<SystemConfig>> + Send;
    fn delete(&self, key: &str) -> impl Future<Output = ClinicResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Tenant-owned business data
// ---------------------------------------------------------------------------

pub trait PatientRepository: Send + Sync {
    fn create(
        &self,
        tenant_id: Uuid,
        input: CreatePatient,
    ) -> impl Future<Output = ClinicResult<Patient>> + Send;
    /// Returns `NotFound` for rows outside `scope`, whether or not they
    /// exist elsewhere.
    fn get_by_id(
        &self,
        scope: &DataScope,
        id: Uuid,
    ) -> impl Future<Output = ClinicResult<Patient>> + Send;
    fn list(
        &self,
        scope: &DataScope,
        pagination: Pagination,
    ) -> impl Future<Output = ClinicResult<PaginatedResult<Patient>>> + Send;
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

pub trait PasswordResetRepository: Send + Sync {
    fn create(
        &self,
        input: CreatePasswordReset,
    ) -> impl Future<Output = ClinicResult<PasswordReset>> + Send;
    fn get_by_token_hash(
        &self,
        token_hash: &str,
    ) -> impl Future<Output = ClinicResult<PasswordReset>> + Send;
    fn mark_used(&self, id: Uuid) -> impl Future<Output = ClinicResult<()>> + Send;
    /// Make a consumed token usable again.
    fn release(&self, id: Uuid) -> impl Future<Output = ClinicResult<()>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = ClinicResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Audit (append-only)
// ---------------------------------------------------------------------------

/// Query filters for audit log entries.
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub action: Option<String>,
    pub category: Option<String>,
    pub user_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub entity_type: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

pub trait AuditLogRepository: Send + Sync {
    /// Append a new audit log entry. No update or delete operations exist.
    fn append(
        &self,
        input: CreateAuditLogEntry,
    ) -> impl Future<Output = ClinicResult<AuditLogEntry>> + Send;
    /// Newest first.
    fn list(
        &self,
        scope: &DataScope,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> impl Future<Output = ClinicResult<PaginatedResult<AuditLogEntry>>> + Send;
    fn stats(
        &self,
        scope: &DataScope,
        since: DateTime<Utc>,
        critical_limit: u64,
    ) -> impl Future<Output = ClinicResult<AuditStats>> + Send;
}
