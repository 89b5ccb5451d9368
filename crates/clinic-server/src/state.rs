//! Shared application state.

use std::net::IpAddr;
use std::sync::Arc;

use clinic_audit::{AuditConfig, AuditWriter};
use clinic_auth::{AuthConfig, AuthService, Authorizer, Mailer, Provisioning};
use clinic_db::repository::{
    SurrealAuditLogRepository, SurrealMembershipRepository, SurrealPasswordResetRepository,
    SurrealPatientRepository, SurrealPlanRepository, SurrealSystemConfigRepository,
    SurrealTenantRepository, SurrealUserRepository,
};
use surrealdb::Surreal;
use surrealdb::engine::any::Any;

pub type Users = SurrealUserRepository<Any>;
pub type Tenants = SurrealTenantRepository<Any>;
pub type Members = SurrealMembershipRepository<Any>;
pub type Resets = SurrealPasswordResetRepository<Any>;
pub type Patients = SurrealPatientRepository<Any>;
pub type Plans = SurrealPlanRepository<Any>;
pub type SystemConfigs = SurrealSystemConfigRepository<Any>;
pub type AuditLogs = SurrealAuditLogRepository<Any>;

pub type Auth = AuthService<Users, Tenants, Members, Resets, AuditLogs>;
pub type Kernel = Authorizer<Users, Tenants, Members>;
pub type Onboarding = Provisioning<Users, Tenants, Members, AuditLogs>;

/// Handles injected into every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<Auth>,
    pub kernel: Arc<Kernel>,
    pub provisioning: Arc<Onboarding>,
    pub audit: AuditWriter<AuditLogs>,
    pub tenants: Tenants,
    pub memberships: Members,
    pub patients: Patients,
    pub plans: Plans,
    pub system_config: SystemConfigs,
    /// Peers whose `X-Forwarded-For` header is believed.
    pub trusted_proxies: Arc<[IpAddr]>,
}

impl AppState {
    /// Wire services over one database handle. Spawns the audit
    /// consumer, so it must run inside a Tokio runtime.
    pub fn new(
        db: Surreal<Any>,
        auth_config: AuthConfig,
        audit_config: AuditConfig,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let audit = AuditWriter::new(SurrealAuditLogRepository::new(db.clone()), audit_config);

        let auth = AuthService::new(
            SurrealUserRepository::new(db.clone()),
            SurrealTenantRepository::new(db.clone()),
            SurrealMembershipRepository::new(db.clone()),
            SurrealPasswordResetRepository::new(db.clone()),
            audit.clone(),
            mailer.clone(),
            auth_config.clone(),
        );
        let kernel = Authorizer::new(
            SurrealUserRepository::new(db.clone()),
            SurrealTenantRepository::new(db.clone()),
            SurrealMembershipRepository::new(db.clone()),
            auth_config.clone(),
        );
        let provisioning = Provisioning::new(
            SurrealUserRepository::new(db.clone()),
            SurrealTenantRepository::new(db.clone()),
            SurrealMembershipRepository::new(db.clone()),
            audit.clone(),
            mailer,
            auth_config,
        );

        Self {
            auth: Arc::new(auth),
            kernel: Arc::new(kernel),
            provisioning: Arc::new(provisioning),
            audit,
            tenants: SurrealTenantRepository::new(db.clone()),
            memberships: SurrealMembershipRepository::new(db.clone()),
            patients: SurrealPatientRepository::new(db.clone()),
            plans: SurrealPlanRepository::new(db.clone()),
            system_config: SurrealSystemConfigRepository::new(db),
            trusted_proxies: Arc::from([]),
        }
    }

    pub fn with_trusted_proxies(mut self, proxies: Vec<IpAddr>) -> Self {
        self.trusted_proxies = proxies.into();
        self
    }
}
