//! Shared fixtures for clinic-auth integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use clinic_audit::{AuditConfig, AuditWriter};
use clinic_auth::mailer::{MailMessage, Mailer};
use clinic_auth::{
    AuthConfig, AuthContext, AuthService, Authorizer, ClientInfo, LoginInput, LoginOutput,
    Provisioning, password,
};
use clinic_core::error::{ClinicError, ClinicResult};
use clinic_core::models::audit::AuditLogEntry;
use clinic_core::models::membership::{CreateMembership, Membership};
use clinic_core::models::role::Role;
use clinic_core::models::tenant::{CreateTenant, Tenant};
use clinic_core::models::user::{CreateUser, User};
use clinic_core::repository::{
    AuditLogFilter, AuditLogRepository, MembershipRepository, Pagination, TenantAdminSeed,
    TenantRepository, UserRepository,
};
use clinic_core::scope::DataScope;
use clinic_db::repository::{
    SurrealAuditLogRepository, SurrealMembershipRepository, SurrealPasswordResetRepository,
    SurrealTenantRepository, SurrealUserRepository,
};
use parking_lot::Mutex;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

pub type Users = SurrealUserRepository<Db>;
pub type Tenants = SurrealTenantRepository<Db>;
pub type Members = SurrealMembershipRepository<Db>;
pub type Audit = SurrealAuditLogRepository<Db>;

pub const SECRET: &str = "integration-test-secret-key-32-bytes-min";

pub fn test_config() -> AuthConfig {
    AuthConfig {
        secret_key: SECRET.into(),
        token_issuer: "clinic-test".into(),
        kdf_memory_kib: 1024,
        kdf_iterations: 1,
        ..Default::default()
    }
}

/// Captures outgoing mail; optionally refuses it.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<MailMessage>>,
    pub fail: bool,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: MailMessage) -> ClinicResult<()> {
        if self.fail {
            return Err(ClinicError::Dependency("smtp unreachable".into()));
        }
        self.sent.lock().push(message);
        Ok(())
    }
}

pub struct Harness {
    pub db: Surreal<Db>,
    pub config: AuthConfig,
    pub audit: AuditWriter<Audit>,
    pub mailer: Arc<RecordingMailer>,
    pub auth: AuthService<Users, Tenants, Members, SurrealPasswordResetRepository<Db>, Audit>,
    pub kernel: Authorizer<Users, Tenants, Members>,
    pub provisioning: Provisioning<Users, Tenants, Members, Audit>,
}

pub async fn harness() -> Harness {
    harness_with_mailer(RecordingMailer::default()).await
}

pub async fn harness_with_mailer(mailer: RecordingMailer) -> Harness {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    clinic_db::run_migrations(&db).await.unwrap();

    let config = test_config();
    let mailer = Arc::new(mailer);
    let audit = AuditWriter::new(
        SurrealAuditLogRepository::new(db.clone()),
        AuditConfig::default(),
    );

    let auth = AuthService::new(
        SurrealUserRepository::new(db.clone()),
        SurrealTenantRepository::new(db.clone()),
        SurrealMembershipRepository::new(db.clone()),
        SurrealPasswordResetRepository::new(db.clone()),
        audit.clone(),
        mailer.clone(),
        config.clone(),
    );
    let kernel = Authorizer::new(
        SurrealUserRepository::new(db.clone()),
        SurrealTenantRepository::new(db.clone()),
        SurrealMembershipRepository::new(db.clone()),
        config.clone(),
    );
    let provisioning = Provisioning::new(
        SurrealUserRepository::new(db.clone()),
        SurrealTenantRepository::new(db.clone()),
        SurrealMembershipRepository::new(db.clone()),
        audit.clone(),
        mailer.clone(),
        config.clone(),
    );

    Harness {
        db,
        config,
        audit,
        mailer,
        auth,
        kernel,
        provisioning,
    }
}

pub fn tenant_input(slug: &str) -> CreateTenant {
    CreateTenant {
        name: format!("Clinic {slug}"),
        slug: slug.into(),
        email: None,
        phone: None,
        address: None,
        logo_url: None,
        primary_color: None,
        settings: None,
        plan: None,
    }
}

impl Harness {
    pub fn users(&self) -> Users {
        SurrealUserRepository::new(self.db.clone())
    }

    pub fn tenants(&self) -> Tenants {
        SurrealTenantRepository::new(self.db.clone())
    }

    pub fn members(&self) -> Members {
        SurrealMembershipRepository::new(self.db.clone())
    }

    pub async fn user(&self, email: &str, pw: &str, role: Role) -> User {
        self.users()
            .create(CreateUser {
                email: email.into(),
                password_hash: password::hash_password(pw, &self.config).unwrap(),
                first_name: "Test".into(),
                last_name: "User".into(),
                phone: None,
                locale: None,
                role,
            })
            .await
            .unwrap()
    }

    /// Tenant whose admin is `admin_email` with password `pw`.
    pub async fn tenant(&self, slug: &str, admin_email: &str, pw: &str) -> (Tenant, User) {
        let onboarded = self
            .tenants()
            .create_with_admin(
                tenant_input(slug),
                TenantAdminSeed {
                    email: admin_email.into(),
                    first_name: "Admin".into(),
                    last_name: slug.into(),
                    password_hash: password::hash_password(pw, &self.config).unwrap(),
                    invited_by: None,
                },
            )
            .await
            .unwrap();
        (onboarded.tenant, onboarded.admin)
    }

    pub async fn member(&self, user_id: Uuid, tenant_id: Uuid, role: Role, default: bool) -> Membership {
        self.members()
            .create(CreateMembership {
                user_id,
                tenant_id,
                role,
                is_default: default,
                invited_by: None,
            })
            .await
            .unwrap()
    }

    pub async fn login(&self, email: &str, pw: &str) -> ClinicResult<LoginOutput> {
        self.auth
            .login(LoginInput {
                email: email.into(),
                password: pw.into(),
                client: ClientInfo {
                    ip_address: Some("10.0.0.1".into()),
                    user_agent: Some("tests".into()),
                },
            })
            .await
    }

    pub async fn ctx(&self, token: &str) -> AuthContext {
        self.kernel.authenticate(Some(token)).await.unwrap()
    }

    pub async fn ctx_for(&self, email: &str, pw: &str) -> AuthContext {
        let token = self.login(email, pw).await.unwrap().access_token;
        self.ctx(&token).await
    }

    /// Make every later audit append fail inside the database.
    pub async fn fail_audit_writes(&self) {
        self.db
            .query(
                "DEFINE EVENT OVERWRITE audit_offline ON TABLE audit_log \
                 WHEN $event = 'CREATE' THEN { THROW 'audit store offline'; };",
            )
            .await
            .unwrap()
            .check()
            .unwrap();
    }

    /// Audit rows with `action`, newest first, after draining the queue.
    pub async fn audit_rows(&self, action: &str) -> Vec<AuditLogEntry> {
        self.audit.flush().await;
        SurrealAuditLogRepository::new(self.db.clone())
            .list(
                &DataScope::Global,
                AuditLogFilter {
                    action: Some(action.into()),
                    ..Default::default()
                },
                Pagination {
                    offset: 0,
                    limit: 500,
                },
            )
            .await
            .unwrap()
            .items
    }
}
