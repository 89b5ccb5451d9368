//! Audit log domain model.
//!
//! Audit records are append-only: nothing in the codebase updates or
//! deletes them, and the repository contract offers no way to.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Auth,
    Admin,
    Data,
    Security,
}

impl AuditCategory {
    pub const ALL: [AuditCategory; 4] = [
        AuditCategory::Auth,
        AuditCategory::Admin,
        AuditCategory::Data,
        AuditCategory::Security,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::Auth => "auth",
            AuditCategory::Admin => "admin",
            AuditCategory::Data => "data",
            AuditCategory::Security => "security",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions the system records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    LoginSuccess,
    LoginFailure,
    Logout,
    PasswordChanged,
    PasswordResetRequested,
    PasswordResetCompleted,
    UserCreated,
    UserRoleChanged,
    UserDeactivated,
    TenantCreated,
    TenantUpdated,
    TenantDeactivated,
    TenantSwitched,
    DefaultTenantChanged,
    ImpersonationStarted,
    ImpersonationEnded,
    SystemConfigChanged,
    PlanCreated,
    PatientCreated,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::LoginSuccess => "login_success",
            AuditAction::LoginFailure => "login_failure",
            AuditAction::Logout => "logout",
            AuditAction::PasswordChanged => "password_changed",
            AuditAction::PasswordResetRequested => "password_reset_requested",
            AuditAction::PasswordResetCompleted => "password_reset_completed",
            AuditAction::UserCreated => "user_created",
            AuditAction::UserRoleChanged => "user_role_changed",
            AuditAction::UserDeactivated => "user_deactivated",
            AuditAction::TenantCreated => "tenant_created",
            AuditAction::TenantUpdated => "tenant_updated",
            AuditAction::TenantDeactivated => "tenant_deactivated",
            AuditAction::TenantSwitched => "tenant_switched",
            AuditAction::DefaultTenantChanged => "default_tenant_changed",
            AuditAction::ImpersonationStarted => "impersonation_started",
            AuditAction::ImpersonationEnded => "impersonation_ended",
            AuditAction::SystemConfigChanged => "system_config_changed",
            AuditAction::PlanCreated => "plan_created",
            AuditAction::PatientCreated => "patient_created",
        }
    }

    pub fn category(&self) -> AuditCategory {
        match self {
            AuditAction::LoginSuccess
            | AuditAction::LoginFailure
            | AuditAction::Logout
            | AuditAction::TenantSwitched
            | AuditAction::DefaultTenantChanged => AuditCategory::Auth,
            AuditAction::PasswordChanged
            | AuditAction::PasswordResetRequested
            | AuditAction::PasswordResetCompleted
            | AuditAction::ImpersonationStarted
            | AuditAction::ImpersonationEnded => AuditCategory::Security,
            AuditAction::UserCreated
            | AuditAction::UserRoleChanged
            | AuditAction::UserDeactivated
            | AuditAction::TenantCreated
            | AuditAction::TenantUpdated
            | AuditAction::TenantDeactivated
            | AuditAction::SystemConfigChanged
            | AuditAction::PlanCreated => AuditCategory::Admin,
            AuditAction::PatientCreated => AuditCategory::Data,
        }
    }

    /// Security events are written synchronously; a failed write aborts
    /// the triggering action.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            AuditAction::LoginSuccess
                | AuditAction::LoginFailure
                | AuditAction::Logout
                | AuditAction::PasswordChanged
                | AuditAction::PasswordResetRequested
                | AuditAction::PasswordResetCompleted
                | AuditAction::UserCreated
                | AuditAction::UserRoleChanged
                | AuditAction::UserDeactivated
                | AuditAction::TenantCreated
                | AuditAction::TenantDeactivated
                | AuditAction::ImpersonationStarted
                | AuditAction::ImpersonationEnded
                | AuditAction::SystemConfigChanged
        )
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<Uuid>,
    /// Snapshot taken at write time.
    pub user_email: Option<String>,
    pub tenant_id: Option<Uuid>,
    pub action: String,
    pub category: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: serde_json::Value,
}

/// A fully stamped record ready to be appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuditLogEntry {
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<Uuid>,
    pub user_email: Option<String>,
    pub tenant_id: Option<Uuid>,
    pub action: String,
    pub category: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: serde_json::Value,
}

/// Aggregate view returned by the stats endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStats {
    pub total: u64,
    pub logins_today: u64,
    pub login_failures_today: u64,
    pub by_category: Vec<CategoryCount>,
    pub recent_critical: Vec<AuditLogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryCount {
    pub category: String,
    pub total: u64,
}
