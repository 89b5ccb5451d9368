//! Membership domain model: a principal's presence in a tenant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::role::Role;

/// Unique on `(user_id, tenant_id)`. At most one membership per user
/// has `is_default = true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    /// Never `Superadmin`.
    pub role: Role,
    pub is_active: bool,
    pub is_default: bool,
    pub joined_at: DateTime<Utc>,
    pub last_access_at: Option<DateTime<Utc>>,
    pub invited_by: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMembership {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub role: Role,
    pub is_default: bool,
    pub invited_by: Option<Uuid>,
}
