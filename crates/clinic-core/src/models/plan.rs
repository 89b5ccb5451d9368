//! Subscription plan domain model.
//!
//! Quotas are advisory caps checked by business handlers, never by the
//! authorization kernel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub price_monthly: f64,
    pub price_yearly: f64,
    pub max_users: u32,
    pub max_clients: u32,
    pub max_storage_gb: u32,
    /// Opaque feature flags.
    pub features: serde_json::Value,
    pub is_default: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePlan {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub price_monthly: f64,
    #[serde(default)]
    pub price_yearly: f64,
    pub max_users: u32,
    pub max_clients: u32,
    pub max_storage_gb: u32,
    pub features: Option<serde_json::Value>,
    #[serde(default)]
    pub is_default: bool,
}
