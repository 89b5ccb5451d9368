//! Tenant domain model.
//!
//! Tenants are the unit of data partitioning: every tenant-owned row
//! carries a `tenant_id` and is only reachable through a scoped query.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ClinicError, FieldError};

static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("static regex"));

static COLOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("static regex"));

/// A clinic organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    /// URL-safe unique identifier (e.g., `clinic-a`).
    pub slug: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub logo_url: Option<String>,
    /// `#RRGGBB`.
    pub primary_color: Option<String>,
    /// Opaque settings blob.
    pub settings: serde_json::Value,
    /// Slug of the subscription plan.
    pub plan: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenant {
    pub name: String,
    pub slug: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
    pub settings: Option<serde_json::Value>,
    pub plan: Option<String>,
}

impl CreateTenant {
    pub fn validate(&self) -> Result<(), ClinicError> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "must not be empty"));
        }
        if !is_valid_slug(&self.slug) {
            errors.push(FieldError::new(
                "slug",
                "must be lowercase alphanumerics separated by single hyphens",
            ));
        }
        if let Some(color) = &self.primary_color
            && !is_valid_color(color)
        {
            errors.push(FieldError::new("primary_color", "must be #RRGGBB"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ClinicError::Validation { errors })
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateTenant {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
    pub settings: Option<serde_json::Value>,
    pub plan: Option<String>,
}

impl UpdateTenant {
    pub fn validate(&self) -> Result<(), ClinicError> {
        let mut errors = Vec::new();
        if let Some(slug) = &self.slug
            && !is_valid_slug(slug)
        {
            errors.push(FieldError::new(
                "slug",
                "must be lowercase alphanumerics separated by single hyphens",
            ));
        }
        if let Some(color) = &self.primary_color
            && !is_valid_color(color)
        {
            errors.push(FieldError::new("primary_color", "must be #RRGGBB"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ClinicError::Validation { errors })
        }
    }
}

pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_RE.is_match(slug)
}

pub fn is_valid_color(color: &str) -> bool {
    COLOR_RE.is_match(color)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(slug: &str, color: Option<&str>) -> CreateTenant {
        CreateTenant {
            name: "Clinic".into(),
            slug: slug.into(),
            email: None,
            phone: None,
            address: None,
            logo_url: None,
            primary_color: color.map(str::to_string),
            settings: None,
            plan: None,
        }
    }

    #[test]
    fn slug_rules() {
        assert!(is_valid_slug("clinic-a"));
        assert!(is_valid_slug("a1"));
        assert!(!is_valid_slug("Clinic-A"));
        assert!(!is_valid_slug("-clinic"));
        assert!(!is_valid_slug("clinic--a"));
        assert!(!is_valid_slug("clinic-"));
        assert!(!is_valid_slug(""));
    }

    #[test]
    fn color_rules() {
        assert!(is_valid_color("#1A2b3C"));
        assert!(!is_valid_color("1A2B3C"));
        assert!(!is_valid_color("#1A2B3"));
    }

    #[test]
    fn create_collects_all_field_errors() {
        let err = create("Bad Slug", Some("red")).validate().unwrap_err();
        match err {
            ClinicError::Validation { errors } => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["slug", "primary_color"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn create_accepts_valid_input() {
        assert!(create("clinic-b", Some("#00FF00")).validate().is_ok());
    }
}
