//! Role domain model.
//!
//! The role set is closed. New labels and renames go through the
//! role-schema evolver in `clinic-db`; this enum mirrors the current
//! label set of the `userrole` enumerated type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ClinicError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Superadmin,
    TenantAdmin,
    Manager,
    Medico,
    Closer,
    Recepcionista,
    Patient,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Superadmin,
        Role::TenantAdmin,
        Role::Manager,
        Role::Medico,
        Role::Closer,
        Role::Recepcionista,
        Role::Patient,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Superadmin => "superadmin",
            Role::TenantAdmin => "tenant_admin",
            Role::Manager => "manager",
            Role::Medico => "medico",
            Role::Closer => "closer",
            Role::Recepcionista => "recepcionista",
            Role::Patient => "patient",
        }
    }

    /// Whether the role may be stored on a membership row.
    /// `superadmin` is global-only.
    pub fn is_membership_role(&self) -> bool {
        !matches!(self, Role::Superadmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ClinicError;

    /// Parses a stored label. Legacy uppercase spellings are accepted
    /// and normalized.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == lowered)
            .ok_or_else(|| ClinicError::invalid("role", format!("unknown role: {s}")))
    }
}
