//! Data scope attached to every query over a tenant-owned table.
//!
//! A `DataScope` is produced only by the authorization kernel. Data
//! access code consumes it to add `tenant_id` (and, for patients,
//! patient-link) predicates.

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataScope {
    /// Super-administrator with no tenant selected: pass-through.
    Global,
    /// Rows of one tenant.
    Tenant { tenant_id: Uuid },
    /// Rows of one tenant that are linked to one patient principal.
    Patient { tenant_id: Uuid, principal_id: Uuid },
}

impl DataScope {
    pub fn tenant_id(&self) -> Option<Uuid> {
        match self {
            DataScope::Global => None,
            DataScope::Tenant { tenant_id } | DataScope::Patient { tenant_id, .. } => {
                Some(*tenant_id)
            }
        }
    }

    pub fn patient_principal(&self) -> Option<Uuid> {
        match self {
            DataScope::Patient { principal_id, .. } => Some(*principal_id),
            _ => None,
        }
    }

    /// Whether a row owned by `tenant_id` is visible.
    pub fn admits_tenant(&self, tenant_id: Uuid) -> bool {
        self.tenant_id().is_none_or(|t| t == tenant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_scope_admits_everything() {
        assert!(DataScope::Global.admits_tenant(Uuid::new_v4()));
    }

    #[test]
    fn tenant_scope_admits_only_its_tenant() {
        let t = Uuid::new_v4();
        let scope = DataScope::Tenant { tenant_id: t };
        assert!(scope.admits_tenant(t));
        assert!(!scope.admits_tenant(Uuid::new_v4()));
        assert_eq!(scope.patient_principal(), None);
    }

    #[test]
    fn patient_scope_exposes_principal() {
        let t = Uuid::new_v4();
        let p = Uuid::new_v4();
        let scope = DataScope::Patient {
            tenant_id: t,
            principal_id: p,
        };
        assert_eq!(scope.tenant_id(), Some(t));
        assert_eq!(scope.patient_principal(), Some(p));
    }
}
