//! Static role → capability matrix.
//!
//! Handlers ask [`CapabilitySet::contains`] (through
//! `AuthContext::can`) and never branch on role identity.

use std::fmt;

use clinic_core::models::role::Role;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum Capability {
    /// Read business data of the active tenant.
    TenantDataRead = 1 << 0,
    /// Read patient records. Patients get it too; their scope narrows
    /// it to their own rows.
    PatientRecordsRead = 1 << 1,
    PatientRecordsWrite = 1 << 2,
    ClinicalData = 1 << 3,
    LeadsData = 1 << 4,
    SchedulingData = 1 << 5,
    AuditRead = 1 << 6,
    /// Produce non-security audit records for one's own actions.
    AuditWrite = 1 << 7,
    ManageTenants = 1 << 8,
    ManageUsers = 1 << 9,
    ReadUsers = 1 << 10,
    ManageSelf = 1 << 11,
    /// Plans and system configuration.
    ManagePlatform = 1 << 12,
    PatientSelfData = 1 << 13,
    Impersonate = 1 << 14,
}

impl Capability {
    pub const ALL: [Capability; 15] = [
        Capability::TenantDataRead,
        Capability::PatientRecordsRead,
        Capability::PatientRecordsWrite,
        Capability::ClinicalData,
        Capability::LeadsData,
        Capability::SchedulingData,
        Capability::AuditRead,
        Capability::AuditWrite,
        Capability::ManageTenants,
        Capability::ManageUsers,
        Capability::ReadUsers,
        Capability::ManageSelf,
        Capability::ManagePlatform,
        Capability::PatientSelfData,
        Capability::Impersonate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::TenantDataRead => "tenant_data_read",
            Capability::PatientRecordsRead => "patient_records_read",
            Capability::PatientRecordsWrite => "patient_records_write",
            Capability::ClinicalData => "clinical_data",
            Capability::LeadsData => "leads_data",
            Capability::SchedulingData => "scheduling_data",
            Capability::AuditRead => "audit_read",
            Capability::AuditWrite => "audit_write",
            Capability::ManageTenants => "manage_tenants",
            Capability::ManageUsers => "manage_users",
            Capability::ReadUsers => "read_users",
            Capability::ManageSelf => "manage_self",
            Capability::ManagePlatform => "manage_platform",
            Capability::PatientSelfData => "patient_self_data",
            Capability::Impersonate => "impersonate",
        }
    }

    const fn bit(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet(u32);

impl CapabilitySet {
    pub const EMPTY: CapabilitySet = CapabilitySet(0);

    const fn of(caps: &[Capability]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < caps.len() {
            bits |= caps[i].bit();
            i += 1;
        }
        CapabilitySet(bits)
    }

    pub fn contains(&self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.contains(*c))
    }
}

use Capability::*;

const STAFF_BASE: &[Capability] = &[TenantDataRead, PatientRecordsRead, AuditWrite, ManageSelf];

const SUPERADMIN: CapabilitySet = CapabilitySet::of(&[
    TenantDataRead,
    PatientRecordsRead,
    PatientRecordsWrite,
    ClinicalData,
    LeadsData,
    SchedulingData,
    AuditRead,
    AuditWrite,
    ManageTenants,
    ManageUsers,
    ReadUsers,
    ManageSelf,
    ManagePlatform,
    Impersonate,
]);

const TENANT_ADMIN: CapabilitySet = CapabilitySet::of(&[
    TenantDataRead,
    PatientRecordsRead,
    PatientRecordsWrite,
    ClinicalData,
    LeadsData,
    SchedulingData,
    AuditRead,
    AuditWrite,
    ManageUsers,
    ReadUsers,
    ManageSelf,
]);

const MANAGER: CapabilitySet = CapabilitySet::of(&[
    TenantDataRead,
    PatientRecordsRead,
    PatientRecordsWrite,
    ClinicalData,
    LeadsData,
    SchedulingData,
    AuditRead,
    AuditWrite,
    ReadUsers,
    ManageSelf,
]);

const MEDICO: CapabilitySet = CapabilitySet(
    CapabilitySet::of(STAFF_BASE).0 | CapabilitySet::of(&[PatientRecordsWrite, ClinicalData]).0,
);

const CLOSER: CapabilitySet =
    CapabilitySet(CapabilitySet::of(STAFF_BASE).0 | CapabilitySet::of(&[LeadsData]).0);

const RECEPCIONISTA: CapabilitySet = CapabilitySet(
    CapabilitySet::of(STAFF_BASE).0
        | CapabilitySet::of(&[PatientRecordsWrite, SchedulingData]).0,
);

const PATIENT: CapabilitySet = CapabilitySet::of(&[PatientRecordsRead, ManageSelf, PatientSelfData]);

/// The capability set granted by an effective role.
pub fn capabilities_for(role: Role) -> CapabilitySet {
    match role {
        Role::Superadmin => SUPERADMIN,
        Role::TenantAdmin => TENANT_ADMIN,
        Role::Manager => MANAGER,
        Role::Medico => MEDICO,
        Role::Closer => CLOSER,
        Role::Recepcionista => RECEPCIONISTA,
        Role::Patient => PATIENT,
    }
}
