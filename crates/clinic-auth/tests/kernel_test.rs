//! Authorization kernel: authentication, tenant resolution and scoping.

mod common;

use chrono::{Duration, Utc};
use clinic_auth::Capability;
use clinic_auth::token::{self, TokenSubject};
use clinic_core::error::ClinicError;
use clinic_core::models::role::Role;
use clinic_core::models::user::UpdateUser;
use clinic_core::repository::{MembershipRepository, TenantRepository, UserRepository};
use clinic_core::scope::DataScope;
use common::harness;
use uuid::Uuid;

fn subject(principal_id: Uuid, role: Role, tenant_id: Option<Uuid>) -> TokenSubject {
    TokenSubject {
        principal_id,
        email: "x@clinic.test".into(),
        role,
        tenant_id,
        impersonator_id: None,
    }
}

#[tokio::test]
async fn expired_token_is_unauthenticated_with_expiry_detail() {
    let h = harness().await;
    let (a, alice) = h.tenant("clinic-a", "alice@a.test", "alice-pass").await;

    let expired = token::issue_token_between(
        &subject(alice.id, Role::TenantAdmin, Some(a.id)),
        Utc::now() - Duration::hours(2),
        Utc::now() - Duration::seconds(1),
        &h.config,
    )
    .unwrap();

    let err = h.kernel.authenticate(Some(&expired)).await.unwrap_err();
    match err {
        ClinicError::Unauthenticated { reason } => assert!(reason.contains("expired")),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn missing_or_garbage_token_is_unauthenticated() {
    let h = harness().await;
    for bearer in [None, Some(""), Some("not.a.jwt")] {
        let err = h.kernel.authenticate(bearer).await.unwrap_err();
        assert!(matches!(err, ClinicError::Unauthenticated { .. }), "{bearer:?}");
    }
}

#[tokio::test]
async fn unknown_or_inactive_principal_is_unauthenticated() {
    let h = harness().await;
    let (a, alice) = h.tenant("clinic-a", "alice@a.test", "alice-pass").await;

    let ghost = token::issue_token(&subject(Uuid::new_v4(), Role::Manager, Some(a.id)), &h.config)
        .unwrap();
    assert!(matches!(
        h.kernel.authenticate(Some(&ghost)).await,
        Err(ClinicError::Unauthenticated { .. })
    ));

    let valid = h.login("alice@a.test", "alice-pass").await.unwrap().access_token;
    h.users()
        .update(
            alice.id,
            UpdateUser {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(matches!(
        h.kernel.authenticate(Some(&valid)).await,
        Err(ClinicError::Unauthenticated { .. })
    ));
}

#[tokio::test]
async fn tenant_problems_are_forbidden() {
    let h = harness().await;
    let (a, alice) = h.tenant("clinic-a", "alice@a.test", "alice-pass").await;
    let (b, _) = h.tenant("clinic-b", "bob@b.test", "bob-pass").await;

    // Token naming a tenant without membership.
    let foreign =
        token::issue_token(&subject(alice.id, Role::TenantAdmin, Some(b.id)), &h.config).unwrap();
    assert!(matches!(
        h.kernel.authenticate(Some(&foreign)).await,
        Err(ClinicError::Forbidden { .. })
    ));

    // No tenant at all for a non-superadmin.
    let tenantless =
        token::issue_token(&subject(alice.id, Role::TenantAdmin, None), &h.config).unwrap();
    assert!(matches!(
        h.kernel.authenticate(Some(&tenantless)).await,
        Err(ClinicError::Forbidden { .. })
    ));

    // Inactive tenant.
    let own = h.login("alice@a.test", "alice-pass").await.unwrap().access_token;
    h.tenants().set_active(a.id, false).await.unwrap();
    assert!(matches!(
        h.kernel.authenticate(Some(&own)).await,
        Err(ClinicError::Forbidden { .. })
    ));
}

#[tokio::test]
async fn inactive_membership_is_forbidden() {
    let h = harness().await;
    let (a, _) = h.tenant("clinic-a", "alice@a.test", "alice-pass").await;
    let staff = h.user("doc@a.test", "doc-pass", Role::Medico).await;
    h.member(staff.id, a.id, Role::Medico, true).await;

    let token = h.login("doc@a.test", "doc-pass").await.unwrap().access_token;
    h.ctx(&token).await;

    h.members().set_active(a.id, staff.id, false).await.unwrap();
    assert!(matches!(
        h.kernel.authenticate(Some(&token)).await,
        Err(ClinicError::Forbidden { .. })
    ));
}

#[tokio::test]
async fn superadmin_resolution() {
    let h = harness().await;
    let (a, _) = h.tenant("clinic-a", "alice@a.test", "alice-pass").await;
    let root = h.user("superadmin@example.com", "root-pass", Role::Superadmin).await;

    let global = h.ctx_for("superadmin@example.com", "root-pass").await;
    assert_eq!(global.scope().unwrap(), DataScope::Global);
    assert!(global.can(Capability::ManageTenants));

    let in_a =
        token::issue_token(&subject(root.id, Role::Superadmin, Some(a.id)), &h.config).unwrap();
    let ctx = h.ctx(&in_a).await;
    assert_eq!(ctx.role, Role::Superadmin);
    assert_eq!(ctx.scope().unwrap(), DataScope::Tenant { tenant_id: a.id });

    let nowhere =
        token::issue_token(&subject(root.id, Role::Superadmin, Some(Uuid::new_v4())), &h.config)
            .unwrap();
    assert!(matches!(
        h.kernel.authenticate(Some(&nowhere)).await,
        Err(ClinicError::Forbidden { .. })
    ));
}

#[tokio::test]
async fn effective_role_comes_from_the_membership() {
    let h = harness().await;
    let (a, _) = h.tenant("clinic-a", "alice@a.test", "alice-pass").await;
    // Global role says recepcionista; the membership says closer.
    let user = h.user("sam@a.test", "sam-pass", Role::Recepcionista).await;
    h.member(user.id, a.id, Role::Closer, true).await;

    let ctx = h.ctx_for("sam@a.test", "sam-pass").await;
    assert_eq!(ctx.role, Role::Closer);
    assert!(ctx.can(Capability::LeadsData));
    assert!(!ctx.can(Capability::SchedulingData));
}

#[tokio::test]
async fn patient_context_is_patient_scoped() {
    let h = harness().await;
    let (a, _) = h.tenant("clinic-a", "alice@a.test", "alice-pass").await;
    let patient = h.user("p1@a.test", "patient-pass", Role::Patient).await;
    h.member(patient.id, a.id, Role::Patient, true).await;

    let ctx = h.ctx_for("p1@a.test", "patient-pass").await;
    assert_eq!(
        ctx.scope().unwrap(),
        DataScope::Patient {
            tenant_id: a.id,
            principal_id: patient.id
        }
    );
    assert!(!ctx.can(Capability::AuditWrite));
    assert!(ctx.require(Capability::TenantDataRead).is_err());
}

#[tokio::test]
async fn last_access_is_recorded_and_coalesced() {
    let h = harness().await;
    let (a, alice) = h.tenant("clinic-a", "alice@a.test", "alice-pass").await;
    assert!(h.members().get(alice.id, a.id).await.unwrap().last_access_at.is_none());

    let token = h.login("alice@a.test", "alice-pass").await.unwrap().access_token;
    h.ctx(&token).await;
    let first = h
        .members()
        .get(alice.id, a.id)
        .await
        .unwrap()
        .last_access_at
        .unwrap();

    h.ctx(&token).await;
    let second = h
        .members()
        .get(alice.id, a.id)
        .await
        .unwrap()
        .last_access_at
        .unwrap();
    assert_eq!(first, second);
}
