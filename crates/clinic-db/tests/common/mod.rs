//! Shared fixtures for clinic-db integration tests.

#![allow(dead_code)]

use clinic_core::models::role::Role;
use clinic_core::models::tenant::{CreateTenant, Tenant};
use clinic_core::models::user::{CreateUser, User};
use clinic_core::repository::{OnboardedTenant, TenantAdminSeed, TenantRepository, UserRepository};
use clinic_db::repository::{SurrealTenantRepository, SurrealUserRepository};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

/// Spin up a fresh in-memory DB and run all migrations.
pub async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    clinic_db::run_migrations(&db).await.unwrap();
    db
}

pub fn create_tenant(name: &str, slug: &str) -> CreateTenant {
    CreateTenant {
        name: name.into(),
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

pub fn admin_seed(email: &str) -> TenantAdminSeed {
    TenantAdminSeed {
        email: email.into(),
        first_name: "Admin".into(),
        last_name: "User".into(),
        password_hash: "$argon2id$v=19$m=1024,t=1,p=1$c2FsdHNhbHQ$aGFzaA".into(),
        invited_by: None,
    }
}

pub async fn onboard(db: &Surreal<Db>, slug: &str, admin_email: &str) -> OnboardedTenant {
    SurrealTenantRepository::new(db.clone())
        .create_with_admin(create_tenant(&format!("Clinic {slug}"), slug), admin_seed(admin_email))
        .await
        .unwrap()
}

pub async fn tenant(db: &Surreal<Db>, slug: &str) -> Tenant {
    onboard(db, slug, &format!("admin@{slug}.test")).await.tenant
}

pub async fn user(db: &Surreal<Db>, email: &str, role: Role) -> User {
    SurrealUserRepository::new(db.clone())
        .create(CreateUser {
            email: email.into(),
            password_hash: "digest".into(),
            first_name: "Test".into(),
            last_name: "User".into(),
            phone: None,
            locale: None,
            role,
        })
        .await
        .unwrap()
}
