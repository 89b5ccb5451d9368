//! Integration tests for the User repository using in-memory SurrealDB.

mod common;

use clinic_core::ClinicError;
use clinic_core::models::role::Role;
use clinic_core::models::user::{CreateUser, UpdateUser};
use clinic_core::repository::{Pagination, UserRepository};
use clinic_db::repository::SurrealUserRepository;

fn new_user(email: &str) -> CreateUser {
    CreateUser {
        email: email.into(),
        password_hash: "$argon2id$placeholder".into(),
        first_name: "Marta".into(),
        last_name: "Gil".into(),
        phone: Some("+34 600 000 000".into()),
        locale: None,
        role: Role::Medico,
    }
}

#[tokio::test]
async fn create_and_get_user() {
    let db = common::setup().await;
    let repo = SurrealUserRepository::new(db);

    let user = repo.create(new_user("Marta@Clinic.test")).await.unwrap();
    assert_eq!(user.email, "marta@clinic.test");
    assert_eq!(user.role, Role::Medico);
    assert_eq!(user.locale, "es");
    assert!(user.is_active);
    assert!(user.tokens_invalidated_after.is_none());

    let fetched = repo.get_by_id(user.id).await.unwrap();
    assert_eq!(fetched.id, user.id);
    assert_eq!(fetched.full_name(), "Marta Gil");
}

#[tokio::test]
async fn email_lookup_is_case_insensitive() {
    let db = common::setup().await;
    let repo = SurrealUserRepository::new(db);

    let user = repo.create(new_user("mgclinic@gmail.com")).await.unwrap();
    let fetched = repo.get_by_email("  MGClinic@Gmail.COM ").await.unwrap();
    assert_eq!(fetched.id, user.id);
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let db = common::setup().await;
    let repo = SurrealUserRepository::new(db);

    repo.create(new_user("dup@clinic.test")).await.unwrap();
    let err = repo.create(new_user("DUP@clinic.test")).await.unwrap_err();
    assert!(matches!(err, ClinicError::Conflict { .. }), "got {err:?}");
}

#[tokio::test]
async fn missing_user_is_not_found() {
    let db = common::setup().await;
    let repo = SurrealUserRepository::new(db);

    let err = repo.get_by_id(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ClinicError::NotFound { .. }));
    let err = repo.get_by_email("ghost@clinic.test").await.unwrap_err();
    assert!(matches!(err, ClinicError::NotFound { .. }));
}

#[tokio::test]
async fn update_and_deactivate_user() {
    let db = common::setup().await;
    let repo = SurrealUserRepository::new(db);

    let user = repo.create(new_user("upd@clinic.test")).await.unwrap();
    let updated = repo
        .update(
            user.id,
            UpdateUser {
                first_name: Some("Martina".into()),
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.first_name, "Martina");
    assert_eq!(updated.last_name, "Gil");
    assert!(!updated.is_active);
}

#[tokio::test]
async fn set_password_can_invalidate_tokens() {
    let db = common::setup().await;
    let repo = SurrealUserRepository::new(db);

    let user = repo.create(new_user("pw@clinic.test")).await.unwrap();

    repo.set_password(user.id, "rotated".into(), false).await.unwrap();
    let fetched = repo.get_by_id(user.id).await.unwrap();
    assert_eq!(fetched.password_hash, "rotated");
    assert!(fetched.tokens_invalidated_after.is_none());

    repo.set_password(user.id, "changed".into(), true).await.unwrap();
    let fetched = repo.get_by_id(user.id).await.unwrap();
    assert_eq!(fetched.password_hash, "changed");
    assert!(fetched.tokens_invalidated_after.is_some());

    let err = repo
        .set_password(uuid::Uuid::new_v4(), "x".into(), true)
        .await
        .unwrap_err();
    assert!(matches!(err, ClinicError::NotFound { .. }));
}

#[tokio::test]
async fn list_users_paginates() {
    let db = common::setup().await;
    let repo = SurrealUserRepository::new(db);

    for i in 0..5 {
        repo.create(new_user(&format!("user{i}@clinic.test")))
            .await
            .unwrap();
    }

    let page = repo
        .list(Pagination {
            offset: 0,
            limit: 2,
        })
        .await
        .unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.items.len(), 2);

    let page = repo
        .list(Pagination {
            offset: 4,
            limit: 2,
        })
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
}

#[tokio::test]
async fn restore_credentials_puts_back_hash_and_cutoff() {
    let db = common::setup().await;
    let repo = SurrealUserRepository::new(db);

    let user = repo.create(new_user("restore@clinic.test")).await.unwrap();
    repo.set_password(user.id, "changed".into(), true).await.unwrap();

    repo.restore_credentials(user.id, user.password_hash.clone(), None)
        .await
        .unwrap();
    let fetched = repo.get_by_id(user.id).await.unwrap();
    assert_eq!(fetched.password_hash, user.password_hash);
    assert!(fetched.tokens_invalidated_after.is_none());

    let err = repo
        .restore_credentials(uuid::Uuid::new_v4(), "x".into(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ClinicError::NotFound { .. }));
}

#[tokio::test]
async fn delete_removes_the_user() {
    let db = common::setup().await;
    let repo = SurrealUserRepository::new(db);

    let user = repo.create(new_user("gone@clinic.test")).await.unwrap();
    repo.delete(user.id).await.unwrap();

    let err = repo.get_by_id(user.id).await.unwrap_err();
    assert!(matches!(err, ClinicError::NotFound { .. }));
    let err = repo.delete(user.id).await.unwrap_err();
    assert!(matches!(err, ClinicError::NotFound { .. }));

    // The email is free again.
    repo.create(new_user("gone@clinic.test")).await.unwrap();
}
