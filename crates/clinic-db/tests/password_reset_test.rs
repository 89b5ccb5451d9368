//! Integration tests for password reset tokens using in-memory SurrealDB.

mod common;

use chrono::{Duration, Utc};
use clinic_core::ClinicError;
use clinic_core::models::password_reset::CreatePasswordReset;
use clinic_core::models::role::Role;
use clinic_core::repository::PasswordResetRepository;
use clinic_db::repository::SurrealPasswordResetRepository;

#[tokio::test]
async fn used_tokens_conflict_until_released() {
    let db = common::setup().await;
    let repo = SurrealPasswordResetRepository::new(db.clone());
    let user = common::user(&db, "reset@clinic.test", Role::Medico).await;

    let reset = repo
        .create(CreatePasswordReset {
            user_id: user.id,
            token_hash: "digest".into(),
            expires_at: Utc::now() + Duration::hours(1),
        })
        .await
        .unwrap();

    repo.mark_used(reset.id).await.unwrap();
    let err = repo.mark_used(reset.id).await.unwrap_err();
    assert!(matches!(err, ClinicError::Conflict { .. }));

    repo.release(reset.id).await.unwrap();
    assert!(repo.get_by_token_hash("digest").await.unwrap().used_at.is_none());
    repo.mark_used(reset.id).await.unwrap();
}

#[tokio::test]
async fn deleted_tokens_are_gone() {
    let db = common::setup().await;
    let repo = SurrealPasswordResetRepository::new(db.clone());
    let user = common::user(&db, "reset@clinic.test", Role::Medico).await;

    let reset = repo
        .create(CreatePasswordReset {
            user_id: user.id,
            token_hash: "digest".into(),
            expires_at: Utc::now() + Duration::hours(1),
        })
        .await
        .unwrap();
    repo.delete(reset.id).await.unwrap();

    let err = repo.get_by_token_hash("digest").await.unwrap_err();
    assert!(matches!(err, ClinicError::NotFound { .. }));
}
