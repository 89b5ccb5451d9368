//! Session tokens in a build that also links the embedded database.

use clinic_auth::token::{self, TokenSubject};
use clinic_auth::AuthConfig;
use clinic_core::models::role::Role;
use surrealdb::Surreal;
use surrealdb::engine::local::Mem;
use uuid::Uuid;

#[tokio::test]
async fn tokens_round_trip_alongside_the_database() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    clinic_db::run_migrations(&db).await.unwrap();

    let config = AuthConfig {
        secret_key: "integration-test-secret-key-32-bytes-min".into(),
        token_issuer: "clinic-test".into(),
        ..Default::default()
    };
    let subject = TokenSubject {
        principal_id: Uuid::new_v4(),
        email: "alice@a.test".into(),
        role: Role::TenantAdmin,
        tenant_id: Some(Uuid::new_v4()),
        impersonator_id: None,
    };

    let issued = token::issue_token(&subject, &config).unwrap();
    let claims = token::decode_token(&issued, &config).unwrap();
    assert_eq!(claims.principal_id().unwrap(), subject.principal_id);
    assert_eq!(claims.active_tenant().unwrap(), subject.tenant_id);

    let err = token::decode_token(&issued, &AuthConfig {
        secret_key: "some-other-secret-key-of-32-bytes-min!!".into(),
        ..config
    })
    .unwrap_err();
    assert!(matches!(err, clinic_auth::AuthError::TokenInvalid(_)));
}
