//! Integration tests for the role-schema evolver against in-memory
//! SurrealDB.

mod common;

use chrono::{DateTime, Utc};
use clinic_db::role_evolver::{self, add_role_label, current_labels};
use clinic_db::{DbError, rollback_role_revision, schema_v1};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use surrealdb_types::SurrealValue;

const REVISION: &str = "a1b2c3d4e5f6";

#[derive(Debug, Clone, PartialEq, SurrealValue)]
struct UserSnapshot {
    record_id: String,
    email: String,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// A database at schema v1, before any role revision.
async fn setup_v1() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    db.query(schema_v1()).await.unwrap().check().unwrap();
    db
}

async fn seed_users(db: &Surreal<Db>, count: usize, role: &str) {
    for i in 0..count {
        db.query(
            "CREATE type::record('user', $id) SET email = $email, \
             password_hash = 'x', first_name = 'Seed', last_name = 'User', role = $role",
        )
        .bind(("id", uuid::Uuid::new_v4().to_string()))
        .bind(("email", format!("{role}{i}@seed.test").to_lowercase()))
        .bind(("role", role.to_string()))
        .await
        .unwrap()
        .check()
        .unwrap();
    }
}

async fn snapshot(db: &Surreal<Db>) -> Vec<UserSnapshot> {
    let mut result = db
        .query("SELECT meta::id(id) AS record_id, * FROM user ORDER BY email ASC")
        .await
        .unwrap();
    result.take(0).unwrap()
}

async fn count_role(db: &Surreal<Db>, role: &str) -> usize {
    snapshot(db).await.iter().filter(|u| u.role == role).count()
}

/// Drop the role assertion so legacy or corrupt values can be seeded.
async fn widen_user_role(db: &Surreal<Db>) {
    db.query("DEFINE FIELD OVERWRITE role ON TABLE user TYPE string")
        .await
        .unwrap()
        .check()
        .unwrap();
}

#[tokio::test]
async fn rename_client_to_closer_and_back() {
    let db = setup_v1().await;
    seed_users(&db, 100, "client").await;
    let before = snapshot(&db).await;

    let revision = role_evolver::revision(REVISION).unwrap();
    revision.upgrade(&db).await.unwrap();

    assert_eq!(count_role(&db, "closer").await, 100);
    assert_eq!(count_role(&db, "client").await, 0);
    let labels = current_labels(&db).await.unwrap();
    assert!(labels.contains(&"closer".to_string()));
    assert!(!labels.contains(&"client".to_string()));

    // The re-asserted column now rejects the old label.
    let stale = db
        .query("CREATE user SET email = 'late@seed.test', password_hash = 'x', \
                first_name = 'L', last_name = 'S', role = 'client'")
        .await
        .unwrap()
        .check();
    assert!(stale.is_err());

    revision.downgrade(&db).await.unwrap();

    let after = snapshot(&db).await;
    assert_eq!(before, after, "round trip must restore every row exactly");
    let labels = current_labels(&db).await.unwrap();
    assert!(labels.contains(&"client".to_string()));
    assert!(!labels.contains(&"closer".to_string()));
}

#[tokio::test]
async fn memberships_are_renamed_with_users() {
    let db = setup_v1().await;
    db.query(
        "CREATE membership SET user_id = 'u1', tenant_id = 't1', role = 'client'; \
         CREATE membership SET user_id = 'u2', tenant_id = 't1', role = 'medico';",
    )
    .await
    .unwrap()
    .check()
    .unwrap();

    role_evolver::revision(REVISION)
        .unwrap()
        .upgrade(&db)
        .await
        .unwrap();

    #[derive(Debug, SurrealValue)]
    struct RoleRow {
        role: String,
    }
    let mut result = db
        .query("SELECT role FROM membership ORDER BY user_id ASC")
        .await
        .unwrap();
    let rows: Vec<RoleRow> = result.take(0).unwrap();
    let roles: Vec<_> = rows.into_iter().map(|r| r.role).collect();
    assert_eq!(roles, vec!["closer".to_string(), "medico".to_string()]);

    let superadmin = db
        .query("CREATE membership SET user_id = 'u3', tenant_id = 't1', role = 'superadmin'")
        .await
        .unwrap()
        .check();
    assert!(superadmin.is_err());
}

#[tokio::test]
async fn orphaned_rows_abort_the_rebuild() {
    let db = setup_v1().await;
    seed_users(&db, 3, "client").await;
    widen_user_role(&db).await;
    seed_users(&db, 1, "ghost").await;

    let err = role_evolver::revision(REVISION)
        .unwrap()
        .upgrade(&db)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Migration(_)), "got {err:?}");

    // Nothing changed: rows and the label set are as before.
    assert_eq!(count_role(&db, "client").await, 3);
    assert_eq!(count_role(&db, "ghost").await, 1);
    let labels = current_labels(&db).await.unwrap();
    assert!(labels.contains(&"client".to_string()));
}

#[tokio::test]
async fn uppercase_legacy_values_are_normalized() {
    let db = setup_v1().await;
    widen_user_role(&db).await;
    seed_users(&db, 2, "CLIENT").await;
    seed_users(&db, 1, "Medico").await;

    role_evolver::revision(REVISION)
        .unwrap()
        .upgrade(&db)
        .await
        .unwrap();

    assert_eq!(count_role(&db, "closer").await, 2);
    assert_eq!(count_role(&db, "medico").await, 1);
}

#[tokio::test]
async fn migrate_then_rollback_through_the_runner() {
    let db = common::setup().await;
    assert!(current_labels(&db).await.unwrap().contains(&"closer".to_string()));

    rollback_role_revision(&db, REVISION).await.unwrap();
    assert!(current_labels(&db).await.unwrap().contains(&"client".to_string()));

    // Re-running migrations re-applies the revision.
    clinic_db::run_migrations(&db).await.unwrap();
    assert!(current_labels(&db).await.unwrap().contains(&"closer".to_string()));

    let err = rollback_role_revision(&db, "ffffffffffff").await.unwrap_err();
    assert!(matches!(err, DbError::Migration(_)));
}

#[tokio::test]
async fn add_label_is_idempotent() {
    let db = common::setup().await;

    add_role_label(&db, "nurse").await.unwrap();
    add_role_label(&db, "nurse").await.unwrap();

    let labels = current_labels(&db).await.unwrap();
    assert_eq!(labels.iter().filter(|l| *l == "nurse").count(), 1);
    assert!(labels.contains(&"closer".to_string()));

    seed_users(&db, 1, "nurse").await;
    assert_eq!(count_role(&db, "nurse").await, 1);

    let err = add_role_label(&db, "Bad Label").await.unwrap_err();
    assert!(matches!(err, DbError::Migration(_)));
}
