//! End-to-end scenarios through the axum router.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::routing::get;
use chrono::Utc;
use clinic_audit::AuditConfig;
use clinic_auth::token::{TokenSubject, issue_token_between};
use clinic_auth::{AuthConfig, LogMailer, password};
use clinic_core::error::ClinicError;
use clinic_core::models::membership::CreateMembership;
use clinic_core::models::role::Role;
use clinic_core::models::system_config::UpsertSystemConfig;
use clinic_core::models::tenant::{CreateTenant, Tenant};
use clinic_core::models::user::{CreateUser, User};
use clinic_core::repository::{
    MembershipRepository, SystemConfigRepository, TenantAdminSeed, TenantRepository,
    UserRepository,
};
use clinic_db::DbConfig;
use clinic_db::repository::{
    SurrealMembershipRepository, SurrealSystemConfigRepository, SurrealTenantRepository,
    SurrealUserRepository,
};
use clinic_server::extract::Authenticated;
use clinic_server::{AppState, ServerConfig, build_router};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use tower::ServiceExt;

struct TestApp {
    db: Surreal<Any>,
    config: ServerConfig,
    state: AppState,
    router: Router,
}

fn test_config() -> ServerConfig {
    ServerConfig {
        environment: "test".into(),
        bind_addr: ([127, 0, 0, 1], 0).into(),
        allowed_origins: vec![],
        request_timeout: Duration::from_secs(30),
        trusted_proxies: vec![],
        db: DbConfig {
            url: "mem://".into(),
            ..Default::default()
        },
        auth: AuthConfig {
            secret_key: "http-test-secret-key-at-least-32-bytes".into(),
            token_issuer: "clinic-test".into(),
            kdf_memory_kib: 1024,
            kdf_iterations: 1,
            ..Default::default()
        },
        audit: AuditConfig::default(),
    }
}

async fn app() -> TestApp {
    let db = surrealdb::engine::any::connect("mem://").await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    clinic_db::run_migrations(&db).await.unwrap();

    let config = test_config();
    let state = AppState::new(
        db.clone(),
        config.auth.clone(),
        config.audit.clone(),
        Arc::new(LogMailer),
    );
    let router = build_router(state.clone(), &config);
    TestApp {
        db,
        config,
        state,
        router,
    }
}

impl TestApp {
    async fn tenant(&self, slug: &str, admin_email: &str, pw: &str) -> (Tenant, User) {
        let onboarded = SurrealTenantRepository::new(self.db.clone())
            .create_with_admin(
                CreateTenant {
                    name: format!("Clinic {slug}"),
                    slug: slug.into(),
                    email: None,
                    phone: None,
                    address: None,
                    logo_url: None,
                    primary_color: None,
                    settings: None,
                    plan: None,
                },
                TenantAdminSeed {
                    email: admin_email.into(),
                    first_name: "Admin".into(),
                    last_name: slug.into(),
                    password_hash: password::hash_password(pw, &self.config.auth).unwrap(),
                    invited_by: None,
                },
            )
            .await
            .unwrap();
        (onboarded.tenant, onboarded.admin)
    }

    async fn superadmin(&self, email: &str, pw: &str) -> User {
        SurrealUserRepository::new(self.db.clone())
            .create(CreateUser {
                email: email.into(),
                password_hash: password::hash_password(pw, &self.config.auth).unwrap(),
                first_name: "Super".into(),
                last_name: "Admin".into(),
                phone: None,
                locale: None,
                role: Role::Superadmin,
            })
            .await
            .unwrap()
    }

    async fn user(&self, email: &str, role: Role) -> User {
        SurrealUserRepository::new(self.db.clone())
            .create(CreateUser {
                email: email.into(),
                password_hash: password::hash_password("member-pass", &self.config.auth).unwrap(),
                first_name: "Member".into(),
                last_name: "User".into(),
                phone: None,
                locale: None,
                role,
            })
            .await
            .unwrap()
    }

    /// Make every later audit append fail inside the database.
    async fn fail_audit_writes(&self) {
        self.db
            .query(
                "DEFINE EVENT OVERWRITE audit_offline ON TABLE audit_log \
                 WHEN $event = 'CREATE' THEN { THROW 'audit store offline'; };",
            )
            .await
            .unwrap()
            .check()
            .unwrap();
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        send(self.router.clone(), request).await
    }

    async fn login(&self, email: &str, pw: &str) -> (StatusCode, Value) {
        let form = format!("username={}&password={pw}", email.replace('@', "%40"));
        self.send(
            Request::post("/api/v1/auth/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await
    }

    async fn token(&self, email: &str, pw: &str) -> String {
        let (status, body) = self.login(email, pw).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["access_token"].as_str().unwrap().to_string()
    }
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get_as(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn json_as(method: &str, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_json(uri: &str, token: &str, body: Value) -> Request<Body> {
    json_as("POST", uri, token, body)
}

#[tokio::test]
async fn patient_of_another_tenant_is_not_found() {
    let app = app().await;
    app.tenant("clinic-a", "alice@a.test", "alice-pass").await;
    app.tenant("clinic-b", "bob@b.test", "bob-pass").await;
    let alice = app.token("alice@a.test", "alice-pass").await;
    let bob = app.token("bob@b.test", "bob-pass").await;

    let (status, p1) = app
        .send(post_json(
            "/api/v1/patients",
            &alice,
            json!({ "first_name": "Pablo", "last_name": "Uno" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{p1}");
    let uri = format!("/api/v1/patients/{}", p1["id"].as_str().unwrap());

    let (status, body) = app.send(get_as(&uri, &bob)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "patient not found");

    let (status, body) = app.send(get_as(&uri, &alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["first_name"], "Pablo");

    let (_, listing) = app.send(get_as("/api/v1/patients", &bob)).await;
    assert_eq!(listing["total"], 0);
}

#[tokio::test]
async fn superadmin_reads_across_tenants_by_path() {
    let app = app().await;
    let (a, alice) = app.tenant("clinic-a", "alice@a.test", "alice-pass").await;
    app.tenant("clinic-b", "bob@b.test", "bob-pass").await;
    app.superadmin("superadmin@example.com", "root-pass").await;

    let (status, login) = app.login("superadmin@example.com", "root-pass").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["tenant_id"], Value::Null);
    let root = login["access_token"].as_str().unwrap().to_string();

    let (status, tenants) = app.send(get_as("/api/v1/tenants", &root)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tenants["total"], 2);

    let (status, users) = app
        .send(get_as(&format!("/api/v1/tenants/{}/users", a.id), &root))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users["total"], 1);
    assert_eq!(users["items"][0]["user"]["id"], alice.id.to_string());
    assert!(users["items"][0]["user"].get("password_hash").is_none());

    let alice_token = app.token("alice@a.test", "alice-pass").await;
    let (status, _) = app.send(get_as("/api/v1/tenants", &alice_token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn expired_token_never_reaches_the_handler() {
    let app = app().await;
    let (a, alice) = app.tenant("clinic-a", "alice@a.test", "alice-pass").await;

    let hits = Arc::new(AtomicUsize::new(0));
    let spy_hits = hits.clone();
    let spy = Router::new()
        .route(
            "/spy",
            get(move |Authenticated(_ctx): Authenticated| {
                let hits = spy_hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    "ran"
                }
            }),
        )
        .with_state(app.state.clone());

    let now = Utc::now();
    let expired = issue_token_between(
        &TokenSubject {
            principal_id: alice.id,
            email: alice.email.clone(),
            role: Role::TenantAdmin,
            tenant_id: Some(a.id),
            impersonator_id: None,
        },
        now - chrono::Duration::hours(1),
        now - chrono::Duration::seconds(1),
        &app.config.auth,
    )
    .unwrap();

    let (status, body) = send(spy.clone(), get_as("/spy", &expired)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["detail"].as_str().unwrap().contains("expired"));
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let (status, _) = app.send(get_as("/api/v1/auth/me", &expired)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let fresh = app.token("alice@a.test", "alice-pass").await;
    let (status, _) = send(spy, get_as("/spy", &fresh)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn login_outcomes_are_audited() {
    let app = app().await;
    app.tenant("clinic-a", "alice@a.test", "alice-pass").await;
    app.superadmin("superadmin@example.com", "root-pass").await;

    let (status, body) = app.login("alice@a.test", "wrong").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.get("access_token").is_none());

    let (status, body) = app.login("Alice@A.test", "alice-pass").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "bearer");

    let root = app.token("superadmin@example.com", "root-pass").await;
    app.state.audit.flush().await;
    let (status, failures) = app
        .send(get_as("/api/v1/audit-logs?action=login_failure", &root))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(failures["total"], 1);
    assert_eq!(failures["items"][0]["user_email"], "alice@a.test");

    let (_, stats) = app.send(get_as("/api/v1/audit-logs/stats", &root)).await;
    assert_eq!(stats["login_failures_today"], 1);
    assert_eq!(stats["logins_today"], 2);
}

#[tokio::test]
async fn tenant_admin_invites_staff() {
    let app = app().await;
    let (a, _) = app.tenant("clinic-a", "alice@a.test", "alice-pass").await;
    let alice = app.token("alice@a.test", "alice-pass").await;

    let (status, invited) = app
        .send(post_json(
            &format!("/api/v1/tenants/{}/users", a.id),
            &alice,
            json!({
                "email": "closer@a.test",
                "first_name": "Carla",
                "last_name": "Closer",
                "role": "closer",
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{invited}");
    assert_eq!(invited["user_created"], true);
    assert_eq!(invited["member"]["membership"]["role"], "closer");
}

#[tokio::test]
async fn validation_failures_list_locations() {
    let app = app().await;
    app.superadmin("superadmin@example.com", "root-pass").await;
    let root = app.token("superadmin@example.com", "root-pass").await;

    let (status, body) = app
        .send(post_json(
            "/api/v1/tenants",
            &root,
            json!({
                "name": "Bad",
                "slug": "Bad Slug",
                "admin_email": "x@bad.test",
                "admin_first_name": "X",
                "admin_last_name": "Y",
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"][0]["loc"], json!(["body", "slug"]));

    let (status, body) = app
        .send(
            Request::post("/api/v1/auth/switch-tenant")
                .header(header::AUTHORIZATION, format!("Bearer {root}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"][0]["loc"], json!(["body"]));
}

#[tokio::test]
async fn tenant_creation_onboards_an_admin() {
    let app = app().await;
    app.superadmin("superadmin@example.com", "root-pass").await;
    let root = app.token("superadmin@example.com", "root-pass").await;

    let (status, body) = app
        .send(post_json(
            "/api/v1/tenants",
            &root,
            json!({
                "name": "Clinic A",
                "slug": "clinic-a",
                "admin_email": "alice@a.test",
                "admin_first_name": "Alice",
                "admin_last_name": "Admin",
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["admin_created"], true);
    assert_eq!(body["welcome_email_sent"], true);
    assert_eq!(body["membership"]["is_default"], true);

    let (status, _) = app
        .send(post_json(
            "/api/v1/tenants",
            &root,
            json!({
                "name": "Clinic A again",
                "slug": "clinic-a",
                "admin_email": "other@a.test",
                "admin_first_name": "O",
                "admin_last_name": "T",
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn password_reset_request_does_not_leak_accounts() {
    let app = app().await;
    app.tenant("clinic-a", "alice@a.test", "alice-pass").await;

    for email in ["alice@a.test", "nobody@nowhere.test"] {
        let (status, body) = app
            .send(
                Request::post("/api/v1/auth/password-reset/request")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "email": email }).to_string()))
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(body["detail"].is_string());
    }
}

#[tokio::test]
async fn health_reports_audit_counters() {
    let app = app().await;
    let (status, body) = app
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["audit"]["dropped"], 0);
}

#[tokio::test]
async fn only_the_platform_moves_a_tenant_between_plans() {
    let app = app().await;
    let (a, _) = app.tenant("clinic-a", "alice@a.test", "alice-pass").await;
    app.superadmin("superadmin@example.com", "root-pass").await;
    let alice = app.token("alice@a.test", "alice-pass").await;
    let root = app.token("superadmin@example.com", "root-pass").await;
    let uri = format!("/api/v1/tenants/{}", a.id);

    let (status, _) = app
        .send(json_as("PATCH", &uri, &alice, json!({ "plan": "enterprise" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let tenants = SurrealTenantRepository::new(app.db.clone());
    assert_eq!(tenants.get_by_id(a.id).await.unwrap().plan, "basic");

    let (status, body) = app
        .send(json_as("PATCH", &uri, &alice, json!({ "name": "Clinica A" })))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["name"], "Clinica A");

    let (status, body) = app
        .send(json_as("PATCH", &uri, &root, json!({ "plan": "enterprise" })))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["plan"], "enterprise");
}

#[tokio::test]
async fn tenant_stays_active_when_its_deactivation_is_not_recorded() {
    let app = app().await;
    let (a, _) = app.tenant("clinic-a", "alice@a.test", "alice-pass").await;
    app.superadmin("superadmin@example.com", "root-pass").await;
    let root = app.token("superadmin@example.com", "root-pass").await;
    app.fail_audit_writes().await;

    let (status, _) = app
        .send(post_json(
            &format!("/api/v1/tenants/{}/deactivate", a.id),
            &root,
            json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let tenant = SurrealTenantRepository::new(app.db.clone())
        .get_by_id(a.id)
        .await
        .unwrap();
    assert!(tenant.is_active);
}

#[tokio::test]
async fn config_change_is_undone_when_it_is_not_recorded() {
    let app = app().await;
    app.superadmin("superadmin@example.com", "root-pass").await;
    let root = app.token("superadmin@example.com", "root-pass").await;
    let configs = SurrealSystemConfigRepository::new(app.db.clone());
    configs
        .upsert(
            "max_upload_mb",
            UpsertSystemConfig {
                value: "10".into(),
                value_type: "int".into(),
                category: "limits".into(),
                description: Some("Upload ceiling".into()),
            },
        )
        .await
        .unwrap();
    app.fail_audit_writes().await;

    let body = json!({ "value": "99", "value_type": "int", "category": "limits" });
    let (status, _) = app
        .send(json_as("PUT", "/api/v1/system-config/max_upload_mb", &root, body.clone()))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let kept = configs.get("max_upload_mb").await.unwrap();
    assert_eq!(kept.value, "10");
    assert_eq!(kept.description.as_deref(), Some("Upload ceiling"));

    let (status, _) = app
        .send(json_as("PUT", "/api/v1/system-config/new_key", &root, body))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(matches!(
        configs.get("new_key").await,
        Err(ClinicError::NotFound { .. })
    ));
}

#[tokio::test]
async fn linked_patient_must_be_a_readable_patient_member() {
    let app = app().await;
    let (a, _) = app.tenant("clinic-a", "alice@a.test", "alice-pass").await;
    let alice = app.token("alice@a.test", "alice-pass").await;
    let members = SurrealMembershipRepository::new(app.db.clone());

    let stranger = app.user("stranger@a.test", Role::Patient).await;
    let (status, body) = app
        .send(post_json(
            "/api/v1/patients",
            &alice,
            json!({ "first_name": "Sara", "last_name": "Dos", "user_id": stranger.id }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");

    let patient = app.user("patient@a.test", Role::Patient).await;
    members
        .create(CreateMembership {
            user_id: patient.id,
            tenant_id: a.id,
            role: Role::Patient,
            is_default: true,
            invited_by: None,
        })
        .await
        .unwrap();
    let (status, body) = app
        .send(post_json(
            "/api/v1/patients",
            &alice,
            json!({ "first_name": "Pia", "last_name": "Tres", "user_id": patient.id }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    // A membership row that cannot be read is a server fault, not a
    // validation failure.
    app.db
        .query(
            "DEFINE FIELD OVERWRITE role ON TABLE membership TYPE string; \
             UPDATE membership SET role = 'archived' WHERE user_id = $user_id;",
        )
        .bind(("user_id", patient.id.to_string()))
        .await
        .unwrap()
        .check()
        .unwrap();
    let (status, _) = app
        .send(post_json(
            "/api/v1/patients",
            &alice,
            json!({ "first_name": "Pia", "last_name": "Cuatro", "user_id": patient.id }),
        ))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}
