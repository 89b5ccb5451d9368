//! Clinic Server: HTTP adapter over the auth, audit and storage crates.
//!
//! [`build_router`] assembles the `/api/v1` surface plus `/health`; the
//! binaries in this crate only load configuration, connect and serve.

use axum::extract::Request;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use axum::routing::get;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

pub use config::{ConfigError, ServerConfig};
pub use error::{ApiError, ApiResult};
pub use state::AppState;

use crate::error::ValidationDiagnostics;

/// Build the application router with its middleware stack.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let api = Router::new()
        .nest("/auth", routes::auth::router())
        .nest("/audit-logs", routes::audit::router())
        .nest("/tenants", routes::tenants::router())
        .nest("/patients", routes::patients::router())
        .nest("/plans", routes::platform::plans_router())
        .nest("/system-config", routes::platform::system_config_router());

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(routes::health))
        .layer(middleware::from_fn(log_validation_failures))
        .layer(cors_layer(&config.allowed_origins))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring malformed CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}

/// Log 422 responses with their path and field diagnostics. Request
/// bodies are not logged; they may carry credentials.
async fn log_validation_failures(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    if let Some(ValidationDiagnostics(errors)) = response.extensions().get::<ValidationDiagnostics>() {
        error!(%method, %path, ?errors, "Request failed validation");
    }
    response
}
