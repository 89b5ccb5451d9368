//! HTTP routes, grouped by resource.

use axum::Json;
use axum::extract::State;
use clinic_audit::AuditActor;
use clinic_auth::{AuthContext, ClientInfo};
use serde_json::{Value, json};

use crate::state::AppState;

pub mod audit;
pub mod auth;
pub mod patients;
pub mod platform;
pub mod tenants;

/// Audit actor for the caller of the current request.
pub(crate) fn actor(ctx: &AuthContext, client: &ClientInfo) -> AuditActor {
    ctx.audit_actor(client.ip_address.clone(), client.user_agent.clone())
}

/// Liveness plus the best-effort audit path's counters.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let counters = state.audit.counters();
    Json(json!({
        "status": "ok",
        "audit": {
            "queued": counters.queued,
            "dropped": counters.dropped,
            "failed": counters.failed,
            "pending": counters.pending,
        },
    }))
}
