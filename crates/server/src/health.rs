use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

#[derive(Clone, Copy, Debug)]
pub struct HealthState {
    pub multi_tenant: bool,
    pub signature_enforced: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub tenancy: &'static str,
    pub signature_verification: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let signature_verification = if state.signature_enforced {
        HealthCheck { status: "enforced", detail: "inbound requests must be signed".to_string() }
    } else {
        HealthCheck {
            status: "disabled",
            detail: "no signing secret configured; requests are not authenticated".to_string(),
        }
    };

    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "turnwire-server dispatcher initialized".to_string(),
        },
        tenancy: if state.multi_tenant { "multi_tenant" } else { "single_tenant" },
        signature_verification,
        checked_at: Utc::now().to_rfc3339(),
    };
    (StatusCode::OK, Json(payload))
}
