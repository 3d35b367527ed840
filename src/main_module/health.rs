//! Health check handlers

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use std::sync::Arc;

use crate::shared::state::AppState;

/// Liveness plus a presence report for the configuration this service
/// depends on. Reports whether each value is set, never the value itself.
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let db_ok = state.conn.get().is_ok();

    let status = if db_ok { "ok" } else { "degraded" };
    let code = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(serde_json::json!({
            "status": status,
            "service": "crmserver",
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": Utc::now().to_rfc3339(),
            "database": db_ok,
            "env": {
                "BREVO_API_KEY": state.config.brevo.api_key.is_some(),
                "AUTH_BASE_URL": state.config.auth.base_url.is_some(),
                "AUTH_SERVICE_KEY": state.config.auth.service_key.is_some(),
                "UNSUBSCRIBE_SECRET": state.config.unsubscribe.secret.is_some(),
                "CRM_OWNER_ID": state.config.crm.owner_id.is_some(),
            },
        })),
    )
}

pub async fn health_check_simple() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "crmserver",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}
