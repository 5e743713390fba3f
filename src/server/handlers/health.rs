use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "stage": state.settings.stage,
    }))
}

/// `{"action": "healthcheck"}` in any request body bypasses pipeline logic
/// and answers with a fixed healthy payload.
pub fn healthcheck_bypass(body: &Value, component: &str, stage: &str) -> Option<Json<Value>> {
    if body.get("action").and_then(|v| v.as_str()) == Some("healthcheck") {
        Some(Json(json!({
            "message": format!("{component} is healthy"),
            "stage": stage,
        })))
    } else {
        None
    }
}
