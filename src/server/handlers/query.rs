use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use super::health::healthcheck_bypass;
use crate::core::errors::ApiError;
use crate::query::pipeline::QueryRequest;
use crate::state::AppState;

pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    if let Some(healthy) = healthcheck_bypass(&body, "Query processor", &state.settings.stage) {
        return Ok(healthy.into_response());
    }

    let request: QueryRequest = serde_json::from_value(body)
        .map_err(|err| ApiError::Validation(format!("invalid query request: {err}")))?;

    let response = state.query.execute(request).await?;
    Ok(Json(response).into_response())
}
