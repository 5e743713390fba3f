//! Document upload, ingestion trigger, and status lookup.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::health::healthcheck_bypass;
use crate::core::errors::ApiError;
use crate::ingest::loader::mime_type_from_extension;
use crate::ingest::pipeline::ObjectCreatedEvent;
use crate::state::AppState;
use crate::storage::metadata::DocumentRecord;

#[derive(Debug, Deserialize)]
struct UploadRequest {
    #[serde(default)]
    file_content: String,
    #[serde(default)]
    file_name: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default = "default_user_id")]
    user_id: String,
}

fn default_user_id() -> String {
    "system".to_string()
}

/// Accept a base64-encoded document, stage it in the object store under
/// the conventional key, and record the `uploaded` metadata row.
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    if let Some(healthy) = healthcheck_bypass(&body, "Upload handler", &state.settings.stage) {
        return Ok(healthy.into_response());
    }

    let request: UploadRequest = serde_json::from_value(body)
        .map_err(|err| ApiError::Validation(format!("invalid upload request: {err}")))?;

    if request.file_content.is_empty() || request.file_name.is_empty() {
        return Err(ApiError::Validation(
            "File content and name are required".to_string(),
        ));
    }

    let mime_type = request
        .mime_type
        .unwrap_or_else(|| mime_type_from_extension(&request.file_name).to_string());

    let bytes = BASE64
        .decode(request.file_content.as_bytes())
        .map_err(|err| ApiError::Validation(format!("invalid base64 file content: {err}")))?;

    let document_id = Uuid::new_v4().to_string();
    let key = format!(
        "uploads/{}/{}/{}",
        request.user_id, document_id, request.file_name
    );
    let bucket = state.settings.documents_bucket.clone();

    state.objects.put(&bucket, &key, &bytes).await?;

    let record = DocumentRecord::uploaded(
        document_id.clone(),
        request.user_id,
        request.file_name.clone(),
        mime_type,
        bucket,
        key,
    );
    state.metadata.put(&record).await?;

    tracing::info!(
        document_id = document_id.as_str(),
        file_name = request.file_name.as_str(),
        "document uploaded"
    );

    Ok(Json(json!({
        "message": "File uploaded successfully",
        "document_id": document_id,
        "file_name": request.file_name,
    }))
    .into_response())
}

/// Storage-creation event: run the ingestion pipeline for one object.
pub async fn object_created(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    if let Some(healthy) = healthcheck_bypass(&body, "Document processor", &state.settings.stage) {
        return Ok(healthy.into_response());
    }

    let event: ObjectCreatedEvent = serde_json::from_value(body)
        .map_err(|err| ApiError::Validation(format!("invalid event: {err}")))?;
    if event.bucket.is_empty() || event.key.is_empty() {
        return Err(ApiError::Validation(
            "Bucket and key are required".to_string(),
        ));
    }

    let report = state.ingestion.ingest(&event).await?;

    Ok(Json(json!({
        "message": format!("Successfully processed document: {}", report.document_id),
        "document_id": report.document_id,
        "num_chunks": report.num_chunks,
    }))
    .into_response())
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
) -> Result<Response, ApiError> {
    let record = state
        .metadata
        .get(&document_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("document not found: {document_id}")))?;

    Ok(Json(record).into_response())
}
