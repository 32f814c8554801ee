use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use garde::Validate;
use serde_json::Value;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{
    InferenceInput, JobMetadata, OcrRequest, OcrRequestResponse, OcrStatusResponse,
};
use crate::models::job::JobStatus;
use crate::routes::{job_id, user_id, RouteError};
use crate::services::storage::{
    failure_key, inference_input_key, input_key, output_key, sanitize_filename,
};

const DEFAULT_FAILURE_MESSAGE: &str = "OCR processing failed";

/// Content type recorded for an inline upload, by file extension.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// POST /api/ocr: record the job and invoke inference asynchronously.
pub async fn submit_ocr(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut request): Json<OcrRequest>,
) -> Result<Json<OcrRequestResponse>, RouteError> {
    request.options = std::mem::take(&mut request.options).for_model(request.model);
    request
        .validate()
        .map_err(|e| RouteError::BadRequest(e.to_string()))?;
    let user = user_id(&headers, &state.config.default_user)?;
    let job_id = Uuid::new_v4().to_string();
    let filename = sanitize_filename(&request.filename);

    let artifact_key = match (request.artifact_key.as_deref(), request.image_base64.as_deref()) {
        (Some(key), None) => {
            if key.split('/').any(|seg| seg == "..") {
                return Err(RouteError::BadRequest("Invalid artifact_key".to_string()));
            }
            key.to_string()
        }
        (None, Some(encoded)) => {
            let bytes = STANDARD
                .decode(encoded.trim())
                .map_err(|e| RouteError::BadRequest(format!("image_base64 is not valid base64: {e}")))?;
            if bytes.len() as u64 > state.config.max_upload_bytes {
                return Err(RouteError::PayloadTooLarge(format!(
                    "Image is {} bytes, larger than the {} byte limit",
                    bytes.len(),
                    state.config.max_upload_bytes
                )));
            }
            let key = input_key(&user, &job_id, &filename);
            state
                .storage
                .put(&key, &bytes, content_type_for(&filename))
                .await?;
            tracing::debug!(job_id = %job_id, key = %key, bytes = bytes.len(), "Stored inline image");
            key
        }
        _ => {
            return Err(RouteError::BadRequest(
                "Exactly one of artifact_key or image_base64 is required".to_string(),
            ))
        }
    };

    let output_key = output_key(&user, &job_id);
    let input = InferenceInput {
        s3_uri: state.storage.uri(&artifact_key),
        output_key: output_key.clone(),
        model: request.model,
        model_options: request.options,
        metadata: JobMetadata {
            job_id: job_id.clone(),
            filename,
            artifact_key,
            created_at: Utc::now(),
        },
    };
    let document =
        serde_json::to_vec(&input).map_err(|e| RouteError::Internal(e.to_string()))?;
    let document_key = inference_input_key(&user, &job_id);
    state
        .storage
        .put(&document_key, &document, "application/json")
        .await?;

    let inference_id = state
        .inference
        .invoke_async(&state.storage.uri(&document_key))
        .await?;

    metrics::counter!("ocr_jobs_submitted_total", "model" => request.model.to_string()).increment(1);
    tracing::info!(
        job_id = %job_id,
        model = %request.model,
        inference_id = ?inference_id,
        "OCR job submitted"
    );

    Ok(Json(OcrRequestResponse {
        job_id,
        status: JobStatus::Processing,
        output_key: Some(output_key),
        inference_id,
    }))
}

/// Message from a failure document: `message`, else `error`, else a generic one.
pub fn failure_message(document: &[u8]) -> String {
    serde_json::from_slice::<Value>(document)
        .ok()
        .and_then(|doc| {
            ["message", "error"]
                .iter()
                .find_map(|field| doc.get(*field).and_then(Value::as_str).map(str::to_string))
        })
        .filter(|msg| !msg.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string())
}

/// GET /api/ocr/{job_id}: status derived from which output object exists.
pub async fn get_ocr_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_job_id): Path<String>,
) -> Result<Json<OcrStatusResponse>, RouteError> {
    let user = user_id(&headers, &state.config.default_user)?;
    let job_id = job_id(&raw_job_id)?;
    metrics::counter!("ocr_status_checks_total").increment(1);

    if let Some(bytes) = state.storage.get(&output_key(&user, job_id)).await? {
        let result: Value = serde_json::from_slice(&bytes)
            .map_err(|e| RouteError::Internal(format!("Stored result is not JSON: {e}")))?;
        tracing::debug!(job_id, "Job completed");
        return Ok(Json(OcrStatusResponse {
            status: JobStatus::Completed,
            result: Some(result),
            error: None,
        }));
    }

    if let Some(bytes) = state.storage.get(&failure_key(&user, job_id)).await? {
        let message = failure_message(&bytes);
        tracing::debug!(job_id, error = %message, "Job failed");
        return Ok(Json(OcrStatusResponse {
            status: JobStatus::Failed,
            result: None,
            error: Some(message),
        }));
    }

    Ok(Json(OcrStatusResponse {
        status: JobStatus::Processing,
        result: None,
        error: None,
    }))
}
