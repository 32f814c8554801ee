use axum::extract::State;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{UploadUrlRequest, UploadUrlResponse};
use crate::routes::RouteError;
use crate::services::storage::{sanitize_filename, upload_key};

/// POST /api/upload-url: signed PUT URL for a new artifact.
pub async fn create_upload_url(
    State(state): State<AppState>,
    Json(request): Json<UploadUrlRequest>,
) -> Result<Json<UploadUrlResponse>, RouteError> {
    request
        .validate()
        .map_err(|e| RouteError::BadRequest(e.to_string()))?;

    let upload_id = Uuid::new_v4().to_string();
    let artifact_key = upload_key(&upload_id, &sanitize_filename(&request.filename));
    let upload_url = state
        .storage
        .presign_put(&artifact_key, state.config.upload_url_ttl())
        .await?;

    metrics::counter!("ocr_upload_urls_issued_total").increment(1);
    tracing::info!(
        artifact_key = %artifact_key,
        content_type = %request.content_type,
        "Issued upload URL"
    );

    Ok(Json(UploadUrlResponse {
        upload_url,
        artifact_key,
        upload_id,
    }))
}
