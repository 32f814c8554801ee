use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;

use crate::app_state::AppState;
use crate::models::api::{DeleteQuery, DeleteResponse, ImageUrlResponse};
use crate::routes::{job_id, user_id, RouteError};
use crate::services::storage::{failure_prefix, job_input_prefix, output_prefix};

fn require_key(key: &str) -> Result<(), RouteError> {
    if key.is_empty() {
        return Err(RouteError::BadRequest("Missing artifact key".to_string()));
    }
    Ok(())
}

/// GET /api/images/{*key}: signed read URL for a stored artifact.
pub async fn get_image_url(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ImageUrlResponse>, RouteError> {
    require_key(&key)?;
    if !state.storage.exists(&key).await? {
        return Err(RouteError::NotFound("Image not found".to_string()));
    }
    let url = state
        .storage
        .presign_get(&key, state.config.image_url_ttl())
        .await?;
    Ok(Json(ImageUrlResponse {
        url,
        artifact_key: key,
    }))
}

/// DELETE /api/images/{*key}?job_id=: remove an artifact and, given a job id,
/// everything stored for that job.
pub async fn delete_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<DeleteResponse>, RouteError> {
    require_key(&key)?;
    let mut deleted = Vec::new();

    if state.storage.exists(&key).await? {
        state.storage.delete(&key).await?;
        deleted.push(key);
    }

    if let Some(raw) = query.job_id.as_deref().filter(|id| !id.is_empty()) {
        let user = user_id(&headers, &state.config.default_user)?;
        let job = job_id(raw)?;
        for prefix in [
            output_prefix(&user, job),
            failure_prefix(&user, job),
            job_input_prefix(&user, job),
        ] {
            for object in state.storage.list(&prefix).await? {
                if deleted.contains(&object) {
                    continue;
                }
                state.storage.delete(&object).await?;
                deleted.push(object);
            }
        }
    }

    tracing::info!(objects = deleted.len(), job_id = ?query.job_id, "Deleted stored objects");
    let message = format!("Deleted {} objects", deleted.len());
    Ok(Json(DeleteResponse { deleted, message }))
}
