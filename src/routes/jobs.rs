use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use crate::app_state::AppState;
use crate::models::api::{InferenceInput, JobListResponse, JobSummary};
use crate::models::job::JobStatus;
use crate::routes::{user_id, RouteError};
use crate::services::storage::{failure_key, input_prefix, output_key};

/// GET /api/jobs: the caller's jobs, newest first.
///
/// Every accepted job leaves an inference input document; its status is
/// derived from whether a result or failure object exists next to it.
pub async fn list_jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<JobListResponse>, RouteError> {
    let user = user_id(&headers, &state.config.default_user)?;
    let keys = state.storage.list(&input_prefix(&user)).await?;

    let mut jobs = Vec::new();
    for key in keys.iter().filter(|k| k.ends_with("/inference-input.json")) {
        let Some(bytes) = state.storage.get(key).await? else {
            continue;
        };
        let input: InferenceInput = match serde_json::from_slice(&bytes) {
            Ok(input) => input,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Skipping unreadable inference input");
                continue;
            }
        };

        let job_id = &input.metadata.job_id;
        let status = if state.storage.exists(&output_key(&user, job_id)).await? {
            JobStatus::Completed
        } else if state.storage.exists(&failure_key(&user, job_id)).await? {
            JobStatus::Failed
        } else {
            JobStatus::Processing
        };

        jobs.push(JobSummary {
            id: input.metadata.job_id,
            filename: input.metadata.filename,
            artifact_key: input.metadata.artifact_key,
            created_at: input.metadata.created_at,
            model: input.model,
            model_options: input.model_options,
            status,
        });
    }

    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    tracing::debug!(user = %user, count = jobs.len(), "Listed jobs");

    let count = jobs.len();
    Ok(Json(JobListResponse { jobs, count }))
}
