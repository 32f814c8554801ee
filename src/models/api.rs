use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::job::{JobStatus, ModelOptions, OcrModel};

/// Request for a signed upload URL.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UploadUrlRequest {
    #[garde(length(min = 1, max = 255))]
    pub filename: String,

    #[garde(length(min = 1, max = 100))]
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

/// Signed upload URL and the key the artifact will live under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadUrlResponse {
    pub upload_url: String,
    #[serde(alias = "s3_key")]
    pub artifact_key: String,
    pub upload_id: String,
}

/// Submit an OCR job for an uploaded (or inline) artifact.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OcrRequest {
    #[garde(length(min = 1, max = 255))]
    pub filename: String,

    #[garde(length(min = 1, max = 1024))]
    #[serde(default, alias = "s3_key", skip_serializing_if = "Option::is_none")]
    pub artifact_key: Option<String>,

    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,

    #[garde(skip)]
    #[serde(default)]
    pub model: OcrModel,

    #[garde(dive)]
    #[serde(default)]
    pub options: ModelOptions,
}

/// Response after a job was accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrRequestResponse {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub output_key: Option<String>,
    #[serde(default)]
    pub inference_id: Option<String>,
}

/// Response for polling a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrStatusResponse {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One previously submitted job, as returned by the listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: String,
    pub filename: String,
    #[serde(alias = "s3Key")]
    pub artifact_key: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub model: OcrModel,
    #[serde(default)]
    pub model_options: ModelOptions,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobSummary>,
    pub count: usize,
}

/// Signed read URL for a stored artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrlResponse {
    pub url: String,
    #[serde(alias = "s3_key")]
    pub artifact_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: Vec<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub job_id: Option<String>,
}

/// Metadata recorded with each inference input, read back by the job listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetadata {
    pub job_id: String,
    pub filename: String,
    pub artifact_key: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Document handed to the inference backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceInput {
    pub s3_uri: String,
    pub output_key: String,
    pub model: OcrModel,
    pub model_options: ModelOptions,
    pub metadata: JobMetadata,
}
