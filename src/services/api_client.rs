use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::models::api::{
    DeleteResponse, ImageUrlResponse, JobListResponse, JobSummary, OcrRequest, OcrRequestResponse,
    OcrStatusResponse, UploadUrlRequest, UploadUrlResponse,
};

/// The upload, submit and poll API consumed by the client.
#[async_trait]
pub trait OcrApi: Send + Sync {
    /// Ask for a signed PUT URL for a new artifact.
    async fn request_upload_url(
        &self,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadUrlResponse, ApiError>;

    /// PUT raw bytes to a signed URL.
    async fn upload(&self, upload_url: &str, bytes: &[u8], content_type: &str) -> Result<(), ApiError>;

    async fn submit(&self, request: &OcrRequest) -> Result<OcrRequestResponse, ApiError>;

    async fn poll(&self, job_id: &str) -> Result<OcrStatusResponse, ApiError>;

    async fn list_jobs(&self) -> Result<Vec<JobSummary>, ApiError>;

    /// Signed read URL for a stored artifact.
    async fn image_url(&self, artifact_key: &str) -> Result<String, ApiError>;

    /// GET raw bytes from a signed URL.
    async fn download(&self, url: &str) -> Result<Vec<u8>, ApiError>;

    async fn delete_artifact(
        &self,
        artifact_key: &str,
        job_id: Option<&str>,
    ) -> Result<DeleteResponse, ApiError>;
}

/// HTTP implementation of [`OcrApi`].
pub struct HttpOcrApi {
    http: Client,
    base_url: String,
    user_id: Option<String>,
}

impl HttpOcrApi {
    pub fn new(base_url: &str, timeout: Duration, user_id: Option<String>) -> Result<Self, ApiError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url).map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url));
        }
        let http = Client::builder().timeout(timeout).build().map_err(ApiError::Http)?;
        Ok(Self {
            http,
            base_url,
            user_id,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Base URL extended by `prefix` and then by each `/`-separated segment
    /// of `key`, every segment escaped on its own.
    fn key_url(&self, prefix: &[&str], key: &str) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(prefix.iter().copied())
            .extend(key.split('/'));
        Ok(url)
    }

    fn with_user(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.user_id {
            Some(user) => req.header("x-user-id", user),
            None => req,
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T, ApiError> {
        let response = self.with_user(req).send().await.map_err(ApiError::Http)?;
        let response = check_status(response).await?;
        let body = response.bytes().await.map_err(ApiError::Http)?;
        serde_json::from_slice(&body).map_err(ApiError::Decode)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl OcrApi for HttpOcrApi {
    async fn request_upload_url(
        &self,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadUrlResponse, ApiError> {
        let body = UploadUrlRequest {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
        };
        self.send_json(self.http.post(self.url("/api/upload-url")).json(&body))
            .await
    }

    async fn upload(&self, upload_url: &str, bytes: &[u8], content_type: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .put(upload_url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(ApiError::Http)?;
        check_status(response).await?;
        Ok(())
    }

    async fn submit(&self, request: &OcrRequest) -> Result<OcrRequestResponse, ApiError> {
        self.send_json(self.http.post(self.url("/api/ocr")).json(request))
            .await
    }

    async fn poll(&self, job_id: &str) -> Result<OcrStatusResponse, ApiError> {
        let url = self.key_url(&["api", "ocr"], job_id)?;
        self.send_json(self.http.get(url)).await
    }

    async fn list_jobs(&self) -> Result<Vec<JobSummary>, ApiError> {
        let list: JobListResponse = self.send_json(self.http.get(self.url("/api/jobs"))).await?;
        Ok(list.jobs)
    }

    async fn image_url(&self, artifact_key: &str) -> Result<String, ApiError> {
        let url = self.key_url(&["api", "images"], artifact_key)?;
        let resp: ImageUrlResponse = self.send_json(self.http.get(url)).await?;
        Ok(resp.url)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let response = self.http.get(url).send().await.map_err(ApiError::Http)?;
        let response = check_status(response).await?;
        let bytes = response.bytes().await.map_err(ApiError::Http)?;
        Ok(bytes.to_vec())
    }

    async fn delete_artifact(
        &self,
        artifact_key: &str,
        job_id: Option<&str>,
    ) -> Result<DeleteResponse, ApiError> {
        let mut req = self.http.delete(self.key_url(&["api", "images"], artifact_key)?);
        if let Some(id) = job_id {
            req = req.query(&[("job_id", id)]);
        }
        self.send_json(req).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Worth retrying: transport failures, timeouts, 5xx, 429 and garbled
    /// bodies. Other 4xx responses will not change on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Http(_) | ApiError::Decode(_) => true,
            ApiError::InvalidUrl(_) => false,
            ApiError::Status { status, .. } => {
                let code = StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                code.is_server_error() || code == StatusCode::TOO_MANY_REQUESTS
            }
        }
    }
}
