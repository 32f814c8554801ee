use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Asynchronous inference endpoint. An invocation only enqueues work: the
/// backend later writes `result.json` (or `error.json`) to the object store.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Enqueue the job described by the inference input document at
    /// `input_location`. Returns the backend's invocation id, if it issues one.
    async fn invoke_async(&self, input_location: &str) -> Result<Option<String>, InferenceError>;
}

/// HTTP client for an async inference endpoint.
pub struct HttpInferenceClient {
    http: Client,
    endpoint: String,
    api_token: Option<String>,
}

#[derive(Serialize)]
struct InvokeRequest<'a> {
    input_location: &'a str,
    content_type: &'a str,
}

#[derive(Deserialize)]
struct InvokeResponse {
    #[serde(default, alias = "InferenceId")]
    inference_id: Option<String>,
}

impl HttpInferenceClient {
    pub fn new(endpoint: &str, api_token: Option<String>) -> Result<Self, InferenceError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(InferenceError::Http)?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            api_token,
        })
    }
}

#[async_trait]
impl InferenceBackend for HttpInferenceClient {
    async fn invoke_async(&self, input_location: &str) -> Result<Option<String>, InferenceError> {
        let mut request = self.http.post(&self.endpoint).json(&InvokeRequest {
            input_location,
            content_type: "application/json",
        });
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(InferenceError::Http)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await.map_err(InferenceError::Http)?;
        if body.is_empty() {
            return Ok(None);
        }
        let parsed: InvokeResponse = serde_json::from_slice(&body).map_err(InferenceError::Parse)?;
        Ok(parsed.inference_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Inference endpoint returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Failed to parse inference endpoint response: {0}")]
    Parse(#[from] serde_json::Error),
}
