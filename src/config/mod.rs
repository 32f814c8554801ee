use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::lifecycle::PollConfig;
use crate::services::page_source::{RenderOptions, DEFAULT_PDF_RENDER_SCALE, MAX_ARTIFACT_BYTES};

/// Server configuration, read from the environment.
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Bucket holding uploads, inference inputs, results and failures
    pub s3_bucket: String,

    /// S3-compatible endpoint URL
    pub s3_endpoint: String,

    #[serde(default = "default_region")]
    pub s3_region: String,

    pub s3_access_key: String,

    pub s3_secret_key: String,

    /// Async inference endpoint invoked for every accepted job
    pub inference_endpoint: String,

    pub inference_api_token: Option<String>,

    /// Lifetime of signed upload URLs
    #[serde(default = "default_upload_url_ttl")]
    pub upload_url_ttl_secs: u64,

    /// Lifetime of signed image read URLs
    #[serde(default = "default_image_url_ttl")]
    pub image_url_ttl_secs: u64,

    /// Largest request body accepted (inline base64 submissions)
    #[serde(default = "default_max_bytes")]
    pub max_upload_bytes: u64,

    /// User id when no `x-user-id` header is present
    #[serde(default = "default_user")]
    pub default_user: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_region() -> String {
    "auto".to_string()
}

fn default_upload_url_ttl() -> u64 {
    300
}

fn default_image_url_ttl() -> u64 {
    3600
}

fn default_max_bytes() -> u64 {
    MAX_ARTIFACT_BYTES
}

fn default_user() -> String {
    "anonymous".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn upload_url_ttl(&self) -> Duration {
        Duration::from_secs(self.upload_url_ttl_secs)
    }

    pub fn image_url_ttl(&self) -> Duration {
        Duration::from_secs(self.image_url_ttl_secs)
    }
}

/// Client configuration, read from `OCR_`-prefixed environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_poll_error_interval")]
    pub poll_error_interval_ms: u64,

    #[serde(default = "default_max_bytes")]
    pub max_artifact_bytes: u64,

    #[serde(default = "default_pdf_render_scale")]
    pub pdf_render_scale: f32,

    /// Directory holding the pdfium shared library; system lookup otherwise
    pub pdfium_lib_path: Option<PathBuf>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Sent as `x-user-id`
    pub user_id: Option<String>,
}

fn default_api_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_poll_interval() -> u64 {
    3000
}

fn default_poll_error_interval() -> u64 {
    5000
}

fn default_pdf_render_scale() -> f32 {
    DEFAULT_PDF_RENDER_SCALE
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            poll_interval_ms: default_poll_interval(),
            poll_error_interval_ms: default_poll_error_interval(),
            max_artifact_bytes: default_max_bytes(),
            pdf_render_scale: default_pdf_render_scale(),
            pdfium_lib_path: None,
            request_timeout_secs: default_request_timeout(),
            user_id: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::prefixed("OCR_").from_env()
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            error_interval: Duration::from_millis(self.poll_error_interval_ms),
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            pdf_scale: self.pdf_render_scale,
            pdfium_lib_path: self.pdfium_lib_path.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_defaults() {
        let config: ClientConfig = envy::prefixed("OCR_TEST_UNSET_")
            .from_iter(Vec::<(String, String)>::new())
            .unwrap();
        assert_eq!(config.poll_interval_ms, 3000);
        assert_eq!(config.poll_error_interval_ms, 5000);
        assert_eq!(config.max_artifact_bytes, 100 * 1024 * 1024);
        assert_eq!(config.poll_config().interval, Duration::from_millis(3000));
    }

    #[test]
    fn test_app_config_from_vars() {
        let vars = vec![
            ("S3_BUCKET".to_string(), "ocr".to_string()),
            ("S3_ENDPOINT".to_string(), "http://localhost:9000".to_string()),
            ("S3_ACCESS_KEY".to_string(), "key".to_string()),
            ("S3_SECRET_KEY".to_string(), "secret".to_string()),
            ("INFERENCE_ENDPOINT".to_string(), "http://localhost:8080/invoke".to_string()),
            ("UPLOAD_URL_TTL_SECS".to_string(), "60".to_string()),
        ];
        let config: AppConfig = envy::from_iter(vars).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.s3_region, "auto");
        assert_eq!(config.upload_url_ttl(), Duration::from_secs(60));
        assert_eq!(config.image_url_ttl(), Duration::from_secs(3600));
        assert_eq!(config.default_user, "anonymous");
        assert!(config.inference_api_token.is_none());
    }
}
