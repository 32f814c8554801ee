//! Test doubles shared by the integration tests: an in-memory object store, a
//! recording inference backend and a scripted OCR API.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ocr_overlay::app_state::AppState;
use ocr_overlay::config::AppConfig;
use ocr_overlay::models::api::{
    DeleteResponse, JobSummary, OcrRequest, OcrRequestResponse, OcrStatusResponse, UploadUrlResponse,
};
use ocr_overlay::models::job::JobStatus;
use ocr_overlay::services::api_client::{ApiError, OcrApi};
use ocr_overlay::services::inference::{InferenceBackend, InferenceError};
use ocr_overlay::services::page_source::{Artifact, PageSource, RenderOptions, MAX_ARTIFACT_BYTES};
use ocr_overlay::services::storage::{ObjectStore, StorageError};

use crate::fixtures::PNG_HEADER;

// ── Object store ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    pub unhealthy: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, key: &str, data: &[u8], content_type: &str) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                content_type: content_type.to_string(),
            },
        );
    }

    pub fn insert_json(&self, key: &str, value: &Value) {
        self.insert(key, &serde_json::to_vec(value).unwrap(), "application/json");
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn json(&self, key: &str) -> Option<Value> {
        self.object(key).map(|o| serde_json::from_slice(&o.data).unwrap())
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn presign_put(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        Ok(format!("https://storage.test/{key}?method=PUT&expires={}", ttl.as_secs()))
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        Ok(format!("https://storage.test/{key}?method=GET&expires={}", ttl.as_secs()))
    }

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        self.insert(key, data, content_type);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.object(key).map(|o| o.data))
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn uri(&self, key: &str) -> String {
        format!("s3://test-bucket/{key}")
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        if self.unhealthy.load(Ordering::SeqCst) {
            return Err(StorageError::Status {
                key: String::new(),
                status: 503,
            });
        }
        Ok(())
    }
}

// ── Inference backend ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingInference {
    pub invocations: Mutex<Vec<String>>,
    pub reject: AtomicBool,
}

impl RecordingInference {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceBackend for RecordingInference {
    async fn invoke_async(&self, input_location: &str) -> Result<Option<String>, InferenceError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(InferenceError::Rejected {
                status: 503,
                body: "endpoint unavailable".to_string(),
            });
        }
        let mut calls = self.invocations.lock().unwrap();
        calls.push(input_location.to_string());
        Ok(Some(format!("inf-{}", calls.len())))
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        s3_bucket: "test-bucket".to_string(),
        s3_endpoint: "http://localhost:9000".to_string(),
        s3_region: "auto".to_string(),
        s3_access_key: "key".to_string(),
        s3_secret_key: "secret".to_string(),
        inference_endpoint: "http://localhost:8080/invoke".to_string(),
        inference_api_token: None,
        upload_url_ttl_secs: 300,
        image_url_ttl_secs: 3600,
        max_upload_bytes: 1024 * 1024,
        default_user: "anonymous".to_string(),
    }
}

pub fn test_state() -> (AppState, Arc<MemoryStore>, Arc<RecordingInference>) {
    let store = MemoryStore::new();
    let inference = RecordingInference::new();
    let state = AppState::new(store.clone(), inference.clone(), test_config());
    (state, store, inference)
}

// ── OCR API ──────────────────────────────────────────────────────────────────

/// One scripted answer to a poll.
#[derive(Debug, Clone)]
pub enum PollReply {
    Processing,
    Completed(Value),
    CompletedWithoutResult,
    Failed(Option<String>),
    /// Retryable (HTTP 503)
    Transient,
    /// Not retryable
    Fatal(u16),
}

#[derive(Debug, Default)]
pub struct CallCounts {
    pub upload_url: AtomicUsize,
    pub upload: AtomicUsize,
    pub submit: AtomicUsize,
    pub poll: AtomicUsize,
    pub list: AtomicUsize,
    pub delete: AtomicUsize,
}

impl CallCounts {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Scripted stand-in for the HTTP API. Polls beyond the script report
/// `processing`.
#[derive(Default)]
pub struct FakeOcrApi {
    pub calls: CallCounts,
    pub fail_upload: AtomicBool,
    pub fail_submit: AtomicBool,
    poll_script: Mutex<VecDeque<PollReply>>,
    poll_latency: Mutex<Option<Duration>>,
    jobs: Mutex<Vec<JobSummary>>,
    pub submitted: Mutex<Vec<OcrRequest>>,
    pub deleted: Mutex<Vec<(String, Option<String>)>>,
    pub artifact: Mutex<Option<Vec<u8>>>,
}

impl FakeOcrApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, replies: impl IntoIterator<Item = PollReply>) {
        self.poll_script.lock().unwrap().extend(replies);
    }

    /// Each poll takes this long to answer.
    pub fn set_poll_latency(&self, latency: Duration) {
        *self.poll_latency.lock().unwrap() = Some(latency);
    }

    pub fn set_jobs(&self, jobs: Vec<JobSummary>) {
        *self.jobs.lock().unwrap() = jobs;
    }

    pub fn polls(&self) -> usize {
        CallCounts::get(&self.calls.poll)
    }

    pub fn submits(&self) -> usize {
        CallCounts::get(&self.calls.submit)
    }
}

fn status_error(status: u16) -> ApiError {
    ApiError::Status {
        status,
        body: String::new(),
    }
}

#[async_trait]
impl OcrApi for FakeOcrApi {
    async fn request_upload_url(
        &self,
        filename: &str,
        _content_type: &str,
    ) -> Result<UploadUrlResponse, ApiError> {
        let n = self.calls.upload_url.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(UploadUrlResponse {
            upload_url: format!("https://storage.test/uploads/u{n}/{filename}?method=PUT"),
            artifact_key: format!("uploads/u{n}/{filename}"),
            upload_id: format!("u{n}"),
        })
    }

    async fn upload(&self, _upload_url: &str, _bytes: &[u8], _content_type: &str) -> Result<(), ApiError> {
        self.calls.upload.fetch_add(1, Ordering::SeqCst);
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(status_error(403));
        }
        Ok(())
    }

    async fn submit(&self, request: &OcrRequest) -> Result<OcrRequestResponse, ApiError> {
        let n = self.calls.submit.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(status_error(500));
        }
        self.submitted.lock().unwrap().push(request.clone());
        Ok(OcrRequestResponse {
            job_id: format!("job-{n}"),
            status: JobStatus::Processing,
            output_key: Some(format!("output/anonymous/job-{n}/result.json")),
            inference_id: None,
        })
    }

    async fn poll(&self, _job_id: &str) -> Result<OcrStatusResponse, ApiError> {
        self.calls.poll.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .poll_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PollReply::Processing);
        let latency = *self.poll_latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let respond = |status, result, error| OcrStatusResponse { status, result, error };
        match reply {
            PollReply::Processing => Ok(respond(JobStatus::Processing, None, None)),
            PollReply::Completed(result) => Ok(respond(JobStatus::Completed, Some(result), None)),
            PollReply::CompletedWithoutResult => Ok(respond(JobStatus::Completed, None, None)),
            PollReply::Failed(error) => Ok(respond(JobStatus::Failed, None, error)),
            PollReply::Transient => Err(status_error(503)),
            PollReply::Fatal(code) => Err(status_error(code)),
        }
    }

    async fn list_jobs(&self) -> Result<Vec<JobSummary>, ApiError> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        Ok(self.jobs.lock().unwrap().clone())
    }

    async fn image_url(&self, artifact_key: &str) -> Result<String, ApiError> {
        Ok(format!("https://storage.test/{artifact_key}?method=GET"))
    }

    async fn download(&self, _url: &str) -> Result<Vec<u8>, ApiError> {
        self.artifact
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| status_error(404))
    }

    async fn delete_artifact(
        &self,
        artifact_key: &str,
        job_id: Option<&str>,
    ) -> Result<DeleteResponse, ApiError> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        self.deleted
            .lock()
            .unwrap()
            .push((artifact_key.to_string(), job_id.map(str::to_string)));
        Ok(DeleteResponse {
            deleted: vec![artifact_key.to_string()],
            message: "Deleted 1 objects".to_string(),
        })
    }
}

/// A single-page image source with a valid PNG signature.
pub async fn png_source(filename: &str) -> PageSource {
    let artifact = Artifact::from_bytes(filename, PNG_HEADER.to_vec(), MAX_ARTIFACT_BYTES)
        .expect("PNG signature should be recognized");
    PageSource::open(artifact, RenderOptions::default())
        .await
        .expect("image sources open without rendering")
}
