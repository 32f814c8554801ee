//! Client-side job lifecycle: upload, submit, poll, terminal state.
//!
//! [`JobRunner`] owns the poll scheduler and mutates jobs only through the
//! shared [`JobStore`](crate::services::job_store::JobStore). The state of the
//! job currently being viewed is published on a `watch` channel.

use chrono::Utc;
use garde::Validate;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::models::api::OcrRequest;
use crate::models::job::{Job, JobPhase, JobStatus, ModelOptions, OcrModel};
use crate::models::result::{JobResult, Rendition};
use crate::services::api_client::{ApiError, OcrApi};
use crate::services::job_store::{JobStore, SharedJobStore};
use crate::services::normalizer::normalize_job_result;
use crate::services::page_source::{Artifact, PageSource};
use crate::services::poller::{PollScheduler, PollToken};

const DEFAULT_FAILURE_MESSAGE: &str = "OCR processing failed";

/// Poll cadence.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Delay between polls while the job is processing.
    pub interval: Duration,
    /// Delay after a transient poll error.
    pub error_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(3000),
            error_interval: Duration::from_millis(5000),
        }
    }
}

/// What the view layer sees: the current job, its phase and any error.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleState {
    pub job_id: Option<String>,
    pub phase: JobPhase,
    pub error: Option<String>,
}

impl LifecycleState {
    fn idle() -> Self {
        Self {
            job_id: None,
            phase: JobPhase::Idle,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, JobPhase::Completed | JobPhase::Failed)
    }
}

struct Inner {
    api: Arc<dyn OcrApi>,
    store: SharedJobStore,
    config: PollConfig,
    state_tx: watch::Sender<LifecycleState>,
}

impl Inner {
    /// Publish `phase` for `job_id` if it is the job being viewed.
    fn publish(&self, store: &JobStore, job_id: &str, phase: JobPhase, error: Option<String>) {
        if store.current_id() != Some(job_id) {
            return;
        }
        self.state_tx.send_replace(LifecycleState {
            job_id: Some(job_id.to_string()),
            phase,
            error,
        });
    }

    fn fail_locked(&self, store: &mut JobStore, job_id: &str, message: &str) {
        let mut failed = false;
        let mut recorded = None;
        store.update(job_id, |job| {
            failed = !job.is_terminal();
            job.fail(message);
            if job.status == JobStatus::Failed {
                recorded = job.error.clone();
            }
        });
        if failed {
            metrics::counter!("ocr_client_jobs_failed_total").increment(1);
            warn!(job_id, error = message, "Job failed");
        }
        if recorded.is_some() {
            self.publish(store, job_id, JobPhase::Failed, recorded);
        }
    }

    async fn fail_job(&self, job_id: &str, message: &str) {
        let mut store = self.store.write().await;
        self.fail_locked(&mut store, job_id, message);
    }
}

/// Drives jobs through their lifecycle against an [`OcrApi`].
pub struct JobRunner {
    inner: Arc<Inner>,
    scheduler: PollScheduler,
}

impl JobRunner {
    pub fn new(api: Arc<dyn OcrApi>, store: SharedJobStore, config: PollConfig) -> Self {
        let (state_tx, _) = watch::channel(LifecycleState::idle());
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                config,
                state_tx,
            }),
            scheduler: PollScheduler::new(),
        }
    }

    pub fn store(&self) -> SharedJobStore {
        Arc::clone(&self.inner.store)
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.inner.state_tx.subscribe()
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state_tx.borrow().clone()
    }

    pub async fn current_job(&self) -> Option<Job> {
        self.inner.store.read().await.current().cloned()
    }

    pub fn is_polling(&self, job_id: &str) -> bool {
        self.scheduler.is_active(job_id)
    }

    /// Upload the artifact behind `source`, submit it and start polling.
    ///
    /// Returns the server-assigned job id. The new job becomes the current
    /// one. Upload and submission failures leave the job `failed` and are
    /// also returned as errors.
    pub async fn submit(
        &self,
        source: &PageSource,
        model: OcrModel,
        options: ModelOptions,
    ) -> Result<String, LifecycleError> {
        let options = options.for_model(model);
        options
            .validate()
            .map_err(|e| LifecycleError::InvalidOptions(e.to_string()))?;

        let artifact = source.artifact();
        let job = Job::pending(artifact.filename(), model, options.clone());
        let local_id = job.id.clone();
        {
            let mut store = self.inner.store.write().await;
            store.add(job);
            if let Some(previous) = store.select(Some(&local_id)) {
                self.scheduler.cancel(&previous);
            }
            self.inner.publish(&store, &local_id, JobPhase::Uploading, None);
        }
        info!(job_id = %local_id, filename = artifact.filename(), %model, "Uploading artifact");

        let artifact_key = match self.upload(artifact).await {
            Ok(key) => key,
            Err(e) => {
                self.inner.fail_job(&local_id, &format!("Upload failed: {e}")).await;
                return Err(LifecycleError::Upload(e));
            }
        };

        {
            let mut store = self.inner.store.write().await;
            store.update(&local_id, |job| {
                job.attach_storage_key(&artifact_key);
            });
            self.inner.publish(&store, &local_id, JobPhase::Processing, None);
        }
        debug!(job_id = %local_id, artifact_key = %artifact_key, "Artifact uploaded");

        let request = OcrRequest {
            filename: artifact.filename().to_string(),
            artifact_key: Some(artifact_key),
            image_base64: None,
            model,
            options,
        };
        let accepted = match self.inner.api.submit(&request).await {
            Ok(resp) => resp,
            Err(e) => {
                self.inner.fail_job(&local_id, &format!("Request failed: {e}")).await;
                return Err(LifecycleError::Submit(e));
            }
        };
        let job_id = accepted.job_id;
        let is_current = {
            let mut store = self.inner.store.write().await;
            store.replace_id(&local_id, &job_id);
            let is_current = store.current_id() == Some(job_id.as_str());
            self.inner.publish(&store, &job_id, JobPhase::Processing, None);
            is_current
        };
        info!(job_id = %job_id, placeholder = %local_id, "Job accepted");

        if is_current {
            self.start_polling(&job_id, Some(source.total_pages()), self.inner.config.interval);
        } else {
            debug!(job_id = %job_id, "Job no longer viewed, not polling");
        }
        Ok(job_id)
    }

    async fn upload(&self, artifact: &Artifact) -> Result<String, ApiError> {
        let content_type = artifact.content_type();
        let target = self
            .inner
            .api
            .request_upload_url(artifact.filename(), content_type)
            .await?;
        self.inner
            .api
            .upload(&target.upload_url, artifact.bytes(), content_type)
            .await?;
        Ok(target.artifact_key)
    }

    /// Start (or restart) the poll cycle for `job_id`. Any cycle already
    /// running for it is cancelled first.
    pub fn start_polling(&self, job_id: &str, page_count: Option<usize>, initial_delay: Duration) {
        let inner = Arc::clone(&self.inner);
        self.scheduler.start(job_id, move |token| {
            poll_loop(inner, token, page_count, initial_delay)
        });
    }

    /// Point the view at another job, or at none.
    ///
    /// The previously viewed job's poll cycle is cancelled. A server job that
    /// is still processing resumes polling; a completed job restored without
    /// its result, or a failed one without its message, is fetched once
    /// straight away.
    pub async fn navigate(&self, job_id: Option<&str>) -> Result<(), LifecycleError> {
        let resume = {
            let mut store = self.inner.store.write().await;
            if let Some(id) = job_id {
                if !store.contains(id) {
                    return Err(LifecycleError::UnknownJob(id.to_string()));
                }
            }
            let previous = store.select(job_id);
            if let Some(prev) = previous.as_deref().filter(|p| Some(*p) != job_id) {
                self.scheduler.cancel(prev);
            }

            let Some(job) = store.current() else {
                self.inner.state_tx.send_replace(LifecycleState::idle());
                return Ok(());
            };
            let id = job.id.clone();
            let status = job.status;
            let error = job.error.clone();
            let placeholder = job.is_placeholder();
            // Restored from the listing without the result or failure message
            let needs_fetch = !placeholder
                && match status {
                    JobStatus::Completed => job.result.is_none(),
                    JobStatus::Failed => job.error.is_none(),
                    JobStatus::Processing => false,
                };
            let phase = if needs_fetch { JobPhase::Processing } else { status.into() };
            self.inner.publish(&store, &id, phase, error);

            if placeholder {
                None
            } else if needs_fetch {
                Some((id, Duration::ZERO))
            } else if status == JobStatus::Processing {
                Some((id, self.inner.config.interval))
            } else {
                None
            }
        };

        if let Some((id, delay)) = resume {
            if !self.scheduler.is_active(&id) {
                debug!(job_id = %id, delay_ms = delay.as_millis() as u64, "Resuming poll");
                self.start_polling(&id, None, delay);
            }
        }
        Ok(())
    }

    /// Replace the job list with the server's listing.
    pub async fn restore_session(&self) -> Result<usize, LifecycleError> {
        let summaries = self.inner.api.list_jobs().await.map_err(LifecycleError::Listing)?;
        let mut store = self.inner.store.write().await;
        store.resync(summaries);
        if store.current_id().is_none() {
            self.inner.state_tx.send_replace(LifecycleState::idle());
        }
        info!(jobs = store.len(), "Restored job list");
        Ok(store.len())
    }

    /// Delete a job's stored artifacts and drop it from the list.
    pub async fn delete(&self, job_id: &str) -> Result<Vec<String>, LifecycleError> {
        let storage_key = {
            let store = self.inner.store.read().await;
            let job = store
                .get(job_id)
                .ok_or_else(|| LifecycleError::UnknownJob(job_id.to_string()))?;
            job.storage_key.clone()
        };

        let deleted = match storage_key {
            Some(key) => {
                let server_id = Some(job_id).filter(|id| !Job::is_placeholder_id(id));
                self.inner
                    .api
                    .delete_artifact(&key, server_id)
                    .await
                    .map_err(LifecycleError::Delete)?
                    .deleted
            }
            None => Vec::new(),
        };

        let mut store = self.inner.store.write().await;
        self.scheduler.cancel(job_id);
        let was_current = store.current_id() == Some(job_id);
        store.remove(job_id);
        if was_current {
            self.inner.state_tx.send_replace(LifecycleState::idle());
        }
        info!(job_id, objects = deleted.len(), "Deleted job");
        Ok(deleted)
    }

    /// Stop every poll cycle. In-flight responses are discarded.
    pub fn shutdown(&self) {
        self.scheduler.cancel_all();
    }
}

async fn poll_loop(
    inner: Arc<Inner>,
    token: PollToken,
    page_count: Option<usize>,
    initial_delay: Duration,
) {
    let job_id = token.job_id().to_string();
    let mut delay = initial_delay;

    loop {
        tokio::time::sleep(delay).await;
        metrics::counter!("ocr_client_polls_total").increment(1);
        let outcome = inner.api.poll(&job_id).await;

        let mut store = inner.store.write().await;
        if !token.is_current() {
            debug!(job_id = %job_id, "Dropping poll response for superseded cycle");
            return;
        }

        match outcome {
            Ok(resp) => match resp.status {
                JobStatus::Processing => {
                    debug!(job_id = %job_id, "Job still processing");
                    delay = inner.config.interval;
                }
                JobStatus::Completed => {
                    let result = match resp.result {
                        Some(raw) => normalize_job_result(raw, page_count),
                        None => JobResult {
                            raw: Value::Null,
                            rendition: Rendition::Unrenderable {
                                reason: "completed without a result payload".to_string(),
                            },
                        },
                    };
                    let renderable = result.document().is_some();
                    let mut elapsed_ms = None;
                    store.update(&job_id, |job| {
                        let was_processing = job.status == JobStatus::Processing;
                        job.complete(result, Utc::now());
                        if was_processing {
                            elapsed_ms = job.processing_time_ms;
                        }
                    });
                    if let Some(ms) = elapsed_ms {
                        metrics::counter!("ocr_client_jobs_completed_total").increment(1);
                        metrics::histogram!("ocr_client_processing_seconds").record(ms as f64 / 1000.0);
                    }
                    info!(job_id = %job_id, renderable, processing_ms = elapsed_ms, "Job completed");
                    match store.get(&job_id).filter(|job| job.status == JobStatus::Failed) {
                        // A failed job stays failed whatever the service reports
                        Some(job) => {
                            let error = Some(
                                job.error.clone().unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
                            );
                            inner.publish(&store, &job_id, JobPhase::Failed, error);
                        }
                        None => inner.publish(&store, &job_id, JobPhase::Completed, None),
                    }
                    break;
                }
                JobStatus::Failed => {
                    let message = resp
                        .error
                        .filter(|e| !e.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
                    inner.fail_locked(&mut store, &job_id, &message);
                    break;
                }
            },
            Err(e) if e.is_transient() => {
                warn!(job_id = %job_id, error = %e, "Poll failed, retrying");
                delay = inner.config.error_interval;
            }
            Err(e) => {
                inner.fail_locked(&mut store, &job_id, &format!("Status check failed: {e}"));
                break;
            }
        }
    }
    token.finish();
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Invalid model options: {0}")]
    InvalidOptions(String),

    #[error("Upload failed: {0}")]
    Upload(#[source] ApiError),

    #[error("Request failed: {0}")]
    Submit(#[source] ApiError),

    #[error("Failed to list jobs: {0}")]
    Listing(#[source] ApiError),

    #[error("Failed to delete job artifacts: {0}")]
    Delete(#[source] ApiError),

    #[error("No job with id '{0}'")]
    UnknownJob(String),
}
