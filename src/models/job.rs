use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::models::result::JobResult;

/// Status of an OCR job as reported by the service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Client-side lifecycle phase, a superset of [`JobStatus`].
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobPhase {
    Idle,
    Uploading,
    Processing,
    Completed,
    Failed,
}

impl From<JobStatus> for JobPhase {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Processing => JobPhase::Processing,
            JobStatus::Completed => JobPhase::Completed,
            JobStatus::Failed => JobPhase::Failed,
        }
    }
}

/// Supported document-understanding models.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, EnumIter,
)]
pub enum OcrModel {
    /// General text recognition; emits flat lines with boxes and scores.
    #[serde(rename = "pp-ocrv5")]
    #[strum(serialize = "pp-ocrv5")]
    PpOcrV5,
    /// Layout and table analysis; emits labeled blocks.
    #[serde(rename = "pp-structurev3")]
    #[strum(serialize = "pp-structurev3")]
    PpStructureV3,
    /// Vision-language document parsing; emits labeled blocks.
    #[default]
    #[serde(rename = "paddleocr-vl")]
    #[strum(serialize = "paddleocr-vl")]
    PaddleOcrVl,
}

impl OcrModel {
    pub fn accepts_lang(self) -> bool {
        !matches!(self, OcrModel::PaddleOcrVl)
    }

    pub fn accepts_textline_orientation(self) -> bool {
        matches!(self, OcrModel::PpOcrV5)
    }
}

/// Variant-specific model options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, PartialEq)]
pub struct ModelOptions {
    #[garde(length(min = 1, max = 16), pattern(r"^[A-Za-z_\-]+$"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,

    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_doc_orientation_classify: Option<bool>,

    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_doc_unwarping: Option<bool>,

    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_textline_orientation: Option<bool>,
}

impl ModelOptions {
    /// Keep only the options `model` understands. An empty language means
    /// "model default" and is dropped.
    pub fn for_model(self, model: OcrModel) -> Self {
        if !model.accepts_lang() {
            return Self::default();
        }
        Self {
            lang: self.lang.filter(|l| !l.trim().is_empty()),
            use_doc_orientation_classify: self.use_doc_orientation_classify,
            use_doc_unwarping: self.use_doc_unwarping,
            use_textline_orientation: self
                .use_textline_orientation
                .filter(|_| model.accepts_textline_orientation()),
        }
    }
}

/// Prefix of the ids given to jobs before the server assigns one.
const PLACEHOLDER_PREFIX: &str = "local-";

/// One user-submitted OCR request and its lifecycle state.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: String,
    pub filename: String,
    pub model: OcrModel,
    pub model_options: ModelOptions,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub processing_time_ms: Option<u64>,
    pub storage_key: Option<String>,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}

impl Job {
    /// A job created client-side at submission time, under a placeholder id.
    pub fn pending(filename: &str, model: OcrModel, model_options: ModelOptions) -> Self {
        Self {
            id: format!("{PLACEHOLDER_PREFIX}{}", uuid::Uuid::new_v4()),
            filename: filename.to_string(),
            model,
            model_options,
            status: JobStatus::Processing,
            created_at: Utc::now(),
            processing_time_ms: None,
            storage_key: None,
            result: None,
            error: None,
        }
    }

    /// Whether `id` is a placeholder the server has not assigned yet.
    pub fn is_placeholder_id(id: &str) -> bool {
        id.starts_with(PLACEHOLDER_PREFIX)
    }

    pub fn is_placeholder(&self) -> bool {
        Self::is_placeholder_id(&self.id)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Record where the artifact was uploaded. The key is written once.
    pub fn attach_storage_key(&mut self, key: &str) -> bool {
        if self.storage_key.is_some() {
            return false;
        }
        self.storage_key = Some(key.to_string());
        true
    }

    /// Move to `completed`, recording time elapsed since submission.
    ///
    /// A job restored from the listing as already completed only gains its
    /// result; failed jobs and jobs that already hold a result are left alone.
    pub fn complete(&mut self, result: JobResult, now: DateTime<Utc>) {
        match self.status {
            JobStatus::Failed => {}
            JobStatus::Completed => {
                if self.result.is_none() {
                    self.result = Some(result);
                }
            }
            JobStatus::Processing => {
                let elapsed = (now - self.created_at).num_milliseconds().max(0) as u64;
                self.status = JobStatus::Completed;
                self.processing_time_ms = Some(elapsed);
                self.result = Some(result);
                self.error = None;
            }
        }
    }

    /// Move to `failed`. A job that already reached a terminal state is left
    /// alone, except that a failed job restored without its message gains it.
    pub fn fail(&mut self, message: impl Into<String>) {
        match self.status {
            JobStatus::Processing => {
                self.status = JobStatus::Failed;
                self.result = None;
                self.error = Some(message.into());
            }
            JobStatus::Failed if self.error.is_none() => self.error = Some(message.into()),
            _ => {}
        }
    }
}
