//! Generation job types

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::images::ImageRef;
use crate::storage::{ObjectLocation, StorageError};

use super::store::StoreError;

/// Most images accepted in one book
pub const MAX_IMAGES_PER_JOB: usize = 200;

/// Longest accepted cover title, in characters
pub const MAX_TITLE_CHARS: usize = 200;

/// Owner label used when a submission does not name one
pub const DEFAULT_OWNER: &str = "anonymous";

// ============================================================================
// Identity and status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(JobId)
            .map_err(|_| JobError::NotFound(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Job record
// ============================================================================

/// One request to turn a list of images into a book
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub id: JobId,
    pub owner_id: String,
    pub status: JobStatus,
    /// Page order; never modified after creation
    pub image_refs: Arc<[ImageRef]>,
    pub title: String,
    pub result_locator: Option<String>,
    /// Where the finished PDF is stored, set together with `result_locator`
    pub artifact: Option<ObjectLocation>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationJob {
    pub fn new(owner_id: impl Into<String>, image_refs: Vec<ImageRef>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            owner_id: owner_id.into(),
            status: JobStatus::Pending,
            image_refs: image_refs.into(),
            title: title.into(),
            result_locator: None,
            artifact: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `pending` → `processing`
    pub fn start(&mut self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Processing;
        self.updated_at = Utc::now();
        true
    }

    /// Record the finished artifact. Returns false if the job was already terminal.
    pub fn complete(&mut self, locator: String, artifact: ObjectLocation) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Completed;
        self.result_locator = Some(locator);
        self.artifact = Some(artifact);
        self.error_message = None;
        self.updated_at = Utc::now();
        true
    }

    /// Record a failure. Returns false if the job was already terminal.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let message = message.into();
        self.status = JobStatus::Failed;
        self.error_message = Some(if message.trim().is_empty() {
            "job failed".to_string()
        } else {
            message
        });
        self.result_locator = None;
        self.artifact = None;
        self.updated_at = Utc::now();
        true
    }

    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.id,
            status: self.status,
            result_locator: self.result_locator.clone(),
            error_message: self.error_message.clone(),
        }
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            job_id: self.id,
            status: self.status,
            title: self.title.clone(),
            image_count: self.image_refs.len(),
            result_locator: self.result_locator.clone(),
            created_at: self.created_at,
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

/// Body of a generation request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub image_refs: Vec<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
}

/// What polling clients see
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_locator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: JobId,
    pub status: JobStatus,
    pub title: String,
    pub image_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_locator: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("{0}")]
    Validation(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job already finished: {0}")]
    AlreadyFinished(String),

    #[error("Job has not completed: {0}")]
    NotCompleted(String),

    #[error("Job queue is closed")]
    QueueClosed,

    #[error("Job queue is full, try again later")]
    QueueFull,

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    #[error("Artifact unavailable: {0}")]
    Artifact(#[from] StorageError),
}

impl JobError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            JobError::Validation(_) => StatusCode::BAD_REQUEST,
            JobError::NotFound(_) => StatusCode::NOT_FOUND,
            JobError::AlreadyFinished(_) | JobError::NotCompleted(_) => StatusCode::CONFLICT,
            JobError::QueueClosed | JobError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            JobError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            JobError::Artifact(StorageError::ObjectNotFound(_)) => StatusCode::NOT_FOUND,
            JobError::Artifact(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            JobError::Validation(_) => "validation_error",
            JobError::NotFound(_) => "not_found",
            JobError::AlreadyFinished(_) => "already_finished",
            JobError::NotCompleted(_) => "not_completed",
            JobError::QueueClosed => "queue_closed",
            JobError::QueueFull => "queue_full",
            JobError::Store(_) => "store_error",
            JobError::Artifact(_) => "artifact_unavailable",
        }
    }
}
