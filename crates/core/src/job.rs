//! Generation job model.
//!
//! A [`Job`] moves through `pending -> processing -> {completed | failed}`
//! and never back. Transitions go through [`Job::start`], [`Job::complete`]
//! and [`Job::fail`], which reject anything that would regress the status.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

/// Wire prefix that marks a synthetic job handle.
pub const SYNTHETIC_HANDLE_PREFIX: &str = "mock_";

/// Maximum accepted prompt length, in characters.
pub const MAX_PROMPT_LENGTH: usize = 10_000;

// ---------------------------------------------------------------------------
// Job handle
// ---------------------------------------------------------------------------

/// Identifier for a submitted generation.
///
/// `Real` ids come from the engine's `/prompt` response. `Synthetic` ids are
/// minted locally when the engine reports overload, so callers can keep
/// polling and receive a placeholder instead of an error.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobHandle {
    Real(String),
    Synthetic(String),
}

impl JobHandle {
    /// Mint a fresh synthetic handle: `mock_<unix millis>_<9 hex chars>`.
    pub fn synthetic() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        JobHandle::Synthetic(format!(
            "{SYNTHETIC_HANDLE_PREFIX}{millis}_{}",
            &suffix[..9]
        ))
    }

    /// Decode a handle received from a client.
    ///
    /// The synthetic prefix is only a wire encoding; past this point code
    /// branches on the variant.
    pub fn parse(wire: &str) -> Self {
        let wire = wire.trim();
        if wire.starts_with(SYNTHETIC_HANDLE_PREFIX) {
            JobHandle::Synthetic(wire.to_string())
        } else {
            JobHandle::Real(wire.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobHandle::Real(id) | JobHandle::Synthetic(id) => id,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, JobHandle::Synthetic(_))
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Artifacts and results
// ---------------------------------------------------------------------------

/// One produced output of a generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub filename: String,
    pub subfolder: String,
    /// Engine folder kind, e.g. `output` or `temp`.
    pub kind: String,
    /// Where the caller fetches the bytes. Always a local proxy path for
    /// real artifacts, never the engine's own URL.
    pub retrieval_ref: String,
}

/// Outcome of a generation that ran to completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub prompt_id: String,
    pub artifacts: Vec<Artifact>,
    /// Logical workflow name (or the template's file stem).
    pub workflow: Option<String>,
    pub execution_time_ms: u64,
    pub is_mock: bool,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Reference to a workflow template: a logical name, an explicit path, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRef {
    pub name: Option<String>,
    pub path: Option<String>,
}

impl WorkflowRef {
    /// Build a reference, treating blank strings as absent.
    pub fn new(name: Option<String>, path: Option<String>) -> Self {
        Self {
            name: non_blank(name),
            path: non_blank(path),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.path.is_none()
    }

    /// Human-readable label for logs and error messages.
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.path.as_deref())
            .unwrap_or("<none>")
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Everything the queue needs to run one generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub prompt: Option<String>,
    pub workflow: WorkflowRef,
}

/// Validate free-text prompt input (non-empty after trimming, bounded length).
pub fn validate_prompt_text(prompt: &str) -> Result<(), CoreError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(
            "Prompt must not be empty".to_string(),
        ));
    }
    let len = trimmed.chars().count();
    if len > MAX_PROMPT_LENGTH {
        return Err(CoreError::Validation(format!(
            "Prompt must be at most {MAX_PROMPT_LENGTH} characters, got {len}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Job state machine
// ---------------------------------------------------------------------------

/// Lifecycle status of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Only forward moves are allowed, and `processing` is never skipped.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// A unit of work tracked by the queue.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub request: JobRequest,
    status: JobStatus,
    /// 1-based rank in the pending list; `0` once dequeued.
    pub position: usize,
    result: Option<GenerationResult>,
    error: Option<String>,
    pub created_at: Timestamp,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
}

impl Job {
    /// Create a pending job with a fresh UUID.
    pub fn new(request: JobRequest) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            request,
            status: JobStatus::Pending,
            position: 0,
            result: None,
            error: None,
            created_at: chrono::Utc::now(),
            start_time: None,
            end_time: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn result(&self) -> Option<&GenerationResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// `pending -> processing`; stamps `start_time` and clears the position.
    pub fn start(&mut self) -> Result<(), CoreError> {
        self.transition(JobStatus::Processing)?;
        self.position = 0;
        self.start_time = Some(chrono::Utc::now());
        Ok(())
    }

    /// `processing -> completed` with the produced result.
    pub fn complete(&mut self, result: GenerationResult) -> Result<(), CoreError> {
        self.transition(JobStatus::Completed)?;
        self.result = Some(result);
        self.end_time = Some(chrono::Utc::now());
        Ok(())
    }

    /// `processing -> failed` with a human-readable message.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), CoreError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(message.into());
        self.end_time = Some(chrono::Utc::now());
        Ok(())
    }

    /// Time spent waiting in the pending list, if the job has started.
    pub fn queue_wait(&self) -> Option<chrono::Duration> {
        self.start_time.map(|start| start - self.created_at)
    }

    /// Execution duration, if the job has finished.
    pub fn execution_time(&self) -> Option<chrono::Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Snapshot for status queries.
    pub fn view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.id.clone(),
            status: self.status,
            position: self.position,
            error: self.error.clone(),
            result: self.result.clone(),
            created_at: self.created_at,
        }
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "Job {} cannot move from {} to {}",
                self.id,
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        Ok(())
    }
}

/// Externally visible job status.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    pub position: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GenerationResult>,
    pub created_at: Timestamp,
}
