use std::time::Duration;

use archviz_comfyui::api::ComfyUIApiError;
use archviz_core::workflow::WorkflowError;

/// Errors raised while submitting a generation or waiting for its result.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The engine could not be reached.
    #[error("ComfyUI unreachable at {url}: {message}")]
    Connectivity { url: String, message: String },

    /// Workflow reference missing, not found, unreadable or not executable.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// The engine answered with something other than what was expected.
    #[error("ComfyUI protocol error: {0}")]
    Protocol(String),

    /// The `/prompt` request failed.
    #[error("ComfyUI submission failed: {0}")]
    Submit(#[from] ComfyUIApiError),

    /// No artifacts appeared before the ceiling elapsed.
    #[error("no result after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Coarse classification used by callers to choose a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller supplied an unusable request.
    Caller,
    Connectivity,
    NotFound,
    /// The template exists but cannot be executed.
    Shape,
    Protocol,
    Transport,
    Timeout,
    /// The template could not be read or parsed.
    Io,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Connectivity { .. } => ErrorKind::Connectivity,
            PipelineError::Workflow(e) => match e {
                WorkflowError::MissingReference => ErrorKind::Caller,
                WorkflowError::NotFound { .. } => ErrorKind::NotFound,
                WorkflowError::DesignDocument | WorkflowError::UnrecognizedShape(_) => {
                    ErrorKind::Shape
                }
                WorkflowError::Unreadable { .. } | WorkflowError::InvalidJson { .. } => {
                    ErrorKind::Io
                }
            },
            PipelineError::Protocol(_) => ErrorKind::Protocol,
            PipelineError::Submit(_) => ErrorKind::Transport,
            PipelineError::Timeout(_) => ErrorKind::Timeout,
        }
    }
}
