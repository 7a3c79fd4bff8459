//! Generation pipeline on top of the ComfyUI client.
//!
//! [`SubmissionPipeline`] turns a prompt and a workflow reference into a
//! [`JobHandle`](archviz_core::job::JobHandle) without waiting for the
//! engine to run it. [`ResultPoller`] performs single non-blocking history
//! checks, and [`Generator`] combines both into a blocking
//! submit-then-wait call for the queue worker.

pub mod config;
pub mod error;
pub mod generate;
pub mod poll;
pub mod submit;

pub use config::PipelineConfig;
pub use error::{ErrorKind, PipelineError};
pub use generate::Generator;
pub use poll::{PollOutcome, ResultPoller};
pub use submit::{Submission, SubmissionPipeline};
