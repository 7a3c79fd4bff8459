//! Single non-blocking result checks.

use std::time::Duration;

use archviz_comfyui::api::ComfyUIApi;
use archviz_core::job::{Artifact, JobHandle};
use serde::Serialize;

use crate::config::PipelineConfig;

/// Fixed artifact returned for synthetic handles.
pub fn placeholder_artifact() -> Artifact {
    Artifact {
        filename: "mock_generated_image.png".to_string(),
        subfolder: "outputs".to_string(),
        kind: "output".to_string(),
        retrieval_ref: "/mock-image.jpg".to_string(),
    }
}

/// Result of one poll.
///
/// `ready = false` is never terminal, whether or not `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollOutcome {
    pub ready: bool,
    pub artifacts: Vec<Artifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PollOutcome {
    fn pending() -> Self {
        Self {
            ready: false,
            artifacts: Vec::new(),
            error: None,
        }
    }

    fn transport_error(message: String) -> Self {
        Self {
            ready: false,
            artifacts: Vec::new(),
            error: Some(message),
        }
    }

    fn ready(artifacts: Vec<Artifact>) -> Self {
        Self {
            ready: !artifacts.is_empty(),
            artifacts,
            error: None,
        }
    }
}

pub struct ResultPoller {
    api: ComfyUIApi,
    placeholder_delay: Duration,
}

impl ResultPoller {
    pub fn new(config: &PipelineConfig, client: reqwest::Client) -> Self {
        let api = ComfyUIApi::with_client(client, config.outbound_url())
            .with_history_timeout(config.history_timeout);
        Self {
            api,
            placeholder_delay: config.placeholder_delay,
        }
    }

    /// Check the engine's history once for `handle`.
    ///
    /// Synthetic handles never reach the engine. Transport and decoding
    /// failures are reported in `error` with `ready = false`.
    pub async fn poll_once(&self, handle: &JobHandle) -> PollOutcome {
        let prompt_id = match handle {
            JobHandle::Synthetic(id) => {
                tracing::debug!(handle = %id, "Synthetic handle, returning placeholder");
                tokio::time::sleep(self.placeholder_delay).await;
                return PollOutcome::ready(vec![placeholder_artifact()]);
            }
            JobHandle::Real(id) => id,
        };

        let history = match self.api.get_history(prompt_id).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(prompt_id = %prompt_id, error = %e, "History poll failed");
                return PollOutcome::transport_error(e.to_string());
            }
        };

        match history.get(prompt_id) {
            Some(entry) => {
                let outcome = PollOutcome::ready(entry.artifacts());
                tracing::debug!(
                    prompt_id = %prompt_id,
                    ready = outcome.ready,
                    artifacts = outcome.artifacts.len(),
                    "History entry found",
                );
                outcome
            }
            None => PollOutcome::pending(),
        }
    }
}
