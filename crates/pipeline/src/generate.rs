//! Blocking submit-then-wait, used by the queue worker.

use std::sync::Arc;
use std::time::Duration;

use archviz_core::job::{Artifact, GenerationResult, JobHandle, JobRequest};
use tokio::time::Instant;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::poll::ResultPoller;
use crate::submit::SubmissionPipeline;

pub struct Generator {
    pipeline: Arc<SubmissionPipeline>,
    poller: Arc<ResultPoller>,
    poll_interval: Duration,
    max_wait: Duration,
}

impl Generator {
    pub fn new(
        config: &PipelineConfig,
        pipeline: Arc<SubmissionPipeline>,
        poller: Arc<ResultPoller>,
    ) -> Self {
        Self {
            pipeline,
            poller,
            poll_interval: config.poll_interval,
            max_wait: config.max_wait,
        }
    }

    /// Submit `request` and wait until it produces artifacts.
    pub async fn generate(&self, request: &JobRequest) -> Result<GenerationResult, PipelineError> {
        let started = Instant::now();
        let submission = self
            .pipeline
            .submit(request.prompt.as_deref(), &request.workflow)
            .await?;

        let artifacts = self.wait_for_result(&submission.handle).await?;

        Ok(GenerationResult {
            prompt_id: submission.handle.as_str().to_string(),
            artifacts,
            workflow: submission.workflow,
            execution_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            is_mock: submission.handle.is_synthetic(),
        })
    }

    /// Poll every `poll_interval` until artifacts appear or `max_wait`
    /// elapses. Failed polls are logged and retried.
    pub async fn wait_for_result(&self, handle: &JobHandle) -> Result<Vec<Artifact>, PipelineError> {
        let deadline = Instant::now() + self.max_wait;

        loop {
            let outcome = self.poller.poll_once(handle).await;
            if outcome.ready {
                tracing::info!(
                    prompt_id = %handle,
                    artifacts = outcome.artifacts.len(),
                    "Generation finished",
                );
                return Ok(outcome.artifacts);
            }
            if let Some(error) = outcome.error {
                tracing::debug!(prompt_id = %handle, error = %error, "Poll failed, retrying");
            }

            if Instant::now() + self.poll_interval > deadline {
                tracing::warn!(prompt_id = %handle, max_wait_secs = self.max_wait.as_secs(), "Timed out waiting for result");
                return Err(PipelineError::Timeout(self.max_wait));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use archviz_comfyui::probe::ConnectionProber;
    use archviz_core::job::WorkflowRef;
    use archviz_core::resolver::WorkflowResolver;
    use assert_matches::assert_matches;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    use super::*;

    /// Empty history for the first `pending` calls, then one image.
    struct HistoryAfter {
        pending: usize,
        calls: AtomicUsize,
    }

    impl Respond for HistoryAfter {
        fn respond(&self, _: &Request) -> ResponseTemplate {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.pending {
                ResponseTemplate::new(200).set_body_json(json!({}))
            } else {
                ResponseTemplate::new(200).set_body_json(json!({
                    "abc": { "outputs": { "9": { "images": [{ "filename": "out.png" }] } } }
                }))
            }
        }
    }

    fn setup(engine_url: &str, max_wait: Duration) -> (TempDir, Generator) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("test.json"),
            json!({ "6": { "class_type": "CLIPTextEncode", "inputs": { "text": "" } } }).to_string(),
        )
        .unwrap();

        let config = PipelineConfig {
            engine_url: engine_url.to_string(),
            poll_interval: Duration::from_millis(20),
            max_wait,
            placeholder_delay: Duration::from_millis(5),
            ..Default::default()
        };
        let client = reqwest::Client::new();
        let resolver = WorkflowResolver::new(
            dir.path().to_path_buf(),
            dir.path().to_path_buf(),
            PathBuf::from("comfyui_workflows"),
        );
        let pipeline = Arc::new(SubmissionPipeline::new(
            &config,
            client.clone(),
            Arc::new(ConnectionProber::new(client.clone())),
            resolver,
        ));
        let poller = Arc::new(ResultPoller::new(&config, client));
        (dir, Generator::new(&config, pipeline, poller))
    }

    fn request() -> JobRequest {
        JobRequest {
            prompt: Some("red chair".into()),
            workflow: WorkflowRef::new(Some("test".into()), None),
        }
    }

    async fn engine(pending_polls: usize) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "prompt_id": "abc" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/history/abc"))
            .respond_with(HistoryAfter {
                pending: pending_polls,
                calls: AtomicUsize::new(0),
            })
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn generate_waits_for_artifacts() {
        let server = engine(2).await;
        let (_dir, generator) = setup(&server.uri(), Duration::from_secs(5));

        let result = generator.generate(&request()).await.unwrap();
        assert_eq!(result.prompt_id, "abc");
        assert_eq!(result.artifacts.len(), 1);
        assert_eq!(result.workflow.as_deref(), Some("test"));
        assert!(!result.is_mock);
    }

    #[tokio::test]
    async fn generate_times_out_without_artifacts() {
        let server = engine(usize::MAX).await;
        let (_dir, generator) = setup(&server.uri(), Duration::from_millis(100));

        let err = generator.generate(&request()).await.unwrap_err();
        assert_matches!(err, PipelineError::Timeout(_));
    }

    #[tokio::test]
    async fn synthetic_handle_resolves_to_placeholder() {
        let (_dir, generator) = setup("http://127.0.0.1:9", Duration::from_secs(1));
        let artifacts = generator
            .wait_for_result(&JobHandle::synthetic())
            .await
            .unwrap();
        assert_eq!(artifacts[0].filename, "mock_generated_image.png");
    }
}
