//! Fire-and-forget submission of a workflow to the engine.
//!
//! Steps run in order and each must succeed before the next:
//! probe connectivity, resolve the template, reject design-tool documents,
//! inject the prompt, then `POST /prompt`.

use std::sync::Arc;

use archviz_comfyui::api::{ComfyUIApi, ComfyUIApiError};
use archviz_comfyui::probe::ConnectionProber;
use archviz_core::job::{JobHandle, WorkflowRef};
use archviz_core::resolver::{file_stem, WorkflowResolver};
use archviz_core::workflow::WorkflowTemplate;

use crate::config::PipelineConfig;
use crate::error::PipelineError;

/// Outcome of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub handle: JobHandle,
    /// Logical workflow name, falling back to the template's file stem.
    pub workflow: Option<String>,
}

impl Submission {
    pub fn is_synthetic(&self) -> bool {
        self.handle.is_synthetic()
    }
}

pub struct SubmissionPipeline {
    prober: Arc<ConnectionProber>,
    resolver: WorkflowResolver,
    api: ComfyUIApi,
    engine_url: String,
    client_id: String,
}

impl SubmissionPipeline {
    pub fn new(
        config: &PipelineConfig,
        client: reqwest::Client,
        prober: Arc<ConnectionProber>,
        resolver: WorkflowResolver,
    ) -> Self {
        let api = ComfyUIApi::with_client(client, config.outbound_url())
            .with_submit_timeout(config.submit_timeout);
        Self {
            prober,
            resolver,
            api,
            engine_url: config.engine_url.trim().to_string(),
            client_id: config.client_id.clone(),
        }
    }

    pub fn resolver(&self) -> &WorkflowResolver {
        &self.resolver
    }

    /// Submit a generation and return its handle without waiting for it.
    ///
    /// When the engine reports overload the submission is not sent; a
    /// synthetic handle is returned instead so callers keep polling.
    pub async fn submit(
        &self,
        prompt: Option<&str>,
        workflow: &WorkflowRef,
    ) -> Result<Submission, PipelineError> {
        let status = self.prober.probe(&self.engine_url).await;

        if status.is_overloaded() {
            let handle = JobHandle::synthetic();
            tracing::warn!(
                url = %status.url,
                handle = %handle,
                "ComfyUI overloaded, returning synthetic job handle",
            );
            return Ok(Submission {
                handle,
                workflow: workflow.name.clone(),
            });
        }

        if !status.connected {
            return Err(PipelineError::Connectivity {
                url: status.url,
                message: status
                    .error
                    .unwrap_or_else(|| "connection failed".to_string()),
            });
        }

        let path = self.resolver.resolve(workflow)?;
        let mut template = WorkflowTemplate::load(&path)?.into_executable()?;
        tracing::debug!(
            path = %path.display(),
            nodes = template.node_count(),
            "Loaded workflow template",
        );

        if let Some(prompt) = prompt {
            let injected = template.inject_prompt(prompt);
            if injected == 0 && !prompt.trim().is_empty() {
                tracing::debug!(path = %path.display(), "No text-encoding node to inject into");
            }
        }

        let response = self
            .api
            .submit_workflow(&template.to_json(), &self.client_id)
            .await
            .map_err(|e| match e {
                ComfyUIApiError::Request(err) if err.is_decode() => {
                    PipelineError::Protocol(format!("malformed /prompt response: {err}"))
                }
                other => PipelineError::Submit(other),
            })?;

        let prompt_id = response
            .prompt_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| PipelineError::Protocol("response has no prompt_id".to_string()))?;

        tracing::info!(prompt_id = %prompt_id, queue_number = ?response.number, "Workflow submitted");

        Ok(Submission {
            handle: JobHandle::Real(prompt_id),
            workflow: workflow.name.clone().or_else(|| file_stem(&path)),
        })
    }
}
