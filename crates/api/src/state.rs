use std::path::PathBuf;
use std::sync::Arc;

use archviz_comfyui::api::ComfyUIApi;
use archviz_comfyui::probe::ConnectionProber;
use archviz_core::resolver::WorkflowResolver;
use archviz_pipeline::{Generator, ResultPoller, SubmissionPipeline};

use crate::config::ServerConfig;
use crate::engine::queue::{JobExecutor, QueueManager};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Engine reachability with a short-lived cache.
    pub prober: Arc<ConnectionProber>,
    pub pipeline: Arc<SubmissionPipeline>,
    pub poller: Arc<ResultPoller>,
    /// Blocking submit-and-wait, also the queue's default executor.
    pub generator: Arc<Generator>,
    /// Raw engine client, used by the image proxy.
    pub comfyui: ComfyUIApi,
    pub queue: Arc<QueueManager>,
}

impl AppState {
    /// Wire the pipeline and a queue backed by the real [`Generator`].
    ///
    /// `working_dir` is the fallback root for relative workflow paths.
    pub fn new(config: ServerConfig, working_dir: PathBuf) -> Self {
        Self::build(config, working_dir, None)
    }

    /// Like [`new`](Self::new) but with a custom queue executor.
    pub fn with_executor(
        config: ServerConfig,
        working_dir: PathBuf,
        executor: Arc<dyn JobExecutor>,
    ) -> Self {
        Self::build(config, working_dir, Some(executor))
    }

    fn build(
        config: ServerConfig,
        working_dir: PathBuf,
        executor: Option<Arc<dyn JobExecutor>>,
    ) -> Self {
        let client = reqwest::Client::new();
        let pipeline_config = config.pipeline_config();

        let prober = Arc::new(ConnectionProber::new(client.clone()));
        let resolver = WorkflowResolver::new(
            config.install_root.clone(),
            working_dir,
            config.workflow_dir.clone(),
        );
        tracing::info!(
            template_dir = %resolver.template_dir().display(),
            engine_url = %pipeline_config.engine_url,
            "Workflow resolver configured",
        );

        let pipeline = Arc::new(SubmissionPipeline::new(
            &pipeline_config,
            client.clone(),
            Arc::clone(&prober),
            resolver,
        ));
        let poller = Arc::new(ResultPoller::new(&pipeline_config, client.clone()));
        let comfyui = ComfyUIApi::with_client(client, pipeline_config.outbound_url());

        let generator = Arc::new(Generator::new(
            &pipeline_config,
            Arc::clone(&pipeline),
            Arc::clone(&poller),
        ));
        let executor: Arc<dyn JobExecutor> = match executor {
            Some(executor) => executor,
            None => Arc::clone(&generator) as Arc<dyn JobExecutor>,
        };
        let queue = Arc::new(QueueManager::new(executor, config.queue_config()));

        Self {
            config: Arc::new(config),
            prober,
            pipeline,
            poller,
            generator,
            comfyui,
            queue,
        }
    }
}
