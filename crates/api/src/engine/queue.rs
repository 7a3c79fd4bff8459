//! In-process single-worker FIFO queue.
//!
//! Jobs move `pending -> processing -> completed | failed`, and each job is
//! held by exactly one of the pending list, the in-flight slot, or the
//! completed cache. At most one job is in flight at any time; the in-flight
//! slot is claimed under the same lock that pops the pending list.
//!
//! Finished jobs stay queryable for `completed_ttl` and are then dropped,
//! lazily on lookup or by [`QueueManager::sweep_expired`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use archviz_core::job::{GenerationResult, Job, JobRequest, JobStatusView};
use archviz_pipeline::{Generator, PipelineError};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default polling interval for the worker loop.
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Runs one job end to end.
#[async_trait]
pub trait JobExecutor: Send + Sync + 'static {
    async fn execute(&self, request: &JobRequest) -> Result<GenerationResult, PipelineError>;
}

#[async_trait]
impl JobExecutor for Generator {
    async fn execute(&self, request: &JobRequest) -> Result<GenerationResult, PipelineError> {
        self.generate(request).await
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub tick_interval: Duration,
    /// Hard ceiling on one job; the job fails when it elapses.
    pub job_timeout: Duration,
    pub completed_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            job_timeout: Duration::from_secs(300),
            completed_ttl: Duration::from_secs(3600),
        }
    }
}

/// Returned from [`QueueManager::enqueue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueuedJob {
    pub job_id: String,
    pub position: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub queue_length: usize,
    pub processing_count: usize,
    pub completed_cache_count: usize,
}

struct CompletedEntry {
    job: Job,
    expires_at: Instant,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Job>,
    processing: Option<Job>,
    completed: HashMap<String, CompletedEntry>,
}

impl QueueState {
    fn renumber(&mut self) {
        for (index, job) in self.pending.iter_mut().enumerate() {
            job.position = index + 1;
        }
    }
}

pub struct QueueManager {
    executor: Arc<dyn JobExecutor>,
    config: QueueConfig,
    state: Mutex<QueueState>,
    wakeup: Notify,
}

impl QueueManager {
    pub fn new(executor: Arc<dyn JobExecutor>, config: QueueConfig) -> Self {
        Self {
            executor,
            config,
            state: Mutex::new(QueueState::default()),
            wakeup: Notify::new(),
        }
    }

    /// Append a job to the pending list and wake the worker.
    pub fn enqueue(&self, request: JobRequest) -> EnqueuedJob {
        let mut job = Job::new(request);
        let enqueued = {
            let mut state = self.lock();
            job.position = state.pending.len() + 1;
            let enqueued = EnqueuedJob {
                job_id: job.id.clone(),
                position: job.position,
            };
            state.pending.push_back(job);
            enqueued
        };

        tracing::info!(
            job_id = %enqueued.job_id,
            position = enqueued.position,
            "Job added to queue",
        );
        self.wakeup.notify_one();
        enqueued
    }

    /// Look up a job by id. Expired and unknown ids both yield `None`.
    pub fn status(&self, job_id: &str) -> Option<JobStatusView> {
        let mut state = self.lock();

        if let Some(job) = state.processing.as_ref().filter(|j| j.id == job_id) {
            return Some(job.view());
        }
        if let Some(job) = state.pending.iter().find(|j| j.id == job_id) {
            return Some(job.view());
        }

        let expired = match state.completed.get(job_id) {
            Some(entry) if entry.expires_at > Instant::now() => return Some(entry.job.view()),
            Some(_) => true,
            None => false,
        };
        if expired {
            state.completed.remove(job_id);
            tracing::debug!(job_id, "Completed job expired");
        }
        None
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            queue_length: state.pending.len(),
            processing_count: usize::from(state.processing.is_some()),
            completed_cache_count: state.completed.len(),
        }
    }

    /// Run the oldest pending job to completion.
    ///
    /// Returns `false` without doing anything when the queue is empty or a
    /// job is already in flight.
    pub async fn process_next(&self) -> bool {
        let (job_id, request) = {
            let mut state = self.lock();
            if state.processing.is_some() {
                return false;
            }
            let Some(mut job) = state.pending.pop_front() else {
                return false;
            };
            state.renumber();
            if let Err(e) = job.start() {
                tracing::error!(job_id = %job.id, error = %e, "Dropping job that cannot start");
                return true;
            }
            let claimed = (job.id.clone(), job.request.clone());
            state.processing = Some(job);
            claimed
        };

        tracing::info!(job_id = %job_id, "Processing job");
        let outcome = self.execute(request).await;

        let mut state = self.lock();
        let Some(mut job) = state.processing.take() else {
            tracing::error!(job_id = %job_id, "In-flight job vanished");
            return true;
        };

        let transition = match outcome {
            Ok(result) => job.complete(result),
            Err(message) => job.fail(message),
        };
        if let Err(e) = transition {
            tracing::error!(job_id = %job.id, error = %e, "Invalid job transition");
        }

        let queue_wait_ms = job.queue_wait().map(|d| d.num_milliseconds());
        let execution_ms = job.execution_time().map(|d| d.num_milliseconds());
        match job.result() {
            Some(result) => tracing::info!(
                job_id = %job.id,
                prompt_id = %result.prompt_id,
                artifacts = result.artifacts.len(),
                is_mock = result.is_mock,
                queue_wait_ms,
                execution_ms,
                "Job completed",
            ),
            None => tracing::warn!(
                job_id = %job.id,
                error = job.error().unwrap_or_default(),
                queue_wait_ms,
                execution_ms,
                "Job failed",
            ),
        }

        let expires_at = Instant::now() + self.config.completed_ttl;
        state
            .completed
            .insert(job.id.clone(), CompletedEntry { job, expires_at });
        true
    }

    /// Run the worker loop until `cancel` is triggered.
    ///
    /// Wakes on every tick and whenever a job is enqueued, then drains the
    /// pending list one job at a time.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        tracing::info!(
            tick_interval_ms = self.config.tick_interval.as_millis() as u64,
            job_timeout_secs = self.config.job_timeout.as_secs(),
            "Queue worker started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Queue worker shutting down");
                    break;
                }
                _ = ticker.tick() => {}
                _ = self.wakeup.notified() => {}
            }

            while !cancel.is_cancelled() && self.process_next().await {}
        }
    }

    /// Drop completed entries past their TTL. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let before = state.completed.len();
        state.completed.retain(|_, entry| entry.expires_at > now);
        before - state.completed.len()
    }

    /// Execute on a separate task so a panic or the ceiling fails the job
    /// instead of the worker.
    async fn execute(&self, request: JobRequest) -> Result<GenerationResult, String> {
        let executor = Arc::clone(&self.executor);
        let mut handle = tokio::spawn(async move { executor.execute(&request).await });

        match tokio::time::timeout(self.config.job_timeout, &mut handle).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(join_error)) => Err(format!("Job execution aborted: {join_error}")),
            Err(_) => {
                handle.abort();
                Err(format!(
                    "Job timed out after {}s",
                    self.config.job_timeout.as_secs()
                ))
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use archviz_core::job::{Artifact, JobStatus, WorkflowRef};
    use tokio::sync::Semaphore;

    use super::*;

    /// Records call order and peak concurrency; optionally waits on a gate.
    #[derive(Default)]
    struct FakeExecutor {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: Mutex<Vec<String>>,
        gate: Option<Semaphore>,
        delay: Duration,
    }

    impl FakeExecutor {
        fn gated() -> Self {
            Self {
                gate: Some(Semaphore::new(0)),
                ..Default::default()
            }
        }

        fn release(&self) {
            if let Some(gate) = &self.gate {
                gate.add_permits(1);
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobExecutor for FakeExecutor {
        async fn execute(&self, request: &JobRequest) -> Result<GenerationResult, PipelineError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let prompt = request.prompt.clone().unwrap_or_default();
            self.calls.lock().unwrap().push(prompt.clone());

            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match prompt.as_str() {
                "fail" => Err(PipelineError::Protocol("response has no prompt_id".into())),
                "panic" => panic!("executor blew up"),
                "hang" => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    unreachable!()
                }
                _ => Ok(GenerationResult {
                    prompt_id: format!("p-{prompt}"),
                    artifacts: vec![Artifact {
                        filename: "out.png".into(),
                        subfolder: String::new(),
                        kind: "output".into(),
                        retrieval_ref: "/comfyui/image-proxy?filename=out.png".into(),
                    }],
                    workflow: Some("test".into()),
                    execution_time_ms: 1,
                    is_mock: false,
                }),
            }
        }
    }

    fn request(prompt: &str) -> JobRequest {
        JobRequest {
            prompt: Some(prompt.to_string()),
            workflow: WorkflowRef::new(Some("test".into()), None),
        }
    }

    fn manager(executor: Arc<FakeExecutor>, config: QueueConfig) -> Arc<QueueManager> {
        Arc::new(QueueManager::new(executor, config))
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..500 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn enqueue_assigns_increasing_positions() {
        let queue = manager(Arc::new(FakeExecutor::default()), QueueConfig::default());
        let a = queue.enqueue(request("a"));
        let b = queue.enqueue(request("b"));

        assert_eq!(a.position, 1);
        assert_eq!(b.position, 2);
        assert_eq!(queue.status(&b.job_id).unwrap().status, JobStatus::Pending);
        assert_eq!(queue.stats().queue_length, 2);
    }

    #[tokio::test]
    async fn unknown_job_is_none() {
        let queue = manager(Arc::new(FakeExecutor::default()), QueueConfig::default());
        assert!(queue.status("does-not-exist").is_none());
    }

    #[tokio::test]
    async fn positions_shift_when_head_is_dequeued() {
        let executor = Arc::new(FakeExecutor::gated());
        let queue = manager(Arc::clone(&executor), QueueConfig::default());
        let first = queue.enqueue(request("a"));
        let second = queue.enqueue(request("b"));
        let third = queue.enqueue(request("c"));

        let worker = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.process_next().await })
        };
        wait_until(|| queue.stats().processing_count == 1).await;

        let head = queue.status(&first.job_id).unwrap();
        assert_eq!(head.status, JobStatus::Processing);
        assert_eq!(head.position, 0);
        assert_eq!(queue.status(&second.job_id).unwrap().position, 1);
        assert_eq!(queue.status(&third.job_id).unwrap().position, 2);

        // A second cycle must not start while the first is in flight.
        assert!(!queue.process_next().await);

        executor.release();
        assert!(worker.await.unwrap());

        let done = queue.status(&first.job_id).unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.result.is_some());
        assert!(done.error.is_none());
    }

    #[tokio::test]
    async fn worker_runs_fifo_one_at_a_time() {
        let executor = Arc::new(FakeExecutor {
            delay: Duration::from_millis(5),
            ..Default::default()
        });
        let queue = manager(
            Arc::clone(&executor),
            QueueConfig {
                tick_interval: Duration::from_millis(10),
                ..Default::default()
            },
        );

        let mut enqueuers = Vec::new();
        for i in 0..8 {
            let queue = Arc::clone(&queue);
            enqueuers.push(tokio::spawn(async move {
                queue.enqueue(request(&format!("job-{i}")))
            }));
        }
        let mut ids = Vec::new();
        for handle in enqueuers {
            ids.push(handle.await.unwrap());
        }
        ids.sort_by_key(|e| e.position);

        let cancel = CancellationToken::new();
        let worker = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.run(cancel).await })
        };

        wait_until(|| queue.stats().completed_cache_count == 8).await;
        cancel.cancel();
        worker.await.unwrap();

        assert_eq!(executor.peak.load(Ordering::SeqCst), 1);
        let expected: Vec<String> = ids
            .iter()
            .map(|e| {
                queue
                    .status(&e.job_id)
                    .and_then(|v| v.result)
                    .map(|r| r.prompt_id.trim_start_matches("p-").to_string())
                    .unwrap()
            })
            .collect();
        assert_eq!(executor.calls(), expected);
    }

    #[tokio::test]
    async fn executor_error_marks_job_failed() {
        let queue = manager(Arc::new(FakeExecutor::default()), QueueConfig::default());
        let job = queue.enqueue(request("fail"));

        assert!(queue.process_next().await);

        let view = queue.status(&job.job_id).unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert!(view.error.unwrap().contains("prompt_id"));
        assert!(view.result.is_none());
    }

    #[tokio::test]
    async fn panic_fails_job_and_queue_continues() {
        let queue = manager(Arc::new(FakeExecutor::default()), QueueConfig::default());
        let bad = queue.enqueue(request("panic"));
        let good = queue.enqueue(request("ok"));

        assert!(queue.process_next().await);
        assert!(queue.process_next().await);

        assert_eq!(queue.status(&bad.job_id).unwrap().status, JobStatus::Failed);
        assert_eq!(queue.status(&good.job_id).unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn ceiling_fails_hung_job() {
        let queue = manager(
            Arc::new(FakeExecutor::default()),
            QueueConfig {
                job_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        );
        let job = queue.enqueue(request("hang"));

        assert!(queue.process_next().await);

        let view = queue.status(&job.job_id).unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert!(view.error.unwrap().contains("timed out"));
        assert_eq!(queue.stats().processing_count, 0);
    }

    #[tokio::test]
    async fn completed_jobs_expire_after_ttl() {
        let queue = manager(
            Arc::new(FakeExecutor::default()),
            QueueConfig {
                completed_ttl: Duration::from_millis(20),
                ..Default::default()
            },
        );
        let first = queue.enqueue(request("a"));
        queue.enqueue(request("b"));
        queue.process_next().await;
        queue.process_next().await;
        assert_eq!(queue.stats().completed_cache_count, 2);

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(queue.status(&first.job_id).is_none());
        assert_eq!(queue.sweep_expired(), 1);
        assert_eq!(queue.stats().completed_cache_count, 0);
    }

    #[tokio::test]
    async fn empty_queue_has_nothing_to_process() {
        let queue = manager(Arc::new(FakeExecutor::default()), QueueConfig::default());
        assert!(!queue.process_next().await);
    }
}
