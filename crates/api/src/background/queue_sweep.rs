//! Periodic cleanup of expired completed jobs.
//!
//! Lookups already drop expired entries lazily; this loop bounds memory
//! for jobs nobody asks about again.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::queue::QueueManager;

/// How often the sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(queue: Arc<QueueManager>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Queue sweep job started");

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Queue sweep job stopping");
                break;
            }
            _ = ticker.tick() => {
                let removed = queue.sweep_expired();
                if removed > 0 {
                    tracing::info!(removed, "Queue sweep: dropped expired jobs");
                } else {
                    tracing::debug!("Queue sweep: nothing to drop");
                }
            }
        }
    }
}
