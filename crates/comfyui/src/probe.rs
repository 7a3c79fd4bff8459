//! Connectivity prober with a short-lived status cache.
//!
//! An absolute engine URL is probed with up to three request shapes (bare
//! URL, URL with a trailing slash, `<url>/queue`). Any HTTP response counts
//! as reachable; only transport failures mark the engine disconnected.
//!
//! A relative mount path (e.g. `/comfy`) cannot be verified from this
//! process and short-circuits to a synthetic success.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use archviz_core::types::Timestamp;
use serde::Serialize;

/// How long a probe result is reused for the same URL.
pub const PROBE_CACHE_TTL: Duration = Duration::from_secs(5);

/// Timeout for each individual probe attempt.
pub const PROBE_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Status code the engine's edge returns when it is overloaded.
pub const OVERLOAD_STATUS: u16 = 530;

/// Result of a connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub timestamp: Timestamp,
    /// Set when the status was not obtained from a real network check.
    pub synthetic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionStatus {
    fn synthetic(url: &str) -> Self {
        Self {
            connected: true,
            url: url.to_string(),
            http_status: None,
            version: None,
            timestamp: chrono::Utc::now(),
            synthetic: true,
            error: None,
        }
    }

    fn reachable(url: &str, http_status: u16, version: Option<String>) -> Self {
        Self {
            connected: true,
            url: url.to_string(),
            http_status: Some(http_status),
            version,
            timestamp: chrono::Utc::now(),
            synthetic: false,
            error: None,
        }
    }

    fn unreachable(url: &str, error: String) -> Self {
        Self {
            connected: false,
            url: url.to_string(),
            http_status: None,
            version: None,
            timestamp: chrono::Utc::now(),
            synthetic: false,
            error: Some(error),
        }
    }

    /// True when the engine answered with the overload status.
    pub fn is_overloaded(&self) -> bool {
        self.http_status == Some(OVERLOAD_STATUS)
    }
}

struct CachedStatus {
    checked_at: Instant,
    status: ConnectionStatus,
}

/// Probes engine reachability and caches the last result.
pub struct ConnectionProber {
    client: reqwest::Client,
    ttl: Duration,
    attempt_timeout: Duration,
    cache: Mutex<Option<CachedStatus>>,
}

impl ConnectionProber {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            ttl: PROBE_CACHE_TTL,
            attempt_timeout: PROBE_ATTEMPT_TIMEOUT,
            cache: Mutex::new(None),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Probe `url`, reusing a cached result for the same URL within the TTL.
    pub async fn probe(&self, url: &str) -> ConnectionStatus {
        let url = url.trim();

        if url.starts_with('/') {
            tracing::debug!(url, "Relative engine mount, assuming reachable");
            let status = ConnectionStatus::synthetic(url);
            self.store(&status);
            return status;
        }

        if let Some(cached) = self.cached(url) {
            tracing::trace!(url, "Using cached connection status");
            return cached;
        }

        let status = self.check(url).await;
        self.store(&status);
        status
    }

    async fn check(&self, url: &str) -> ConnectionStatus {
        let mut last_error = String::new();

        for attempt in attempt_urls(url) {
            tracing::debug!(url = %attempt, "Probing engine");
            match self
                .client
                .get(&attempt)
                .timeout(self.attempt_timeout)
                .send()
                .await
            {
                Ok(response) => {
                    let http_status = response.status().as_u16();
                    let version = response
                        .json::<serde_json::Value>()
                        .await
                        .ok()
                        .and_then(|body| body.get("version")?.as_str().map(str::to_string));
                    tracing::info!(url = %attempt, http_status, "Engine reachable");
                    return ConnectionStatus::reachable(url, http_status, version);
                }
                Err(e) => {
                    tracing::debug!(url = %attempt, error = %e, "Probe attempt failed");
                    last_error = e.to_string();
                }
            }
        }

        tracing::warn!(url, error = %last_error, "Engine unreachable");
        ConnectionStatus::unreachable(url, format!("cannot reach engine: {last_error}"))
    }

    fn cached(&self, url: &str) -> Option<ConnectionStatus> {
        let cache = self.cache.lock().ok()?;
        cache
            .as_ref()
            .filter(|c| c.status.url == url && c.checked_at.elapsed() < self.ttl)
            .map(|c| c.status.clone())
    }

    fn store(&self, status: &ConnectionStatus) {
        if let Ok(mut cache) = self.cache.lock() {
            *cache = Some(CachedStatus {
                checked_at: Instant::now(),
                status: status.clone(),
            });
        }
    }
}

/// Request shapes tried in order for an absolute URL.
fn attempt_urls(url: &str) -> Vec<String> {
    let mut attempts = vec![url.to_string()];
    if !url.ends_with('/') {
        attempts.push(format!("{url}/"));
    }
    attempts.push(format!("{}/queue", url.trim_end_matches('/')));
    attempts
}
