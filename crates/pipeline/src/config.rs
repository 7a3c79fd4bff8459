//! Pipeline settings.

use std::time::Duration;

/// Tag sent as `client_id` with every submission.
pub const DEFAULT_CLIENT_ID: &str = "archvisualizer-web";

/// Engine settings shared by the submission pipeline, poller and generator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Engine base as configured: an absolute URL or a relative mount path.
    pub engine_url: String,
    /// Origin prepended to a relative mount path for outbound calls.
    pub proxy_origin: Option<String>,
    pub client_id: String,
    pub submit_timeout: Duration,
    pub history_timeout: Duration,
    /// Delay between history polls while waiting for a result.
    pub poll_interval: Duration,
    /// Ceiling on the wait for artifacts after submission.
    pub max_wait: Duration,
    /// Simulated delay before a synthetic job reports its placeholder.
    pub placeholder_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            engine_url: "/comfy".to_string(),
            proxy_origin: None,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            submit_timeout: Duration::from_millis(180_000),
            history_timeout: Duration::from_secs(8),
            poll_interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(300),
            placeholder_delay: Duration::from_secs(2),
        }
    }
}

impl PipelineConfig {
    /// Base URL used for real requests to the engine.
    ///
    /// A relative mount path is joined onto `proxy_origin` when one is set;
    /// otherwise it is returned unchanged and requests against it fail at
    /// the transport layer.
    pub fn outbound_url(&self) -> String {
        let engine_url = self.engine_url.trim();
        match (&self.proxy_origin, engine_url.starts_with('/')) {
            (Some(origin), true) => format!("{}{}", origin.trim_end_matches('/'), engine_url),
            _ => engine_url.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_url_used_directly() {
        let config = PipelineConfig {
            engine_url: "http://gpu:8188".into(),
            proxy_origin: Some("http://ignored".into()),
            ..Default::default()
        };
        assert_eq!(config.outbound_url(), "http://gpu:8188");
    }

    #[test]
    fn relative_mount_joined_to_origin() {
        let config = PipelineConfig {
            engine_url: "/comfy".into(),
            proxy_origin: Some("http://edge.local/".into()),
            ..Default::default()
        };
        assert_eq!(config.outbound_url(), "http://edge.local/comfy");
    }

    #[test]
    fn relative_mount_without_origin_is_unchanged() {
        assert_eq!(PipelineConfig::default().outbound_url(), "/comfy");
    }
}
