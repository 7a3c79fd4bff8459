use std::path::PathBuf;
use std::time::Duration;

use archviz_pipeline::PipelineConfig;

use crate::engine::queue::QueueConfig;

/// Headroom on engine-bound routes for the connectivity probe and response
/// handling on top of the engine timeouts themselves.
const ENGINE_ROUTE_SLACK: Duration = Duration::from_secs(30);

/// Errors raised while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("Invalid CORS origin '{0}'")]
    CorsOrigin(String),

    #[error("Cannot determine install root: {0}")]
    InstallRoot(String),
}

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Engine base: absolute URL or relative mount path (default: `/comfy`).
    pub comfyui_api_url: String,
    /// Origin prepended to a relative mount path for outbound calls.
    pub comfyui_proxy_origin: Option<String>,
    /// `/prompt` timeout in milliseconds (default: `180000`).
    pub comfyui_timeout_ms: u64,
    /// Template directory; relative values are resolved against `install_root`.
    pub workflow_dir: PathBuf,
    pub install_root: PathBuf,
    /// Ceiling on one queued job, submission through result (default: `300`).
    pub queue_job_timeout_secs: u64,
    /// How long finished jobs stay queryable (default: `3600`).
    pub queue_completed_ttl_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                    |
    /// |----------------------------|----------------------------|
    /// | `HOST`                     | `0.0.0.0`                  |
    /// | `PORT`                     | `3000`                     |
    /// | `CORS_ORIGINS`             | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                       |
    /// | `COMFYUI_API_URL`          | `/comfy`                   |
    /// | `COMFYUI_PROXY_ORIGIN`     | unset                      |
    /// | `COMFYUI_TIMEOUT`          | `180000` (ms)              |
    /// | `COMFYUI_WORKFLOW_DIR`     | `comfyui_workflows`        |
    /// | `ARCHVIZ_INSTALL_ROOT`     | the executable's directory |
    /// | `QUEUE_JOB_TIMEOUT_SECS`   | `300`                      |
    /// | `QUEUE_COMPLETED_TTL_SECS` | `3600`                     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_or(var("PORT"), "PORT", "u16", 3000)?;

        let cors_origins: Vec<String> = var("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if let Some(bad) = cors_origins
            .iter()
            .find(|o| o.parse::<axum::http::HeaderValue>().is_err())
        {
            return Err(ConfigError::CorsOrigin(bad.clone()));
        }

        let request_timeout_secs =
            parse_or(var("REQUEST_TIMEOUT_SECS"), "REQUEST_TIMEOUT_SECS", "u64", 30)?;
        let comfyui_api_url = var("COMFYUI_API_URL").unwrap_or_else(|| "/comfy".into());
        let comfyui_proxy_origin = var("COMFYUI_PROXY_ORIGIN");
        let comfyui_timeout_ms = parse_or(var("COMFYUI_TIMEOUT"), "COMFYUI_TIMEOUT", "u64", 180_000)?;
        let workflow_dir =
            PathBuf::from(var("COMFYUI_WORKFLOW_DIR").unwrap_or_else(|| "comfyui_workflows".into()));

        let install_root = match var("ARCHVIZ_INSTALL_ROOT") {
            Some(root) => PathBuf::from(root),
            None => default_install_root()?,
        };

        let queue_job_timeout_secs =
            parse_or(var("QUEUE_JOB_TIMEOUT_SECS"), "QUEUE_JOB_TIMEOUT_SECS", "u64", 300)?;
        let queue_completed_ttl_secs = parse_or(
            var("QUEUE_COMPLETED_TTL_SECS"),
            "QUEUE_COMPLETED_TTL_SECS",
            "u64",
            3600,
        )?;

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            comfyui_api_url,
            comfyui_proxy_origin,
            comfyui_timeout_ms,
            workflow_dir,
            install_root,
            queue_job_timeout_secs,
            queue_completed_ttl_secs,
        })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            engine_url: self.comfyui_api_url.clone(),
            proxy_origin: self.comfyui_proxy_origin.clone(),
            submit_timeout: Duration::from_millis(self.comfyui_timeout_ms),
            max_wait: Duration::from_secs(self.queue_job_timeout_secs),
            ..PipelineConfig::default()
        }
    }

    /// Ceiling for ordinary requests.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Ceiling for `POST /comfyui/submit`. Always outlasts the engine's
    /// `/prompt` timeout so an accepted prompt is never cut off before its
    /// id reaches the client.
    pub fn submit_request_timeout(&self) -> Duration {
        let engine = Duration::from_millis(self.comfyui_timeout_ms) + ENGINE_ROUTE_SLACK;
        engine.max(self.request_timeout())
    }

    /// Ceiling for `POST /comfyui/generate`: submission plus the full wait
    /// for results.
    pub fn generate_request_timeout(&self) -> Duration {
        let engine = Duration::from_millis(self.comfyui_timeout_ms)
            + Duration::from_secs(self.queue_job_timeout_secs)
            + ENGINE_ROUTE_SLACK;
        engine.max(self.request_timeout())
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            job_timeout: Duration::from_secs(self.queue_job_timeout_secs),
            completed_ttl: Duration::from_secs(self.queue_completed_ttl_secs),
            ..QueueConfig::default()
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    name: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value: v,
        }),
    }
}

fn default_install_root() -> Result<PathBuf, ConfigError> {
    let exe = std::env::current_exe().map_err(|e| ConfigError::InstallRoot(e.to_string()))?;
    exe.parent()
        .map(PathBuf::from)
        .ok_or_else(|| ConfigError::InstallRoot(format!("{} has no parent", exe.display())))
}
