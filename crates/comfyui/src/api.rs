//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps the ComfyUI HTTP API (workflow submission, history retrieval,
//! artifact download) using [`reqwest`].

use std::time::Duration;

use serde::Deserialize;

use crate::history::HistoryResponse;

/// Default timeout for `POST /prompt`.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(180);

/// Default timeout for a single `GET /history/{id}` poll.
pub const DEFAULT_HISTORY_TIMEOUT: Duration = Duration::from_secs(8);

/// Default timeout for `GET /view` artifact downloads.
pub const DEFAULT_VIEW_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP client for a single ComfyUI instance.
#[derive(Debug, Clone)]
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
    submit_timeout: Duration,
    history_timeout: Duration,
    view_timeout: Duration,
}

/// Response returned by the ComfyUI `/prompt` endpoint after queuing a
/// workflow.
///
/// Both fields are optional on the wire so a malformed reply can be told
/// apart from a transport failure.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: Option<String>,
    /// Position in the engine's own execution queue.
    pub number: Option<i64>,
}

/// Raw artifact bytes fetched from `/view`.
#[derive(Debug)]
pub struct ViewResponse {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`. A trailing
    ///   slash is stripped.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (shares the connection pool with the prober).
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim().trim_end_matches('/').to_string();
        Self {
            client,
            api_url,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            history_timeout: DEFAULT_HISTORY_TIMEOUT,
            view_timeout: DEFAULT_VIEW_TIMEOUT,
        }
    }

    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    pub fn with_history_timeout(mut self, timeout: Duration) -> Self {
        self.history_timeout = timeout;
        self
    }

    /// Submit a workflow for execution.
    ///
    /// Sends a `POST /prompt` request with the given workflow JSON and
    /// client tag.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .timeout(self.submit_timeout)
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve execution history for a specific prompt.
    ///
    /// Sends a `GET /history/{prompt_id}` request. The response is keyed
    /// by prompt id and is empty while the prompt has not run yet.
    pub async fn get_history(&self, prompt_id: &str) -> Result<HistoryResponse, ComfyUIApiError> {
        let encoded: String = url::form_urlencoded::byte_serialize(prompt_id.as_bytes()).collect();
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, encoded))
            .timeout(self.history_timeout)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Download raw artifact bytes via `GET /view`.
    pub async fn view(
        &self,
        filename: &str,
        subfolder: &str,
        kind: &str,
    ) -> Result<ViewResponse, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[("filename", filename), ("subfolder", subfolder), ("type", kind)])
            .header(reqwest::header::ACCEPT, "image/*")
            .timeout(self.view_timeout)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();

        Ok(ViewResponse {
            content_type,
            bytes,
        })
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn submit_posts_prompt_and_client_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .and(body_partial_json(json!({ "client_id": "tester" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "prompt_id": "p-1", "number": 4 })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = ComfyUIApi::new(format!("{}/", server.uri()));
        let response = api
            .submit_workflow(&json!({ "1": { "class_type": "SaveImage", "inputs": {} } }), "tester")
            .await
            .unwrap();

        assert_eq!(response.prompt_id.as_deref(), Some("p-1"));
        assert_eq!(response.number, Some(4));
    }

    #[tokio::test]
    async fn submit_without_prompt_id_still_parses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": "nope" })))
            .mount(&server)
            .await;

        let api = ComfyUIApi::new(server.uri());
        let response = api.submit_workflow(&json!({}), "tester").await.unwrap();
        assert!(response.prompt_id.is_none());
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/prompt"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad node"))
            .mount(&server)
            .await;

        let api = ComfyUIApi::new(server.uri());
        let err = api.submit_workflow(&json!({}), "tester").await.unwrap_err();
        assert_matches!(err, ComfyUIApiError::ApiError { status: 400, ref body } if body == "bad node");
    }

    #[tokio::test]
    async fn view_returns_bytes_and_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/view"))
            .and(query_param("filename", "out.png"))
            .and(query_param("type", "output"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![1u8, 2, 3]),
            )
            .mount(&server)
            .await;

        let api = ComfyUIApi::new(server.uri());
        let view = api.view("out.png", "", "output").await.unwrap();
        assert_eq!(view.content_type.as_deref(), Some("image/png"));
        assert_eq!(view.bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn relative_base_fails_at_transport_layer() {
        let api = ComfyUIApi::new("/comfy");
        let err = api.get_history("abc").await.unwrap_err();
        assert_matches!(err, ComfyUIApiError::Request(_));
    }
}
