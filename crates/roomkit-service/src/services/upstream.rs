//! Text generation API client
//!
//! The API key never leaves the server. Both calls send an OpenAI-style chat
//! completion body; the streaming call asks for `stream: true` and hands the
//! raw bytes back untouched.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use roomkit_common::LlmConfig;
use roomkit_core::entities::CompletionMessage;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use super::error::{ServiceError, ServiceResult};

/// Raw upstream response body for the streaming function
pub struct UpstreamStream {
    pub content_type: String,
    pub body: BoxStream<'static, Result<Bytes, ServiceError>>,
}

impl std::fmt::Debug for UpstreamStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamStream")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Seam between the completion service and the text generation API
#[async_trait]
pub trait CompletionUpstream: Send + Sync {
    /// Run a buffered completion and return the full JSON response
    async fn complete(&self, model: &str, messages: &[CompletionMessage]) -> ServiceResult<Value>;

    /// Start a streamed completion
    async fn stream(
        &self,
        model: &str,
        messages: &[CompletionMessage],
    ) -> ServiceResult<UpstreamStream>;
}

#[derive(Serialize)]
struct UpstreamBody<'a> {
    model: &'a str,
    messages: &'a [CompletionMessage],
    stream: bool,
}

/// reqwest-backed client for an OpenAI-compatible chat completion endpoint
#[derive(Clone)]
pub struct HttpCompletionUpstream {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    timeout: Duration,
}

impl HttpCompletionUpstream {
    pub fn new(config: &LlmConfig) -> ServiceResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ServiceError::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn send(
        &self,
        model: &str,
        messages: &[CompletionMessage],
        stream: bool,
    ) -> ServiceResult<reqwest::Response> {
        let mut request = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&UpstreamBody {
                model,
                messages,
                stream,
            });
        // A streamed answer may legitimately outlive the buffered timeout
        if !stream {
            request = request.timeout(self.timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::upstream(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::upstream(format!(
                "status {status}: {}",
                truncate(&body, 200)
            )));
        }

        Ok(response)
    }
}

impl std::fmt::Debug for HttpCompletionUpstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCompletionUpstream")
            .field("api_url", &self.api_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CompletionUpstream for HttpCompletionUpstream {
    #[instrument(skip(self, messages), fields(message_count = messages.len()))]
    async fn complete(&self, model: &str, messages: &[CompletionMessage]) -> ServiceResult<Value> {
        let response = self.send(model, messages, false).await?;
        let json = response
            .json::<Value>()
            .await
            .map_err(|e| ServiceError::upstream(format!("invalid JSON response: {e}")))?;
        debug!("Upstream completion received");
        Ok(json)
    }

    #[instrument(skip(self, messages), fields(message_count = messages.len()))]
    async fn stream(
        &self,
        model: &str,
        messages: &[CompletionMessage],
    ) -> ServiceResult<UpstreamStream> {
        let response = self.send(model, messages, true).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/event-stream")
            .to_string();

        let body = response
            .bytes_stream()
            .map_err(|e| ServiceError::upstream(format!("stream interrupted: {e}")))
            .boxed();

        Ok(UpstreamStream { content_type, body })
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
