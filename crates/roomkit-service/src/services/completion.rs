//! Completion service
//!
//! Two ways to reach the text generation API:
//! - buffered: accept the request, call upstream in the background and store
//!   the response in `llm_result` under the caller's task id, where the client
//!   picks it up through a realtime insert subscription
//! - streamed: pass the upstream byte stream straight through

use std::sync::Arc;

use roomkit_core::entities::{CompletionMessage, CompletionRequest, LlmResult};
use roomkit_core::traits::LlmResultRepository;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, Instrument};

use crate::dto::TaskAcceptedResponse;

use super::context::ServiceContext;
use super::error::ServiceResult;
use super::upstream::{CompletionUpstream, UpstreamStream};

/// A buffered completion running in the background
#[derive(Debug)]
pub struct BufferedTask {
    pub accepted: TaskAcceptedResponse,
    pub handle: JoinHandle<()>,
}

/// Completion service
pub struct CompletionService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> CompletionService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Validate the request and start the upstream call in the background.
    ///
    /// A missing task id is generated. Dropping the returned handle detaches the task.
    #[instrument(skip(self, request), fields(task_id))]
    pub fn start_buffered(&self, request: CompletionRequest) -> ServiceResult<BufferedTask> {
        let mut request = self.with_default_model(request);
        let task_id = request
            .task_id
            .take()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        request.task_id = Some(task_id.clone());
        request.validate()?;
        tracing::Span::current().record("task_id", task_id.as_str());

        let upstream = self.ctx.upstream_handle();
        let repo = self.ctx.llm_result_repo_handle();
        let span = tracing::info_span!("buffered_completion", task_id = %task_id);
        let id = task_id.clone();
        let handle = tokio::spawn(
            async move {
                run_buffered(upstream, repo, id, request.model, request.messages).await;
            }
            .instrument(span),
        );

        info!("Buffered completion accepted");
        Ok(BufferedTask {
            accepted: TaskAcceptedResponse { task_id },
            handle,
        })
    }

    /// Open a streamed completion
    #[instrument(skip(self, request))]
    pub async fn stream(&self, request: CompletionRequest) -> ServiceResult<UpstreamStream> {
        let request = self.with_default_model(request);
        request.validate()?;
        self.ctx
            .upstream()
            .stream(&request.model, &request.messages)
            .await
    }

    fn with_default_model(&self, mut request: CompletionRequest) -> CompletionRequest {
        if request.model.trim().is_empty() {
            request.model = self.ctx.default_model().to_string();
        }
        request
    }
}

/// Call upstream once and store the response. Failures are logged, never retried.
async fn run_buffered(
    upstream: Arc<dyn CompletionUpstream>,
    repo: Arc<dyn LlmResultRepository>,
    task_id: String,
    model: String,
    messages: Vec<CompletionMessage>,
) {
    let response = match upstream.complete(&model, &messages).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "Upstream completion failed");
            return;
        }
    };

    match repo.insert(&LlmResult::new(task_id, response)).await {
        Ok(()) => info!("Completion result stored"),
        Err(e) => error!(error = %e, "Failed to store completion result"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceError;
    use crate::testing::{FakeUpstream, TestHarness};
    use futures_util::TryStreamExt;
    use serde_json::json;

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![CompletionMessage::user("Summarize this")], "")
    }

    #[tokio::test]
    async fn test_buffered_result_is_stored_under_task_id() {
        let harness = TestHarness::with_upstream(FakeUpstream::replying(json!({
            "choices": [{ "message": { "role": "assistant", "content": "Short." } }]
        })));
        let service = CompletionService::new(&harness.ctx);

        let task = service
            .start_buffered(request().with_task_id("task-1"))
            .unwrap();
        assert_eq!(task.accepted.task_id, "task-1");
        task.handle.await.unwrap();

        let stored = harness.results.get("task-1").expect("result stored");
        assert_eq!(stored.content().as_deref(), Some("Short."));
        assert_eq!(harness.upstream.last_model().as_deref(), Some("test-model"));
    }

    #[tokio::test]
    async fn test_task_id_generated_when_missing() {
        let harness = TestHarness::new();
        let service = CompletionService::new(&harness.ctx);

        let task = service.start_buffered(request()).unwrap();
        task.handle.await.unwrap();

        assert_eq!(task.accepted.task_id.len(), 36);
        assert!(harness.results.get(&task.accepted.task_id).is_some());
    }

    #[tokio::test]
    async fn test_upstream_failure_stores_nothing() {
        let harness = TestHarness::with_upstream(FakeUpstream::failing());
        let service = CompletionService::new(&harness.ctx);

        let task = service
            .start_buffered(request().with_task_id("task-2"))
            .unwrap();
        task.handle.await.unwrap();

        assert!(harness.results.get("task-2").is_none());
        assert_eq!(harness.upstream.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_messages_rejected_before_upstream() {
        let harness = TestHarness::new();
        let service = CompletionService::new(&harness.ctx);

        let err = service
            .start_buffered(CompletionRequest::new(vec![], "m"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(_)));
        assert_eq!(err.status_code(), 400);
        assert_eq!(harness.upstream.calls(), 0);
    }

    #[tokio::test]
    async fn test_stream_passes_bytes_through() {
        let harness = TestHarness::new();
        let service = CompletionService::new(&harness.ctx);

        let stream = service.stream(request()).await.unwrap();
        assert_eq!(stream.content_type, "text/event-stream");

        let chunks: Vec<_> = stream.body.try_collect().await.unwrap();
        let joined: Vec<u8> = chunks.concat();
        assert_eq!(joined, b"data: one\n\ndata: two\n\n");
    }
}
