//! Completion waiter
//!
//! The buffered completion function answers with a task id straight away and
//! later inserts the result into `llm_result`. The waiter subscribes to that
//! insert and waits for the join before making the request, then races the
//! matching row against a timeout and an explicit cancel. Whichever way it ends, the subscription is
//! dropped so a late row has nowhere to land.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use roomkit_core::{extract_completion_text, CompletionMessage, CompletionRequest};
use roomkit_realtime::{InsertSubscription, RealtimeClient, RealtimeError};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::api::ApiClient;
use crate::error::{ClientError, ClientResult};

/// Table the buffered function writes results into
pub const RESULT_TABLE: &str = "llm_result";

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("No result after {}ms", .waited.as_millis())]
    Timeout { waited: Duration },

    #[error("Completion cancelled")]
    Cancelled,

    #[error("Result subscription ended before a result arrived")]
    SubscriptionClosed,

    #[error("Malformed completion result: {0}")]
    InvalidResult(String),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl From<RealtimeError> for CompletionError {
    fn from(err: RealtimeError) -> Self {
        Self::Client(ClientError::Realtime(err))
    }
}

impl CompletionError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout { .. } => "The assistant took too long to answer, please try again".to_string(),
            Self::Cancelled => "Request cancelled".to_string(),
            Self::SubscriptionClosed | Self::InvalidResult(_) => {
                "Something went wrong, please try again".to_string()
            }
            Self::Client(e) => e.user_message(),
        }
    }
}

/// A finished buffered completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completed {
    pub task_id: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskAccepted {
    task_id: String,
}

/// Cancels a pending completion from anywhere
#[derive(Clone, Debug)]
pub struct CancelHandle {
    flag: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }
}

/// A requested completion that has not resolved yet
pub struct PendingCompletion {
    task_id: String,
    subscription: InsertSubscription,
    timeout: Duration,
    cancel: Arc<watch::Sender<bool>>,
}

impl PendingCompletion {
    /// Wait on `subscription` for the row keyed `task_id`
    pub fn new(task_id: impl Into<String>, subscription: InsertSubscription, timeout: Duration) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            task_id: task_id.into(),
            subscription,
            timeout,
            cancel: Arc::new(cancel),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: self.cancel.clone(),
        }
    }

    /// First of: the matching row, the timeout, or cancellation
    #[instrument(skip(self), fields(task_id = %self.task_id))]
    pub async fn wait(mut self) -> Result<Completed, CompletionError> {
        let mut cancelled = self.cancel.subscribe();
        let timeout = self.timeout;
        let task_id = self.task_id.clone();

        let outcome = tokio::select! {
            biased;
            () = wait_cancelled(&mut cancelled) => Err(CompletionError::Cancelled),
            row = matching_row(&mut self.subscription, &task_id) => match row {
                Some(row) => completed(&task_id, &row),
                None => Err(CompletionError::SubscriptionClosed),
            },
            () = tokio::time::sleep(timeout) => Err(CompletionError::Timeout { waited: timeout }),
        };

        match &outcome {
            Ok(_) => info!("Completion received"),
            Err(e) => warn!(error = %e, "Completion did not resolve"),
        }
        // Leaving the channel here means a late row is never delivered
        self.subscription.close();
        outcome
    }
}

impl std::fmt::Debug for PendingCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCompletion")
            .field("task_id", &self.task_id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

async fn wait_cancelled(flag: &mut watch::Receiver<bool>) {
    if flag.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn matching_row(subscription: &mut InsertSubscription, task_id: &str) -> Option<Value> {
    while let Some(row) = subscription.next_row().await {
        if row.get("id").and_then(Value::as_str) == Some(task_id) {
            return Some(row);
        }
        debug!(row_id = ?row.get("id"), "Ignoring result for another task");
    }
    None
}

/// Parse `llm_response` out of a result row. The column is JSON but may
/// arrive as an encoded string.
fn completed(task_id: &str, row: &Value) -> Result<Completed, CompletionError> {
    let response = match row.get("llm_response") {
        Some(Value::String(raw)) => serde_json::from_str(raw)
            .map_err(|e| CompletionError::InvalidResult(e.to_string()))?,
        Some(value) => value.clone(),
        None => {
            return Err(CompletionError::InvalidResult(
                "row has no llm_response".to_string(),
            ))
        }
    };

    let content = extract_completion_text(&response).ok_or_else(|| {
        CompletionError::InvalidResult("no choices[0].message.content".to_string())
    })?;

    Ok(Completed {
        task_id: task_id.to_string(),
        content,
    })
}

/// Requests completions through the backend functions
#[derive(Clone, Debug)]
pub struct CompletionClient {
    api: ApiClient,
    realtime: RealtimeClient,
    timeout: Duration,
}

impl CompletionClient {
    pub fn new(api: ApiClient, realtime: RealtimeClient, timeout: Duration) -> Self {
        Self {
            api,
            realtime,
            timeout,
        }
    }

    /// Subscribe for the result, then start the buffered function once the
    /// subscription is acknowledged (or the join timeout passes)
    #[instrument(skip(self, messages))]
    pub async fn request_completion(
        &self,
        messages: Vec<CompletionMessage>,
        model: &str,
    ) -> Result<PendingCompletion, CompletionError> {
        // Signed out means no socket traffic either
        self.api.token()?;

        let task_id = Uuid::new_v4().to_string();
        let mut subscription = self
            .realtime
            .subscribe_inserts(RESULT_TABLE, Some(&format!("id=eq.{task_id}")))?;
        match subscription.wait_joined().await {
            Ok(_) => {}
            Err(RealtimeError::JoinRefused(_)) => return Err(CompletionError::SubscriptionClosed),
            Err(e) => return Err(e.into()),
        }

        let request = CompletionRequest::new(messages, model).with_task_id(&task_id);
        let response = self.api.invoke_function("llm", &request).await?;
        let accepted: TaskAccepted = response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        if accepted.task_id != task_id {
            warn!(expected = %task_id, got = %accepted.task_id, "Backend echoed a different task id");
        }

        debug!(task_id = %task_id, "Completion queued");
        Ok(PendingCompletion::new(task_id, subscription, self.timeout))
    }

    /// Request and wait in one go
    pub async fn complete(
        &self,
        messages: Vec<CompletionMessage>,
        model: &str,
    ) -> Result<Completed, CompletionError> {
        self.request_completion(messages, model).await?.wait().await
    }

    /// Raw chunks from the streaming function as they arrive
    pub async fn stream_completion(
        &self,
        messages: Vec<CompletionMessage>,
        model: &str,
    ) -> ClientResult<BoxStream<'static, ClientResult<Bytes>>> {
        let request = CompletionRequest::new(messages, model);
        let response = self.api.invoke_function("stream-llm", &request).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ClientError::from))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomkit_realtime::testing::MockServer;
    use serde_json::json;

    const TIMEOUT: Duration = Duration::from_millis(15_000);

    fn llm_row(id: &str, content: &str) -> Value {
        json!({
            "id": id,
            "llm_response": { "choices": [{ "message": { "role": "assistant", "content": content } }] },
            "created_at": "2025-01-01T00:00:00Z"
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_configured_wait() {
        let (client, mut server) = MockServer::client();
        let subscription = client.subscribe_inserts(RESULT_TABLE, Some("id=eq.t-1")).unwrap();
        let topic = subscription.topic().to_string();
        let join = server.expect_event("phx_join").await;
        server.reply_ok(&join);

        let started = tokio::time::Instant::now();
        let result = PendingCompletion::new("t-1", subscription, TIMEOUT).wait().await;

        assert!(matches!(result, Err(CompletionError::Timeout { waited }) if waited == TIMEOUT));
        assert_eq!(started.elapsed(), TIMEOUT);

        // The channel is gone; a late row goes nowhere
        let leave = server.expect_event("phx_leave").await;
        assert_eq!(leave.topic, topic);
        assert!(!client.socket().is_registered(&topic));
        server.insert_row(&topic, RESULT_TABLE, llm_row("t-1", "late"));
        assert!(server.try_next_frame().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_matching_row_wins() {
        let (client, mut server) = MockServer::client();
        let subscription = client.subscribe_inserts(RESULT_TABLE, None).unwrap();
        let topic = subscription.topic().to_string();
        let join = server.expect_event("phx_join").await;
        server.reply_ok(&join);

        server.insert_row(&topic, RESULT_TABLE, llm_row("other", "not mine"));
        server.insert_row(&topic, RESULT_TABLE, llm_row("t-2", "hello"));

        let started = tokio::time::Instant::now();
        let completed = PendingCompletion::new("t-2", subscription, TIMEOUT)
            .wait()
            .await
            .unwrap();

        assert_eq!(completed.content, "hello");
        assert_eq!(completed.task_id, "t-2");
        assert!(started.elapsed() < TIMEOUT);
        server.expect_event("phx_leave").await;
    }

    #[tokio::test]
    async fn test_cancel() {
        let (client, mut server) = MockServer::client();
        let subscription = client.subscribe_inserts(RESULT_TABLE, None).unwrap();
        server.expect_event("phx_join").await;

        let pending = PendingCompletion::new("t-3", subscription, TIMEOUT);
        let handle = pending.cancel_handle();
        let waiter = tokio::spawn(pending.wait());

        handle.cancel();

        assert!(matches!(waiter.await.unwrap(), Err(CompletionError::Cancelled)));
        assert!(handle.is_cancelled());
        server.expect_event("phx_leave").await;
    }

    #[tokio::test]
    async fn test_refused_subscription() {
        let (client, mut server) = MockServer::client();
        let subscription = client.subscribe_inserts(RESULT_TABLE, None).unwrap();
        let join = server.expect_event("phx_join").await;
        server.reply_error(&join, "unauthorized");

        let result = PendingCompletion::new("t-4", subscription, TIMEOUT).wait().await;

        assert!(matches!(result, Err(CompletionError::SubscriptionClosed)));
    }

    #[test]
    fn test_string_encoded_response() {
        let row = json!({
            "id": "t-5",
            "llm_response": r#"{"choices":[{"message":{"content":"hi"}}]}"#
        });
        assert_eq!(completed("t-5", &row).unwrap().content, "hi");
    }

    #[test]
    fn test_malformed_row() {
        assert!(matches!(
            completed("t-6", &json!({ "id": "t-6" })),
            Err(CompletionError::InvalidResult(_))
        ));
        assert!(matches!(
            completed("t-6", &json!({ "id": "t-6", "llm_response": { "error": "quota" } })),
            Err(CompletionError::InvalidResult(_))
        ));
    }

    #[test]
    fn test_timeout_message() {
        let err = CompletionError::Timeout { waited: TIMEOUT };
        assert_eq!(err.to_string(), "No result after 15000ms");
        assert!(err.user_message().contains("too long"));
    }
}
