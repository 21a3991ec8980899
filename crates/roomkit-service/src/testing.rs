//! In-memory doubles for tests in this and downstream crates (`testing` feature)

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use parking_lot::Mutex;
use roomkit_common::JwtService;
use roomkit_core::entities::{CompletionMessage, LlmResult, UserProfile};
use roomkit_core::traits::{LlmResultRepository, ProfileRepository, RepoResult};
use roomkit_core::DomainError;
use serde_json::{json, Value};

use crate::services::{
    CompletionUpstream, ServiceContext, ServiceContextBuilder, ServiceError, ServiceResult,
    UpstreamStream,
};

#[derive(Default)]
pub struct InMemoryProfiles {
    rows: Mutex<HashMap<String, UserProfile>>,
}

#[async_trait]
impl ProfileRepository for InMemoryProfiles {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<UserProfile>> {
        Ok(self.rows.lock().get(id).cloned())
    }

    async fn name_exists(&self, name: &str) -> RepoResult<bool> {
        Ok(self.rows.lock().values().any(|p| p.name == name))
    }

    async fn create(&self, profile: &UserProfile) -> RepoResult<()> {
        let mut rows = self.rows.lock();
        if rows.contains_key(&profile.id) {
            return Err(DomainError::ProfileAlreadyExists);
        }
        rows.insert(profile.id.clone(), profile.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryResults {
    rows: Mutex<HashMap<String, LlmResult>>,
}

impl InMemoryResults {
    pub fn get(&self, id: &str) -> Option<LlmResult> {
        self.rows.lock().get(id).cloned()
    }
}

#[async_trait]
impl LlmResultRepository for InMemoryResults {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<LlmResult>> {
        Ok(self.get(id))
    }

    async fn insert(&self, result: &LlmResult) -> RepoResult<()> {
        let mut rows = self.rows.lock();
        if rows.contains_key(&result.id) {
            return Err(DomainError::ResultAlreadyExists);
        }
        rows.insert(result.id.clone(), result.clone());
        Ok(())
    }
}

/// Upstream double that records calls
pub struct FakeUpstream {
    reply: Option<Value>,
    calls: AtomicUsize,
    last_model: Mutex<Option<String>>,
}

impl FakeUpstream {
    pub fn replying(reply: Value) -> Self {
        Self {
            reply: Some(reply),
            calls: AtomicUsize::new(0),
            last_model: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
            last_model: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_model(&self) -> Option<String> {
        self.last_model.lock().clone()
    }
}

#[async_trait]
impl CompletionUpstream for FakeUpstream {
    async fn complete(&self, model: &str, _messages: &[CompletionMessage]) -> ServiceResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_model.lock() = Some(model.to_string());
        self.reply
            .clone()
            .ok_or_else(|| ServiceError::upstream("status 500 Internal Server Error"))
    }

    async fn stream(
        &self,
        model: &str,
        _messages: &[CompletionMessage],
    ) -> ServiceResult<UpstreamStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_model.lock() = Some(model.to_string());
        let chunks = vec![
            Ok(Bytes::from_static(b"data: one\n\n")),
            Ok(Bytes::from_static(b"data: two\n\n")),
        ];
        Ok(UpstreamStream {
            content_type: "text/event-stream".to_string(),
            body: futures_util::stream::iter(chunks).boxed(),
        })
    }
}

pub struct TestHarness {
    pub ctx: ServiceContext,
    pub results: Arc<InMemoryResults>,
    pub upstream: Arc<FakeUpstream>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_upstream(FakeUpstream::replying(json!({
            "choices": [{ "message": { "role": "assistant", "content": "ok" } }]
        })))
    }

    pub fn with_upstream(upstream: FakeUpstream) -> Self {
        let results = Arc::new(InMemoryResults::default());
        let upstream = Arc::new(upstream);
        let ctx = ServiceContextBuilder::new()
            .profile_repo(Arc::new(InMemoryProfiles::default()))
            .llm_result_repo(results.clone())
            .jwt_service(Arc::new(JwtService::new("test-secret-key-that-is-long-enough")))
            .upstream(upstream.clone())
            .default_model("test-model")
            .build()
            .expect("complete context");

        Self {
            ctx,
            results,
            upstream,
        }
    }
}
