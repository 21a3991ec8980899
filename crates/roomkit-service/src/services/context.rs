//! Service context - dependency container for services
//!
//! Holds the repositories, token verifier and upstream client shared by every request.

use std::sync::Arc;

use roomkit_common::auth::JwtService;
use roomkit_core::traits::{LlmResultRepository, ProfileRepository};

use super::error::{ServiceError, ServiceResult};
use super::upstream::CompletionUpstream;

/// Service context containing all dependencies
#[derive(Clone)]
pub struct ServiceContext {
    // Repositories
    profile_repo: Arc<dyn ProfileRepository>,
    llm_result_repo: Arc<dyn LlmResultRepository>,

    // Services
    jwt_service: Arc<JwtService>,
    upstream: Arc<dyn CompletionUpstream>,
    default_model: String,
}

impl ServiceContext {
    pub fn new(
        profile_repo: Arc<dyn ProfileRepository>,
        llm_result_repo: Arc<dyn LlmResultRepository>,
        jwt_service: Arc<JwtService>,
        upstream: Arc<dyn CompletionUpstream>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            profile_repo,
            llm_result_repo,
            jwt_service,
            upstream,
            default_model: default_model.into(),
        }
    }

    // === Repositories ===

    pub fn profile_repo(&self) -> &dyn ProfileRepository {
        self.profile_repo.as_ref()
    }

    pub fn llm_result_repo(&self) -> &dyn LlmResultRepository {
        self.llm_result_repo.as_ref()
    }

    /// Owned handle for work that outlives the request
    pub fn llm_result_repo_handle(&self) -> Arc<dyn LlmResultRepository> {
        Arc::clone(&self.llm_result_repo)
    }

    // === Services ===

    pub fn jwt_service(&self) -> &JwtService {
        self.jwt_service.as_ref()
    }

    pub fn upstream(&self) -> &dyn CompletionUpstream {
        self.upstream.as_ref()
    }

    /// Owned handle for work that outlives the request
    pub fn upstream_handle(&self) -> Arc<dyn CompletionUpstream> {
        Arc::clone(&self.upstream)
    }

    /// Model used when a completion request leaves it blank
    pub fn default_model(&self) -> &str {
        &self.default_model
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("repositories", &"...")
            .field("jwt_service", &self.jwt_service)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Builder for creating ServiceContext with custom configuration
#[derive(Default)]
pub struct ServiceContextBuilder {
    profile_repo: Option<Arc<dyn ProfileRepository>>,
    llm_result_repo: Option<Arc<dyn LlmResultRepository>>,
    jwt_service: Option<Arc<JwtService>>,
    upstream: Option<Arc<dyn CompletionUpstream>>,
    default_model: Option<String>,
}

impl ServiceContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profile_repo(mut self, repo: Arc<dyn ProfileRepository>) -> Self {
        self.profile_repo = Some(repo);
        self
    }

    pub fn llm_result_repo(mut self, repo: Arc<dyn LlmResultRepository>) -> Self {
        self.llm_result_repo = Some(repo);
        self
    }

    pub fn jwt_service(mut self, service: Arc<JwtService>) -> Self {
        self.jwt_service = Some(service);
        self
    }

    pub fn upstream(mut self, upstream: Arc<dyn CompletionUpstream>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Build the ServiceContext
    ///
    /// # Errors
    /// Returns `ServiceError::Validation` if any required dependency is missing
    pub fn build(self) -> ServiceResult<ServiceContext> {
        Ok(ServiceContext::new(
            self.profile_repo
                .ok_or_else(|| ServiceError::validation("profile_repo is required"))?,
            self.llm_result_repo
                .ok_or_else(|| ServiceError::validation("llm_result_repo is required"))?,
            self.jwt_service
                .ok_or_else(|| ServiceError::validation("jwt_service is required"))?,
            self.upstream
                .ok_or_else(|| ServiceError::validation("upstream is required"))?,
            self.default_model
                .ok_or_else(|| ServiceError::validation("default_model is required"))?,
        ))
    }
}
