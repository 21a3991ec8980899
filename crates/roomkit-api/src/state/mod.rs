//! Shared handler state: the service context plus the loaded configuration

use std::sync::Arc;

use roomkit_common::{AppConfig, JwtService};
use roomkit_service::{CompletionService, ProfileService, ServiceContext};

#[derive(Clone)]
pub struct AppState {
    ctx: Arc<ServiceContext>,
    config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(ctx: ServiceContext, config: AppConfig) -> Self {
        Self {
            ctx: Arc::new(ctx),
            config: Arc::new(config),
        }
    }

    pub fn service_context(&self) -> &ServiceContext {
        &self.ctx
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Verifies bearer tokens for the auth extractor
    pub fn jwt_service(&self) -> &JwtService {
        self.ctx.jwt_service()
    }

    pub fn profiles(&self) -> ProfileService<'_> {
        ProfileService::new(&self.ctx)
    }

    pub fn completions(&self) -> CompletionService<'_> {
        CompletionService::new(&self.ctx)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("env", &self.config.app.env)
            .field("default_model", &self.ctx.default_model())
            .finish_non_exhaustive()
    }
}
