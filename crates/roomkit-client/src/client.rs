//! Client context - one HTTP connection pool, config and session store shared
//! by the auth, API, storage, table and completion clients

use std::sync::Arc;

use roomkit_realtime::RealtimeClient;
use tracing::info;
use url::Url;

use crate::api::ApiClient;
use crate::auth::AuthClient;
use crate::completion::CompletionClient;
use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::session::SessionStore;
use crate::storage::StorageClient;
use crate::table::TableClient;

#[derive(Clone, Debug)]
pub(crate) struct Shared {
    pub http: reqwest::Client,
    pub config: Arc<ClientConfig>,
    pub session: Arc<SessionStore>,
    /// Parsed `supabase_url`
    pub project: Url,
}

impl Shared {
    pub fn new(http: reqwest::Client, config: ClientConfig, session: SessionStore) -> ClientResult<Self> {
        Ok(Self {
            http,
            project: config.project_url()?,
            config: Arc::new(config),
            session: Arc::new(session),
        })
    }

    /// Project URL with `segments` appended, each one percent-encoded
    pub fn endpoint<I>(&self, segments: I) -> Url
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.project.clone();
        // `project_url` already rejected URLs that cannot carry a path
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `apikey` header every backing-service request carries
    pub fn with_api_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header("apikey", &self.config.anon_key)
    }

    /// User token when signed in, anon key otherwise
    pub fn bearer(&self) -> String {
        self.session
            .access_token()
            .unwrap_or_else(|| self.config.anon_key.clone())
    }
}

/// Entry point for the SDK. Cheap to clone.
#[derive(Clone, Debug)]
pub struct RoomkitClient {
    shared: Shared,
    storage: StorageClient,
}

impl RoomkitClient {
    pub fn new(config: ClientConfig, session: SessionStore) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let shared = Shared::new(http, config, session)?;
        info!(api = %shared.config.api_base_url, "Client ready");

        Ok(Self {
            storage: StorageClient::new(shared.clone()),
            shared,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.shared.session
    }

    pub fn auth(&self) -> AuthClient {
        AuthClient::new(self.shared.clone())
    }

    pub fn api(&self) -> ApiClient {
        ApiClient::new(self.shared.clone())
    }

    /// Shares one name generator across calls so names never repeat
    pub fn storage(&self) -> StorageClient {
        self.storage.clone()
    }

    /// Table rows as the current user (anon when signed out)
    pub fn tables(&self) -> TableClient {
        TableClient::new(self.shared.clone())
    }

    /// Connect to realtime as the current user
    pub async fn realtime(&self) -> ClientResult<RealtimeClient> {
        let token = self.shared.session.access_token();
        let config = self.shared.config.realtime_config(token.as_deref());
        Ok(RealtimeClient::connect(config).await?)
    }

    /// Completion waiter over an existing realtime connection
    pub fn completions(&self, realtime: RealtimeClient) -> CompletionClient {
        CompletionClient::new(self.api(), realtime, self.shared.config.completion_timeout)
    }
}
