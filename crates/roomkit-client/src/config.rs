//! Client configuration

use std::env;
use std::time::Duration;

use roomkit_realtime::RealtimeConfig;
use url::Url;

use crate::error::ClientError;

/// How long a buffered completion may take before the waiter gives up
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Per-request timeout for plain HTTP calls
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Endpoints and keys the client talks to
#[derive(Clone)]
pub struct ClientConfig {
    /// Backing service project URL (auth, storage, realtime)
    pub supabase_url: String,
    /// Public anon key sent as `apikey`
    pub anon_key: String,
    /// Base URL of the roomkit backend (`/api/...`, `/functions/v1/...`)
    pub api_base_url: String,
    pub completion_timeout: Duration,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(
        supabase_url: impl Into<String>,
        anon_key: impl Into<String>,
        api_base_url: impl Into<String>,
    ) -> Self {
        Self {
            supabase_url: trim_base(supabase_url.into()),
            anon_key: anon_key.into(),
            api_base_url: trim_base(api_base_url.into()),
            completion_timeout: DEFAULT_COMPLETION_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    /// Load from `SUPABASE_URL`, `SUPABASE_ANON_KEY`, `ROOMKIT_API_URL` and
    /// the optional `COMPLETION_TIMEOUT_MS`. A `.env` file is read if present.
    pub fn from_env() -> Result<Self, ClientError> {
        let _ = dotenvy::dotenv();

        let mut config = Self::new(
            required("SUPABASE_URL")?,
            required("SUPABASE_ANON_KEY")?,
            required("ROOMKIT_API_URL")?,
        );
        if let Some(raw) = optional("COMPLETION_TIMEOUT_MS") {
            let ms: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ClientError::Config(format!("invalid COMPLETION_TIMEOUT_MS: {raw}")))?;
            config.completion_timeout = Duration::from_millis(ms);
        }
        Ok(config)
    }

    /// `<supabase_url>/auth/v1/<path>`
    pub fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.supabase_url, path.trim_start_matches('/'))
    }

    /// The project URL parsed, for building per-segment encoded endpoints
    pub fn project_url(&self) -> Result<Url, ClientError> {
        let url = Url::parse(&self.supabase_url)
            .map_err(|e| ClientError::Config(format!("invalid SUPABASE_URL: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(ClientError::Config(format!(
                "SUPABASE_URL cannot carry a path: {}",
                self.supabase_url
            )));
        }
        Ok(url)
    }

    /// Backend route, e.g. `/api/user/info`
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base_url, path.trim_start_matches('/'))
    }

    /// Edge function route served by the backend: `/functions/v1/<name>`
    pub fn function_url(&self, name: &str) -> String {
        self.api_url(&format!("functions/v1/{name}"))
    }

    /// Realtime settings for the same project, authorized as `access_token`
    pub fn realtime_config(&self, access_token: Option<&str>) -> RealtimeConfig {
        let config = RealtimeConfig::new(&self.supabase_url, &self.anon_key);
        match access_token {
            Some(token) => config.with_access_token(token),
            None => config,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("supabase_url", &self.supabase_url)
            .field("anon_key", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .field("completion_timeout", &self.completion_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn required(name: &str) -> Result<String, ClientError> {
    optional(name).ok_or_else(|| ClientError::Config(format!("missing {name}")))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
