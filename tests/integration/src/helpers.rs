//! Test helpers for integration tests
//!
//! Spawns the API on an ephemeral port, signs test tokens, and wraps the
//! common request shapes.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use reqwest::{Client, Response, StatusCode};
use roomkit_api::{create_app, create_app_state};
use roomkit_client::{ClientConfig, ClientSession, RoomkitClient, SessionStore};
use roomkit_common::{AppConfig, JwtService};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Running API instance
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    jwt: JwtService,
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a new test server
    pub async fn start() -> Result<Self> {
        let config = test_config()?;
        Self::start_with_config(config).await
    }

    /// Start a test server with custom config
    pub async fn start_with_config(config: AppConfig) -> Result<Self> {
        let jwt = JwtService::new(&config.supabase.jwt_secret);

        let state = create_app_state(config).await?;
        let app = create_app(state)?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        // Wait for server to be ready
        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            addr,
            client,
            jwt,
            _handle: handle,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Token for `user_id` signed with the server's secret
    pub fn token_for(&self, user_id: &str) -> Result<String> {
        Ok(self.jwt.issue_token(user_id, json!({}), 3600)?)
    }

    pub fn expired_token_for(&self, user_id: &str) -> Result<String> {
        Ok(self.jwt.issue_token(user_id, json!({}), -3600)?)
    }

    /// SDK client already signed in as `user_id`
    pub async fn sdk_for(&self, user_id: &str) -> Result<RoomkitClient> {
        let base = self.base_url();
        let sdk = RoomkitClient::new(
            ClientConfig::new(&base, "anon-key", &base),
            SessionStore::in_memory(),
        )?;
        sdk.session()
            .signed_in(ClientSession::new(self.token_for(user_id)?, user_id))
            .await;
        Ok(sdk)
    }

    pub async fn get(&self, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.get(&url).send().await?)
    }

    pub async fn get_auth(&self, path: &str, token: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.get(&url).bearer_auth(token).send().await?)
    }

    pub async fn post_auth<T: Serialize>(
        &self,
        path: &str,
        token: &str,
        body: &T,
    ) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?)
    }
}

/// Configuration from the environment, with migrations forced on
pub fn test_config() -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let mut config = AppConfig::from_env().map_err(|e| anyhow::anyhow!("Config error: {e}"))?;
    config.database.run_migrations = true;
    Ok(config)
}

/// True when the variables the server needs are all set
pub async fn check_test_env() -> bool {
    dotenvy::dotenv().ok();

    for var in ["DATABASE_URL", "SUPABASE_JWT_SECRET", "LLM_API_KEY"] {
        if std::env::var(var).is_err() {
            eprintln!("Skipping test: {var} not set");
            return false;
        }
    }
    true
}

/// Assert response status and parse JSON body
pub async fn assert_json<T: DeserializeOwned>(
    response: Response,
    expected_status: StatusCode,
) -> Result<T> {
    let status = response.status();
    if status != expected_status {
        let body = response.text().await?;
        anyhow::bail!("Expected status {expected_status}, got {status}. Body: {body}");
    }
    Ok(response.json().await?)
}
