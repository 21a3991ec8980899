//! Backend API client
//!
//! Every call goes through [`ApiClient::send`], which attaches the bearer
//! token, refuses to send without a session, unwraps the `{code, msg, data}`
//! envelope, and clears the session on a 401.

use reqwest::{Method, RequestBuilder, Response};
use roomkit_core::UserProfile;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::Shared;
use crate::error::{ClientError, ClientResult};

/// Response envelope used by every backend route
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    msg: String,
    #[serde(default)]
    error: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Serialize)]
struct AddUserInfo<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar: Option<&'a str>,
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    shared: Shared,
}

impl ApiClient {
    pub(crate) fn new(shared: Shared) -> Self {
        Self { shared }
    }

    /// Profile of the signed-in user; `None` until one is created
    pub async fn user_info(&self) -> ClientResult<Option<UserProfile>> {
        let request = self.authorized(Method::GET, "/api/user/info")?;
        self.send(request).await
    }

    /// Create the signed-in user's profile. Create-only: a second call fails
    /// with a 409, as does a name held by someone else.
    pub async fn add_user_info(&self, name: &str, avatar: Option<&str>) -> ClientResult<UserProfile> {
        let request = self
            .authorized(Method::POST, "/api/user/add_info")?
            .json(&AddUserInfo { name, avatar });
        self.send::<UserProfile>(request)
            .await?
            .ok_or_else(|| ClientError::Decode("profile missing from response".to_string()))
    }

    /// POST to `/functions/v1/<name>`; the raw response is handed back for
    /// the caller to read as JSON or as a stream
    pub(crate) async fn invoke_function<B: Serialize + ?Sized>(
        &self,
        name: &str,
        body: &B,
    ) -> ClientResult<Response> {
        let request = self
            .shared
            .http
            .post(self.shared.config.function_url(name))
            .bearer_auth(self.token()?)
            .json(body);
        self.check(self.shared.with_api_key(request).send().await?).await
    }

    /// Request with the bearer token attached, or `NotAuthenticated` before
    /// anything touches the network
    fn authorized(&self, method: Method, path: &str) -> ClientResult<RequestBuilder> {
        let token = self.token()?;
        Ok(self
            .shared
            .http
            .request(method, self.shared.config.api_url(path))
            .bearer_auth(token))
    }

    /// Current access token, or `NotAuthenticated`
    pub(crate) fn token(&self) -> ClientResult<String> {
        self.shared
            .session
            .access_token()
            .ok_or(ClientError::NotAuthenticated)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<Option<T>> {
        let response = self.check(request.send().await?).await?;
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        debug!(msg = %envelope.msg, "API call succeeded");
        Ok(envelope.data)
    }

    /// Turn a non-success status into `ClientError::Api`
    async fn check(&self, response: Response) -> ClientResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let envelope: Option<Envelope<serde_json::Value>> = response.json().await.ok();
        let (code, message) = match envelope {
            Some(e) => (e.error, e.msg),
            None => (None, status.to_string()),
        };

        if status == reqwest::StatusCode::UNAUTHORIZED {
            warn!(code = ?code, "Session rejected by backend, signing out locally");
            self.shared.session.clear().await?;
        }

        Err(ClientError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }
}
