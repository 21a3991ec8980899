//! Email/password auth against the backing service's auth API

use chrono::Utc;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::client::Shared;
use crate::error::{ClientError, ClientResult};
use crate::session::ClientSession;

/// Result of a sign-up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// Account created; a confirmation email is on its way
    PendingConfirmation { user_id: String, email: String },
    /// Confirmation is off and the user is signed in already
    SignedIn(ClientSession),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> ClientSession {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| Utc::now().timestamp() + secs));
        ClientSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            user_id: self.user.id,
            expires_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AuthClient {
    shared: Shared,
}

impl AuthClient {
    pub(crate) fn new(shared: Shared) -> Self {
        Self { shared }
    }

    /// Create an account. `redirect` is where the confirmation link lands.
    #[instrument(skip(self, password))]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect: Option<&str>,
    ) -> ClientResult<SignUpOutcome> {
        let mut request = self
            .shared
            .http
            .post(self.shared.config.auth_url("signup"))
            .bearer_auth(&self.shared.config.anon_key)
            .json(&json!({ "email": email, "password": password }));
        if let Some(redirect) = redirect {
            request = request.query(&[("redirect_to", redirect)]);
        }

        let body: Value = expect_json(self.shared.with_api_key(request).send().await?).await?;

        if body.get("access_token").is_some() {
            let session = decode::<TokenResponse>(body)?.into_session();
            self.shared.session.signed_in(session.clone()).await;
            return Ok(SignUpOutcome::SignedIn(session));
        }

        // Without auto-confirm the user is returned bare, sometimes nested
        let user = body.get("user").cloned().unwrap_or(body);
        let user: AuthUser = decode(user)?;
        debug!(user_id = %user.id, "Sign-up pending confirmation");
        Ok(SignUpOutcome::PendingConfirmation {
            user_id: user.id,
            email: user.email.unwrap_or_else(|| email.to_string()),
        })
    }

    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> ClientResult<ClientSession> {
        let request = self
            .shared
            .http
            .post(self.shared.config.auth_url("token"))
            .query(&[("grant_type", "password")])
            .bearer_auth(&self.shared.config.anon_key)
            .json(&json!({ "email": email, "password": password }));

        let body = expect_json(self.shared.with_api_key(request).send().await?).await?;
        let session = decode::<TokenResponse>(body)?.into_session();
        self.shared.session.signed_in(session.clone()).await;
        Ok(session)
    }

    /// Sign out. The local session is gone afterwards whatever the server says.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> ClientResult<()> {
        if let Some(token) = self.shared.session.current().map(|s| s.access_token) {
            let request = self
                .shared
                .http
                .post(self.shared.config.auth_url("logout"))
                .bearer_auth(token);
            match self.shared.with_api_key(request).send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => warn!(status = %response.status(), "Remote sign-out rejected"),
                Err(e) => warn!(error = %e, "Remote sign-out failed"),
            }
        }
        self.shared.session.clear().await
    }

    /// Load the persisted session, dropping it if expired
    pub async fn restore(&self) -> ClientResult<Option<ClientSession>> {
        self.shared.session.restore().await
    }

    /// Swap the refresh token for new tokens
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> ClientResult<ClientSession> {
        let refresh_token = self
            .shared
            .session
            .current()
            .and_then(|s| s.refresh_token)
            .ok_or(ClientError::NotAuthenticated)?;

        let request = self
            .shared
            .http
            .post(self.shared.config.auth_url("token"))
            .query(&[("grant_type", "refresh_token")])
            .bearer_auth(&self.shared.config.anon_key)
            .json(&json!({ "refresh_token": refresh_token }));

        let body = match expect_json(self.shared.with_api_key(request).send().await?).await {
            Ok(body) => body,
            Err(e) => {
                if e.is_unauthorized() || matches!(e, ClientError::Auth { status: 400, .. }) {
                    // Refresh token revoked or reused
                    self.shared.session.clear().await?;
                }
                return Err(e);
            }
        };
        let session = decode::<TokenResponse>(body)?.into_session();
        self.shared.session.refreshed(session.clone()).await;
        Ok(session)
    }
}

async fn expect_json(response: Response) -> ClientResult<Value> {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    if status.is_success() {
        return Ok(body);
    }
    Err(ClientError::Auth {
        status: status.as_u16(),
        message: error_message(&body, status),
    })
}

/// The auth API reports errors as `msg`, `error_description`, `message` or `error`
fn error_message(body: &Value, status: StatusCode) -> String {
    ["msg", "error_description", "message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map_or_else(|| status.to_string(), str::to_string)
}

fn decode<T: serde::de::DeserializeOwned>(body: Value) -> ClientResult<T> {
    serde_json::from_value(body).map_err(|e| ClientError::Decode(e.to_string()))
}
