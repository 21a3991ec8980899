//! Client session store
//!
//! Holds the signed-in session in memory, persists it through a
//! [`SessionStorage`] backend, and publishes [`AuthEvent`]s to watchers.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};

/// Sessions this close to expiry count as expired
const EXPIRY_MARGIN_SECS: i64 = 10;

/// Tokens for the signed-in user
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user_id: String,
    /// Unix seconds
    pub expires_at: Option<i64>,
}

impl ClientSession {
    pub fn new(access_token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            user_id: user_id.into(),
            expires_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| at - EXPIRY_MARGIN_SECS <= Utc::now().timestamp())
    }

    /// Holds a usable access token
    pub fn is_authenticated(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("user_id", &self.user_id)
            .field("expires_at", &self.expires_at)
            .field("access_token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Auth state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// Nothing has happened yet
    InitialSession,
    SignedIn { user_id: String },
    SignedOut,
    TokenRefreshed { user_id: String },
}

/// Durable slot for one session
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn load(&self) -> ClientResult<Option<ClientSession>>;

    async fn save(&self, session: &ClientSession) -> ClientResult<()>;

    async fn clear(&self) -> ClientResult<()>;
}

/// Keeps the session for the life of the process only
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slot: Mutex<Option<ClientSession>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStorage for MemoryStorage {
    async fn load(&self) -> ClientResult<Option<ClientSession>> {
        Ok(self.slot.lock().clone())
    }

    async fn save(&self, session: &ClientSession) -> ClientResult<()> {
        *self.slot.lock() = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> ClientResult<()> {
        self.slot.lock().take();
        Ok(())
    }
}

/// JSON file on disk
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl SessionStorage for FileStorage {
    async fn load(&self) -> ClientResult<Option<ClientSession>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ClientError::Persistence(e.to_string())),
        };

        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                // Corrupt file counts as signed out
                warn!(path = %self.path.display(), error = %e, "Discarding unreadable session file");
                Ok(None)
            }
        }
    }

    async fn save(&self, session: &ClientSession) -> ClientResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ClientError::Persistence(e.to_string()))?;
        }
        let json = serde_json::to_vec_pretty(session)
            .map_err(|e| ClientError::Persistence(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| ClientError::Persistence(e.to_string()))
    }

    async fn clear(&self) -> ClientResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Persistence(e.to_string())),
        }
    }
}

/// Current session plus its persistence and change feed
pub struct SessionStore {
    current: RwLock<Option<ClientSession>>,
    storage: Arc<dyn SessionStorage>,
    events: watch::Sender<AuthEvent>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        let (events, _) = watch::channel(AuthEvent::InitialSession);
        Self {
            current: RwLock::new(None),
            storage,
            events,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn current(&self) -> Option<ClientSession> {
        self.current.read().clone()
    }

    /// Token to send, if the session is still usable
    pub fn access_token(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .filter(|s| s.is_authenticated())
            .map(|s| s.access_token.clone())
    }

    pub fn user_id(&self) -> Option<String> {
        self.current.read().as_ref().map(|s| s.user_id.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.current
            .read()
            .as_ref()
            .is_some_and(ClientSession::is_authenticated)
    }

    /// Receive auth events; the receiver starts at the latest one
    pub fn subscribe(&self) -> watch::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Install a freshly signed-in session
    pub async fn signed_in(&self, session: ClientSession) {
        let user_id = session.user_id.clone();
        self.install(session).await;
        info!(user_id = %user_id, "Signed in");
        self.events.send_replace(AuthEvent::SignedIn { user_id });
    }

    /// Replace the tokens after a refresh
    pub async fn refreshed(&self, session: ClientSession) {
        let user_id = session.user_id.clone();
        self.install(session).await;
        debug!(user_id = %user_id, "Session refreshed");
        self.events.send_replace(AuthEvent::TokenRefreshed { user_id });
    }

    /// Drop the session. Memory is cleared before storage is touched, so even
    /// when persistence fails no further request carries the old token.
    pub async fn clear(&self) -> ClientResult<()> {
        let previous = self.current.write().take();
        let result = self.storage.clear().await;

        if let Some(session) = previous {
            info!(user_id = %session.user_id, "Signed out");
            self.events.send_replace(AuthEvent::SignedOut);
        }
        result
    }

    /// Load the persisted session at startup. An expired one is discarded.
    pub async fn restore(&self) -> ClientResult<Option<ClientSession>> {
        let Some(session) = self.storage.load().await? else {
            debug!("No persisted session");
            return Ok(None);
        };

        if session.is_expired() {
            info!(user_id = %session.user_id, "Persisted session expired, discarding");
            self.storage.clear().await?;
            return Ok(None);
        }

        *self.current.write() = Some(session.clone());
        self.events.send_replace(AuthEvent::SignedIn {
            user_id: session.user_id.clone(),
        });
        Ok(Some(session))
    }

    async fn install(&self, session: ClientSession) {
        *self.current.write() = Some(session.clone());
        if let Err(e) = self.storage.save(&session).await {
            // Still signed in for this process
            warn!(error = %e, "Failed to persist session");
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("current", &*self.current.read())
            .finish_non_exhaustive()
    }
}
