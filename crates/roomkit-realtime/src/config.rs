//! Realtime connection settings

use std::time::Duration;

use url::Url;

use crate::error::{RealtimeError, RealtimeResult};

/// Phoenix serializer version spoken by the client
pub const PROTOCOL_VSN: &str = "1.0.0";

/// Settings for one realtime socket
#[derive(Clone)]
pub struct RealtimeConfig {
    /// Project base URL, e.g. `https://abc.supabase.co`
    pub url: String,
    /// Publishable (anon) key
    pub api_key: String,
    /// User access token sent with channel joins so row-level security applies
    pub access_token: Option<String>,
    pub heartbeat_interval: Duration,
    /// How long a session waits for its join acknowledgment before warning
    pub join_timeout: Duration,
    pub connect_timeout: Duration,
    /// Deliver this client's own broadcasts back to it
    pub broadcast_self: bool,
    /// Capacity of each room's event channel
    pub event_capacity: usize,
}

impl RealtimeConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// WebSocket endpoint: `<url>/realtime/v1/websocket?apikey=..&vsn=1.0.0`
    pub fn websocket_url(&self) -> RealtimeResult<Url> {
        let mut url = Url::parse(&self.url).map_err(|e| RealtimeError::InvalidUrl(e.to_string()))?;

        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => return Err(RealtimeError::InvalidUrl(format!("unsupported scheme {other}"))),
        };
        url.set_scheme(scheme)
            .map_err(|()| RealtimeError::InvalidUrl(self.url.clone()))?;

        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base}/realtime/v1/websocket"));
        url.query_pairs_mut()
            .clear()
            .append_pair("apikey", &self.api_key)
            .append_pair("vsn", PROTOCOL_VSN);

        Ok(url)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            access_token: None,
            heartbeat_interval: Duration::from_secs(25),
            join_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(15),
            broadcast_self: false,
            event_capacity: 256,
        }
    }
}

impl std::fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("join_timeout", &self.join_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url() {
        let config = RealtimeConfig::new("https://abc.supabase.co", "anon-key");
        let url = config.websocket_url().unwrap();

        assert_eq!(
            url.as_str(),
            "wss://abc.supabase.co/realtime/v1/websocket?apikey=anon-key&vsn=1.0.0"
        );
    }

    #[test]
    fn test_websocket_url_local() {
        let config = RealtimeConfig::new("http://localhost:54321/", "k");
        let url = config.websocket_url().unwrap();

        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.path(), "/realtime/v1/websocket");
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            RealtimeConfig::new("not a url", "k").websocket_url(),
            Err(RealtimeError::InvalidUrl(_))
        ));
        assert!(matches!(
            RealtimeConfig::new("ftp://host", "k").websocket_url(),
            Err(RealtimeError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let config = RealtimeConfig::new("https://abc.supabase.co", "anon-key").with_access_token("jwt");
        let debug = format!("{config:?}");
        assert!(!debug.contains("anon-key"));
        assert!(!debug.contains("jwt"));
    }
}
