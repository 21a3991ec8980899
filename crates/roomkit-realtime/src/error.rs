//! Realtime client errors

use thiserror::Error;

/// Errors raised by the socket, room sessions and insert subscriptions
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("Invalid realtime URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Socket is closed")]
    SocketClosed,

    #[error("Session is not connected")]
    NotConnected,

    #[error("Join refused: {0}")]
    JoinRefused(String),

    #[error("Topic already registered: {0}")]
    TopicInUse(String),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl RealtimeError {
    /// Get error code for logs and client surfaces
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "INVALID_URL",
            Self::Connect(_) => "CONNECT_FAILED",
            Self::SocketClosed => "SOCKET_CLOSED",
            Self::NotConnected => "NOT_CONNECTED",
            Self::JoinRefused(_) => "JOIN_REFUSED",
            Self::TopicInUse(_) => "TOPIC_IN_USE",
            Self::Encode(_) => "ENCODE_FAILED",
        }
    }
}

pub type RealtimeResult<T> = Result<T, RealtimeError>;
