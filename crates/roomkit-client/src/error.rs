//! Client error type and user-facing messages

use roomkit_realtime::RealtimeError;
use thiserror::Error;

/// Errors surfaced by the client SDK
#[derive(Debug, Error)]
pub enum ClientError {
    /// No session; the request was never sent
    #[error("Not signed in")]
    NotAuthenticated,

    /// Rejected by the auth service
    #[error("Auth error ({status}): {message}")]
    Auth { status: u16, message: String },

    /// Backend answered with an error envelope
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Storage error ({status}): {message}")]
    Storage { status: u16, message: String },

    /// Table REST interface rejected the request
    #[error("Table error ({status}): {message}")]
    Table {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Refused locally; nothing was sent
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Session persistence error: {0}")]
    Persistence(String),

    #[error("Realtime error: {0}")]
    Realtime(#[from] RealtimeError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// True for a 401 from the auth service or the backend
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::Auth { status: 401, .. }
                | Self::Api { status: 401, .. }
                | Self::Table { status: 401, .. }
        )
    }

    /// Short message suitable for showing to the person using the app
    pub fn user_message(&self) -> String {
        match self {
            Self::NotAuthenticated => "Please sign in to continue".to_string(),
            Self::Http(e) if e.is_timeout() => {
                "The request timed out, please try again".to_string()
            }
            Self::Http(e) if e.is_connect() || e.is_request() => NETWORK_MESSAGE.to_string(),
            Self::Auth { status: 429, .. }
            | Self::Api { status: 429, .. }
            | Self::Storage { status: 429, .. }
            | Self::Table { status: 429, .. } => RATE_LIMIT_MESSAGE.to_string(),
            other => friendly_message(&other.to_string()),
        }
    }
}

const NETWORK_MESSAGE: &str = "Network error, please check your connection";
const RATE_LIMIT_MESSAGE: &str = "Too many attempts, please try again later";
const FALLBACK_MESSAGE: &str = "Something went wrong, please try again";

/// Substring heuristics over a raw error text, first match wins
const KNOWN_MESSAGES: &[(&[&str], &str)] = &[
    (&["invalid login credentials"], "Incorrect email or password"),
    (
        &["email not confirmed"],
        "Please confirm your email address before signing in",
    ),
    (
        &["user already registered", "already been registered"],
        "This email is already registered",
    ),
    (
        &["password should be at least"],
        "Password must be at least 6 characters",
    ),
    (
        &["unable to validate email", "invalid email"],
        "Please enter a valid email address",
    ),
    (
        &["jwt expired", "token has expired", "token expired"],
        "Your session has expired, please sign in again",
    ),
    (
        &["rate limit", "too many requests"],
        RATE_LIMIT_MESSAGE,
    ),
    (
        &["network", "failed to fetch", "connection refused", "connection reset"],
        NETWORK_MESSAGE,
    ),
    (&["timed out", "timeout"], "The request timed out, please try again"),
    (&["name already taken"], "That name is already taken"),
];

/// Map any error text to a known message, or a generic fallback
pub fn friendly_message(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    KNOWN_MESSAGES
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lowered.contains(n)))
        .map_or(FALLBACK_MESSAGE, |(_, message)| *message)
        .to_string()
}

pub type ClientResult<T> = Result<T, ClientError>;
