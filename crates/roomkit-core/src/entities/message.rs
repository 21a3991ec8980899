//! Chat message entity - ephemeral room messages relayed by broadcast

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Chat message sent over a room broadcast.
///
/// Messages are never persisted; they exist for the lifetime of a room session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Maximum body length in characters
    pub const MAX_BODY_LENGTH: usize = 2000;

    /// Create a new message with a fresh id
    pub fn new(sender_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender_id: sender_id.into(),
            body: body.into(),
            sent_at: Utc::now(),
        }
    }

    /// Validate message body
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.body.trim().is_empty() {
            return Err(DomainError::EmptyContent);
        }
        if self.body.chars().count() > Self::MAX_BODY_LENGTH {
            return Err(DomainError::ContentTooLong {
                max: Self::MAX_BODY_LENGTH,
            });
        }
        Ok(())
    }
}
