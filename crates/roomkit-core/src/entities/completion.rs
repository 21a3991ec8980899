//! Completion entities - chat messages forwarded to the text generation API
//! and the stored results of buffered completions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DomainError;

/// Role of a completion message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One role-tagged message in a completion request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: ChatRole,
    pub content: String,
}

impl CompletionMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Request body accepted by both completion functions.
///
/// `task_id` is only meaningful for the buffered function, where it keys the stored result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub messages: Vec<CompletionMessage>,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<CompletionMessage>, model: impl Into<String>) -> Self {
        Self {
            messages,
            model: model.into(),
            task_id: None,
        }
    }

    #[must_use]
    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Reject requests the upstream API would refuse anyway
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.messages.is_empty() {
            return Err(DomainError::ValidationError(
                "messages must not be empty".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(DomainError::ValidationError("model is required".to_string()));
        }
        if let Some(task_id) = &self.task_id {
            if task_id.is_empty() || task_id.len() > 36 {
                return Err(DomainError::ValidationError(
                    "taskId must be 1-36 characters".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Stored result of a buffered completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResult {
    pub id: String,
    pub llm_response: Value,
    pub created_at: DateTime<Utc>,
}

impl LlmResult {
    pub fn new(id: impl Into<String>, llm_response: Value) -> Self {
        Self {
            id: id.into(),
            llm_response,
            created_at: Utc::now(),
        }
    }

    /// Generated text, if the response has the usual shape
    pub fn content(&self) -> Option<String> {
        extract_completion_text(&self.llm_response)
    }
}

/// Pull the assistant text out of an OpenAI-style completion response.
///
/// Falls back to a top-level `content` string for upstreams that return a flat body.
pub fn extract_completion_text(response: &Value) -> Option<String> {
    response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .or_else(|| response.get("content").and_then(Value::as_str))
        .map(str::to_string)
}
