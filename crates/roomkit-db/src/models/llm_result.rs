//! Completion result database model

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;

/// Database model for the llm_result table
#[derive(Debug, Clone, FromRow)]
pub struct LlmResultModel {
    pub id: String,
    pub llm_response: Json<Value>,
    pub created_at: DateTime<Utc>,
}
