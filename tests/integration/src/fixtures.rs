//! Test fixtures and data generators

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Auth user id as the auth service would issue it
pub fn unique_user_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Profile names are unique across the table, so every test gets its own
pub fn unique_name(prefix: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &suffix[..12])
}

#[derive(Debug, Serialize)]
pub struct AddInfoRequest {
    pub name: String,
    pub avatar: Option<String>,
}

impl AddInfoRequest {
    pub fn unique() -> Self {
        Self {
            name: unique_name("user"),
            avatar: None,
        }
    }
}

/// `{code, msg, data}` success envelope
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub code: u16,
    pub msg: String,
    pub data: Option<T>,
}

/// `{code, msg, error, data}` error envelope
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub code: u16,
    pub msg: String,
    pub error: String,
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct ProfileResponse {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
}
