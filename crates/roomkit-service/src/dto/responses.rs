//! Response DTOs for API endpoints
//!
//! Successful bodies use the `{code, msg, data}` envelope the web client unwraps.

use chrono::{DateTime, Utc};
use roomkit_core::entities::UserProfile;
use serde::Serialize;

/// Response envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub msg: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 200,
            msg: String::new(),
            data,
        }
    }

    pub fn with_code(code: u16, data: T) -> Self {
        Self {
            code,
            msg: String::new(),
            data,
        }
    }
}

/// Profile as returned to its owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileResponse {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
}

impl From<&UserProfile> for ProfileResponse {
    fn from(profile: &UserProfile) -> Self {
        Self {
            id: profile.id.clone(),
            name: profile.name.clone(),
            avatar: profile.avatar.clone(),
        }
    }
}

impl From<UserProfile> for ProfileResponse {
    fn from(profile: UserProfile) -> Self {
        Self {
            id: profile.id,
            name: profile.name,
            avatar: profile.avatar,
        }
    }
}

/// Returned when a buffered completion has been queued
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAcceptedResponse {
    pub task_id: String,
}

/// Liveness check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
        }
    }
}
