//! Request DTOs for API endpoints
//!
//! Completion bodies are `roomkit_core::CompletionRequest` and validate themselves.

use serde::Deserialize;
use validator::Validate;

/// Create-profile request. The id is never taken from the body.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddProfileRequest {
    #[validate(length(min = 1, max = 50, message = "Name must be 1-50 characters"))]
    pub name: String,

    #[validate(length(max = 255, message = "Avatar must be at most 255 characters"))]
    pub avatar: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_profile_validation() {
        let ok = AddProfileRequest {
            name: "alice".to_string(),
            avatar: Some("avatars/alice_Ab12Cd.png".to_string()),
        };
        assert!(ok.validate().is_ok());

        let empty = AddProfileRequest {
            name: String::new(),
            avatar: None,
        };
        assert!(empty.validate().is_err());

        let long_avatar = AddProfileRequest {
            name: "bob".to_string(),
            avatar: Some("x".repeat(256)),
        };
        assert!(long_avatar.validate().is_err());
    }

    #[test]
    fn test_body_id_is_ignored() {
        let request: AddProfileRequest =
            serde_json::from_str(r#"{"id":"someone-else","name":"mallory"}"#).unwrap();
        assert_eq!(request.name, "mallory");
        assert!(request.avatar.is_none());
    }
}
