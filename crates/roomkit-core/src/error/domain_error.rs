//! Domain errors - error types for the domain layer

use thiserror::Error;

/// Domain layer errors
#[derive(Debug, Error)]
pub enum DomainError {
    // =========================================================================
    // Not Found Errors
    // =========================================================================
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Completion result not found: {0}")]
    ResultNotFound(String),

    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid profile name: {0}")]
    InvalidProfileName(String),

    #[error("Content too long: max {max} characters")]
    ContentTooLong { max: usize },

    #[error("Content must not be empty")]
    EmptyContent,

    // =========================================================================
    // Conflict Errors
    // =========================================================================
    #[error("Profile already exists")]
    ProfileAlreadyExists,

    #[error("Profile name already taken")]
    ProfileNameTaken,

    #[error("Completion result already stored")]
    ResultAlreadyExists,

    // =========================================================================
    // Infrastructure Errors (wrapped)
    // =========================================================================
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl DomainError {
    /// Get an error code string for API responses
    pub fn code(&self) -> &'static str {
        match self {
            // Not Found
            Self::ProfileNotFound(_) => "UNKNOWN_PROFILE",
            Self::ResultNotFound(_) => "UNKNOWN_RESULT",

            // Validation
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::InvalidProfileName(_) => "INVALID_PROFILE_NAME",
            Self::ContentTooLong { .. } => "CONTENT_TOO_LONG",
            Self::EmptyContent => "EMPTY_CONTENT",

            // Conflict
            Self::ProfileAlreadyExists => "PROFILE_ALREADY_EXISTS",
            Self::ProfileNameTaken => "PROFILE_NAME_TAKEN",
            Self::ResultAlreadyExists => "RESULT_ALREADY_EXISTS",

            // Infrastructure
            Self::DatabaseError(_) => "DATABASE_ERROR",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ProfileNotFound(_) | Self::ResultNotFound(_))
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ValidationError(_)
                | Self::InvalidProfileName(_)
                | Self::ContentTooLong { .. }
                | Self::EmptyContent
        )
    }

    /// Check if this is a conflict error
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::ProfileAlreadyExists | Self::ProfileNameTaken | Self::ResultAlreadyExists
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = DomainError::ProfileNotFound("u-1".to_string());
        assert_eq!(err.code(), "UNKNOWN_PROFILE");

        let err = DomainError::ProfileNameTaken;
        assert_eq!(err.code(), "PROFILE_NAME_TAKEN");
    }

    #[test]
    fn test_classification() {
        assert!(DomainError::ProfileNotFound("u-1".to_string()).is_not_found());
        assert!(!DomainError::ProfileAlreadyExists.is_not_found());
        assert!(DomainError::EmptyContent.is_validation());
        assert!(DomainError::ResultAlreadyExists.is_conflict());
        assert!(!DomainError::DatabaseError("x".to_string()).is_conflict());
    }

    #[test]
    fn test_error_display() {
        let err = DomainError::ProfileNotFound("u-123".to_string());
        assert_eq!(err.to_string(), "Profile not found: u-123");

        let err = DomainError::ContentTooLong { max: 2000 };
        assert_eq!(err.to_string(), "Content too long: max 2000 characters");
    }
}
