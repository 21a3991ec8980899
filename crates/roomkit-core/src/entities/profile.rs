//! User profile entity - application-side data attached to an auth user

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Profile row keyed by the auth user id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
}

impl UserProfile {
    pub const ID_MAX_LENGTH: usize = 36;
    pub const NAME_MAX_LENGTH: usize = 50;
    pub const AVATAR_MAX_LENGTH: usize = 255;

    /// Create a new profile
    pub fn new(id: impl Into<String>, name: impl Into<String>, avatar: Option<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            avatar,
        }
    }

    /// Check column constraints before hitting the database
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.id.is_empty() || self.id.len() > Self::ID_MAX_LENGTH {
            return Err(DomainError::ValidationError(format!(
                "id must be 1-{} characters",
                Self::ID_MAX_LENGTH
            )));
        }

        let name_len = self.name.trim().chars().count();
        if name_len == 0 || self.name.chars().count() > Self::NAME_MAX_LENGTH {
            return Err(DomainError::InvalidProfileName(format!(
                "name must be 1-{} characters",
                Self::NAME_MAX_LENGTH
            )));
        }

        if let Some(avatar) = &self.avatar {
            if avatar.chars().count() > Self::AVATAR_MAX_LENGTH {
                return Err(DomainError::ContentTooLong {
                    max: Self::AVATAR_MAX_LENGTH,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_profile() {
        let profile = UserProfile::new("7d4c1c4e-2c8a-4f55-a0a3-1b2c3d4e5f60", "ada", None);
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_name_length() {
        let profile = UserProfile::new("id", "x".repeat(51), None);
        assert!(matches!(
            profile.validate(),
            Err(DomainError::InvalidProfileName(_))
        ));

        let profile = UserProfile::new("id", "  ", None);
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_avatar_length() {
        let profile = UserProfile::new("id", "ada", Some("a".repeat(256)));
        assert!(matches!(
            profile.validate(),
            Err(DomainError::ContentTooLong { max: 255 })
        ));
    }

    #[test]
    fn test_id_length() {
        let profile = UserProfile::new("x".repeat(37), "ada", None);
        assert!(matches!(profile.validate(), Err(DomainError::ValidationError(_))));
    }
}
