//! User profile database model

use sqlx::FromRow;

/// Database model for the user_profile table
#[derive(Debug, Clone, FromRow)]
pub struct ProfileModel {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
}
