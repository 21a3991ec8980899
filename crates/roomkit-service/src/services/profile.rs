//! Profile service
//!
//! Application-side profile attached to an auth user.

use roomkit_core::entities::UserProfile;
use roomkit_core::DomainError;
use tracing::{info, instrument};
use validator::Validate;

use crate::dto::{AddProfileRequest, ProfileResponse};

use super::context::ServiceContext;
use super::error::ServiceResult;

/// Profile service
pub struct ProfileService<'a> {
    ctx: &'a ServiceContext,
}

impl<'a> ProfileService<'a> {
    pub fn new(ctx: &'a ServiceContext) -> Self {
        Self { ctx }
    }

    /// Profile of the authenticated user, `None` until they create one
    #[instrument(skip(self))]
    pub async fn get_profile(&self, user_id: &str) -> ServiceResult<Option<ProfileResponse>> {
        let profile = self.ctx.profile_repo().find_by_id(user_id).await?;
        Ok(profile.map(ProfileResponse::from))
    }

    /// Create the profile for `user_id`; the id always comes from the token
    #[instrument(skip(self, request))]
    pub async fn add_profile(
        &self,
        user_id: &str,
        request: AddProfileRequest,
    ) -> ServiceResult<ProfileResponse> {
        request.validate()?;

        let avatar = request
            .avatar
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        let profile = UserProfile::new(user_id, request.name.trim(), avatar);
        profile.validate()?;

        let repo = self.ctx.profile_repo();
        if repo.find_by_id(user_id).await?.is_some() {
            return Err(DomainError::ProfileAlreadyExists.into());
        }
        if repo.name_exists(&profile.name).await? {
            return Err(DomainError::ProfileNameTaken.into());
        }

        // The unique constraints still decide races between the checks and the insert
        repo.create(&profile).await?;
        info!(user_id = %profile.id, name = %profile.name, "User profile created");

        Ok(ProfileResponse::from(profile))
    }
}
