//! UserProfile entity <-> model mapper

use roomkit_core::entities::UserProfile;

use crate::models::ProfileModel;

impl From<ProfileModel> for UserProfile {
    fn from(model: ProfileModel) -> Self {
        UserProfile {
            id: model.id,
            name: model.name,
            avatar: model.avatar,
        }
    }
}
