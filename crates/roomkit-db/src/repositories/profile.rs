//! PostgreSQL implementation of ProfileRepository

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use roomkit_core::entities::UserProfile;
use roomkit_core::error::DomainError;
use roomkit_core::traits::{ProfileRepository, RepoResult};

use crate::models::ProfileModel;

use super::error::{map_db_error, map_unique_violation};

/// PostgreSQL implementation of ProfileRepository
#[derive(Clone)]
pub struct PgProfileRepository {
    pool: PgPool,
}

impl PgProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileRepository for PgProfileRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<UserProfile>> {
        let result = sqlx::query_as::<_, ProfileModel>(
            r"
            SELECT id, name, avatar
            FROM user_profile
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(result.map(UserProfile::from))
    }

    #[instrument(skip(self))]
    async fn name_exists(&self, name: &str) -> RepoResult<bool> {
        let result = sqlx::query_scalar::<_, bool>(
            r"
            SELECT EXISTS(SELECT 1 FROM user_profile WHERE name = $1)
            ",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(result)
    }

    #[instrument(skip(self), fields(profile_id = %profile.id))]
    async fn create(&self, profile: &UserProfile) -> RepoResult<()> {
        sqlx::query(
            r"
            INSERT INTO user_profile (id, name, avatar)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(&profile.id)
        .bind(&profile.name)
        .bind(&profile.avatar)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_unique_violation(e, |constraint| match constraint {
                Some(c) if c.contains("name") => DomainError::ProfileNameTaken,
                _ => DomainError::ProfileAlreadyExists,
            })
        })?;

        Ok(())
    }
}
