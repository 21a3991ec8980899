//! PostgreSQL implementation of LlmResultRepository

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::instrument;

use roomkit_core::entities::LlmResult;
use roomkit_core::error::DomainError;
use roomkit_core::traits::{LlmResultRepository, RepoResult};

use crate::models::LlmResultModel;

use super::error::{map_db_error, map_unique_violation};

/// PostgreSQL implementation of LlmResultRepository
#[derive(Clone)]
pub struct PgLlmResultRepository {
    pool: PgPool,
}

impl PgLlmResultRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LlmResultRepository for PgLlmResultRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<LlmResult>> {
        let result = sqlx::query_as::<_, LlmResultModel>(
            r"
            SELECT id, llm_response, created_at
            FROM llm_result
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(result.map(LlmResult::from))
    }

    #[instrument(skip(self, result), fields(task_id = %result.id))]
    async fn insert(&self, result: &LlmResult) -> RepoResult<()> {
        sqlx::query(
            r"
            INSERT INTO llm_result (id, llm_response, created_at)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(&result.id)
        .bind(Json(&result.llm_response))
        .bind(result.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, |_| DomainError::ResultAlreadyExists))?;

        Ok(())
    }
}
