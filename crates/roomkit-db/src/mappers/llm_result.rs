//! LlmResult entity <-> model mapper

use roomkit_core::entities::LlmResult;

use crate::models::LlmResultModel;

impl From<LlmResultModel> for LlmResult {
    fn from(model: LlmResultModel) -> Self {
        LlmResult {
            id: model.id,
            llm_response: model.llm_response.0,
            created_at: model.created_at,
        }
    }
}
