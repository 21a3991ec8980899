//! Database models - SQLx-compatible structs for PostgreSQL tables

mod llm_result;
mod profile;

pub use llm_result::LlmResultModel;
pub use profile::ProfileModel;
