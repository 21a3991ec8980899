//! Repository implementations

mod error;
mod llm_result;
mod profile;

pub use llm_result::PgLlmResultRepository;
pub use profile::PgProfileRepository;
