//! # roomkit-core
//!
//! Domain layer containing entities, value objects and repository traits.
//! This crate has zero dependencies on infrastructure (database, web framework, realtime transport).

pub mod entities;
pub mod error;
pub mod traits;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{
    extract_completion_text, ChatMessage, ChatRole, CompletionMessage, CompletionRequest,
    LlmResult, Participant, PresenceRecord, PresenceStatus, UserProfile,
};
pub use error::DomainError;
pub use traits::{LlmResultRepository, ProfileRepository, RepoResult};
pub use value_objects::{split_extension, FileNameGenerator, FILE_ID_LEN};
