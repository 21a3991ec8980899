//! Domain entities - core business objects

mod completion;
mod message;
mod presence;
mod profile;

pub use completion::{
    extract_completion_text, ChatRole, CompletionMessage, CompletionRequest, LlmResult,
};
pub use message::ChatMessage;
pub use presence::{Participant, PresenceRecord, PresenceStatus};
pub use profile::UserProfile;
