//! Repository traits (ports)

mod repositories;

pub use repositories::{LlmResultRepository, ProfileRepository, RepoResult};
