//! Repository traits (ports) - define the interface for data access
//!
//! The domain layer defines what it needs, and the infrastructure layer
//! provides the implementation.

use async_trait::async_trait;

use crate::entities::{LlmResult, UserProfile};
use crate::error::DomainError;

/// Result type for repository operations
pub type RepoResult<T> = Result<T, DomainError>;

// ============================================================================
// Profile Repository
// ============================================================================

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Find profile by auth user id
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<UserProfile>>;

    /// Check if a display name is already taken
    async fn name_exists(&self, name: &str) -> RepoResult<bool>;

    /// Insert a new profile
    async fn create(&self, profile: &UserProfile) -> RepoResult<()>;
}

// ============================================================================
// Completion Result Repository
// ============================================================================

#[async_trait]
pub trait LlmResultRepository: Send + Sync {
    /// Find a stored result by task id
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<LlmResult>>;

    /// Store a result; the insert is what realtime subscribers observe
    async fn insert(&self, result: &LlmResult) -> RepoResult<()>;
}
