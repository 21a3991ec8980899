//! Data transfer objects for API requests and responses

pub mod requests;
pub mod responses;

pub use requests::AddProfileRequest;
pub use responses::{ApiResponse, HealthResponse, ProfileResponse, TaskAcceptedResponse};
