//! # roomkit-service
//!
//! Application layer containing business logic, services, and DTOs.

pub mod dto;
pub mod services;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use services::{
    BufferedTask, CompletionService, CompletionUpstream, HttpCompletionUpstream, ProfileService,
    ServiceContext, ServiceContextBuilder, ServiceError, ServiceResult, UpstreamStream,
};
