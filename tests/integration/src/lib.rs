//! Integration test utilities for the roomkit backend
//!
//! Spawns the real API against the database named by `DATABASE_URL` and
//! drives it over HTTP, both directly and through `roomkit-client`.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
