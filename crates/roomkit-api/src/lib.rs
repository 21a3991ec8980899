//! # roomkit-api
//!
//! REST API server built with Axum: profile endpoints, a health check, and
//! the buffered and streamed completion functions.

pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod server;
pub mod state;

pub use server::{create_app, create_app_state, run, run_server};
pub use state::AppState;
