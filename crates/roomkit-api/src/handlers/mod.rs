//! Route handlers

pub mod functions;
pub mod health;
pub mod users;
