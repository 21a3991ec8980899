//! Model to entity mappers
//!
//! `From<Model> for Entity` conversions between database rows and `roomkit-core` types.

mod llm_result;
mod profile;
