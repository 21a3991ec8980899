//! Value objects - immutable types that represent domain concepts

mod file_name;

pub use file_name::{split_extension, FileNameGenerator, FILE_ID_LEN};
