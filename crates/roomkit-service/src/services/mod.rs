//! Business logic services
//!
//! Each service borrows the shared [`ServiceContext`] for the duration of a request.

pub mod completion;
pub mod context;
pub mod error;
pub mod profile;
pub mod upstream;

pub use completion::{BufferedTask, CompletionService};
pub use context::{ServiceContext, ServiceContextBuilder};
pub use error::{ServiceError, ServiceResult};
pub use profile::ProfileService;
pub use upstream::{CompletionUpstream, HttpCompletionUpstream, UpstreamStream};
