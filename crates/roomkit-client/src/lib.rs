//! # roomkit-client
//!
//! Client SDK for roomkit apps:
//! - auth with a persisted session store and auth events
//! - the backend API (profiles) behind a bearer-token interceptor
//! - object storage with collision-free upload names
//! - table rows through the REST interface (select, insert, update, delete, upsert)
//! - buffered and streaming completions
//!
//! Realtime rooms come from `roomkit-realtime`; [`RoomkitClient::realtime`]
//! connects one as the signed-in user.

pub mod api;
pub mod auth;
pub mod client;
pub mod completion;
pub mod config;
pub mod error;
pub mod session;
pub mod storage;
pub mod table;

pub use api::ApiClient;
pub use auth::{AuthClient, SignUpOutcome};
pub use client::RoomkitClient;
pub use completion::{CancelHandle, Completed, CompletionClient, CompletionError, PendingCompletion};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use session::{AuthEvent, ClientSession, FileStorage, MemoryStorage, SessionStorage, SessionStore};
pub use storage::{ObjectDescriptor, StorageClient, StorageObject};
pub use table::{Query, TableClient};
