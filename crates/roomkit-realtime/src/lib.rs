//! # roomkit-realtime
//!
//! Client for the backing service's realtime channels (Phoenix protocol):
//! room sessions with presence, broadcasts, and row-insert subscriptions,
//! all multiplexed over one socket.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod inserts;
pub mod presence;
pub mod protocol;
pub mod session;
pub mod socket;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::RealtimeClient;
pub use config::RealtimeConfig;
pub use error::{RealtimeError, RealtimeResult};
pub use events::{BroadcastPayload, RoomBroadcast, RoomEvent, TypingIndicator};
pub use inserts::InsertSubscription;
pub use presence::{PresenceCache, PresenceChanges, PresenceState};
pub use protocol::PhoenixMessage;
pub use session::{RoomSession, SessionStatus};
pub use socket::RealtimeSocket;
