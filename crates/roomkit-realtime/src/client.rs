//! Realtime client - the context object that owns a socket and hands out
//! room sessions and insert subscriptions

use roomkit_core::{Participant, PresenceStatus};

use crate::config::RealtimeConfig;
use crate::error::RealtimeResult;
use crate::events::BroadcastPayload;
use crate::inserts::InsertSubscription;
use crate::session::RoomSession;
use crate::socket::RealtimeSocket;

/// Entry point for realtime features. Cheap to clone; clones share the socket.
#[derive(Clone, Debug)]
pub struct RealtimeClient {
    socket: RealtimeSocket,
    config: RealtimeConfig,
}

impl RealtimeClient {
    /// Connect to the realtime service
    pub async fn connect(config: RealtimeConfig) -> RealtimeResult<Self> {
        let socket = RealtimeSocket::connect(&config).await?;
        Ok(Self { socket, config })
    }

    /// Use an existing socket, e.g. one built with `RealtimeSocket::from_channels`
    pub fn with_socket(socket: RealtimeSocket, config: RealtimeConfig) -> Self {
        Self { socket, config }
    }

    pub fn socket(&self) -> &RealtimeSocket {
        &self.socket
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    /// Join a room. Several rooms can be open at once.
    pub fn open_room<B: BroadcastPayload>(
        &self,
        room_id: &str,
        participant: &Participant,
        initial_status: PresenceStatus,
    ) -> RealtimeResult<RoomSession<B>> {
        RoomSession::open(&self.socket, &self.config, room_id, participant, initial_status)
    }

    /// Watch inserts into `public.<table>`
    pub fn subscribe_inserts(
        &self,
        table: &str,
        filter: Option<&str>,
    ) -> RealtimeResult<InsertSubscription> {
        InsertSubscription::open(&self.socket, &self.config, table, filter)
    }

    /// Shut the socket down; open sessions see their channels end
    pub fn close(&self) {
        self.socket.close();
    }
}
