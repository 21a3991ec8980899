//! Room sessions
//!
//! One channel subscription per room. A session joins `realtime:<room>` with
//! the participant id as presence key, becomes `Connected` on the join
//! acknowledgment, publishes the local presence record, and turns incoming
//! frames into `RoomEvent`s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use roomkit_core::{Participant, PresenceRecord, PresenceStatus};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::config::RealtimeConfig;
use crate::error::{RealtimeError, RealtimeResult};
use crate::events::{decode_broadcast, BroadcastPayload, RoomBroadcast, RoomEvent};
use crate::presence::{PresenceCache, PresenceState};
use crate::protocol::{events, topic_for, PhoenixMessage};
use crate::socket::RealtimeSocket;

/// Session lifecycle: `Disconnected -> Connecting -> Connected -> Disconnected`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Disconnected,
    /// Join sent, acknowledgment pending
    Connecting,
    /// Join acknowledged
    Connected,
}

struct SessionShared<B> {
    topic: String,
    status: Mutex<SessionStatus>,
    local: Mutex<PresenceRecord>,
    cache: Mutex<PresenceCache>,
    events: broadcast::Sender<RoomEvent<B>>,
    closed: AtomicBool,
}

impl<B: BroadcastPayload> SessionShared<B> {
    fn status(&self) -> SessionStatus {
        *self.status.lock()
    }

    fn set_status(&self, next: SessionStatus) {
        // After close only the final transition is allowed
        if self.is_closed() && next != SessionStatus::Disconnected {
            return;
        }

        let changed = {
            let mut status = self.status.lock();
            let changed = *status != next;
            *status = next;
            changed
        };

        if changed {
            info!(topic = %self.topic, status = ?next, "Room session status changed");
            self.emit(RoomEvent::StatusChanged(next));
        }
    }

    fn emit(&self, event: RoomEvent<B>) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Publish the local record. Nothing is sent once the session is closed.
    fn track(&self, socket: &RealtimeSocket) -> RealtimeResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        let record = self.local.lock().clone();
        let meta = serde_json::to_value(&record)?;
        socket.push(&PhoenixMessage::presence_track(&self.topic, meta, socket.next_ref()))
    }
}

/// A live subscription to one room
pub struct RoomSession<B: BroadcastPayload = RoomBroadcast> {
    room_id: String,
    socket: RealtimeSocket,
    shared: Arc<SessionShared<B>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<B: BroadcastPayload> RoomSession<B> {
    /// Join `room_id` as `participant` and start the event loop
    pub fn open(
        socket: &RealtimeSocket,
        config: &RealtimeConfig,
        room_id: &str,
        participant: &Participant,
        initial_status: PresenceStatus,
    ) -> RealtimeResult<Self> {
        let topic = topic_for(room_id);
        let frames = socket.register(&topic)?;
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let shared = Arc::new(SessionShared {
            topic: topic.clone(),
            status: Mutex::new(SessionStatus::Disconnected),
            local: Mutex::new(participant.record(initial_status)),
            cache: Mutex::new(PresenceCache::new()),
            events,
            closed: AtomicBool::new(false),
        });
        shared.set_status(SessionStatus::Connecting);

        let join_ref = socket.next_ref();
        let join = PhoenixMessage::join(
            &topic,
            join_payload(&participant.id, config),
            join_ref.clone(),
        );
        if let Err(e) = socket.push(&join) {
            socket.unregister(&topic);
            shared.set_status(SessionStatus::Disconnected);
            return Err(e);
        }

        let event_loop = EventLoop {
            socket: socket.clone(),
            shared: Arc::clone(&shared),
            frames,
            join_ref,
            join_timeout: config.join_timeout,
        };
        let task = tokio::spawn(
            event_loop
                .run()
                .instrument(info_span!("room_session", room_id = %room_id)),
        );

        info!(room_id = %room_id, participant_id = %participant.id, "Joining room");

        Ok(Self {
            room_id: room_id.to_string(),
            socket: socket.clone(),
            shared,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn topic(&self) -> &str {
        &self.shared.topic
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.status()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == SessionStatus::Connected
    }

    /// Receive room events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent<B>> {
        self.shared.events.subscribe()
    }

    /// The record this session publishes for the local participant
    pub fn local_record(&self) -> PresenceRecord {
        self.shared.local.lock().clone()
    }

    /// Current members, ordered by participant id
    pub fn members(&self) -> Vec<PresenceRecord> {
        self.shared.cache.lock().members()
    }

    pub fn member(&self, participant_id: &str) -> Option<PresenceRecord> {
        self.shared.cache.lock().get(participant_id).cloned()
    }

    /// Re-publish the local record with a new status. No-op unless connected.
    pub fn update_status(&self, status: PresenceStatus) -> RealtimeResult<()> {
        if !self.is_connected() {
            debug!(room_id = %self.room_id, "Status update ignored while not connected");
            return Ok(());
        }

        self.shared.local.lock().set_status(status);
        self.shared.track(&self.socket)
    }

    /// Broadcast an event to the room. Fire and forget.
    pub fn send(&self, event: &B) -> RealtimeResult<()> {
        if !self.is_connected() {
            return Err(RealtimeError::NotConnected);
        }

        let body = serde_json::to_value(event)?;
        self.socket.push(&PhoenixMessage::broadcast(
            &self.shared.topic,
            body,
            self.socket.next_ref(),
        ))
    }

    /// Leave the room. Idempotent and safe on a session that never connected.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let topic = &self.shared.topic;
        if self.is_connected() {
            let untrack = PhoenixMessage::presence_untrack(topic, self.socket.next_ref());
            if let Err(e) = self.socket.push(&untrack) {
                debug!(error = %e, "Untrack not sent");
            }
        }
        if let Err(e) = self.socket.push(&PhoenixMessage::leave(topic, self.socket.next_ref())) {
            debug!(error = %e, "Leave not sent");
        }

        self.socket.unregister(topic);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.shared.cache.lock().clear();
        self.shared.set_status(SessionStatus::Disconnected);

        info!(room_id = %self.room_id, "Left room");
    }
}

impl<B: BroadcastPayload> Drop for RoomSession<B> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<B: BroadcastPayload> std::fmt::Debug for RoomSession<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSession")
            .field("room_id", &self.room_id)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

fn join_payload(presence_key: &str, config: &RealtimeConfig) -> Value {
    let mut payload = json!({
        "config": {
            "broadcast": { "self": config.broadcast_self, "ack": false },
            "presence": { "key": presence_key },
            "postgres_changes": []
        }
    });
    if let Some(token) = &config.access_token {
        payload["access_token"] = Value::from(token.as_str());
    }
    payload
}

enum Flow {
    Continue,
    Joined,
    Stop,
}

struct EventLoop<B> {
    socket: RealtimeSocket,
    shared: Arc<SessionShared<B>>,
    frames: mpsc::UnboundedReceiver<PhoenixMessage>,
    join_ref: String,
    join_timeout: Duration,
}

impl<B: BroadcastPayload> EventLoop<B> {
    async fn run(mut self) {
        let mut presence = PresenceState::new();
        let ack_deadline = tokio::time::sleep(self.join_timeout);
        tokio::pin!(ack_deadline);
        let mut awaiting_ack = true;

        loop {
            tokio::select! {
                frame = self.frames.recv() => {
                    let Some(frame) = frame else {
                        debug!("Channel stream ended");
                        self.shared.set_status(SessionStatus::Disconnected);
                        break;
                    };
                    match self.handle(&frame, &mut presence) {
                        Flow::Continue => {}
                        Flow::Joined => awaiting_ack = false,
                        Flow::Stop => break,
                    }
                }
                () = &mut ack_deadline, if awaiting_ack => {
                    warn!(timeout = ?self.join_timeout, "No join acknowledgment, session stays connecting");
                    awaiting_ack = false;
                }
            }
        }
    }

    fn handle(&self, frame: &PhoenixMessage, presence: &mut PresenceState) -> Flow {
        let shared = &self.shared;

        match frame.event.as_str() {
            events::REPLY if frame.is_reply_to(&self.join_ref) => {
                if frame.reply_status() != Some("ok") {
                    warn!(reason = frame.reply_reason(), "Join rejected");
                    shared.set_status(SessionStatus::Disconnected);
                    return Flow::Stop;
                }

                // close() may have run while the ack was in flight
                if shared.is_closed() {
                    return Flow::Stop;
                }
                shared.local.lock().touch();
                shared.set_status(SessionStatus::Connected);
                if let Err(e) = shared.track(&self.socket) {
                    warn!(error = %e, "Failed to publish presence");
                }
                return Flow::Joined;
            }
            events::PRESENCE_STATE => {
                presence.apply_state(&frame.payload);
                self.sync(presence);
            }
            events::PRESENCE_DIFF => {
                let changes = presence.apply_diff(&frame.payload);
                {
                    let cache = shared.cache.lock();
                    cache.apply_join(&changes.joins);
                    cache.apply_leave(&changes.leaves);
                }
                if !changes.joins.is_empty() {
                    shared.emit(RoomEvent::Join(changes.joins));
                }
                if !changes.leaves.is_empty() {
                    shared.emit(RoomEvent::Leave(changes.leaves));
                }
                self.sync(presence);
            }
            events::BROADCAST => match decode_broadcast::<B>(&frame.payload) {
                Ok(event) => shared.emit(RoomEvent::Broadcast(event)),
                Err(e) => {
                    let name = frame
                        .payload
                        .get("event")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or_default();
                    debug!(event = name, error = %e, "Ignoring unrecognized broadcast");
                }
            },
            events::CLOSE | events::ERROR => {
                warn!(event = %frame.event, "Channel ended by server");
                shared.set_status(SessionStatus::Disconnected);
                return Flow::Stop;
            }
            _ => trace!(%frame, "Unhandled frame"),
        }

        Flow::Continue
    }

    fn sync(&self, presence: &PresenceState) {
        let snapshot = presence.snapshot();
        self.shared.cache.lock().apply_sync(snapshot.clone());
        self.shared.emit(RoomEvent::Sync(snapshot));
    }
}
