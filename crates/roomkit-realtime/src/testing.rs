//! In-memory realtime server for tests in this and downstream crates (`testing` feature)

use std::time::Duration;

use roomkit_core::PresenceRecord;
use serde_json::{json, Map, Value};
use tokio::sync::{broadcast, mpsc};

use crate::client::RealtimeClient;
use crate::config::RealtimeConfig;
use crate::events::RoomEvent;
use crate::protocol::{events, PhoenixMessage, PHOENIX_TOPIC};
use crate::socket::RealtimeSocket;

const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// The far end of a socket built with `RealtimeSocket::from_channels`
pub struct MockServer {
    frames: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<String>,
}

impl MockServer {
    pub fn start() -> (RealtimeSocket, Self) {
        Self::start_with(&RealtimeConfig::default())
    }

    pub fn start_with(config: &RealtimeConfig) -> (RealtimeSocket, Self) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let socket = RealtimeSocket::from_channels(outbound_tx, inbound_rx, config.heartbeat_interval);
        (
            socket,
            Self {
                frames: outbound_rx,
                inbound: inbound_tx,
            },
        )
    }

    /// A client wired to a fresh server
    pub fn client() -> (RealtimeClient, Self) {
        let config = RealtimeConfig::new("http://localhost:54321", "anon-key");
        let (socket, server) = Self::start_with(&config);
        (RealtimeClient::with_socket(socket, config), server)
    }

    // === Server to client ===

    pub fn push(&self, message: &PhoenixMessage) {
        let json = message.to_json().expect("frame encodes");
        let _ = self.inbound.send(json);
    }

    pub fn send(&self, topic: &str, event: &str, payload: Value, msg_ref: Option<&str>) {
        self.push(&PhoenixMessage::new(
            topic,
            event,
            payload,
            msg_ref.map(str::to_string),
        ));
    }

    pub fn reply_ok(&self, to: &PhoenixMessage) {
        self.send(
            &to.topic,
            events::REPLY,
            json!({ "status": "ok", "response": {} }),
            to.msg_ref.as_deref(),
        );
    }

    pub fn reply_error(&self, to: &PhoenixMessage, reason: &str) {
        self.send(
            &to.topic,
            events::REPLY,
            json!({ "status": "error", "response": { "reason": reason } }),
            to.msg_ref.as_deref(),
        );
    }

    /// `body` is `{event, payload}`
    pub fn broadcast(&self, topic: &str, mut body: Value) {
        body["type"] = Value::from("broadcast");
        self.send(topic, events::BROADCAST, body, None);
    }

    pub fn presence_state(&self, topic: &str, records: &[PresenceRecord]) {
        self.send(topic, events::PRESENCE_STATE, presence_map(records), None);
    }

    pub fn presence_diff(&self, topic: &str, joins: &[PresenceRecord], leaves: &[PresenceRecord]) {
        self.send(
            topic,
            events::PRESENCE_DIFF,
            json!({ "joins": presence_map(joins), "leaves": presence_map(leaves) }),
            None,
        );
    }

    pub fn insert_row(&self, topic: &str, table: &str, record: Value) {
        self.send(
            topic,
            events::POSTGRES_CHANGES,
            json!({
                "ids": [1],
                "data": {
                    "schema": "public",
                    "table": table,
                    "type": "INSERT",
                    "record": record,
                    "commit_timestamp": "2025-01-01T00:00:00Z"
                }
            }),
            None,
        );
    }

    // === Client to server ===

    /// Next frame including heartbeats; `None` after a quiet second
    pub async fn next_raw_frame(&mut self) -> Option<PhoenixMessage> {
        let text = tokio::time::timeout(RECV_TIMEOUT, self.frames.recv())
            .await
            .ok()??;
        PhoenixMessage::from_json(&text).ok()
    }

    /// Next channel frame, skipping heartbeats
    pub async fn next_frame(&mut self) -> Option<PhoenixMessage> {
        loop {
            let frame = self.next_raw_frame().await?;
            if frame.topic != PHOENIX_TOPIC {
                return Some(frame);
            }
        }
    }

    /// Skip frames until one with `event` arrives
    pub async fn expect_event(&mut self, event: &str) -> PhoenixMessage {
        loop {
            let frame = self
                .next_frame()
                .await
                .unwrap_or_else(|| panic!("no `{event}` frame received"));
            if frame.event == event {
                return frame;
            }
        }
    }

    /// A channel frame already queued, without waiting
    pub fn try_next_frame(&mut self) -> Option<PhoenixMessage> {
        while let Ok(text) = self.frames.try_recv() {
            if let Ok(frame) = PhoenixMessage::from_json(&text) {
                if frame.topic != PHOENIX_TOPIC {
                    return Some(frame);
                }
            }
        }
        None
    }
}

/// Next room event, failing the test after a quiet second
pub async fn recv_event<B: Clone>(events: &mut broadcast::Receiver<RoomEvent<B>>) -> RoomEvent<B> {
    tokio::time::timeout(RECV_TIMEOUT, events.recv())
        .await
        .expect("room event in time")
        .expect("event channel open")
}

fn presence_map(records: &[PresenceRecord]) -> Value {
    let mut map = Map::new();
    for record in records {
        let mut meta = serde_json::to_value(record).expect("record encodes");
        meta["phx_ref"] = Value::from(format!("ref-{}", record.participant_id));
        map.insert(record.participant_id.clone(), json!({ "metas": [meta] }));
    }
    Value::Object(map)
}
