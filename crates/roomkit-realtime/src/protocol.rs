//! Phoenix channel message format
//!
//! Every frame on the realtime socket is a JSON object with `topic`, `event`,
//! `payload` and `ref`. Replies to a push echo its `ref`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Topic used for socket-level heartbeats
pub const PHOENIX_TOPIC: &str = "phoenix";

/// Prefix the backing service puts on channel topics
pub const TOPIC_PREFIX: &str = "realtime:";

pub mod events {
    pub const JOIN: &str = "phx_join";
    pub const LEAVE: &str = "phx_leave";
    pub const REPLY: &str = "phx_reply";
    pub const CLOSE: &str = "phx_close";
    pub const ERROR: &str = "phx_error";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const BROADCAST: &str = "broadcast";
    pub const PRESENCE: &str = "presence";
    pub const PRESENCE_STATE: &str = "presence_state";
    pub const PRESENCE_DIFF: &str = "presence_diff";
    pub const POSTGRES_CHANGES: &str = "postgres_changes";
}

/// Full channel topic for a room or subscription name
pub fn topic_for(name: &str) -> String {
    format!("{TOPIC_PREFIX}{name}")
}

/// A single Phoenix frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
}

impl PhoenixMessage {
    pub fn new(
        topic: impl Into<String>,
        event: impl Into<String>,
        payload: Value,
        msg_ref: Option<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            event: event.into(),
            payload,
            msg_ref,
        }
    }

    // === Client pushes ===

    pub fn join(topic: &str, payload: Value, msg_ref: String) -> Self {
        Self::new(topic, events::JOIN, payload, Some(msg_ref))
    }

    pub fn leave(topic: &str, msg_ref: String) -> Self {
        Self::new(topic, events::LEAVE, json!({}), Some(msg_ref))
    }

    pub fn heartbeat(msg_ref: String) -> Self {
        Self::new(PHOENIX_TOPIC, events::HEARTBEAT, json!({}), Some(msg_ref))
    }

    /// Broadcast push; `message` is `{event, payload}`
    pub fn broadcast(topic: &str, mut message: Value, msg_ref: String) -> Self {
        if let Some(obj) = message.as_object_mut() {
            obj.insert("type".to_string(), Value::from(events::BROADCAST));
        }
        Self::new(topic, events::BROADCAST, message, Some(msg_ref))
    }

    /// Publish this client's presence metadata
    pub fn presence_track(topic: &str, meta: Value, msg_ref: String) -> Self {
        Self::new(
            topic,
            events::PRESENCE,
            json!({ "type": "presence", "event": "track", "payload": meta }),
            Some(msg_ref),
        )
    }

    pub fn presence_untrack(topic: &str, msg_ref: String) -> Self {
        Self::new(
            topic,
            events::PRESENCE,
            json!({ "type": "presence", "event": "untrack" }),
            Some(msg_ref),
        )
    }

    // === Server frames ===

    /// `status` of a `phx_reply`
    pub fn reply_status(&self) -> Option<&str> {
        if self.event != events::REPLY {
            return None;
        }
        self.payload.get("status").and_then(Value::as_str)
    }

    /// Whether this is a reply to the push carrying `msg_ref`
    pub fn is_reply_to(&self, msg_ref: &str) -> bool {
        self.event == events::REPLY && self.msg_ref.as_deref() == Some(msg_ref)
    }

    /// Reason attached to an error reply
    pub fn reply_reason(&self) -> &str {
        self.payload
            .pointer("/response/reason")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for PhoenixMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PhoenixMessage(topic={}, event={}", self.topic, self.event)?;
        if let Some(r) = &self.msg_ref {
            write!(f, ", ref={r}")?;
        }
        write!(f, ")")
    }
}
