//! Room events delivered to session subscribers

use roomkit_core::{ChatMessage, PresenceRecord};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::session::SessionStatus;

/// Everything a room session reports
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent<B> {
    /// The session moved to a new state
    StatusChanged(SessionStatus),
    /// Full presence snapshot; the cache now equals this list
    Sync(Vec<PresenceRecord>),
    Join(Vec<PresenceRecord>),
    Leave(Vec<PresenceRecord>),
    Broadcast(B),
}

/// Payload types that can travel as room broadcasts.
///
/// Implementors serialize as `{"event": <name>, "payload": <body>}`, which
/// `#[serde(tag = "event", content = "payload")]` on an enum produces.
pub trait BroadcastPayload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> BroadcastPayload for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Default broadcast vocabulary for a chat room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum RoomBroadcast {
    Message(ChatMessage),
    Typing(TypingIndicator),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    pub participant_id: String,
    pub is_typing: bool,
}

impl RoomBroadcast {
    /// Event name on the wire
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Typing(_) => "typing",
        }
    }
}

/// Decode the `{event, payload}` part of a broadcast frame payload
pub(crate) fn decode_broadcast<B: BroadcastPayload>(payload: &Value) -> Result<B, serde_json::Error> {
    let body = json!({
        "event": payload.get("event").cloned().unwrap_or(Value::Null),
        "payload": payload.get("payload").cloned().unwrap_or(Value::Null),
    });
    serde_json::from_value(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_wire_shape() {
        let typing = RoomBroadcast::Typing(TypingIndicator {
            participant_id: "u-1".to_string(),
            is_typing: true,
        });
        let json = serde_json::to_value(&typing).unwrap();

        assert_eq!(json["event"], typing.event_name());
        assert_eq!(json["payload"]["participantId"], "u-1");
        assert_eq!(json["payload"]["isTyping"], true);
    }

    #[test]
    fn test_decode_ignores_frame_type() {
        let payload = json!({
            "type": "broadcast",
            "event": "message",
            "payload": {
                "id": "m-1",
                "senderId": "u-1",
                "body": "hi",
                "sentAt": "2025-01-01T00:00:00Z"
            }
        });

        let decoded: RoomBroadcast = decode_broadcast(&payload).unwrap();
        match decoded {
            RoomBroadcast::Message(msg) => assert_eq!(msg.body, "hi"),
            RoomBroadcast::Typing(_) => panic!("expected message"),
        }
    }

    #[test]
    fn test_unknown_event_rejected() {
        let payload = json!({ "type": "broadcast", "event": "reaction", "payload": {} });
        assert!(decode_broadcast::<RoomBroadcast>(&payload).is_err());
    }
}
