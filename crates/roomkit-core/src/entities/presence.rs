//! Presence entities - who is in a room and in what state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Participant status inside a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    /// Participant is active
    #[default]
    Online,
    /// Participant is away from keyboard
    Away,
    /// Participant does not want to be disturbed
    Busy,
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Away => write!(f, "away"),
            Self::Busy => write!(f, "busy"),
        }
    }
}

impl std::str::FromStr for PresenceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "away" => Ok(Self::Away),
            "busy" => Ok(Self::Busy),
            _ => Err(format!("Invalid status: {s}")),
        }
    }
}

/// Local participant joining a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl Participant {
    /// Create a participant with only an identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            avatar_url: None,
        }
    }

    /// Set the display name
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Set the avatar URL
    #[must_use]
    pub fn with_avatar_url(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    /// Build the presence record published for this participant
    pub fn record(&self, status: PresenceStatus) -> PresenceRecord {
        PresenceRecord {
            participant_id: self.id.clone(),
            status,
            last_seen_at: Utc::now(),
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// Presence record as tracked on a realtime channel.
///
/// Records are replaced wholesale on every update; there is no field-level merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub participant_id: String,
    #[serde(default)]
    pub status: PresenceStatus,
    pub last_seen_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl PresenceRecord {
    /// Create a record stamped with the current time
    pub fn new(participant_id: impl Into<String>, status: PresenceStatus) -> Self {
        Self {
            participant_id: participant_id.into(),
            status,
            last_seen_at: Utc::now(),
            display_name: None,
            avatar_url: None,
        }
    }

    /// Replace the status and refresh the timestamp
    pub fn set_status(&mut self, status: PresenceStatus) {
        self.status = status;
        self.touch();
    }

    /// Refresh the last-seen timestamp
    pub fn touch(&mut self) {
        self.last_seen_at = Utc::now();
    }

    /// Name to show in a member list
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.participant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(PresenceStatus::Online.to_string(), "online");
        assert_eq!(PresenceStatus::Away.to_string(), "away");
        assert_eq!(PresenceStatus::Busy.to_string(), "busy");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("ONLINE".parse::<PresenceStatus>().unwrap(), PresenceStatus::Online);
        assert_eq!("Away".parse::<PresenceStatus>().unwrap(), PresenceStatus::Away);
        assert!("offline".parse::<PresenceStatus>().is_err());
    }

    #[test]
    fn test_record_wire_format() {
        let record = PresenceRecord::new("u-1", PresenceStatus::Busy);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["participantId"], "u-1");
        assert_eq!(json["status"], "busy");
        assert!(json.get("lastSeenAt").is_some());
        assert!(json.get("displayName").is_none());
    }

    #[test]
    fn test_set_status_refreshes_timestamp() {
        let mut record = PresenceRecord::new("u-1", PresenceStatus::Online);
        record.last_seen_at = DateTime::<Utc>::from_timestamp(0, 0).unwrap();

        record.set_status(PresenceStatus::Away);

        assert_eq!(record.status, PresenceStatus::Away);
        assert!(record.last_seen_at.timestamp() > 0);
    }

    #[test]
    fn test_participant_record() {
        let participant = Participant::new("u-2")
            .with_display_name("Ada")
            .with_avatar_url("https://cdn.example/ada.png");
        let record = participant.record(PresenceStatus::Online);

        assert_eq!(record.participant_id, "u-2");
        assert_eq!(record.label(), "Ada");
        assert_eq!(record.avatar_url.as_deref(), Some("https://cdn.example/ada.png"));
    }
}
