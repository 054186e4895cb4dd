use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::StreamId;

// --- Change Events (subscriber-facing wire format) ---

/// Event kinds as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "stream:tweet")]
    Tweet,
    #[serde(rename = "stream:mention")]
    Mention,
    #[serde(rename = "stream:follow")]
    Follow,
    #[serde(rename = "stream:unfollow")]
    Unfollow,
    #[serde(rename = "stream:count_change")]
    CountChange,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Tweet => write!(f, "stream:tweet"),
            EventKind::Mention => write!(f, "stream:mention"),
            EventKind::Follow => write!(f, "stream:follow"),
            EventKind::Unfollow => write!(f, "stream:unfollow"),
            EventKind::CountChange => write!(f, "stream:count_change"),
        }
    }
}

/// One observed change, published live and kept in the bounded per-stream
/// history. Field names follow the subscriber-facing JSON schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(rename = "streamId")]
    pub stream_id: StreamId,
    pub target: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(
        kind: EventKind,
        stream_id: StreamId,
        target: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            kind,
            stream_id,
            target: target.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_wire_shape_matches_subscriber_schema() {
        let id = StreamId::new();
        let event = ChangeEvent::new(EventKind::Tweet, id, "acme", json!({"id": "t1"}));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "stream:tweet");
        assert_eq!(value["streamId"], id.to_string());
        assert_eq!(value["target"], "acme");
        assert_eq!(value["data"]["id"], "t1");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn event_kind_display_matches_wire_name() {
        assert_eq!(EventKind::Tweet.to_string(), "stream:tweet");
        assert_eq!(EventKind::Follow.to_string(), "stream:follow");
        assert_eq!(EventKind::Unfollow.to_string(), "stream:unfollow");
        assert_eq!(EventKind::Mention.to_string(), "stream:mention");
        assert_eq!(EventKind::CountChange.to_string(), "stream:count_change");
    }

    #[test]
    fn event_round_trips_through_json() {
        let event = ChangeEvent::new(
            EventKind::CountChange,
            StreamId::new(),
            "acme",
            json!({"previous": 100, "current": 101, "delta": 1}),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: ChangeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, EventKind::CountChange);
        assert_eq!(back.stream_id, event.stream_id);
        assert_eq!(back.data["delta"], 1);
    }
}
