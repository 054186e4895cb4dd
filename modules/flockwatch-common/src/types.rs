use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::WatchError;

// --- Identifiers ---

/// Identity of one logical stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub Uuid);

impl StreamId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StreamId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Timeline,
    Relationship,
    Mention,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Timeline => write!(f, "timeline"),
            StreamKind::Relationship => write!(f, "relationship"),
            StreamKind::Mention => write!(f, "mention"),
        }
    }
}

impl FromStr for StreamKind {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timeline" => Ok(StreamKind::Timeline),
            "relationship" => Ok(StreamKind::Relationship),
            "mention" => Ok(StreamKind::Mention),
            other => Err(WatchError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Running,
    Paused,
    Backoff,
    Stopped,
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamStatus::Running => write!(f, "running"),
            StreamStatus::Paused => write!(f, "paused"),
            StreamStatus::Backoff => write!(f, "backoff"),
            StreamStatus::Stopped => write!(f, "stopped"),
        }
    }
}

// --- Stream Metadata ---

/// Identity and bookkeeping for one logical subscription.
///
/// Mutated only by the poll handler (on poll outcome) and by lifecycle
/// operations. At most one non-stopped meta exists per (kind, target).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMeta {
    pub id: StreamId,
    pub kind: StreamKind,
    pub target: String,
    pub cadence_ms: u64,
    pub status: StreamStatus,
    pub created_at: DateTime<Utc>,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub poll_count: u64,
    pub event_count: u64,
    pub error_count: u64,
    pub consecutive_errors: u32,
    pub backoff_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl StreamMeta {
    pub fn new(kind: StreamKind, target: impl Into<String>, cadence_ms: u64) -> Self {
        Self {
            id: StreamId::new(),
            kind,
            target: target.into(),
            cadence_ms,
            status: StreamStatus::Running,
            created_at: Utc::now(),
            last_poll_at: None,
            poll_count: 0,
            event_count: 0,
            error_count: 0,
            consecutive_errors: 0,
            backoff_until: None,
            last_error: None,
        }
    }

    /// Active means "counts toward the one-stream-per-(kind, target) rule".
    pub fn is_active(&self) -> bool {
        self.status != StreamStatus::Stopped
    }
}

// --- Stream State (diff snapshot) ---

/// Last-observed snapshot a poll diffs against. Shape depends on the
/// stream kind; read-modify-written by the matching poll executor only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum StreamState {
    /// Seen item identifiers for timeline/mention streams, newest first,
    /// truncated to the seen cap.
    Seen { ids: Vec<String> },
    /// Last sampled follower handles plus the last aggregate count.
    /// The count and the handle list are always written together, so a
    /// stored count implies a stored list.
    Followers {
        handles: Vec<String>,
        count: Option<u64>,
    },
}

impl StreamState {
    pub fn empty_for(kind: StreamKind) -> Self {
        match kind {
            StreamKind::Timeline | StreamKind::Mention => StreamState::Seen { ids: Vec::new() },
            StreamKind::Relationship => StreamState::Followers {
                handles: Vec::new(),
                count: None,
            },
        }
    }
}

// --- Extracted Items ---

/// One post as returned by the extractor for timeline/mention polls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostItem {
    pub id: String,
    pub author: String,
    pub text: String,
    pub url: String,
    pub posted_at: Option<DateTime<Utc>>,
}

/// One relationship sample as returned by the extractor: the aggregate
/// total (when the page exposes it) and a bounded window of handles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowerSnapshot {
    pub total: Option<u64>,
    pub handles: Vec<String>,
}
