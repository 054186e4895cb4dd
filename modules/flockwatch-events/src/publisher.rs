use async_trait::async_trait;

use flockwatch_common::{ChangeEvent, StreamId};

/// Subscriber groups an event can be published to.
pub mod topics {
    use super::StreamId;

    /// The all-streams subscriber group.
    pub const GLOBAL: &str = "streams";

    /// The subscriber group for one stream.
    pub fn stream(id: StreamId) -> String {
        format!("stream:{id}")
    }
}

/// Pluggable event transport. The streaming core depends only on this,
/// never on a concrete delivery mechanism.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Deliver one event to one subscriber group. Best effort: delivery to
    /// a group with no subscribers succeeds and goes nowhere.
    async fn publish(&self, topic: &str, event: &ChangeEvent) -> anyhow::Result<()>;
}

/// Publisher that drops everything. For tests and embedders that only read
/// the persisted history.
pub struct NoopPublisher;

#[async_trait]
impl Publisher for NoopPublisher {
    async fn publish(&self, _topic: &str, _event: &ChangeEvent) -> anyhow::Result<()> {
        Ok(())
    }
}
