use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::RwLock;
use tracing::debug;

use flockwatch_common::{ChangeEvent, StreamId};

use crate::publisher::{topics, Publisher};

const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out over tokio broadcast channels: one global group plus
/// a lazily-created group per stream.
///
/// Slow subscribers lag and lose the oldest events rather than stalling the
/// publisher. Per-stream groups vanish once their last receiver is gone.
pub struct EventBus {
    capacity: usize,
    global: broadcast::Sender<ChangeEvent>,
    streams: RwLock<HashMap<String, broadcast::Sender<ChangeEvent>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (global, _) = broadcast::channel(capacity);
        Self {
            capacity,
            global,
            streams: RwLock::new(HashMap::new()),
        }
    }

    /// Receive every event from every stream.
    pub fn subscribe_all(&self) -> broadcast::Receiver<ChangeEvent> {
        self.global.subscribe()
    }

    /// Receive events for one stream only.
    pub async fn subscribe_stream(&self, id: StreamId) -> broadcast::Receiver<ChangeEvent> {
        let topic = topics::stream(id);
        let mut streams = self.streams.write().await;
        streams
            .entry(topic)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl Publisher for EventBus {
    async fn publish(&self, topic: &str, event: &ChangeEvent) -> anyhow::Result<()> {
        if topic == topics::GLOBAL {
            // Send fails only when nobody is listening, which is fine.
            let _ = self.global.send(event.clone());
            return Ok(());
        }

        let mut streams = self.streams.write().await;
        if let Some(sender) = streams.get(topic) {
            if sender.receiver_count() == 0 {
                streams.remove(topic);
                debug!(topic, "Dropped subscriber group with no receivers");
            } else {
                let _ = sender.send(event.clone());
            }
        }
        Ok(())
    }
}
