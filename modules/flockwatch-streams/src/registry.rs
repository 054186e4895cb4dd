use std::collections::HashMap;

use tokio::sync::RwLock;

use flockwatch_common::{StreamId, StreamKind, StreamMeta};

/// In-memory index of known streams.
///
/// The store stays the source of truth; the registry is the cheap lookup for
/// listing, uniqueness checks and reads while the store is briefly down. It
/// is refreshed from the store by `restore` and lazily by `list`.
pub struct StreamRegistry {
    streams: RwLock<HashMap<StreamId, StreamMeta>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, meta: StreamMeta) {
        self.streams.write().await.insert(meta.id, meta);
    }

    pub async fn remove(&self, id: StreamId) {
        self.streams.write().await.remove(&id);
    }

    pub async fn get(&self, id: StreamId) -> Option<StreamMeta> {
        self.streams.read().await.get(&id).cloned()
    }

    pub async fn contains(&self, id: StreamId) -> bool {
        self.streams.read().await.contains_key(&id)
    }

    pub async fn all(&self) -> Vec<StreamMeta> {
        self.streams.read().await.values().cloned().collect()
    }

    /// The non-stopped stream for this (kind, target) pair, if one exists.
    pub async fn find_active(&self, kind: StreamKind, target: &str) -> Option<StreamMeta> {
        self.streams
            .read()
            .await
            .values()
            .find(|meta| meta.kind == kind && meta.target == target && meta.is_active())
            .cloned()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}
