use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};

use flockwatch_common::{ChangeEvent, EventKind, StreamId, StreamMeta, StreamState};

use crate::error::Result;
use crate::kv::KeyValueStore;

/// Typed facade over the raw store. Owns the per-stream key schema:
/// `stream:{id}:meta`, `stream:{id}:state`, `stream:{id}:history` and
/// `stream:{id}:lock`. Meta, state and history are written with the long
/// record TTL; the lock carries its own short TTL.
#[derive(Clone)]
pub struct StreamStore {
    kv: Arc<dyn KeyValueStore>,
    record_ttl: Duration,
    lock_ttl: Duration,
}

impl StreamStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, record_ttl: Duration, lock_ttl: Duration) -> Self {
        Self {
            kv,
            record_ttl,
            lock_ttl,
        }
    }

    fn meta_key(id: StreamId) -> String {
        format!("stream:{id}:meta")
    }

    fn state_key(id: StreamId) -> String {
        format!("stream:{id}:state")
    }

    fn history_key(id: StreamId) -> String {
        format!("stream:{id}:history")
    }

    fn lock_key(id: StreamId) -> String {
        format!("stream:{id}:lock")
    }

    // --- Meta ---

    pub async fn get_meta(&self, id: StreamId) -> Result<Option<StreamMeta>> {
        match self.kv.get(&Self::meta_key(id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn put_meta(&self, meta: &StreamMeta) -> Result<()> {
        let bytes = serde_json::to_vec(meta)?;
        self.kv
            .put(&Self::meta_key(meta.id), &bytes, self.record_ttl)
            .await
    }

    /// Ids of every stream with a live meta record.
    pub async fn meta_ids(&self) -> Result<Vec<StreamId>> {
        let keys = self.kv.keys_with_prefix("stream:").await?;
        Ok(keys
            .iter()
            .filter_map(|key| {
                key.strip_prefix("stream:")?
                    .strip_suffix(":meta")?
                    .parse()
                    .ok()
            })
            .collect())
    }

    /// Every live meta record, fetched a few at a time. Ids whose meta
    /// expired mid-scan are skipped. No order guarantee.
    pub async fn all_metas(&self) -> Result<Vec<StreamMeta>> {
        let ids = self.meta_ids().await?;
        let fetched: Vec<Result<Option<StreamMeta>>> = stream::iter(ids)
            .map(|id| self.get_meta(id))
            .buffer_unordered(8)
            .collect()
            .await;

        let mut metas = Vec::new();
        for result in fetched {
            if let Some(meta) = result? {
                metas.push(meta);
            }
        }
        Ok(metas)
    }

    // --- State ---

    pub async fn get_state(&self, id: StreamId) -> Result<Option<StreamState>> {
        match self.kv.get(&Self::state_key(id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn put_state(&self, id: StreamId, state: &StreamState) -> Result<()> {
        let bytes = serde_json::to_vec(state)?;
        self.kv
            .put(&Self::state_key(id), &bytes, self.record_ttl)
            .await
    }

    // --- History ---

    /// Prepend a poll's events to the stream history (newest first) and
    /// trim the oldest entries beyond `cap`.
    pub async fn push_history(
        &self,
        id: StreamId,
        events: &[ChangeEvent],
        cap: usize,
    ) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut history = self.load_history(id).await?;
        let mut updated = Vec::with_capacity(events.len() + history.len());
        updated.extend_from_slice(events);
        updated.append(&mut history);
        updated.truncate(cap);

        let bytes = serde_json::to_vec(&updated)?;
        self.kv
            .put(&Self::history_key(id), &bytes, self.record_ttl)
            .await
    }

    /// Newest-first history page, optionally filtered by event kind.
    pub async fn history(
        &self,
        id: StreamId,
        limit: usize,
        kind: Option<EventKind>,
    ) -> Result<Vec<ChangeEvent>> {
        let history = self.load_history(id).await?;
        Ok(history
            .into_iter()
            .filter(|event| kind.map_or(true, |k| event.kind == k))
            .take(limit)
            .collect())
    }

    async fn load_history(&self, id: StreamId) -> Result<Vec<ChangeEvent>> {
        match self.kv.get(&Self::history_key(id)).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    // --- Poll lock ---

    /// Create-if-absent poll lock. True when this caller now holds it.
    /// The short TTL self-expires the lock if a holder crashes mid-poll.
    pub async fn try_lock(&self, id: StreamId) -> Result<bool> {
        let holder_since = Utc::now().to_rfc3339();
        self.kv
            .put_if_absent(&Self::lock_key(id), holder_since.as_bytes(), self.lock_ttl)
            .await
    }

    pub async fn unlock(&self, id: StreamId) -> Result<()> {
        self.kv.delete(&Self::lock_key(id)).await
    }

    // --- Stream removal ---

    /// Delete every record for the stream. Idempotent.
    pub async fn delete_stream(&self, id: StreamId) -> Result<()> {
        self.kv.delete(&Self::meta_key(id)).await?;
        self.kv.delete(&Self::state_key(id)).await?;
        self.kv.delete(&Self::history_key(id)).await?;
        self.kv.delete(&Self::lock_key(id)).await
    }

    pub async fn ping(&self) -> Result<()> {
        self.kv.ping().await
    }
}
