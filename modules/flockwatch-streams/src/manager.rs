use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use browserless_pool::{PoolStats, WorkerPool};
use flockwatch_common::{
    ChangeEvent, EventKind, StreamId, StreamKind, StreamMeta, StreamState, StreamStatus,
    WatchConfig,
};
use flockwatch_events::{topics, Publisher};
use flockwatch_store::StreamStore;

use crate::error::{Result, StreamError};
use crate::executor::{self, Extractor};
use crate::registry::StreamRegistry;
use crate::scheduler::{DurableScheduler, JobHandler};

/// Owns the stream lifecycle and runs every poll.
///
/// Wiring: construct, wrap in `Arc`, attach the downgraded handle to the
/// scheduler, then call [`StreamManager::restore`] to pick up streams left
/// behind by a previous process.
///
/// The store is the source of truth; the registry is a read cache kept
/// warm by every write and re-filled lazily from store scans.
pub struct StreamManager {
    config: WatchConfig,
    store: StreamStore,
    registry: StreamRegistry,
    scheduler: Arc<dyn DurableScheduler>,
    pool: Arc<WorkerPool>,
    extractor: Arc<dyn Extractor>,
    publisher: Arc<dyn Publisher>,
    lock_contentions: AtomicU64,
}

/// Point-in-time operational counters.
#[derive(Debug, Clone)]
pub struct StreamStats {
    pub total: usize,
    pub running: usize,
    pub paused: usize,
    pub backoff: usize,
    pub stopped: usize,
    pub lock_contentions: u64,
    pub pool: PoolStats,
}

impl StreamManager {
    pub fn new(
        config: WatchConfig,
        store: StreamStore,
        scheduler: Arc<dyn DurableScheduler>,
        pool: Arc<WorkerPool>,
        extractor: Arc<dyn Extractor>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            config,
            store,
            registry: StreamRegistry::new(),
            scheduler,
            pool,
            extractor,
            publisher,
            lock_contentions: AtomicU64::new(0),
        }
    }

    // --- Lifecycle ---

    /// Create a stream and schedule it. The cadence is clamped into bounds,
    /// the first poll fires immediately, and at most one non-stopped stream
    /// may exist per (kind, target).
    pub async fn create(
        &self,
        kind: StreamKind,
        target: &str,
        cadence_ms: u64,
    ) -> Result<StreamMeta> {
        let cadence_ms = self.config.clamp_cadence(cadence_ms);

        // Streams created by a previous process count toward uniqueness too
        let _ = self.sync_from_store().await;
        if self.registry.find_active(kind, target).await.is_some() {
            return Err(StreamError::DuplicateStream {
                kind,
                target: target.to_string(),
            });
        }

        let meta = StreamMeta::new(kind, target, cadence_ms);
        self.store.put_meta(&meta).await?;
        self.store
            .put_state(meta.id, &StreamState::empty_for(kind))
            .await?;
        self.registry.insert(meta.clone()).await;

        self.scheduler
            .register(meta.id, cadence_ms)
            .await
            .map_err(|e| StreamError::Scheduler(e.to_string()))?;
        if let Err(e) = self.scheduler.trigger_now(meta.id).await {
            warn!(stream_id = %meta.id, error = %e, "failed to trigger initial poll");
        }

        info!(stream_id = %meta.id, kind = %kind, target, cadence_ms, "stream created");
        Ok(meta)
    }

    /// Stop a stream and delete every record of it. Idempotent: stopping an
    /// unknown or already-stopped stream succeeds.
    pub async fn stop(&self, id: StreamId) -> Result<()> {
        if let Err(e) = self.scheduler.deregister(id).await {
            warn!(stream_id = %id, error = %e, "failed to deregister job");
        }
        self.store.delete_stream(id).await?;
        self.registry.remove(id).await;
        info!(stream_id = %id, "stream stopped");
        Ok(())
    }

    /// Suspend polling but keep every record, so the stream resumes where
    /// it left off with no replayed events.
    pub async fn pause(&self, id: StreamId) -> Result<StreamMeta> {
        let mut meta = self.load_meta(id).await?;
        if !matches!(meta.status, StreamStatus::Running | StreamStatus::Backoff) {
            return Err(StreamError::InvalidTransition {
                from: meta.status,
                action: "pause",
            });
        }

        if let Err(e) = self.scheduler.deregister(id).await {
            warn!(stream_id = %id, error = %e, "failed to deregister job");
        }
        meta.status = StreamStatus::Paused;
        self.store.put_meta(&meta).await?;
        self.registry.insert(meta.clone()).await;
        info!(stream_id = %id, "stream paused");
        Ok(meta)
    }

    /// Resume a paused or auto-stopped stream with a clean error slate.
    pub async fn resume(&self, id: StreamId) -> Result<StreamMeta> {
        let mut meta = self.load_meta(id).await?;
        if !matches!(meta.status, StreamStatus::Paused | StreamStatus::Stopped) {
            return Err(StreamError::InvalidTransition {
                from: meta.status,
                action: "resume",
            });
        }

        meta.status = StreamStatus::Running;
        meta.consecutive_errors = 0;
        meta.backoff_until = None;
        meta.last_error = None;
        self.store.put_meta(&meta).await?;
        self.registry.insert(meta.clone()).await;

        self.scheduler
            .register(id, meta.cadence_ms)
            .await
            .map_err(|e| StreamError::Scheduler(e.to_string()))?;
        if let Err(e) = self.scheduler.trigger_now(id).await {
            warn!(stream_id = %id, error = %e, "failed to trigger resume poll");
        }

        info!(stream_id = %id, "stream resumed");
        Ok(meta)
    }

    /// Change the poll cadence, clamped into bounds. Takes effect on the
    /// next schedule; a stream mid-backoff keeps its current wait.
    pub async fn update_cadence(&self, id: StreamId, cadence_ms: u64) -> Result<StreamMeta> {
        let cadence_ms = self.config.clamp_cadence(cadence_ms);
        let mut meta = self.load_meta(id).await?;
        if meta.cadence_ms == cadence_ms {
            return Ok(meta);
        }

        meta.cadence_ms = cadence_ms;
        self.store.put_meta(&meta).await?;
        self.registry.insert(meta.clone()).await;
        if matches!(meta.status, StreamStatus::Running | StreamStatus::Backoff) {
            self.scheduler
                .register(id, cadence_ms)
                .await
                .map_err(|e| StreamError::Scheduler(e.to_string()))?;
        }

        info!(stream_id = %id, cadence_ms, "stream cadence updated");
        Ok(meta)
    }

    // --- Introspection ---

    pub async fn list(&self) -> Vec<StreamMeta> {
        if let Err(e) = self.sync_from_store().await {
            warn!(error = %e, "store scan failed, serving registry snapshot");
        }
        self.registry.all().await
    }

    pub async fn get_status(&self, id: StreamId) -> Result<StreamMeta> {
        self.load_meta(id).await
    }

    /// Newest-first slice of the stream's persisted events.
    pub async fn get_history(
        &self,
        id: StreamId,
        limit: usize,
        kind: Option<EventKind>,
    ) -> Result<Vec<ChangeEvent>> {
        self.load_meta(id).await?;
        Ok(self.store.history(id, limit, kind).await?)
    }

    pub async fn get_stats(&self) -> StreamStats {
        let metas = self.registry.all().await;
        let mut stats = StreamStats {
            total: metas.len(),
            running: 0,
            paused: 0,
            backoff: 0,
            stopped: 0,
            lock_contentions: self.lock_contentions.load(Ordering::Relaxed),
            pool: self.pool.stats().await,
        };
        for meta in &metas {
            match meta.status {
                StreamStatus::Running => stats.running += 1,
                StreamStatus::Paused => stats.paused += 1,
                StreamStatus::Backoff => stats.backoff += 1,
                StreamStatus::Stopped => stats.stopped += 1,
            }
        }
        stats
    }

    /// Healthy means the store answers and the pool can still serve a lease.
    pub async fn is_healthy(&self) -> bool {
        let store_ok = match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "store ping failed");
                false
            }
        };
        store_ok && self.pool.is_usable().await
    }

    /// Re-register jobs for every running or backed-off stream found in the
    /// store. Returns how many jobs were restored.
    pub async fn restore(&self) -> Result<usize> {
        let restored = self.sync_from_store().await?;
        info!(restored, "stream jobs restored from store");
        Ok(restored)
    }

    // --- Internals ---

    /// Fold store records into the registry and make sure every stream that
    /// should be polling has a job. Never overwrites a registry entry; local
    /// writes may be newer than the store copy read at scan start.
    async fn sync_from_store(&self) -> Result<usize> {
        let metas = self.store.all_metas().await?;
        let mut restored = 0;
        for meta in metas {
            let id = meta.id;
            let cadence_ms = meta.cadence_ms;
            let should_poll =
                matches!(meta.status, StreamStatus::Running | StreamStatus::Backoff);
            if self.registry.get(id).await.is_none() {
                self.registry.insert(meta).await;
            }
            if should_poll && !self.scheduler.is_registered(id).await {
                self.scheduler
                    .register(id, cadence_ms)
                    .await
                    .map_err(|e| StreamError::Scheduler(e.to_string()))?;
                restored += 1;
            }
        }
        Ok(restored)
    }

    async fn load_meta(&self, id: StreamId) -> Result<StreamMeta> {
        match self.store.get_meta(id).await {
            Ok(Some(meta)) => Ok(meta),
            Ok(None) => Err(StreamError::UnknownStream(id)),
            Err(e) => {
                warn!(stream_id = %id, error = %e, "meta read failed, falling back to registry");
                self.registry
                    .get(id)
                    .await
                    .ok_or(StreamError::UnknownStream(id))
            }
        }
    }

    async fn poll_locked(&self, id: StreamId) -> anyhow::Result<()> {
        let Some(meta) = self.store.get_meta(id).await.context("meta load failed")? else {
            debug!(stream_id = %id, "no meta for scheduled poll, skipping");
            return Ok(());
        };
        match meta.status {
            StreamStatus::Paused | StreamStatus::Stopped => return Ok(()),
            StreamStatus::Backoff => {
                if meta.backoff_until.map_or(false, |until| until > Utc::now()) {
                    debug!(stream_id = %id, "stream in backoff, skipping poll");
                    return Ok(());
                }
            }
            StreamStatus::Running => {}
        }

        match self.poll_once(&meta).await {
            Ok(events) => self.record_success(&meta, events).await,
            Err(e) => {
                let chain = format!("{e:#}");
                warn!(stream_id = %id, error = %chain, "poll failed");
                self.record_failure(&meta, chain).await
            }
        }
    }

    async fn poll_once(&self, meta: &StreamMeta) -> anyhow::Result<usize> {
        let state = self
            .store
            .get_state(meta.id)
            .await
            .context("state load failed")?
            .unwrap_or_else(|| StreamState::empty_for(meta.kind));

        let lease = self
            .pool
            .acquire()
            .await
            .context("worker acquisition failed")?;
        let outcome = match meta.kind {
            StreamKind::Timeline => {
                executor::poll_timeline(
                    self.extractor.as_ref(),
                    lease.session(),
                    meta,
                    &state,
                    self.config.seen_cap,
                )
                .await?
            }
            StreamKind::Mention => {
                executor::poll_mentions(
                    self.extractor.as_ref(),
                    lease.session(),
                    meta,
                    &state,
                    self.config.seen_cap,
                )
                .await?
            }
            StreamKind::Relationship => {
                executor::poll_relationship(self.extractor.as_ref(), lease.session(), meta, &state)
                    .await?
            }
        };
        drop(lease);

        // The operator may have stopped the stream while the poll ran
        if self
            .store
            .get_meta(meta.id)
            .await
            .context("meta reload failed")?
            .is_none()
        {
            debug!(stream_id = %meta.id, "stream stopped mid-poll, discarding result");
            return Ok(0);
        }

        if let Some(state) = &outcome.new_state {
            self.store
                .put_state(meta.id, state)
                .await
                .context("state write failed")?;
        }
        if !outcome.events.is_empty() {
            self.store
                .push_history(meta.id, &outcome.events, self.config.history_cap)
                .await
                .context("history write failed")?;

            let stream_topic = topics::stream(meta.id);
            for event in &outcome.events {
                if let Err(e) = self.publisher.publish(&stream_topic, event).await {
                    warn!(stream_id = %meta.id, error = %e, "event publish failed");
                }
                if let Err(e) = self.publisher.publish(topics::GLOBAL, event).await {
                    warn!(stream_id = %meta.id, error = %e, "event publish failed");
                }
            }
            debug!(
                stream_id = %meta.id,
                events = outcome.events.len(),
                "poll produced events"
            );
        }
        Ok(outcome.events.len())
    }

    async fn record_success(&self, meta: &StreamMeta, events: usize) -> anyhow::Result<()> {
        let Some(mut fresh) = self
            .store
            .get_meta(meta.id)
            .await
            .context("meta reload failed")?
        else {
            return Ok(());
        };

        // A pause that landed mid-poll wins over the success transition
        if matches!(fresh.status, StreamStatus::Running | StreamStatus::Backoff) {
            fresh.status = StreamStatus::Running;
            fresh.consecutive_errors = 0;
            fresh.backoff_until = None;
            fresh.last_error = None;
        }
        fresh.last_poll_at = Some(Utc::now());
        fresh.poll_count += 1;
        fresh.event_count += events as u64;

        self.store
            .put_meta(&fresh)
            .await
            .context("meta write failed")?;
        self.registry.insert(fresh).await;
        Ok(())
    }

    async fn record_failure(&self, meta: &StreamMeta, chain: String) -> anyhow::Result<()> {
        let Some(mut fresh) = self
            .store
            .get_meta(meta.id)
            .await
            .context("meta reload failed")?
        else {
            return Ok(());
        };

        fresh.last_poll_at = Some(Utc::now());
        fresh.poll_count += 1;
        fresh.error_count += 1;
        fresh.consecutive_errors += 1;
        fresh.last_error = Some(chain);

        if matches!(fresh.status, StreamStatus::Running | StreamStatus::Backoff) {
            if fresh.consecutive_errors >= self.config.max_consecutive_errors {
                fresh.status = StreamStatus::Stopped;
                fresh.backoff_until = None;
                if let Err(e) = self.scheduler.deregister(fresh.id).await {
                    warn!(stream_id = %fresh.id, error = %e, "failed to deregister auto-stopped job");
                }
                warn!(
                    stream_id = %fresh.id,
                    consecutive_errors = fresh.consecutive_errors,
                    "stream auto-stopped after repeated failures"
                );
            } else {
                let delay_ms = backoff_delay_ms(
                    fresh.cadence_ms,
                    fresh.consecutive_errors,
                    self.config.backoff_ceiling_ms,
                );
                fresh.status = StreamStatus::Backoff;
                fresh.backoff_until =
                    Some(Utc::now() + chrono::Duration::milliseconds(delay_ms as i64));
                debug!(
                    stream_id = %fresh.id,
                    delay_ms,
                    consecutive_errors = fresh.consecutive_errors,
                    "stream entering backoff"
                );
            }
        }

        self.store
            .put_meta(&fresh)
            .await
            .context("meta write failed")?;
        self.registry.insert(fresh).await;
        Ok(())
    }
}

#[async_trait]
impl JobHandler for StreamManager {
    /// One poll attempt. The store lock keeps polls for the same stream from
    /// overlapping across processes; contended fires are skipped, not queued.
    async fn run_job(&self, id: StreamId) -> anyhow::Result<()> {
        if !self
            .store
            .try_lock(id)
            .await
            .context("lock acquisition failed")?
        {
            self.lock_contentions.fetch_add(1, Ordering::Relaxed);
            debug!(stream_id = %id, "poll already in flight, skipping");
            return Ok(());
        }

        let result = self.poll_locked(id).await;
        if let Err(e) = self.store.unlock(id).await {
            warn!(stream_id = %id, error = %e, "failed to release poll lock");
        }
        result
    }
}

/// Delay before the next attempt after the n-th consecutive failure:
/// cadence * 2^n, capped at the ceiling.
fn backoff_delay_ms(cadence_ms: u64, consecutive_errors: u32, ceiling_ms: u64) -> u64 {
    let factor = 2u64.checked_pow(consecutive_errors).unwrap_or(u64::MAX);
    cadence_ms.saturating_mul(factor).min(ceiling_ms)
}
