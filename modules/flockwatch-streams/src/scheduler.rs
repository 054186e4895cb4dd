use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};

use flockwatch_common::StreamId;

/// Receives job fires. Implemented by the stream manager.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run_job(&self, id: StreamId) -> anyhow::Result<()>;
}

/// Repeating per-stream jobs keyed by stream id.
///
/// The scheduler itself keeps no durable state; crash recovery re-registers
/// jobs from the store on startup.
#[async_trait]
pub trait DurableScheduler: Send + Sync {
    /// Register a repeating job, replacing any existing job for this id.
    async fn register(&self, id: StreamId, cadence_ms: u64) -> anyhow::Result<()>;

    /// Remove the job. Idempotent.
    async fn deregister(&self, id: StreamId) -> anyhow::Result<()>;

    async fn is_registered(&self, id: StreamId) -> bool;

    /// Fire the job once, now, without touching its schedule.
    async fn trigger_now(&self, id: StreamId) -> anyhow::Result<()>;

    /// Abort every job.
    async fn shutdown(&self);
}

/// Tokio-task backed scheduler: one timer task per registered stream, with a
/// semaphore bounding how many job bodies run at once.
///
/// Holds the handler weakly so the manager (which owns the scheduler) can be
/// dropped; timer tasks exit once the handler is gone.
pub struct TokioScheduler {
    jobs: Mutex<HashMap<StreamId, JoinHandle<()>>>,
    handler: OnceLock<Weak<dyn JobHandler>>,
    semaphore: Arc<Semaphore>,
}

impl TokioScheduler {
    pub fn new(concurrency: usize) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            handler: OnceLock::new(),
            semaphore: Arc::new(Semaphore::new(concurrency)),
        }
    }

    /// Wire in the job handler. Called once, right after construction.
    pub fn attach(&self, handler: Weak<dyn JobHandler>) {
        let _ = self.handler.set(handler);
    }

    fn handler(&self) -> anyhow::Result<Weak<dyn JobHandler>> {
        self.handler
            .get()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no job handler attached"))
    }
}

#[async_trait]
impl DurableScheduler for TokioScheduler {
    async fn register(&self, id: StreamId, cadence_ms: u64) -> anyhow::Result<()> {
        let handler = self.handler()?;
        let semaphore = self.semaphore.clone();

        let handle = tokio::spawn(async move {
            // interval panics on a zero period
            let mut timer = interval(Duration::from_millis(cadence_ms.max(1)));
            // Skip the immediate tick; creation already runs one poll out of band
            timer.tick().await;
            loop {
                timer.tick().await;
                let Some(handler) = handler.upgrade() else {
                    debug!(stream_id = %id, "handler gone, ending job");
                    break;
                };
                let Ok(_permit) = semaphore.acquire().await else {
                    break;
                };
                if let Err(e) = handler.run_job(id).await {
                    warn!(stream_id = %id, error = %e, "scheduled poll failed");
                }
            }
        });

        let mut jobs = self.jobs.lock().await;
        if let Some(old) = jobs.insert(id, handle) {
            old.abort();
        }
        Ok(())
    }

    async fn deregister(&self, id: StreamId) -> anyhow::Result<()> {
        if let Some(handle) = self.jobs.lock().await.remove(&id) {
            handle.abort();
        }
        Ok(())
    }

    async fn is_registered(&self, id: StreamId) -> bool {
        self.jobs
            .lock()
            .await
            .get(&id)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    async fn trigger_now(&self, id: StreamId) -> anyhow::Result<()> {
        let handler = self.handler()?;
        let semaphore = self.semaphore.clone();
        tokio::spawn(async move {
            let Some(handler) = handler.upgrade() else {
                return;
            };
            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };
            if let Err(e) = handler.run_job(id).await {
                warn!(stream_id = %id, error = %e, "triggered poll failed");
            }
        });
        Ok(())
    }

    async fn shutdown(&self) {
        let mut jobs = self.jobs.lock().await;
        for (_, handle) in jobs.drain() {
            handle.abort();
        }
    }
}
