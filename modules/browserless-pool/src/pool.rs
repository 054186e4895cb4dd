use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{PoolError, Result};
use crate::session::{RenderSession, SessionFactory};

/// Capacity and age limits for the worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Hard cap on live workers.
    pub max_workers: usize,
    /// Leases per worker before the pool prefers creating another one.
    pub max_leases_per_worker: usize,
    /// Idle workers older than this are recycled on the next acquire.
    pub max_worker_age: Duration,
    /// How long `acquire` blocks before `ResourceExhausted`.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 3,
            max_leases_per_worker: 5,
            max_worker_age: Duration::from_secs(30 * 60),
            acquire_timeout: Duration::from_secs(20),
        }
    }
}

/// Point-in-time pool counters, surfaced through stream stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub workers: usize,
    pub total_leases: usize,
    pub creating: usize,
}

struct Worker {
    id: Uuid,
    session: Box<dyn RenderSession>,
    created_at: Instant,
    leases: AtomicUsize,
}

impl Worker {
    fn lease_count(&self) -> usize {
        self.leases.load(Ordering::SeqCst)
    }
}

/// RAII lease on one pooled worker. Dropping it releases the slot and wakes
/// blocked acquires.
pub struct WorkerLease {
    worker: Arc<Worker>,
    notify: Arc<Notify>,
}

impl WorkerLease {
    pub fn worker_id(&self) -> Uuid {
        self.worker.id
    }

    pub fn session(&self) -> &dyn RenderSession {
        self.worker.session.as_ref()
    }
}

// Manual impl: the session trait object has no Debug bound.
impl std::fmt::Debug for WorkerLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerLease")
            .field("worker_id", &self.worker.id)
            .finish_non_exhaustive()
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        self.worker.leases.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

enum Plan {
    Leased(WorkerLease),
    Create,
    Wait,
}

/// Bounded pool of rendering workers shared by every stream poll.
///
/// Sessions are expensive to create, so polls lease the least-loaded live
/// worker when one is under its lease cap, create a new worker while
/// capacity remains, and over-lease rather than fail when saturated.
pub struct WorkerPool {
    factory: Arc<dyn SessionFactory>,
    config: PoolConfig,
    workers: Mutex<Vec<Arc<Worker>>>,
    creating: AtomicUsize,
    notify: Arc<Notify>,
    closed: AtomicBool,
}

impl WorkerPool {
    pub fn new(factory: Arc<dyn SessionFactory>, config: PoolConfig) -> Self {
        Self {
            factory,
            config,
            workers: Mutex::new(Vec::new()),
            creating: AtomicUsize::new(0),
            notify: Arc::new(Notify::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Lease a worker, blocking up to `acquire_timeout`.
    ///
    /// Waiting only happens when the pool is momentarily empty while another
    /// task holds a creation slot; everything else resolves immediately.
    pub async fn acquire(&self) -> Result<WorkerLease> {
        let deadline = Instant::now() + self.config.acquire_timeout;

        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(PoolError::Closed);
            }

            let plan = {
                let mut workers = self.workers.lock().await;
                self.prune(&mut workers);

                let least_loaded = workers.iter().min_by_key(|w| w.lease_count()).cloned();

                match least_loaded {
                    // The lease is taken under the lock so concurrent acquires
                    // cannot both count the same free slot.
                    Some(w) if w.lease_count() < self.config.max_leases_per_worker => {
                        Plan::Leased(self.lease(w))
                    }
                    _ if workers.len() + self.creating.load(Ordering::SeqCst)
                        < self.config.max_workers =>
                    {
                        self.creating.fetch_add(1, Ordering::SeqCst);
                        Plan::Create
                    }
                    Some(w) => {
                        debug!(
                            worker_id = %w.id,
                            leases = w.lease_count(),
                            "pool saturated, over-leasing least-loaded worker"
                        );
                        Plan::Leased(self.lease(w))
                    }
                    None => Plan::Wait,
                }
            };

            match plan {
                Plan::Leased(lease) => return Ok(lease),
                Plan::Create => match self.factory.create().await {
                    Ok(session) => {
                        let worker = Arc::new(Worker {
                            id: Uuid::new_v4(),
                            session,
                            created_at: Instant::now(),
                            leases: AtomicUsize::new(0),
                        });
                        let lease = {
                            let mut workers = self.workers.lock().await;
                            workers.push(worker.clone());
                            self.lease(worker.clone())
                        };
                        self.creating.fetch_sub(1, Ordering::SeqCst);
                        self.notify.notify_waiters();
                        info!(worker_id = %worker.id, "created pool worker");
                        return Ok(lease);
                    }
                    Err(e) => {
                        // Release the reserved slot so capacity is not leaked.
                        self.creating.fetch_sub(1, Ordering::SeqCst);
                        self.notify.notify_waiters();
                        return Err(e);
                    }
                },
                Plan::Wait => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(PoolError::ResourceExhausted(self.config.acquire_timeout));
                    }
                    let _ = tokio::time::timeout(deadline - now, self.notify.notified()).await;
                }
            }
        }
    }

    fn lease(&self, worker: Arc<Worker>) -> WorkerLease {
        worker.leases.fetch_add(1, Ordering::SeqCst);
        WorkerLease {
            worker,
            notify: self.notify.clone(),
        }
    }

    fn prune(&self, workers: &mut Vec<Arc<Worker>>) {
        workers.retain(|w| {
            if !w.session.is_connected() {
                warn!(worker_id = %w.id, "dropping disconnected worker");
                return false;
            }
            if w.lease_count() == 0 && w.created_at.elapsed() > self.config.max_worker_age {
                debug!(worker_id = %w.id, "recycling aged idle worker");
                return false;
            }
            true
        });
    }

    /// True while a connected worker exists or capacity remains to create one.
    pub async fn is_usable(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let mut workers = self.workers.lock().await;
        self.prune(&mut workers);
        !workers.is_empty()
            || workers.len() + self.creating.load(Ordering::SeqCst) < self.config.max_workers
    }

    pub async fn stats(&self) -> PoolStats {
        let workers = self.workers.lock().await;
        PoolStats {
            workers: workers.len(),
            total_leases: workers.iter().map(|w| w.lease_count()).sum(),
            creating: self.creating.load(Ordering::SeqCst),
        }
    }

    /// Close every session and refuse further acquires.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<Arc<Worker>> = {
            let mut workers = self.workers.lock().await;
            workers.drain(..).collect()
        };
        for worker in drained {
            if let Err(e) = worker.session.close().await {
                warn!(worker_id = %worker.id, error = %e, "failed to close session");
            }
        }
        self.notify.notify_waiters();
    }
}
