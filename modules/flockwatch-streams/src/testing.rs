//! Test doubles and wiring helpers for exercising the streaming core
//! without a browser or an external store.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;

use browserless_pool::testing::MockFactory;
use browserless_pool::{PoolConfig, RenderSession, WorkerPool};
use flockwatch_common::{FollowerSnapshot, PostItem, StreamId, StreamStatus, WatchConfig};
use flockwatch_events::EventBus;
use flockwatch_store::{KeyValueStore, MemoryStore, StreamStore};

use crate::executor::Extractor;
use crate::manager::StreamManager;
use crate::scheduler::{JobHandler, TokioScheduler};

// ---------------------------------------------------------------
// Mock extractor
// ---------------------------------------------------------------

type Script<T> = VecDeque<Result<T, String>>;

/// Extractor whose answers are scripted per target. Steps for a target are
/// consumed in order; the last step sticks, so a steady state needs only
/// one entry. Targets with no script fail loudly.
pub struct MockExtractor {
    timelines: Mutex<HashMap<String, Script<Vec<PostItem>>>>,
    mentions: Mutex<HashMap<String, Script<Vec<PostItem>>>>,
    counts: Mutex<HashMap<String, Script<Option<u64>>>>,
    followers: Mutex<HashMap<String, Script<FollowerSnapshot>>>,
    fail_all: AtomicBool,
    delay: Option<Duration>,
    timeline_calls: AtomicUsize,
    mention_calls: AtomicUsize,
    count_calls: AtomicUsize,
    follower_calls: AtomicUsize,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self {
            timelines: Mutex::new(HashMap::new()),
            mentions: Mutex::new(HashMap::new()),
            counts: Mutex::new(HashMap::new()),
            followers: Mutex::new(HashMap::new()),
            fail_all: AtomicBool::new(false),
            delay: None,
            timeline_calls: AtomicUsize::new(0),
            mention_calls: AtomicUsize::new(0),
            count_calls: AtomicUsize::new(0),
            follower_calls: AtomicUsize::new(0),
        }
    }

    pub fn on_timeline(self, target: &str, items: Vec<PostItem>) -> Self {
        push(&self.timelines, target, Ok(items));
        self
    }

    pub fn on_timeline_error(self, target: &str, message: &str) -> Self {
        push(&self.timelines, target, Err(message.to_string()));
        self
    }

    pub fn on_mentions(self, target: &str, items: Vec<PostItem>) -> Self {
        push(&self.mentions, target, Ok(items));
        self
    }

    pub fn on_mentions_error(self, target: &str, message: &str) -> Self {
        push(&self.mentions, target, Err(message.to_string()));
        self
    }

    pub fn on_count(self, target: &str, count: Option<u64>) -> Self {
        push(&self.counts, target, Ok(count));
        self
    }

    pub fn on_count_error(self, target: &str, message: &str) -> Self {
        push(&self.counts, target, Err(message.to_string()));
        self
    }

    pub fn on_followers(self, target: &str, snapshot: FollowerSnapshot) -> Self {
        push(&self.followers, target, Ok(snapshot));
        self
    }

    pub fn on_followers_error(self, target: &str, message: &str) -> Self {
        push(&self.followers, target, Err(message.to_string()));
        self
    }

    /// Every call fails, regardless of scripts.
    pub fn failing(self) -> Self {
        self.fail_all.store(true, Ordering::SeqCst);
        self
    }

    /// Sleep this long inside every call, to hold polls in flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn timeline_calls(&self) -> usize {
        self.timeline_calls.load(Ordering::SeqCst)
    }

    pub fn mention_calls(&self) -> usize {
        self.mention_calls.load(Ordering::SeqCst)
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    pub fn follower_calls(&self) -> usize {
        self.follower_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_fail_all(&self, target: &str) -> anyhow::Result<()> {
        if self.fail_all.load(Ordering::SeqCst) {
            anyhow::bail!("MockExtractor: forced failure for {target}");
        }
        Ok(())
    }
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn push<T>(map: &Mutex<HashMap<String, Script<T>>>, target: &str, step: Result<T, String>) {
    map.lock()
        .unwrap()
        .entry(target.to_string())
        .or_default()
        .push_back(step);
}

fn take<T: Clone>(
    map: &Mutex<HashMap<String, Script<T>>>,
    target: &str,
    what: &str,
) -> anyhow::Result<T> {
    let mut map = map.lock().unwrap();
    let step = match map.get_mut(target) {
        Some(queue) if queue.len() > 1 => queue.pop_front(),
        Some(queue) => queue.front().cloned(),
        None => None,
    };
    match step {
        Some(Ok(value)) => Ok(value),
        Some(Err(message)) => Err(anyhow::anyhow!(message)),
        None => anyhow::bail!("MockExtractor: no {what} scripted for {target}"),
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    async fn timeline(
        &self,
        _session: &dyn RenderSession,
        target: &str,
    ) -> anyhow::Result<Vec<PostItem>> {
        self.timeline_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.check_fail_all(target)?;
        take(&self.timelines, target, "timeline")
    }

    async fn mentions(
        &self,
        _session: &dyn RenderSession,
        target: &str,
    ) -> anyhow::Result<Vec<PostItem>> {
        self.mention_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.check_fail_all(target)?;
        take(&self.mentions, target, "mentions")
    }

    async fn follower_count(
        &self,
        _session: &dyn RenderSession,
        target: &str,
    ) -> anyhow::Result<Option<u64>> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.check_fail_all(target)?;
        take(&self.counts, target, "count")
    }

    async fn followers(
        &self,
        _session: &dyn RenderSession,
        target: &str,
    ) -> anyhow::Result<FollowerSnapshot> {
        self.follower_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.check_fail_all(target)?;
        take(&self.followers, target, "followers")
    }
}

// ---------------------------------------------------------------
// Fixture helpers
// ---------------------------------------------------------------

pub fn post(id: &str, author: &str, text: &str) -> PostItem {
    PostItem {
        id: id.to_string(),
        author: author.to_string(),
        text: text.to_string(),
        url: format!("https://x.com/{author}/status/{id}"),
        posted_at: None,
    }
}

pub fn snapshot(total: Option<u64>, handles: &[&str]) -> FollowerSnapshot {
    FollowerSnapshot {
        total,
        handles: handles.iter().map(|h| h.to_string()).collect(),
    }
}

// ---------------------------------------------------------------
// Harness
// ---------------------------------------------------------------

/// A fully wired streaming core over in-memory fakes.
pub struct TestHarness {
    pub manager: Arc<StreamManager>,
    pub scheduler: Arc<TokioScheduler>,
    pub bus: Arc<EventBus>,
    pub extractor: Arc<MockExtractor>,
    pub store: StreamStore,
    pub pool: Arc<WorkerPool>,
}

/// Fast cadences and short timeouts so tests finish quickly.
pub fn test_config() -> WatchConfig {
    WatchConfig {
        min_cadence_ms: 10,
        lock_ttl: Duration::from_secs(5),
        record_ttl: Duration::from_secs(3600),
        max_workers: 2,
        max_leases_per_worker: 4,
        acquire_timeout: Duration::from_millis(200),
        poll_concurrency: 4,
        ..WatchConfig::default()
    }
}

pub fn harness(extractor: MockExtractor) -> TestHarness {
    harness_with_config(test_config(), extractor)
}

pub fn harness_with_config(config: WatchConfig, extractor: MockExtractor) -> TestHarness {
    build_harness(
        config,
        extractor,
        Arc::new(MemoryStore::new()),
        Arc::new(MockFactory::new()),
    )
}

pub fn build_harness(
    config: WatchConfig,
    extractor: MockExtractor,
    kv: Arc<dyn KeyValueStore>,
    factory: Arc<MockFactory>,
) -> TestHarness {
    // RUST_LOG-controlled output for debugging test runs; first caller wins
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let store = StreamStore::new(kv, config.record_ttl, config.lock_ttl);
    let pool = Arc::new(WorkerPool::new(
        factory,
        PoolConfig {
            max_workers: config.max_workers,
            max_leases_per_worker: config.max_leases_per_worker,
            max_worker_age: config.max_worker_age,
            acquire_timeout: config.acquire_timeout,
        },
    ));
    let bus = Arc::new(EventBus::new(64));
    let scheduler = Arc::new(TokioScheduler::new(config.poll_concurrency));
    let extractor = Arc::new(extractor);

    let manager = Arc::new(StreamManager::new(
        config,
        store.clone(),
        scheduler.clone(),
        pool.clone(),
        extractor.clone(),
        bus.clone(),
    ));
    let handler: Weak<dyn JobHandler> = Arc::<StreamManager>::downgrade(&manager);
    scheduler.attach(handler);

    TestHarness {
        manager,
        scheduler,
        bus,
        extractor,
        store,
        pool,
    }
}

/// Block until the stream has recorded at least `n` poll attempts.
pub async fn wait_for_polls(manager: &StreamManager, id: StreamId, n: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if let Ok(meta) = manager.get_status(id).await {
            if meta.poll_count >= n {
                return;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {n} poll(s) on stream {id}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Block until the stream reaches the given status.
pub async fn wait_for_status(manager: &StreamManager, id: StreamId, status: StreamStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if let Ok(meta) = manager.get_status(id).await {
            if meta.status == status {
                return;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for stream {id} to reach {status}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
