use std::env;
use std::time::Duration;

/// Runtime tuning for the streaming core, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    // Browserless
    pub browserless_url: String,
    pub browserless_token: Option<String>,

    // Cadence bounds (milliseconds)
    pub min_cadence_ms: u64,
    pub max_cadence_ms: u64,

    // Store TTLs: lock_ttl bounds one in-flight poll, record_ttl is the
    // self-expiry safety net for orphaned stream bookkeeping
    pub lock_ttl: Duration,
    pub record_ttl: Duration,

    // Bounded memory
    pub history_cap: usize,
    pub seen_cap: usize,

    // Failure handling
    pub max_consecutive_errors: u32,
    pub backoff_ceiling_ms: u64,

    // Worker pool
    pub max_workers: usize,
    pub max_leases_per_worker: usize,
    pub max_worker_age: Duration,
    pub acquire_timeout: Duration,

    // Poll jobs in flight at once, matched to worker pool capacity
    pub poll_concurrency: usize,
}

impl WatchConfig {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing or malformed.
    pub fn from_env() -> Self {
        Self {
            browserless_url: required_env("BROWSERLESS_URL"),
            browserless_token: env::var("BROWSERLESS_TOKEN").ok(),
            min_cadence_ms: parsed_env("FLOCKWATCH_MIN_CADENCE_MS", 30_000),
            max_cadence_ms: parsed_env("FLOCKWATCH_MAX_CADENCE_MS", 86_400_000),
            lock_ttl: Duration::from_secs(parsed_env("FLOCKWATCH_LOCK_TTL_SECS", 30)),
            record_ttl: Duration::from_secs(parsed_env(
                "FLOCKWATCH_RECORD_TTL_SECS",
                7 * 24 * 3600,
            )),
            history_cap: parsed_env("FLOCKWATCH_HISTORY_CAP", 100),
            seen_cap: parsed_env("FLOCKWATCH_SEEN_CAP", 500),
            max_consecutive_errors: parsed_env("FLOCKWATCH_MAX_CONSECUTIVE_ERRORS", 10),
            backoff_ceiling_ms: parsed_env("FLOCKWATCH_BACKOFF_CEILING_MS", 1_800_000),
            max_workers: parsed_env("FLOCKWATCH_MAX_WORKERS", 3),
            max_leases_per_worker: parsed_env("FLOCKWATCH_MAX_LEASES_PER_WORKER", 5),
            max_worker_age: Duration::from_secs(parsed_env(
                "FLOCKWATCH_MAX_WORKER_AGE_SECS",
                1800,
            )),
            acquire_timeout: Duration::from_secs(parsed_env(
                "FLOCKWATCH_ACQUIRE_TIMEOUT_SECS",
                20,
            )),
            poll_concurrency: parsed_env("FLOCKWATCH_POLL_CONCURRENCY", 3),
        }
    }

    /// Clamp a requested cadence into the configured bounds.
    pub fn clamp_cadence(&self, cadence_ms: u64) -> u64 {
        cadence_ms.clamp(self.min_cadence_ms, self.max_cadence_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            browserless_url: "http://localhost:3000".to_string(),
            browserless_token: None,
            min_cadence_ms: 30_000,
            max_cadence_ms: 86_400_000,
            lock_ttl: Duration::from_secs(30),
            record_ttl: Duration::from_secs(7 * 24 * 3600),
            history_cap: 100,
            seen_cap: 500,
            max_consecutive_errors: 10,
            backoff_ceiling_ms: 1_800_000,
            max_workers: 3,
            max_leases_per_worker: 5,
            max_worker_age: Duration::from_secs(1800),
            acquire_timeout: Duration::from_secs(20),
            poll_concurrency: 3,
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number")),
        Err(_) => default,
    }
}
