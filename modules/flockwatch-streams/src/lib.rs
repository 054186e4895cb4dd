//! The streaming core: stream lifecycle, durable cadence scheduling, and
//! the poll executors that turn rendered pages into change events.
//!
//! A [`StreamManager`] owns everything. Each stream is polled on its own
//! cadence through a store-backed lock that keeps polls from overlapping,
//! diffs the fresh fetch against the last persisted snapshot, and publishes
//! whatever changed. Failures back off exponentially and a stream that
//! fails too many times in a row stops itself.

pub mod error;
pub mod executor;
pub mod manager;
pub mod registry;
pub mod scheduler;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::{Result, StreamError};
pub use executor::{Extractor, PollOutcome};
pub use manager::{StreamManager, StreamStats};
pub use registry::StreamRegistry;
pub use scheduler::{DurableScheduler, JobHandler, TokioScheduler};
