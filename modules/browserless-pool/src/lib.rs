//! Bounded pool of expensive rendering workers.
//!
//! Rendering sessions are slow to create and memory-hungry, so stream polls
//! lease one from a shared pool instead of owning one. The pool caps live
//! workers and leases per worker, recycles aged idle workers, prunes
//! disconnected ones, and over-leases rather than fails when saturated.
//! `acquire` blocks a bounded time and then reports `ResourceExhausted`,
//! which callers treat as a transient poll failure.

pub mod error;
pub mod pool;
pub mod session;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::{PoolError, Result};
pub use pool::{PoolConfig, PoolStats, WorkerLease, WorkerPool};
pub use session::{BrowserlessFactory, BrowserlessSession, RenderSession, SessionFactory};
