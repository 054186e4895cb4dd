//! Durable state for stream bookkeeping: a TTL-carrying key/value seam with
//! in-memory and Postgres backends, plus the typed per-stream facade.
//!
//! The store is the source of truth for stream recovery. In-memory
//! registries and scheduler bookkeeping are rebuildable from it.

pub mod error;
pub mod kv;
pub mod postgres;
pub mod stream_store;

pub use error::{Result, StoreError};
pub use kv::{KeyValueStore, MemoryStore};
pub use postgres::PostgresStore;
pub use stream_store::StreamStore;
