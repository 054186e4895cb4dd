//! Live delivery of change events to per-stream and global subscriber
//! groups. Delivery is best effort; the persisted history is the durable
//! record.

pub mod bus;
pub mod publisher;

pub use bus::EventBus;
pub use publisher::{topics, NoopPublisher, Publisher};
