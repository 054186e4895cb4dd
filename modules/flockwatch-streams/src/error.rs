use thiserror::Error;

use flockwatch_common::{StreamId, StreamKind, StreamStatus};
use flockwatch_store::StoreError;

pub type Result<T> = std::result::Result<T, StreamError>;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("unknown stream: {0}")]
    UnknownStream(StreamId),

    #[error("an active {kind} stream for {target} already exists")]
    DuplicateStream { kind: StreamKind, target: String },

    #[error("cannot {action} a stream in status {from}")]
    InvalidTransition {
        from: StreamStatus,
        action: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("scheduler error: {0}")]
    Scheduler(String),
}
