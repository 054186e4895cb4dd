use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("unknown stream kind: {0}")]
    UnknownKind(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
