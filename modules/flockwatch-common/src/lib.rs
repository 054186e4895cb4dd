pub mod config;
pub mod error;
pub mod event;
pub mod types;

pub use config::WatchConfig;
pub use error::WatchError;
pub use event::*;
pub use types::*;
