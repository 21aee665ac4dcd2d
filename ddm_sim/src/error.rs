//! Harness errors.

use ddm_core::DdError;
use ddm_env::ChannelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Engine error: {0}")]
    Engine(#[from] DdError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unreadable or inconsistent configuration file
    #[error("Config error: {0}")]
    Config(String),

    /// A worker thread panicked instead of returning
    #[error("Worker {0} panicked")]
    WorkerPanicked(i32),
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<serde_json::Error> for SimError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}
