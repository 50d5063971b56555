//! Crate-wide error type for the output transport.

use crate::task_manager::TaskError;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Resampling failed: {0}")]
    Resample(String),
    #[error("Mixer error: {0}")]
    Mixer(String),
    #[error("Image resize failed: {0}")]
    Resize(String),
    #[error("Clock error: {0}")]
    Clock(String),
    #[error("Write hook failed: {0}")]
    Write(String),
    #[error("Unable to push frame: {0}")]
    Push(String),
    #[error("Output transport has not been started")]
    NotStarted,
    #[error("Queue '{0}' is closed")]
    QueueClosed(&'static str),
    #[error(transparent)]
    Task(#[from] TaskError),
}
