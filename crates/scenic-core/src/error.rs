//! Error types shared across the viewer.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// A caller passed an argument that violates a precondition
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The receiving side of a dispatcher or worker has gone away
    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    /// A background worker could not be started
    #[error("Worker error: {0}")]
    Worker(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
