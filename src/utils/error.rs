use std::io::Error as IoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Muxer error: {0}")]
    Muxer(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Closed: {0}")]
    Closed(String),
}

impl Error {
    /// Create an IO error from message
    pub fn io(msg: impl Into<String>) -> Self {
        Error::Io(IoError::other(msg.into()))
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Error::Connection(msg.into())
    }

    /// Create a stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    /// Create a muxer error
    pub fn muxer(msg: impl Into<String>) -> Self {
        Error::Muxer(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Error::Timeout(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a closed error
    pub fn closed(msg: impl Into<String>) -> Self {
        Error::Closed(msg.into())
    }

    /// Whether the error means the peer or transport is gone for good
    pub fn is_terminal(&self) -> bool {
        match self {
            Error::Closed(_) => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
