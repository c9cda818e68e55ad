use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of [`Error`], used by callers to pick exit codes
/// and messages without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    NotConnected,
    Send,
    FileNotFound,
    Validation,
    Serialization,
    Decode,
    Protocol,
    Io,
}

#[derive(Debug, Error)]
pub enum Error {
    /// Endpoint could not be resolved or connected to.
    #[error("Connection to {endpoint} failed: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid endpoint {0:?}")]
    InvalidEndpoint(String),

    /// The peer answered, but the ZMTP handshake did not complete.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Session is not connected")]
    NotConnected,

    /// Outbound data could not be written within the send timeout.
    #[error("Send failed: {0}")]
    Send(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to read {}: {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid filename {0:?}")]
    InvalidFilename(String),

    #[error("Payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Reply is not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    /// Malformed ZMTP input from the peer.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection { .. } | Error::InvalidEndpoint(_) | Error::Handshake(_) => {
                ErrorKind::Connection
            }
            Error::NotConnected => ErrorKind::NotConnected,
            Error::Send(_) => ErrorKind::Send,
            Error::FileNotFound(_) => ErrorKind::FileNotFound,
            Error::FileRead { .. } | Error::InvalidFilename(_) | Error::PayloadTooLarge { .. } => {
                ErrorKind::Validation
            }
            Error::Serialization(_) => ErrorKind::Serialization,
            Error::Decode(_) => ErrorKind::Decode,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
