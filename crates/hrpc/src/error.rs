//! # Error Definitions
//!
//! Every way a call can end without a value.
//!
//! All of these travel through the same single-shot completion as a successful
//! value, so a caller tells them apart only by kind.

use std::time::Duration;

/// Failure of a single call or of the connection carrying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Socket-level failure (connect, read or write).
    Transport(String),
    /// The socket was closed, locally or by the peer.
    ConnectionClosed,
    /// The peer sent a frame this client cannot follow; the stream is desynchronized.
    Protocol(String),
    /// The server reported an application-level failure.
    Remote { class: String, message: String },
    /// No response arrived before the call's deadline.
    Timeout(Duration),
    /// A parameter or a fully-read response payload failed to (de)serialize.
    Codec(hwire::Error),
}

impl Error {
    /// Whether this error leaves the connection unusable.
    ///
    /// Remote, timeout and codec failures are confined to one call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::ConnectionClosed | Self::Protocol(_))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "Transport error: {}", msg),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::Protocol(msg) => write!(f, "Protocol violation: {}", msg),
            Self::Remote { class, message } => write!(f, "Remote exception {}: {}", class, message),
            Self::Timeout(after) => write!(f, "Call timed out after {}ms", after.as_millis()),
            Self::Codec(e) => write!(f, "Codec error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<hwire::Error> for Error {
    fn from(e: hwire::Error) -> Self {
        Self::Codec(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe => Self::ConnectionClosed,
            _ => Self::Transport(e.to_string()),
        }
    }
}

/// A specialized Result type for hrpc operations.
pub type Result<T> = std::result::Result<T, Error>;
