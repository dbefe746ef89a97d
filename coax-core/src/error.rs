//! Error types for all coax operations.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Main error type for coax operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error on the underlying transport (includes end-of-stream)
    #[error("transport IO error: {0}")]
    Io(#[from] io::Error),

    /// Peer greeting carried a bad protocol signature
    #[error("protocol signature mismatch: expected {expected:#04x} at byte {offset}, got {actual:#04x}")]
    SignatureMismatch {
        offset: usize,
        expected: u8,
        actual: u8,
    },

    /// Peer greeting declared an unsupported protocol version
    #[error("protocol version mismatch: peer is {major}.{minor}")]
    VersionMismatch { major: u8, minor: u8 },

    /// Peer greeting declared a different security mechanism
    #[error("security mechanism mismatch: peer wants {peer:?}, local is {local:?}")]
    MechanismMismatch { peer: String, local: String },

    /// Peer declared a socket type that cannot talk to the local one
    #[error("socket type {peer} is not compatible with {local}")]
    IncompatibleSocketType { local: String, peer: String },

    /// Received a frame that was not valid at this point of the protocol
    #[error("unexpected frame: {0}")]
    UnexpectedFrame(String),

    /// Decoded frame length exceeds what this platform can represent
    #[error("frame length {0} overflows the maximum representable size")]
    FrameOverflow(u64),

    /// Endpoint scheme names a transport coax does not speak
    #[error("unsupported transport scheme: {0:?} (only tcp:// is supported)")]
    UnsupportedTransport(String),

    /// Endpoint address could not be parsed
    #[error("invalid endpoint address: {0}")]
    InvalidEndpoint(String),

    /// Operation is not valid for this socket's role
    #[error("action not valid on this socket role")]
    InvalidSocketAction,

    /// Registry lookup for an unknown connection key
    #[error("no connection registered under key {0:?}")]
    ConnectionNotFound(String),

    /// Malformed command or metadata payload
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Handshake did not complete within the configured window
    #[error("handshake timeout after {0:?}")]
    HandshakeTimeout(Duration),
}

/// Result type alias for coax operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a protocol error with a message.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an unexpected-frame error with a message.
    pub fn unexpected_frame(msg: impl Into<String>) -> Self {
        Self::UnexpectedFrame(msg.into())
    }

    /// True if this error was produced while negotiating the greeting
    /// or metadata exchange.
    #[must_use]
    pub const fn is_handshake_error(&self) -> bool {
        matches!(
            self,
            Self::SignatureMismatch { .. }
                | Self::VersionMismatch { .. }
                | Self::MechanismMismatch { .. }
                | Self::IncompatibleSocketType { .. }
                | Self::HandshakeTimeout(_)
        )
    }
}
