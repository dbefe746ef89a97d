//! Application-visible message unit.
//!
//! Everything a receive loop delivers is one of these: a multipart unit of
//! user data, a protocol command the engine did not absorb, or the single
//! error that terminated the connection.

use bytes::Bytes;

use crate::error::Error;

/// One logical unit delivered on a socket's receive channel.
#[derive(Debug)]
pub enum Message {
    /// User data: one or more ordered frames forming a multipart unit.
    User(Vec<Bytes>),

    /// A protocol command surfaced to the application (PING/PONG are
    /// absorbed by the engine and never appear here).
    Command { name: String, body: Bytes },

    /// Transport or protocol failure; the connection that produced this
    /// is terminated and emits no further messages.
    Error(Error),
}

impl Message {
    /// Build a single-frame user message.
    #[must_use]
    pub fn user(body: impl Into<Bytes>) -> Self {
        Self::User(vec![body.into()])
    }

    /// True for user data.
    #[must_use]
    pub const fn is_user(&self) -> bool {
        matches!(self, Self::User(_))
    }

    /// True for surfaced commands.
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(self, Self::Command { .. })
    }

    /// True for the terminal error marker.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Frames of a user message, or `None` for commands and errors.
    #[must_use]
    pub fn frames(&self) -> Option<&[Bytes]> {
        match self {
            Self::User(frames) => Some(frames),
            _ => None,
        }
    }

    /// Unwrap user frames, or turn the carried error into a `Result`.
    ///
    /// Surfaced commands are reported as a protocol error since the caller
    /// asked for data.
    pub fn into_frames(self) -> Result<Vec<Bytes>, Error> {
        match self {
            Self::User(frames) => Ok(frames),
            Self::Command { name, .. } => Err(Error::unexpected_frame(format!(
                "expected user data, got {name} command"
            ))),
            Self::Error(err) => Err(err),
        }
    }
}
