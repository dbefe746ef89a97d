//! ZMTP command encoding and parsing.
//!
//! A command is a COMMAND-flagged frame whose body is:
//!
//! ```text
//! [name_len:1][name: 1..=255 bytes][body]
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use coax_core::error::{Error, Result};

/// Well-known command names handled by the engine.
pub const READY: &str = "READY";
pub const PING: &str = "PING";
pub const PONG: &str = "PONG";

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub body: Bytes,
}

impl Command {
    /// Encode a command frame body.
    ///
    /// Fails when the name is empty or longer than 255 bytes.
    pub fn encode_body(name: &str, body: &[u8]) -> Result<Bytes> {
        if name.is_empty() {
            return Err(Error::protocol("command name may not be empty"));
        }
        if name.len() > 255 {
            return Err(Error::protocol(format!(
                "command name of {} bytes exceeds the 255-byte limit",
                name.len()
            )));
        }

        let mut out = BytesMut::with_capacity(1 + name.len() + body.len());
        out.put_u8(name.len() as u8);
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(body);
        Ok(out.freeze())
    }

    /// Parse a command frame body into name + body bytes.
    pub fn parse(payload: &Bytes) -> Result<Self> {
        if payload.is_empty() {
            return Err(Error::protocol("empty command frame body"));
        }

        let name_len = payload[0] as usize;
        if name_len > payload.len() - 1 {
            return Err(Error::protocol(format!(
                "command name length {name_len} overflows body of {} bytes",
                payload.len()
            )));
        }

        let name = std::str::from_utf8(&payload[1..=name_len])
            .map_err(|_| Error::protocol("command name is not valid UTF-8"))?
            .to_string();
        let body = payload.slice(1 + name_len..);

        Ok(Self { name, body })
    }
}
