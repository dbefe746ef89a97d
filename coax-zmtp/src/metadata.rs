//! READY metadata exchange.
//!
//! After the security handshake each side sends exactly one `READY`
//! command whose body is a sequence of properties:
//!
//! ```text
//! [key_len:1][key][value_len:4 BE][value]
//! ```
//!
//! Keys are case-insensitive and normalized to lower case on receipt.
//! `socket-type` and `identity` are reserved and always written;
//! application keys travel with an `x-` prefix which is stripped on the
//! way in.

use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};
use coax_core::error::{Error, Result};
use coax_core::socket_type::SocketType;

use crate::command::{Command, READY};

/// Reserved key carrying the socket type.
pub const KEY_SOCKET_TYPE: &str = "socket-type";
/// Reserved key carrying the peer identity.
pub const KEY_IDENTITY: &str = "identity";

const APP_PREFIX: &str = "x-";

/// Everything learned about the peer from its READY command.
#[derive(Debug, Clone)]
pub struct PeerMetadata {
    /// Socket type the peer declared.
    pub socket_type: SocketType,
    /// Peer identity; empty when the peer declared none.
    pub identity: Bytes,
    /// Application metadata with the `x-` prefix stripped.
    pub application: HashMap<String, String>,
}

/// Build the body of the outgoing READY command.
///
/// Application keys are validated (non-empty, no case-insensitive
/// collisions), lower-cased and wire-prefixed with `x-`. The reserved
/// `socket-type` and `identity` properties are always appended, whatever
/// the caller supplied.
pub fn build_ready(
    socket_type: SocketType,
    identity: &Bytes,
    application: &HashMap<String, String>,
) -> Result<Bytes> {
    let mut props = BytesMut::new();
    let mut used_keys: HashMap<String, ()> = HashMap::with_capacity(application.len());

    for (key, value) in application {
        if key.is_empty() {
            return Err(Error::protocol("application metadata key may not be empty"));
        }

        let lower = key.to_lowercase();
        if used_keys.insert(lower.clone(), ()).is_some() {
            return Err(Error::protocol(format!(
                "metadata key {lower:?} is specified multiple times with different casing"
            )));
        }

        put_property(&mut props, &format!("{APP_PREFIX}{lower}"), value.as_bytes())?;
    }

    put_property(&mut props, KEY_SOCKET_TYPE, socket_type.as_str().as_bytes())?;
    put_property(&mut props, KEY_IDENTITY, identity)?;

    Command::encode_body(READY, &props)
}

fn put_property(dst: &mut BytesMut, key: &str, value: &[u8]) -> Result<()> {
    if key.len() > 255 {
        return Err(Error::protocol(format!(
            "metadata key of {} bytes exceeds the 255-byte limit",
            key.len()
        )));
    }

    dst.put_u8(key.len() as u8);
    dst.extend_from_slice(key.as_bytes());
    dst.put_u32(value.len() as u32);
    dst.extend_from_slice(value);
    Ok(())
}

/// Parse the property section of a READY command received from the peer.
///
/// `local_type` drives the compatibility check: the declared peer socket
/// type must be able to talk to it.
pub fn parse_ready(body: &Bytes, local_type: SocketType) -> Result<PeerMetadata> {
    let mut socket_type: Option<SocketType> = None;
    let mut identity = Bytes::new();
    let mut application = HashMap::new();

    let b = body.as_ref();
    let mut i = 0;

    while i < b.len() {
        let key_len = b[i] as usize;
        i += 1;
        if i + key_len > b.len() {
            return Err(Error::protocol(format!(
                "metadata key of length {key_len} overflows body at offset {i}"
            )));
        }
        let key = String::from_utf8_lossy(&b[i..i + key_len]).to_lowercase();
        i += key_len;

        if i + 4 > b.len() {
            return Err(Error::protocol("truncated metadata value length"));
        }
        let value_len = u32::from_be_bytes([b[i], b[i + 1], b[i + 2], b[i + 3]]) as usize;
        i += 4;
        if i + value_len > b.len() {
            return Err(Error::protocol(format!(
                "metadata value of length {value_len} overflows body at offset {i}"
            )));
        }
        let value = &b[i..i + value_len];
        i += value_len;

        if let Some(app_key) = key.strip_prefix(APP_PREFIX) {
            application.insert(
                app_key.to_string(),
                String::from_utf8_lossy(value).into_owned(),
            );
        } else {
            match key.as_str() {
                KEY_SOCKET_TYPE => socket_type = Some(SocketType::from_wire(value)?),
                KEY_IDENTITY => identity = body.slice(i - value_len..i),
                // unknown reserved keys are ignored for forward compatibility
                _ => {}
            }
        }
    }

    let Some(peer_type) = socket_type else {
        return Err(Error::protocol("READY command is missing socket-type"));
    };

    if !local_type.is_compatible(peer_type) {
        return Err(Error::IncompatibleSocketType {
            local: local_type.to_string(),
            peer: peer_type.to_string(),
        });
    }

    Ok(PeerMetadata {
        socket_type: peer_type,
        identity,
        application,
    })
}
