//! Synchronous ZMTP handshake that completes before the connection is
//! registered or any background task is spawned.
//!
//! Sequence, same on both sides:
//! 1. write our 64-byte greeting, read and validate the peer's
//! 2. run the security mechanism's own exchange (empty for NULL)
//! 3. write our READY command, read and parse the peer's
//!
//! Only after all three steps does the stream carry application frames.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use compio::buf::BufResult;
use compio::io::{AsyncReadExt, AsyncWriteExt};
use compio::net::TcpStream;
use tracing::debug;

use coax_core::error::{Error, Result};
use coax_core::socket_type::{Role, SocketType};

use crate::codec::{Frame, FLAG_COMMAND, FLAG_LONG, FLAG_MORE, FLAG_RESERVED, MAX_FRAME_LEN};
use crate::command::{Command, READY};
use crate::greeting::{Greeting, GREETING_SIZE};
use crate::mechanism::Mechanism;
use crate::metadata::{self, PeerMetadata};

/// Upper bound on a READY body. Metadata is small; anything near this
/// size is a misbehaving peer.
const MAX_READY_SIZE: usize = 64 * 1024;

/// Run the full handshake with a deadline. On expiry the peer never
/// learns why; the caller gets [`Error::HandshakeTimeout`] and should
/// drop the stream.
pub async fn perform_handshake_with_timeout(
    stream: &mut TcpStream,
    mechanism: &mut dyn Mechanism,
    socket_type: SocketType,
    role: Role,
    identity: Bytes,
    application: &HashMap<String, String>,
    deadline: Duration,
) -> Result<PeerMetadata> {
    match compio::time::timeout(
        deadline,
        perform_handshake(stream, mechanism, socket_type, role, identity, application),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(Error::HandshakeTimeout(deadline)),
    }
}

/// Run the full handshake on `stream`, returning the peer's metadata.
pub async fn perform_handshake(
    stream: &mut TcpStream,
    mechanism: &mut dyn Mechanism,
    socket_type: SocketType,
    role: Role,
    identity: Bytes,
    application: &HashMap<String, String>,
) -> Result<PeerMetadata> {
    debug!(socket_type = socket_type.as_str(), "starting handshake");

    // Step 1: greeting exchange.
    let ours = Greeting::encode(mechanism.name(), role.as_server());
    let BufResult(write_res, _) = stream.write_all(ours.to_vec()).await;
    write_res?;

    let buf = [0u8; GREETING_SIZE];
    let BufResult(read_res, buf) = stream.read_exact(buf).await;
    read_res?;

    let peer_greeting = Greeting::parse(&buf)?;
    peer_greeting.verify_mechanism(mechanism.name())?;
    debug!(mechanism = %peer_greeting.mechanism, "greeting validated");

    // Step 2: mechanism exchange (empty for NULL).
    mechanism.handshake()?;

    // Step 3: READY exchange.
    let ready_body = metadata::build_ready(socket_type, &identity, application)?;
    let framed = Frame::command(ready_body).encode();
    let BufResult(write_res, _) = stream.write_all(framed.to_vec()).await;
    write_res?;

    let body = read_ready_frame(stream).await?;
    let command = Command::parse(&body)?;
    if command.name != READY {
        return Err(Error::unexpected_frame(format!(
            "expected READY during handshake, got {} command",
            command.name
        )));
    }

    let peer = metadata::parse_ready(&command.body, socket_type)?;
    debug!(
        peer_type = peer.socket_type.as_str(),
        identity_len = peer.identity.len(),
        "handshake complete"
    );
    Ok(peer)
}

/// Read exactly one command frame and return its payload.
///
/// For a long frame the second header byte is the first of the eight
/// length bytes, so seven more are read to complete it.
async fn read_ready_frame(stream: &mut TcpStream) -> Result<Bytes> {
    let header = [0u8; 2];
    let BufResult(read_res, header) = stream.read_exact(header).await;
    read_res?;

    let flags = header[0];
    if flags & FLAG_RESERVED != 0 {
        return Err(Error::unexpected_frame(format!(
            "reserved flag bits set during handshake: {flags:#04x}"
        )));
    }
    if flags & FLAG_COMMAND == 0 {
        return Err(Error::unexpected_frame(
            "expected command frame during handshake, got data frame",
        ));
    }
    // READY is a single frame; a MORE chain here would desynchronize
    // the stream that follows the handshake.
    if flags & FLAG_MORE != 0 {
        return Err(Error::unexpected_frame(
            "multipart command frame during handshake",
        ));
    }

    let body_len = if flags & FLAG_LONG != 0 {
        let rest = [0u8; 7];
        let BufResult(read_res, rest) = stream.read_exact(rest).await;
        read_res?;

        let mut len_bytes = [0u8; 8];
        len_bytes[0] = header[1];
        len_bytes[1..].copy_from_slice(&rest);
        let len = u64::from_be_bytes(len_bytes);
        if len > MAX_FRAME_LEN {
            return Err(Error::FrameOverflow(len));
        }
        len as usize
    } else {
        header[1] as usize
    };

    if body_len > MAX_READY_SIZE {
        return Err(Error::protocol(format!(
            "READY command of {body_len} bytes exceeds the {MAX_READY_SIZE}-byte limit"
        )));
    }

    let body = vec![0u8; body_len];
    let BufResult(read_res, body) = stream.read_exact(body).await;
    read_res?;

    Ok(Bytes::from(body))
}
