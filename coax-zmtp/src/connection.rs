//! An established, handshaken peer connection.
//!
//! The write half stays inside [`Connection`]; the read half is a
//! `try_clone` of the same stream, taken once by the registry when it
//! spawns the receive loop. Cloning duplicates the file descriptor, so
//! dropping one half does not close the socket; [`Connection::close`]
//! shuts the underlying socket down explicitly, which also unblocks a
//! receive loop parked in a read.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use compio::buf::BufResult;
use compio::io::{AsyncRead, AsyncWriteExt};
use compio::net::TcpStream;
use compio::runtime::TryClone;
use flume::Sender;
use tracing::{debug, trace};

use coax_core::error::{Error, Result};
use coax_core::message::Message;
use coax_core::socket_type::{Role, SocketType};
use coax_core::tcp;

use crate::codec::{Frame, FrameDecoder};
use crate::command::{Command, PING, PONG};
use crate::handshake;
use crate::mechanism::Mechanism;
use crate::metadata::PeerMetadata;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

pub struct Connection {
    /// Process-unique id, used by the registry to tell a replaced
    /// connection apart from its successor under the same key.
    id: u64,
    stream: TcpStream,
    reader: Option<TcpStream>,
    mechanism: Box<dyn Mechanism>,
    local_type: SocketType,
    peer: PeerMetadata,
}

impl Connection {
    /// Run the handshake on a fresh stream and wrap it up.
    ///
    /// `deadline` bounds the whole handshake; a stalled peer costs at
    /// most that long.
    pub async fn establish(
        mut stream: TcpStream,
        mut mechanism: Box<dyn Mechanism>,
        local_type: SocketType,
        role: Role,
        identity: Bytes,
        application: &HashMap<String, String>,
        deadline: std::time::Duration,
    ) -> Result<Self> {
        if let Err(err) = tcp::enable_tcp_nodelay(&stream) {
            debug!(%err, "failed to set TCP_NODELAY, continuing");
        }

        let reader = stream.try_clone()?;

        let peer = handshake::perform_handshake_with_timeout(
            &mut stream,
            mechanism.as_mut(),
            local_type,
            role,
            identity,
            application,
            deadline,
        )
        .await?;

        Ok(Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            stream,
            reader: Some(reader),
            mechanism,
            local_type,
            peer,
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> &PeerMetadata {
        &self.peer
    }

    pub fn peer_identity(&self) -> &Bytes {
        &self.peer.identity
    }

    pub fn local_type(&self) -> SocketType {
        self.local_type
    }

    /// Take the read half for the receive loop. Yields once.
    pub(crate) fn take_reader(&mut self) -> Option<TcpStream> {
        self.reader.take()
    }

    /// Send a single-frame user message.
    pub async fn send_frame(&mut self, payload: Bytes) -> Result<()> {
        let sealed = self.mechanism.encrypt(payload);
        let frame = Frame::data(sealed, false);
        self.write_bytes(frame.encode()).await
    }

    /// Send a multipart message atomically: every frame but the last
    /// carries the MORE flag, and nothing else is interleaved on this
    /// connection because `&mut self` holds the write half.
    pub async fn send_multipart(&mut self, frames: Vec<Bytes>) -> Result<()> {
        let last = frames.len().saturating_sub(1);
        for (i, payload) in frames.into_iter().enumerate() {
            let sealed = self.mechanism.encrypt(payload);
            let frame = Frame::data(sealed, i < last);
            self.write_bytes(frame.encode()).await?;
        }
        Ok(())
    }

    /// Send a command frame.
    pub async fn send_command(&mut self, name: &str, body: &[u8]) -> Result<()> {
        let payload = Command::encode_body(name, body)?;
        self.write_bytes(Frame::command(payload).encode()).await
    }

    async fn write_bytes(&mut self, bytes: Bytes) -> Result<()> {
        let BufResult(res, _) = self.stream.write_all(bytes.to_vec()).await;
        res?;
        Ok(())
    }

    /// Shut the socket down in both directions.
    ///
    /// This is what actually terminates the connection: both halves are
    /// dup'd descriptors, so a plain drop would leave the peer attached
    /// and the receive loop blocked.
    pub fn close(&self) -> Result<()> {
        tcp::shutdown_stream(&self.stream)?;
        Ok(())
    }
}

/// Drive the read half until the peer disconnects or the frame stream
/// turns invalid.
///
/// Returns the terminal error, or `None` when the loop ended because the
/// consumer side of `out` went away. PING commands are absorbed here and
/// answered with a single PONG on the same descriptor; they never reach
/// the consumer.
///
/// `out` is a rendezvous channel, so a consumer that stops calling
/// `recv` stalls this loop at the hand-off and no further transport
/// reads are issued. Backpressure is the channel and the socket's own
/// buffers, nothing else.
pub(crate) async fn receive_loop(
    mut stream: TcpStream,
    read_buffer_size: usize,
    out: Sender<Message>,
) -> Option<Error> {
    let mut decoder = FrameDecoder::new();
    let mut buf = BytesMut::with_capacity(read_buffer_size);

    loop {
        match decoder.decode_unit(&mut buf) {
            Ok(Some(unit)) => {
                let msg = if unit.is_command {
                    match classify_command(&mut stream, unit.frames).await {
                        Ok(Some(msg)) => msg,
                        Ok(None) => continue,
                        Err(err) => return Some(err),
                    }
                } else {
                    Message::User(unit.frames)
                };
                if out.send_async(msg).await.is_err() {
                    return None;
                }
                continue;
            }
            Ok(None) => {}
            Err(err) => return Some(err),
        }

        let chunk = vec![0u8; read_buffer_size];
        let BufResult(res, chunk) = AsyncRead::read(&mut stream, chunk).await;
        match res {
            Ok(0) => {
                let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed connection");
                return Some(Error::Io(eof));
            }
            Ok(n) => {
                trace!(bytes = n, "read from peer");
                buf.extend_from_slice(&chunk[..n]);
            }
            Err(err) => return Some(Error::Io(err)),
        }
    }
}

/// Decide what to do with a command unit from the wire.
///
/// PING is answered and swallowed. Everything else is surfaced as a
/// [`Message::Command`] so callers can observe unknown commands.
async fn classify_command(
    stream: &mut TcpStream,
    frames: Vec<Bytes>,
) -> Result<Option<Message>> {
    // A command unit is a single frame; a multipart chain tainted by a
    // command flag is handed over as-is using its first frame's name.
    let Some(first) = frames.first() else {
        return Err(Error::unexpected_frame("empty command unit"));
    };

    let command = Command::parse(first)?;
    if command.name == PING {
        let payload = Command::encode_body(PONG, &[])?;
        let BufResult(res, _) = stream.write_all(Frame::command(payload).encode().to_vec()).await;
        res?;
        trace!("answered PING with PONG");
        return Ok(None);
    }

    Ok(Some(Message::Command {
        name: command.name,
        body: command.body,
    }))
}
