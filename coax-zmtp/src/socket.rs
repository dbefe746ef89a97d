//! User-facing socket: the connect/bind control surface over the
//! registry and handshake machinery.
//!
//! A socket is either client-role (it dials with [`Socket::connect`])
//! or server-role (it listens with [`Socket::bind`]); the other verb
//! returns [`Error::InvalidSocketAction`]. Either way, traffic flows
//! through the shared registry: `send` broadcasts, `recv` drains the
//! single inbound channel.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use compio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use coax_core::endpoint::Endpoint;
use coax_core::error::{Error, Result};
use coax_core::message::Message;
use coax_core::options::SocketOptions;
use coax_core::retry::RetryPolicy;
use coax_core::socket_type::{Role, SocketType};

use crate::connection::Connection;
use crate::mechanism::MechanismKind;
use crate::registry::ConnectionRegistry;

pub struct Socket {
    socket_type: SocketType,
    role: Role,
    mechanism: MechanismKind,
    options: SocketOptions,
    application: HashMap<String, String>,
    registry: Arc<ConnectionRegistry>,
}

impl Socket {
    /// A client-role socket: it dials out and never listens.
    pub fn client(socket_type: SocketType) -> Self {
        Self::new(socket_type, Role::Client)
    }

    /// A server-role socket: it listens and never dials.
    pub fn server(socket_type: SocketType) -> Self {
        Self::new(socket_type, Role::Server)
    }

    pub fn new(socket_type: SocketType, role: Role) -> Self {
        Self {
            socket_type,
            role,
            mechanism: MechanismKind::default(),
            options: SocketOptions::default(),
            application: HashMap::new(),
            registry: ConnectionRegistry::new(),
        }
    }

    pub fn with_options(mut self, options: SocketOptions) -> Self {
        self.options = options;
        self
    }

    /// Attach an application metadata property sent in the handshake.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.application.insert(key.into(), value.into());
        self
    }

    pub fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Identity as it goes on the wire (truncated to the protocol cap).
    pub fn identity(&self) -> Bytes {
        self.options.wire_identity()
    }

    /// Dial a peer, retrying per the socket's retry policy, and
    /// register the connection. Returns the registry key.
    ///
    /// A malformed address fails immediately; only dial failures retry.
    /// With the default unbounded policy this blocks until the peer
    /// comes up.
    pub async fn connect(&self, endpoint: &str) -> Result<String> {
        if self.role != Role::Client {
            return Err(Error::InvalidSocketAction);
        }

        let endpoint = Endpoint::parse(endpoint)?;
        let addr = endpoint.addr();

        let mut retry = RetryPolicy::new(&self.options);
        let stream = loop {
            match TcpStream::connect(addr).await {
                Ok(stream) => break stream,
                Err(err) => {
                    if retry.exhausted() {
                        return Err(Error::Io(err));
                    }
                    let delay = retry.next_delay();
                    debug!(%addr, %err, ?delay, "dial failed, retrying");
                    compio::time::sleep(delay).await;
                }
            }
        };

        let conn = Connection::establish(
            stream,
            self.mechanism.build(),
            self.socket_type,
            self.role,
            self.identity(),
            &self.application,
            self.options.handshake_timeout,
        )
        .await?;

        let key = self
            .registry
            .add(conn, self.options.read_buffer_size)
            .await;
        info!(%addr, %key, "connected");
        Ok(key)
    }

    /// Bind a listener and accept peers in a detached background task.
    ///
    /// Returns the bound address (useful with port 0). Each accepted
    /// stream handshakes in its own task; a failed handshake is logged
    /// and dropped without disturbing the listener.
    pub async fn bind(&self, endpoint: &str) -> Result<SocketAddr> {
        if self.role != Role::Server {
            return Err(Error::InvalidSocketAction);
        }

        let endpoint = Endpoint::parse(endpoint)?;
        let listener = TcpListener::bind(endpoint.addr()).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, socket_type = self.socket_type.as_str(), "listening");

        let registry = Arc::clone(&self.registry);
        let socket_type = self.socket_type;
        let role = self.role;
        let mechanism = self.mechanism;
        let identity = self.identity();
        let application = self.application.clone();
        let options = self.options.clone();

        compio::runtime::spawn(async move {
            loop {
                let (stream, peer_addr) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(%err, "accept failed, listener stopping");
                        return;
                    }
                };
                debug!(%peer_addr, "accepted connection");

                let registry = Arc::clone(&registry);
                let identity = identity.clone();
                let application = application.clone();
                let options = options.clone();
                compio::runtime::spawn(async move {
                    match Connection::establish(
                        stream,
                        mechanism.build(),
                        socket_type,
                        role,
                        identity,
                        &application,
                        options.handshake_timeout,
                    )
                    .await
                    {
                        Ok(conn) => {
                            let key = registry.add(conn, options.read_buffer_size).await;
                            debug!(%peer_addr, %key, "peer registered");
                        }
                        Err(err) if err.is_handshake_error() => {
                            debug!(%peer_addr, %err, "handshake failed, dropping peer");
                        }
                        Err(err) => {
                            warn!(%peer_addr, %err, "connection setup failed, dropping peer");
                        }
                    }
                })
                .detach();
            }
        })
        .detach();

        Ok(local_addr)
    }

    /// Next inbound message from any peer.
    pub async fn recv(&self) -> Result<Message> {
        self.registry.recv().await
    }

    /// Broadcast a single-frame message to every connected peer.
    pub async fn send(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.registry.broadcast(payload.into()).await
    }

    /// Broadcast a multipart message to every connected peer.
    pub async fn send_multipart(&self, frames: Vec<Bytes>) -> Result<()> {
        if frames.is_empty() {
            return Err(Error::protocol("multipart message may not be empty"));
        }
        self.registry.broadcast_multipart(frames).await
    }

    /// Send a single-frame message to one peer by registry key.
    pub async fn send_to(&self, key: &str, payload: impl Into<Bytes>) -> Result<()> {
        self.registry.send_to(key, payload.into()).await
    }

    /// Disconnect one peer by registry key.
    pub async fn disconnect(&self, key: &str) -> Result<()> {
        self.registry.remove(key).await
    }

    /// Close every connection. The socket can connect or accept again
    /// afterwards; bound listeners keep running.
    pub async fn close(&self) {
        self.registry.close_all().await;
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }

    /// Connected peer keys, in registration order.
    pub async fn peers(&self) -> Vec<String> {
        self.registry.keys().await
    }
}
