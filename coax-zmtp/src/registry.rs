//! Connection registry shared by the socket's control loops.
//!
//! One registry per socket. Each registered connection gets a detached
//! receive-loop task; messages from every peer funnel into a single
//! flume channel the socket drains. When a receive loop hits a terminal
//! error it evicts its own entry and forwards exactly one
//! [`Message::Error`] before ending.

use std::collections::HashMap;
use std::sync::Arc;

use async_lock::RwLock;
use bytes::Bytes;
use flume::{Receiver, Sender};
use rand::Rng;
use tracing::{debug, warn};

use coax_core::error::{Error, Result};
use coax_core::message::Message;

use crate::connection::{receive_loop, Connection};

#[derive(Default)]
struct Inner {
    table: HashMap<String, Connection>,
    /// Registration order, for deterministic broadcast iteration.
    order: Vec<String>,
}

pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
    msg_tx: Sender<Message>,
    msg_rx: Receiver<Message>,
}

impl ConnectionRegistry {
    pub fn new() -> Arc<Self> {
        // Rendezvous channel: a consumer that stops draining stalls
        // every receive loop at the hand-off instead of buffering.
        let (msg_tx, msg_rx) = flume::bounded(0);
        Arc::new(Self {
            inner: RwLock::new(Inner::default()),
            msg_tx,
            msg_rx,
        })
    }

    /// Register an established connection and spawn its receive loop.
    ///
    /// The key is the peer identity when it declared one, else a random
    /// key. A peer reconnecting under the same identity replaces the old
    /// entry, which is closed first so its receive loop terminates.
    pub async fn add(self: &Arc<Self>, mut conn: Connection, read_buffer_size: usize) -> String {
        let key = if conn.peer_identity().is_empty() {
            generate_key()
        } else {
            String::from_utf8_lossy(conn.peer_identity()).into_owned()
        };

        let reader = conn.take_reader();
        let conn_id = conn.id();

        {
            let mut inner = self.inner.write().await;
            if let Some(old) = inner.table.insert(key.clone(), conn) {
                warn!(%key, "replacing existing connection with same identity");
                if let Err(err) = old.close() {
                    debug!(%key, %err, "error closing replaced connection");
                }
            } else {
                inner.order.push(key.clone());
            }
        }

        if let Some(stream) = reader {
            let registry = Arc::clone(self);
            let loop_key = key.clone();
            let out = self.msg_tx.clone();
            compio::runtime::spawn(async move {
                let err = receive_loop(stream, read_buffer_size, out.clone()).await;
                if let Some(err) = err {
                    // Only report the failure if we evicted the entry
                    // ourselves. A missing entry means the user already
                    // removed it; a different id means a reconnecting
                    // peer already replaced it. Either way the error is
                    // just this loop's own shutdown.
                    if registry.remove_entry(&loop_key, Some(conn_id)).await.is_ok() {
                        debug!(key = %loop_key, %err, "connection terminated");
                        let _ = out.send_async(Message::Error(err)).await;
                    }
                }
            })
            .detach();
        }

        key
    }

    /// Close and drop a connection. Blocked reads in its receive loop
    /// observe the shutdown and terminate.
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.remove_entry(key, None).await
    }

    /// Remove `key`, optionally only when the entry still holds the
    /// connection with `expected_id`.
    async fn remove_entry(&self, key: &str, expected_id: Option<u64>) -> Result<()> {
        let mut inner = self.inner.write().await;
        match inner.table.get(key) {
            Some(conn) if expected_id.map_or(true, |id| conn.id() == id) => {}
            _ => return Err(Error::ConnectionNotFound(key.to_string())),
        }
        let conn = inner
            .table
            .remove(key)
            .ok_or_else(|| Error::ConnectionNotFound(key.to_string()))?;
        inner.order.retain(|k| k != key);
        conn.close()
    }

    /// Send a single-frame message to one peer.
    pub async fn send_to(&self, key: &str, payload: Bytes) -> Result<()> {
        let mut inner = self.inner.write().await;
        let Some(conn) = inner.table.get_mut(key) else {
            return Err(Error::ConnectionNotFound(key.to_string()));
        };
        conn.send_frame(payload).await
    }

    /// Send the same payload to every connection, in registration order.
    ///
    /// Aborts on the first per-connection failure; peers earlier in the
    /// order keep what they already received.
    pub async fn broadcast(&self, payload: Bytes) -> Result<()> {
        let mut inner = self.inner.write().await;
        let keys: Vec<String> = inner.order.clone();
        for key in keys {
            if let Some(conn) = inner.table.get_mut(&key) {
                conn.send_frame(payload.clone()).await?;
            }
        }
        Ok(())
    }

    /// Send a multipart message to every connection, in registration
    /// order, each chain written atomically per connection.
    pub async fn broadcast_multipart(&self, frames: Vec<Bytes>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let keys: Vec<String> = inner.order.clone();
        for key in keys {
            if let Some(conn) = inner.table.get_mut(&key) {
                conn.send_multipart(frames.clone()).await?;
            }
        }
        Ok(())
    }

    /// Next message from any peer. Blocks until one arrives.
    pub async fn recv(&self) -> Result<Message> {
        self.msg_rx
            .recv_async()
            .await
            .map_err(|_| Error::protocol("message channel closed"))
    }

    /// Close every connection and clear the table.
    pub async fn close_all(&self) {
        let mut inner = self.inner.write().await;
        for (key, conn) in inner.table.drain() {
            if let Err(err) = conn.close() {
                debug!(%key, %err, "error closing connection");
            }
        }
        inner.order.clear();
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.inner.read().await.table.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.table.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.table.is_empty()
    }

    /// Registered connection keys, in registration order.
    pub async fn keys(&self) -> Vec<String> {
        self.inner.read().await.order.clone()
    }
}

/// Random 32-hex-char key for peers that declared no identity.
fn generate_key() -> String {
    use std::fmt::Write;

    let bytes: [u8; 16] = rand::thread_rng().gen();
    let mut out = String::with_capacity(32);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}
