//! Socket options.
//!
//! Tunables shared by every socket regardless of type. All options have
//! conservative defaults; builder-style `with_*` methods allow overrides.

use std::time::Duration;

use bytes::Bytes;

/// Default dial retry interval (matches the classic 250 ms ZMQ default).
pub const DEFAULT_RETRY_IVL: Duration = Duration::from_millis(250);

/// Default cap on the retry backoff. Equal to the base interval, so the
/// dial loop retries at a constant rate unless the caller raises the cap.
pub const DEFAULT_RETRY_IVL_MAX: Duration = Duration::from_millis(250);

/// Default handshake timeout.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default read buffer size for receive loops (8 KiB).
pub const DEFAULT_READ_BUF_SIZE: usize = 8192;

/// ZMTP identities are `0*255OCTET` on the wire.
pub const MAX_IDENTITY_LEN: usize = 255;

/// Per-socket configuration.
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Identity announced in the READY metadata (empty when `None`).
    /// Truncated to [`MAX_IDENTITY_LEN`] bytes on the wire.
    pub identity: Option<Bytes>,

    /// Base interval between dial attempts.
    pub retry_ivl: Duration,

    /// Cap for the exponential dial backoff.
    pub retry_ivl_max: Duration,

    /// Maximum number of dial attempts; `None` retries forever.
    pub max_retry_attempts: Option<u32>,

    /// How long a greeting + metadata exchange may take before the
    /// connection attempt is abandoned.
    pub handshake_timeout: Duration,

    /// Size of each transport read issued by a receive loop.
    pub read_buffer_size: usize,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            identity: None,
            retry_ivl: DEFAULT_RETRY_IVL,
            retry_ivl_max: DEFAULT_RETRY_IVL_MAX,
            max_retry_attempts: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            read_buffer_size: DEFAULT_READ_BUF_SIZE,
        }
    }
}

impl SocketOptions {
    /// Set the announced identity.
    #[must_use]
    pub fn with_identity(mut self, identity: impl Into<Bytes>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Set the base dial retry interval.
    #[must_use]
    pub const fn with_retry_ivl(mut self, ivl: Duration) -> Self {
        self.retry_ivl = ivl;
        self
    }

    /// Set the dial backoff cap.
    #[must_use]
    pub const fn with_retry_ivl_max(mut self, ivl: Duration) -> Self {
        self.retry_ivl_max = ivl;
        self
    }

    /// Bound the number of dial attempts.
    #[must_use]
    pub const fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = Some(attempts);
        self
    }

    /// Set the handshake timeout.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the receive-loop read buffer size.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Identity bytes as they will appear on the wire (possibly truncated,
    /// empty when unset).
    #[must_use]
    pub fn wire_identity(&self) -> Bytes {
        match &self.identity {
            Some(id) if id.len() > MAX_IDENTITY_LEN => id.slice(..MAX_IDENTITY_LEN),
            Some(id) => id.clone(),
            None => Bytes::new(),
        }
    }
}
