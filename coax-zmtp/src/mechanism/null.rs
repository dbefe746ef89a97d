use bytes::Bytes;
use coax_core::error::Result;

use crate::mechanism::Mechanism;

/// NULL mechanism for ZMTP 3.x.
///
/// No credentials, no encryption: the handshake step is a no-op and
/// payloads pass through untouched. Peer metadata still travels in the
/// READY exchange handled by the connection layer.
#[derive(Debug, Default)]
pub struct NullMechanism;

impl NullMechanism {
    pub fn new() -> Self {
        Self
    }
}

impl Mechanism for NullMechanism {
    fn name(&self) -> &'static str {
        "NULL"
    }

    fn handshake(&mut self) -> Result<()> {
        Ok(())
    }

    fn encrypt(&self, payload: Bytes) -> Bytes {
        payload
    }
}
