//! The fixed 64-byte ZMTP greeting.
//!
//! Layout:
//!
//! ```text
//! [0]      0xFF
//! [1..9]   reserved (zero)
//! [9]      0x7F
//! [10]     major version (3)
//! [11]     minor version (0)
//! [12..32] mechanism name, 20-byte left-null-padded ASCII
//! [32]     as-server flag (0x00 / 0x01)
//! [33..64] reserved (zero)
//! ```
//!
//! Both sides send their own greeting and then read the peer's; the
//! exchange is simultaneous, not request/response. Version is matched
//! exactly, there is no negotiation.

use bytes::{Bytes, BytesMut};
use coax_core::error::{Error, Result};

/// A greeting is always exactly 64 bytes.
pub const GREETING_SIZE: usize = 64;

/// Width of the mechanism-name field.
pub const MECHANISM_SIZE: usize = 20;

pub const MAJOR_VERSION: u8 = 3;
pub const MINOR_VERSION: u8 = 0;

const SIGNATURE_HEAD: u8 = 0xFF;
const SIGNATURE_TAIL: u8 = 0x7F;
const SIGNATURE_TAIL_OFFSET: usize = 9;

/// Parsed peer greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    /// Mechanism name with null padding stripped.
    pub mechanism: String,
    /// Peer's as-server flag.
    pub as_server: bool,
}

impl Greeting {
    /// Encode a local greeting.
    ///
    /// The mechanism name is written right-aligned into the 20-byte field
    /// with null padding on the left, matching the wire layout above.
    /// Names longer than the field are truncated.
    #[must_use]
    pub fn encode(mechanism: &str, as_server: bool) -> Bytes {
        let mut b = BytesMut::with_capacity(GREETING_SIZE);

        b.extend_from_slice(&[SIGNATURE_HEAD]);
        b.extend_from_slice(&[0u8; 8]);
        b.extend_from_slice(&[SIGNATURE_TAIL]);

        b.extend_from_slice(&[MAJOR_VERSION, MINOR_VERSION]);

        let name = mechanism.as_bytes();
        let name = &name[..name.len().min(MECHANISM_SIZE)];
        let mut field = [0u8; MECHANISM_SIZE];
        field[MECHANISM_SIZE - name.len()..].copy_from_slice(name);
        b.extend_from_slice(&field);

        b.extend_from_slice(&[u8::from(as_server)]);
        b.extend_from_slice(&[0u8; 31]);

        debug_assert_eq!(b.len(), GREETING_SIZE);
        b.freeze()
    }

    /// Parse and verify a peer greeting.
    ///
    /// Signature bytes must match exactly, the version must be exactly
    /// 3.0 and the server flag must be 0 or 1. Mechanism padding is
    /// stripped from both sides so right-padded peers parse too.
    pub fn parse(src: &[u8]) -> Result<Self> {
        if src.len() < GREETING_SIZE {
            return Err(Error::protocol(format!(
                "greeting is {} bytes, expected {GREETING_SIZE}",
                src.len()
            )));
        }

        if src[0] != SIGNATURE_HEAD {
            return Err(Error::SignatureMismatch {
                offset: 0,
                expected: SIGNATURE_HEAD,
                actual: src[0],
            });
        }
        if src[SIGNATURE_TAIL_OFFSET] != SIGNATURE_TAIL {
            return Err(Error::SignatureMismatch {
                offset: SIGNATURE_TAIL_OFFSET,
                expected: SIGNATURE_TAIL,
                actual: src[SIGNATURE_TAIL_OFFSET],
            });
        }

        let (major, minor) = (src[10], src[11]);
        if major != MAJOR_VERSION || minor != MINOR_VERSION {
            return Err(Error::VersionMismatch { major, minor });
        }

        let mech_raw = &src[12..12 + MECHANISM_SIZE];
        let mechanism = std::str::from_utf8(mech_raw)
            .map_err(|_| Error::protocol("mechanism name is not ASCII"))?
            .trim_matches(char::from(0))
            .to_string();

        let as_server = match src[32] {
            0x00 => false,
            0x01 => true,
            other => {
                return Err(Error::protocol(format!(
                    "invalid as-server byte {other:#04x}"
                )))
            }
        };

        Ok(Self {
            mechanism,
            as_server,
        })
    }

    /// Check the peer's mechanism against the locally configured one.
    pub fn verify_mechanism(&self, local: &str) -> Result<()> {
        if self.mechanism == local {
            Ok(())
        } else {
            Err(Error::MechanismMismatch {
                peer: self.mechanism.clone(),
                local: local.to_string(),
            })
        }
    }
}
