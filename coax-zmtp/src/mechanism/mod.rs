pub mod null;

use bytes::Bytes;
use coax_core::error::Result;

/// Trait implemented by each security mechanism (NULL now, PLAIN/CURVE later).
///
/// The mechanism is responsible for:
/// - running its own command exchange after the greeting, before READY
/// - transforming outbound payloads once the handshake has completed
///
/// The NULL mechanism has an empty exchange and an identity transform;
/// the seams exist so a real mechanism can slot in without touching the
/// connection logic.
pub trait Mechanism: Send {
    /// Wire name, exactly as it appears null-padded in the greeting.
    fn name(&self) -> &'static str;

    /// Run the mechanism-specific command exchange.
    ///
    /// Called after greetings have been validated on both sides and
    /// before the READY metadata exchange.
    fn handshake(&mut self) -> Result<()>;

    /// Transform an outbound payload before framing.
    fn encrypt(&self, payload: Bytes) -> Bytes;
}

/// Mechanism selection, fixed at socket construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MechanismKind {
    #[default]
    Null,
    // Plain,
    // Curve,
}

impl MechanismKind {
    pub fn name(&self) -> &'static str {
        match self {
            MechanismKind::Null => "NULL",
        }
    }

    pub fn build(self) -> Box<dyn Mechanism> {
        match self {
            MechanismKind::Null => Box::new(null::NullMechanism::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_builds_matching_mechanism() {
        let mech = MechanismKind::Null.build();
        assert_eq!(mech.name(), MechanismKind::Null.name());
    }
}
