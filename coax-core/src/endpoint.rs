//! Endpoint parsing for socket addressing.
//!
//! Coax speaks TCP only; every other scheme is rejected at parse time so a
//! bad endpoint never reaches the dial loop.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::Error;

/// Transport endpoint address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// TCP transport: `tcp://host:port`
    Tcp(SocketAddr),
}

impl Endpoint {
    /// Parse an endpoint from a string.
    ///
    /// Supported formats:
    /// - `tcp://127.0.0.1:5555`
    /// - `tcp://[::1]:5555` (IPv6)
    ///
    /// Any other scheme fails with [`Error::UnsupportedTransport`]; a
    /// malformed TCP address fails with [`Error::InvalidEndpoint`].
    pub fn parse(s: &str) -> Result<Self, Error> {
        s.parse()
    }

    /// The socket address behind this endpoint.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        match self {
            Endpoint::Tcp(addr) => *addr,
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(addr) = s.strip_prefix("tcp://") {
            let socket_addr = addr
                .parse::<SocketAddr>()
                .map_err(|_| Error::InvalidEndpoint(addr.to_string()))?;
            Ok(Endpoint::Tcp(socket_addr))
        } else {
            let scheme = s.split("://").next().unwrap_or(s);
            Err(Error::UnsupportedTransport(scheme.to_string()))
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp_ipv4() {
        let endpoint = Endpoint::parse("tcp://127.0.0.1:5555").unwrap();
        assert!(matches!(endpoint, Endpoint::Tcp(_)));
        assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:5555");
    }

    #[test]
    fn test_parse_tcp_ipv6() {
        let endpoint = Endpoint::parse("tcp://[::1]:5555").unwrap();
        assert!(matches!(endpoint, Endpoint::Tcp(_)));
    }

    #[test]
    fn test_unsupported_scheme() {
        let result = Endpoint::parse("ipc:///tmp/test.sock");
        assert!(matches!(result, Err(Error::UnsupportedTransport(_))));

        let result = Endpoint::parse("inproc://name");
        assert!(matches!(result, Err(Error::UnsupportedTransport(_))));
    }

    #[test]
    fn test_invalid_tcp_address() {
        let result = Endpoint::parse("tcp://invalid:port");
        assert!(matches!(result, Err(Error::InvalidEndpoint(_))));
    }
}
