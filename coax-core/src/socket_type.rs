//! Socket-type enumeration and peering rules.
//!
//! CLIENT, SERVER, PUSH, PULL and DEALER carry full engine support; the
//! remaining types are negotiated on the wire but their messaging patterns
//! live outside this crate.

use std::fmt;

use crate::error::Error;

/// ZMTP socket types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketType {
    /// CLIENT socket, talks to SERVER
    Client,
    /// SERVER socket, talks to CLIENT
    Server,
    /// PUSH socket for distributing messages to pullers
    Push,
    /// PULL socket for receiving messages from pushers
    Pull,
    /// DEALER socket for asynchronous request-reply
    Dealer,
    /// ROUTER socket for identity-based routing
    Router,
    /// REQ socket for synchronous request-reply clients
    Req,
    /// REP socket for synchronous reply servers
    Rep,
    /// PUB socket for publishing
    Pub,
    /// SUB socket for subscribing
    Sub,
    /// XPUB socket, publisher with subscription visibility
    XPub,
    /// XSUB socket, subscriber with explicit subscription frames
    XSub,
}

impl SocketType {
    /// Get the socket type as its wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "CLIENT",
            Self::Server => "SERVER",
            Self::Push => "PUSH",
            Self::Pull => "PULL",
            Self::Dealer => "DEALER",
            Self::Router => "ROUTER",
            Self::Req => "REQ",
            Self::Rep => "REP",
            Self::Pub => "PUB",
            Self::Sub => "SUB",
            Self::XPub => "XPUB",
            Self::XSub => "XSUB",
        }
    }

    /// Parse a socket type from its wire name.
    pub fn from_wire(value: &[u8]) -> Result<Self, Error> {
        match value {
            b"CLIENT" => Ok(Self::Client),
            b"SERVER" => Ok(Self::Server),
            b"PUSH" => Ok(Self::Push),
            b"PULL" => Ok(Self::Pull),
            b"DEALER" => Ok(Self::Dealer),
            b"ROUTER" => Ok(Self::Router),
            b"REQ" => Ok(Self::Req),
            b"REP" => Ok(Self::Rep),
            b"PUB" => Ok(Self::Pub),
            b"SUB" => Ok(Self::Sub),
            b"XPUB" => Ok(Self::XPub),
            b"XSUB" => Ok(Self::XSub),
            other => Err(Error::protocol(format!(
                "unknown socket type {:?}",
                String::from_utf8_lossy(other)
            ))),
        }
    }

    /// Check whether a peer of type `peer` may talk to this socket.
    ///
    /// The relation is symmetric: `a.is_compatible(b) == b.is_compatible(a)`.
    #[must_use]
    pub const fn is_compatible(&self, peer: SocketType) -> bool {
        matches!(
            (self, peer),
            (Self::Client, Self::Server)
                | (Self::Server, Self::Client)
                | (Self::Push, Self::Pull)
                | (Self::Pull, Self::Push)
                | (Self::Req, Self::Rep)
                | (Self::Rep, Self::Req)
                | (Self::Req, Self::Router)
                | (Self::Router, Self::Req)
                | (Self::Dealer, Self::Rep)
                | (Self::Rep, Self::Dealer)
                | (Self::Dealer, Self::Router)
                | (Self::Router, Self::Dealer)
                | (Self::Dealer, Self::Dealer)
                | (Self::Router, Self::Router)
                | (Self::Pub, Self::Sub)
                | (Self::Sub, Self::Pub)
                | (Self::Pub, Self::XSub)
                | (Self::XSub, Self::Pub)
                | (Self::XPub, Self::Sub)
                | (Self::Sub, Self::XPub)
                | (Self::XPub, Self::XSub)
                | (Self::XSub, Self::XPub)
        )
    }
}

impl fmt::Display for SocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role of a socket, fixed at construction.
///
/// A client-role socket may only `connect`; a server-role socket may only
/// `bind`. The role also sets the as-server flag in the greeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    /// Value of the greeting's as-server byte for this role.
    #[must_use]
    pub const fn as_server(&self) -> bool {
        matches!(self, Self::Server)
    }
}
