//! # Coax ZMTP
//!
//! ZMTP 3.0 wire-protocol engine over `compio`.
//!
//! ## Overview
//!
//! Coax implements the connection lifecycle of a ZeroMQ-style message
//! queue endpoint:
//! - **Greeting** exchange with signature, version, and security
//!   mechanism validation
//! - **NULL mechanism** handshake with READY metadata (socket type,
//!   identity, `x-` application properties)
//! - **Framing** for single and multipart messages, short and long
//!   lengths, command frames
//! - **Connection registry** with per-peer receive loops, identity-keyed
//!   lookup, broadcast, and automatic eviction on failure
//! - **Connect/bind** control loops with dial retry and a handshake
//!   deadline
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use coax_core::socket_type::SocketType;
//! use coax_zmtp::Socket;
//!
//! #[compio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Socket::server(SocketType::Server);
//!     let addr = server.bind("tcp://127.0.0.1:0").await?;
//!
//!     let client = Socket::client(SocketType::Client);
//!     client.connect(&format!("tcp://{addr}")).await?;
//!
//!     client.send("HELLO").await?;
//!     let msg = server.recv().await?;
//!     println!("{msg:?}");
//!     Ok(())
//! }
//! ```

#![cfg_attr(not(test), deny(unsafe_code))]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod codec;
pub mod command;
pub mod connection;
pub mod greeting;
pub mod handshake;
pub mod mechanism;
pub mod metadata;
pub mod registry;
pub mod socket;

pub use codec::{Frame, FrameDecoder, WireUnit};
pub use command::Command;
pub use connection::Connection;
pub use greeting::Greeting;
pub use mechanism::{Mechanism, MechanismKind};
pub use metadata::PeerMetadata;
pub use registry::ConnectionRegistry;
pub use socket::Socket;

pub use coax_core::error::{Error, Result};
pub use coax_core::message::Message;
pub use coax_core::options::SocketOptions;
pub use coax_core::socket_type::{Role, SocketType};
