//! Coax Core
//!
//! Runtime building blocks shared by the coax protocol crates:
//! - Error types (`error`)
//! - Endpoint parsing (`endpoint`)
//! - Socket-type enumeration and compatibility rules (`socket_type`)
//! - Application-visible message type (`message`)
//! - Socket options (`options`)
//! - Dial retry policy (`retry`)
//! - TCP socket utilities (`tcp`)

#![cfg_attr(not(test), deny(unsafe_code))]
#![allow(clippy::module_name_repetitions)]

pub mod endpoint;
pub mod error;
pub mod message;
pub mod options;
pub mod retry;
pub mod socket_type;
pub mod tcp;

pub mod prelude {
    pub use crate::endpoint::Endpoint;
    pub use crate::error::{Error, Result};
    pub use crate::message::Message;
    pub use crate::options::SocketOptions;
    pub use crate::retry::RetryPolicy;
    pub use crate::socket_type::{Role, SocketType};
}
