//! TCP socket utilities.
//!
//! # Safety
//!
//! This module uses unsafe code to reach the raw file descriptor/socket of a
//! compio `TcpStream` for configuration and shutdown. The unsafe operations
//! are encapsulated and safe to use from the public API.

#![allow(unsafe_code)]

use std::io;
use std::net::Shutdown;

/// Enable TCP_NODELAY on a compio `TcpStream`.
///
/// Disables Nagle's algorithm; essential for request-reply round trips.
#[inline]
pub fn enable_tcp_nodelay(stream: &compio::net::TcpStream) -> io::Result<()> {
    with_socket(stream, |sock| sock.set_nodelay(true))
}

/// Shut down both directions of a compio `TcpStream`.
///
/// `try_clone` duplicates the descriptor, so merely dropping one half does
/// not close the socket. Shutting down the underlying socket is what
/// unblocks a receive loop parked on a read of a cloned stream.
#[inline]
pub fn shutdown_stream(stream: &compio::net::TcpStream) -> io::Result<()> {
    with_socket(stream, |sock| sock.shutdown(Shutdown::Both))
}

fn with_socket(
    stream: &compio::net::TcpStream,
    f: impl FnOnce(&socket2::Socket) -> io::Result<()>,
) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::io::{AsRawFd, FromRawFd};
        let fd = stream.as_raw_fd();
        let sock = unsafe { socket2::Socket::from_raw_fd(fd) };
        let res = f(&sock);
        std::mem::forget(sock); // Don't close the fd
        res
    }

    #[cfg(windows)]
    {
        use std::os::windows::io::{AsRawSocket, FromRawSocket};
        let raw = stream.as_raw_socket();
        let sock = unsafe { socket2::Socket::from_raw_socket(raw) };
        let res = f(&sock);
        std::mem::forget(sock); // Don't close the socket
        res
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = (stream, f);
        Ok(())
    }
}
