//! # Stream Handle
//!
//! Purpose: Abstract the OS socket behind a small trait so the client logic
//! (mode switching, accumulation loops) is independent of how bytes move.
//!
//! ## Design Principles
//! 1. **Strategy Pattern**: `StreamClient<H>` is generic over the handle, so the
//!    hot path stays monomorphic while tests can script partial transfers.
//! 2. **Single Deadline**: `set_io_timeout` installs one deadline for both
//!    directions, matching a socket whose timeout is shared by send and receive.
//! 3. **Fail Fast**: Connect tries every resolved address once and reports the
//!    last OS error.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tsock_common::Endpoint;

use crate::persist;

/// Bidirectional byte stream owned by a `StreamClient`.
pub trait StreamHandle: Read + Write + Sized {
    /// Opens a fresh connection to `endpoint`.
    fn connect(endpoint: &Endpoint, timeout: Option<Duration>) -> io::Result<Self>;

    /// Opens or reuses a connection that outlives the client's `close`.
    ///
    /// Handles without a process-wide registry connect afresh.
    fn connect_persistent(endpoint: &Endpoint, timeout: Option<Duration>) -> io::Result<Self> {
        Self::connect(endpoint, timeout)
    }

    /// Installs the deadline shared by reads and writes (`None` blocks).
    fn set_io_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Tears the connection down before the handle is dropped.
    fn release(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Hands a persistent connection back for the next persistent `open`.
    ///
    /// Handles without a registry are simply dropped.
    fn park(self, _endpoint: &Endpoint) {}
}

impl StreamHandle for TcpStream {
    fn connect(endpoint: &Endpoint, timeout: Option<Duration>) -> io::Result<Self> {
        connect_stream(endpoint, timeout)
    }

    fn connect_persistent(endpoint: &Endpoint, timeout: Option<Duration>) -> io::Result<Self> {
        persist::acquire(endpoint, timeout)
    }

    fn set_io_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)?;
        self.set_write_timeout(timeout)
    }

    fn release(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }

    fn park(self, endpoint: &Endpoint) {
        persist::check_in(endpoint, self);
    }
}

/// Returns true when an I/O error means the socket deadline expired.
///
/// Unix reports `SO_RCVTIMEO`/`SO_SNDTIMEO` expiry as `WouldBlock`, Windows as
/// `TimedOut`.
#[inline]
pub(crate) fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Resolves `endpoint` and connects to the first address that accepts.
pub(crate) fn connect_stream(endpoint: &Endpoint, timeout: Option<Duration>) -> io::Result<TcpStream> {
    let addrs = (endpoint.host.as_str(), endpoint.port).to_socket_addrs()?;
    let mut last_err = None;
    for addr in addrs {
        let attempt = match timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => {
                // Small RPC frames should not wait on Nagle.
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "host resolved to no addresses",
        )
    }))
}
