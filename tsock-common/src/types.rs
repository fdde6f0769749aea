//! # Stream Client Types
//!
//! Small value types shared by the client, the listener and the error taxonomy.
//!
//! ## Design Principles
//!
//! 1. **Explicit Mode State**: The socket keeps a single OS-level deadline that is
//!    reused for both directions, so the active direction is tracked as a value
//!    instead of being inferred from ambient socket state.
//! 2. **Cheap Identity**: `Endpoint` is a plain owned pair that doubles as a map key.

use std::fmt;
use std::time::Duration;

/// Default remote port used when none is configured.
pub const DEFAULT_PORT: u16 = 9090;

/// Default connect deadline in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1000;

/// Default send deadline in milliseconds.
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 100;

/// Default receive deadline in milliseconds.
pub const DEFAULT_RECV_TIMEOUT_MS: u64 = 750;

/// Which deadline is currently pushed to the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutMode {
    /// The send deadline is active.
    Send,
    /// The receive deadline is active.
    Recv,
}

impl fmt::Display for TimeoutMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutMode::Send => f.write_str("send"),
            TimeoutMode::Recv => f.write_str("recv"),
        }
    }
}

/// Remote host and port of a stream connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Converts a millisecond setting into a socket deadline.
///
/// Sockets reject a zero-length timeout, so `0` maps to `None` (block forever).
#[inline]
pub fn millis_to_timeout(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}
