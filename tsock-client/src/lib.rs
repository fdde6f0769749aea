//! # tsock Blocking Stream Client
//!
//! Purpose: Provide a synchronous TCP client with separate connect, send and
//! receive deadlines and byte-exact reads and writes, for transports that
//! frame their own messages on top.
//!
//! ## Design Principles
//! 1. **One Handle, One Owner**: A `StreamClient` exclusively owns its socket.
//! 2. **Explicit Timeout Mode**: The shared socket deadline is switched before
//!    each direction change instead of being reset on every call.
//! 3. **Exactness**: `write` and `read_exact` either move every byte or fail
//!    with a typed error.
//! 4. **Persistent Reuse**: Persistent clients share one registered connection
//!    per endpoint across open/close cycles.

mod client;
mod handle;
mod listener;
pub mod persist;

pub use client::StreamClient;
pub use handle::StreamHandle;
pub use listener::StreamListener;
pub use tsock_common::{
    ClientConfig, ConnectError, Endpoint, StreamError, StreamResult, TimeoutMode, TransferError,
};
