//! # Persistent Connection Registry
//!
//! Purpose: Keep an idle TCP connection per endpoint alive for the whole
//! process so persistent clients can come and go without a new handshake.
//!
//! ## Design Principles
//! 1. **Exclusive Check-Out**: `acquire` removes the connection from the map;
//!    while a client holds it nobody else can touch its socket or deadline.
//! 2. **Check-In on Drop**: A dropped persistent client parks its connection
//!    again. At most one idle connection is kept per endpoint.
//! 3. **Minimal Locking**: The mutex is held for map access only, never
//!    across a connect or a liveness check.

use std::collections::HashMap;
use std::io;
use std::net::{Shutdown, TcpStream};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use tracing::{debug, trace};
use tsock_common::Endpoint;

use crate::handle::connect_stream;

static REGISTRY: OnceLock<Mutex<HashMap<Endpoint, TcpStream>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<Endpoint, TcpStream>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Checks out the idle connection for `endpoint`, or connects a new one when
/// none is parked or the parked one is dead.
pub(crate) fn acquire(endpoint: &Endpoint, timeout: Option<Duration>) -> io::Result<TcpStream> {
    let parked = registry()
        .lock()
        .expect("registry mutex poisoned")
        .remove(endpoint);

    if let Some(stream) = parked {
        if is_live(&stream) {
            debug!(%endpoint, "reusing persistent connection");
            return Ok(stream);
        }
        debug!(%endpoint, "dropping dead persistent connection");
    }

    let stream = connect_stream(endpoint, timeout)?;
    debug!(%endpoint, "connected persistent connection");
    Ok(stream)
}

/// Parks a connection for the next persistent `open` on `endpoint`.
///
/// If another connection is already parked the surplus one is shut down.
pub(crate) fn check_in(endpoint: &Endpoint, stream: TcpStream) {
    let mut map = registry().lock().expect("registry mutex poisoned");
    if map.contains_key(endpoint) {
        drop(map);
        if let Err(err) = stream.shutdown(Shutdown::Both) {
            trace!(%endpoint, error = %err, "shutdown of surplus connection failed");
        }
        debug!(%endpoint, "closed surplus persistent connection");
        return;
    }
    map.insert(endpoint.clone(), stream);
    debug!(%endpoint, "parked persistent connection");
}

/// Evicts the parked connection for `endpoint` and shuts it down.
///
/// Returns true when an entry existed. Connections checked out by open
/// clients are not affected.
pub fn forget(endpoint: &Endpoint) -> bool {
    let removed = registry()
        .lock()
        .expect("registry mutex poisoned")
        .remove(endpoint);
    match removed {
        Some(stream) => {
            if let Err(err) = stream.shutdown(Shutdown::Both) {
                trace!(%endpoint, error = %err, "shutdown on forget failed");
            }
            debug!(%endpoint, "forgot persistent connection");
            true
        }
        None => false,
    }
}

/// Number of endpoints with a parked connection.
pub fn registered_count() -> usize {
    registry().lock().expect("registry mutex poisoned").len()
}

/// Checks that a parked stream still has a connected peer.
///
/// The stream is checked out, so toggling its blocking flag affects nobody
/// else. A non-blocking peek tells a pending FIN (`Ok(0)`) apart from an idle
/// but healthy socket (`WouldBlock`).
fn is_live(stream: &TcpStream) -> bool {
    if stream.peer_addr().is_err() || !matches!(stream.take_error(), Ok(None)) {
        return false;
    }
    if stream.set_nonblocking(true).is_err() {
        return false;
    }
    let mut byte = [0u8; 1];
    let live = match stream.peek(&mut byte) {
        Ok(0) => false,
        Ok(_) => true,
        Err(err) => err.kind() == io::ErrorKind::WouldBlock,
    };
    stream.set_nonblocking(false).is_ok() && live
}
