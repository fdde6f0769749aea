//! # Stream Listener
//!
//! Purpose: Accept inbound TCP connections and hand each one out as an
//! attached `StreamClient`, so both sides of a link share the same timed I/O.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use tracing::debug;

use tsock_common::{ConnectError, DEFAULT_RECV_TIMEOUT_MS, DEFAULT_SEND_TIMEOUT_MS};

use crate::client::StreamClient;

/// Blocking listener producing attached clients.
pub struct StreamListener {
    listener: TcpListener,
    send_timeout_ms: u64,
    recv_timeout_ms: u64,
}

impl StreamListener {
    /// Binds the listener, e.g. to "127.0.0.1:0" for an ephemeral port.
    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self, ConnectError> {
        let listener = TcpListener::bind(addr).map_err(ConnectError::Bind)?;
        Ok(StreamListener {
            listener,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            recv_timeout_ms: DEFAULT_RECV_TIMEOUT_MS,
        })
    }

    /// Sets the deadlines given to every accepted client.
    pub fn with_timeouts(mut self, send_ms: u64, recv_ms: u64) -> Self {
        self.send_timeout_ms = send_ms;
        self.recv_timeout_ms = recv_ms;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Blocks until a peer connects.
    ///
    /// The returned client is open, non-persistent, and named after the peer.
    pub fn accept(&self) -> Result<StreamClient<TcpStream>, ConnectError> {
        let (stream, peer) = self.listener.accept().map_err(ConnectError::Accept)?;
        stream.set_nodelay(true).map_err(ConnectError::Accept)?;

        let mut client = StreamClient::new(peer.ip().to_string(), peer.port(), false);
        client.set_send_timeout(self.send_timeout_ms);
        client.set_recv_timeout(self.recv_timeout_ms);
        client.attach(stream);
        debug!(%peer, "accepted stream");
        Ok(client)
    }
}
