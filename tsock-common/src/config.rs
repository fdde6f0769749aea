//! # Client Configuration
//!
//! Serializable settings for a `StreamClient`. Missing fields fall back to the
//! built-in defaults, so a document only needs to name what it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StreamResult;
use crate::types::{
    millis_to_timeout, Endpoint, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_PORT,
    DEFAULT_RECV_TIMEOUT_MS, DEFAULT_SEND_TIMEOUT_MS,
};

/// Configuration for a single stream client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote hostname or address, e.g. "127.0.0.1".
    pub host: String,
    /// Remote TCP port.
    pub port: u16,
    /// Reuse one process-wide connection per endpoint and keep it on close.
    pub persistent: bool,
    /// Connect deadline in milliseconds (0 = block).
    pub connect_timeout_ms: u64,
    /// Send deadline in milliseconds (0 = block).
    pub send_timeout_ms: u64,
    /// Receive deadline in milliseconds (0 = block).
    pub recv_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            persistent: false,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            recv_timeout_ms: DEFAULT_RECV_TIMEOUT_MS,
        }
    }
}

impl ClientConfig {
    /// Parses a JSON document, filling absent fields from `Default`.
    pub fn from_json_str(input: &str) -> StreamResult<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        millis_to_timeout(self.connect_timeout_ms)
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        millis_to_timeout(self.send_timeout_ms)
    }

    pub fn recv_timeout(&self) -> Option<Duration> {
        millis_to_timeout(self.recv_timeout_ms)
    }
}
