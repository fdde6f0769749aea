//! # Error Taxonomy
//!
//! Errors surfaced by the stream client. Connection setup and data transfer
//! fail in different ways, so they get separate enums; `StreamError` joins them
//! for callers that drive a whole session through `?`.
//!
//! Timeouts are kept apart from other failures in every direction: a caller
//! framing RPC messages needs to know whether the peer was slow or gone.

use std::io;

use thiserror::Error;

use crate::types::TimeoutMode;

/// Result type for a whole client session.
pub type StreamResult<T> = Result<T, StreamError>;

/// Failures while establishing (or accepting) a connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// `open` was called on a client that already holds a handle.
    #[error("socket already connected")]
    AlreadyOpen,
    /// The configured host is empty.
    #[error("cannot open null host")]
    InvalidHost,
    /// The configured port is zero.
    #[error("cannot open without port")]
    InvalidPort,
    /// The underlying connect failed, timed out or the host did not resolve.
    #[error("could not connect to {host}:{port} ({errstr} [{errno}])")]
    ConnectFailed {
        host: String,
        port: u16,
        /// OS error number, `0` when the failure did not come from the OS.
        errno: i32,
        errstr: String,
    },
    /// The listener could not bind its local address.
    #[error("bind failed: {0}")]
    Bind(#[source] io::Error),
    /// The listener failed to accept or prepare a peer connection.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
}

impl ConnectError {
    /// Builds a `ConnectFailed` from the last OS error seen for an endpoint.
    pub fn connect_failed(host: &str, port: u16, err: &io::Error) -> Self {
        ConnectError::ConnectFailed {
            host: host.to_string(),
            port,
            errno: err.raw_os_error().unwrap_or(0),
            errstr: err.to_string(),
        }
    }
}

/// Failures while moving bytes over an open connection.
#[derive(Debug, Error)]
pub enum TransferError {
    /// An I/O operation was issued on a client without a handle.
    #[error("socket not open")]
    NotOpen,
    /// The receive deadline expired before the requested data arrived.
    #[error("timed out reading {len} bytes from {host}:{port}")]
    ReadTimeout { host: String, port: u16, len: usize },
    /// The peer closed, reset, or the read failed for a non-timeout reason.
    #[error("could not read {len} bytes from {host}:{port}")]
    ReadFailed { host: String, port: u16, len: usize },
    /// The send deadline expired; `len` is the unwritten remainder.
    #[error("timed out writing {len} bytes to {host}:{port}")]
    WriteTimeout { host: String, port: u16, len: usize },
    /// The write failed for a non-timeout reason; `len` is the unwritten remainder.
    #[error("could not write {len} bytes to {host}:{port}")]
    WriteFailed { host: String, port: u16, len: usize },
    /// Flushing buffered output failed.
    #[error("could not flush {host}:{port}")]
    FlushFailed { host: String, port: u16 },
    /// The OS rejected a deadline update on the handle.
    #[error("could not set {mode} timeout: {source}")]
    TimeoutConfig {
        mode: TimeoutMode,
        #[source]
        source: io::Error,
    },
}

impl TransferError {
    /// Returns true for the deadline-expired variants.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            TransferError::ReadTimeout { .. } | TransferError::WriteTimeout { .. }
        )
    }
}

/// Umbrella error covering setup, transfer and configuration.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    /// A configuration document could not be parsed.
    #[error("invalid client config: {0}")]
    Config(#[from] serde_json::Error),
}
