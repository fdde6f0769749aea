//! # Blocking Stream Client
//!
//! Purpose: Own one stream socket and move exact byte counts over it with
//! separate connect, send and receive deadlines.
//!
//! ## Design Principles
//! 1. **Explicit Mode State**: The socket holds one deadline at a time; the
//!    client records which one is installed and switches it before each
//!    read or write that needs the other.
//! 2. **Accumulate, Then Succeed**: `write` and `read_exact` loop over partial
//!    transfers and only return `Ok` once the full amount moved.
//! 3. **Timeouts Stay Distinct**: Every failure says whether a deadline expired
//!    or the peer failed, so framing layers can decide how to react.
//! 4. **Single Owner**: All I/O takes `&mut self`; the handle never leaves the
//!    client.

use std::io::{self, Read, Write};
use std::net::TcpStream;

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, warn};

use tsock_common::{
    millis_to_timeout, ClientConfig, ConnectError, Endpoint, TimeoutMode, TransferError,
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_RECV_TIMEOUT_MS, DEFAULT_SEND_TIMEOUT_MS,
};

use crate::handle::{is_timeout, StreamHandle};

/// Upper bound on buffer growth per underlying read, so a bogus length from a
/// peer does not allocate the whole amount before any data arrives.
const READ_CHUNK: usize = 64 * 1024;

/// Blocking client over a single stream handle.
///
/// Created closed; `open` connects, `close` releases the handle unless the
/// client is persistent.
pub struct StreamClient<H: StreamHandle = TcpStream> {
    endpoint: Endpoint,
    persistent: bool,
    connect_timeout_ms: u64,
    send_timeout_ms: u64,
    recv_timeout_ms: u64,
    handle: Option<H>,
    // Deadline last pushed to `handle`; `None` until the first push.
    timeout_mode: Option<TimeoutMode>,
}

impl StreamClient<TcpStream> {
    /// Creates a closed TCP client. Does not touch the network.
    pub fn new(host: impl Into<String>, port: u16, persistent: bool) -> Self {
        Self::for_endpoint(Endpoint::new(host, port), persistent)
    }

    /// Creates a closed TCP client from a configuration value.
    pub fn with_config(config: &ClientConfig) -> Self {
        let mut client = Self::new(config.host.clone(), config.port, config.persistent);
        client.set_connect_timeout(config.connect_timeout_ms);
        client.set_send_timeout(config.send_timeout_ms);
        client.set_recv_timeout(config.recv_timeout_ms);
        client
    }
}

impl<H: StreamHandle> StreamClient<H> {
    /// Creates a closed client for any handle type.
    pub fn for_endpoint(endpoint: Endpoint, persistent: bool) -> Self {
        StreamClient {
            endpoint,
            persistent,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            recv_timeout_ms: DEFAULT_RECV_TIMEOUT_MS,
            handle: None,
            timeout_mode: None,
        }
    }

    pub fn host(&self) -> &str {
        &self.endpoint.host
    }

    pub fn port(&self) -> u16 {
        self.endpoint.port
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Connect deadline in milliseconds.
    pub fn connect_timeout(&self) -> u64 {
        self.connect_timeout_ms
    }

    pub fn send_timeout(&self) -> u64 {
        self.send_timeout_ms
    }

    pub fn recv_timeout(&self) -> u64 {
        self.recv_timeout_ms
    }

    /// Sets the connect deadline used by the next `open`.
    pub fn set_connect_timeout(&mut self, ms: u64) {
        self.connect_timeout_ms = ms;
    }

    /// Sets the send deadline.
    ///
    /// An open handle already in send mode keeps its old deadline until the
    /// client switches to receive and back.
    pub fn set_send_timeout(&mut self, ms: u64) {
        self.send_timeout_ms = ms;
    }

    /// Sets the receive deadline, with the same deferred effect as
    /// [`set_send_timeout`](Self::set_send_timeout).
    pub fn set_recv_timeout(&mut self, ms: u64) {
        self.recv_timeout_ms = ms;
    }

    /// Returns true while a handle is attached.
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Deadline currently installed on the handle, `None` while closed or
    /// before the first operation on an attached handle.
    pub fn timeout_mode(&self) -> Option<TimeoutMode> {
        if self.handle.is_some() {
            self.timeout_mode
        } else {
            None
        }
    }

    /// Connects to the configured endpoint.
    ///
    /// On success the send deadline is already installed, so a first write
    /// needs no switch.
    pub fn open(&mut self) -> Result<(), ConnectError> {
        if self.is_open() {
            return Err(ConnectError::AlreadyOpen);
        }
        if self.endpoint.host.is_empty() {
            return Err(ConnectError::InvalidHost);
        }
        if self.endpoint.port == 0 {
            return Err(ConnectError::InvalidPort);
        }

        let timeout = millis_to_timeout(self.connect_timeout_ms);
        let connected = if self.persistent {
            H::connect_persistent(&self.endpoint, timeout)
        } else {
            H::connect(&self.endpoint, timeout)
        };
        let mut handle = connected.map_err(|err| {
            warn!(endpoint = %self.endpoint, error = %err, "connect failed");
            ConnectError::connect_failed(&self.endpoint.host, self.endpoint.port, &err)
        })?;

        handle
            .set_io_timeout(millis_to_timeout(self.send_timeout_ms))
            .map_err(|err| {
                ConnectError::connect_failed(&self.endpoint.host, self.endpoint.port, &err)
            })?;

        self.handle = Some(handle);
        self.timeout_mode = Some(TimeoutMode::Send);
        debug!(endpoint = %self.endpoint, persistent = self.persistent, "stream opened");
        Ok(())
    }

    /// Attaches an already-connected handle, e.g. one accepted by a listener.
    ///
    /// A previously held handle is released as by [`close`](Self::close), or
    /// parked for reuse when the client is persistent. No deadline is assumed
    /// on the new handle; the first operation installs its own.
    pub fn attach(&mut self, handle: H) {
        if let Some(mut previous) = self.handle.take() {
            if self.persistent {
                previous.park(&self.endpoint);
            } else if let Err(err) = previous.release() {
                trace!(endpoint = %self.endpoint, error = %err, "shutdown of replaced handle failed");
            }
        }
        self.handle = Some(handle);
        self.timeout_mode = None;
        debug!(endpoint = %self.endpoint, "stream attached");
    }

    /// Releases the handle. Does nothing for persistent clients.
    pub fn close(&mut self) {
        if self.persistent {
            return;
        }
        if let Some(mut handle) = self.handle.take() {
            if let Err(err) = handle.release() {
                trace!(endpoint = %self.endpoint, error = %err, "shutdown on close failed");
            }
            debug!(endpoint = %self.endpoint, "stream closed");
        }
        self.timeout_mode = None;
    }

    /// Writes the whole buffer, retrying partial writes.
    ///
    /// On failure the error carries the number of bytes still unwritten.
    pub fn write(&mut self, buf: &[u8]) -> Result<(), TransferError> {
        self.ensure_mode(TimeoutMode::Send)?;
        let (endpoint, handle) = self.io_parts()?;

        let mut remaining = buf;
        while !remaining.is_empty() {
            match handle.write(remaining) {
                Ok(0) => return Err(write_error(endpoint, remaining.len(), None)),
                Ok(written) => {
                    remaining = &remaining[written..];
                    trace!(%endpoint, written, remaining = remaining.len(), "partial write");
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(write_error(endpoint, remaining.len(), Some(&err))),
            }
        }
        Ok(())
    }

    /// Pushes buffered output down to the OS.
    pub fn flush(&mut self) -> Result<(), TransferError> {
        let (endpoint, handle) = self.io_parts()?;
        handle.flush().map_err(|err| {
            warn!(%endpoint, error = %err, "flush failed");
            TransferError::FlushFailed {
                host: endpoint.host.clone(),
                port: endpoint.port,
            }
        })
    }

    /// Issues one read of up to `len` bytes.
    ///
    /// May return fewer bytes than requested; use [`read_exact`](Self::read_exact)
    /// when the size is known.
    pub fn read(&mut self, len: usize) -> Result<Bytes, TransferError> {
        self.ensure_mode(TimeoutMode::Recv)?;
        let (endpoint, handle) = self.io_parts()?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let mut buf = BytesMut::zeroed(len.min(READ_CHUNK));
        loop {
            match handle.read(&mut buf) {
                Ok(0) => return Err(read_error(endpoint, len, None)),
                Ok(got) => {
                    buf.truncate(got);
                    return Ok(buf.freeze());
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(read_error(endpoint, len, Some(&err))),
            }
        }
    }

    /// Reads exactly `len` bytes, accumulating short reads.
    ///
    /// Errors report the originally requested `len`, not the remainder. The
    /// buffer grows as data arrives rather than being sized to `len` up front.
    pub fn read_exact(&mut self, len: usize) -> Result<Bytes, TransferError> {
        self.ensure_mode(TimeoutMode::Recv)?;
        let (endpoint, handle) = self.io_parts()?;

        let mut buf = BytesMut::with_capacity(len.min(READ_CHUNK));
        while buf.len() < len {
            let filled = buf.len();
            buf.resize(filled + (len - filled).min(READ_CHUNK), 0);
            match handle.read(&mut buf[filled..]) {
                Ok(0) => return Err(read_error(endpoint, len, None)),
                Ok(got) => {
                    buf.truncate(filled + got);
                    if buf.len() < len {
                        trace!(%endpoint, got, remaining = len - buf.len(), "short read");
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => buf.truncate(filled),
                Err(err) => return Err(read_error(endpoint, len, Some(&err))),
            }
        }
        Ok(buf.freeze())
    }

    /// Installs the deadline for `mode` unless it is already active.
    fn ensure_mode(&mut self, mode: TimeoutMode) -> Result<(), TransferError> {
        let handle = self.handle.as_mut().ok_or(TransferError::NotOpen)?;
        if self.timeout_mode == Some(mode) {
            return Ok(());
        }
        let ms = match mode {
            TimeoutMode::Send => self.send_timeout_ms,
            TimeoutMode::Recv => self.recv_timeout_ms,
        };
        handle
            .set_io_timeout(millis_to_timeout(ms))
            .map_err(|source| TransferError::TimeoutConfig { mode, source })?;
        self.timeout_mode = Some(mode);
        trace!(endpoint = %self.endpoint, %mode, timeout_ms = ms, "timeout mode switched");
        Ok(())
    }

    fn io_parts(&mut self) -> Result<(&Endpoint, &mut H), TransferError> {
        match self.handle.as_mut() {
            Some(handle) => Ok((&self.endpoint, handle)),
            None => Err(TransferError::NotOpen),
        }
    }
}

impl<H: StreamHandle> Drop for StreamClient<H> {
    fn drop(&mut self) {
        if self.persistent {
            if let Some(handle) = self.handle.take() {
                handle.park(&self.endpoint);
            }
        } else {
            self.close();
        }
    }
}

fn read_error(endpoint: &Endpoint, len: usize, err: Option<&io::Error>) -> TransferError {
    let host = endpoint.host.clone();
    let port = endpoint.port;
    match err {
        Some(err) if is_timeout(err) => {
            warn!(%endpoint, len, "read timed out");
            TransferError::ReadTimeout { host, port, len }
        }
        Some(err) => {
            warn!(%endpoint, len, error = %err, "read failed");
            TransferError::ReadFailed { host, port, len }
        }
        None => {
            warn!(%endpoint, len, "read returned no data");
            TransferError::ReadFailed { host, port, len }
        }
    }
}

fn write_error(endpoint: &Endpoint, remaining: usize, err: Option<&io::Error>) -> TransferError {
    let host = endpoint.host.clone();
    let port = endpoint.port;
    match err {
        Some(err) if is_timeout(err) => {
            warn!(%endpoint, remaining, "write timed out");
            TransferError::WriteTimeout {
                host,
                port,
                len: remaining,
            }
        }
        Some(err) => {
            warn!(%endpoint, remaining, error = %err, "write failed");
            TransferError::WriteFailed {
                host,
                port,
                len: remaining,
            }
        }
        None => {
            warn!(%endpoint, remaining, "write accepted no bytes");
            TransferError::WriteFailed {
                host,
                port,
                len: remaining,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Timeout(Option<Duration>),
        Write(Vec<u8>),
        Read(Vec<u8>),
        Flush,
        Release,
        Park,
    }

    enum ReadStep {
        Data(Vec<u8>),
        Timeout,
        Eof,
        Reset,
        Interrupted,
    }

    enum WriteStep {
        Accept(usize),
        Timeout,
        Reset,
        Zero,
        Interrupted,
    }

    /// In-memory handle replaying scripted transfers and recording every call.
    struct ScriptedHandle {
        reads: VecDeque<ReadStep>,
        writes: VecDeque<WriteStep>,
        flush_fails: bool,
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl ScriptedHandle {
        fn new() -> (Self, Arc<Mutex<Vec<Event>>>) {
            let events = Arc::new(Mutex::new(Vec::new()));
            let handle = ScriptedHandle {
                reads: VecDeque::new(),
                writes: VecDeque::new(),
                flush_fails: false,
                events: events.clone(),
            };
            (handle, events)
        }

        fn read_step(mut self, step: ReadStep) -> Self {
            self.reads.push_back(step);
            self
        }

        fn write_step(mut self, step: WriteStep) -> Self {
            self.writes.push_back(step);
            self
        }

        fn record(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl Read for ScriptedHandle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(ReadStep::Data(mut data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    let rest = data.split_off(n);
                    if !rest.is_empty() {
                        self.reads.push_front(ReadStep::Data(rest));
                    }
                    self.record(Event::Read(data));
                    Ok(n)
                }
                Some(ReadStep::Timeout) | None => Err(io::ErrorKind::WouldBlock.into()),
                Some(ReadStep::Eof) => Ok(0),
                Some(ReadStep::Reset) => Err(io::ErrorKind::ConnectionReset.into()),
                Some(ReadStep::Interrupted) => Err(io::ErrorKind::Interrupted.into()),
            }
        }
    }

    impl Write for ScriptedHandle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            match self.writes.pop_front() {
                Some(WriteStep::Accept(n)) => {
                    let n = n.min(buf.len());
                    self.record(Event::Write(buf[..n].to_vec()));
                    Ok(n)
                }
                None => {
                    self.record(Event::Write(buf.to_vec()));
                    Ok(buf.len())
                }
                Some(WriteStep::Timeout) => Err(io::ErrorKind::TimedOut.into()),
                Some(WriteStep::Reset) => Err(io::ErrorKind::BrokenPipe.into()),
                Some(WriteStep::Zero) => Ok(0),
                Some(WriteStep::Interrupted) => Err(io::ErrorKind::Interrupted.into()),
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            if self.flush_fails {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            self.record(Event::Flush);
            Ok(())
        }
    }

    thread_local! {
        // Handle returned by the next `connect`; refused when empty.
        static NEXT_CONNECT: RefCell<Option<ScriptedHandle>> = RefCell::new(None);
    }

    fn accept_next_connect(handle: ScriptedHandle) {
        NEXT_CONNECT.with(|slot| *slot.borrow_mut() = Some(handle));
    }

    impl StreamHandle for ScriptedHandle {
        fn connect(_endpoint: &Endpoint, _timeout: Option<Duration>) -> io::Result<Self> {
            NEXT_CONNECT
                .with(|slot| slot.borrow_mut().take())
                .ok_or_else(|| io::ErrorKind::ConnectionRefused.into())
        }

        fn set_io_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
            self.record(Event::Timeout(timeout));
            Ok(())
        }

        fn release(&mut self) -> io::Result<()> {
            self.record(Event::Release);
            Ok(())
        }

        fn park(self, _endpoint: &Endpoint) {
            self.record(Event::Park);
        }
    }

    fn attached(handle: ScriptedHandle) -> StreamClient<ScriptedHandle> {
        let mut client = StreamClient::for_endpoint(Endpoint::new("peer", 9090), false);
        client.attach(handle);
        client
    }

    fn ms(value: u64) -> Event {
        Event::Timeout(Some(Duration::from_millis(value)))
    }

    #[test]
    fn defaults_and_accessors() {
        let client = StreamClient::new("localhost", 9090, false);
        assert_eq!(client.host(), "localhost");
        assert_eq!(client.port(), 9090);
        assert_eq!(client.connect_timeout(), 1000);
        assert_eq!(client.send_timeout(), 100);
        assert_eq!(client.recv_timeout(), 750);
        assert!(!client.is_persistent());
        assert!(!client.is_open());
        assert_eq!(client.timeout_mode(), None);
    }

    #[test]
    fn with_config_copies_settings() {
        let config = ClientConfig {
            host: "10.1.2.3".to_string(),
            port: 7000,
            persistent: true,
            connect_timeout_ms: 5,
            send_timeout_ms: 6,
            recv_timeout_ms: 7,
        };
        let client = StreamClient::with_config(&config);
        assert_eq!(client.endpoint(), &Endpoint::new("10.1.2.3", 7000));
        assert!(client.is_persistent());
        assert_eq!(client.connect_timeout(), 5);
        assert_eq!(client.send_timeout(), 6);
        assert_eq!(client.recv_timeout(), 7);
    }

    #[test]
    fn open_checks_preconditions_in_order() {
        let mut client = StreamClient::<ScriptedHandle>::for_endpoint(Endpoint::new("", 0), false);
        assert!(matches!(client.open(), Err(ConnectError::InvalidHost)));

        let mut client = StreamClient::<ScriptedHandle>::for_endpoint(Endpoint::new("peer", 0), false);
        assert!(matches!(client.open(), Err(ConnectError::InvalidPort)));
        assert!(!client.is_open());
    }

    #[test]
    fn open_reports_connect_failure() {
        let mut client = StreamClient::<ScriptedHandle>::for_endpoint(Endpoint::new("peer", 1), false);
        match client.open() {
            Err(ConnectError::ConnectFailed { host, port, .. }) => {
                assert_eq!(host, "peer");
                assert_eq!(port, 1);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!client.is_open());
    }

    #[test]
    fn open_on_attached_client_is_rejected() {
        let (handle, events) = ScriptedHandle::new();
        let mut client = attached(handle);
        assert!(matches!(client.open(), Err(ConnectError::AlreadyOpen)));
        assert!(client.is_open());
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn write_accumulates_partial_writes() {
        let (handle, events) = ScriptedHandle::new();
        let handle = handle
            .write_step(WriteStep::Accept(2))
            .write_step(WriteStep::Interrupted)
            .write_step(WriteStep::Accept(3));
        let mut client = attached(handle);

        client.write(b"hello").unwrap();

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                ms(100),
                Event::Write(b"he".to_vec()),
                Event::Write(b"llo".to_vec()),
            ]
        );
    }

    #[test]
    fn write_errors_report_remaining_length() {
        let (handle, _) = ScriptedHandle::new();
        let handle = handle
            .write_step(WriteStep::Accept(2))
            .write_step(WriteStep::Timeout);
        let mut client = attached(handle);
        match client.write(b"hello") {
            Err(TransferError::WriteTimeout { len, .. }) => assert_eq!(len, 3),
            other => panic!("unexpected result: {other:?}"),
        }

        let (handle, _) = ScriptedHandle::new();
        let mut client = attached(handle.write_step(WriteStep::Reset));
        match client.write(b"hello") {
            Err(TransferError::WriteFailed { len, .. }) => assert_eq!(len, 5),
            other => panic!("unexpected result: {other:?}"),
        }

        let (handle, _) = ScriptedHandle::new();
        let handle = handle.write_step(WriteStep::Accept(4)).write_step(WriteStep::Zero);
        let mut client = attached(handle);
        match client.write(b"hello") {
            Err(TransferError::WriteFailed { len, .. }) => assert_eq!(len, 1),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn read_returns_short_data_without_accumulating() {
        let (handle, _) = ScriptedHandle::new();
        let handle = handle
            .read_step(ReadStep::Data(b"AB".to_vec()))
            .read_step(ReadStep::Data(b"CD".to_vec()));
        let mut client = attached(handle);

        assert_eq!(&client.read(8).unwrap()[..], b"AB");
        assert_eq!(&client.read(1).unwrap()[..], b"C");
        assert_eq!(&client.read(8).unwrap()[..], b"D");
    }

    #[test]
    fn read_distinguishes_timeout_and_failure() {
        let (handle, _) = ScriptedHandle::new();
        let handle = handle
            .read_step(ReadStep::Timeout)
            .read_step(ReadStep::Eof)
            .read_step(ReadStep::Reset);
        let mut client = attached(handle);

        assert!(matches!(client.read(4), Err(TransferError::ReadTimeout { len: 4, .. })));
        assert!(matches!(client.read(4), Err(TransferError::ReadFailed { len: 4, .. })));
        assert!(matches!(client.read(4), Err(TransferError::ReadFailed { len: 4, .. })));
    }

    #[test]
    fn read_exact_accumulates_short_reads() {
        let (handle, _) = ScriptedHandle::new();
        let handle = handle
            .read_step(ReadStep::Data(b"A".to_vec()))
            .read_step(ReadStep::Interrupted)
            .read_step(ReadStep::Data(b"BC".to_vec()))
            .read_step(ReadStep::Data(b"DEF".to_vec()));
        let mut client = attached(handle);

        let data = client.read_exact(4).unwrap();
        assert_eq!(&data[..], b"ABCD");
        // The unread tail is still there for the next call.
        assert_eq!(&client.read_exact(2).unwrap()[..], b"EF");
    }

    #[test]
    fn read_exact_reports_original_length() {
        let (handle, _) = ScriptedHandle::new();
        let handle = handle
            .read_step(ReadStep::Data(b"AB".to_vec()))
            .read_step(ReadStep::Timeout);
        let mut client = attached(handle);
        assert!(matches!(
            client.read_exact(4),
            Err(TransferError::ReadTimeout { len: 4, .. })
        ));

        let (handle, _) = ScriptedHandle::new();
        let handle = handle
            .read_step(ReadStep::Data(b"ABC".to_vec()))
            .read_step(ReadStep::Eof);
        let mut client = attached(handle);
        assert!(matches!(
            client.read_exact(10),
            Err(TransferError::ReadFailed { len: 10, .. })
        ));
    }

    #[test]
    fn mode_switches_only_when_direction_changes() {
        let (handle, events) = ScriptedHandle::new();
        let handle = handle
            .read_step(ReadStep::Data(b"ok".to_vec()))
            .read_step(ReadStep::Data(b"ok".to_vec()));
        let mut client = attached(handle);

        client.write(b"a").unwrap();
        client.write(b"b").unwrap();
        assert_eq!(client.timeout_mode(), Some(TimeoutMode::Send));
        client.read_exact(2).unwrap();
        assert_eq!(client.timeout_mode(), Some(TimeoutMode::Recv));
        client.read_exact(2).unwrap();
        client.write(b"c").unwrap();

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                ms(100),
                Event::Write(b"a".to_vec()),
                Event::Write(b"b".to_vec()),
                ms(750),
                Event::Read(b"ok".to_vec()),
                Event::Read(b"ok".to_vec()),
                ms(100),
                Event::Write(b"c".to_vec()),
            ]
        );
    }

    #[test]
    fn new_timeouts_apply_on_next_switch() {
        let (handle, events) = ScriptedHandle::new();
        let handle = handle.read_step(ReadStep::Data(b"x".to_vec()));
        let mut client = attached(handle);

        client.write(b"a").unwrap();
        client.set_send_timeout(40);
        client.set_recv_timeout(0);
        client.write(b"b").unwrap();
        client.read(1).unwrap();
        client.write(b"c").unwrap();

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                ms(100),
                Event::Write(b"a".to_vec()),
                Event::Write(b"b".to_vec()),
                Event::Timeout(None),
                Event::Read(b"x".to_vec()),
                ms(40),
                Event::Write(b"c".to_vec()),
            ]
        );
    }

    #[test]
    fn flush_reports_failure() {
        let (handle, events) = ScriptedHandle::new();
        let mut client = attached(handle);
        client.flush().unwrap();
        assert_eq!(*events.lock().unwrap(), vec![Event::Flush]);

        let (mut handle, _) = ScriptedHandle::new();
        handle.flush_fails = true;
        let mut client = attached(handle);
        match client.flush() {
            Err(TransferError::FlushFailed { host, port }) => {
                assert_eq!(host, "peer");
                assert_eq!(port, 9090);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn io_on_closed_client_is_not_open() {
        let mut client = StreamClient::<ScriptedHandle>::for_endpoint(Endpoint::new("peer", 1), false);
        assert!(matches!(client.write(b"x"), Err(TransferError::NotOpen)));
        assert!(matches!(client.read(1), Err(TransferError::NotOpen)));
        assert!(matches!(client.read_exact(1), Err(TransferError::NotOpen)));
        assert!(matches!(client.flush(), Err(TransferError::NotOpen)));
    }

    #[test]
    fn close_releases_once_and_is_idempotent() {
        let (handle, events) = ScriptedHandle::new();
        let mut client = attached(handle);
        client.close();
        client.close();
        assert!(!client.is_open());
        assert_eq!(client.timeout_mode(), None);
        assert_eq!(*events.lock().unwrap(), vec![Event::Release]);
    }

    #[test]
    fn persistent_close_keeps_handle() {
        let (handle, events) = ScriptedHandle::new();
        let mut client = StreamClient::for_endpoint(Endpoint::new("peer", 9090), true);
        client.attach(handle);
        client.write(b"a").unwrap();
        client.close();
        assert!(client.is_open());
        assert_eq!(client.timeout_mode(), Some(TimeoutMode::Send));
        drop(client);
        let events = events.lock().unwrap();
        assert!(!events.contains(&Event::Release));
        assert_eq!(events.last(), Some(&Event::Park));
    }

    #[test]
    fn attach_replaces_and_releases_previous_handle() {
        let (first, first_events) = ScriptedHandle::new();
        let (second, second_events) = ScriptedHandle::new();
        let mut client = attached(first);
        client.write(b"a").unwrap();
        client.attach(second);
        assert_eq!(client.timeout_mode(), None);
        client.write(b"b").unwrap();

        assert_eq!(first_events.lock().unwrap().last(), Some(&Event::Release));
        assert_eq!(
            *second_events.lock().unwrap(),
            vec![ms(100), Event::Write(b"b".to_vec())]
        );
    }

    #[test]
    fn drop_releases_non_persistent_handle() {
        let (handle, events) = ScriptedHandle::new();
        drop(attached(handle));
        assert_eq!(*events.lock().unwrap(), vec![Event::Release]);
    }

    #[test]
    fn open_installs_send_deadline_first() {
        let (handle, events) = ScriptedHandle::new();
        accept_next_connect(handle.read_step(ReadStep::Data(b"x".to_vec())));
        let mut client: StreamClient<ScriptedHandle> = StreamClient::for_endpoint(Endpoint::new("peer", 9090), false);

        client.open().unwrap();
        assert_eq!(*events.lock().unwrap(), vec![ms(100)]);
        assert_eq!(client.timeout_mode(), Some(TimeoutMode::Send));

        client.read(1).unwrap();
        assert_eq!(
            *events.lock().unwrap(),
            vec![ms(100), ms(750), Event::Read(b"x".to_vec())]
        );
    }

    #[test]
    fn first_write_after_open_needs_no_switch() {
        let (handle, events) = ScriptedHandle::new();
        accept_next_connect(handle);
        let mut client: StreamClient<ScriptedHandle> = StreamClient::for_endpoint(Endpoint::new("peer", 9090), false);
        client.set_send_timeout(25);
        client.set_recv_timeout(900);

        client.open().unwrap();
        client.write(b"hi").unwrap();
        assert_eq!(
            *events.lock().unwrap(),
            vec![ms(25), Event::Write(b"hi".to_vec())]
        );
    }

    #[test]
    fn persistent_open_and_drop_parks_handle() {
        let (handle, events) = ScriptedHandle::new();
        accept_next_connect(handle);
        let mut client: StreamClient<ScriptedHandle> = StreamClient::for_endpoint(Endpoint::new("peer", 9090), true);

        client.open().unwrap();
        client.close();
        assert!(client.is_open());
        drop(client);
        assert_eq!(*events.lock().unwrap(), vec![ms(100), Event::Park]);
    }

    #[test]
    fn zero_length_reads_switch_mode_without_io() {
        let (handle, events) = ScriptedHandle::new();
        let mut client = attached(handle.read_step(ReadStep::Eof));

        assert!(client.read(0).unwrap().is_empty());
        assert_eq!(client.timeout_mode(), Some(TimeoutMode::Recv));
        assert!(client.read_exact(0).unwrap().is_empty());
        assert_eq!(*events.lock().unwrap(), vec![ms(750)]);
    }

    #[test]
    fn huge_read_lengths_do_not_preallocate() {
        let (handle, _) = ScriptedHandle::new();
        let handle = handle
            .read_step(ReadStep::Data(b"AB".to_vec()))
            .read_step(ReadStep::Data(b"CD".to_vec()))
            .read_step(ReadStep::Eof);
        let mut client = attached(handle);

        assert_eq!(&client.read(usize::MAX).unwrap()[..], b"AB");
        assert!(matches!(
            client.read_exact(usize::MAX),
            Err(TransferError::ReadFailed { len: usize::MAX, .. })
        ));
    }

    #[test]
    fn read_exact_spans_multiple_chunks() {
        let payload: Vec<u8> = (0..READ_CHUNK * 2 + 10).map(|i| (i % 251) as u8).collect();
        let (handle, _) = ScriptedHandle::new();
        let mut client = attached(handle.read_step(ReadStep::Data(payload.clone())));

        let data = client.read_exact(payload.len()).unwrap();
        assert_eq!(&data[..], &payload[..]);
    }
}
