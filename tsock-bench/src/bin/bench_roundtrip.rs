//! # Round-Trip Benchmark Harness
//!
//! Purpose: Measure framed request/response latency of `StreamClient` against a
//! loopback echo peer so regressions in the I/O loops show up as numbers.
//!
//! ## Design Principles
//! 1. **Deterministic Workload**: Fixed payload bytes and sizes between runs.
//! 2. **Allocation Control**: Build the request frame once, outside the timed loop.
//! 3. **Real Sockets**: Both ends use the library (`StreamListener` + `StreamClient`).
//!
//! Usage: `bench_roundtrip [ops] [payload_size] [persistent]`, logging via `RUST_LOG`.

use std::env;
use std::hint::black_box;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use tsock_client::{persist, ClientConfig, StreamClient, StreamListener, TransferError};

const DEFAULT_OP_COUNT: usize = 10_000;
const DEFAULT_PAYLOAD_SIZE: usize = 128;
const FRAME_HEADER: usize = 4;

struct BenchConfig {
    op_count: usize,
    payload_size: usize,
    persistent: bool,
}

impl BenchConfig {
    fn from_args() -> Self {
        let mut args = env::args().skip(1);
        let op_count = parse_usize(args.next(), DEFAULT_OP_COUNT).max(1);
        let payload_size = parse_usize(args.next(), DEFAULT_PAYLOAD_SIZE);
        let persistent = args.next().map(|raw| raw == "persistent").unwrap_or(false);
        BenchConfig {
            op_count,
            payload_size,
            persistent,
        }
    }
}

fn parse_usize(value: Option<String>, fallback: usize) -> usize {
    value.and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}

fn build_frame(payload_size: usize) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_HEADER + payload_size);
    frame.extend_from_slice(&(payload_size as u32).to_be_bytes());
    frame.extend((0..payload_size).map(|i| (i % 251) as u8));
    frame
}

/// Echoes length-prefixed frames until the client goes away.
fn run_echo_peer(listener: StreamListener) -> Result<()> {
    let mut peer = listener.accept().context("accept bench client")?;
    loop {
        let header = match peer.read_exact(FRAME_HEADER) {
            Ok(header) => header,
            Err(TransferError::ReadFailed { .. }) => break,
            Err(err) => return Err(err.into()),
        };
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let body = peer.read_exact(len)?;
        peer.write(&header)?;
        peer.write(&body)?;
        peer.flush()?;
    }
    debug!("echo peer finished");
    Ok(())
}

fn report(label: &str, ops: usize, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    let ops_per_sec = (ops as f64) / secs;
    let micros_per_op = (secs * 1e6) / (ops as f64);
    info!(
        "{label}: {ops} round trips in {secs:.3}s ({ops_per_sec:.0} ops/s, {micros_per_op:.1} us/op)"
    );
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run() {
        eprintln!("bench_roundtrip failed: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let bench = BenchConfig::from_args();

    // The echo side blocks without deadlines; the client keeps its own.
    let listener = StreamListener::bind("127.0.0.1:0")?.with_timeouts(0, 0);
    let addr = listener.local_addr()?;
    let echo = thread::spawn(move || run_echo_peer(listener));

    let config = ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        persistent: bench.persistent,
        recv_timeout_ms: 2000,
        send_timeout_ms: 2000,
        ..ClientConfig::default()
    };
    info!(
        ops = bench.op_count,
        payload_size = bench.payload_size,
        persistent = bench.persistent,
        endpoint = %config.endpoint(),
        "starting round-trip benchmark"
    );

    let frame = build_frame(bench.payload_size);
    let mut client = StreamClient::with_config(&config);
    client.open()?;

    let start = Instant::now();
    for _ in 0..bench.op_count {
        client.write(&frame)?;
        client.flush()?;
        let header = client.read_exact(FRAME_HEADER)?;
        let body = client.read_exact(bench.payload_size)?;
        if header[..] != frame[..FRAME_HEADER] {
            bail!("echo header mismatch");
        }
        black_box(body);
    }
    report("ROUNDTRIP", bench.op_count, start.elapsed());

    // A persistent client parks its connection on drop; evict it so the echo
    // peer sees EOF.
    drop(client);
    if bench.persistent {
        persist::forget(&config.endpoint());
    }

    match echo.join() {
        Ok(result) => result,
        Err(_) => bail!("echo peer panicked"),
    }
}
