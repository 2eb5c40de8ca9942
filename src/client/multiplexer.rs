//! RPC engine: one shared connection, many concurrent callers.
//!
//! Callers register a response channel in the [`RequestLedger`] under a
//! fresh request id, then submit the encoded frame to a bounded queue. A
//! dedicated writer thread is the only writer of the connection, so frames
//! never interleave. A dedicated reader thread is the only reader: it
//! parses each response frame and routes it to the waiter registered under
//! the frame's request id.

use super::ledger::{RequestLedger, DEFAULT_CAPACITY};
use crate::error::{ProtocolError, RpcError};
use crate::protocol::{encode_request, Opcode, Request, Response, ResponseHeader, RESPONSE_HEADER_LEN};
use crate::transport::{Connection, ShutdownHandle};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::io::{self, BufWriter, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TARGET: &str = "hyperfuse::mux";

/// Header fields and payload of one response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub result_code: i32,
    pub payload: Vec<u8>,
}

type Delivery = Result<RawResponse, RpcError>;

/// Pending context stored in the ledger: where to deliver the response.
type Waiter = Sender<Delivery>;

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Maximum concurrently in-flight requests.
    pub max_in_flight: usize,
    /// Per-call deadline (None = wait forever).
    pub call_timeout: Option<Duration>,
    /// Capacity of the send queue.
    pub queue_depth: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_CAPACITY,
            call_timeout: None,
            queue_depth: 64,
        }
    }
}

impl RpcConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the in-flight bound.
    pub fn max_in_flight(mut self, n: usize) -> Self {
        self.max_in_flight = n;
        self
    }

    /// Set the per-call deadline.
    pub fn call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the send queue capacity.
    pub fn queue_depth(mut self, n: usize) -> Self {
        self.queue_depth = n;
        self
    }
}

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MuxStats {
    pub sent: u64,
    pub received: u64,
    /// Responses that arrived after their caller gave up.
    pub late: u64,
    pub in_flight: usize,
}

/// A frame queued for the writer thread.
struct Outgoing {
    request_id: u16,
    op: Opcode,
    frame: Vec<u8>,
}

/// State shared by callers and both I/O threads.
struct Shared {
    ledger: RequestLedger<Waiter>,
    closed: AtomicBool,
    sent: AtomicU64,
    received: AtomicU64,
    late: AtomicU64,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark the connection dead and fail every pending waiter.
    ///
    /// The flag is set before draining; callers check it after allocating,
    /// so no waiter is left registered on a dead connection.
    fn close(&self, make_err: impl Fn() -> RpcError) {
        self.closed.store(true, Ordering::SeqCst);
        for (_, waiter) in self.ledger.drain() {
            let _ = waiter.send(Err(make_err()));
        }
    }

    fn stats(&self) -> MuxStats {
        MuxStats {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            late: self.late.load(Ordering::Relaxed),
            in_flight: self.ledger.len(),
        }
    }
}

/// Shared RPC engine for all filesystem callers.
///
/// Dropping the last handle stops the writer thread and shuts the socket
/// down, which wakes the reader thread. Over stdio the reader instead
/// exits when the peer closes its end.
pub struct Multiplexer {
    request_tx: Sender<Outgoing>,
    shared: Arc<Shared>,
    config: RpcConfig,
    shutdown: Option<ShutdownHandle>,
}

impl Multiplexer {
    /// Create a multiplexer with default configuration.
    ///
    /// Spawns background threads for reading and writing the connection.
    pub fn new(conn: Connection) -> io::Result<Arc<Self>> {
        Self::with_config(conn, RpcConfig::default())
    }

    /// Create a multiplexer with custom configuration.
    ///
    /// # Errors
    /// Returns an error if the I/O threads cannot be spawned.
    pub fn with_config(conn: Connection, config: RpcConfig) -> io::Result<Arc<Self>> {
        let peer = conn.peer().to_string();
        let shutdown = conn.shutdown_handle();
        let (reader, writer) = conn.into_split();

        let shared = Arc::new(Shared {
            ledger: RequestLedger::new(config.max_in_flight),
            closed: AtomicBool::new(false),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
            late: AtomicU64::new(0),
        });

        // Bounded to provide backpressure
        let (request_tx, request_rx) = bounded::<Outgoing>(config.queue_depth.max(1));

        let shared_for_writer = Arc::clone(&shared);
        std::thread::Builder::new()
            .name("hyperfuse-mux-writer".to_string())
            .stack_size(512 * 1024)
            .spawn(move || writer_loop(writer, request_rx, shared_for_writer))?;

        let shared_for_reader = Arc::clone(&shared);
        std::thread::Builder::new()
            .name("hyperfuse-mux-reader".to_string())
            .stack_size(512 * 1024)
            .spawn(move || reader_loop(reader, shared_for_reader))?;

        tracing::info!(
            target: TARGET,
            peer = %peer,
            max_in_flight = shared.ledger.capacity(),
            timeout_ms = config.call_timeout.map(|t| t.as_millis() as u64),
            "multiplexer started"
        );

        Ok(Arc::new(Self {
            request_tx,
            shared,
            config,
            shutdown,
        }))
    }

    /// Send a request, wait for its response and decode it.
    ///
    /// A negative result code is returned verbatim as [`RpcError::Remote`]
    /// without decoding the payload.
    pub fn call(&self, request: &Request) -> Result<Response, RpcError> {
        let op = request.opcode();
        let raw = self.exchange(request)?;
        if raw.result_code < 0 {
            tracing::debug!(target: TARGET, op = op.name(), code = raw.result_code, "remote error");
            return Err(RpcError::Remote(raw.result_code));
        }
        Ok(Response::decode(op, &raw.payload)?)
    }

    /// Send a request and wait for the raw response frame.
    pub fn exchange(&self, request: &Request) -> Result<RawResponse, RpcError> {
        if self.shared.is_closed() {
            return Err(RpcError::Disconnected);
        }

        // Oneshot channel for the response
        let (response_tx, response_rx) = bounded::<Delivery>(1);
        let request_id = self.shared.ledger.allocate(response_tx)?;

        if self.shared.is_closed() {
            let _ = self.shared.ledger.release(request_id);
            return Err(RpcError::Disconnected);
        }

        let frame = match encode_request(request_id, request) {
            Ok(frame) => frame,
            Err(e) => {
                let _ = self.shared.ledger.release(request_id);
                return Err(e.into());
            }
        };

        let outgoing = Outgoing {
            request_id,
            op: request.opcode(),
            frame,
        };
        if self.request_tx.send(outgoing).is_err() {
            let _ = self.shared.ledger.release(request_id);
            return Err(RpcError::Disconnected);
        }

        match self.config.call_timeout {
            Some(timeout) => match response_rx.recv_timeout(timeout) {
                Ok(delivery) => delivery,
                Err(RecvTimeoutError::Timeout) => {
                    // The id stays reserved until the late response arrives
                    // or the connection dies, so it cannot be reused while
                    // the server may still answer it.
                    tracing::warn!(
                        target: TARGET,
                        request_id,
                        op = request.opcode().name(),
                        timeout_ms = timeout.as_millis() as u64,
                        "request timed out"
                    );
                    Err(RpcError::Timeout)
                }
                Err(RecvTimeoutError::Disconnected) => Err(RpcError::Disconnected),
            },
            None => response_rx.recv().unwrap_or(Err(RpcError::Disconnected)),
        }
    }

    /// Whether the connection has failed.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn stats(&self) -> MuxStats {
        self.shared.stats()
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = &self.shutdown {
            if let Err(e) = handle.shutdown() {
                tracing::debug!(target: TARGET, error = %e, "socket shutdown failed");
            }
        }
    }
}

/// Writer thread: receives frames from the queue, writes them to the connection.
fn writer_loop(writer: Box<dyn Write + Send>, request_rx: Receiver<Outgoing>, shared: Arc<Shared>) {
    let mut writer = BufWriter::with_capacity(64 * 1024, writer);
    let mut count = 0u64;
    let mut total_bytes_written = 0u64;

    while let Ok(out) = request_rx.recv() {
        if shared.is_closed() {
            if let Ok(waiter) = shared.ledger.release(out.request_id) {
                let _ = waiter.send(Err(RpcError::Disconnected));
            }
            continue;
        }

        count += 1;
        if count <= 10 || count % 100 == 0 {
            tracing::info!(
                target: TARGET,
                count,
                request_id = out.request_id,
                op = out.op.name(),
                msg_len = out.frame.len(),
                total_bytes_written,
                pending_count = shared.ledger.len(),
                "writer: sending request"
            );
        }

        // Counted before the write so the count never trails a response.
        shared.sent.fetch_add(1, Ordering::Relaxed);

        // Flush only when nothing else is queued (adaptive batching)
        let result = writer.write_all(&out.frame).and_then(|_| {
            if request_rx.is_empty() {
                writer.flush()
            } else {
                Ok(())
            }
        });

        match result {
            Ok(()) => {
                total_bytes_written += out.frame.len() as u64;
            }
            Err(e) => {
                tracing::warn!(
                    target: TARGET,
                    request_id = out.request_id,
                    total_bytes_written,
                    error = %e,
                    error_kind = ?e.kind(),
                    "writer: connection write failed"
                );
                // A partial frame may be on the wire; the stream is unusable.
                let kind = e.kind();
                let message = e.to_string();
                shared.close(|| RpcError::Transport(io::Error::new(kind, message.clone())));
            }
        }
    }

    let _ = writer.flush();
    let stats = shared.stats();
    tracing::info!(
        target: TARGET,
        count,
        total_bytes_written,
        received = stats.received,
        late = stats.late,
        "writer: exiting"
    );
}

/// Reader thread: reads response frames, routes them to waiting callers.
fn reader_loop(mut reader: Box<dyn Read + Send>, shared: Arc<Shared>) {
    let mut header_buf = [0u8; RESPONSE_HEADER_LEN];
    let mut count = 0u64;

    loop {
        if let Err(e) = reader.read_exact(&mut header_buf) {
            if shared.is_closed() {
                tracing::debug!(target: TARGET, count, "reader: engine dropped");
            } else if e.kind() == io::ErrorKind::UnexpectedEof {
                tracing::info!(target: TARGET, count, pending_count = shared.ledger.len(), "reader: server closed connection");
            } else {
                tracing::warn!(target: TARGET, count, error = %e, "reader: connection read failed");
            }
            shared.close(|| RpcError::Disconnected);
            break;
        }

        let header = match ResponseHeader::decode(&header_buf) {
            Ok(header) => header,
            Err(e) => {
                tracing::error!(target: TARGET, count, error = %e, "reader: bad response header");
                // Frame boundaries can no longer be trusted.
                shared.close(|| RpcError::Protocol(e.clone()));
                break;
            }
        };

        let mut payload = vec![0u8; header.payload_len()];
        if let Err(e) = reader.read_exact(&mut payload) {
            tracing::warn!(
                target: TARGET,
                count,
                request_id = header.request_id,
                payload_len = payload.len(),
                error = %e,
                "reader: failed to read response payload"
            );
            shared.close(|| RpcError::Disconnected);
            break;
        }

        count += 1;
        shared.received.fetch_add(1, Ordering::Relaxed);
        if count <= 10 || count % 100 == 0 {
            tracing::info!(
                target: TARGET,
                count,
                request_id = header.request_id,
                result_code = header.result_code,
                pending_count = shared.ledger.len(),
                "reader: received response"
            );
        }

        match shared.ledger.release(header.request_id) {
            Ok(waiter) => {
                let response = RawResponse {
                    result_code: header.result_code,
                    payload,
                };
                if waiter.send(Ok(response)).is_err() {
                    shared.late.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(target: TARGET, request_id = header.request_id, "reader: late response discarded");
                }
            }
            Err(e) => {
                tracing::error!(target: TARGET, request_id = header.request_id, error = %e, "reader: response for unknown request");
                let id = header.request_id;
                shared.close(|| RpcError::Protocol(ProtocolError::UnknownRequestId(id)));
                break;
            }
        }
    }
    tracing::info!(target: TARGET, count, "reader: exiting");
}
