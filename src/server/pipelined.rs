//! Async pipelined server.
//!
//! # Architecture
//!
//! - One connection, many requests in flight (pipelining)
//! - Read requests in a loop, spawn a task for each
//! - Write responses as they complete (out of order is fine, the request
//!   id is echoed back)
//! - Filesystem operations run on `spawn_blocking`
//! - Responses are batched in a buffered writer

use super::{FilesystemHandler, ServerConfig};
use crate::error::ProtocolError;
use crate::protocol::{
    encode_response, Opcode, Request, RequestHeader, Response, REQUEST_HEADER_LEN,
};
use crate::transport::Endpoint;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const TARGET: &str = "hyperfuse::server";

/// A completed operation waiting to be written.
struct PendingResponse {
    request_id: u16,
    op: Opcode,
    result: Result<Response, i32>,
}

/// Async pipelined server.
pub struct AsyncServer<H> {
    handler: Arc<H>,
    config: ServerConfig,
}

impl<H: FilesystemHandler + 'static> AsyncServer<H> {
    /// Create a new server with default configuration.
    pub fn new(handler: H) -> Self {
        Self::with_config(handler, ServerConfig::default())
    }

    /// Create a new server with custom configuration.
    pub fn with_config(handler: H, config: ServerConfig) -> Self {
        Self {
            handler: Arc::new(handler),
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serve `endpoint` until the listener fails (or, for stdio, until the
    /// peer hangs up).
    pub async fn serve(self, endpoint: &Endpoint) -> anyhow::Result<()> {
        match endpoint {
            Endpoint::Tcp { host, port } => self.serve_tcp(&format!("{}:{}", host, port)).await,
            Endpoint::Unix(path) => self.serve_unix(path).await,
            Endpoint::Stdio => {
                info!(target: TARGET, "serving on stdio");
                self.serve_stream(tokio::io::stdin(), tokio::io::stdout(), "stdio")
                    .await
            }
        }
    }

    /// Serve on a TCP address.
    ///
    /// This function runs forever, accepting and handling connections.
    pub async fn serve_tcp(self, addr: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(target: TARGET, addr = %listener.local_addr()?, "listening");

        loop {
            let (stream, peer) = listener.accept().await?;
            stream.set_nodelay(true)?;
            let (read_half, write_half) = stream.into_split();
            self.spawn_client(read_half, write_half, peer.to_string());
        }
    }

    /// Serve on a Unix socket, replacing any stale socket file.
    ///
    /// This function runs forever, accepting and handling connections.
    pub async fn serve_unix(self, socket_path: &Path) -> anyhow::Result<()> {
        let _ = std::fs::remove_file(socket_path);
        let listener = UnixListener::bind(socket_path)?;
        info!(target: TARGET, socket = %socket_path.display(), "listening");

        let mut client_id = 0u32;
        loop {
            let (stream, _) = listener.accept().await?;
            let (read_half, write_half) = stream.into_split();
            self.spawn_client(read_half, write_half, format!("unix-client-{}", client_id));
            client_id += 1;
        }
    }

    /// Serve a single already-connected stream until it closes.
    pub async fn serve_stream<R, W>(&self, reader: R, writer: W, peer: &str) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        handle_client(Arc::clone(&self.handler), reader, writer, self.config.clone(), peer).await
    }

    fn spawn_client<R, W>(&self, reader: R, writer: W, peer: String)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let handler = Arc::clone(&self.handler);
        let config = self.config.clone();
        tokio::spawn(async move {
            info!(target: TARGET, peer = %peer, "client connected");
            if let Err(e) = handle_client(handler, reader, writer, config, &peer).await {
                warn!(target: TARGET, peer = %peer, error = %e, "client error");
            }
            info!(target: TARGET, peer = %peer, "client disconnected");
        });
    }

    /// Run the server on a tuned tokio runtime.
    pub fn run_blocking(self, endpoint: &Endpoint) -> anyhow::Result<()> {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .max_blocking_threads(self.config.max_blocking_threads.max(1))
            .thread_keep_alive(self.config.thread_keep_alive)
            .build()?
            .block_on(self.serve(endpoint))
    }
}

/// Handle a single client connection with pipelining.
async fn handle_client<H, R, W>(
    handler: Arc<H>,
    reader: R,
    writer: W,
    config: ServerConfig,
    peer: &str,
) -> anyhow::Result<()>
where
    H: FilesystemHandler + 'static,
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<PendingResponse>(config.response_channel_size.max(1));

    let writer_handle = tokio::spawn(response_writer(writer, rx, config));
    let reader_result = request_reader(reader, handler, tx).await;

    // The writer drains every in-flight response before exiting.
    let _ = writer_handle.await;

    if let Err(e) = &reader_result {
        warn!(target: TARGET, peer, error = %e, "closing connection");
    }
    reader_result
}

/// Read requests and spawn handler tasks for each.
///
/// A malformed frame or unknown operation ends the connection, since the
/// stream can no longer be trusted to be aligned on frame boundaries.
async fn request_reader<H, R>(
    mut reader: R,
    handler: Arc<H>,
    tx: mpsc::Sender<PendingResponse>,
) -> anyhow::Result<()>
where
    H: FilesystemHandler + 'static,
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; REQUEST_HEADER_LEN];

    loop {
        match reader.read_exact(&mut header_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let header = RequestHeader::decode(&header_buf)?;
        let op = Opcode::try_from(header.opcode)?;

        let mut payload = vec![0u8; header.payload_len()];
        reader.read_exact(&mut payload).await?;
        let request = Request::decode_payload(op, &payload)?;

        let request_id = header.request_id;
        debug!(
            target: TARGET,
            request_id,
            op = op.name(),
            path = %String::from_utf8_lossy(request.path()),
            "request"
        );

        let handler = Arc::clone(&handler);
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || handler.handle_request(&request))
                .await
                .unwrap_or_else(|e| {
                    error!(target: TARGET, request_id, error = %e, "handler panicked");
                    Err(libc::EIO)
                });
            let _ = tx
                .send(PendingResponse {
                    request_id,
                    op,
                    result,
                })
                .await;
        });
    }

    Ok(())
}

/// Write responses with batching.
async fn response_writer<W>(writer: W, mut rx: mpsc::Receiver<PendingResponse>, config: ServerConfig)
where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::with_capacity(config.write_buffer_size, writer);
    let mut batch_count = 0;
    let batch_timeout = config.write_batch_timeout;

    loop {
        // Wait briefly for more responses while a batch is pending
        let recv_result = if batch_count > 0 {
            tokio::time::timeout(batch_timeout, rx.recv()).await
        } else {
            Ok(rx.recv().await)
        };

        let item = match recv_result {
            Ok(Some(item)) => item,
            Ok(None) => break,
            Err(_) => {
                if writer.flush().await.is_err() {
                    break;
                }
                batch_count = 0;
                continue;
            }
        };

        let frame = match encode_response(item.request_id, &item.result) {
            Ok(frame) => frame,
            Err(e) => {
                error!(
                    target: TARGET,
                    request_id = item.request_id,
                    op = item.op.name(),
                    error = %e,
                    "response does not fit a frame"
                );
                match encode_response(item.request_id, &Err(error_code(&e))) {
                    Ok(frame) => frame,
                    Err(_) => continue,
                }
            }
        };

        if let Err(e) = writer.write_all(&frame).await {
            warn!(target: TARGET, error = %e, "response write failed");
            break;
        }
        batch_count += 1;

        // Flush if batch is full or nothing else is waiting
        if batch_count >= config.write_batch_size || rx.is_empty() {
            if writer.flush().await.is_err() {
                break;
            }
            batch_count = 0;
        }
    }

    let _ = writer.flush().await;
}

fn error_code(err: &ProtocolError) -> i32 {
    match err {
        ProtocolError::FrameTooLarge(_) => libc::E2BIG,
        _ => libc::EIO,
    }
}
