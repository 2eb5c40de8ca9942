//! Connection halves and transport errors.
//!
//! The RPC engine owns the read half on its reader thread and the write
//! half on its writer thread, so a connection is always handed over as two
//! independently owned byte streams.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::Duration;

/// Closes a socket in both directions from any thread.
///
/// A reader blocked on the connection wakes with end-of-stream.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<dyn Fn() -> io::Result<()> + Send + Sync>);

impl ShutdownHandle {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> io::Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn shutdown(&self) -> io::Result<()> {
        (self.0)()
    }
}

impl fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ShutdownHandle")
    }
}

/// An established duplex byte stream, split into owned halves.
pub struct Connection {
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
    peer: String,
    shutdown: Option<ShutdownHandle>,
}

impl Connection {
    /// Build a connection from arbitrary halves.
    pub fn new<R, W>(reader: R, writer: W, peer: impl Into<String>) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            peer: peer.into(),
            shutdown: None,
        }
    }

    /// Attach a hook that closes the underlying stream.
    pub fn with_shutdown(mut self, handle: ShutdownHandle) -> Self {
        self.shutdown = Some(handle);
        self
    }

    /// Split a Unix stream into a connection.
    pub fn unix(stream: UnixStream) -> io::Result<Self> {
        let peer = stream
            .peer_addr()
            .ok()
            .and_then(|a| a.as_pathname().map(|p| p.display().to_string()))
            .unwrap_or_else(|| "unix".to_string());
        let reader = stream.try_clone()?;
        let control = stream.try_clone()?;
        Ok(Self::new(reader, stream, peer)
            .with_shutdown(ShutdownHandle::new(move || control.shutdown(Shutdown::Both))))
    }

    /// Split a TCP stream into a connection.
    pub fn tcp(stream: TcpStream) -> io::Result<Self> {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "tcp".to_string());
        stream.set_nodelay(true)?;
        let reader = stream.try_clone()?;
        let control = stream.try_clone()?;
        Ok(Self::new(reader, stream, peer)
            .with_shutdown(ShutdownHandle::new(move || control.shutdown(Shutdown::Both))))
    }

    /// Use the process's standard input and output.
    ///
    /// Responses arrive on stdin and requests leave on stdout, so nothing
    /// else may write to stdout while the connection is live. Stdin cannot
    /// be interrupted, so there is no shutdown hook: a reader stays blocked
    /// until the peer closes its end.
    pub fn stdio() -> Self {
        Self::new(io::stdin(), io::stdout(), "stdio")
    }

    /// Human-readable peer description for logs.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Hook that closes the stream, when the transport has one.
    pub fn shutdown_handle(&self) -> Option<ShutdownHandle> {
        self.shutdown.clone()
    }

    pub fn into_split(self) -> (Box<dyn Read + Send>, Box<dyn Write + Send>) {
        (self.reader, self.writer)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// Socket options applied when a connection is established.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketOptions {
    /// Deadline for a single blocking write.
    pub write_timeout: Option<Duration>,
}

/// Transport error types.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid address {addr:?}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("connection refused by {0}")]
    ConnectionRefused(String),
}

impl From<TransportError> for io::Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Io(e) => e,
            TransportError::InvalidAddress { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            TransportError::ConnectionRefused(_) => {
                io::Error::new(io::ErrorKind::ConnectionRefused, err)
            }
        }
    }
}
