//! Error types shared by the client and server halves.

use crate::client::LedgerError;
use crate::protocol::{Opcode, WireError};
use std::io;

/// A frame or payload that violates the wire contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("wire codec: {0}")]
    Wire(#[from] WireError),

    #[error("frame length {0} is shorter than its fixed header")]
    FrameTooShort(u32),

    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    #[error("unknown operation tag {0}")]
    UnknownOpcode(u8),

    #[error("response for request id {0} that is not in flight")]
    UnknownRequestId(u16),

    #[error("{op:?} payload has {actual} bytes, expected {expected}")]
    PayloadLength {
        op: Opcode,
        expected: usize,
        actual: usize,
    },

    #[error("unexpected {0:?} response for request")]
    UnexpectedResponse(Opcode),

    #[error("read returned {returned} bytes for a {requested} byte request")]
    ReadOverflow { requested: u32, returned: usize },
}

/// Failure of a single RPC exchange, as seen by a filesystem operation.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("transport: {0}")]
    Transport(#[from] io::Error),

    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server answered with a negative result code.
    #[error("remote error code {0}")]
    Remote(i32),

    #[error("request id pool exhausted ({capacity} in flight)")]
    Exhausted { capacity: usize },

    #[error("request timed out")]
    Timeout,

    #[error("connection closed")]
    Disconnected,

    /// The request cannot be expressed in the protocol's field widths.
    #[error("value does not fit the protocol field")]
    Overflow,
}

impl RpcError {
    /// Positive errno for the host interception layer.
    pub fn errno(&self) -> i32 {
        match self {
            RpcError::Remote(code) => code.checked_neg().filter(|e| *e > 0).unwrap_or(libc::EIO),
            RpcError::Transport(_) | RpcError::Protocol(_) | RpcError::Disconnected => libc::EIO,
            RpcError::Exhausted { .. } => libc::EAGAIN,
            RpcError::Timeout => libc::ETIMEDOUT,
            RpcError::Overflow => libc::EOVERFLOW,
        }
    }

    /// Negative POSIX-like result code (`-errno`).
    pub fn code(&self) -> i32 {
        -self.errno()
    }
}

impl From<LedgerError> for RpcError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Exhausted { capacity } => RpcError::Exhausted { capacity },
            LedgerError::NotAllocated(id) => RpcError::Protocol(ProtocolError::UnknownRequestId(id)),
        }
    }
}

/// Map an adapter result to the host return convention: `0` or `-errno`.
pub fn status<T>(result: &Result<T, RpcError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.code(),
    }
}
