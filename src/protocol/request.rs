//! Request operations and their payload layouts.

use super::types::FileHandle;
use super::wire::{WireError, WireReader, WireWriter};
use crate::error::ProtocolError;

/// Operation tag carried in every request frame.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Getattr = 1,
    Readdir = 2,
    Read = 3,
    Open = 4,
    Truncate = 5,
}

impl Opcode {
    /// Get the operation name for logging.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Getattr => "getattr",
            Opcode::Readdir => "readdir",
            Opcode::Read => "read",
            Opcode::Open => "open",
            Opcode::Truncate => "truncate",
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> Self {
        op as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Opcode::Getattr,
            2 => Opcode::Readdir,
            3 => Opcode::Read,
            4 => Opcode::Open,
            5 => Opcode::Truncate,
            other => return Err(ProtocolError::UnknownOpcode(other)),
        })
    }
}

/// A filesystem request.
///
/// Paths are wire paths: relative to the export root, without the
/// leading `/` of the host path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Getattr {
        path: Vec<u8>,
    },
    Readdir {
        path: Vec<u8>,
    },
    Read {
        path: Vec<u8>,
        fh: FileHandle,
        size: u32,
        offset: u32,
    },
    Open {
        path: Vec<u8>,
        flags: u16,
    },
    Truncate {
        path: Vec<u8>,
        size: u32,
    },
}

impl Request {
    pub fn opcode(&self) -> Opcode {
        match self {
            Request::Getattr { .. } => Opcode::Getattr,
            Request::Readdir { .. } => Opcode::Readdir,
            Request::Read { .. } => Opcode::Read,
            Request::Open { .. } => Opcode::Open,
            Request::Truncate { .. } => Opcode::Truncate,
        }
    }

    pub fn path(&self) -> &[u8] {
        match self {
            Request::Getattr { path }
            | Request::Readdir { path }
            | Request::Read { path, .. }
            | Request::Open { path, .. }
            | Request::Truncate { path, .. } => path,
        }
    }

    /// Append the operation payload (everything after the opcode byte).
    pub fn encode_payload(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_string(self.path())?;
        match self {
            Request::Getattr { .. } | Request::Readdir { .. } => {}
            Request::Read {
                fh, size, offset, ..
            } => {
                w.put_u16(fh.0).put_u32(*size).put_u32(*offset);
            }
            Request::Open { flags, .. } => {
                w.put_u16(*flags);
            }
            Request::Truncate { size, .. } => {
                w.put_u32(*size);
            }
        }
        Ok(())
    }

    /// Decode an operation payload for `op`. Trailing bytes are rejected.
    pub fn decode_payload(op: Opcode, payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = WireReader::new(payload);
        let path = r.get_string()?.to_vec();
        let request = match op {
            Opcode::Getattr => Request::Getattr { path },
            Opcode::Readdir => Request::Readdir { path },
            Opcode::Read => Request::Read {
                path,
                fh: FileHandle(r.get_u16()?),
                size: r.get_u32()?,
                offset: r.get_u32()?,
            },
            Opcode::Open => Request::Open {
                path,
                flags: r.get_u16()?,
            },
            Opcode::Truncate => Request::Truncate {
                path,
                size: r.get_u32()?,
            },
        };
        if !r.is_empty() {
            return Err(ProtocolError::PayloadLength {
                op,
                expected: r.position(),
                actual: payload.len(),
            });
        }
        Ok(request)
    }
}
