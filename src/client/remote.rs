//! Path-based filesystem operations over the RPC engine.

use super::multiplexer::{Multiplexer, RawResponse};
use crate::error::{ProtocolError, RpcError};
use crate::protocol::{
    decode_entries, wire_path, FileAttr, FileHandle, Opcode, Request, Response,
};
use std::ffi::OsStr;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const TARGET: &str = "hyperfuse::client";

/// Client context shared by every filesystem operation.
///
/// Holds the engine handle and the mount point's attributes, which are
/// captured once at startup and served for the root path without a
/// network round-trip.
#[derive(Clone)]
pub struct RemoteFs {
    mux: Arc<Multiplexer>,
    root_attr: FileAttr,
}

impl RemoteFs {
    pub fn new(mux: Arc<Multiplexer>, root_attr: FileAttr) -> Self {
        Self { mux, root_attr }
    }

    /// Snapshot the root attributes from the local mount point.
    pub fn from_mount_point(mux: Arc<Multiplexer>, mount_point: &Path) -> io::Result<Self> {
        let meta = std::fs::metadata(mount_point)?;
        Ok(Self::new(mux, FileAttr::from_metadata(&meta)))
    }

    pub fn root_attr(&self) -> FileAttr {
        self.root_attr
    }

    pub fn multiplexer(&self) -> &Arc<Multiplexer> {
        &self.mux
    }

    /// Attribute lookup. The root path is answered locally.
    pub fn getattr(&self, path: &Path) -> Result<FileAttr, RpcError> {
        let path = wire_path(path.as_os_str().as_bytes());
        if path.is_empty() {
            return Ok(self.root_attr);
        }
        match self.mux.call(&Request::Getattr {
            path: path.to_vec(),
        })? {
            Response::Attr(attr) => Ok(attr),
            other => Err(unexpected(&other)),
        }
    }

    /// Directory listing. `sink` is invoked once per name, in server order.
    ///
    /// Returns the number of names delivered.
    pub fn readdir<F>(&self, path: &Path, mut sink: F) -> Result<usize, RpcError>
    where
        F: FnMut(&OsStr),
    {
        let request = Request::Readdir {
            path: wire_path(path.as_os_str().as_bytes()).to_vec(),
        };
        let raw = self.exchange(&request)?;
        let count = decode_entries(&raw.payload, |name| sink(OsStr::from_bytes(name)))?;
        debug!(target: TARGET, path = %path.display(), count, "readdir");
        Ok(count)
    }

    /// Open `path`, returning the server's handle.
    pub fn open(&self, path: &Path, flags: u16) -> Result<FileHandle, RpcError> {
        match self.mux.call(&Request::Open {
            path: wire_path(path.as_os_str().as_bytes()).to_vec(),
            flags,
        })? {
            Response::Opened(fh) => Ok(fh),
            other => Err(unexpected(&other)),
        }
    }

    /// Read up to `buf.len()` bytes at `offset` into `buf`.
    ///
    /// Returns the number of bytes the server delivered, which may be fewer
    /// than requested.
    pub fn read(
        &self,
        path: &Path,
        fh: FileHandle,
        offset: u32,
        buf: &mut [u8],
    ) -> Result<usize, RpcError> {
        let size = u32::try_from(buf.len()).map_err(|_| RpcError::Overflow)?;
        let request = Request::Read {
            path: wire_path(path.as_os_str().as_bytes()).to_vec(),
            fh,
            size,
            offset,
        };
        let raw = self.exchange(&request)?;
        let n = raw.payload.len();
        if n > buf.len() {
            return Err(ProtocolError::ReadOverflow {
                requested: size,
                returned: n,
            }
            .into());
        }
        buf[..n].copy_from_slice(&raw.payload);
        Ok(n)
    }

    /// Set the size of `path`.
    pub fn truncate(&self, path: &Path, size: u32) -> Result<(), RpcError> {
        match self.mux.call(&Request::Truncate {
            path: wire_path(path.as_os_str().as_bytes()).to_vec(),
            size,
        })? {
            Response::Truncated => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Exchange a request whose payload is consumed without structured
    /// decoding. A negative code fails the call.
    fn exchange(&self, request: &Request) -> Result<RawResponse, RpcError> {
        let raw = self.mux.exchange(request)?;
        if raw.result_code < 0 {
            debug!(
                target: TARGET,
                op = request.opcode().name(),
                code = raw.result_code,
                "remote error"
            );
            return Err(RpcError::Remote(raw.result_code));
        }
        Ok(raw)
    }
}

fn unexpected(response: &Response) -> RpcError {
    tracing::error!(target: TARGET, ?response, "response variant does not match request");
    let op = match response {
        Response::Attr(_) => Opcode::Getattr,
        Response::Entries(_) => Opcode::Readdir,
        Response::Opened(_) => Opcode::Open,
        Response::Data(_) => Opcode::Read,
        Response::Truncated => Opcode::Truncate,
    };
    ProtocolError::UnexpectedResponse(op).into()
}
