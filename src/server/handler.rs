//! Filesystem handler trait for protocol operations.

use crate::protocol::{FileAttr, FileHandle, Request, Response};

/// Result of one handler operation: a response or a positive errno.
pub type HandlerResult<T> = Result<T, i32>;

/// Handler for remote filesystem operations.
///
/// Paths arrive in wire form: relative to the served root, without a
/// leading slash, with the empty path naming the root itself. Operations
/// are executed synchronously (they may block) but are called from async
/// context via `spawn_blocking`.
///
/// The default implementation returns ENOSYS for all operations.
pub trait FilesystemHandler: Send + Sync {
    /// Handle a complete request.
    ///
    /// This is the main entry point. The default implementation
    /// dispatches to individual operation methods.
    fn handle_request(&self, request: &Request) -> HandlerResult<Response> {
        match request {
            Request::Getattr { path } => self.getattr(path).map(Response::Attr),
            Request::Readdir { path } => self.readdir(path).map(Response::Entries),
            Request::Read {
                path,
                fh,
                size,
                offset,
            } => self.read(path, *fh, *offset, *size).map(Response::Data),
            Request::Open { path, flags } => self.open(path, *flags).map(Response::Opened),
            Request::Truncate { path, size } => {
                self.truncate(path, *size).map(|()| Response::Truncated)
            }
        }
    }

    /// Get file attributes.
    fn getattr(&self, _path: &[u8]) -> HandlerResult<FileAttr> {
        Err(libc::ENOSYS)
    }

    /// List a directory's entry names.
    fn readdir(&self, _path: &[u8]) -> HandlerResult<Vec<Vec<u8>>> {
        Err(libc::ENOSYS)
    }

    /// Read up to `size` bytes at `offset`.
    fn read(
        &self,
        _path: &[u8],
        _fh: FileHandle,
        _offset: u32,
        _size: u32,
    ) -> HandlerResult<Vec<u8>> {
        Err(libc::ENOSYS)
    }

    /// Open a file.
    fn open(&self, _path: &[u8], _flags: u16) -> HandlerResult<FileHandle> {
        Err(libc::ENOSYS)
    }

    /// Set a file's size.
    fn truncate(&self, _path: &[u8], _size: u32) -> HandlerResult<()> {
        Err(libc::ENOSYS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Empty;
    impl FilesystemHandler for Empty {}

    struct OnlyAttr;
    impl FilesystemHandler for OnlyAttr {
        fn getattr(&self, path: &[u8]) -> HandlerResult<FileAttr> {
            Ok(FileAttr {
                size: path.len() as u32,
                ..Default::default()
            })
        }
    }

    #[test]
    fn test_defaults_are_enosys() {
        let requests = [
            Request::Getattr { path: b"a".to_vec() },
            Request::Readdir { path: Vec::new() },
            Request::Open {
                path: b"a".to_vec(),
                flags: 0,
            },
            Request::Truncate {
                path: b"a".to_vec(),
                size: 0,
            },
        ];
        for req in &requests {
            assert_eq!(Empty.handle_request(req), Err(libc::ENOSYS));
        }
    }

    #[test]
    fn test_dispatch_wraps_response() {
        let resp = OnlyAttr
            .handle_request(&Request::Getattr {
                path: b"abc".to_vec(),
            })
            .unwrap();
        assert_eq!(
            resp,
            Response::Attr(FileAttr {
                size: 3,
                ..Default::default()
            })
        );
        assert_eq!(
            OnlyAttr.handle_request(&Request::Readdir { path: Vec::new() }),
            Err(libc::ENOSYS)
        );
    }
}
