//! Passthrough filesystem serving a local directory.
//!
//! Wire paths are resolved beneath the served root. Components that could
//! escape it (`..`, absolute paths) are refused with `EACCES`; symlinks are
//! reported by `getattr` but not followed by it.
//!
//! Files are opened read-only. Open handles live in a bounded table keyed
//! by the 16-bit [`FileHandle`]; the protocol has no close operation, so
//! when the table is full the oldest handle is recycled. A read whose
//! handle has been recycled (or never existed) reopens the file by path.

use super::handler::{FilesystemHandler, HandlerResult};
use crate::protocol::{FileAttr, FileHandle, MAX_FRAME_SIZE, RESPONSE_HEADER_LEN};
use std::collections::{HashMap, VecDeque};
use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileExt;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

const TARGET: &str = "hyperfuse::server";

/// Largest read payload that still fits in one response frame.
const MAX_READ: usize = MAX_FRAME_SIZE - (RESPONSE_HEADER_LEN - 4);

/// Default number of concurrently open handles.
pub const DEFAULT_MAX_OPEN_FILES: usize = 1024;

struct OpenFile {
    path: Vec<u8>,
    file: Arc<File>,
}

struct HandleTable {
    files: HashMap<u16, OpenFile>,
    /// Handles in allocation order, oldest first.
    order: VecDeque<u16>,
    next: u16,
    capacity: usize,
}

impl HandleTable {
    fn new(capacity: usize) -> Self {
        Self {
            files: HashMap::new(),
            order: VecDeque::new(),
            next: 1,
            capacity: capacity.clamp(1, 1 << 16),
        }
    }

    fn insert(&mut self, path: &[u8], file: File) -> FileHandle {
        while self.files.len() >= self.capacity {
            match self.order.pop_front() {
                Some(old) => {
                    self.files.remove(&old);
                    debug!(target: TARGET, fh = old, "recycled open handle");
                }
                None => break,
            }
        }
        // Below capacity, so a free id exists.
        let mut id = self.next;
        while self.files.contains_key(&id) {
            id = id.wrapping_add(1);
        }
        self.next = id.wrapping_add(1);
        self.files.insert(
            id,
            OpenFile {
                path: path.to_vec(),
                file: Arc::new(file),
            },
        );
        self.order.push_back(id);
        FileHandle(id)
    }

    /// File for `fh`, if it is still open on `path`.
    fn get(&self, fh: FileHandle, path: &[u8]) -> Option<Arc<File>> {
        self.files
            .get(&fh.0)
            .filter(|open| open.path == path)
            .map(|open| Arc::clone(&open.file))
    }
}

/// A filesystem handler that maps operations to a local directory.
pub struct PassthroughFs {
    root: PathBuf,
    handles: Mutex<HandleTable>,
}

impl PassthroughFs {
    /// Create a new passthrough filesystem rooted at the given path.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            handles: Mutex::new(HandleTable::new(DEFAULT_MAX_OPEN_FILES)),
        }
    }

    /// Set the open handle limit.
    pub fn with_max_open_files(self, count: usize) -> Self {
        Self {
            handles: Mutex::new(HandleTable::new(count)),
            ..self
        }
    }

    /// Get the root path.
    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Number of handles currently open.
    pub fn open_files(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .files
            .len()
    }

    /// Map a wire path to a local path under the root.
    fn resolve(&self, path: &[u8]) -> HandlerResult<PathBuf> {
        let mut resolved = self.root.clone();
        for component in Path::new(OsStr::from_bytes(path)).components() {
            match component {
                Component::Normal(name) => resolved.push(name),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    debug!(
                        target: TARGET,
                        path = %String::from_utf8_lossy(path),
                        "refusing path outside root"
                    );
                    return Err(libc::EACCES);
                }
            }
        }
        Ok(resolved)
    }

    fn open_file(&self, path: &[u8]) -> HandlerResult<File> {
        File::open(self.resolve(path)?).map_err(errno)
    }
}

fn errno(err: io::Error) -> i32 {
    err.raw_os_error().unwrap_or(libc::EIO)
}

/// Read at `offset` until `buf` is full or the file ends.
fn read_full_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl FilesystemHandler for PassthroughFs {
    fn getattr(&self, path: &[u8]) -> HandlerResult<FileAttr> {
        let meta = fs::symlink_metadata(self.resolve(path)?).map_err(errno)?;
        Ok(FileAttr::from_metadata(&meta))
    }

    fn readdir(&self, path: &[u8]) -> HandlerResult<Vec<Vec<u8>>> {
        let dir = self.resolve(path)?;
        let mut names = Vec::new();
        for entry in fs::read_dir(dir).map_err(errno)? {
            let entry = entry.map_err(errno)?;
            names.push(entry.file_name().as_bytes().to_vec());
        }
        names.sort();
        Ok(names)
    }

    fn open(&self, path: &[u8], flags: u16) -> HandlerResult<FileHandle> {
        if flags as i32 & libc::O_ACCMODE != libc::O_RDONLY {
            return Err(libc::EROFS);
        }
        let file = self.open_file(path)?;
        let fh = self
            .handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path, file);
        debug!(target: TARGET, path = %String::from_utf8_lossy(path), fh = fh.0, "open");
        Ok(fh)
    }

    fn read(&self, path: &[u8], fh: FileHandle, offset: u32, size: u32) -> HandlerResult<Vec<u8>> {
        let cached = self
            .handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(fh, path);
        let file = match cached {
            Some(file) => file,
            None => Arc::new(self.open_file(path)?),
        };

        let mut buf = vec![0u8; (size as usize).min(MAX_READ)];
        let n = read_full_at(&file, &mut buf, offset as u64).map_err(errno)?;
        buf.truncate(n);
        Ok(buf)
    }

    fn truncate(&self, path: &[u8], size: u32) -> HandlerResult<()> {
        let file = OpenOptions::new()
            .write(true)
            .open(self.resolve(path)?)
            .map_err(errno)?;
        file.set_len(size as u64).map_err(errno)
    }
}
