//! fuser::Filesystem implementation over [`RemoteFs`].

use super::inodes::{InodeTable, ROOT_INODE};
use super::remote::RemoteFs;
use crate::error::RpcError;
use crate::protocol::{FileAttr, FileHandle};
use fuser::{
    FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen,
    Request, TimeOrNow,
};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

const TARGET: &str = "hyperfuse::client";

/// FUSE client backed by the shared RPC engine.
pub struct FuseClient {
    fs: RemoteFs,
    inodes: InodeTable,
    attr_ttl: Duration,
}

impl FuseClient {
    pub fn new(fs: RemoteFs, attr_ttl: Duration) -> Self {
        Self {
            fs,
            inodes: InodeTable::new(),
            attr_ttl,
        }
    }

    pub fn remote(&self) -> &RemoteFs {
        &self.fs
    }

    /// Look up `path` remotely and assign it an inode.
    fn stat(&self, path: &Path) -> Result<fuser::FileAttr, RpcError> {
        let attr = self.fs.getattr(path)?;
        let ino = self.inodes.intern(path);
        Ok(to_fuser_attr(&attr, ino))
    }
}

/// Convert wire attributes to fuser::FileAttr under local inode `ino`.
pub fn to_fuser_attr(attr: &FileAttr, ino: u64) -> fuser::FileAttr {
    let secs = |t: u32| UNIX_EPOCH + Duration::from_secs(t as u64);
    fuser::FileAttr {
        ino,
        size: attr.size as u64,
        blocks: attr.blocks as u64,
        atime: secs(attr.atime),
        mtime: secs(attr.mtime),
        ctime: secs(attr.ctime),
        crtime: UNIX_EPOCH,
        kind: file_type(attr.mode),
        perm: (attr.mode & 0o7777) as u16,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: attr.rdev,
        blksize: attr.blksize,
        flags: 0,
    }
}

fn file_type(mode: u32) -> FileType {
    match mode & libc::S_IFMT as u32 {
        x if x == libc::S_IFDIR as u32 => FileType::Directory,
        x if x == libc::S_IFREG as u32 => FileType::RegularFile,
        x if x == libc::S_IFLNK as u32 => FileType::Symlink,
        x if x == libc::S_IFCHR as u32 => FileType::CharDevice,
        x if x == libc::S_IFBLK as u32 => FileType::BlockDevice,
        x if x == libc::S_IFIFO as u32 => FileType::NamedPipe,
        x if x == libc::S_IFSOCK as u32 => FileType::Socket,
        _ => FileType::RegularFile,
    }
}

impl FuseClient {
    fn path_of(&self, ino: u64) -> Result<PathBuf, i32> {
        self.inodes.path(ino).ok_or(libc::ENOENT)
    }

    /// Resolve `name` under `parent` and assign it an inode.
    pub fn lookup_entry(&self, parent: u64, name: &OsStr) -> Result<fuser::FileAttr, i32> {
        let path = self.inodes.child_path(parent, name).ok_or(libc::ENOENT)?;
        self.stat(&path).map_err(|e| {
            debug!(target: TARGET, path = %path.display(), error = %e, "lookup failed");
            e.errno()
        })
    }

    /// Current attributes of a known inode.
    pub fn inode_attr(&self, ino: u64) -> Result<fuser::FileAttr, i32> {
        let path = self.path_of(ino)?;
        let attr = self.fs.getattr(&path).map_err(|e| e.errno())?;
        Ok(to_fuser_attr(&attr, ino))
    }

    /// Apply a setattr request. Only size changes have a protocol
    /// operation; the kernel's accompanying timestamps are ignored.
    pub fn apply_setattr(
        &self,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
    ) -> Result<fuser::FileAttr, i32> {
        let path = self.path_of(ino)?;
        let Some(size) = size else {
            debug!(target: TARGET, ino, ?mode, ?uid, ?gid, "setattr without size unsupported");
            return Err(libc::ENOSYS);
        };
        if mode.is_some() || uid.is_some() || gid.is_some() {
            return Err(libc::ENOSYS);
        }
        let size = u32::try_from(size).map_err(|_| libc::EOVERFLOW)?;

        self.fs
            .truncate(&path, size)
            .and_then(|()| self.fs.getattr(&path))
            .map(|attr| to_fuser_attr(&attr, ino))
            .map_err(|e| e.errno())
    }

    /// Open an inode remotely. The wire carries the low 16 bits of the
    /// flags, which include the access mode.
    pub fn open_inode(&self, ino: u64, flags: i32) -> Result<FileHandle, i32> {
        let path = self.path_of(ino)?;
        self.fs.open(&path, (flags & 0xffff) as u16).map_err(|e| {
            debug!(target: TARGET, path = %path.display(), flags, error = %e, "open failed");
            e.errno()
        })
    }

    /// Read up to `size` bytes at `offset`.
    pub fn read_inode(&self, ino: u64, fh: u64, offset: i64, size: u32) -> Result<Vec<u8>, i32> {
        let path = self.path_of(ino)?;
        let fh = FileHandle::try_from(fh).map_err(|_| libc::EBADF)?;
        let offset = u32::try_from(offset).map_err(|_| libc::EOVERFLOW)?;

        let mut buf = vec![0u8; size as usize];
        let n = self
            .fs
            .read(&path, fh, offset, &mut buf)
            .map_err(|e| e.errno())?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Emit directory entries after `offset`, starting with `.` and `..`.
    ///
    /// `add` receives `(ino, next_offset, kind, name)` and returns true
    /// once the kernel buffer is full. Kinds are resolved by attribute
    /// lookup only for entries actually emitted.
    pub fn list_dir<F>(&self, ino: u64, offset: i64, mut add: F) -> Result<(), i32>
    where
        F: FnMut(u64, i64, FileType, &OsStr) -> bool,
    {
        let path = self.path_of(ino)?;

        let mut names: Vec<OsString> = Vec::new();
        self.fs
            .readdir(&path, |name| names.push(name.to_os_string()))
            .map_err(|e| e.errno())?;

        let parent_ino = match path.parent() {
            Some(parent) => self.inodes.intern(parent),
            None => ROOT_INODE,
        };

        let entries = [OsString::from("."), OsString::from("..")]
            .into_iter()
            .chain(names);
        for (i, name) in entries.enumerate().skip(offset.max(0) as usize) {
            let (entry_ino, kind) = match i {
                0 => (ino, FileType::Directory),
                1 => (parent_ino, FileType::Directory),
                _ => {
                    let child = path.join(&name);
                    let kind = match self.fs.getattr(&child) {
                        Ok(attr) => file_type(attr.mode),
                        Err(e) => {
                            // The kind is only a hint; lookup reports the error.
                            debug!(target: TARGET, path = %child.display(), error = %e, "readdir: kind lookup failed");
                            FileType::RegularFile
                        }
                    };
                    (self.inodes.intern(&child), kind)
                }
            };
            // The offset handed back is the position of the next entry.
            if add(entry_ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        Ok(())
    }
}

impl Filesystem for FuseClient {
    fn destroy(&mut self) {
        let stats = self.fs.multiplexer().stats();
        info!(
            target: TARGET,
            sent = stats.sent,
            received = stats.received,
            late = stats.late,
            inodes = self.inodes.len(),
            "filesystem destroyed"
        );
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.lookup_entry(parent, name) {
            Ok(attr) => reply.entry(&self.attr_ttl, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.inode_attr(ino) {
            Ok(attr) => reply.attr(&self.attr_ttl, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        match self.apply_setattr(ino, mode, uid, gid, size) {
            Ok(attr) => reply.attr(&self.attr_ttl, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.open_inode(ino, flags) {
            Ok(fh) => reply.opened(u64::from(fh), 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        match self.read_inode(ino, fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(errno) => reply.error(errno),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        // No close operation on the wire; the server owns handle lifetime.
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request, _ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(0, 0);
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let result = self.list_dir(ino, offset, |entry_ino, next, kind, name| {
            reply.add(entry_ino, next, kind, name)
        });
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn releasedir(&mut self, _req: &Request, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_fuser_attr_uses_local_inode() {
        let attr = FileAttr {
            mode: libc::S_IFREG as u32 | 0o644,
            ino: 987,
            size: 42,
            nlink: 1,
            uid: 1000,
            gid: 100,
            mtime: 1_700_000_000,
            ..Default::default()
        };
        let converted = to_fuser_attr(&attr, 5);
        assert_eq!(converted.ino, 5);
        assert_eq!(converted.size, 42);
        assert_eq!(converted.kind, FileType::RegularFile);
        assert_eq!(converted.perm, 0o644);
        assert_eq!(converted.uid, 1000);
        assert_eq!(
            converted.mtime,
            UNIX_EPOCH + Duration::from_secs(1_700_000_000)
        );
    }

    #[test]
    fn test_file_type_mapping() {
        assert_eq!(file_type(libc::S_IFDIR as u32 | 0o755), FileType::Directory);
        assert_eq!(file_type(libc::S_IFLNK as u32 | 0o777), FileType::Symlink);
        assert_eq!(file_type(libc::S_IFIFO as u32), FileType::NamedPipe);
        assert_eq!(file_type(0), FileType::RegularFile);
    }
}
