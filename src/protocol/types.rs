//! Core types carried in hyperfuse payloads.

use super::wire::{WireError, WireReader, WireWriter};
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;

/// File attributes as carried on the wire.
///
/// Thirteen `u32` fields in a fixed order that is part of the protocol:
/// dev, mode, nlink, uid, gid, rdev, blksize, ino, size, blocks, atime,
/// mtime, ctime. Times are whole seconds since the epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileAttr {
    pub dev: u32,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u32,
    pub blksize: u32,
    pub ino: u32,
    pub size: u32,
    pub blocks: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
}

impl FileAttr {
    /// Encoded size in bytes.
    pub const WIRE_SIZE: usize = 13 * 4;

    /// Snapshot attributes from local metadata, truncating to 32 bits.
    pub fn from_metadata(meta: &Metadata) -> Self {
        Self {
            dev: meta.dev() as u32,
            mode: meta.mode(),
            nlink: meta.nlink() as u32,
            uid: meta.uid(),
            gid: meta.gid(),
            rdev: meta.rdev() as u32,
            blksize: meta.blksize() as u32,
            ino: meta.ino() as u32,
            size: meta.size() as u32,
            blocks: meta.blocks() as u32,
            atime: meta.atime() as u32,
            mtime: meta.mtime() as u32,
            ctime: meta.ctime() as u32,
        }
    }

    pub fn encode(&self, w: &mut WireWriter) {
        for field in [
            self.dev,
            self.mode,
            self.nlink,
            self.uid,
            self.gid,
            self.rdev,
            self.blksize,
            self.ino,
            self.size,
            self.blocks,
            self.atime,
            self.mtime,
            self.ctime,
        ] {
            w.put_u32(field);
        }
    }

    pub fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            dev: r.get_u32()?,
            mode: r.get_u32()?,
            nlink: r.get_u32()?,
            uid: r.get_u32()?,
            gid: r.get_u32()?,
            rdev: r.get_u32()?,
            blksize: r.get_u32()?,
            ino: r.get_u32()?,
            size: r.get_u32()?,
            blocks: r.get_u32()?,
            atime: r.get_u32()?,
            mtime: r.get_u32()?,
            ctime: r.get_u32()?,
        })
    }

    fn file_type(&self) -> u32 {
        self.mode & libc::S_IFMT as u32
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.file_type() == libc::S_IFDIR as u32
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.file_type() == libc::S_IFREG as u32
    }

    /// Check if this is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.file_type() == libc::S_IFLNK as u32
    }
}

/// Opaque handle returned by open and echoed on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileHandle(pub u16);

impl From<FileHandle> for u64 {
    fn from(fh: FileHandle) -> Self {
        fh.0 as u64
    }
}

impl TryFrom<u64> for FileHandle {
    type Error = std::num::TryFromIntError;

    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        u16::try_from(raw).map(FileHandle)
    }
}
