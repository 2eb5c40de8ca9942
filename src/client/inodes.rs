//! Stable inode numbers for remote paths.
//!
//! The protocol is path-based while the kernel addresses files by inode.
//! Every path the kernel learns about through `lookup` or `readdir` gets a
//! number that stays valid for the life of the mount.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Inode of the mount root.
pub const ROOT_INODE: u64 = 1;

#[derive(Debug)]
struct Inner {
    paths: HashMap<u64, PathBuf>,
    inodes: HashMap<PathBuf, u64>,
    next: u64,
}

/// Bidirectional inode <-> path map.
#[derive(Debug)]
pub struct InodeTable {
    inner: Mutex<Inner>,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    pub fn new() -> Self {
        let root = PathBuf::from("/");
        let mut paths = HashMap::new();
        let mut inodes = HashMap::new();
        paths.insert(ROOT_INODE, root.clone());
        inodes.insert(root, ROOT_INODE);
        Self {
            inner: Mutex::new(Inner {
                paths,
                inodes,
                next: ROOT_INODE + 1,
            }),
        }
    }

    /// Absolute path for `ino`, if it has been assigned.
    pub fn path(&self, ino: u64) -> Option<PathBuf> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.paths.get(&ino).cloned()
    }

    /// Path of `name` inside directory `parent`.
    pub fn child_path(&self, parent: u64, name: &OsStr) -> Option<PathBuf> {
        self.path(parent).map(|dir| dir.join(name))
    }

    /// Inode for `path`, assigning a new one on first sight.
    pub fn intern(&self, path: &Path) -> u64 {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(ino) = inner.inodes.get(path) {
            return *ino;
        }
        let ino = inner.next;
        inner.next += 1;
        inner.paths.insert(ino, path.to_path_buf());
        inner.inodes.insert(path.to_path_buf(), ino);
        ino
    }

    /// Number of known inodes, root included.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_is_preassigned() {
        let table = InodeTable::new();
        assert_eq!(table.path(ROOT_INODE).unwrap(), Path::new("/"));
        assert_eq!(table.intern(Path::new("/")), ROOT_INODE);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_intern_is_stable() {
        let table = InodeTable::new();
        let a = table.intern(Path::new("/a"));
        let b = table.intern(Path::new("/a/b"));
        assert_ne!(a, b);
        assert_ne!(a, ROOT_INODE);
        assert_eq!(table.intern(Path::new("/a")), a);
        assert_eq!(table.path(b).unwrap(), Path::new("/a/b"));
    }

    #[test]
    fn test_child_path() {
        let table = InodeTable::new();
        let dir = table.intern(Path::new("/dir"));
        assert_eq!(
            table.child_path(dir, OsStr::new("file")).unwrap(),
            Path::new("/dir/file")
        );
        assert_eq!(
            table.child_path(ROOT_INODE, OsStr::new("top")).unwrap(),
            Path::new("/top")
        );
        assert!(table.child_path(999, OsStr::new("x")).is_none());
    }
}
