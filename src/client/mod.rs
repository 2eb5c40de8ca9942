//! Mounting client: many filesystem callers, one connection.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ ┌──────────────┐
//! │  FuseClient  │ │   RemoteFs   │   filesystem callers
//! └──────┬───────┘ └──────┬───────┘
//!        └────────┬───────┘
//!          ┌──────┴──────┐
//!          │ Multiplexer │  request ids from the RequestLedger
//!          └──────┬──────┘
//!                 │          single byte stream
//!          ┌──────┴──────┐
//!          │   Server    │
//!          └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use hyperfuse::client::{mount, MountConfig};
//!
//! // Blocks until the filesystem is unmounted
//! mount(&"fileserver:10000".parse()?, Path::new("/mnt/remote"), MountConfig::new())?;
//! ```
//!
//! # Feature
//!
//! The FUSE binding requires the `fuse-client` feature (enabled by default).
//! [`RemoteFs`] and the engine are always available.

mod inodes;
mod ledger;
mod multiplexer;
mod remote;

#[cfg(feature = "fuse-client")]
mod fuse;
#[cfg(feature = "fuse-client")]
mod mount;

pub use inodes::{InodeTable, ROOT_INODE};
pub use ledger::{LedgerError, RequestLedger, DEFAULT_CAPACITY, ID_SPACE};
pub use multiplexer::{Multiplexer, MuxStats, RawResponse, RpcConfig};
pub use remote::RemoteFs;

#[cfg(feature = "fuse-client")]
pub use fuse::{to_fuser_attr, FuseClient};
#[cfg(feature = "fuse-client")]
pub use mount::{mount, mount_spawn, unmount_stale, MountConfig, MountHandle};
