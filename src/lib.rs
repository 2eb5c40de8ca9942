//! hyperfuse: a remote filesystem over a single framed byte stream.
//!
//! The client ([`client`]) turns filesystem operations into request frames
//! on one shared connection and routes the response frames back to their
//! callers. The server ([`server`]) answers those frames from a local
//! directory.
//!
//! # Modules
//!
//! - [`protocol`]: wire codec, frames and operation payloads
//! - [`transport`]: endpoints and connection halves
//! - [`client`]: request ledger, RPC engine, filesystem adapter, FUSE mount
//! - [`server`]: handler trait, passthrough filesystem, async server

pub mod cli;
pub mod client;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod transport;

// Re-export core types for convenience
pub use client::{Multiplexer, RemoteFs, RpcConfig};
pub use error::{status, ProtocolError, RpcError};
pub use protocol::{FileAttr, FileHandle, Opcode, Request, Response};
pub use server::{AsyncServer, FilesystemHandler, PassthroughFs, ServerConfig};
pub use transport::{Connection, Endpoint};

#[cfg(feature = "fuse-client")]
pub use client::{mount, mount_spawn, MountConfig, MountHandle};
