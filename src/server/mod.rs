//! Reference server speaking the hyperfuse protocol.
//!
//! This module provides:
//!
//! - `FilesystemHandler`: Trait for implementing filesystem operations
//! - `PassthroughFs`: Passthrough filesystem mapping to a local directory
//! - `AsyncServer`: Async pipelined server
//! - `ServerConfig`: Configuration for tuning performance
//!
//! # Example
//!
//! ```rust,ignore
//! use hyperfuse::server::{AsyncServer, PassthroughFs, ServerConfig};
//!
//! let fs = PassthroughFs::new("/path/to/serve");
//! let server = AsyncServer::with_config(fs, ServerConfig::default());
//! server.run_blocking(&"0.0.0.0:10000".parse()?)?;
//! ```

mod config;
mod handler;
mod passthrough;
mod pipelined;

pub use config::ServerConfig;
pub use handler::{FilesystemHandler, HandlerResult};
pub use passthrough::{PassthroughFs, DEFAULT_MAX_OPEN_FILES};
pub use pipelined::AsyncServer;
