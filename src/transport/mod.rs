//! Transport layer for hyperfuse.
//!
//! The protocol runs over any ordered, reliable byte stream:
//!
//! - **TCP**: `host:port` (port defaults to 10000)
//! - **Unix sockets**: `unix:/path/to/socket`
//! - **Stdio**: `-`, for a parent process that already holds both ends
//!
//! # Example
//!
//! ```rust,ignore
//! use hyperfuse::transport::{Endpoint, SocketOptions};
//!
//! let endpoint: Endpoint = "fileserver:10000".parse()?;
//! let conn = endpoint.connect(SocketOptions::default())?;
//! ```

mod endpoint;
mod traits;

pub use endpoint::{Endpoint, DEFAULT_PORT};
pub use traits::{Connection, ShutdownHandle, SocketOptions, TransportError};
