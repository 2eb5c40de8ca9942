use crate::client::RpcConfig;
use crate::server::{PassthroughFs, ServerConfig};
use std::path::Path;
use crate::transport::Endpoint;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Mount a remote filesystem served over a single byte stream.
#[derive(Parser, Debug)]
#[command(name = "hyperfused", version)]
pub struct MountArgs {
    /// Local directory to mount over
    pub mount_point: PathBuf,

    /// Server to connect to: host[:port], [v6addr]:port, unix:/path, or - for stdio
    pub target: Endpoint,

    /// Maximum concurrently outstanding requests
    #[arg(long, env = "HYPERFUSE_MAX_IN_FLIGHT", default_value_t = crate::client::DEFAULT_CAPACITY)]
    pub max_in_flight: usize,

    /// Per-request deadline in milliseconds (0 waits forever)
    #[arg(long, env = "HYPERFUSE_TIMEOUT_MS", default_value_t = 0)]
    pub timeout_ms: u64,

    /// Kernel attribute cache lifetime in seconds
    #[arg(long, env = "HYPERFUSE_ATTR_TTL_SECS", default_value_t = 1)]
    pub attr_ttl_secs: u64,

    /// Allow other users to access the mount
    #[arg(long)]
    pub allow_other: bool,

    /// Do not detach a stale mount at the mount point first
    #[arg(long)]
    pub no_unmount_stale: bool,

    /// Mount read-only (disables truncate)
    #[arg(long)]
    pub read_only: bool,
}

impl MountArgs {
    pub fn call_timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    pub fn rpc_config(&self) -> RpcConfig {
        RpcConfig::new()
            .max_in_flight(self.max_in_flight)
            .call_timeout(self.call_timeout())
    }
}

/// Serve a local directory to hyperfused clients.
#[derive(Parser, Debug)]
#[command(name = "hyperfuse-serve", version)]
pub struct ServeArgs {
    /// Directory to serve
    pub root: PathBuf,

    /// Where to listen: host:port, unix:/path, or - to serve stdio
    pub listen: Endpoint,

    /// Maximum blocking threads for filesystem I/O
    #[arg(long, env = "HYPERFUSE_MAX_BLOCKING_THREADS", default_value_t = 512)]
    pub max_blocking_threads: usize,

    /// Open file handles kept before the oldest is recycled
    #[arg(long, env = "HYPERFUSE_MAX_OPEN_FILES", default_value_t = crate::server::DEFAULT_MAX_OPEN_FILES)]
    pub max_open_files: usize,
}

impl ServeArgs {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::new()
            .max_blocking_threads(self.max_blocking_threads)
    }

    /// Passthrough handler for `root` with the configured handle limit.
    pub fn filesystem(&self, root: &Path) -> PassthroughFs {
        PassthroughFs::new(root).with_max_open_files(self.max_open_files)
    }
}
