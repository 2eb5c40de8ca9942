//! Shared fixture: a real server and client joined by a socket pair.
//!
//! The server half runs `AsyncServer` + `PassthroughFs` on its own tokio
//! runtime; the client half is a `RemoteFs` over the blocking RPC engine.
//! No kernel FUSE mount is involved.

// Allow dead code - these utilities are conditionally used by different test files
#![allow(dead_code)]

use std::fs;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Once;

use hyperfuse::protocol::FileAttr;
use hyperfuse::{
    AsyncServer, Connection, FilesystemHandler, Multiplexer, PassthroughFs, RemoteFs, RpcConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Target name for fixture logs (consistent with library naming)
const TARGET: &str = "hyperfuse::fixture";

/// Initialize tracing once for the test process.
static TRACING_INIT: Once = Once::new();

pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .try_init();
    });
}

/// Server and client over one connection, serving a temporary directory.
pub struct Fixture {
    pub fs: RemoteFs,
    /// Directory the server exposes.
    pub data_dir: tempfile::TempDir,
    /// Stand-in for the mount point; its attributes answer the root path.
    pub mount_dir: tempfile::TempDir,
    runtime: tokio::runtime::Runtime,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(RpcConfig::default())
    }

    pub fn with_config(config: RpcConfig) -> Self {
        let data_dir = tempfile::tempdir().unwrap();
        let server_fs = PassthroughFs::new(data_dir.path());
        Self::start(server_fs, data_dir, config)
    }

    /// Serve a custom handler instead of the passthrough filesystem.
    pub fn with_handler<H: FilesystemHandler + 'static>(handler: H) -> Self {
        Self::start(handler, tempfile::tempdir().unwrap(), RpcConfig::default())
    }

    fn start<H: FilesystemHandler + 'static>(
        handler: H,
        data_dir: tempfile::TempDir,
        config: RpcConfig,
    ) -> Self {
        init_tracing();
        let mount_dir = tempfile::tempdir().unwrap();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let (client, server) = UnixStream::pair().unwrap();
        server.set_nonblocking(true).unwrap();
        runtime.spawn(async move {
            let stream = tokio::net::UnixStream::from_std(server).unwrap();
            let (r, w) = stream.into_split();
            let server = AsyncServer::new(handler);
            let _ = server.serve_stream(r, w, "fixture").await;
        });

        let mux = Multiplexer::with_config(Connection::unix(client).unwrap(), config).unwrap();
        let fs = RemoteFs::from_mount_point(mux, mount_dir.path()).unwrap();
        info!(target: TARGET, data_dir = %data_dir.path().display(), "fixture ready");

        Self {
            fs,
            data_dir,
            mount_dir,
            runtime,
        }
    }

    /// Local path of `rel` inside the served directory.
    pub fn local(&self, rel: &str) -> PathBuf {
        self.data_dir.path().join(rel.trim_start_matches('/'))
    }

    /// Write a file into the served directory.
    pub fn write(&self, rel: &str, contents: &[u8]) {
        let path = self.local(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    pub fn mkdir(&self, rel: &str) {
        fs::create_dir_all(self.local(rel)).unwrap();
    }

    pub fn root_attr(&self) -> FileAttr {
        FileAttr::from_metadata(&fs::metadata(self.mount_dir.path()).unwrap())
    }

    /// Spawn a future on the server runtime.
    pub fn spawn<F>(&self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.runtime.spawn(fut);
    }
}

/// Deterministic file contents of `len` bytes.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Read a whole remote file in `chunk`-sized requests.
pub fn read_all(fs: &RemoteFs, path: &Path, chunk: usize) -> Vec<u8> {
    let fh = fs.open(path, libc::O_RDONLY as u16).unwrap();
    let mut out = Vec::new();
    let mut buf = vec![0u8; chunk];
    loop {
        let n = fs.read(path, fh, out.len() as u32, &mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}

/// Whether this process can plausibly create a FUSE mount.
///
/// Needs a usable `/dev/fuse`, plus root or a `fusermount` helper.
#[cfg(feature = "fuse-client")]
pub fn fuse_available() -> bool {
    let dev_ok = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/fuse")
        .is_ok();
    let helper = ["/bin", "/usr/bin", "/usr/local/bin"].iter().any(|dir| {
        Path::new(dir).join("fusermount3").exists() || Path::new(dir).join("fusermount").exists()
    });
    // SAFETY: geteuid has no preconditions.
    let root = unsafe { libc::geteuid() } == 0;
    dev_ok && (root || helper)
}

/// Check if a path is a FUSE mount by looking in /proc/mounts.
pub fn is_fuse_mount(path: &Path) -> bool {
    let Ok(mounts) = fs::read_to_string("/proc/mounts") else {
        return false;
    };
    let path_str = path.to_str().unwrap_or("");
    mounts.lines().any(|line| {
        let mut fields = line.split_whitespace();
        let _source = fields.next();
        fields.next() == Some(path_str) && fields.next().is_some_and(|t| t.starts_with("fuse"))
    })
}

/// A kernel mount of `hyperfused` over a server on a Unix socket.
///
/// Dropping it unmounts (through `MountHandle`) and stops the server.
#[cfg(feature = "fuse-client")]
pub struct FuseMount {
    pub data_dir: tempfile::TempDir,
    pub mount_dir: tempfile::TempDir,
    _sock_dir: tempfile::TempDir,
    mount_handle: Option<hyperfuse::MountHandle>,
    runtime: Option<tokio::runtime::Runtime>,
}

#[cfg(feature = "fuse-client")]
impl FuseMount {
    /// Mount a fresh server, or `None` when FUSE is unusable here.
    ///
    /// Set `HYPERFUSE_REQUIRE_FUSE=1` to turn a skip into a failure.
    pub fn new() -> Option<Self> {
        use hyperfuse::{Endpoint, MountConfig};
        use std::time::{Duration, Instant};

        init_tracing();
        let required = std::env::var_os("HYPERFUSE_REQUIRE_FUSE").is_some();
        if !fuse_available() {
            assert!(!required, "FUSE required but /dev/fuse is not usable");
            eprintln!("skipping: FUSE is not available");
            return None;
        }

        let data_dir = tempfile::tempdir().unwrap();
        let mount_dir = tempfile::tempdir().unwrap();
        let sock_dir = tempfile::tempdir().unwrap();
        let socket = sock_dir.path().join("fs.sock");

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let server = AsyncServer::new(PassthroughFs::new(data_dir.path()));
        let server_socket = socket.clone();
        runtime.spawn(async move {
            let _ = server.serve_unix(&server_socket).await;
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while !socket.exists() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        let config = MountConfig::new()
            .attr_ttl(Duration::ZERO)
            .unmount_stale(false);
        let handle = match hyperfuse::mount_spawn(
            Endpoint::Unix(socket),
            mount_dir.path().to_path_buf(),
            config,
        ) {
            Ok(handle) => handle,
            Err(e) => {
                assert!(!required, "mount failed: {:#}", e);
                eprintln!("skipping: mount failed: {:#}", e);
                return None;
            }
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while !is_fuse_mount(mount_dir.path()) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        info!(target: TARGET, mount = %mount_dir.path().display(), "mount ready");

        Some(Self {
            data_dir,
            mount_dir,
            _sock_dir: sock_dir,
            mount_handle: Some(handle),
            runtime: Some(runtime),
        })
    }

    /// Path of `rel` under the mount point.
    pub fn mounted(&self, rel: &str) -> PathBuf {
        self.mount_dir.path().join(rel)
    }

    /// Path of `rel` in the served directory.
    pub fn local(&self, rel: &str) -> PathBuf {
        self.data_dir.path().join(rel)
    }
}

#[cfg(feature = "fuse-client")]
impl Drop for FuseMount {
    fn drop(&mut self) {
        // Unmount first so the kernel stops issuing requests.
        drop(self.mount_handle.take());
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
