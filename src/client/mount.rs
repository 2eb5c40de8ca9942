//! FUSE mount orchestration.

use super::{FuseClient, Multiplexer, RemoteFs, RpcConfig};
use crate::protocol::FileAttr;
use crate::transport::{Endpoint, SocketOptions};
use anyhow::Context;
use fuser::SessionUnmounter;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const TARGET: &str = "hyperfuse::client";

/// Configuration for a FUSE mount.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// RPC engine tuning.
    pub rpc: RpcConfig,
    /// How long the kernel may cache attributes and entries.
    pub attr_ttl: Duration,
    /// Let users other than the mounter access the filesystem.
    pub allow_other: bool,
    /// Detach a leftover mount at the mount point before mounting.
    pub unmount_stale: bool,
    /// Mount read-only. The kernel then refuses truncation before it
    /// reaches the filesystem.
    pub read_only: bool,
    /// Deadline for a single blocking socket write.
    pub write_timeout: Option<Duration>,
    pub fs_name: String,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            attr_ttl: Duration::from_secs(1),
            allow_other: false,
            unmount_stale: true,
            read_only: false,
            write_timeout: None,
            fs_name: "hyperfuse".to_string(),
        }
    }
}

impl MountConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rpc(mut self, rpc: RpcConfig) -> Self {
        self.rpc = rpc;
        self
    }

    pub fn attr_ttl(mut self, ttl: Duration) -> Self {
        self.attr_ttl = ttl;
        self
    }

    pub fn allow_other(mut self, allow: bool) -> Self {
        self.allow_other = allow;
        self
    }

    pub fn unmount_stale(mut self, unmount: bool) -> Self {
        self.unmount_stale = unmount;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn fs_name(mut self, name: impl Into<String>) -> Self {
        self.fs_name = name.into();
        self
    }

    fn mount_options(&self) -> Vec<fuser::MountOption> {
        let mut options = vec![
            fuser::MountOption::FSName(self.fs_name.clone()),
            fuser::MountOption::NoSuid,
            fuser::MountOption::NoDev,
        ];
        if self.read_only {
            options.push(fuser::MountOption::RO);
        }
        if self.allow_other {
            options.push(fuser::MountOption::AllowOther);
        }
        options
    }
}

/// Handle for a spawned FUSE mount.
///
/// Created by [`mount_spawn`]. Automatically unmounts when dropped.
/// Use [`join`](MountHandle::join) to wait for an external unmount instead.
pub struct MountHandle {
    thread: Option<JoinHandle<anyhow::Result<()>>>,
    unmounter: Option<SessionUnmounter>,
}

impl Drop for MountHandle {
    fn drop(&mut self) {
        if let Some(mut unmounter) = self.unmounter.take() {
            debug!(target: TARGET, "MountHandle::drop() unmounting");
            if let Err(e) = unmounter.unmount() {
                warn!(target: TARGET, error = %e, "unmount failed");
            }
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl MountHandle {
    /// Wait for the mount to go away without triggering an unmount.
    pub fn join(mut self) -> anyhow::Result<()> {
        self.unmounter.take();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| anyhow::anyhow!("mount thread panicked"))?,
            None => Ok(()),
        }
    }
}

/// Connect to `target` and mount it at `mount_point` (blocking).
///
/// Returns once the filesystem is unmounted.
pub fn mount(target: &Endpoint, mount_point: &Path, config: MountConfig) -> anyhow::Result<()> {
    mount_internal(target, mount_point, config, None)
}

/// Like [`mount`], but runs the session on a background thread.
pub fn mount_spawn(
    target: Endpoint,
    mount_point: PathBuf,
    config: MountConfig,
) -> anyhow::Result<MountHandle> {
    let (tx, rx) = mpsc::channel();
    let thread = thread::Builder::new()
        .name("hyperfuse-session".to_string())
        .spawn(move || mount_internal(&target, &mount_point, config, Some(tx)))?;

    match rx.recv() {
        Ok(unmounter) => Ok(MountHandle {
            thread: Some(thread),
            unmounter: Some(unmounter),
        }),
        // The thread exited before mounting; surface its error.
        Err(_) => match thread.join() {
            Ok(Err(e)) => Err(e),
            Ok(Ok(())) => Err(anyhow::anyhow!("mount thread exited before mounting")),
            Err(_) => Err(anyhow::anyhow!("mount thread panicked")),
        },
    }
}

fn mount_internal(
    target: &Endpoint,
    mount_point: &Path,
    config: MountConfig,
    unmounter_tx: Option<mpsc::Sender<SessionUnmounter>>,
) -> anyhow::Result<()> {
    if config.unmount_stale {
        unmount_stale(mount_point);
    }

    // Root attributes come from the local directory, before the mount
    // covers it.
    let root_meta = std::fs::metadata(mount_point)
        .with_context(|| format!("mount point {} is not accessible", mount_point.display()))?;
    if !root_meta.is_dir() {
        anyhow::bail!("mount point {} is not a directory", mount_point.display());
    }

    let options = SocketOptions {
        write_timeout: config.write_timeout,
    };
    let conn = target
        .connect(options)
        .with_context(|| format!("failed to connect to {}", target))?;
    let mux = Multiplexer::with_config(conn, config.rpc.clone())
        .context("failed to start RPC engine")?;
    let remote = RemoteFs::new(mux, FileAttr::from_metadata(&root_meta));

    let fs = FuseClient::new(remote, config.attr_ttl);
    let options = config.mount_options();
    info!(target: TARGET, mount_point = %mount_point.display(), endpoint = %target, ?options, "mounting");

    let mut session = fuser::Session::new(fs, mount_point, &options)
        .with_context(|| format!("failed to mount at {}", mount_point.display()))?;
    info!(target: TARGET, mount_point = %mount_point.display(), "mounted");

    if let Some(tx) = unmounter_tx {
        let _ = tx.send(session.unmount_callable());
    }

    let run_result = session.run();
    drop(session);
    if let Err(e) = run_result {
        error!(target: TARGET, error = %e, "FUSE session failed");
        return Err(e.into());
    }
    info!(target: TARGET, mount_point = %mount_point.display(), "unmounted");
    Ok(())
}

/// Lazily detach whatever is mounted at `mount_point`. Errors are ignored.
#[cfg(target_os = "linux")]
pub fn unmount_stale(mount_point: &Path) {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(path) = CString::new(mount_point.as_os_str().as_bytes()) else {
        return;
    };
    // SAFETY: `path` is a valid NUL-terminated string for the duration of the call.
    let rc = unsafe { libc::umount2(path.as_ptr(), libc::MNT_DETACH) };
    if rc == 0 {
        info!(target: TARGET, mount_point = %mount_point.display(), "detached stale mount");
    } else {
        debug!(
            target: TARGET,
            mount_point = %mount_point.display(),
            error = %std::io::Error::last_os_error(),
            "no stale mount detached"
        );
    }
}

#[cfg(not(target_os = "linux"))]
pub fn unmount_stale(_mount_point: &Path) {}
