//! End-to-end tests: RemoteFs against the real server over a socket.

mod common;

use common::{pattern, read_all, Fixture};
use hyperfuse::protocol::FileHandle;
use hyperfuse::server::{AsyncServer, PassthroughFs};
use hyperfuse::transport::{Endpoint, SocketOptions};
use hyperfuse::{status, Multiplexer, RemoteFs, RpcConfig, RpcError};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn test_getattr_matches_local_file() {
    let fx = Fixture::new();
    fx.write("hello.txt", b"hello world");

    let attr = fx.fs.getattr(Path::new("/hello.txt")).unwrap();
    let local = std::fs::symlink_metadata(fx.local("hello.txt")).unwrap();
    assert!(attr.is_file());
    assert_eq!(attr.size, 11);
    assert_eq!(attr.mode, local.mode());
    assert_eq!(attr.ino, local.ino() as u32);
    assert_eq!(attr.mtime, local.mtime() as u32);
}

#[test]
fn test_root_getattr_is_local() {
    let fx = Fixture::new();
    let attr = fx.fs.getattr(Path::new("/")).unwrap();
    assert_eq!(attr, fx.root_attr());
    assert!(attr.is_dir());
    assert_eq!(fx.fs.multiplexer().stats().sent, 0);
}

#[test]
fn test_readdir_lists_entries_in_order() {
    let fx = Fixture::new();
    fx.write("c", b"");
    fx.write("a", b"");
    fx.mkdir("b");

    let mut names = Vec::new();
    let count = fx
        .fs
        .readdir(Path::new("/"), |name| {
            names.push(name.to_string_lossy().into_owned())
        })
        .unwrap();
    assert_eq!(count, 3);
    assert_eq!(names, vec!["a", "b", "c"]);

    let mut nested = Vec::new();
    fx.write("b/inner", b"x");
    fx.fs
        .readdir(Path::new("/b"), |name| nested.push(name.to_os_string()))
        .unwrap();
    assert_eq!(nested, vec!["inner"]);
}

#[test]
fn test_read_whole_file_in_chunks() {
    let fx = Fixture::new();
    let data = pattern(1024 * 1024 + 17);
    fx.write("big.bin", &data);

    let got = read_all(&fx.fs, Path::new("/big.bin"), 64 * 1024);
    assert_eq!(got.len(), data.len());
    assert_eq!(got, data);
}

#[test]
fn test_short_read_at_end_of_file() {
    let fx = Fixture::new();
    fx.write("short.txt", b"0123456789");
    let path = Path::new("/short.txt");
    let fh = fx.fs.open(path, libc::O_RDONLY as u16).unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(fx.fs.read(path, fh, 6, &mut buf).unwrap(), 4);
    assert_eq!(&buf[..4], b"6789");
    assert_eq!(fx.fs.read(path, fh, 10, &mut buf).unwrap(), 0);
}

#[test]
fn test_truncate_is_visible_locally() {
    let fx = Fixture::new();
    fx.write("log", b"some log contents");
    let path = Path::new("/log");

    fx.fs.truncate(path, 4).unwrap();
    assert_eq!(std::fs::read(fx.local("log")).unwrap(), b"some");
    assert_eq!(fx.fs.getattr(path).unwrap().size, 4);
}

#[test]
fn test_errors_carry_remote_errno() {
    let fx = Fixture::new();
    fx.write("file", b"x");

    let missing = fx.fs.getattr(Path::new("/missing"));
    assert_eq!(status(&missing), -libc::ENOENT);

    let escape = fx.fs.getattr(Path::new("/../outside"));
    assert_eq!(status(&escape), -libc::EACCES);

    let write = fx.fs.open(Path::new("/file"), libc::O_WRONLY as u16);
    assert_eq!(status(&write), -libc::EROFS);

    let not_dir = fx.fs.readdir(Path::new("/file"), |_| {});
    assert_eq!(status(&not_dir), -libc::ENOTDIR);

    // The connection survives error responses.
    assert!(fx.fs.getattr(Path::new("/file")).is_ok());
}

#[test]
fn test_concurrent_callers_get_their_own_responses() {
    let fx = Fixture::new();
    for i in 0..8 {
        fx.write(&format!("f{}", i), &pattern(10_000 + i * 1000));
    }

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let fs = fx.fs.clone();
            std::thread::spawn(move || {
                let path = format!("/f{}", i);
                for _ in 0..10 {
                    let got = read_all(&fs, Path::new(&path), 4096);
                    assert_eq!(got, pattern(10_000 + i * 1000), "{}", path);
                    let attr = fs.getattr(Path::new(&path)).unwrap();
                    assert_eq!(attr.size as usize, 10_000 + i * 1000);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let stats = fx.fs.multiplexer().stats();
    assert_eq!(stats.sent, stats.received);
    assert_eq!(stats.in_flight, 0);
}

#[test]
fn test_small_in_flight_bound_still_completes() {
    let fx = Fixture::with_config(RpcConfig::new().max_in_flight(2));
    fx.write("f", b"data");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let fs = fx.fs.clone();
            std::thread::spawn(move || {
                let mut ok = 0;
                for _ in 0..50 {
                    match fs.getattr(Path::new("/f")) {
                        Ok(_) => ok += 1,
                        Err(RpcError::Exhausted { .. }) => std::thread::yield_now(),
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
                ok
            })
        })
        .collect();
    let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(total > 0);
    assert_eq!(fx.fs.multiplexer().stats().in_flight, 0);
}

#[test]
fn test_stale_handle_still_reads() {
    let fx = Fixture::new();
    fx.write("file", b"contents");
    let mut buf = [0u8; 8];
    let n = fx
        .fs
        .read(Path::new("/file"), FileHandle(999), 0, &mut buf)
        .unwrap();
    assert_eq!(&buf[..n], b"contents");
}

#[test]
fn test_unix_listener_endpoint() {
    common::init_tracing();
    let data_dir = tempfile::tempdir().unwrap();
    std::fs::write(data_dir.path().join("remote.txt"), b"over a unix socket").unwrap();
    let sock_dir = tempfile::tempdir().unwrap();
    let socket = sock_dir.path().join("fs.sock");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let server = AsyncServer::new(PassthroughFs::new(data_dir.path()));
    let socket_for_server = socket.clone();
    runtime.spawn(async move {
        let _ = server.serve_unix(&socket_for_server).await;
    });

    let deadline = Instant::now() + Duration::from_secs(5);
    while !socket.exists() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }

    let endpoint: Endpoint = format!("unix:{}", socket.display()).parse().unwrap();
    let conn = endpoint.connect(SocketOptions::default()).unwrap();
    let mux = Multiplexer::new(conn).unwrap();
    let fs = RemoteFs::from_mount_point(Arc::clone(&mux), sock_dir.path()).unwrap();

    let got = read_all(&fs, Path::new("/remote.txt"), 5);
    assert_eq!(got, b"over a unix socket");
    assert!(mux.stats().sent > 0);
}

#[test]
fn test_server_shutdown_fails_calls() {
    let fx = Fixture::new();
    fx.write("f", b"x");
    assert!(fx.fs.getattr(Path::new("/f")).is_ok());

    let fs = fx.fs.clone();
    // Dropping the fixture stops the server runtime and closes its socket.
    drop(fx);

    let deadline = Instant::now() + Duration::from_secs(5);
    while !fs.multiplexer().is_closed() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    let err = fs.getattr(Path::new("/f")).unwrap_err();
    assert_eq!(err.errno(), libc::EIO);
}
