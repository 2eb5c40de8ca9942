//! Tuning for [`AsyncServer`](super::AsyncServer).
//!
//! Handle-table sizing belongs to the handler
//! ([`PassthroughFs::with_max_open_files`](super::PassthroughFs::with_max_open_files)),
//! not to the connection loop.

use std::time::Duration;

/// Connection-loop and runtime settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Responses that may wait for the writer before handlers back off.
    pub response_channel_size: usize,

    /// Frames written before a forced flush.
    pub write_batch_size: usize,

    /// Idle time after which a partial batch is flushed.
    pub write_batch_timeout: Duration,

    /// Capacity of the buffered socket writer.
    pub write_buffer_size: usize,

    /// Upper bound on tokio blocking threads serving filesystem calls.
    pub max_blocking_threads: usize,

    /// Idle lifetime of a blocking thread.
    pub thread_keep_alive: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            response_channel_size: 1024,
            write_batch_size: 64,
            write_batch_timeout: Duration::from_micros(20),
            write_buffer_size: 256 * 1024,
            max_blocking_threads: 512,
            thread_keep_alive: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn response_channel_size(mut self, size: usize) -> Self {
        self.response_channel_size = size;
        self
    }

    pub fn write_batch_size(mut self, size: usize) -> Self {
        self.write_batch_size = size;
        self
    }

    pub fn write_batch_timeout(mut self, timeout: Duration) -> Self {
        self.write_batch_timeout = timeout;
        self
    }

    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    pub fn max_blocking_threads(mut self, count: usize) -> Self {
        self.max_blocking_threads = count;
        self
    }

    pub fn thread_keep_alive(mut self, duration: Duration) -> Self {
        self.thread_keep_alive = duration;
        self
    }
}
