//! Tracing subscriber setup shared by both binaries.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// Output always goes to stderr: in stdio mode stdout carries protocol
/// frames. `RUST_LOG` overrides the default `info` level. Colors are used
/// only when stderr is a terminal.
pub fn init() {
    let use_color = atty::is(atty::Stream::Stderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(use_color)
        .with_writer(std::io::stderr)
        .try_init();
}
