use anyhow::{Context, Result};
use clap::Parser;
use hyperfuse::cli::MountArgs;
use hyperfuse::client::{mount, MountConfig};
use std::time::Duration;
use tracing::{error, info};

fn main() -> Result<()> {
    let args = MountArgs::parse();
    hyperfuse::logging::init();

    let result = run(args);
    if let Err(e) = &result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
    result
}

fn run(args: MountArgs) -> Result<()> {
    let mount_point = args
        .mount_point
        .canonicalize()
        .with_context(|| format!("mount point {} does not exist", args.mount_point.display()))?;

    let config = MountConfig::new()
        .rpc(args.rpc_config())
        .attr_ttl(Duration::from_secs(args.attr_ttl_secs))
        .allow_other(args.allow_other)
        .unmount_stale(!args.no_unmount_stale)
        .read_only(args.read_only)
        .write_timeout(args.call_timeout());

    info!(
        mount_point = %mount_point.display(),
        endpoint = %args.target,
        max_in_flight = args.max_in_flight,
        "starting hyperfused"
    );
    mount(&args.target, &mount_point, config)
}
