use anyhow::{Context, Result};
use clap::Parser;
use hyperfuse::cli::ServeArgs;
use hyperfuse::server::AsyncServer;
use tracing::{error, info};

fn main() -> Result<()> {
    let args = ServeArgs::parse();
    hyperfuse::logging::init();

    let result = run(args);
    if let Err(e) = &result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
    result
}

fn run(args: ServeArgs) -> Result<()> {
    let root = args
        .root
        .canonicalize()
        .with_context(|| format!("cannot serve {}", args.root.display()))?;
    if !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }

    info!(root = %root.display(), listen = %args.listen, "starting hyperfuse-serve");
    let fs = args.filesystem(&root);
    AsyncServer::with_config(fs, args.server_config()).run_blocking(&args.listen)
}
