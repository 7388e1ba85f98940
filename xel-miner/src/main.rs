use anyhow::Context;
use clap::Parser;

use xel_miner::config::{Args, Config};
use xel_miner::daemon::Daemon;
use xel_miner::tracing::{init_journald_or_stdout, Verbosity};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_journald_or_stdout(Verbosity {
        debug: args.debug,
        protocol: args.protocol,
    });

    let config = Config::try_from(args).context("Invalid configuration")?;
    Daemon::new(config).run().await
}
