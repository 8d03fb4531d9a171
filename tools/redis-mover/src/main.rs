use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use redis_mover::cli::Cli;
use redis_mover::coordinator::{self, RunConfig};
use redis_mover::endpoint::EndpointAddr;

const EXIT_OK: i32 = 0;
const EXIT_FATAL: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    let cli = Cli::parse();

    if let Err(err) = setup_and_run(cli) {
        eprintln!("{err:#}");
        std::process::exit(EXIT_FATAL);
    }
}

/// Fallible setup (logging, runtime) uses `anyhow` for one-shot context,
/// matching `tools/monarch`'s CLI-boundary error handling; the transfer
/// itself reports through `MoverError` and its own exit code below.
fn setup_and_run(cli: Cli) -> anyhow::Result<()> {
    let _guard = common::logging::init(cli.verbose, "REDIS_MOVER_LOG", cli.log_file.as_deref())
        .context("failed to initialize logging")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let exit_code = runtime.block_on(run(cli));
    if exit_code != EXIT_OK {
        std::process::exit(exit_code);
    }
    Ok(())
}

async fn run(cli: Cli) -> i32 {
    let source = match EndpointAddr::parse(&cli.source) {
        Ok(addr) => addr,
        Err(err) => {
            eprintln!("invalid source {:?}: {err}", cli.source);
            return EXIT_USAGE;
        },
    };
    let destination = match EndpointAddr::parse(&cli.destination) {
        Ok(addr) => addr,
        Err(err) => {
            eprintln!("invalid destination {:?}: {err}", cli.destination);
            return EXIT_USAGE;
        },
    };

    let config = RunConfig {
        source,
        destination,
        batch_size: cli.batch.max(1),
        count_limit: cli.count,
        checkers: cli.checkers,
        readers: cli.readers,
        writers: cli.writers,
        track_items: cli.track_items(),
        refresh_interval: cli.refresh_interval(),
    };

    info!(
        batch = config.batch_size,
        checkers = config.checkers,
        readers = config.readers,
        writers = config.writers,
        "starting transfer"
    );

    match coordinator::run(config).await {
        Ok(summary) => {
            println!("{}", summary.final_state.render());
            info!(keys_scanned = summary.keys_scanned, "transfer complete");
            EXIT_OK
        },
        Err(err) => {
            error!(error = %err, "transfer failed");
            EXIT_FATAL
        },
    }
}
