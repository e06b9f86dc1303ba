mod args;
mod output;
mod runner;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use args::{Cli, Commands};
use runner::run_scan;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(log_level(&cli));

    match cli.command {
        Commands::Scan(args) => run_scan(args).await?,
    }

    Ok(())
}

fn log_level(cli: &Cli) -> &'static str {
    if cli.trace || cli.verbose >= 2 {
        "trace"
    } else if cli.debug || cli.verbose == 1 {
        "debug"
    } else {
        "info"
    }
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt().with_env_filter(filter).compact().init();
}
