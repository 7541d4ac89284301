//! Herald CLI entry point.

use anyhow::Result;
use clap::Parser;
use herald_cli::{Cli, LogLevel, dispatch_command};
use tracing_subscriber::EnvFilter;

fn init_logging(cli: &Cli) {
    let env_level = std::env::var("HERALD_LOG_LEVEL").ok();
    let level = LogLevel::resolve(cli.log_level, cli.verbose, env_level.as_deref());

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = level.as_filter_str();
        EnvFilter::new(format!(
            "warn,herald_cli={level},herald_monitor={level},herald_slack={level},herald_ratelimits={level}"
        ))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);
    dispatch_command(cli).await
}
