use anyhow::{Context, Result};
use chatrelay::{Config, Supervisor};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chatrelay")]
#[command(about = "Run a console server and execute slash commands typed in its chat", long_about = None)]
struct Args {
    /// Config file (defaults to the first chatrelay.toml found)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "chatrelay=trace"
    #[arg(long)]
    log_level: Option<String>,

    /// Working directory for the server
    #[arg(long)]
    cwd: Option<String>,

    /// Server executable and arguments, overriding the config
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn init_logging(level: Option<&str>) {
    let filter = level
        .and_then(|l| EnvFilter::try_new(l).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    // stdout carries the server's console
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    config.apply_overrides(&args.command, args.cwd.as_deref());

    let supervisor = Supervisor::launch(&config).context("Could not start the server")?;
    let reason = supervisor.run().await;

    // Relay threads may still be parked on blocking reads
    std::process::exit(reason.exit_code());
}
