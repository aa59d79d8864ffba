//! Roroshetta runner.
//!
//! Run with: `cargo run -p roroshetta-service -- run`

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use roroshetta_service::{Config, OutputFormat, Runner, default_config_path, logging};
use roroshetta_types::frame;

/// Poll Roroshetta Sense range hoods over Bluetooth LE.
#[derive(Parser, Debug)]
#[command(name = "roroshetta")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bluetooth adapter index (overrides config).
    #[arg(short, long, global = true)]
    adapter: Option<usize>,

    /// Seconds between polling rounds (overrides config).
    #[arg(short, long, global = true)]
    interval: Option<u64>,

    /// Output format (overrides config).
    #[arg(short, long, global = true, value_enum)]
    format: Option<OutputFormat>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll devices in the foreground (default behavior).
    Run,

    /// Load and validate the configuration, then exit.
    CheckConfig,

    /// Decode a telemetry frame given as hex and print the reading.
    Decode {
        /// Frame bytes, e.g. "0a 08 ..." or "0a08...".
        hex: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(logging::env_filter(rust_log.as_deref()))
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;

    match args.command {
        Some(Command::CheckConfig) => {
            let path = args.config.clone().unwrap_or_else(default_config_path);
            check_config(&config, &path)
        }
        Some(Command::Decode { ref hex }) => decode(hex, config.output.format),
        Some(Command::Run) | None => Runner::new(config).run().await.map_err(Into::into),
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    if let Some(adapter) = args.adapter {
        config.bluetooth.adapter = adapter;
    }
    if let Some(interval) = args.interval {
        config.polling.interval = interval;
    }
    if let Some(format) = args.format {
        config.output.format = format;
    }

    Ok(config)
}

fn check_config(config: &Config, path: &Path) -> anyhow::Result<()> {
    config.validate()?;
    info!("Configuration OK ({})", path.display());
    println!(
        "{} device(s), polling every {}s, {} attempt(s) per round",
        config.devices.len(),
        config.polling.interval,
        config.polling.max_attempts
    );
    Ok(())
}

fn decode(hex: &str, format: OutputFormat) -> anyhow::Result<()> {
    let bytes = frame::parse_hex(hex).context("invalid hex")?;
    let reading = frame::decode(&bytes).context("invalid frame")?;
    match format {
        OutputFormat::Text => println!("{}", reading),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reading)?),
    }
    Ok(())
}
