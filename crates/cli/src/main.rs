//! HILT CLI - Main Entry Point
//!
//! Boots controllers and emulators by hand, pokes emulators through their
//! backdoor, and manages the harness configuration file.

use clap::{Parser, Subcommand};
use hilt_common::HarnessConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{backdoor, boot, config, marker};

/// HILT - Hardware-in-the-Loop Test Harness
#[derive(Parser)]
#[command(name = "hilt")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "HILT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a controller (and its emulator in devsim) until Enter is pressed
    Boot(boot::BootArgs),

    /// Send one command to a running emulator's backdoor
    Backdoor(backdoor::BackdoorArgs),

    /// Wait for a line containing a marker to appear in a file
    WaitMarker(marker::WaitMarkerArgs),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(config::ConfigCommands),

    /// Show version information
    Version,
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.unwrap_or_else(hilt_common::default_config_path);

    match cli.command {
        Commands::Boot(args) => {
            let config = HarnessConfig::load(&config_path)?;
            boot::execute(args, config, cli.format)?
        }
        Commands::Backdoor(args) => {
            let config = HarnessConfig::load(&config_path)?;
            backdoor::execute(args, &config, cli.format)?
        }
        Commands::WaitMarker(args) => marker::execute(args, cli.format)?,
        Commands::Config(cmd) => config::execute(cmd, &config_path, cli.format)?,
        Commands::Version => {
            println!("HILT CLI v{}", hilt_common::VERSION);
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    if let Err(e) = run(cli) {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
