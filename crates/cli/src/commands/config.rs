//! Configuration Commands

use anyhow::{bail, Result};
use clap::Subcommand;
use hilt_common::HarnessConfig;
use std::path::{Path, PathBuf};

use crate::output::{print_success, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write a configuration file with every default spelled out
    Init {
        /// Destination (defaults to the global --config path)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

pub fn execute(cmd: ConfigCommands, config_path: &Path, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Init { path, force } => {
            let path = path.unwrap_or_else(|| config_path.to_path_buf());
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            HarnessConfig::default().save(&path)?;
            print_success(&format!("Wrote {}", path.display()));
        }
        ConfigCommands::Show => {
            let config = HarnessConfig::load(config_path)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
                _ => print!("{}", toml::to_string_pretty(&config)?),
            }
        }
    }

    Ok(())
}
