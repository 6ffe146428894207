//! HILT Common Library
//!
//! Shared types, configuration, and building blocks for the HILT
//! hardware-in-the-loop test harness.

pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod eventually;
pub mod logtail;
pub mod types;

// Re-export commonly used types
pub use client::{CommandLineClient, ControlPointClient};
pub use config::HarnessConfig;
pub use error::{Error, Result};
pub use eventually::Eventually;
pub use logtail::LogTail;
pub use types::*;

/// HILT version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable carrying the simulation mode to the controller
pub const ENV_SIMULATION_MODE: &str = "HILT_SIMULATION_MODE";

/// Environment variable carrying the emulator's device port
pub const ENV_EMULATOR_PORT: &str = "HILT_EMULATOR_PORT";

/// Environment variable pointing at the injected macro file
pub const ENV_MACRO_FILE: &str = "HILT_MACRO_FILE";

/// Default configuration file path
pub fn default_config_path() -> std::path::PathBuf {
    std::path::PathBuf::from("hilt.toml")
}
