//! Wait-for-marker Command

use anyhow::Result;
use clap::Parser;
use hilt_common::LogTail;
use std::path::PathBuf;
use std::time::Duration;

use crate::output::{print_message, OutputFormat};

#[derive(Parser)]
pub struct WaitMarkerArgs {
    /// File to watch
    pub file: PathBuf,

    /// Text to wait for
    pub marker: String,

    /// Give up after this many seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Poll interval in milliseconds
    #[arg(long, default_value_t = 500)]
    pub poll_ms: u64,

    /// Ignore what the file already contains
    #[arg(long)]
    pub from_end: bool,
}

pub fn execute(args: WaitMarkerArgs, format: OutputFormat) -> Result<()> {
    let mut tail = if args.from_end {
        LogTail::at_end(&args.file)?
    } else {
        LogTail::open(&args.file)
    };

    let line = tail.wait_for_marker(
        &args.marker,
        Duration::from_secs(args.timeout),
        Duration::from_millis(args.poll_ms),
    )?;
    print_message(&line, format);
    Ok(())
}
