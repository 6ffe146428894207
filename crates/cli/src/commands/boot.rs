//! Boot Command

use anyhow::Result;
use clap::Parser;
use hilt_common::{CommandLineClient, ControlPointClient, HarnessConfig, SimulationMode};
use hilt_harness::{
    stop_all, ControllerLauncher, EmulatorLauncher, HarnessContext, ProcessHandle, RegistryEntry,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::output::{print_info, print_list, print_success, print_warning, OutputFormat, TableDisplay};

#[derive(Parser)]
pub struct BootArgs {
    /// Device name; selects the boot directory and names the processes
    pub device: String,

    /// Simulation mode
    #[arg(long, default_value = "recsim")]
    pub mode: SimulationMode,

    /// Emulated device type (defaults to the lower-cased device name)
    #[arg(long)]
    pub emulator_device: Option<String>,

    /// Run the controller under the restart supervisor
    #[arg(long)]
    pub supervised: bool,

    /// Extra macro passed to the controller, as KEY=VALUE
    #[arg(long = "macro", value_parser = parse_macro)]
    pub macros: Vec<(String, String)>,

    /// Directory the boot directory is resolved against
    #[arg(long)]
    pub working_dir: Option<PathBuf>,
}

fn parse_macro(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid macro '{}', expected KEY=VALUE", s))?;
    if key.is_empty() {
        return Err(format!("invalid macro '{}', empty key", s));
    }
    Ok((key.to_string(), value.to_string()))
}

impl TableDisplay for RegistryEntry {
    fn headers() -> Vec<&'static str> {
        vec!["Kind", "Name", "PID", "Port", "Log"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.kind.to_string(),
            self.name.clone(),
            self.pid.to_string(),
            self.port.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            self.log_path.display().to_string(),
        ]
    }
}

pub fn execute(args: BootArgs, config: HarnessConfig, format: OutputFormat) -> Result<()> {
    let client: Arc<dyn ControlPointClient> = Arc::new(CommandLineClient::new(config.client.clone()));
    let mut ctx = HarnessContext::new(config.clone())?;
    info!("Booting {} in {} (run directory {})", args.device, args.mode, ctx.run_dir().display());

    let mut emulator = if args.mode.needs_emulator() {
        let device = args
            .emulator_device
            .clone()
            .unwrap_or_else(|| args.device.to_lowercase());
        let mut emulator = EmulatorLauncher::new(&args.device, device, config.emulator.clone());
        emulator.start(&mut ctx)?;
        info!("Emulator for {} listening on port {:?}", args.device, emulator.port());
        Some(emulator)
    } else {
        None
    };

    let mut controller = ControllerLauncher::new(&args.device, args.mode, config.controller.clone(), client)
        .with_macros(args.macros);
    if let Some(emulator) = &emulator {
        controller = controller.for_emulator(emulator);
    }
    if args.supervised {
        controller = controller.supervised();
    }
    if let Some(dir) = args.working_dir {
        controller = controller.with_working_dir(dir);
    }

    if let Err(e) = controller.start(&mut ctx) {
        warn!("Controller {} failed to start: {}", args.device, e);
        if let Some(emulator) = emulator.as_mut() {
            if let Err(stop_err) = emulator.stop(&mut ctx) {
                warn!("Emulator teardown after failed boot: {}", stop_err);
                print_warning(&format!("Failed to stop emulator: {}", stop_err));
            }
        }
        return Err(e.into());
    }

    info!("Controller {} ready", args.device);
    print_success(&format!("{} is up in {}", args.device, args.mode));
    let entries: Vec<RegistryEntry> = ctx
        .emulators
        .entries()
        .chain(ctx.controllers.entries())
        .cloned()
        .collect();
    print_list(&entries, format);

    print_info("Press Enter to stop");
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;

    let mut handles: Vec<&mut dyn ProcessHandle> = Vec::new();
    if let Some(emulator) = emulator.as_mut() {
        handles.push(emulator);
    }
    handles.push(&mut controller);
    shut_down(&mut ctx, &mut handles, &args.device)?;

    print_success(&format!("{} stopped", args.device));
    Ok(())
}

fn shut_down(
    ctx: &mut HarnessContext,
    handles: &mut [&mut dyn ProcessHandle],
    device: &str,
) -> hilt_common::Result<()> {
    info!("Stopping {}", device);
    stop_all(ctx, handles).map_err(|e| {
        warn!("Teardown of {} failed: {}", device, e);
        e
    })
}
