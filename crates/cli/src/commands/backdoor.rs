//! Backdoor Commands

use anyhow::Result;
use clap::{Parser, Subcommand};
use hilt_common::{HarnessConfig, Value};
use hilt_harness::BackdoorChannel;
use serde::Serialize;

use crate::output::{print_item, print_message, OutputFormat, TableDisplay};

#[derive(Parser)]
pub struct BackdoorArgs {
    /// Emulator control port
    #[arg(long)]
    pub control_port: u16,

    #[command(subcommand)]
    pub action: BackdoorAction,
}

#[derive(Subcommand)]
pub enum BackdoorAction {
    /// Read a device property
    Get { property: String },

    /// Set a device property; numbers and True/False are sent raw
    Set { property: String, value: String },

    /// Call a device function
    Call {
        function: String,
        args: Vec<String>,
    },

    /// Drop the device link
    Disconnect,

    /// Restore the device link
    Reconnect,
}

#[derive(Serialize)]
struct Reply {
    member: String,
    value: String,
}

impl TableDisplay for Reply {
    fn headers() -> Vec<&'static str> {
        vec!["Member", "Value"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.member.clone(), self.value.clone()]
    }
}

pub fn execute(args: BackdoorArgs, config: &HarnessConfig, format: OutputFormat) -> Result<()> {
    let channel = BackdoorChannel::new(config.emulator.backdoor.clone(), args.control_port);

    match args.action {
        BackdoorAction::Get { property } => {
            let value = channel.get(&property)?;
            print_item(&Reply { member: property, value }, format);
        }
        BackdoorAction::Set { property, value } => {
            let value = Value::infer(&value);
            channel.set(&property, &value)?;
            print_message(&format!("{} set to {}", property, value.encode()), format);
        }
        BackdoorAction::Call { function, args } => {
            let values: Vec<Value> = args.iter().map(|a| Value::infer(a)).collect();
            let value = channel.call(&function, &values)?;
            print_item(&Reply { member: function, value }, format);
        }
        BackdoorAction::Disconnect => {
            channel.disconnect()?;
            print_message("Device link disconnected", format);
        }
        BackdoorAction::Reconnect => {
            channel.reconnect()?;
            print_message("Device link reconnected", format);
        }
    }

    Ok(())
}
