//! Emulator backdoor command channel
//!
//! The backdoor bypasses the device protocol the controller uses and pokes
//! the emulator's internal state directly. Every call is an independent
//! invocation of the configured control program:
//!
//! ```text
//! <program> <args...> <target> <property-or-function> [encoded values...]
//! ```
//!
//! Nothing is cached; each get/set is a fresh round trip.

use hilt_common::command::{display_command, run_bounded, CompletionPolls};
use hilt_common::config::{expand, BackdoorConfig};
use hilt_common::{Error, Result, Value};
use tracing::{debug, info};

/// Side channel into one emulator instance
#[derive(Debug, Clone)]
pub struct BackdoorChannel {
    config: BackdoorConfig,
    control_port: u16,
}

impl BackdoorChannel {
    pub fn new(config: BackdoorConfig, control_port: u16) -> Self {
        Self {
            config,
            control_port,
        }
    }

    pub fn control_port(&self) -> u16 {
        self.control_port
    }

    fn polls(&self) -> CompletionPolls {
        CompletionPolls::new(
            self.config.completion_polls,
            self.config.completion_poll_interval(),
        )
    }

    /// Full argument vector for one invocation
    pub fn command_args(&self, target: &str, member: &str, values: &[Value]) -> Vec<String> {
        let port = self.control_port.to_string();
        let mut args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|a| expand(a, &[("control_port", port.as_str())]))
            .collect();
        args.push(target.to_string());
        args.push(member.to_string());
        args.extend(values.iter().map(Value::encode));
        args
    }

    fn invoke(&self, target: &str, member: &str, values: &[Value]) -> Result<String> {
        let args = self.command_args(target, member, values);
        let out = run_bounded(&self.config.program, &args, self.polls())?;

        if !out.success() {
            return Err(Error::Backdoor {
                command: display_command(&self.config.program, &args),
                status: out.status_label(),
                stderr: out.stderr,
            });
        }
        Ok(out.stdout)
    }

    /// Raw text of a device property
    pub fn get(&self, property: &str) -> Result<String> {
        let value = self.invoke(&self.config.device_target, property, &[])?;
        debug!("backdoor get {} -> {}", property, value);
        Ok(value)
    }

    /// Set a device property
    pub fn set(&self, property: &str, value: &Value) -> Result<()> {
        debug!("backdoor set {} = {}", property, value.encode());
        self.invoke(&self.config.device_target, property, std::slice::from_ref(value))?;
        Ok(())
    }

    /// Call a device function, returning its raw output
    pub fn call(&self, function: &str, args: &[Value]) -> Result<String> {
        debug!("backdoor call {}({} args)", function, args.len());
        self.invoke(&self.config.device_target, function, args)
    }

    /// Drop the simulated link between emulator and controller
    pub fn disconnect(&self) -> Result<()> {
        info!("Disconnecting emulator link (control port {})", self.control_port);
        self.invoke(&self.config.link_target, &self.config.disconnect_function, &[])?;
        Ok(())
    }

    /// Restore the simulated link
    pub fn reconnect(&self) -> Result<()> {
        info!("Reconnecting emulator link (control port {})", self.control_port);
        self.invoke(&self.config.link_target, &self.config.connect_function, &[])?;
        Ok(())
    }
}
