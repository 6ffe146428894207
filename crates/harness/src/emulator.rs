//! Emulator process management
//!
//! Launches the hardware simulator on a device port, exposes its backdoor
//! channel, and provides polling assertions over backdoor properties.

use crate::backdoor::BackdoorChannel;
use crate::context::HarnessContext;
use crate::process::{capture_output, find_free_port, spawn_error, terminate, ProcessHandle};
use crate::registry::RegistryEntry;
use hilt_common::config::{expand, AssertionConfig, EmulatorConfig};
use hilt_common::{
    Error, Eventually, LogTail, ProcessKind, Result, SimulationMode, Value,
};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tracing::{debug, error, info};

/// Emulator launcher for one simulated device
pub struct EmulatorLauncher {
    name: String,
    device: String,
    config: EmulatorConfig,
    assertions: AssertionConfig,
    pinned_port: Option<u16>,
    pinned_control_port: Option<u16>,
    port: Option<u16>,
    child: Option<Child>,
    log_path: Option<PathBuf>,
    backdoor: Option<BackdoorChannel>,
}

impl EmulatorLauncher {
    /// Create a launcher; `name` is the registry key, `device` the emulated device
    pub fn new(name: impl Into<String>, device: impl Into<String>, config: EmulatorConfig) -> Self {
        Self {
            name: name.into(),
            device: device.into(),
            config,
            assertions: AssertionConfig::default(),
            pinned_port: None,
            pinned_control_port: None,
            port: None,
            child: None,
            log_path: None,
            backdoor: None,
        }
    }

    /// Use a fixed device port instead of a free one
    pub fn with_port(mut self, port: u16) -> Self {
        self.pinned_port = Some(port);
        self
    }

    /// Use a fixed backdoor control port instead of a free one
    pub fn with_control_port(mut self, port: u16) -> Self {
        self.pinned_control_port = Some(port);
        self
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Device port the controller should connect to, once started
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn control_port(&self) -> Option<u16> {
        self.backdoor.as_ref().map(BackdoorChannel::control_port)
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Backdoor channel of the running emulator
    pub fn backdoor(&self) -> Result<&BackdoorChannel> {
        self.backdoor.as_ref().ok_or_else(|| Error::NotFound {
            kind: ProcessKind::Emulator.to_string(),
            name: self.name.clone(),
        })
    }

    fn build_args(&self, port: u16, control_port: u16) -> Vec<String> {
        let port = port.to_string();
        let control_port = control_port.to_string();
        let vars = [
            ("device", self.device.as_str()),
            ("port", port.as_str()),
            ("control_port", control_port.as_str()),
        ];
        self.config.args.iter().map(|a| expand(a, &vars)).collect()
    }

    pub fn get(&self, property: &str) -> Result<String> {
        self.backdoor()?.get(property)
    }

    pub fn set(&self, property: &str, value: impl Into<Value>) -> Result<()> {
        self.backdoor()?.set(property, &value.into())
    }

    pub fn call(&self, function: &str, args: &[Value]) -> Result<String> {
        self.backdoor()?.call(function, args)
    }

    pub fn disconnect(&self) -> Result<()> {
        self.backdoor()?.disconnect()
    }

    pub fn reconnect(&self) -> Result<()> {
        self.backdoor()?.reconnect()
    }

    /// Disconnect the link until the returned guard is closed or dropped
    pub fn disconnected(&self) -> Result<DisconnectedLink<'_>> {
        let channel = self.backdoor()?;
        channel.disconnect()?;
        Ok(DisconnectedLink {
            channel,
            reconnected: false,
        })
    }

    fn eventually(&self, property: &str, timeout: Duration) -> Eventually {
        Eventually::new(format!("{}.{}", self.name, property))
            .timeout(timeout)
            .poll_interval(self.assertions.poll_interval())
    }

    /// Poll until `cast(get(property)) == expected`
    pub fn assert_value_is<T, F>(
        &self,
        property: &str,
        expected: T,
        timeout: Duration,
        cast: F,
    ) -> Result<()>
    where
        T: PartialEq + Debug,
        F: Fn(&str) -> Option<T>,
    {
        self.eventually(property, timeout).until(|| {
            let raw = self.get(property)?;
            Ok(match cast(&raw) {
                Some(value) if value == expected => None,
                Some(value) => Some(format!("expected {:?}, got {:?}", expected, value)),
                None => Some(format!("could not interpret raw value '{}'", raw)),
            })
        })
    }

    /// Poll until `predicate` holds for the raw value of `property`
    pub fn assert_value_satisfies<F>(
        &self,
        property: &str,
        predicate: F,
        timeout: Duration,
        message: &str,
    ) -> Result<()>
    where
        F: Fn(&str) -> bool,
    {
        self.eventually(property, timeout).until(|| {
            let raw = self.get(property)?;
            Ok(if predicate(&raw) {
                None
            } else {
                Some(format!("{} (last value '{}')", message, raw))
            })
        })
    }

    /// Poll until the numeric value of `property` is at least `minimum`
    pub fn assert_value_at_least(&self, property: &str, minimum: f64, timeout: Duration) -> Result<()> {
        self.eventually(property, timeout).until(|| {
            let raw = self.get(property)?;
            Ok(match raw.trim().parse::<f64>() {
                Ok(v) if v >= minimum => None,
                Ok(v) => Some(format!("expected at least {}, got {}", minimum, v)),
                Err(_) => Some(format!("expected a number, got '{}'", raw)),
            })
        })
    }
}

impl ProcessHandle for EmulatorLauncher {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProcessKind {
        ProcessKind::Emulator
    }

    fn start(&mut self, ctx: &mut HarnessContext) -> Result<()> {
        if ctx.emulators.is_registered(&self.name) || self.child.is_some() {
            return Err(Error::AlreadyRunning {
                kind: ProcessKind::Emulator.to_string(),
                name: self.name.clone(),
            });
        }

        info!("Starting emulator {} ({})", self.name, self.device);
        self.assertions = ctx.config().assertions.clone();

        let port = match self.pinned_port {
            Some(p) => p,
            None => find_free_port()?,
        };
        let control_port = match self.pinned_control_port {
            Some(p) => p,
            None => find_free_port()?,
        };

        let log_path = ctx.log_path(ProcessKind::Emulator, &self.name, SimulationMode::DevSim);
        let (stdout, stderr) = capture_output(&log_path)?;
        let args = self.build_args(port, control_port);
        debug!("Emulator command: {} {}", self.config.program, args.join(" "));

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&args).stdin(Stdio::null()).stdout(stdout).stderr(stderr);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        let mut child = cmd
            .spawn()
            .map_err(|e| spawn_error(&self.config.program, e))?;

        info!("Emulator {} started with PID {} on port {}", self.name, child.id(), port);

        if let Some(marker) = &self.config.startup_marker {
            let mut tail = LogTail::open(&log_path);
            let waited = tail.wait_for_marker(marker, self.config.startup_timeout(), Duration::from_millis(200));
            if let Err(e) = waited {
                let _ = child.kill();
                let _ = child.wait();
                return Err(match e {
                    Error::MarkerTimeout { waited, .. } => Error::StartupTimeout {
                        name: self.name.clone(),
                        waited,
                    },
                    other => other,
                });
            }
        }

        let entry = RegistryEntry::new(&self.name, ProcessKind::Emulator, child.id(), log_path.clone())
            .with_port(Some(port));
        if let Err(e) = ctx.emulators.register(entry) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }

        self.port = Some(port);
        self.log_path = Some(log_path);
        self.backdoor = Some(BackdoorChannel::new(self.config.backdoor.clone(), control_port));
        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self, ctx: &mut HarnessContext) -> Result<()> {
        info!("Stopping emulator {}", self.name);
        let result = match self.child.take() {
            Some(mut child) => terminate(&mut child, self.config.stop_grace()),
            None => Ok(()),
        };

        self.backdoor = None;
        self.port = None;
        ctx.emulators.unregister(&self.name);
        result
    }

    fn is_running(&mut self) -> bool {
        self.child
            .as_mut()
            .map(crate::process::is_alive)
            .unwrap_or(false)
    }
}

impl Drop for EmulatorLauncher {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Keeps the emulator link down; reconnects on [`close`](Self::close) or drop
pub struct DisconnectedLink<'a> {
    channel: &'a BackdoorChannel,
    reconnected: bool,
}

impl DisconnectedLink<'_> {
    /// Reconnect now and report the outcome
    pub fn close(mut self) -> Result<()> {
        self.reconnected = true;
        self.channel.reconnect()
    }
}

impl Drop for DisconnectedLink<'_> {
    fn drop(&mut self) {
        if !self.reconnected {
            if let Err(e) = self.channel.reconnect() {
                error!("Failed to reconnect emulator link: {}", e);
            }
        }
    }
}
