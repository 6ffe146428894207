//! Harness configuration

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Root under which every run gets its own log directory
    pub log_dir: PathBuf,

    /// Assertion engine defaults
    pub assertions: AssertionConfig,

    /// Controller launch configuration
    pub controller: ControllerConfig,

    /// Emulator launch configuration
    pub emulator: EmulatorConfig,

    /// Bounded log-volume check defaults
    pub log_volume: LogVolumeConfig,

    /// Command-line control-point client
    pub client: ClientConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            assertions: AssertionConfig::default(),
            controller: ControllerConfig::default(),
            emulator: EmulatorConfig::default(),
            log_volume: LogVolumeConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Polling assertion defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssertionConfig {
    pub default_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for AssertionConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 5_000,
            poll_interval_ms: 500,
        }
    }
}

impl AssertionConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Controller-specific configuration
///
/// String fields are templates; see [`expand`] for the placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Controller executable
    pub program: String,

    /// Arguments passed to the controller (`{boot_script}`, `{name}`)
    pub args: Vec<String>,

    /// Directory holding the boot script (`{name}`)
    pub boot_dir: String,

    /// Boot script file name, must exist before spawn
    pub boot_script: String,

    /// Literal the controller prints once boot completes
    pub readiness_marker: String,

    pub startup_timeout_secs: u64,
    pub marker_poll_interval_ms: u64,

    /// Line written to the controller's stdin to request exit
    pub exit_command: String,

    /// Bound on the death-confirmation poll after the exit command
    pub stop_timeout_secs: u64,
    pub stop_poll_interval_ms: u64,

    /// Kill the controller when the death-confirmation poll runs out
    pub force_kill_on_stop_timeout: bool,

    /// Prefix substituted for `{prefix}` in control-point names
    pub point_prefix: String,

    /// Control point every live controller serves (`{prefix}`, `{name}`)
    pub alive_point: String,

    /// Supervisor that restarts the controller when it dies
    pub supervisor_program: String,

    /// Supervisor arguments (`{name}`, `{supervisor_port}`); the controller
    /// command line is appended after these
    pub supervisor_args: Vec<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            program: "ioc".to_string(),
            args: vec!["{boot_script}".to_string()],
            boot_dir: "iocBoot/{name}".to_string(),
            boot_script: "st.cmd".to_string(),
            readiness_marker: "All initialization complete".to_string(),
            startup_timeout_secs: 30,
            marker_poll_interval_ms: 1_000,
            exit_command: "exit".to_string(),
            stop_timeout_secs: 30,
            stop_poll_interval_ms: 1_000,
            force_kill_on_stop_timeout: false,
            point_prefix: String::new(),
            alive_point: "{prefix}{name}:DISABLE".to_string(),
            supervisor_program: "procServ".to_string(),
            supervisor_args: vec![
                "--foreground".to_string(),
                "--quiet".to_string(),
                "--name".to_string(),
                "{name}".to_string(),
                "{supervisor_port}".to_string(),
            ],
        }
    }
}

impl ControllerConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn marker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.marker_poll_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn stop_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stop_poll_interval_ms)
    }

    /// Resolved name of the always-present control point
    pub fn alive_point_for(&self, name: &str) -> String {
        expand(
            &self.alive_point,
            &[("prefix", self.point_prefix.as_str()), ("name", name)],
        )
    }
}

/// Emulator-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Emulator executable
    pub program: String,

    /// Arguments (`{device}`, `{port}`, `{control_port}`)
    pub args: Vec<String>,

    /// Working directory for the emulator process
    pub working_dir: Option<PathBuf>,

    /// When set, start blocks until this text appears in the emulator output
    pub startup_marker: Option<String>,

    pub startup_timeout_secs: u64,

    /// Time between SIGTERM and SIGKILL on stop
    pub stop_grace_ms: u64,

    /// Backdoor command channel
    pub backdoor: BackdoorConfig,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            program: "lewis".to_string(),
            args: vec![
                "-r".to_string(),
                "127.0.0.1:{control_port}".to_string(),
                "-p".to_string(),
                "stream: {bind_address: 127.0.0.1, port: {port}}".to_string(),
                "{device}".to_string(),
            ],
            working_dir: None,
            startup_marker: None,
            startup_timeout_secs: 30,
            stop_grace_ms: 500,
            backdoor: BackdoorConfig::default(),
        }
    }
}

impl EmulatorConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// Backdoor command configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackdoorConfig {
    /// Control program invoked once per backdoor call
    pub program: String,

    /// Leading arguments (`{control_port}`)
    pub args: Vec<String>,

    /// Target object for property get/set and function calls
    pub device_target: String,

    /// Target object for link simulation
    pub link_target: String,

    pub disconnect_function: String,
    pub connect_function: String,

    /// Number of completion polls before the invocation is killed
    pub completion_polls: u32,
    pub completion_poll_interval_ms: u64,
}

impl Default for BackdoorConfig {
    fn default() -> Self {
        Self {
            program: "lewis-control".to_string(),
            args: vec!["-r".to_string(), "127.0.0.1:{control_port}".to_string()],
            device_target: "device".to_string(),
            link_target: "simulation".to_string(),
            disconnect_function: "disconnect_device".to_string(),
            connect_function: "connect_device".to_string(),
            completion_polls: 20,
            completion_poll_interval_ms: 250,
        }
    }
}

impl BackdoorConfig {
    pub fn completion_poll_interval(&self) -> Duration {
        Duration::from_millis(self.completion_poll_interval_ms)
    }
}

/// Bounded log-volume check defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogVolumeConfig {
    /// How long to keep collecting after the scoped action
    pub window_ms: u64,

    /// Substrings identifying link reconnection chatter
    pub link_noise: Vec<String>,

    /// Substrings identifying persistence subsystem chatter
    pub persistence_noise: Vec<String>,
}

impl Default for LogVolumeConfig {
    fn default() -> Self {
        Self {
            window_ms: 5_000,
            link_noise: vec![
                "Connection".to_string(),
                "connection".to_string(),
                "reconnect".to_string(),
                "disconnect".to_string(),
            ],
            persistence_noise: vec![
                "autosave".to_string(),
                "save_restore".to_string(),
            ],
        }
    }
}

impl LogVolumeConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Command-line tools used to reach control points
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub get_program: String,
    pub get_args: Vec<String>,
    pub put_program: String,
    pub put_args: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            get_program: "caget".to_string(),
            get_args: vec!["-t".to_string()],
            put_program: "caput".to_string(),
            put_args: vec!["-t".to_string()],
        }
    }
}

/// Replace `{key}` placeholders in `template`
pub fn expand(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_expand() {
        let out = expand(
            "stream: {bind_address: 127.0.0.1, port: {port}}",
            &[("port", "5025")],
        );
        assert_eq!(out, "stream: {bind_address: 127.0.0.1, port: 5025}");
    }

    #[test]
    fn test_alive_point() {
        let mut config = ControllerConfig::default();
        config.point_prefix = "TE:NDW:".to_string();
        assert_eq!(config.alive_point_for("TPG300_01"), "TE:NDW:TPG300_01:DISABLE");
    }

    #[test]
    fn test_load_missing_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = HarnessConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.assertions.poll_interval_ms, 500);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("hilt.toml");
        std::fs::write(
            &path,
            "log_dir = \"/tmp/runs\"\n[controller]\nreadiness_marker = \"started\"\n",
        )
        .unwrap();
        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.log_dir, PathBuf::from("/tmp/runs"));
        assert_eq!(config.controller.readiness_marker, "started");
        assert_eq!(config.controller.exit_command, "exit");
        assert_eq!(config.emulator.backdoor.program, "lewis-control");
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("hilt.toml");
        let mut config = HarnessConfig::default();
        config.controller.stop_timeout_secs = 3;
        config.save(&path).unwrap();
        let loaded = HarnessConfig::load(&path).unwrap();
        assert_eq!(loaded.controller.stop_timeout_secs, 3);
    }
}
