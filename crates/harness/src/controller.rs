//! Controller process management
//!
//! A controller boots from a script in its boot directory, reads the macro
//! file injected by the harness, and announces readiness by printing a
//! marker line. It runs either directly with a piped stdin (so it can be
//! asked to exit) or under a supervisor that restarts it whenever it dies.

use crate::context::HarnessContext;
use crate::emulator::EmulatorLauncher;
use crate::log_volume::LogVolumeCheck;
use crate::process::{capture_output, find_free_port, is_alive, kill_group, reap, spawn_error, ProcessHandle};
use crate::registry::RegistryEntry;
use hilt_common::config::{expand, ControllerConfig};
use hilt_common::{
    ControlPointClient, Error, Eventually, LogTail, ProcessKind, Result, SimulationMode, Value,
    ENV_EMULATOR_PORT, ENV_MACRO_FILE, ENV_SIMULATION_MODE,
};
use std::collections::BTreeMap;
use std::io::Write;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How the controller process is launched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchVariant {
    /// Direct child with a piped stdin
    Plain,
    /// Child of a restart supervisor, in its own process group
    Supervised,
}

pub struct ControllerLauncher {
    name: String,
    mode: SimulationMode,
    config: ControllerConfig,
    client: Arc<dyn ControlPointClient>,
    variant: LaunchVariant,
    macros: BTreeMap<String, String>,
    emulator_port: Option<u16>,
    working_dir: Option<PathBuf>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    tail: Option<LogTail>,
    macro_file: Option<PathBuf>,
    supervisor_port: Option<u16>,
}

impl ControllerLauncher {
    pub fn new(
        name: impl Into<String>,
        mode: SimulationMode,
        config: ControllerConfig,
        client: Arc<dyn ControlPointClient>,
    ) -> Self {
        Self {
            name: name.into(),
            mode,
            config,
            client,
            variant: LaunchVariant::Plain,
            macros: BTreeMap::new(),
            emulator_port: None,
            working_dir: None,
            child: None,
            stdin: None,
            tail: None,
            macro_file: None,
            supervisor_port: None,
        }
    }

    /// Add one macro to the injected macro file
    pub fn with_macro(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.macros.insert(key.into(), value.into());
        self
    }

    pub fn with_macros<I, K, V>(mut self, macros: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.macros
            .extend(macros.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_emulator_port(mut self, port: u16) -> Self {
        self.emulator_port = Some(port);
        self
    }

    /// Point the controller at a started emulator's device port
    pub fn for_emulator(mut self, emulator: &EmulatorLauncher) -> Self {
        if let Some(port) = emulator.port() {
            self.emulator_port = Some(port);
        }
        self
    }

    /// Run under the restart supervisor
    pub fn supervised(mut self) -> Self {
        self.variant = LaunchVariant::Supervised;
        self
    }

    /// Base directory the boot directory template is resolved against
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn mode(&self) -> SimulationMode {
        self.mode
    }

    pub fn variant(&self) -> LaunchVariant {
        self.variant
    }

    pub fn macro_file(&self) -> Option<&Path> {
        self.macro_file.as_deref()
    }

    pub fn supervisor_port(&self) -> Option<u16> {
        self.supervisor_port
    }

    /// Resolved name of the control point that exists while the controller runs
    pub fn alive_point(&self) -> String {
        self.config.alive_point_for(&self.name)
    }

    /// Directory the controller is started in
    pub fn boot_dir(&self) -> PathBuf {
        let dir = PathBuf::from(expand(&self.config.boot_dir, &[("name", self.name.as_str())]));
        match &self.working_dir {
            Some(base) => base.join(dir),
            None => dir,
        }
    }

    /// Macro file contents, one `KEY = "value"` line per macro, sorted by key
    pub fn render_macros(&self) -> String {
        let mut macros = self.macros.clone();
        macros.insert("SIMULATION_MODE".to_string(), self.mode.as_str().to_string());
        if let Some(port) = self.emulator_port {
            macros.insert("EMULATOR_PORT".to_string(), port.to_string());
        }

        macros
            .into_iter()
            .map(|(key, value)| format!("{} = {}\n", key, Value::String(value).encode()))
            .collect()
    }

    fn controller_command_line(&self) -> Vec<String> {
        let vars = [
            ("boot_script", self.config.boot_script.as_str()),
            ("name", self.name.as_str()),
        ];
        self.config.args.iter().map(|a| expand(a, &vars)).collect()
    }

    fn build_command(&mut self, boot_dir: &Path, macro_file: &Path) -> Result<Command> {
        let controller_args = self.controller_command_line();

        let mut cmd = match self.variant {
            LaunchVariant::Plain => {
                let mut cmd = Command::new(&self.config.program);
                cmd.args(&controller_args).stdin(Stdio::piped());
                cmd
            }
            LaunchVariant::Supervised => {
                let port = find_free_port()?.to_string();
                let vars = [("name", self.name.as_str()), ("supervisor_port", port.as_str())];
                let mut cmd = Command::new(&self.config.supervisor_program);
                cmd.args(self.config.supervisor_args.iter().map(|a| expand(a, &vars)))
                    .arg(&self.config.program)
                    .args(&controller_args)
                    .stdin(Stdio::null())
                    .process_group(0);
                self.supervisor_port = port.parse().ok();
                cmd
            }
        };

        cmd.current_dir(boot_dir)
            .env(ENV_SIMULATION_MODE, self.mode.as_str())
            .env(ENV_MACRO_FILE, macro_file);
        if let Some(port) = self.emulator_port {
            cmd.env(ENV_EMULATOR_PORT, port.to_string());
        }
        Ok(cmd)
    }

    fn kill_child(&mut self, mut child: Child) {
        self.stdin = None;
        self.supervisor_port = None;
        let result = match self.variant {
            LaunchVariant::Plain => {
                let _ = child.kill();
                child.wait().map(|_| ()).map_err(Error::from)
            }
            LaunchVariant::Supervised => kill_group(&mut child),
        };
        if let Err(e) = result {
            warn!("Failed to kill controller {}: {}", self.name, e);
        }
    }

    /// Tail over this controller's captured output
    pub fn log_tail_mut(&mut self) -> Result<&mut LogTail> {
        let name = self.name.clone();
        self.tail.as_mut().ok_or(Error::NotFound {
            kind: ProcessKind::Controller.to_string(),
            name,
        })
    }

    /// Wait for the next readiness marker, e.g. after a supervised restart
    pub fn await_ready(&mut self, timeout: Duration) -> Result<()> {
        let marker = self.config.readiness_marker.clone();
        let interval = self.config.marker_poll_interval();
        self.log_tail_mut()?
            .wait_for_marker(&marker, timeout, interval)
            .map(|_| ())
    }

    /// Run `body` under a log-volume check of this controller's output
    pub fn check_log_volume<F>(&mut self, check: &LogVolumeCheck, body: F) -> Result<Vec<String>>
    where
        F: FnOnce() -> Result<()>,
    {
        check.scope(self.log_tail_mut()?, body)
    }

    fn stop_plain(&mut self, mut child: Child) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = writeln!(stdin, "{}", self.config.exit_command) {
                warn!("Could not send exit command to {}: {}", self.name, e);
            }
        }

        let point = self.alive_point();
        let client = &self.client;
        let confirmed = Eventually::new(format!("{} shutdown", self.name))
            .timeout(self.config.stop_timeout())
            .poll_interval(self.config.stop_poll_interval())
            .until(|| {
                Ok(if client.resolves(&point)? {
                    Some(format!("{} still resolves", point))
                } else {
                    None
                })
            });

        match confirmed {
            Ok(()) => {
                if !reap(&mut child, self.config.stop_poll_interval()) {
                    debug!("Controller {} stopped serving but has not exited, killing", self.name);
                    child.kill()?;
                    child.wait()?;
                }
                Ok(())
            }
            Err(Error::AssertionTimeout { .. }) if self.config.force_kill_on_stop_timeout => {
                warn!("Controller {} did not confirm shutdown, killing it", self.name);
                child.kill()?;
                child.wait()?;
                Ok(())
            }
            Err(Error::AssertionTimeout { .. }) => {
                warn!(
                    "Controller {} did not confirm shutdown within {:?}; leaving pid {} running",
                    self.name,
                    self.config.stop_timeout(),
                    child.id()
                );
                Ok(())
            }
            Err(e) => {
                warn!("Cannot confirm shutdown of {}: {}; killing it", self.name, e);
                let _ = child.kill();
                child.wait()?;
                Err(e)
            }
        }
    }
}

impl ProcessHandle for ControllerLauncher {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProcessKind {
        ProcessKind::Controller
    }

    fn start(&mut self, ctx: &mut HarnessContext) -> Result<()> {
        if ctx.controllers.is_registered(&self.name) || self.child.is_some() {
            return Err(Error::AlreadyRunning {
                kind: ProcessKind::Controller.to_string(),
                name: self.name.clone(),
            });
        }

        let boot_dir = self.boot_dir();
        let boot_file = boot_dir.join(&self.config.boot_script);
        if !boot_file.is_file() {
            return Err(Error::MissingBootFile(boot_file));
        }

        let point = self.alive_point();
        if self.client.resolves(&point)? {
            return Err(Error::StaleInstance {
                name: self.name.clone(),
                point,
            });
        }

        info!(
            "Starting controller {} in {} ({:?})",
            self.name, self.mode, self.variant
        );

        let macro_file = ctx.scratch_dir().join(format!("{}.macros", self.name));
        std::fs::write(&macro_file, self.render_macros())?;
        debug!("Wrote macro file {}", macro_file.display());

        let log_path = ctx.log_path(ProcessKind::Controller, &self.name, self.mode);
        let (stdout, stderr) = capture_output(&log_path)?;
        let mut tail = LogTail::open(&log_path);

        let mut cmd = self.build_command(&boot_dir, &macro_file)?;
        cmd.stdout(stdout).stderr(stderr);
        debug!("Controller command: {:?}", cmd);

        let program = match self.variant {
            LaunchVariant::Plain => &self.config.program,
            LaunchVariant::Supervised => &self.config.supervisor_program,
        };
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let err = spawn_error(program, e);
                self.supervisor_port = None;
                return Err(err);
            }
        };
        info!("Controller {} spawned with PID {}", self.name, child.id());
        self.stdin = child.stdin.take();

        if let Err(e) = tail.wait_for_marker(
            &self.config.readiness_marker,
            self.config.startup_timeout(),
            self.config.marker_poll_interval(),
        ) {
            self.kill_child(child);
            return Err(match e {
                Error::MarkerTimeout { waited, .. } => Error::StartupTimeout {
                    name: self.name.clone(),
                    waited,
                },
                other => other,
            });
        }

        let entry = RegistryEntry::new(&self.name, ProcessKind::Controller, child.id(), log_path)
            .with_port(self.supervisor_port);
        if let Err(e) = ctx.controllers.register(entry) {
            self.kill_child(child);
            return Err(e);
        }

        info!("Controller {} is ready", self.name);
        self.tail = Some(tail);
        self.macro_file = Some(macro_file);
        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self, ctx: &mut HarnessContext) -> Result<()> {
        info!("Stopping controller {}", self.name);
        let result = match self.child.take() {
            Some(mut child) => match self.variant {
                LaunchVariant::Plain => self.stop_plain(child),
                LaunchVariant::Supervised => kill_group(&mut child),
            },
            None => Ok(()),
        };

        self.stdin = None;
        self.supervisor_port = None;
        ctx.controllers.unregister(&self.name);
        result
    }

    fn is_running(&mut self) -> bool {
        self.child.as_mut().map(is_alive).unwrap_or(false)
    }
}

impl Drop for ControllerLauncher {
    fn drop(&mut self) {
        if let Some(child) = self.child.take() {
            self.kill_child(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hilt_common::Value;

    struct Offline;

    impl ControlPointClient for Offline {
        fn get(&self, name: &str) -> Result<String> {
            Err(Error::SourceUnavailable(name.to_string()))
        }

        fn set(&self, _name: &str, _value: &Value) -> Result<()> {
            Ok(())
        }
    }

    fn launcher(mode: SimulationMode) -> ControllerLauncher {
        ControllerLauncher::new("TPG300", mode, ControllerConfig::default(), Arc::new(Offline))
    }

    #[test]
    fn test_macro_file_is_sorted_and_includes_mode() {
        let text = launcher(SimulationMode::DevSim)
            .with_macro("ZETA", "last")
            .with_macros([("ALPHA", "first"), ("QUOTE", "say \"hi\"")])
            .with_emulator_port(57001)
            .render_macros();

        assert_eq!(
            text,
            "ALPHA = \"first\"\n\
             EMULATOR_PORT = \"57001\"\n\
             QUOTE = \"say \\\"hi\\\"\"\n\
             SIMULATION_MODE = \"devsim\"\n\
             ZETA = \"last\"\n"
        );
    }

    #[test]
    fn test_recsim_has_no_emulator_port() {
        let text = launcher(SimulationMode::RecSim).render_macros();
        assert_eq!(text, "SIMULATION_MODE = \"recsim\"\n");
    }

    #[test]
    fn test_boot_dir_and_alive_point_templates() {
        let l = launcher(SimulationMode::RecSim).with_working_dir("/opt/ioc");
        assert_eq!(l.boot_dir(), PathBuf::from("/opt/ioc/iocBoot/TPG300"));
        assert_eq!(l.alive_point(), "TPG300:DISABLE");
        assert_eq!(l.controller_command_line(), vec!["st.cmd"]);
    }

    #[test]
    fn test_missing_boot_file_fails_before_spawn() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut ctx = HarnessContext::in_dir(Default::default(), tmp.path().join("run")).unwrap();
        let mut l = launcher(SimulationMode::RecSim).with_working_dir(tmp.path());

        let err = l.start(&mut ctx).unwrap_err();
        match err {
            Error::MissingBootFile(path) => {
                assert_eq!(path, tmp.path().join("iocBoot/TPG300/st.cmd"))
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(ctx.controllers.is_empty());
        assert!(l.log_tail_mut().is_err());
    }
}
