//! Per-run harness state
//!
//! A [`HarnessContext`] is created once by the test-run driver and passed by
//! `&mut` to every launcher. It owns the process registries, the per-run log
//! directory, and a scratch directory for injected configuration.

use crate::registry::ProcessRegistry;
use chrono::Local;
use hilt_common::{Eventually, HarnessConfig, ProcessKind, Result, SimulationMode};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{info, warn};
use uuid::Uuid;

pub struct HarnessContext {
    config: HarnessConfig,
    run_dir: PathBuf,
    scratch: TempDir,
    pub controllers: ProcessRegistry,
    pub emulators: ProcessRegistry,
}

impl HarnessContext {
    /// Create a context with a fresh run directory under `config.log_dir`
    pub fn new(config: HarnessConfig) -> Result<Self> {
        let run_id = format!(
            "{}-{}",
            Local::now().format("%Y%m%d-%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let run_dir = config.log_dir.join(run_id);
        Self::in_dir(config, run_dir)
    }

    /// Create a context whose run directory is `run_dir`
    pub fn in_dir(config: HarnessConfig, run_dir: impl Into<PathBuf>) -> Result<Self> {
        let run_dir = run_dir.into();
        std::fs::create_dir_all(&run_dir)?;
        let scratch = tempfile::Builder::new().prefix("hilt-").tempdir()?;
        info!("Run directory: {}", run_dir.display());

        Ok(Self {
            config,
            run_dir,
            scratch,
            controllers: ProcessRegistry::new(ProcessKind::Controller),
            emulators: ProcessRegistry::new(ProcessKind::Emulator),
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Per-run temporary directory, removed when the context is dropped
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Captured-output file for a process
    pub fn log_path(&self, kind: ProcessKind, name: &str, mode: SimulationMode) -> PathBuf {
        self.run_dir.join(format!("{}-{}-{}.log", kind, name, mode))
    }

    pub fn registry(&self, kind: ProcessKind) -> &ProcessRegistry {
        match kind {
            ProcessKind::Controller => &self.controllers,
            ProcessKind::Emulator => &self.emulators,
        }
    }

    pub fn registry_mut(&mut self, kind: ProcessKind) -> &mut ProcessRegistry {
        match kind {
            ProcessKind::Controller => &mut self.controllers,
            ProcessKind::Emulator => &mut self.emulators,
        }
    }

    /// Polling assertion with the configured default timeout and interval
    pub fn eventually(&self, target: impl Into<String>) -> Eventually {
        Eventually::new(target)
            .timeout(self.config.assertions.default_timeout())
            .poll_interval(self.config.assertions.poll_interval())
    }
}

impl Drop for HarnessContext {
    fn drop(&mut self) {
        for registry in [&self.controllers, &self.emulators] {
            for name in registry.names() {
                warn!("{} '{}' still registered at end of run", registry.kind(), name);
            }
        }
    }
}
