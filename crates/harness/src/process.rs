//! Process handle trait and spawn/kill helpers shared by the launchers

use crate::context::HarnessContext;
use hilt_common::{Error, ProcessKind, Result};
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use std::fs::File;
use std::path::Path;
use std::process::{Child, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A launchable external process
pub trait ProcessHandle {
    /// Logical device name the process is registered under
    fn name(&self) -> &str;

    fn kind(&self) -> ProcessKind;

    /// Spawn the process and register it in `ctx`
    fn start(&mut self, ctx: &mut HarnessContext) -> Result<()>;

    /// Stop the process; it is unregistered from `ctx` even if stopping fails
    fn stop(&mut self, ctx: &mut HarnessContext) -> Result<()>;

    fn is_running(&mut self) -> bool;
}

/// Stop every handle in reverse start order, returning the first failure
pub fn stop_all(ctx: &mut HarnessContext, handles: &mut [&mut dyn ProcessHandle]) -> Result<()> {
    let mut first_err = None;
    for handle in handles.iter_mut().rev() {
        if let Err(e) = handle.stop(ctx) {
            warn!("Failed to stop {} '{}': {}", handle.kind(), handle.name(), e);
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Find a free port to use
pub fn find_free_port() -> Result<u16> {
    use std::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Fresh capture file for a child's stdout and stderr
pub(crate) fn capture_output(path: &Path) -> Result<(Stdio, Stdio)> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let err = file.try_clone()?;
    Ok((Stdio::from(file), Stdio::from(err)))
}

pub(crate) fn spawn_error(program: &str, e: std::io::Error) -> Error {
    Error::Spawn {
        program: program.to_string(),
        reason: e.to_string(),
    }
}

pub(crate) fn is_alive(child: &mut Child) -> bool {
    matches!(child.try_wait(), Ok(None))
}

/// Wait up to `grace` for the child to exit on its own
pub(crate) fn reap(child: &mut Child, grace: Duration) -> bool {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("Process {} exited with {}", child.id(), status);
                return true;
            }
            Ok(None) if start.elapsed() < grace => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Ok(None) => return false,
            Err(e) => {
                warn!("Failed to poll process {}: {}", child.id(), e);
                return false;
            }
        }
    }
}

/// SIGTERM, wait up to `grace`, then SIGKILL
pub(crate) fn terminate(child: &mut Child, grace: Duration) -> Result<()> {
    let pid = Pid::from_raw(child.id() as i32);
    info!("Stopping process {}", pid);

    if kill(pid, Signal::SIGTERM).is_ok() && reap(child, grace) {
        return Ok(());
    }

    if is_alive(child) {
        info!("Force killing process {}", pid);
        child.kill()?;
    }
    child.wait()?;
    Ok(())
}

/// SIGKILL a child's whole process group and reap the child
pub(crate) fn kill_group(child: &mut Child) -> Result<()> {
    let pgid = Pid::from_raw(child.id() as i32);
    info!("Killing process group {}", pgid);
    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        debug!("killpg({}) failed: {}", pgid, e);
        let _ = child.kill();
    }
    child.wait()?;
    Ok(())
}
