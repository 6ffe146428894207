//! Bounded one-shot command invocation
//!
//! Side-channel tools (backdoor control programs, control-point get/put
//! tools) are run as short-lived child processes. Each run gets a fixed
//! number of completion polls; a run that outlives them is killed rather
//! than left hanging.

use crate::{Error, Result};
use std::ffi::OsStr;
use std::io::{Read, Seek, SeekFrom};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Captured result of a completed invocation
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, or a signal description
    pub fn status_label(&self) -> String {
        match self.status.code() {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Completion budget for one invocation
#[derive(Debug, Clone, Copy)]
pub struct CompletionPolls {
    pub polls: u32,
    pub interval: Duration,
}

impl CompletionPolls {
    pub fn new(polls: u32, interval: Duration) -> Self {
        Self { polls, interval }
    }

    /// Total time the budget allows
    pub fn budget(&self) -> Duration {
        self.interval * self.polls
    }
}

/// Render a program and its arguments for log and error messages
pub fn display_command<S: AsRef<OsStr>>(program: &str, args: &[S]) -> String {
    let mut out = program.to_string();
    for arg in args {
        out.push(' ');
        out.push_str(&arg.as_ref().to_string_lossy());
    }
    out
}

/// Run `program args...` to completion within `polls`.
///
/// Output is captured to anonymous temp files so a chatty child never blocks
/// on a full pipe while we are polling for its exit.
pub fn run_bounded<S: AsRef<OsStr>>(
    program: &str,
    args: &[S],
    polls: CompletionPolls,
) -> Result<CommandOutput> {
    let rendered = display_command(program, args);
    debug!("Running: {}", rendered);

    let mut stdout_file = tempfile::tempfile()?;
    let mut stderr_file = tempfile::tempfile()?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_file.try_clone()?))
        .stderr(Stdio::from(stderr_file.try_clone()?))
        .spawn()
        .map_err(|e| Error::Spawn {
            program: program.to_string(),
            reason: e.to_string(),
        })?;

    let start = Instant::now();
    let mut status = child.try_wait()?;
    let mut remaining = polls.polls;
    while status.is_none() && remaining > 0 {
        std::thread::sleep(polls.interval);
        remaining -= 1;
        status = child.try_wait()?;
        trace!("Poll for `{}`: {:?}", rendered, status);
    }

    let status = match status {
        Some(status) => status,
        None => {
            warn!("`{}` did not complete after {:?}, killing it", rendered, start.elapsed());
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::CommandTimeout {
                command: rendered,
                waited: start.elapsed(),
            });
        }
    };

    Ok(CommandOutput {
        status,
        stdout: read_back(&mut stdout_file)?,
        stderr: read_back(&mut stderr_file)?,
    })
}

fn read_back(file: &mut std::fs::File) -> Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).trim_end_matches(&['\r', '\n'][..]).to_string())
}
