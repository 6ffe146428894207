//! Eventual-consistency assertions
//!
//! [`Eventually`] repeatedly evaluates a probe until it reports success or
//! the timeout runs out. The probe returns `Ok(None)` when the condition
//! holds and `Ok(Some(diagnostic))` when it does not. On timeout the most
//! recent diagnostic is reported, so a caller can tell "wrong value" apart
//! from "no value".
//!
//! [`Error::SourceUnavailable`] raised by the probe means "try again next
//! poll"; every other error ends the assertion immediately.

use crate::{Error, Result};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Default delay between probe evaluations
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default assertion timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// One polling assertion against a named target
#[derive(Debug, Clone)]
pub struct Eventually {
    target: String,
    timeout: Duration,
    poll_interval: Duration,
}

impl Eventually {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Poll `probe` until it returns `Ok(None)` or the timeout elapses.
    ///
    /// The probe always runs at least once, and once more after the window
    /// closes if the previous poll started inside it.
    pub fn until<F>(&self, mut probe: F) -> Result<()>
    where
        F: FnMut() -> Result<Option<String>>,
    {
        let start = Instant::now();
        let mut last_diagnostic: Option<String> = None;
        let mut last_unavailable: Option<String> = None;
        let mut polls = 0u32;

        loop {
            let last_try = start.elapsed() >= self.timeout;
            polls += 1;

            match probe() {
                Ok(None) => {
                    debug!("{} satisfied after {} polls ({:?})", self.target, polls, start.elapsed());
                    return Ok(());
                }
                Ok(Some(diagnostic)) => {
                    trace!("{} poll {}: {}", self.target, polls, diagnostic);
                    last_diagnostic = Some(diagnostic);
                }
                Err(e) if e.is_transient() => {
                    trace!("{} poll {}: {}", self.target, polls, e);
                    last_unavailable = Some(e.to_string());
                }
                Err(e) => return Err(e),
            }

            if last_try {
                break;
            }

            let remaining = self.timeout.saturating_sub(start.elapsed());
            std::thread::sleep(self.poll_interval.min(remaining));
        }

        let diagnostic = match (last_diagnostic, last_unavailable) {
            (Some(diagnostic), _) => diagnostic,
            (None, Some(unavailable)) => format!("never observed a value: {}", unavailable),
            (None, None) => "condition never held".to_string(),
        };

        Err(Error::AssertionTimeout {
            target: self.target.clone(),
            timeout: self.timeout,
            diagnostic,
        })
    }
}
