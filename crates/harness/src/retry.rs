//! Fixtures, retries and skips for flaky hardware tests
//!
//! These are plain closure combinators, composed inside a test function:
//!
//! ```ignore
//! let attempt = with_fixture(start_processes, run_scenario, stop_processes);
//! let mut test = retrying(RetryPolicy::on_timeouts(2), attempt);
//! test()?;
//! ```

use hilt_common::Error;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tracing::warn;

/// Result of a test that may be skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Skipped(String),
}

/// One attempt: `setup`, then `body`, then `teardown`.
///
/// Teardown runs whenever setup succeeded, also when the body panics; the
/// panic is resumed afterwards. When both body and teardown fail the body's
/// error is returned and the teardown error is logged.
pub fn with_fixture<F, R, E, S, B, T>(
    mut setup: S,
    mut body: B,
    mut teardown: T,
) -> impl FnMut() -> Result<R, E>
where
    E: Display,
    S: FnMut() -> Result<F, E>,
    B: FnMut(&mut F) -> Result<R, E>,
    T: FnMut(F) -> Result<(), E>,
{
    move || {
        let mut fixture = setup()?;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&mut fixture)));
        let cleaned = teardown(fixture);

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(payload) => {
                if let Err(e) = cleaned {
                    warn!("Teardown after a panicking body failed: {}", e);
                }
                panic::resume_unwind(payload);
            }
        };

        match (outcome, cleaned) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(teardown_err)) => {
                warn!("Teardown also failed: {}", teardown_err);
                Err(e)
            }
        }
    }
}

/// When and how often to retry a failed attempt
pub struct RetryPolicy<E> {
    max_retries: u32,
    delay: Duration,
    retry_on: Box<dyn Fn(&E) -> bool>,
}

impl<E> RetryPolicy<E> {
    /// Retry any error up to `max_retries` times
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            delay: Duration::ZERO,
            retry_on: Box::new(|_| true),
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Only retry errors matching `predicate`
    pub fn retry_on(mut self, predicate: impl Fn(&E) -> bool + 'static) -> Self {
        self.retry_on = Box::new(predicate);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn should_retry(&self, error: &E) -> bool {
        (self.retry_on)(error)
    }
}

impl RetryPolicy<Error> {
    /// Retry only errors caused by something not happening in time
    pub fn on_timeouts(max_retries: u32) -> Self {
        Self::new(max_retries).retry_on(|e| {
            matches!(
                e,
                Error::AssertionTimeout { .. }
                    | Error::MarkerTimeout { .. }
                    | Error::StartupTimeout { .. }
                    | Error::CommandTimeout { .. }
            )
        })
    }
}

/// Wrap `attempt` so matching failures are retried per `policy`
pub fn retrying<R, E, A>(policy: RetryPolicy<E>, mut attempt: A) -> impl FnMut() -> Result<R, E>
where
    E: Display,
    A: FnMut() -> Result<R, E>,
{
    move || {
        let mut retries = 0;
        loop {
            match attempt() {
                Ok(value) => return Ok(value),
                Err(e) if retries < policy.max_retries && policy.should_retry(&e) => {
                    retries += 1;
                    warn!(
                        "Attempt failed, retrying ({}/{}): {}",
                        retries, policy.max_retries, e
                    );
                    if !policy.delay.is_zero() {
                        std::thread::sleep(policy.delay);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Skip `test` with `reason` when `condition` holds
pub fn skip_if<E, T>(
    condition: bool,
    reason: impl Into<String>,
    mut test: T,
) -> impl FnMut() -> Result<Outcome, E>
where
    T: FnMut() -> Result<(), E>,
{
    let reason = reason.into();
    move || {
        if condition {
            warn!("Skipped: {}", reason);
            return Ok(Outcome::Skipped(reason.clone()));
        }
        test()?;
        Ok(Outcome::Passed)
    }
}

pub fn skip_unless<E, T>(
    condition: bool,
    reason: impl Into<String>,
    test: T,
) -> impl FnMut() -> Result<Outcome, E>
where
    T: FnMut() -> Result<(), E>,
{
    skip_if(!condition, reason, test)
}
