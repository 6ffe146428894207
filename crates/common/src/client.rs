//! Control-point client interface
//!
//! The harness never speaks the record-bus protocol itself. It reads and
//! writes control points through [`ControlPointClient`]; a client signals an
//! unreachable point with [`Error::SourceUnavailable`] so polling assertions
//! can ride out a controller that is briefly offline.

use crate::command::{run_bounded, CompletionPolls};
use crate::config::ClientConfig;
use crate::eventually::Eventually;
use crate::types::Value;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Read/write access to named control points
pub trait ControlPointClient {
    /// Current raw value of `name`
    fn get(&self, name: &str) -> Result<String>;

    /// Write `value` to `name`
    fn set(&self, name: &str, value: &Value) -> Result<()>;

    /// Block until `predicate` holds for the value of `name`
    fn wait_until(
        &self,
        name: &str,
        predicate: &dyn Fn(&str) -> bool,
        timeout: Duration,
    ) -> Result<()> {
        Eventually::new(name).timeout(timeout).until(|| {
            let value = self.get(name)?;
            if predicate(&value) {
                Ok(None)
            } else {
                Ok(Some(format!("{} is '{}'", name, value)))
            }
        })
    }

    /// Whether `name` currently resolves.
    ///
    /// Only [`Error::SourceUnavailable`] means "does not resolve"; any other
    /// failure says nothing about the point and is returned.
    fn resolves(&self, name: &str) -> Result<bool> {
        match self.get(name) {
            Ok(_) => Ok(true),
            Err(Error::SourceUnavailable(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl<C: ControlPointClient + ?Sized> ControlPointClient for &C {
    fn get(&self, name: &str) -> Result<String> {
        (**self).get(name)
    }

    fn set(&self, name: &str, value: &Value) -> Result<()> {
        (**self).set(name, value)
    }
}

impl<C: ControlPointClient + ?Sized> ControlPointClient for Box<C> {
    fn get(&self, name: &str) -> Result<String> {
        (**self).get(name)
    }

    fn set(&self, name: &str, value: &Value) -> Result<()> {
        (**self).set(name, value)
    }
}

impl<C: ControlPointClient + ?Sized> ControlPointClient for Arc<C> {
    fn get(&self, name: &str) -> Result<String> {
        (**self).get(name)
    }

    fn set(&self, name: &str, value: &Value) -> Result<()> {
        (**self).set(name, value)
    }
}

/// Client backed by external get/put command-line tools
#[derive(Debug, Clone)]
pub struct CommandLineClient {
    config: ClientConfig,
    polls: CompletionPolls,
}

impl CommandLineClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            polls: CompletionPolls::new(20, Duration::from_millis(100)),
        }
    }

    pub fn with_polls(mut self, polls: CompletionPolls) -> Self {
        self.polls = polls;
        self
    }
}

impl ControlPointClient for CommandLineClient {
    fn get(&self, name: &str) -> Result<String> {
        let mut args = self.config.get_args.clone();
        args.push(name.to_string());

        let out = match run_bounded(&self.config.get_program, &args, self.polls) {
            Ok(out) => out,
            Err(Error::CommandTimeout { command, .. }) => {
                return Err(Error::SourceUnavailable(format!("{} timed out", command)))
            }
            Err(e) => return Err(e),
        };

        if out.success() {
            Ok(out.stdout.trim().to_string())
        } else {
            debug!("get {} failed: {}", name, out.stderr);
            Err(Error::SourceUnavailable(format!("{}: {}", name, out.stderr)))
        }
    }

    fn set(&self, name: &str, value: &Value) -> Result<()> {
        let mut args = self.config.put_args.clone();
        args.push(name.to_string());
        args.push(value.to_string());

        let out = run_bounded(&self.config.put_program, &args, self.polls)?;
        if out.success() {
            Ok(())
        } else {
            Err(Error::SourceUnavailable(format!("{}: {}", name, out.stderr)))
        }
    }
}
