//! Bounded log-volume check
//!
//! Runs a piece of test code, waits a settling window, then inspects what a
//! process logged meanwhile. Too many messages, or a required message that
//! never appeared, fails the check with every counted message attached.

use hilt_common::config::LogVolumeConfig;
use hilt_common::{Error, LogTail, Result};
use std::time::Duration;
use tracing::debug;

/// Lines excluded from the count
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoiseFilter {
    /// Chatter from the device link dropping and coming back
    LinkReconnection,
    /// Periodic state persistence messages
    Persistence,
    Substring(String),
}

#[derive(Debug, Clone)]
pub struct LogVolumeCheck {
    max_messages: usize,
    window: Duration,
    required: Vec<String>,
    filters: Vec<NoiseFilter>,
    link_noise: Vec<String>,
    persistence_noise: Vec<String>,
}

impl LogVolumeCheck {
    pub fn new(max_messages: usize) -> Self {
        Self::from_config(max_messages, &LogVolumeConfig::default())
    }

    /// Check using the configured window and noise substrings
    pub fn from_config(max_messages: usize, config: &LogVolumeConfig) -> Self {
        Self {
            max_messages,
            window: config.window(),
            required: Vec::new(),
            filters: Vec::new(),
            link_noise: config.link_noise.clone(),
            persistence_noise: config.persistence_noise.clone(),
        }
    }

    /// Settling time between the body finishing and the log being read
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Fail unless some counted line contains `substring`
    pub fn require(mut self, substring: impl Into<String>) -> Self {
        self.required.push(substring.into());
        self
    }

    pub fn ignore(mut self, filter: NoiseFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Ignore link reconnection and persistence noise
    pub fn ignore_default_noise(self) -> Self {
        self.ignore(NoiseFilter::LinkReconnection)
            .ignore(NoiseFilter::Persistence)
    }

    fn is_noise(&self, line: &str) -> bool {
        self.filters.iter().any(|filter| match filter {
            NoiseFilter::LinkReconnection => self.link_noise.iter().any(|s| line.contains(s.as_str())),
            NoiseFilter::Persistence => self.persistence_noise.iter().any(|s| line.contains(s.as_str())),
            NoiseFilter::Substring(s) => line.contains(s.as_str()),
        })
    }

    /// Lines that count towards the limit
    pub fn filter(&self, lines: &[String]) -> Vec<String> {
        lines
            .iter()
            .filter(|l| !l.trim().is_empty() && !self.is_noise(l))
            .cloned()
            .collect()
    }

    /// Apply the limit and requirements to `lines`, returning the counted lines
    pub fn evaluate(&self, lines: &[String]) -> Result<Vec<String>> {
        let messages = self.filter(lines);
        debug!(
            "Log check: {} of {} lines counted (max {})",
            messages.len(),
            lines.len(),
            self.max_messages
        );

        if messages.len() > self.max_messages {
            return Err(Error::LogVolume {
                reason: format!(
                    "{} messages logged, at most {} allowed",
                    messages.len(),
                    self.max_messages
                ),
                messages,
            });
        }

        if let Some(missing) = self
            .required
            .iter()
            .find(|r| !messages.iter().any(|m| m.contains(r.as_str())))
        {
            return Err(Error::LogVolume {
                reason: format!("no message containing '{}'", missing),
                messages,
            });
        }

        Ok(messages)
    }

    /// Skip existing output, run `body`, wait the window, then evaluate
    /// what was logged since
    pub fn scope<F>(&self, tail: &mut LogTail, body: F) -> Result<Vec<String>>
    where
        F: FnOnce() -> Result<()>,
    {
        tail.flush()?;
        body()?;
        std::thread::sleep(self.window);
        let lines = tail.read()?;
        self.evaluate(&lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lines(text: &[&str]) -> Vec<String> {
        text.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_noise_is_not_counted() {
        let check = LogVolumeCheck::new(5).ignore_default_noise();
        let counted = check
            .evaluate(&lines(&[
                "speed set to 10",
                "speed set to 20",
                "speed set to 30",
                "Connection lost to 127.0.0.1:57001",
                "autosave: wrote 42 records",
            ]))
            .unwrap();
        assert_eq!(counted.len(), 3);
    }

    #[test]
    fn test_too_many_messages_lists_all() {
        let check = LogVolumeCheck::new(5);
        let input = lines(&["m1", "m2", "m3", "m4", "m5", "m6"]);
        match check.evaluate(&input).unwrap_err() {
            Error::LogVolume { messages, reason } => {
                assert_eq!(messages, input);
                assert!(reason.contains("6 messages"), "{}", reason);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_required_message() {
        let check = LogVolumeCheck::new(10).require("calibrated");
        assert!(check.evaluate(&lines(&["booting", "calibrated ok"])).is_ok());
        let err = check.evaluate(&lines(&["booting"])).unwrap_err();
        assert!(err.to_string().contains("'calibrated'"), "{}", err);
    }

    #[test]
    fn test_substring_filter_and_blank_lines() {
        let check = LogVolumeCheck::new(0).ignore(NoiseFilter::Substring("heartbeat".to_string()));
        assert!(check.evaluate(&lines(&["heartbeat 1", "", "  ", "heartbeat 2"])).is_ok());
    }

    #[test]
    fn test_scope_only_sees_output_from_body() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("controller.log");
        std::fs::write(&path, "old 1\nold 2\nold 3\n").unwrap();

        let mut tail = LogTail::open(&path);
        let check = LogVolumeCheck::new(1).window(Duration::from_millis(10));
        let counted = check
            .scope(&mut tail, || {
                let mut f = std::fs::OpenOptions::new().append(true).open(&path)?;
                writeln!(f, "new message")?;
                Ok(())
            })
            .unwrap();
        assert_eq!(counted, vec!["new message".to_string()]);
    }
}
