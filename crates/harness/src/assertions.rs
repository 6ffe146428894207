//! Polling assertions over control points
//!
//! [`ControlPointAssertions`] is implemented for every
//! [`ControlPointClient`], so any client (or a reference to one) can be
//! asserted against directly:
//!
//! ```ignore
//! client.assert_point_is("TPG300:PRESSURE", "1.5", Duration::from_secs(5))?;
//! ```

use hilt_common::eventually::DEFAULT_POLL_INTERVAL;
use hilt_common::{ControlPointClient, Error, Eventually, Result};
use std::time::{Duration, Instant};

pub trait ControlPointAssertions: ControlPointClient {
    /// Poll until the value of `name` equals `expected`
    fn assert_point_is(&self, name: &str, expected: &str, timeout: Duration) -> Result<()> {
        poll(name, timeout).until(|| {
            let value = self.get(name)?;
            Ok((value != expected).then(|| format!("expected '{}', got '{}'", expected, value)))
        })
    }

    /// Poll until `predicate` holds for the value of `name`
    fn assert_point_satisfies<F>(
        &self,
        name: &str,
        predicate: F,
        timeout: Duration,
        message: &str,
    ) -> Result<()>
    where
        F: Fn(&str) -> bool,
    {
        poll(name, timeout).until(|| {
            let value = self.get(name)?;
            Ok((!predicate(&value)).then(|| format!("{} (last value '{}')", message, value)))
        })
    }

    /// Poll until the numeric value of `name` is at least `minimum`
    fn assert_point_at_least(&self, name: &str, minimum: f64, timeout: Duration) -> Result<()> {
        poll(name, timeout).until(|| {
            let value = self.get(name)?;
            Ok(match value.trim().parse::<f64>() {
                Ok(v) if v >= minimum => None,
                Ok(v) => Some(format!("expected at least {}, got {}", minimum, v)),
                Err(_) => Some(format!("expected a number, got '{}'", value)),
            })
        })
    }

    /// Poll until the value of `name` differs from `unexpected`
    fn assert_point_not(&self, name: &str, unexpected: &str, timeout: Duration) -> Result<()> {
        poll(name, timeout).until(|| {
            let value = self.get(name)?;
            Ok((value == unexpected).then(|| format!("still '{}'", value)))
        })
    }

    /// Poll with a caller-built [`Eventually`] until `predicate` holds for the
    /// value of `name`.
    ///
    /// Use this with [`HarnessContext::eventually`](crate::HarnessContext::eventually)
    /// to honour the configured poll interval and timeout.
    fn assert_point_with<F>(&self, eventually: Eventually, name: &str, predicate: F) -> Result<()>
    where
        F: Fn(&str) -> bool,
    {
        eventually.until(|| {
            let value = self.get(name)?;
            Ok((!predicate(&value)).then(|| format!("last value '{}'", value)))
        })
    }

    /// Check that `predicate` keeps holding for `duration`, failing on the
    /// first violating or unreadable sample
    fn assert_point_remains<F>(&self, name: &str, predicate: F, duration: Duration) -> Result<()>
    where
        F: Fn(&str) -> bool,
    {
        let start = Instant::now();
        loop {
            let value = self.get(name)?;
            if !predicate(&value) {
                return Err(Error::AssertionTimeout {
                    target: name.to_string(),
                    timeout: start.elapsed(),
                    diagnostic: format!("condition broke with value '{}'", value),
                });
            }
            let elapsed = start.elapsed();
            if elapsed >= duration {
                return Ok(());
            }
            std::thread::sleep(DEFAULT_POLL_INTERVAL.min(duration - elapsed));
        }
    }
}

impl<C: ControlPointClient + ?Sized> ControlPointAssertions for C {}

fn poll(name: &str, timeout: Duration) -> Eventually {
    Eventually::new(name)
        .timeout(timeout)
        .poll_interval(DEFAULT_POLL_INTERVAL.min(timeout / 10).max(Duration::from_millis(10)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hilt_common::Value;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    /// Client whose points change after a number of reads
    #[derive(Default)]
    struct ScriptedClient {
        points: RefCell<HashMap<String, String>>,
        reads: Cell<u32>,
        flip_after: u32,
        flipped: (String, String),
    }

    impl ControlPointClient for ScriptedClient {
        fn get(&self, name: &str) -> Result<String> {
            self.reads.set(self.reads.get() + 1);
            if self.reads.get() > self.flip_after && name == self.flipped.0 {
                return Ok(self.flipped.1.clone());
            }
            self.points
                .borrow()
                .get(name)
                .cloned()
                .ok_or_else(|| Error::SourceUnavailable(format!("{} not found", name)))
        }

        fn set(&self, name: &str, value: &Value) -> Result<()> {
            self.points.borrow_mut().insert(name.to_string(), value.to_string());
            Ok(())
        }
    }

    fn client_with(name: &str, value: &str) -> ScriptedClient {
        let client = ScriptedClient {
            flip_after: u32::MAX,
            ..Default::default()
        };
        client.set(name, &Value::from(value)).unwrap();
        client
    }

    #[test]
    fn test_point_is_and_not() {
        let client = client_with("MODE", "REMOTE");
        client.assert_point_is("MODE", "REMOTE", Duration::from_millis(100)).unwrap();
        client.assert_point_not("MODE", "LOCAL", Duration::from_millis(100)).unwrap();

        let err = client
            .assert_point_is("MODE", "LOCAL", Duration::from_millis(50))
            .unwrap_err();
        assert!(err.to_string().contains("expected 'LOCAL', got 'REMOTE'"), "{}", err);
    }

    #[test]
    fn test_point_eventually_changes() {
        let client = ScriptedClient {
            flip_after: 3,
            flipped: ("STATUS".to_string(), "OK".to_string()),
            ..Default::default()
        };
        client.set("STATUS", &Value::from("INVALID")).unwrap();
        client.assert_point_is("STATUS", "OK", Duration::from_secs(2)).unwrap();
        assert!(client.reads.get() > 3);
    }

    #[test]
    fn test_point_at_least() {
        let client = client_with("TEMP", "21.5");
        client.assert_point_at_least("TEMP", 20.0, Duration::from_millis(50)).unwrap();
        let err = client
            .assert_point_at_least("TEMP", 30.0, Duration::from_millis(50))
            .unwrap_err();
        assert!(err.to_string().contains("expected at least 30"), "{}", err);
    }

    #[test]
    fn test_satisfies_reports_message_and_value() {
        let client = client_with("SPEED", "7");
        let err = client
            .assert_point_satisfies("SPEED", |v| v.len() > 3, Duration::from_millis(50), "speed too short")
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("speed too short"), "{}", text);
        assert!(text.contains("'7'"), "{}", text);
    }

    #[test]
    fn test_unreachable_point_is_labelled() {
        let client = client_with("A", "1");
        let err = client
            .assert_point_is("MISSING", "1", Duration::from_millis(50))
            .unwrap_err();
        assert!(err.to_string().contains("never observed a value"), "{}", err);
    }

    #[test]
    fn test_point_with_custom_interval() {
        let client = client_with("MODE", "LOCAL");
        let slow = Eventually::new("MODE")
            .timeout(Duration::from_millis(100))
            .poll_interval(Duration::from_millis(60));
        let err = client.assert_point_with(slow, "MODE", |v| v == "REMOTE").unwrap_err();
        assert!(err.to_string().contains("'LOCAL'"), "{}", err);
        let slow_reads = client.reads.get();
        assert!(slow_reads <= 4, "{} reads", slow_reads);

        client.reads.set(0);
        let _ = client.assert_point_is("MODE", "REMOTE", Duration::from_millis(100));
        assert!(client.reads.get() > slow_reads);

        client.set("MODE", &Value::from("REMOTE")).unwrap();
        let fast = Eventually::new("MODE").timeout(Duration::from_millis(100));
        client.assert_point_with(fast, "MODE", |v| v == "REMOTE").unwrap();
    }

    #[test]
    fn test_point_remains() {
        let client = client_with("ALARM", "NO_ALARM");
        client
            .assert_point_remains("ALARM", |v| v == "NO_ALARM", Duration::from_millis(30))
            .unwrap();

        let flipping = ScriptedClient {
            flip_after: 1,
            flipped: ("ALARM".to_string(), "MAJOR".to_string()),
            ..Default::default()
        };
        flipping.set("ALARM", &Value::from("NO_ALARM")).unwrap();
        let err = flipping
            .assert_point_remains("ALARM", |v| v == "NO_ALARM", Duration::from_secs(5))
            .unwrap_err();
        assert!(err.to_string().contains("MAJOR"), "{}", err);
    }
}
