//! Error types for HILT

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using HILT Error
pub type Result<T> = std::result::Result<T, Error>;

/// HILT error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Configuration encode error: {0}")]
    ConfigEncode(#[from] toml::ser::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{kind} '{name}' is already running")]
    AlreadyRunning { kind: String, name: String },

    #[error("{kind} '{name}' is not running")]
    NotFound { kind: String, name: String },

    #[error("Required boot file missing: {}", .0.display())]
    MissingBootFile(PathBuf),

    #[error("Stale instance of '{name}' detected: control point {point} already resolves")]
    StaleInstance { name: String, point: String },

    #[error("Failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("{name} did not start within {:.1}s", .waited.as_secs_f64())]
    StartupTimeout { name: String, waited: Duration },

    #[error("Marker '{marker}' not seen in {} after {:.1}s", .path.display(), .waited.as_secs_f64())]
    MarkerTimeout {
        marker: String,
        path: PathBuf,
        waited: Duration,
    },

    #[error("Assertion on {target} failed after {:.1}s: {diagnostic}", .timeout.as_secs_f64())]
    AssertionTimeout {
        target: String,
        timeout: Duration,
        diagnostic: String,
    },

    #[error("Source temporarily unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Backdoor command `{command}` failed ({status}): {stderr}")]
    Backdoor {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Command `{command}` did not complete within {:.1}s", .waited.as_secs_f64())]
    CommandTimeout { command: String, waited: Duration },

    #[error("Log check failed: {reason}\n{}", .messages.join("\n"))]
    LogVolume {
        reason: String,
        messages: Vec<String>,
    },
}

impl Error {
    /// Whether a poll loop may swallow this error and try again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::SourceUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_source_unavailable_is_transient() {
        assert!(Error::SourceUnavailable("offline".to_string()).is_transient());
        assert!(!Error::InvalidConfig("bad".to_string()).is_transient());
        assert!(!Error::CommandTimeout {
            command: "get".to_string(),
            waited: Duration::from_secs(1),
        }
        .is_transient());
    }

    #[test]
    fn test_timeout_messages_name_duration_and_target() {
        let err = Error::StartupTimeout {
            name: "TPG300".to_string(),
            waited: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "TPG300 did not start within 30.0s");

        let err = Error::AssertionTimeout {
            target: "TPG300:PRESSURE".to_string(),
            timeout: Duration::from_millis(2500),
            diagnostic: "expected 5, got 4".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("TPG300:PRESSURE"));
        assert!(msg.contains("2.5s"));
        assert!(msg.contains("expected 5, got 4"));
    }

    #[test]
    fn test_log_volume_lists_messages() {
        let err = Error::LogVolume {
            reason: "3 messages, expected at most 1".to_string(),
            messages: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        };
        assert!(err.to_string().ends_with("a\nb\nc"));
    }
}
