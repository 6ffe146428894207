//! Core types for HILT

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the controller talks to its device during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SimulationMode {
    /// Records are simulated inside the controller; no emulator is started
    #[default]
    RecSim,
    /// The controller talks to an emulator over the network
    DevSim,
}

impl SimulationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimulationMode::RecSim => "recsim",
            SimulationMode::DevSim => "devsim",
        }
    }

    /// Whether this mode needs an emulator process
    pub fn needs_emulator(&self) -> bool {
        matches!(self, SimulationMode::DevSim)
    }
}

impl fmt::Display for SimulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimulationMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "recsim" => Ok(SimulationMode::RecSim),
            "devsim" => Ok(SimulationMode::DevSim),
            other => Err(crate::Error::InvalidConfig(format!(
                "Unknown simulation mode: {}",
                other
            ))),
        }
    }
}

/// Kind of process managed by the harness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    Controller,
    Emulator,
}

impl ProcessKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessKind::Controller => "controller",
            ProcessKind::Emulator => "emulator",
        }
    }
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value sent to an emulator backdoor or written to a control point.
///
/// Strings are quoted on the wire so the remote side never mistakes them for
/// numeric literals; numbers go out raw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    String(String),
    Integer(i64),
    Number(f64),
    Bool(bool),
}

impl Value {
    /// Encode for the backdoor command line
    pub fn encode(&self) -> String {
        match self {
            Value::String(s) => {
                let mut out = String::with_capacity(s.len() + 2);
                out.push('"');
                for c in s.chars() {
                    match c {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        c => out.push(c),
                    }
                }
                out.push('"');
                out
            }
            Value::Integer(i) => i.to_string(),
            // keep whole floats distinguishable from integers
            Value::Number(n) if n.is_finite() && n.fract() == 0.0 => format!("{:.1}", n),
            Value::Number(n) => n.to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
        }
    }

    /// Parse operator input: integers, then floats, then booleans, else a string
    pub fn infer(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            return Value::Integer(i);
        }
        if let Ok(n) = raw.parse::<f64>() {
            return Value::Number(n);
        }
        match raw {
            "true" | "True" => Value::Bool(true),
            "false" | "False" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        }
    }
}

/// Unquoted form, as a control-point client would write it
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", if *b { 1 } else { 0 }),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
