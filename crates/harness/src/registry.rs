//! Named table of running processes
//!
//! Each [`ProcessRegistry`] tracks one kind of process (controllers or
//! emulators) by logical device name. A name has at most one live entry;
//! registering it twice means a previous instance leaked.

use chrono::{DateTime, Utc};
use hilt_common::{Error, ProcessKind, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Runtime record for a launched process
#[derive(Debug, Clone, Serialize)]
pub struct RegistryEntry {
    pub name: String,
    pub kind: ProcessKind,
    pub pid: u32,
    pub port: Option<u16>,
    pub log_path: PathBuf,
    pub started_at: DateTime<Utc>,
}

impl RegistryEntry {
    pub fn new(name: impl Into<String>, kind: ProcessKind, pid: u32, log_path: PathBuf) -> Self {
        Self {
            name: name.into(),
            kind,
            pid,
            port: None,
            log_path,
            started_at: Utc::now(),
        }
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }
}

/// Registry of live processes of one kind
#[derive(Debug)]
pub struct ProcessRegistry {
    kind: ProcessKind,
    entries: HashMap<String, RegistryEntry>,
}

impl ProcessRegistry {
    pub fn new(kind: ProcessKind) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    pub fn kind(&self) -> ProcessKind {
        self.kind
    }

    /// Add an entry; fails if the name is already live
    pub fn register(&mut self, entry: RegistryEntry) -> Result<()> {
        if self.entries.contains_key(&entry.name) {
            return Err(Error::AlreadyRunning {
                kind: self.kind.to_string(),
                name: entry.name,
            });
        }
        debug!("Registered {} '{}' (pid {})", self.kind, entry.name, entry.pid);
        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    /// Add an entry, replacing any live one under the same name
    pub fn register_replacing(&mut self, entry: RegistryEntry) -> Option<RegistryEntry> {
        let previous = self.entries.insert(entry.name.clone(), entry);
        if let Some(prev) = &previous {
            warn!(
                "Replaced {} '{}' (pid {}); the previous instance was never stopped",
                self.kind, prev.name, prev.pid
            );
        }
        previous
    }

    /// Look up a live entry; `None` means not running
    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Remove an entry. Removing an absent name is a no-op.
    pub fn unregister(&mut self, name: &str) -> Option<RegistryEntry> {
        let removed = self.entries.remove(name);
        if removed.is_some() {
            debug!("Unregistered {} '{}'", self.kind, name);
        }
        removed
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
