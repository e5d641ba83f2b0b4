//! Address and identity permission table.
//!
//! Consulted at connection-accept time, before any protocol bytes from the
//! peer are processed. Kicking a player appends a deny entry for their
//! address, so a kicked player cannot simply rejoin. The table can be
//! persisted as JSON between sessions.

use std::fs;
use std::io;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Allow,
    Deny,
}

/// A single rule. `pattern` matches either a peer address (exact, or a
/// trailing-`*` prefix wildcard like `"10.1.*"`) or a public-identity
/// string presented at join time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub pattern: String,
    pub decision: Decision,
    /// Operator note, e.g. the name the peer used when it was kicked.
    pub note: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PermissionTable {
    entries: Vec<PermissionEntry>,
}

impl PermissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// First matching entry wins; no match means allow.
    pub fn decide(&self, value: &str) -> Decision {
        for entry in &self.entries {
            if pattern_matches(&entry.pattern, value) {
                return entry.decision;
            }
        }
        Decision::Allow
    }

    pub fn is_banned(&self, addr: &str) -> bool {
        self.decide(addr) == Decision::Deny
    }

    pub fn deny(&mut self, pattern: &str, note: &str) {
        info!("ban list: deny {} ({})", pattern, note);
        self.entries.push(PermissionEntry {
            pattern: pattern.to_string(),
            decision: Decision::Deny,
            note: note.to_string(),
        });
    }

    pub fn allow(&mut self, pattern: &str, note: &str) {
        self.entries.push(PermissionEntry {
            pattern: pattern.to_string(),
            decision: Decision::Allow,
            note: note.to_string(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Loads a table from disk; a missing file yields an empty table.
    pub fn load(path: &Path) -> io::Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, text)
    }
}

fn pattern_matches(pattern: &str, value: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => pattern == value,
    }
}
