//! # rf-vault-file
//!
//! File-backed implementation of `SessionVault`: one JSON object on disk,
//! loaded once at open, written through on every mutation. Reads never do
//! I/O after open, keeping session restore synchronous. Write failures are
//! logged and swallowed; durability is best-effort.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rf_core::SessionVault;

pub struct FileVault {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileVault {
    /// Opens the vault at `path`. A missing, unreadable, or corrupt file
    /// yields an empty vault rather than an error.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                log::warn!(
                    "vault file {} is corrupt, starting empty: {err}",
                    path.display()
                );
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, entries: &HashMap<String, String>) {
        match serde_json::to_string_pretty(entries) {
            Ok(raw) => {
                if let Err(err) = std::fs::write(&self.path, raw) {
                    log::warn!("could not write vault file {}: {err}", self.path.display());
                }
            }
            Err(err) => log::warn!("could not serialize vault contents: {err}"),
        }
    }
}

impl SessionVault for FileVault {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.entries();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries();
        if entries.remove(key).is_some() {
            self.persist(&entries);
        }
    }
}

/// In-memory vault for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryVault {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeds a key, for tests that start from a persisted session.
    pub fn preloaded(pairs: &[(&str, &str)]) -> Self {
        let vault = Self::new();
        for (key, value) in pairs {
            vault.set(key, value);
        }
        vault
    }
}

impl SessionVault for MemoryVault {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}
