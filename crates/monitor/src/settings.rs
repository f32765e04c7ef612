//! Runtime settings editable through the API
//!
//! Persisted as `settings.json` next to the database so changes survive a
//! restart; keys missing from the file fall back to the static config.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Concurrent session cap, 0 = unlimited
    pub max_connections: u32,
}

/// Partial settings as stored on disk
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_connections: Option<u32>,
}

pub struct SettingsStore {
    path: PathBuf,
    defaults: Settings,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>, defaults: Settings) -> Self {
        Self {
            path: path.into(),
            defaults,
        }
    }

    fn read_stored(&self) -> StoredSettings {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable settings file");
                StoredSettings::default()
            }),
            Err(_) => StoredSettings::default(),
        }
    }

    /// Effective settings
    pub fn load(&self) -> Settings {
        let stored = self.read_stored();
        Settings {
            max_connections: stored
                .max_connections
                .unwrap_or(self.defaults.max_connections),
        }
    }

    pub fn set_max_connections(&self, max_connections: u32) -> Result<Settings> {
        let mut stored = self.read_stored();
        stored.max_connections = Some(max_connections);

        std::fs::write(&self.path, serde_json::to_string(&stored)?)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        Ok(self.load())
    }
}
