//! Sync and application settings

use crate::error::SyncError;
use box_graph::{EditingConfig, GraphConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Channel name used when none is configured
pub const DEFAULT_CHANNEL: &str = "box-graph-sync";

/// Synchronization behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Messenger channel carrying sync traffic
    pub channel: String,
    /// Send a checksum every this many committed batches; 0 disables
    pub checksum_interval: u32,
    /// Compare received checksums against the replica
    pub verify_on_checksum: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            checksum_interval: 16,
            verify_on_checksum: true,
        }
    }
}

impl SyncConfig {
    /// Parse a bare `SyncConfig` TOML document
    ///
    /// # Errors
    /// Returns [`SyncError::Config`] on malformed input
    pub fn from_toml_str(text: &str) -> Result<Self, SyncError> {
        Ok(toml::from_str(text)?)
    }
}

/// Everything a `[graph]`/`[editing]`/`[sync]` settings file can hold
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub graph: GraphConfig,
    pub editing: EditingConfig,
    pub sync: SyncConfig,
}

impl Settings {
    /// Parse a settings document; missing tables take their defaults
    ///
    /// # Errors
    /// Returns [`SyncError::Config`] on malformed input
    pub fn from_toml_str(text: &str) -> Result<Self, SyncError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a settings file
    ///
    /// # Errors
    /// Returns [`SyncError::Io`] when the file cannot be read
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let settings = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.as_ref().display(), "settings loaded");
        Ok(settings)
    }
}
