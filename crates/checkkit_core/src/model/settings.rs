//! Application settings singleton model.
//!
//! # Invariants
//! - Exactly one settings record exists; it is lazily created on first read.
//! - `encryption_key` mirrors the device key and is managed by core only.

use serde::{Deserialize, Serialize};

/// Settings schema version written into new records.
pub const SETTINGS_VERSION: &str = "1.0.0";

/// Process-wide configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    pub pin_enabled: bool,
    pub pin_hash: Option<String>,
    pub biometric_enabled: bool,
    pub notifications_enabled: bool,
    /// Base64 mirror of the device key.
    pub encryption_key: String,
    /// Unix epoch milliseconds of the last successful export.
    pub last_backup: Option<i64>,
    pub version: String,
}

impl AppSettings {
    /// Defaults used when the singleton is created lazily.
    pub fn defaults(encryption_key: impl Into<String>) -> Self {
        Self {
            pin_enabled: false,
            pin_hash: None,
            biometric_enabled: false,
            notifications_enabled: true,
            encryption_key: encryption_key.into(),
            last_backup: None,
            version: SETTINGS_VERSION.to_string(),
        }
    }
}

/// Partial settings update. PIN/biometric flags are opaque to core.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub pin_enabled: Option<bool>,
    pub pin_hash: Option<Option<String>>,
    pub biometric_enabled: Option<bool>,
    pub notifications_enabled: Option<bool>,
    pub last_backup: Option<Option<i64>>,
}

impl SettingsPatch {
    pub fn merged(&self, settings: &AppSettings) -> AppSettings {
        let mut merged = settings.clone();
        if let Some(value) = self.pin_enabled {
            merged.pin_enabled = value;
        }
        if let Some(value) = &self.pin_hash {
            merged.pin_hash = value.clone();
        }
        if let Some(value) = self.biometric_enabled {
            merged.biometric_enabled = value;
        }
        if let Some(value) = self.notifications_enabled {
            merged.notifications_enabled = value;
        }
        if let Some(value) = self.last_backup {
            merged.last_backup = value;
        }
        merged
    }
}
