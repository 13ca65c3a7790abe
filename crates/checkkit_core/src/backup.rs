//! Encrypted, versioned whole-store backup codec.
//!
//! # Responsibility
//! - Serialize routines, instances and settings plus metadata into one
//!   encrypted text blob.
//! - Decrypt, validate and atomically restore such a blob.
//!
//! # Invariants
//! - Import validates the whole payload before touching the store.
//! - A failed import leaves the store exactly as it was.
//! - `import(export())` reproduces the exported routines, instances and
//!   settings field for field, ids included.

use crate::crypto::{CryptoError, EncryptionService, KeyStore};
use crate::model::instance::{validate_value, RoutineInstance};
use crate::model::routine::{Routine, RoutineId};
use crate::model::settings::AppSettings;
use crate::model::{format_date, now_epoch_ms};
use crate::repo::snapshot_repo::{SnapshotRepository, StoreSnapshot};
use crate::repo::RepoError;
use chrono::NaiveDate;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Format tag written into every payload.
pub const BACKUP_FORMAT: &str = "checkkit-backup";

/// Payload schema version produced by this build.
pub const BACKUP_SCHEMA_VERSION: u32 = 1;

/// File extension used for exported blobs.
pub const BACKUP_FILE_EXTENSION: &str = "checkkit";

/// Decrypted backup contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupPayload {
    pub format: String,
    pub schema_version: u32,
    /// Unix epoch milliseconds.
    pub exported_at: i64,
    pub app_version: String,
    pub routines: Vec<Routine>,
    pub instances: Vec<RoutineInstance>,
    pub settings: AppSettings,
}

/// Result of a successful export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedBackup {
    pub blob: String,
    pub exported_at: i64,
}

/// Counts restored by a successful import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub routines: usize,
    pub instances: usize,
}

#[derive(Debug)]
pub enum BackupError {
    /// Blob was produced under another key or is corrupted.
    Decryption(CryptoError),
    /// Blob decrypted but does not hold a usable payload.
    InvalidBackup(String),
    /// Key store or encryption failure unrelated to the blob.
    Crypto(CryptoError),
    Storage(RepoError),
}

impl Display for BackupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decryption(err) => write!(f, "{err}"),
            Self::InvalidBackup(message) => write!(f, "invalid backup: {message}"),
            Self::Crypto(err) => write!(f, "{err}"),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BackupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Decryption(err) | Self::Crypto(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::InvalidBackup(_) => None,
        }
    }
}

impl From<RepoError> for BackupError {
    fn from(value: RepoError) -> Self {
        Self::Storage(value)
    }
}

impl From<CryptoError> for BackupError {
    fn from(value: CryptoError) -> Self {
        match value {
            CryptoError::CannotDecrypt => Self::Decryption(value),
            other => Self::Crypto(other),
        }
    }
}

/// Backup codec over a snapshot repository and the encryption service.
pub struct BackupCodec<'a, S: SnapshotRepository, K: KeyStore> {
    snapshots: S,
    cipher: &'a EncryptionService<K>,
}

impl<'a, S: SnapshotRepository, K: KeyStore> BackupCodec<'a, S, K> {
    pub fn new(snapshots: S, cipher: &'a EncryptionService<K>) -> Self {
        Self { snapshots, cipher }
    }

    /// Snapshots the store and returns it as an encrypted blob.
    ///
    /// `default_settings` seeds the settings record if it was never read.
    pub fn export(&self, default_settings: &AppSettings) -> Result<ExportedBackup, BackupError> {
        let started_at = Instant::now();
        let snapshot = self.snapshots.load_snapshot(default_settings)?;
        let exported_at = now_epoch_ms();
        let payload = BackupPayload {
            format: BACKUP_FORMAT.to_string(),
            schema_version: BACKUP_SCHEMA_VERSION,
            exported_at,
            app_version: crate::core_version().to_string(),
            routines: snapshot.routines,
            instances: snapshot.instances,
            settings: snapshot.settings,
        };

        let json = serde_json::to_vec(&payload)
            .map_err(|err| BackupError::InvalidBackup(format!("cannot serialize payload: {err}")))?;
        let blob = self.cipher.encrypt(&json)?;

        info!(
            "event=backup_export module=backup status=ok routines={} instances={} duration_ms={}",
            payload.routines.len(),
            payload.instances.len(),
            started_at.elapsed().as_millis()
        );
        Ok(ExportedBackup { blob, exported_at })
    }

    /// Replaces the whole store with the contents of `blob`.
    ///
    /// The settings' key mirror is kept pointing at this device's key.
    pub fn import(&self, blob: &str) -> Result<ImportSummary, BackupError> {
        let started_at = Instant::now();
        let mut payload = match decode(self.cipher, blob) {
            Ok(payload) => payload,
            Err(err) => {
                error!(
                    "event=backup_import module=backup status=error error_code={}",
                    import_error_code(&err)
                );
                return Err(err);
            }
        };
        payload.settings.encryption_key = self.cipher.key_mirror()?;

        let summary = ImportSummary {
            routines: payload.routines.len(),
            instances: payload.instances.len(),
        };
        let snapshot = StoreSnapshot {
            routines: payload.routines,
            instances: payload.instances,
            settings: payload.settings,
        };
        if let Err(err) = self.snapshots.replace_all(&snapshot) {
            error!("event=backup_import module=backup status=error error_code=restore_failed");
            return Err(err.into());
        }

        info!(
            "event=backup_import module=backup status=ok routines={} instances={} duration_ms={}",
            summary.routines,
            summary.instances,
            started_at.elapsed().as_millis()
        );
        Ok(summary)
    }
}

/// Decrypts and validates a backup blob without touching any store.
pub fn decode<K: KeyStore>(
    cipher: &EncryptionService<K>,
    blob: &str,
) -> Result<BackupPayload, BackupError> {
    let plaintext = cipher.decrypt(blob)?;
    let payload: BackupPayload = serde_json::from_slice(&plaintext)
        .map_err(|err| BackupError::InvalidBackup(format!("payload does not parse: {err}")))?;
    validate_payload(&payload)?;
    Ok(payload)
}

/// Suggested file name for a backup exported on `date`.
pub fn backup_file_name(date: NaiveDate) -> String {
    format!(
        "checkkit-backup-{}.{BACKUP_FILE_EXTENSION}",
        format_date(date)
    )
}

fn validate_payload(payload: &BackupPayload) -> Result<(), BackupError> {
    if payload.format != BACKUP_FORMAT {
        return Err(BackupError::InvalidBackup(format!(
            "unknown format `{}`",
            payload.format
        )));
    }
    if payload.schema_version == 0 || payload.schema_version > BACKUP_SCHEMA_VERSION {
        return Err(BackupError::InvalidBackup(format!(
            "unsupported schema version {} (supported up to {BACKUP_SCHEMA_VERSION})",
            payload.schema_version
        )));
    }

    let mut routines: HashMap<RoutineId, &Routine> = HashMap::new();
    let mut op_ids = HashSet::new();
    for routine in &payload.routines {
        if let Some(op_id) = routine.create_op_id {
            if !op_ids.insert(op_id) {
                return Err(BackupError::InvalidBackup(format!(
                    "duplicate op id on routine {}",
                    routine.id
                )));
            }
        }
        routine.validate().map_err(|err| {
            BackupError::InvalidBackup(format!("routine {}: {err}", routine.id))
        })?;
        if routines.insert(routine.id, routine).is_some() {
            return Err(BackupError::InvalidBackup(format!(
                "duplicate routine id {}",
                routine.id
            )));
        }
    }

    let mut instance_ids = HashSet::new();
    for instance in &payload.instances {
        if !instance_ids.insert(instance.id) {
            return Err(BackupError::InvalidBackup(format!(
                "duplicate instance id {}",
                instance.id
            )));
        }
        let routine = routines.get(&instance.routine_id).ok_or_else(|| {
            BackupError::InvalidBackup(format!(
                "instance {} references missing routine {}",
                instance.id, instance.routine_id
            ))
        })?;
        validate_value(routine.item_type, instance.value.as_ref()).map_err(|err| {
            BackupError::InvalidBackup(format!("instance {}: {err}", instance.id))
        })?;
    }

    Ok(())
}

fn import_error_code(err: &BackupError) -> &'static str {
    match err {
        BackupError::Decryption(_) => "cannot_decrypt",
        BackupError::InvalidBackup(_) => "invalid_payload",
        BackupError::Crypto(_) => "key_unavailable",
        BackupError::Storage(_) => "storage_failed",
    }
}

#[cfg(test)]
mod tests {
    use super::backup_file_name;
    use chrono::NaiveDate;

    #[test]
    fn file_name_uses_export_day() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 9).unwrap();
        assert_eq!(backup_file_name(date), "checkkit-backup-2024-05-09.checkkit");
    }
}
