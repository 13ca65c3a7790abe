//! Settings singleton repository.
//!
//! # Invariants
//! - The `settings` table holds at most one row (`id = 1`, enforced by a
//!   CHECK constraint).
//! - Lazy creation uses `INSERT OR IGNORE`, so concurrent first reads agree
//!   on a single record.

use crate::model::settings::AppSettings;
use crate::repo::{bool_to_int, int_to_bool, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const SETTINGS_SELECT_SQL: &str = "SELECT
    pin_enabled,
    pin_hash,
    biometric_enabled,
    notifications_enabled,
    encryption_key,
    last_backup,
    version
FROM settings
WHERE id = 1";

/// Repository interface for the settings singleton.
pub trait SettingsRepository {
    /// Returns the stored record, inserting `defaults` first when absent.
    fn get_or_create(&self, defaults: &AppSettings) -> RepoResult<AppSettings>;
    /// Writes the full record, creating it when absent.
    fn save(&self, settings: &AppSettings) -> RepoResult<()>;
}

/// SQLite-backed settings repository.
pub struct SqliteSettingsRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSettingsRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SettingsRepository for SqliteSettingsRepository<'_> {
    fn get_or_create(&self, defaults: &AppSettings) -> RepoResult<AppSettings> {
        execute_with_settings(
            self.conn,
            "INSERT OR IGNORE INTO settings (
                id,
                pin_enabled,
                pin_hash,
                biometric_enabled,
                notifications_enabled,
                encryption_key,
                last_backup,
                version
            ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            defaults,
        )?;
        match load_settings(self.conn)? {
            Some(settings) => Ok(settings),
            // Row was inserted above; a miss means it was deleted in between.
            None => Ok(defaults.clone()),
        }
    }

    fn save(&self, settings: &AppSettings) -> RepoResult<()> {
        upsert_settings(self.conn, settings)
    }
}

pub(crate) fn load_settings(conn: &Connection) -> RepoResult<Option<AppSettings>> {
    let settings = conn
        .query_row(&format!("{SETTINGS_SELECT_SQL};"), [], |row| Ok(parse_row(row)))
        .optional()?;
    settings.transpose()
}

pub(crate) fn upsert_settings(conn: &Connection, settings: &AppSettings) -> RepoResult<()> {
    execute_with_settings(
        conn,
        "INSERT INTO settings (
            id,
            pin_enabled,
            pin_hash,
            biometric_enabled,
            notifications_enabled,
            encryption_key,
            last_backup,
            version
        ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT (id) DO UPDATE SET
            pin_enabled = excluded.pin_enabled,
            pin_hash = excluded.pin_hash,
            biometric_enabled = excluded.biometric_enabled,
            notifications_enabled = excluded.notifications_enabled,
            encryption_key = excluded.encryption_key,
            last_backup = excluded.last_backup,
            version = excluded.version;",
        settings,
    )?;
    Ok(())
}

fn execute_with_settings(
    conn: &Connection,
    sql: &str,
    settings: &AppSettings,
) -> rusqlite::Result<usize> {
    conn.execute(
        sql,
        params![
            bool_to_int(settings.pin_enabled),
            settings.pin_hash.as_deref(),
            bool_to_int(settings.biometric_enabled),
            bool_to_int(settings.notifications_enabled),
            settings.encryption_key.as_str(),
            settings.last_backup,
            settings.version.as_str(),
        ],
    )
}

fn parse_row(row: &Row<'_>) -> RepoResult<AppSettings> {
    Ok(AppSettings {
        pin_enabled: int_to_bool(row.get("pin_enabled")?, "settings.pin_enabled")?,
        pin_hash: row.get("pin_hash")?,
        biometric_enabled: int_to_bool(row.get("biometric_enabled")?, "settings.biometric_enabled")?,
        notifications_enabled: int_to_bool(
            row.get("notifications_enabled")?,
            "settings.notifications_enabled",
        )?,
        encryption_key: row.get("encryption_key")?,
        last_backup: row.get("last_backup")?,
        version: row.get("version")?,
    })
}
