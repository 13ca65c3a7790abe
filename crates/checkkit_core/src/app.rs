//! Facade wiring storage, crypto and services for presentation callers.
//!
//! # Responsibility
//! - Own the SQLite connection and the encryption service.
//! - Expose every core use case with one error taxonomy (`CoreError`).
//!
//! # Invariants
//! - Settings are passed explicitly through `get_settings`; there is no
//!   process-global settings state.
//! - Screens showing "today" go through `today_instances`, which
//!   materializes and reconciles before reading.

use crate::backup::{BackupCodec, BackupError, ExportedBackup, ImportSummary};
use crate::config::{ConfigError, CoreConfig};
use crate::crypto::{CryptoError, EncryptionService, FileKeyStore, KeyStore};
use crate::db::{open_db, DbError};
use crate::model::instance::{InstanceId, InstancePatch, RoutineInstance};
use crate::model::routine::{NewRoutine, Routine, RoutineId, RoutinePatch};
use crate::model::settings::{AppSettings, SettingsPatch};
use crate::model::ValidationError;
use crate::repo::instance_repo::SqliteInstanceRepository;
use crate::repo::routine_repo::{
    RoutineCreate, SqliteRoutineRepository, DEFAULT_DUPLICATE_WINDOW_MS,
};
use crate::repo::settings_repo::SqliteSettingsRepository;
use crate::repo::snapshot_repo::{SnapshotRepository, SqliteSnapshotRepository};
use crate::repo::{Entity, RepoError};
use crate::service::instance_service::{InstanceService, MaterializeReport};
use crate::service::reminders::{deadline_alerts, DeadlineAlert, DEFAULT_REMINDER_LEAD_MINUTES};
use crate::service::report_service::{CompletionReport, ReportPeriod, ReportService};
use crate::service::routine_service::RoutineService;
use crate::service::settings_service::SettingsService;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use log::info;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub type CoreResult<T> = Result<T, CoreError>;

/// Error taxonomy surfaced to presentation callers.
#[derive(Debug)]
pub enum CoreError {
    /// Malformed input, rejected before any write.
    Validation(ValidationError),
    NotFound { entity: Entity, id: i64 },
    /// Wrong key or corrupted ciphertext.
    Decryption(CryptoError),
    /// Backup decrypted but its payload is unusable.
    InvalidBackup(String),
    /// Durable storage failure; not retried by core.
    Storage(RepoError),
    /// Device key could not be read or written.
    KeyStore(CryptoError),
    Config(ConfigError),
    Io { path: PathBuf, source: std::io::Error },
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{} not found: {id}", entity.as_str()),
            Self::Decryption(err) => write!(f, "{err}"),
            Self::InvalidBackup(message) => write!(f, "invalid backup: {message}"),
            Self::Storage(err) => write!(f, "storage failure: {err}"),
            Self::KeyStore(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
        }
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::NotFound { .. } | Self::InvalidBackup(_) => None,
            Self::Decryption(err) | Self::KeyStore(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::Io { source, .. } => Some(source),
        }
    }
}

impl From<RepoError> for CoreError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Storage(other),
        }
    }
}

impl From<DbError> for CoreError {
    fn from(value: DbError) -> Self {
        Self::Storage(RepoError::Db(value))
    }
}

impl From<ValidationError> for CoreError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<CryptoError> for CoreError {
    fn from(value: CryptoError) -> Self {
        match value {
            CryptoError::CannotDecrypt => Self::Decryption(value),
            other => Self::KeyStore(other),
        }
    }
}

impl From<BackupError> for CoreError {
    fn from(value: BackupError) -> Self {
        match value {
            BackupError::Decryption(err) => Self::Decryption(err),
            BackupError::InvalidBackup(message) => Self::InvalidBackup(message),
            BackupError::Crypto(err) => Self::KeyStore(err),
            BackupError::Storage(err) => err.into(),
        }
    }
}

impl From<ConfigError> for CoreError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

/// Entry point for presentation callers.
pub struct CheckKit<K: KeyStore = FileKeyStore> {
    conn: Connection,
    cipher: EncryptionService<K>,
    duplicate_window_ms: i64,
}

impl CheckKit<FileKeyStore> {
    /// Opens (creating if needed) the database and device key under
    /// `config.data_dir`.
    pub fn open(config: &CoreConfig) -> CoreResult<Self> {
        std::fs::create_dir_all(&config.data_dir).map_err(|source| CoreError::Io {
            path: config.data_dir.clone(),
            source,
        })?;
        let conn = open_db(config.db_path())?;
        let kit = Self::with_connection(conn, FileKeyStore::new(config.key_path()))
            .with_duplicate_window_ms(config.duplicate_create_window_ms);
        info!(
            "event=core_open module=app status=ok duplicate_window_ms={}",
            kit.duplicate_window_ms
        );
        Ok(kit)
    }
}

impl<K: KeyStore> CheckKit<K> {
    /// Wraps an already-migrated connection.
    pub fn with_connection(conn: Connection, key_store: K) -> Self {
        Self {
            conn,
            cipher: EncryptionService::new(key_store),
            duplicate_window_ms: DEFAULT_DUPLICATE_WINDOW_MS,
        }
    }

    pub fn with_duplicate_window_ms(mut self, window_ms: i64) -> Self {
        self.duplicate_window_ms = window_ms;
        self
    }

    /// Underlying connection, for diagnostics and tests.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn routine_repo(&self) -> SqliteRoutineRepository<'_> {
        SqliteRoutineRepository::new(&self.conn).with_duplicate_window_ms(self.duplicate_window_ms)
    }

    fn routine_service(&self) -> RoutineService<SqliteRoutineRepository<'_>> {
        RoutineService::new(self.routine_repo())
    }

    fn instance_service(
        &self,
    ) -> InstanceService<SqliteRoutineRepository<'_>, SqliteInstanceRepository<'_>> {
        InstanceService::new(self.routine_repo(), SqliteInstanceRepository::new(&self.conn))
    }

    fn settings_service(&self) -> CoreResult<SettingsService<SqliteSettingsRepository<'_>>> {
        Ok(SettingsService::new(
            SqliteSettingsRepository::new(&self.conn),
            self.default_settings()?,
        ))
    }

    fn default_settings(&self) -> CoreResult<AppSettings> {
        Ok(AppSettings::defaults(self.cipher.key_mirror()?))
    }

    // Routines

    /// Creates a routine, collapsing duplicate submissions.
    pub fn create_routine(&self, request: &NewRoutine) -> CoreResult<RoutineCreate> {
        Ok(self.routine_service().create_routine(request)?)
    }

    pub fn get_routine(&self, id: RoutineId, include_inactive: bool) -> CoreResult<Option<Routine>> {
        Ok(self.routine_service().get_routine(id, include_inactive)?)
    }

    pub fn list_routines(&self, include_inactive: bool) -> CoreResult<Vec<Routine>> {
        Ok(self.routine_service().list_routines(include_inactive)?)
    }

    pub fn find_routines_by_name(&self, name: &str) -> CoreResult<Vec<Routine>> {
        Ok(self.routine_service().find_by_name(name)?)
    }

    pub fn update_routine(&self, id: RoutineId, patch: &RoutinePatch) -> CoreResult<Routine> {
        Ok(self.routine_service().update_routine(id, patch)?)
    }

    /// Soft-deletes a routine. Its instances are kept as history.
    pub fn delete_routine(&self, id: RoutineId) -> CoreResult<()> {
        Ok(self.routine_service().delete_routine(id)?)
    }

    // Instances

    pub fn materialize_day(&self, date: NaiveDate) -> CoreResult<MaterializeReport> {
        Ok(self.instance_service().materialize_day(date)?)
    }

    pub fn reconcile_day(&self, date: NaiveDate) -> CoreResult<Vec<RoutineInstance>> {
        Ok(self.instance_service().reconcile_day(date)?)
    }

    /// Materializes and reconciles `today`, then returns its instances.
    pub fn today_instances(&self, today: NaiveDate) -> CoreResult<Vec<RoutineInstance>> {
        Ok(self.instance_service().today_instances(today)?)
    }

    pub fn get_instance(&self, id: InstanceId) -> CoreResult<Option<RoutineInstance>> {
        Ok(self.instance_service().get_instance(id)?)
    }

    pub fn instances_for_date(&self, date: NaiveDate) -> CoreResult<Vec<RoutineInstance>> {
        Ok(self.instance_service().instances_for_date(date)?)
    }

    pub fn instances_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> CoreResult<Vec<RoutineInstance>> {
        Ok(self.instance_service().instances_in_range(start, end)?)
    }

    pub fn update_instance(
        &self,
        id: InstanceId,
        patch: &InstancePatch,
    ) -> CoreResult<RoutineInstance> {
        Ok(self.instance_service().update_instance(id, patch)?)
    }

    // Settings

    /// Returns the settings record, creating it with defaults on first use.
    pub fn get_settings(&self) -> CoreResult<AppSettings> {
        Ok(self.settings_service()?.get_settings()?)
    }

    pub fn update_settings(&self, patch: &SettingsPatch) -> CoreResult<AppSettings> {
        Ok(self.settings_service()?.update_settings(patch)?)
    }

    /// Deletes every routine and instance and resets `last_backup`.
    /// Settings and the device key survive.
    pub fn clear_all_data(&self) -> CoreResult<()> {
        SqliteSnapshotRepository::new(&self.conn).clear_user_data()?;
        info!("event=clear_all_data module=app status=ok");
        Ok(())
    }

    // Backup

    /// Exports the whole store as an encrypted blob and stamps
    /// `last_backup`.
    pub fn export_backup(&self) -> CoreResult<ExportedBackup> {
        let defaults = self.default_settings()?;
        let codec = BackupCodec::new(SqliteSnapshotRepository::new(&self.conn), &self.cipher);
        let exported = codec.export(&defaults)?;
        self.update_settings(&SettingsPatch {
            last_backup: Some(Some(exported.exported_at)),
            ..SettingsPatch::default()
        })?;
        Ok(exported)
    }

    /// Replaces the whole store with a previously exported blob.
    ///
    /// On any failure the store is left unchanged.
    pub fn import_backup(&self, blob: &str) -> CoreResult<ImportSummary> {
        let codec = BackupCodec::new(SqliteSnapshotRepository::new(&self.conn), &self.cipher);
        Ok(codec.import(blob)?)
    }

    // Reports and reminders

    pub fn completion_report(&self, start: NaiveDate, end: NaiveDate) -> CoreResult<CompletionReport> {
        let service = ReportService::new(self.routine_repo(), SqliteInstanceRepository::new(&self.conn));
        Ok(service.completion_report(start, end)?)
    }

    pub fn period_report(&self, period: ReportPeriod, anchor: NaiveDate) -> CoreResult<CompletionReport> {
        let (start, end) = period.range(anchor);
        self.completion_report(start, end)
    }

    /// Incomplete instances of `now`'s date near or past their deadline.
    /// Empty when notifications are disabled.
    pub fn deadline_alerts(&self, now: NaiveDateTime) -> CoreResult<Vec<DeadlineAlert>> {
        if !self.get_settings()?.notifications_enabled {
            return Ok(Vec::new());
        }
        let routines = self.list_routines(false)?;
        let instances = self.instances_for_date(now.date())?;
        Ok(deadline_alerts(
            &routines,
            &instances,
            now,
            Duration::minutes(DEFAULT_REMINDER_LEAD_MINUTES),
        ))
    }
}
