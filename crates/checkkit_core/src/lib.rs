//! Core domain logic for CheckKit, a local habit and routine tracker.
//! This crate is the single source of truth for business invariants.

pub mod app;
pub mod backup;
pub mod config;
pub mod crypto;
pub mod db;
pub mod logging;
pub mod model;
pub mod recurrence;
pub mod repo;
pub mod service;

pub use app::{CheckKit, CoreError, CoreResult};
pub use backup::{backup_file_name, BackupPayload, ExportedBackup, ImportSummary};
pub use config::{ConfigError, CoreConfig, LoggingConfig};
pub use crypto::{DeviceKey, FileKeyStore, KeyStore, MemoryKeyStore};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::instance::{InstanceId, InstancePatch, InstanceValue, RoutineInstance};
pub use model::routine::{ItemType, NewRoutine, RepeatPattern, Routine, RoutineId, RoutinePatch};
pub use model::settings::{AppSettings, SettingsPatch};
pub use model::ValidationError;
pub use recurrence::should_instantiate;
pub use repo::routine_repo::RoutineCreate;
pub use repo::{Entity, RepoError, RepoResult};
pub use service::instance_service::MaterializeReport;
pub use service::reminders::{AlertState, DeadlineAlert};
pub use service::report_service::{CompletionReport, DayStat, ReportPeriod, RoutineStat};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
