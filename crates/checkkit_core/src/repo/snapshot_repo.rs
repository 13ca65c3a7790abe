//! Whole-store snapshot reads and transactional replacement.
//!
//! # Responsibility
//! - Read routines, instances and settings as one consistent snapshot.
//! - Replace the whole store from a snapshot (restore) or clear user data
//!   (reset) with all-or-nothing semantics.
//!
//! # Invariants
//! - `replace_all` and `clear_user_data` run in one `IMMEDIATE`
//!   transaction; any failing statement rolls back every prior step.
//! - Restored rows keep their ids, so instance references stay valid.

use crate::model::instance::RoutineInstance;
use crate::model::routine::Routine;
use crate::model::settings::AppSettings;
use crate::repo::instance_repo::{collect_instances, insert_instance_row, INSTANCE_SELECT_SQL};
use crate::repo::routine_repo::{insert_routine_row, parse_routine_row, ROUTINE_SELECT_SQL};
use crate::repo::settings_repo::{load_settings, upsert_settings};
use crate::repo::RepoResult;
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Full store contents.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub routines: Vec<Routine>,
    pub instances: Vec<RoutineInstance>,
    pub settings: AppSettings,
}

/// Repository interface for snapshot and bulk operations.
pub trait SnapshotRepository {
    /// Reads everything in one transaction. `defaults` seeds the settings
    /// singleton when it does not exist yet.
    fn load_snapshot(&self, defaults: &AppSettings) -> RepoResult<StoreSnapshot>;
    /// Clears all three tables and bulk-inserts `snapshot`.
    fn replace_all(&self, snapshot: &StoreSnapshot) -> RepoResult<()>;
    /// Deletes all routines and instances and resets `last_backup`.
    /// The settings record itself survives.
    fn clear_user_data(&self) -> RepoResult<()>;
}

/// SQLite-backed snapshot repository.
pub struct SqliteSnapshotRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSnapshotRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SnapshotRepository for SqliteSnapshotRepository<'_> {
    fn load_snapshot(&self, defaults: &AppSettings) -> RepoResult<StoreSnapshot> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let settings = match load_settings(&tx)? {
            Some(settings) => settings,
            None => {
                upsert_settings(&tx, defaults)?;
                defaults.clone()
            }
        };

        let routines = {
            let mut stmt = tx.prepare(&format!("{ROUTINE_SELECT_SQL} ORDER BY id ASC;"))?;
            let mut rows = stmt.query([])?;
            let mut routines = Vec::new();
            while let Some(row) = rows.next()? {
                routines.push(parse_routine_row(row)?);
            }
            routines
        };

        let instances = {
            let mut stmt = tx.prepare(&format!("{INSTANCE_SELECT_SQL} ORDER BY id ASC;"))?;
            let mut rows = stmt.query([])?;
            collect_instances(&mut rows)?
        };

        tx.commit()?;

        Ok(StoreSnapshot {
            routines,
            instances,
            settings,
        })
    }

    fn replace_all(&self, snapshot: &StoreSnapshot) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        tx.execute_batch(
            "DELETE FROM routine_instances;
             DELETE FROM routines;
             DELETE FROM settings;",
        )?;
        for routine in &snapshot.routines {
            insert_routine_row(&tx, routine)?;
        }
        for instance in &snapshot.instances {
            insert_instance_row(&tx, instance)?;
        }
        upsert_settings(&tx, &snapshot.settings)?;

        tx.commit()?;
        Ok(())
    }

    fn clear_user_data(&self) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute_batch(
            "DELETE FROM routine_instances;
             DELETE FROM routines;
             UPDATE settings SET last_backup = NULL;",
        )?;
        tx.commit()?;
        Ok(())
    }
}
