//! Routine instance repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide create-if-absent, read, update and hard-delete APIs over
//!   `routine_instances` storage.
//! - Serve date-equality and inclusive date-range queries.
//!
//! # Invariants
//! - `insert_if_absent` re-checks `(routine_id, date)` and writes inside one
//!   `IMMEDIATE` transaction, so racing callers insert at most one row.
//! - Listing order is `id ASC`, which is creation order; the reconciler
//!   relies on it to keep the first-encountered instance.

use crate::model::instance::{InstanceId, InstanceValue, RoutineInstance};
use crate::model::routine::RoutineId;
use crate::model::{format_date, now_epoch_ms, parse_date};
use crate::repo::{bool_to_int, int_to_bool, Entity, RepoError, RepoResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

pub(crate) const INSTANCE_SELECT_SQL: &str = "SELECT
    id,
    routine_id,
    date,
    completed,
    value_json,
    photos_json,
    notes,
    completed_at,
    created_at
FROM routine_instances";

/// Repository interface for routine instance operations.
pub trait InstanceRepository {
    /// Inserts a pending instance unless one already exists for the pair.
    ///
    /// Returns the new id, or `None` when an instance was already present.
    fn insert_if_absent(&self, routine_id: RoutineId, date: NaiveDate)
        -> RepoResult<Option<InstanceId>>;
    fn get_instance(&self, id: InstanceId) -> RepoResult<Option<RoutineInstance>>;
    fn list_for_date(&self, date: NaiveDate) -> RepoResult<Vec<RoutineInstance>>;
    /// Inclusive on both ends, ordered by `date ASC, id ASC`.
    fn list_in_range(&self, start: NaiveDate, end: NaiveDate)
        -> RepoResult<Vec<RoutineInstance>>;
    fn update_instance(&self, instance: &RoutineInstance) -> RepoResult<()>;
    /// Hard delete. Returns `false` when the row was already gone.
    fn delete_instance(&self, id: InstanceId) -> RepoResult<bool>;
}

/// SQLite-backed instance repository.
pub struct SqliteInstanceRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteInstanceRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl InstanceRepository for SqliteInstanceRepository<'_> {
    fn insert_if_absent(
        &self,
        routine_id: RoutineId,
        date: NaiveDate,
    ) -> RepoResult<Option<InstanceId>> {
        let date_text = format_date(date);
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let existing = tx
            .query_row(
                "SELECT id FROM routine_instances
                 WHERE date = ?1 AND routine_id = ?2
                 LIMIT 1;",
                params![date_text.as_str(), routine_id],
                |row| row.get::<_, InstanceId>(0),
            )
            .optional()?;
        if existing.is_some() {
            return Ok(None);
        }

        tx.execute(
            "INSERT INTO routine_instances (routine_id, date, completed, created_at)
             VALUES (?1, ?2, 0, ?3);",
            params![routine_id, date_text.as_str(), now_epoch_ms()],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(Some(id))
    }

    fn get_instance(&self, id: InstanceId) -> RepoResult<Option<RoutineInstance>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{INSTANCE_SELECT_SQL} WHERE id = ?1;"))?;

        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_instance_row(row)?));
        }

        Ok(None)
    }

    fn list_for_date(&self, date: NaiveDate) -> RepoResult<Vec<RoutineInstance>> {
        let mut stmt = self.conn.prepare(&format!(
            "{INSTANCE_SELECT_SQL}
             WHERE date = ?1
             ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query([format_date(date)])?;
        collect_instances(&mut rows)
    }

    fn list_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RepoResult<Vec<RoutineInstance>> {
        let mut stmt = self.conn.prepare(&format!(
            "{INSTANCE_SELECT_SQL}
             WHERE date BETWEEN ?1 AND ?2
             ORDER BY date ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([format_date(start), format_date(end)])?;
        collect_instances(&mut rows)
    }

    fn update_instance(&self, instance: &RoutineInstance) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE routine_instances
             SET
                completed = ?1,
                value_json = ?2,
                photos_json = ?3,
                notes = ?4,
                completed_at = ?5
             WHERE id = ?6;",
            params![
                bool_to_int(instance.completed),
                value_to_db(instance.value.as_ref())?,
                photos_to_db(&instance.photos)?,
                instance.notes.as_deref(),
                instance.completed_at,
                instance.id,
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: Entity::Instance,
                id: instance.id,
            });
        }

        Ok(())
    }

    fn delete_instance(&self, id: InstanceId) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM routine_instances WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }
}

/// Inserts an instance row with its existing id (restore path).
pub(crate) fn insert_instance_row(conn: &Connection, instance: &RoutineInstance) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO routine_instances (
            id,
            routine_id,
            date,
            completed,
            value_json,
            photos_json,
            notes,
            completed_at,
            created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
        params![
            instance.id,
            instance.routine_id,
            format_date(instance.date),
            bool_to_int(instance.completed),
            value_to_db(instance.value.as_ref())?,
            photos_to_db(&instance.photos)?,
            instance.notes.as_deref(),
            instance.completed_at,
            instance.created_at,
        ],
    )?;
    Ok(())
}

pub(crate) fn collect_instances(rows: &mut rusqlite::Rows<'_>) -> RepoResult<Vec<RoutineInstance>> {
    let mut instances = Vec::new();
    while let Some(row) = rows.next()? {
        instances.push(parse_instance_row(row)?);
    }
    Ok(instances)
}

pub(crate) fn parse_instance_row(row: &Row<'_>) -> RepoResult<RoutineInstance> {
    let date_text: String = row.get("date")?;
    let date = parse_date(&date_text).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid date `{date_text}` in routine_instances.date"
        ))
    })?;

    let value = match row.get::<_, Option<String>>("value_json")? {
        Some(text) => Some(serde_json::from_str::<InstanceValue>(&text).map_err(|_| {
            RepoError::InvalidData(format!(
                "invalid value `{text}` in routine_instances.value_json"
            ))
        })?),
        None => None,
    };

    let photos_text: String = row.get("photos_json")?;
    let photos: Vec<String> = serde_json::from_str(&photos_text).map_err(|_| {
        RepoError::InvalidData("invalid photo list in routine_instances.photos_json".to_string())
    })?;

    Ok(RoutineInstance {
        id: row.get("id")?,
        routine_id: row.get("routine_id")?,
        date,
        completed: int_to_bool(row.get("completed")?, "routine_instances.completed")?,
        value,
        photos,
        notes: row.get("notes")?,
        completed_at: row.get("completed_at")?,
        created_at: row.get("created_at")?,
    })
}

fn value_to_db(value: Option<&InstanceValue>) -> RepoResult<Option<String>> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(|err| RepoError::InvalidData(format!("cannot encode instance value: {err}")))
}

fn photos_to_db(photos: &[String]) -> RepoResult<String> {
    serde_json::to_string(photos)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode photo list: {err}")))
}
