//! Routine repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide create/read/update/soft-delete APIs over `routines` storage.
//! - Own the duplicate-create guard for at-least-once create callers.
//!
//! # Invariants
//! - Routines are never physically deleted by this repository.
//! - A create carrying a known `op_id` returns the original routine id.
//! - A create without `op_id` returns the id of an active routine with the
//!   same name created inside the duplicate window, instead of inserting.
//! - Guard check and insert run in one `IMMEDIATE` transaction.

use crate::model::now_epoch_ms;
use crate::model::routine::{ItemType, NewRoutine, RepeatPattern, Routine, RoutineId};
use crate::repo::{bool_to_int, int_to_bool, Entity, RepoError, RepoResult};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use std::collections::BTreeSet;
use uuid::Uuid;

pub(crate) const ROUTINE_SELECT_SQL: &str = "SELECT
    id,
    name,
    description,
    repeat_pattern,
    repeat_days,
    deadline,
    item_type,
    is_active,
    created_at,
    updated_at,
    create_op_id
FROM routines";

/// Default window for the name-based duplicate-create guard.
pub const DEFAULT_DUPLICATE_WINDOW_MS: i64 = 2_000;

/// Result of a routine create call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutineCreate {
    pub id: RoutineId,
    /// `false` when the guard resolved the call to an existing routine.
    pub inserted: bool,
}

/// Query options for listing routines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutineListQuery {
    pub include_inactive: bool,
    /// Exact name equality filter.
    pub name: Option<String>,
}

impl RoutineListQuery {
    pub fn active() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            include_inactive: true,
            ..Self::default()
        }
    }
}

/// Repository interface for routine operations.
pub trait RoutineRepository {
    fn create_routine(&self, request: &NewRoutine) -> RepoResult<RoutineCreate>;
    fn get_routine(&self, id: RoutineId, include_inactive: bool) -> RepoResult<Option<Routine>>;
    fn list_routines(&self, query: &RoutineListQuery) -> RepoResult<Vec<Routine>>;
    /// Replaces all mutable fields and refreshes `updated_at`.
    fn update_routine(&self, routine: &Routine) -> RepoResult<()>;
    fn soft_delete_routine(&self, id: RoutineId) -> RepoResult<()>;
}

/// SQLite-backed routine repository.
pub struct SqliteRoutineRepository<'conn> {
    conn: &'conn Connection,
    duplicate_window_ms: i64,
}

impl<'conn> SqliteRoutineRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            duplicate_window_ms: DEFAULT_DUPLICATE_WINDOW_MS,
        }
    }

    /// Overrides the name-based duplicate window. `0` disables the guard.
    pub fn with_duplicate_window_ms(mut self, window_ms: i64) -> Self {
        self.duplicate_window_ms = window_ms.max(0);
        self
    }
}

impl RoutineRepository for SqliteRoutineRepository<'_> {
    fn create_routine(&self, request: &NewRoutine) -> RepoResult<RoutineCreate> {
        let request = request.normalized()?;
        let now = now_epoch_ms();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        if let Some(op_id) = request.op_id {
            let existing = tx
                .query_row(
                    "SELECT id FROM routines WHERE create_op_id = ?1;",
                    [op_id.to_string()],
                    |row| row.get::<_, RoutineId>(0),
                )
                .optional()?;
            if let Some(id) = existing {
                debug!("event=routine_create module=repo status=deduplicated reason=op_id id={id}");
                return Ok(RoutineCreate {
                    id,
                    inserted: false,
                });
            }
        }

        if self.duplicate_window_ms > 0 {
            let existing = tx
                .query_row(
                    "SELECT id FROM routines
                     WHERE name = ?1
                       AND is_active = 1
                       AND created_at > ?2
                     ORDER BY created_at DESC, id DESC
                     LIMIT 1;",
                    params![request.name.as_str(), now - self.duplicate_window_ms],
                    |row| row.get::<_, RoutineId>(0),
                )
                .optional()?;
            if let Some(id) = existing {
                debug!(
                    "event=routine_create module=repo status=deduplicated reason=recent_name id={id}"
                );
                return Ok(RoutineCreate {
                    id,
                    inserted: false,
                });
            }
        }

        tx.execute(
            "INSERT INTO routines (
                name,
                description,
                repeat_pattern,
                repeat_days,
                deadline,
                item_type,
                is_active,
                created_at,
                updated_at,
                create_op_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7, ?8);",
            params![
                request.name.as_str(),
                request.description.as_deref(),
                request.repeat_pattern.as_str(),
                repeat_days_to_db(&request.repeat_days)?,
                request.deadline.as_deref(),
                request.item_type.as_str(),
                now,
                request.op_id.map(|op_id| op_id.to_string()),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(RoutineCreate { id, inserted: true })
    }

    fn get_routine(&self, id: RoutineId, include_inactive: bool) -> RepoResult<Option<Routine>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ROUTINE_SELECT_SQL}
             WHERE id = ?1
               AND (?2 = 1 OR is_active = 1);"
        ))?;

        let mut rows = stmt.query(params![id, bool_to_int(include_inactive)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_routine_row(row)?));
        }

        Ok(None)
    }

    fn list_routines(&self, query: &RoutineListQuery) -> RepoResult<Vec<Routine>> {
        let mut sql = format!("{ROUTINE_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if !query.include_inactive {
            sql.push_str(" AND is_active = 1");
        }

        if let Some(name) = &query.name {
            sql.push_str(" AND name = ?");
            bind_values.push(Value::Text(name.clone()));
        }

        sql.push_str(" ORDER BY id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut routines = Vec::new();

        while let Some(row) = rows.next()? {
            routines.push(parse_routine_row(row)?);
        }

        Ok(routines)
    }

    fn update_routine(&self, routine: &Routine) -> RepoResult<()> {
        routine.validate()?;

        let changed = self.conn.execute(
            "UPDATE routines
             SET
                name = ?1,
                description = ?2,
                repeat_pattern = ?3,
                repeat_days = ?4,
                deadline = ?5,
                item_type = ?6,
                is_active = ?7,
                updated_at = ?8
             WHERE id = ?9;",
            params![
                routine.name.as_str(),
                routine.description.as_deref(),
                routine.repeat_pattern.as_str(),
                repeat_days_to_db(&routine.repeat_days)?,
                routine.deadline.as_deref(),
                routine.item_type.as_str(),
                bool_to_int(routine.is_active),
                now_epoch_ms(),
                routine.id,
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: Entity::Routine,
                id: routine.id,
            });
        }

        Ok(())
    }

    fn soft_delete_routine(&self, id: RoutineId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE routines
             SET
                is_active = 0,
                updated_at = ?1
             WHERE id = ?2;",
            params![now_epoch_ms(), id],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: Entity::Routine,
                id,
            });
        }

        Ok(())
    }
}

/// Inserts a routine row with its existing id and timestamps (restore path).
pub(crate) fn insert_routine_row(conn: &Connection, routine: &Routine) -> RepoResult<()> {
    routine.validate()?;
    conn.execute(
        "INSERT INTO routines (
            id,
            name,
            description,
            repeat_pattern,
            repeat_days,
            deadline,
            item_type,
            is_active,
            created_at,
            updated_at,
            create_op_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
        params![
            routine.id,
            routine.name.as_str(),
            routine.description.as_deref(),
            routine.repeat_pattern.as_str(),
            repeat_days_to_db(&routine.repeat_days)?,
            routine.deadline.as_deref(),
            routine.item_type.as_str(),
            bool_to_int(routine.is_active),
            routine.created_at,
            routine.updated_at,
            routine.create_op_id.map(|op_id| op_id.to_string()),
        ],
    )?;
    Ok(())
}

pub(crate) fn parse_routine_row(row: &Row<'_>) -> RepoResult<Routine> {
    let item_type_text: String = row.get("item_type")?;
    let item_type = ItemType::parse(&item_type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid item type `{item_type_text}` in routines.item_type"
        ))
    })?;

    let days_text: String = row.get("repeat_days")?;
    let repeat_days: BTreeSet<u8> = serde_json::from_str(&days_text).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid repeat days `{days_text}` in routines.repeat_days"
        ))
    })?;

    let pattern_text: String = row.get("repeat_pattern")?;

    let op_id_text: Option<String> = row.get("create_op_id")?;
    let create_op_id = op_id_text
        .map(|text| {
            Uuid::parse_str(&text).map_err(|_| {
                RepoError::InvalidData(format!("invalid op id `{text}` in routines.create_op_id"))
            })
        })
        .transpose()?;

    Ok(Routine {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        repeat_pattern: RepeatPattern::parse(&pattern_text),
        repeat_days,
        deadline: row.get("deadline")?,
        item_type,
        is_active: int_to_bool(row.get("is_active")?, "routines.is_active")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        create_op_id,
    })
}

fn repeat_days_to_db(days: &BTreeSet<u8>) -> RepoResult<String> {
    serde_json::to_string(days)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode repeat days: {err}")))
}
