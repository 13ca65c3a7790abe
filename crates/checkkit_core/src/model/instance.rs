//! Routine instance (one dated occurrence) model.
//!
//! # Responsibility
//! - Define the per-day occurrence record and its partial update shape.
//! - Model the item-type dependent `value` as a tagged union.
//!
//! # Invariants
//! - At most one instance per `(routine_id, date)` is visible to callers
//!   after materialization + reconciliation.
//! - `completed_at` is set iff `completed` is true.
//! - `value` must fit the owning routine's `ItemType`.

use super::routine::{ItemType, RoutineId};
use super::ValidationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Storage-assigned instance identity.
pub type InstanceId = i64;

/// Recorded value of an instance, keyed by the routine item type.
///
/// Photo routines carry their payload in `RoutineInstance::photos` and
/// accept no value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum InstanceValue {
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl InstanceValue {
    pub fn item_type(&self) -> ItemType {
        match self {
            Self::Boolean(_) => ItemType::Boolean,
            Self::Number(_) => ItemType::Number,
            Self::Text(_) => ItemType::Text,
        }
    }
}

/// Checks that `value` is acceptable for a routine of `item_type`.
pub fn validate_value(
    item_type: ItemType,
    value: Option<&InstanceValue>,
) -> Result<(), ValidationError> {
    let Some(value) = value else {
        return Ok(());
    };
    if value.item_type() != item_type {
        return Err(ValidationError::ValueTypeMismatch { item_type });
    }
    if let InstanceValue::Number(number) = value {
        if !number.is_finite() {
            return Err(ValidationError::NonFiniteNumber);
        }
    }
    Ok(())
}

/// One occurrence of a routine on one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutineInstance {
    pub id: InstanceId,
    /// Non-owning reference, resolved by lookup.
    pub routine_id: RoutineId,
    pub date: NaiveDate,
    pub completed: bool,
    pub value: Option<InstanceValue>,
    /// Opaque encoded photo blobs.
    pub photos: Vec<String>,
    pub notes: Option<String>,
    /// Unix epoch milliseconds.
    pub completed_at: Option<i64>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

/// Partial update for an instance. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstancePatch {
    pub completed: Option<bool>,
    pub value: Option<Option<InstanceValue>>,
    pub photos: Option<Vec<String>>,
    pub notes: Option<Option<String>>,
}

impl InstancePatch {
    pub fn complete() -> Self {
        Self {
            completed: Some(true),
            ..Self::default()
        }
    }

    pub fn with_value(value: InstanceValue) -> Self {
        Self {
            value: Some(Some(value)),
            ..Self::default()
        }
    }

    pub fn with_notes(notes: impl Into<String>) -> Self {
        Self {
            notes: Some(Some(notes.into())),
            ..Self::default()
        }
    }

    /// Returns `instance` with the patch merged in.
    ///
    /// Completing stamps `completed_at = now_ms` unless the instance was
    /// already completed; un-completing clears it.
    pub fn merged(&self, instance: &RoutineInstance, now_ms: i64) -> RoutineInstance {
        let mut merged = instance.clone();
        if let Some(completed) = self.completed {
            merged.completed_at = match (completed, instance.completed_at) {
                (true, Some(existing)) if instance.completed => Some(existing),
                (true, _) => Some(now_ms),
                (false, _) => None,
            };
            merged.completed = completed;
        }
        if let Some(value) = &self.value {
            merged.value = value.clone();
        }
        if let Some(photos) = &self.photos {
            merged.photos = photos.clone();
        }
        if let Some(notes) = &self.notes {
            merged.notes = notes.clone();
        }
        merged
    }
}
