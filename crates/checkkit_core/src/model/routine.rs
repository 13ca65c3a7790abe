//! Routine (recurring task definition) model.
//!
//! # Responsibility
//! - Define the routine record and its create/update request shapes.
//! - Validate names, repeat rules and deadlines at the write boundary.
//!
//! # Invariants
//! - `name` is non-empty after trim.
//! - Weekly `repeat_days` hold weekday indices `0..=6` (0 = Sunday).
//! - Monthly `repeat_days` hold days of month `1..=31`.
//! - Daily routines ignore `repeat_days`.
//! - An empty `repeat_days` set is legal but never materializes instances.

use super::ValidationError;
use chrono::NaiveTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

static DEADLINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").expect("valid deadline regex"));

/// Storage-assigned routine identity.
pub type RoutineId = i64;

/// Recurrence rule family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatPattern {
    Daily,
    Weekly,
    Monthly,
    /// Anything else found in storage. Never accepted on write.
    #[serde(other)]
    Unknown,
}

impl RepeatPattern {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Unknown => "unknown",
        }
    }

    /// Lenient parse used on read paths; unrecognized text maps to `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value {
            "daily" => Self::Daily,
            "weekly" => Self::Weekly,
            "monthly" => Self::Monthly,
            _ => Self::Unknown,
        }
    }

    fn day_range(self) -> Option<(u8, u8)> {
        match self {
            Self::Weekly => Some((0, 6)),
            Self::Monthly => Some((1, 31)),
            Self::Daily | Self::Unknown => None,
        }
    }
}

/// Value shape an instance of the routine may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Boolean,
    Number,
    Text,
    Photo,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::Text => "text",
            Self::Photo => "photo",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "boolean" => Some(Self::Boolean),
            "number" => Some(Self::Number),
            "text" => Some(Self::Text),
            "photo" => Some(Self::Photo),
            _ => None,
        }
    }
}

/// Persisted recurring task definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Routine {
    pub id: RoutineId,
    pub name: String,
    pub description: Option<String>,
    pub repeat_pattern: RepeatPattern,
    /// Weekday indices or days of month, depending on `repeat_pattern`.
    pub repeat_days: BTreeSet<u8>,
    /// Wall-clock `HH:MM`.
    pub deadline: Option<String>,
    pub item_type: ItemType,
    /// Soft-delete flag. Inactive routines keep their history.
    pub is_active: bool,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
    /// Client operation id the routine was created with, if any.
    #[serde(default)]
    pub create_op_id: Option<Uuid>,
}

impl Routine {
    /// Validates the definition fields of a persisted or imported routine.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_definition(
            &self.name,
            self.repeat_pattern,
            &self.repeat_days,
            self.deadline.as_deref(),
        )
    }

    /// Parsed deadline, if one is set and well-formed.
    pub fn deadline_time(&self) -> Option<NaiveTime> {
        self.deadline
            .as_deref()
            .and_then(|value| NaiveTime::parse_from_str(value, "%H:%M").ok())
    }
}

/// Create request for a routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoutine {
    pub name: String,
    pub description: Option<String>,
    pub repeat_pattern: RepeatPattern,
    pub repeat_days: BTreeSet<u8>,
    pub deadline: Option<String>,
    pub item_type: ItemType,
    /// Client-generated idempotency key. Repeated creates with the same key
    /// resolve to the routine created first.
    pub op_id: Option<Uuid>,
}

impl NewRoutine {
    pub fn new(name: impl Into<String>, repeat_pattern: RepeatPattern, item_type: ItemType) -> Self {
        Self {
            name: name.into(),
            description: None,
            repeat_pattern,
            repeat_days: BTreeSet::new(),
            deadline: None,
            item_type,
            op_id: None,
        }
    }

    pub fn daily(name: impl Into<String>) -> Self {
        Self::new(name, RepeatPattern::Daily, ItemType::Boolean)
    }

    pub fn with_days(mut self, days: impl IntoIterator<Item = u8>) -> Self {
        self.repeat_days = days.into_iter().collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_deadline(mut self, deadline: impl Into<String>) -> Self {
        self.deadline = Some(deadline.into());
        self
    }

    pub fn with_op_id(mut self, op_id: Uuid) -> Self {
        self.op_id = Some(op_id);
        self
    }

    /// Validates and normalizes the request (trimmed name).
    pub fn normalized(&self) -> Result<Self, ValidationError> {
        let mut normalized = self.clone();
        normalized.name = self.name.trim().to_string();
        validate_definition(
            &normalized.name,
            normalized.repeat_pattern,
            &normalized.repeat_days,
            normalized.deadline.as_deref(),
        )?;
        Ok(normalized)
    }
}

/// Partial update for a routine. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutinePatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub repeat_pattern: Option<RepeatPattern>,
    pub repeat_days: Option<BTreeSet<u8>>,
    pub deadline: Option<Option<String>>,
    pub item_type: Option<ItemType>,
    pub is_active: Option<bool>,
}

impl RoutinePatch {
    /// Returns `routine` with the patch merged in, re-validated.
    ///
    /// `updated_at` is left to the repository.
    pub fn merged(&self, routine: &Routine) -> Result<Routine, ValidationError> {
        let mut merged = routine.clone();
        if let Some(name) = &self.name {
            merged.name = name.trim().to_string();
        }
        if let Some(description) = &self.description {
            merged.description = description.clone();
        }
        if let Some(pattern) = self.repeat_pattern {
            merged.repeat_pattern = pattern;
        }
        if let Some(days) = &self.repeat_days {
            merged.repeat_days = days.clone();
        }
        if let Some(deadline) = &self.deadline {
            merged.deadline = deadline.clone();
        }
        if let Some(item_type) = self.item_type {
            merged.item_type = item_type;
        }
        if let Some(is_active) = self.is_active {
            merged.is_active = is_active;
        }
        merged.validate()?;
        Ok(merged)
    }
}

fn validate_definition(
    name: &str,
    pattern: RepeatPattern,
    days: &BTreeSet<u8>,
    deadline: Option<&str>,
) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if pattern == RepeatPattern::Unknown {
        return Err(ValidationError::UnknownRepeatPattern);
    }
    if let Some((min, max)) = pattern.day_range() {
        if let Some(day) = days.iter().copied().find(|day| *day < min || *day > max) {
            return Err(ValidationError::RepeatDayOutOfRange { pattern, day });
        }
    }
    if let Some(deadline) = deadline {
        if !DEADLINE_RE.is_match(deadline) {
            return Err(ValidationError::InvalidDeadline(deadline.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ItemType, NewRoutine, RepeatPattern, RoutinePatch};
    use crate::model::ValidationError;

    #[test]
    fn new_routine_trims_name() {
        let normalized = NewRoutine::daily("  Stretch ").normalized().unwrap();
        assert_eq!(normalized.name, "Stretch");
    }

    #[test]
    fn blank_name_is_rejected() {
        let err = NewRoutine::daily("   ").normalized().unwrap_err();
        assert_eq!(err, ValidationError::EmptyName);
    }

    #[test]
    fn weekly_days_must_be_weekday_indices() {
        let request = NewRoutine::new("Gym", RepeatPattern::Weekly, ItemType::Boolean)
            .with_days([1, 7]);
        let err = request.normalized().unwrap_err();
        assert_eq!(
            err,
            ValidationError::RepeatDayOutOfRange {
                pattern: RepeatPattern::Weekly,
                day: 7
            }
        );
    }

    #[test]
    fn monthly_days_reject_zero() {
        let request = NewRoutine::new("Rent", RepeatPattern::Monthly, ItemType::Boolean)
            .with_days([0, 15]);
        assert!(request.normalized().is_err());

        let ok = NewRoutine::new("Rent", RepeatPattern::Monthly, ItemType::Boolean)
            .with_days([1, 31]);
        assert!(ok.normalized().is_ok());
    }

    #[test]
    fn daily_routines_ignore_repeat_days_domain() {
        let request = NewRoutine::daily("Water").with_days([99]);
        assert!(request.normalized().is_ok());
    }

    #[test]
    fn empty_repeat_days_are_allowed() {
        let request = NewRoutine::new("Someday", RepeatPattern::Weekly, ItemType::Text);
        assert!(request.normalized().is_ok());
    }

    #[test]
    fn deadline_must_be_hh_mm() {
        for bad in ["24:00", "7:30", "07:60", "0730", "noon"] {
            let err = NewRoutine::daily("Pills")
                .with_deadline(bad)
                .normalized()
                .unwrap_err();
            assert!(matches!(err, ValidationError::InvalidDeadline(_)), "{bad}");
        }
        assert!(NewRoutine::daily("Pills")
            .with_deadline("23:59")
            .normalized()
            .is_ok());
    }

    #[test]
    fn unknown_pattern_is_rejected_on_write() {
        let request = NewRoutine::new("Odd", RepeatPattern::Unknown, ItemType::Boolean);
        assert_eq!(
            request.normalized().unwrap_err(),
            ValidationError::UnknownRepeatPattern
        );
    }

    #[test]
    fn unknown_pattern_text_parses_leniently() {
        assert_eq!(RepeatPattern::parse("yearly"), RepeatPattern::Unknown);
        let parsed: RepeatPattern = serde_json::from_str("\"fortnightly\"").unwrap();
        assert_eq!(parsed, RepeatPattern::Unknown);
    }

    #[test]
    fn patch_revalidates_merged_routine() {
        let request = NewRoutine::daily("Read").normalized().unwrap();
        let routine = super::Routine {
            id: 1,
            name: request.name,
            description: None,
            repeat_pattern: request.repeat_pattern,
            repeat_days: request.repeat_days,
            deadline: None,
            item_type: request.item_type,
            is_active: true,
            created_at: 0,
            updated_at: 0,
            create_op_id: None,
        };

        let patch = RoutinePatch {
            repeat_pattern: Some(RepeatPattern::Weekly),
            repeat_days: Some([9].into_iter().collect()),
            ..RoutinePatch::default()
        };
        assert!(patch.merged(&routine).is_err());

        let patch = RoutinePatch {
            name: Some(" Read more ".to_string()),
            deadline: Some(Some("21:00".to_string())),
            ..RoutinePatch::default()
        };
        let merged = patch.merged(&routine).unwrap();
        assert_eq!(merged.name, "Read more");
        assert_eq!(
            merged.deadline_time(),
            chrono::NaiveTime::from_hms_opt(21, 0, 0)
        );
    }
}
