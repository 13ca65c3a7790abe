//! Domain model for routines, dated instances and the settings singleton.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Validate caller input before any store write.
//!
//! # Invariants
//! - Routines are identified by a stable numeric `RoutineId` and are never
//!   physically removed; deactivation is a soft-delete flag.
//! - Instances reference routines by id only (no ownership, no cascade).
//! - Calendar dates are plain days (`YYYY-MM-DD`), never timestamps.

use chrono::NaiveDate;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod instance;
pub mod routine;
pub mod settings;

use routine::{ItemType, RepeatPattern};

/// Storage and wire format for calendar days.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Input validation failures, raised before any persistence work.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Routine name is blank after trim.
    EmptyName,
    /// Repeat pattern is not one of daily/weekly/monthly.
    UnknownRepeatPattern,
    /// Repeat day does not fit the pattern's domain.
    RepeatDayOutOfRange { pattern: RepeatPattern, day: u8 },
    /// Deadline is not a valid `HH:MM` wall-clock time.
    InvalidDeadline(String),
    /// Date text is not a valid `YYYY-MM-DD` calendar day.
    InvalidDate(String),
    /// Range start is after range end.
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    /// Instance value shape does not match the routine item type.
    ValueTypeMismatch { item_type: ItemType },
    /// Number values must be finite.
    NonFiniteNumber,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "routine name must not be blank"),
            Self::UnknownRepeatPattern => {
                write!(f, "repeat pattern must be daily, weekly or monthly")
            }
            Self::RepeatDayOutOfRange { pattern, day } => write!(
                f,
                "repeat day {day} is out of range for {} routines",
                pattern.as_str()
            ),
            Self::InvalidDeadline(value) => write!(f, "deadline must be HH:MM, got `{value}`"),
            Self::InvalidDate(value) => write!(f, "date must be YYYY-MM-DD, got `{value}`"),
            Self::InvalidDateRange { start, end } => {
                write!(f, "date range start {start} is after end {end}")
            }
            Self::ValueTypeMismatch { item_type } => write!(
                f,
                "value does not match routine item type `{}`",
                item_type.as_str()
            ),
            Self::NonFiniteNumber => write!(f, "number values must be finite"),
        }
    }
}

impl Error for ValidationError {}

/// Parses a `YYYY-MM-DD` calendar day.
pub fn parse_date(value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| ValidationError::InvalidDate(value.to_string()))
}

/// Formats a calendar day as `YYYY-MM-DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
