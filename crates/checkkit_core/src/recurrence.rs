//! Recurrence rule evaluation.
//!
//! Pure: no I/O, no clock. Decides whether a routine should have an
//! instance on a given calendar day.

use crate::model::routine::{RepeatPattern, Routine};
use chrono::{Datelike, NaiveDate};

/// Returns whether `routine` recurs on `date`.
///
/// - daily: always.
/// - weekly: weekday index (0 = Sunday .. 6 = Saturday) is in `repeat_days`.
/// - monthly: day of month is in `repeat_days`.
/// - unknown patterns and empty day sets: never.
pub fn should_instantiate(routine: &Routine, date: NaiveDate) -> bool {
    match routine.repeat_pattern {
        RepeatPattern::Daily => true,
        RepeatPattern::Weekly => {
            let weekday = date.weekday().num_days_from_sunday() as u8;
            routine.repeat_days.contains(&weekday)
        }
        RepeatPattern::Monthly => routine.repeat_days.contains(&(date.day() as u8)),
        RepeatPattern::Unknown => false,
    }
}
