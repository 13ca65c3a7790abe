//! Completion reports over a date range.
//!
//! # Invariants
//! - Rates are whole percentages rounded half-up; an empty bucket is 0%.
//! - Per-routine stats only cover routines that are still active.
//! - Per-routine stats sort by rate desc, then routine id; per-day stats
//!   sort by date.

use crate::model::instance::RoutineInstance;
use crate::model::routine::{Routine, RoutineId};
use crate::model::ValidationError;
use crate::repo::instance_repo::InstanceRepository;
use crate::repo::routine_repo::{RoutineListQuery, RoutineRepository};
use crate::repo::RepoResult;
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::{BTreeMap, HashMap};

/// Standard report windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportPeriod {
    /// Sunday-start week containing the anchor date.
    Week,
    /// Calendar month containing the anchor date.
    Month,
}

impl ReportPeriod {
    /// Inclusive `(start, end)` range containing `anchor`.
    pub fn range(self, anchor: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            Self::Week => {
                let offset = i64::from(anchor.weekday().num_days_from_sunday());
                let start = anchor - Duration::days(offset);
                (start, start + Duration::days(6))
            }
            Self::Month => {
                let start = anchor.with_day(1).unwrap_or(anchor);
                let next_month = if start.month() == 12 {
                    NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)
                };
                let end = next_month
                    .and_then(|next| next.pred_opt())
                    .unwrap_or(anchor);
                (start, end)
            }
        }
    }
}

/// Completion counts for one routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineStat {
    pub routine_id: RoutineId,
    pub routine_name: String,
    pub total: u32,
    pub completed: u32,
    pub rate: u32,
}

/// Completion counts for one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayStat {
    pub date: NaiveDate,
    pub total: u32,
    pub completed: u32,
    pub rate: u32,
}

/// Aggregated completion report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub total: u32,
    pub completed: u32,
    pub rate: u32,
    pub per_routine: Vec<RoutineStat>,
    pub per_day: Vec<DayStat>,
}

/// Report service over routine and instance repositories.
pub struct ReportService<R: RoutineRepository, I: InstanceRepository> {
    routines: R,
    instances: I,
}

impl<R: RoutineRepository, I: InstanceRepository> ReportService<R, I> {
    pub fn new(routines: R, instances: I) -> Self {
        Self {
            routines,
            instances,
        }
    }

    pub fn completion_report(&self, start: NaiveDate, end: NaiveDate) -> RepoResult<CompletionReport> {
        if start > end {
            return Err(ValidationError::InvalidDateRange { start, end }.into());
        }
        let instances = self.instances.list_in_range(start, end)?;
        let routines = self.routines.list_routines(&RoutineListQuery::active())?;
        Ok(build_report(start, end, &routines, &instances))
    }
}

/// Builds a report from already-loaded rows.
pub fn build_report(
    start: NaiveDate,
    end: NaiveDate,
    active_routines: &[Routine],
    instances: &[RoutineInstance],
) -> CompletionReport {
    let names: HashMap<RoutineId, &str> = active_routines
        .iter()
        .map(|routine| (routine.id, routine.name.as_str()))
        .collect();

    let mut by_routine: BTreeMap<RoutineId, (u32, u32)> = BTreeMap::new();
    let mut by_day: BTreeMap<NaiveDate, (u32, u32)> = BTreeMap::new();
    let mut completed = 0u32;

    for instance in instances {
        let done = u32::from(instance.completed);
        completed += done;
        let routine_entry = by_routine.entry(instance.routine_id).or_default();
        routine_entry.0 += 1;
        routine_entry.1 += done;
        let day_entry = by_day.entry(instance.date).or_default();
        day_entry.0 += 1;
        day_entry.1 += done;
    }

    let mut per_routine: Vec<RoutineStat> = by_routine
        .into_iter()
        .filter_map(|(routine_id, (total, done))| {
            names.get(&routine_id).map(|name| RoutineStat {
                routine_id,
                routine_name: (*name).to_string(),
                total,
                completed: done,
                rate: percent(done, total),
            })
        })
        .collect();
    per_routine.sort_by(|a, b| b.rate.cmp(&a.rate).then(a.routine_id.cmp(&b.routine_id)));

    let per_day = by_day
        .into_iter()
        .map(|(date, (total, done))| DayStat {
            date,
            total,
            completed: done,
            rate: percent(done, total),
        })
        .collect();

    let total = instances.len() as u32;
    CompletionReport {
        start,
        end,
        total,
        completed,
        rate: percent(completed, total),
        per_routine,
        per_day,
    }
}

fn percent(completed: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    (f64::from(completed) * 100.0 / f64::from(total)).round() as u32
}
