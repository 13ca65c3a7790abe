//! Deadline reminder queries for the notification collaborator.
//!
//! Read-only classification; scheduling and delivery live outside core.

use crate::model::instance::{InstanceId, RoutineInstance};
use crate::model::routine::{Routine, RoutineId};
use chrono::{Duration, NaiveDateTime, NaiveTime};
use std::collections::HashMap;

/// How long before a deadline an instance counts as due soon.
pub const DEFAULT_REMINDER_LEAD_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertState {
    /// Deadline is within the lead window and not yet passed.
    DueSoon,
    /// Deadline has passed.
    Overdue,
}

/// One incomplete instance approaching or past its routine deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlineAlert {
    pub instance_id: InstanceId,
    pub routine_id: RoutineId,
    pub routine_name: String,
    pub deadline: NaiveTime,
    pub state: AlertState,
}

/// Classifies `now`'s incomplete instances against their routine deadlines.
///
/// Instances from other dates, completed instances, and instances whose
/// routine has no deadline (or is not in `routines`) are skipped.
pub fn deadline_alerts(
    routines: &[Routine],
    instances: &[RoutineInstance],
    now: NaiveDateTime,
    lead: Duration,
) -> Vec<DeadlineAlert> {
    let by_id: HashMap<RoutineId, &Routine> =
        routines.iter().map(|routine| (routine.id, routine)).collect();
    let today = now.date();

    instances
        .iter()
        .filter(|instance| instance.date == today && !instance.completed)
        .filter_map(|instance| {
            let routine = by_id.get(&instance.routine_id)?;
            let deadline = routine.deadline_time()?;
            let due_at = today.and_time(deadline);
            let state = if now > due_at {
                AlertState::Overdue
            } else if now >= due_at - lead {
                AlertState::DueSoon
            } else {
                return None;
            };
            Some(DeadlineAlert {
                instance_id: instance.id,
                routine_id: routine.id,
                routine_name: routine.name.clone(),
                deadline,
                state,
            })
        })
        .collect()
}
