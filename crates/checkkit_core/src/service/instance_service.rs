//! Instance materialization, reconciliation and instance updates.
//!
//! # Responsibility
//! - Ensure exactly one instance per `(routine, date)` for every active
//!   routine that recurs on `date`.
//! - Collapse duplicate instances of one routine on one date.
//! - Apply partial instance updates validated against the routine item type.
//!
//! # Invariants
//! - Materialization reads current routine state on every call; nothing is
//!   cached between calls.
//! - Materialization is idempotent: a second call for the same date creates
//!   nothing and fails nothing.
//! - Reconciliation keeps the first instance in retrieval order (`id ASC`)
//!   and treats an already-deleted duplicate as resolved.

use crate::model::instance::{validate_value, InstanceId, InstancePatch, RoutineInstance};
use crate::model::now_epoch_ms;
use crate::model::ValidationError;
use crate::recurrence::should_instantiate;
use crate::repo::instance_repo::InstanceRepository;
use crate::repo::routine_repo::{RoutineListQuery, RoutineRepository};
use crate::repo::{Entity, RepoError, RepoResult};
use chrono::NaiveDate;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::time::Instant;

/// Outcome of one materialization pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializeReport {
    pub date: NaiveDate,
    /// Ids of instances inserted by this pass.
    pub created: Vec<InstanceId>,
    /// Active routines evaluated.
    pub evaluated: usize,
}

/// Use-case service for routine instances.
pub struct InstanceService<R: RoutineRepository, I: InstanceRepository> {
    routines: R,
    instances: I,
}

impl<R: RoutineRepository, I: InstanceRepository> InstanceService<R, I> {
    pub fn new(routines: R, instances: I) -> Self {
        Self {
            routines,
            instances,
        }
    }

    /// Ensures one instance exists on `date` for every active routine whose
    /// recurrence rule matches.
    pub fn materialize_day(&self, date: NaiveDate) -> RepoResult<MaterializeReport> {
        let started_at = Instant::now();
        let routines = self.routines.list_routines(&RoutineListQuery::active())?;
        let existing: HashSet<_> = self
            .instances
            .list_for_date(date)?
            .into_iter()
            .map(|instance| instance.routine_id)
            .collect();

        let mut created = Vec::new();
        for routine in &routines {
            if existing.contains(&routine.id) || !should_instantiate(routine, date) {
                continue;
            }
            // Re-checked inside the insert transaction; a racing caller may
            // have written the pair since the batch read above.
            if let Some(id) = self.instances.insert_if_absent(routine.id, date)? {
                created.push(id);
            }
        }

        info!(
            "event=materialize_day module=instances status=ok date={} evaluated={} created={} duration_ms={}",
            date,
            routines.len(),
            created.len(),
            started_at.elapsed().as_millis()
        );

        Ok(MaterializeReport {
            date,
            created,
            evaluated: routines.len(),
        })
    }

    /// Removes duplicate instances of the same routine on `date` and
    /// returns the surviving set in retrieval order.
    pub fn reconcile_day(&self, date: NaiveDate) -> RepoResult<Vec<RoutineInstance>> {
        let instances = self.instances.list_for_date(date)?;
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(instances.len());
        let mut removed = 0usize;

        for instance in instances {
            if seen.insert(instance.routine_id) {
                kept.push(instance);
                continue;
            }
            if self.instances.delete_instance(instance.id)? {
                removed += 1;
            } else {
                debug!(
                    "event=reconcile_day module=instances status=already_resolved date={} instance_id={}",
                    date, instance.id
                );
            }
        }

        if removed > 0 {
            warn!(
                "event=reconcile_day module=instances status=repaired date={} removed={}",
                date, removed
            );
        }

        Ok(kept)
    }

    /// Materializes and reconciles `today`, then returns its instances.
    pub fn today_instances(&self, today: NaiveDate) -> RepoResult<Vec<RoutineInstance>> {
        self.materialize_day(today)?;
        self.reconcile_day(today)
    }

    pub fn get_instance(&self, id: InstanceId) -> RepoResult<Option<RoutineInstance>> {
        self.instances.get_instance(id)
    }

    pub fn instances_for_date(&self, date: NaiveDate) -> RepoResult<Vec<RoutineInstance>> {
        self.instances.list_for_date(date)
    }

    /// Instances with `start <= date <= end`.
    pub fn instances_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RepoResult<Vec<RoutineInstance>> {
        if start > end {
            return Err(ValidationError::InvalidDateRange { start, end }.into());
        }
        self.instances.list_in_range(start, end)
    }

    /// Applies a partial update. A new `value` must fit the owning
    /// routine's item type, even when that routine is inactive.
    pub fn update_instance(
        &self,
        id: InstanceId,
        patch: &InstancePatch,
    ) -> RepoResult<RoutineInstance> {
        let current = self
            .instances
            .get_instance(id)?
            .ok_or(RepoError::NotFound {
                entity: Entity::Instance,
                id,
            })?;

        if let Some(value) = &patch.value {
            let routine = self
                .routines
                .get_routine(current.routine_id, true)?
                .ok_or(RepoError::NotFound {
                    entity: Entity::Routine,
                    id: current.routine_id,
                })?;
            validate_value(routine.item_type, value.as_ref())?;
        }

        let merged = patch.merged(&current, now_epoch_ms());
        self.instances.update_instance(&merged)?;
        Ok(merged)
    }
}
