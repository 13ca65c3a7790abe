//! Routine use-case service.
//!
//! # Responsibility
//! - Provide create/read/update/soft-delete entry points for routines.
//! - Merge partial updates and re-validate before persistence.
//!
//! # Invariants
//! - Deletion is soft; history that references the routine stays intact.
//! - Repeated creates from one logical action resolve to one routine
//!   (delegated to the repository guard).

use crate::model::routine::{NewRoutine, Routine, RoutineId, RoutinePatch};
use crate::repo::routine_repo::{RoutineCreate, RoutineListQuery, RoutineRepository};
use crate::repo::{Entity, RepoError, RepoResult};
use log::info;

/// Use-case service wrapper for routine operations.
pub struct RoutineService<R: RoutineRepository> {
    repo: R,
}

impl<R: RoutineRepository> RoutineService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates a routine, or resolves a duplicate submission to the
    /// routine that already exists.
    pub fn create_routine(&self, request: &NewRoutine) -> RepoResult<RoutineCreate> {
        let created = self.repo.create_routine(request)?;
        info!(
            "event=routine_create module=routines status=ok id={} inserted={}",
            created.id, created.inserted
        );
        Ok(created)
    }

    pub fn get_routine(&self, id: RoutineId, include_inactive: bool) -> RepoResult<Option<Routine>> {
        self.repo.get_routine(id, include_inactive)
    }

    pub fn list_routines(&self, include_inactive: bool) -> RepoResult<Vec<Routine>> {
        let query = if include_inactive {
            RoutineListQuery::all()
        } else {
            RoutineListQuery::active()
        };
        self.repo.list_routines(&query)
    }

    /// Active routines whose name equals `name` exactly.
    pub fn find_by_name(&self, name: &str) -> RepoResult<Vec<Routine>> {
        self.repo.list_routines(&RoutineListQuery {
            include_inactive: false,
            name: Some(name.trim().to_string()),
        })
    }

    /// Merges `patch` into the stored routine and returns the persisted
    /// result.
    pub fn update_routine(&self, id: RoutineId, patch: &RoutinePatch) -> RepoResult<Routine> {
        let current = self
            .repo
            .get_routine(id, true)?
            .ok_or(RepoError::NotFound {
                entity: Entity::Routine,
                id,
            })?;
        let merged = patch.merged(&current)?;
        self.repo.update_routine(&merged)?;

        self.repo.get_routine(id, true)?.ok_or(RepoError::NotFound {
            entity: Entity::Routine,
            id,
        })
    }

    /// Soft-deletes a routine. Deleting an inactive routine again succeeds.
    pub fn delete_routine(&self, id: RoutineId) -> RepoResult<()> {
        self.repo.soft_delete_routine(id)?;
        info!("event=routine_delete module=routines status=ok id={id}");
        Ok(())
    }
}
