//! Settings use-case service.
//!
//! The singleton is obtained through one accessor with lazy-create-on-miss
//! semantics and passed explicitly; there is no ambient global state.

use crate::model::settings::{AppSettings, SettingsPatch};
use crate::repo::settings_repo::SettingsRepository;
use crate::repo::RepoResult;

/// Settings service facade over a repository implementation.
pub struct SettingsService<S: SettingsRepository> {
    repo: S,
    defaults: AppSettings,
}

impl<S: SettingsRepository> SettingsService<S> {
    /// `defaults` seed the record when it does not exist yet.
    pub fn new(repo: S, defaults: AppSettings) -> Self {
        Self { repo, defaults }
    }

    pub fn get_settings(&self) -> RepoResult<AppSettings> {
        self.repo.get_or_create(&self.defaults)
    }

    pub fn update_settings(&self, patch: &SettingsPatch) -> RepoResult<AppSettings> {
        let current = self.get_settings()?;
        let merged = patch.merged(&current);
        self.repo.save(&merged)?;
        Ok(merged)
    }
}
