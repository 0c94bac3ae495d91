use tracing::info;

use crate::settings::SettingsStore;
use crate::storage::Storage;
use crate::tasks::TaskStore;

/// Both stores over one storage backend. Built once at startup and handed
/// to whatever front end drives it.
#[derive(Debug)]
pub struct Dashboard<S: Storage> {
    pub settings: SettingsStore<S>,
    pub tasks: TaskStore<S>,
}

impl<S: Storage + Clone> Dashboard<S> {
    /// Loads both stores and hydrates the settings store, which rewrites a
    /// clean settings record if storage held a missing or damaged one.
    #[tracing::instrument(skip(storage))]
    pub fn open(storage: S) -> Self {
        let mut settings = SettingsStore::new(storage.clone());
        settings.hydrate();
        let tasks = TaskStore::open(storage);
        info!(
            shortcuts = settings.shortcuts().len(),
            tasks = tasks.state().tasks.len(),
            "dashboard ready"
        );
        Self { settings, tasks }
    }
}
