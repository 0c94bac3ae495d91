use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::datetime::now_millis;
use crate::storage::Storage;

pub const TASKS_STORAGE_KEY: &str = "vd_tasks_v1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub list_id: Option<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct List {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub task_ids: Vec<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub list_ids: Vec<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

/// Display order for entities without a parent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TopLevelOrder {
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub lists: Vec<String>,
    #[serde(default)]
    pub projects: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TaskState {
    #[serde(default)]
    pub tasks: BTreeMap<String, Task>,
    #[serde(default)]
    pub lists: BTreeMap<String, List>,
    #[serde(default)]
    pub projects: BTreeMap<String, Project>,
    #[serde(default)]
    pub order: TopLevelOrder,
    #[serde(default)]
    pub last_loaded_at: Option<i64>,
    #[serde(default)]
    pub last_saved_at: Option<i64>,
}

impl TaskState {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.lists.is_empty() && self.projects.is_empty()
    }

    /// Restores the containment invariants on a snapshot of unknown
    /// provenance and returns the number of fixes applied.
    ///
    /// Map keys are authoritative: an entity whose `id` disagrees with its
    /// key takes the key. References to missing entities are dropped,
    /// children whose parent vanished become top-level, every child appears
    /// exactly once in its parent's array, and every top-level entity
    /// appears exactly once in the matching order array.
    pub fn repair(&mut self) -> usize {
        let mut fixes = adopt_map_keys(&mut self.tasks, |task| &mut task.id)
            + adopt_map_keys(&mut self.lists, |list| &mut list.id)
            + adopt_map_keys(&mut self.projects, |project| &mut project.id);

        for task in self.tasks.values_mut() {
            if task
                .list_id
                .as_ref()
                .is_some_and(|list_id| !self.lists.contains_key(list_id))
            {
                task.list_id = None;
                fixes += 1;
            }
        }
        for list in self.lists.values_mut() {
            if list
                .project_id
                .as_ref()
                .is_some_and(|project_id| !self.projects.contains_key(project_id))
            {
                list.project_id = None;
                fixes += 1;
            }
        }

        for list in self.lists.values_mut() {
            let tasks = &self.tasks;
            fixes += retain_children(&mut list.task_ids, |id| {
                tasks
                    .get(id)
                    .is_some_and(|task| task.list_id.as_deref() == Some(list.id.as_str()))
            });
        }
        for project in self.projects.values_mut() {
            let lists = &self.lists;
            fixes += retain_children(&mut project.list_ids, |id| {
                lists
                    .get(id)
                    .is_some_and(|list| list.project_id.as_deref() == Some(project.id.as_str()))
            });
        }

        let mut orphans: Vec<&Task> = self
            .tasks
            .values()
            .filter(|task| {
                task.list_id.as_ref().is_some_and(|list_id| {
                    self.lists
                        .get(list_id)
                        .is_some_and(|list| !list.task_ids.contains(&task.id))
                })
            })
            .collect();
        orphans.sort_by_key(|task| (task.created_at, task.id.clone()));
        let orphans: Vec<(String, String)> = orphans
            .into_iter()
            .filter_map(|task| Some((task.list_id.clone()?, task.id.clone())))
            .collect();
        for (list_id, task_id) in orphans {
            if let Some(list) = self.lists.get_mut(&list_id) {
                list.task_ids.push(task_id);
                fixes += 1;
            }
        }

        let mut stray: Vec<&List> = self
            .lists
            .values()
            .filter(|list| {
                list.project_id.as_ref().is_some_and(|project_id| {
                    self.projects
                        .get(project_id)
                        .is_some_and(|project| !project.list_ids.contains(&list.id))
                })
            })
            .collect();
        stray.sort_by_key(|list| (list.created_at, list.id.clone()));
        let stray: Vec<(String, String)> = stray
            .into_iter()
            .filter_map(|list| Some((list.project_id.clone()?, list.id.clone())))
            .collect();
        for (project_id, list_id) in stray {
            if let Some(project) = self.projects.get_mut(&project_id) {
                project.list_ids.push(list_id);
                fixes += 1;
            }
        }

        fixes += repair_top_level(
            &mut self.order.tasks,
            self.tasks
                .values()
                .filter(|task| task.list_id.is_none())
                .map(|task| (task.created_at, task.id.as_str())),
        );
        fixes += repair_top_level(
            &mut self.order.lists,
            self.lists
                .values()
                .filter(|list| list.project_id.is_none())
                .map(|list| (list.created_at, list.id.as_str())),
        );
        fixes += repair_top_level(
            &mut self.order.projects,
            self.projects
                .values()
                .map(|project| (project.created_at, project.id.as_str())),
        );

        fixes
    }
}

fn adopt_map_keys<T>(
    entities: &mut BTreeMap<String, T>,
    mut id_of: impl FnMut(&mut T) -> &mut String,
) -> usize {
    let mut fixes = 0;
    for (key, entity) in entities.iter_mut() {
        let id = id_of(entity);
        if id != key {
            id.clone_from(key);
            fixes += 1;
        }
    }
    fixes
}

fn retain_children<F>(ids: &mut Vec<String>, mut belongs: F) -> usize
where
    F: FnMut(&str) -> bool,
{
    let before = ids.len();
    let mut seen = BTreeSet::new();
    ids.retain(|id| belongs(id) && seen.insert(id.clone()));
    before - ids.len()
}

fn repair_top_level<'a, I>(order: &mut Vec<String>, top_level: I) -> usize
where
    I: Iterator<Item = (i64, &'a str)>,
{
    let mut expected: Vec<(i64, &str)> = top_level.collect();
    let allowed: BTreeSet<&str> = expected.iter().map(|(_, id)| *id).collect();
    let mut fixes = retain_children(order, |id| allowed.contains(id));

    expected.sort();
    for (_, id) in expected {
        if !order.iter().any(|existing| existing == id) {
            order.push(id.to_string());
            fixes += 1;
        }
    }
    fixes
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn remove_id(ids: &mut Vec<String>, id: &str) {
    ids.retain(|existing| existing != id);
}

/// Projects, lists and tasks, persisted as one snapshot after every change.
#[derive(Debug)]
pub struct TaskStore<S: Storage> {
    storage: S,
    state: TaskState,
}

impl<S: Storage> TaskStore<S> {
    /// An empty store; call [`TaskStore::load`] to pick up persisted state.
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            state: TaskState::default(),
        }
    }

    /// Constructs and loads in one step.
    pub fn open(storage: S) -> Self {
        let mut store = Self::new(storage);
        store.load();
        store
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.state.tasks.get(id)
    }

    pub fn list(&self, id: &str) -> Option<&List> {
        self.state.lists.get(id)
    }

    pub fn project(&self, id: &str) -> Option<&Project> {
        self.state.projects.get(id)
    }

    /// Replaces the in-memory state with the persisted snapshot. Leaves the
    /// state alone when nothing is stored or the snapshot cannot be read.
    #[tracing::instrument(skip(self))]
    pub fn load(&mut self) {
        let raw = match self.storage.get_item(TASKS_STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("no persisted tasks snapshot");
                return;
            }
            Err(err) => {
                warn!(error = %err, "tasks load failed");
                return;
            }
        };

        match serde_json::from_str::<TaskState>(&raw) {
            Ok(mut state) => {
                let fixes = state.repair();
                if fixes > 0 {
                    warn!(fixes, "repaired dangling references in tasks snapshot");
                }
                state.last_loaded_at = Some(now_millis());
                info!(
                    tasks = state.tasks.len(),
                    lists = state.lists.len(),
                    projects = state.projects.len(),
                    "loaded tasks snapshot"
                );
                self.state = state;
            }
            Err(err) => {
                warn!(error = %err, "tasks load failed");
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn save(&mut self) {
        let saved_at = now_millis();
        let mut snapshot = self.state.clone();
        snapshot.last_saved_at = Some(saved_at);

        let json = match serde_json::to_string(&snapshot) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "tasks save failed");
                return;
            }
        };

        match self.storage.set_item(TASKS_STORAGE_KEY, &json) {
            Ok(()) => {
                self.state.last_saved_at = Some(saved_at);
                debug!(bytes = json.len(), "saved tasks snapshot");
            }
            Err(err) => warn!(error = %err, "tasks save failed"),
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn add_project(&mut self, title: &str) -> String {
        let id = new_id();
        let now = now_millis();
        self.state.projects.insert(
            id.clone(),
            Project {
                id: id.clone(),
                title: title.trim().to_string(),
                list_ids: vec![],
                created_at: now,
                updated_at: now,
            },
        );
        self.state.order.projects.push(id.clone());
        self.save();
        id
    }

    /// Lists under an unknown project are created top-level.
    #[tracing::instrument(skip(self))]
    pub fn add_list(&mut self, title: &str, project_id: Option<&str>) -> String {
        let id = new_id();
        let now = now_millis();

        let parent = project_id.and_then(|pid| self.state.projects.get_mut(pid));
        let project_id = match parent {
            Some(project) => {
                project.list_ids.push(id.clone());
                project.updated_at = now;
                Some(project.id.clone())
            }
            None => {
                if let Some(pid) = project_id {
                    debug!(project_id = pid, "unknown project; adding list at top level");
                }
                self.state.order.lists.push(id.clone());
                None
            }
        };

        self.state.lists.insert(
            id.clone(),
            List {
                id: id.clone(),
                title: title.trim().to_string(),
                project_id,
                task_ids: vec![],
                created_at: now,
                updated_at: now,
            },
        );
        self.save();
        id
    }

    /// Tasks under an unknown list are created ungrouped.
    #[tracing::instrument(skip(self))]
    pub fn add_task(&mut self, title: &str, list_id: Option<&str>) -> String {
        let id = new_id();
        let now = now_millis();

        let parent = list_id.and_then(|lid| self.state.lists.get_mut(lid));
        let list_id = match parent {
            Some(list) => {
                list.task_ids.push(id.clone());
                list.updated_at = now;
                Some(list.id.clone())
            }
            None => {
                if let Some(lid) = list_id {
                    debug!(list_id = lid, "unknown list; adding task ungrouped");
                }
                self.state.order.tasks.push(id.clone());
                None
            }
        };

        self.state.tasks.insert(
            id.clone(),
            Task {
                id: id.clone(),
                title: title.trim().to_string(),
                done: false,
                list_id,
                created_at: now,
                updated_at: now,
            },
        );
        self.save();
        id
    }

    #[tracing::instrument(skip(self))]
    pub fn toggle_task(&mut self, id: &str) {
        let Some(task) = self.state.tasks.get_mut(id) else {
            return;
        };
        task.done = !task.done;
        task.updated_at = now_millis();
        self.save();
    }

    #[tracing::instrument(skip(self))]
    pub fn rename_project(&mut self, id: &str, title: &str) {
        let Some(project) = self.state.projects.get_mut(id) else {
            return;
        };
        project.title = title.trim().to_string();
        project.updated_at = now_millis();
        self.save();
    }

    #[tracing::instrument(skip(self))]
    pub fn rename_list(&mut self, id: &str, title: &str) {
        let Some(list) = self.state.lists.get_mut(id) else {
            return;
        };
        list.title = title.trim().to_string();
        list.updated_at = now_millis();
        self.save();
    }

    #[tracing::instrument(skip(self))]
    pub fn rename_task(&mut self, id: &str, title: &str) {
        let Some(task) = self.state.tasks.get_mut(id) else {
            return;
        };
        task.title = title.trim().to_string();
        task.updated_at = now_millis();
        self.save();
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_task(&mut self, id: &str) {
        if self.remove_task(id) {
            self.save();
        }
    }

    /// Deletes the list and every task in it.
    #[tracing::instrument(skip(self))]
    pub fn delete_list(&mut self, id: &str) {
        if self.remove_list(id) {
            self.save();
        }
    }

    /// Deletes the project, its lists, and their tasks.
    #[tracing::instrument(skip(self))]
    pub fn delete_project(&mut self, id: &str) {
        let Some(project) = self.state.projects.get(id) else {
            return;
        };
        let list_ids = project.list_ids.clone();
        for list_id in &list_ids {
            self.remove_list(list_id);
        }
        remove_id(&mut self.state.order.projects, id);
        self.state.projects.remove(id);
        info!(lists = list_ids.len(), "deleted project");
        self.save();
    }

    fn remove_task(&mut self, id: &str) -> bool {
        let Some(task) = self.state.tasks.remove(id) else {
            return false;
        };
        match task
            .list_id
            .as_deref()
            .and_then(|list_id| self.state.lists.get_mut(list_id))
        {
            Some(list) => {
                remove_id(&mut list.task_ids, id);
                list.updated_at = now_millis();
            }
            None => remove_id(&mut self.state.order.tasks, id),
        }
        true
    }

    fn remove_list(&mut self, id: &str) -> bool {
        let Some(list) = self.state.lists.get(id) else {
            return false;
        };
        let task_ids = list.task_ids.clone();
        for task_id in &task_ids {
            self.remove_task(task_id);
        }

        let Some(list) = self.state.lists.remove(id) else {
            return false;
        };
        match list
            .project_id
            .as_deref()
            .and_then(|project_id| self.state.projects.get_mut(project_id))
        {
            Some(project) => {
                remove_id(&mut project.list_ids, id);
                project.updated_at = now_millis();
            }
            None => remove_id(&mut self.state.order.lists, id),
        }
        debug!(list_id = id, tasks = task_ids.len(), "removed list");
        true
    }

    /// Fills an empty store with a small demonstration hierarchy. Does
    /// nothing if any project, list or task exists.
    #[tracing::instrument(skip(self))]
    pub fn seed_if_empty(&mut self) -> bool {
        if !self.state.is_empty() {
            debug!("store not empty; skipping seed");
            return false;
        }

        let project = self.add_project("Sell House");
        let prep = self.add_list("Prep", Some(&project));
        self.add_task("Declutter living room & toy rotation", Some(&prep));
        self.add_task("Patch/paint scuffs in hallway", Some(&prep));
        self.add_task("Deep clean kitchen & appliances", Some(&prep));

        let showings = self.add_list("Showings", Some(&project));
        self.add_task("Hide countertop items; wipe surfaces", Some(&showings));
        self.add_task("Tidy the play area; stash bin in closet", Some(&showings));
        self.add_task("Quick vacuum high-traffic paths", Some(&showings));

        self.add_list("Dashboard App — MVP", None);
        self.add_task("Wire To-Do storage shape", None);
        self.add_task("LocalStorage save/restore", None);
        self.add_task("Add collapse/expand for groups", None);

        info!("seeded demonstration tasks");
        true
    }

    /// Tasks of a list in list order, or the ungrouped tasks for `None`.
    /// An unknown list has no tasks.
    pub fn tasks_by_list(&self, list_id: Option<&str>) -> Vec<&Task> {
        match list_id {
            Some(list_id) => self
                .state
                .lists
                .get(list_id)
                .map(|list| {
                    list.task_ids
                        .iter()
                        .filter_map(|id| self.state.tasks.get(id))
                        .collect()
                })
                .unwrap_or_default(),
            None => self.ungrouped_tasks(),
        }
    }

    /// Lists of a project in project order, or the top-level lists for
    /// `None`. An unknown project has no lists.
    pub fn lists_by_project(&self, project_id: Option<&str>) -> Vec<&List> {
        match project_id {
            Some(project_id) => self
                .state
                .projects
                .get(project_id)
                .map(|project| {
                    project
                        .list_ids
                        .iter()
                        .filter_map(|id| self.state.lists.get(id))
                        .collect()
                })
                .unwrap_or_default(),
            None => self.ungrouped_lists(),
        }
    }

    pub fn ungrouped_tasks(&self) -> Vec<&Task> {
        self.state
            .order
            .tasks
            .iter()
            .filter_map(|id| self.state.tasks.get(id))
            .filter(|task| task.list_id.is_none())
            .collect()
    }

    pub fn ungrouped_lists(&self) -> Vec<&List> {
        self.state
            .order
            .lists
            .iter()
            .filter_map(|id| self.state.lists.get(id))
            .filter(|list| list.project_id.is_none())
            .collect()
    }

    pub fn projects(&self) -> Vec<&Project> {
        self.state
            .order
            .projects
            .iter()
            .filter_map(|id| self.state.projects.get(id))
            .collect()
    }
}
