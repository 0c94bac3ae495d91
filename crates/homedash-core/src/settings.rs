use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::provider::{OpenMode, Provider};
use crate::sanitize::{
    is_corrupted_raw, legacy_entries, normalize_shortcut, normalize_shortcut_entries,
    normalize_shortcuts, sanitize_legacy_order, sanitize_open_mode, sanitize_provider,
    sanitize_snapshot,
};
use crate::storage::Storage;

pub const SETTINGS_STORAGE_KEY: &str = "shortcuts.settings.v1";
pub const SETTINGS_RECORD_VERSION: u64 = 2;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ShortcutEntry {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub href: String,
}

impl ShortcutEntry {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        icon: impl Into<String>,
        href: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            icon: icon.into(),
            href: href.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSnapshot {
    pub provider: Provider,
    pub open_mode: OpenMode,
    pub shortcuts: Vec<ShortcutEntry>,
}

#[derive(Serialize)]
struct SettingsRecord<'a> {
    version: u64,
    #[serde(flatten)]
    snapshot: &'a SettingsSnapshot,
}

impl SettingsSnapshot {
    /// Shortcut ids in display order.
    pub fn order(&self) -> Vec<&str> {
        self.shortcuts.iter().map(|entry| entry.id.as_str()).collect()
    }

    pub fn shortcut(&self, id: &str) -> Option<&ShortcutEntry> {
        self.shortcuts.iter().find(|entry| entry.id == id)
    }

    /// The versioned on-disk record.
    pub fn to_record_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&SettingsRecord {
            version: SETTINGS_RECORD_VERSION,
            snapshot: self,
        })
    }
}

/// A settings record as found in storage, before migration.
///
/// Version 1 stored a bare id list under `order`; version 2 stores full
/// shortcut entries. Records written before versioning existed carry no
/// `version` field and are classified by shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistedSettings {
    V1 {
        provider: Provider,
        open_mode: OpenMode,
        order: Option<Vec<String>>,
    },
    V2(SettingsSnapshot),
}

impl PersistedSettings {
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            debug!("settings payload is not an object; using defaults");
            return PersistedSettings::V2(SettingsSnapshot::default());
        };

        let provider = sanitize_provider(object.get("provider"));
        let open_mode = sanitize_open_mode(object.get("openMode"));
        let shortcuts = object.get("shortcuts").and_then(Value::as_array);
        let has_legacy_order = object.get("order").is_some_and(Value::is_array);

        let legacy = match object.get("version").and_then(Value::as_u64) {
            Some(1) => true,
            Some(SETTINGS_RECORD_VERSION) => false,
            Some(other) => {
                warn!(
                    version = other,
                    "unknown settings record version; inferring schema from shape"
                );
                shortcuts.is_none() && has_legacy_order
            }
            None => shortcuts.is_none() && has_legacy_order,
        };

        if legacy {
            return PersistedSettings::V1 {
                provider,
                open_mode,
                order: sanitize_legacy_order(object.get("order")),
            };
        }

        PersistedSettings::V2(SettingsSnapshot {
            provider,
            open_mode,
            shortcuts: shortcuts
                .map(|items| normalize_shortcuts(items))
                .unwrap_or_default(),
        })
    }

    pub fn version(&self) -> u64 {
        match self {
            PersistedSettings::V1 { .. } => 1,
            PersistedSettings::V2(_) => 2,
        }
    }

    pub fn into_current(self) -> SettingsSnapshot {
        match self {
            PersistedSettings::V1 {
                provider,
                open_mode,
                order,
            } => migrate_v1_to_v2(provider, open_mode, order.as_deref().unwrap_or_default()),
            PersistedSettings::V2(snapshot) => snapshot,
        }
    }
}

pub fn migrate_v1_to_v2(
    provider: Provider,
    open_mode: OpenMode,
    order: &[String],
) -> SettingsSnapshot {
    debug!(count = order.len(), "migrating legacy shortcut order");
    SettingsSnapshot {
        provider,
        open_mode,
        shortcuts: normalize_shortcut_entries(&legacy_entries(order)),
    }
}

/// Reads the persisted snapshot. Missing or unreadable storage yields
/// defaults; corrupted text is deleted first so the next hydrate starts
/// clean.
#[tracing::instrument(skip(storage))]
pub fn load_settings<S: Storage>(storage: &S) -> SettingsSnapshot {
    let raw = match storage.get_item(SETTINGS_STORAGE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!("no persisted settings; using defaults");
            return SettingsSnapshot::default();
        }
        Err(err) => {
            warn!(error = %err, "settings storage unreadable; using defaults");
            return SettingsSnapshot::default();
        }
    };

    if is_corrupted_raw(&raw) {
        warn!("persisted settings corrupted; clearing");
        clear_settings(storage);
        return SettingsSnapshot::default();
    }

    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(value) => sanitize_snapshot(&value),
        Err(err) => {
            warn!(error = %err, "persisted settings unparsable; clearing");
            clear_settings(storage);
            SettingsSnapshot::default()
        }
    }
}

fn clear_settings<S: Storage>(storage: &S) {
    if let Err(err) = storage.remove_item(SETTINGS_STORAGE_KEY) {
        warn!(error = %err, "failed clearing corrupted settings");
    }
}

/// Search provider, open mode and the shortcut rail, written through to
/// storage at the end of every change.
#[derive(Debug)]
pub struct SettingsStore<S: Storage> {
    storage: S,
    state: SettingsSnapshot,
    hydrated: bool,
}

impl<S: Storage> SettingsStore<S> {
    pub fn new(storage: S) -> Self {
        let state = load_settings(&storage);
        Self {
            storage,
            state,
            hydrated: false,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn snapshot(&self) -> &SettingsSnapshot {
        &self.state
    }

    pub fn provider(&self) -> Provider {
        self.state.provider
    }

    pub fn open_mode(&self) -> OpenMode {
        self.state.open_mode
    }

    pub fn shortcuts(&self) -> &[ShortcutEntry] {
        &self.state.shortcuts
    }

    pub fn order(&self) -> Vec<&str> {
        self.state.order()
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    /// Writes a clean snapshot over whatever storage holds, repairing a
    /// missing or damaged record. Later calls do nothing.
    #[tracing::instrument(skip(self))]
    pub fn hydrate(&mut self) {
        if self.hydrated {
            return;
        }
        self.hydrated = true;
        info!(
            provider = %self.state.provider,
            open_mode = %self.state.open_mode,
            shortcuts = self.state.shortcuts.len(),
            "hydrated settings store"
        );
        self.persist();
    }

    #[tracing::instrument(skip(self))]
    pub fn set_provider(&mut self, value: &str) {
        self.state.provider = Provider::parse(value).unwrap_or_default();
        self.persist();
    }

    #[tracing::instrument(skip(self))]
    pub fn set_open_mode(&mut self, value: &str) {
        self.state.open_mode = OpenMode::coerce(value);
        self.persist();
    }

    #[tracing::instrument(skip(self, shortcuts), fields(count = shortcuts.len()))]
    pub fn set_shortcuts(&mut self, shortcuts: &[ShortcutEntry]) {
        self.state.shortcuts = normalize_shortcut_entries(shortcuts);
        self.persist();
    }

    /// Replaces the entry with the same id in place, or appends a new one.
    #[tracing::instrument(skip(self, item), fields(id = %item.id))]
    pub fn upsert_shortcut(&mut self, item: &ShortcutEntry) {
        let Some(entry) = normalize_shortcut(item) else {
            debug!("ignoring unidentifiable shortcut");
            return;
        };

        match self
            .state
            .shortcuts
            .iter_mut()
            .find(|existing| existing.id == entry.id)
        {
            Some(existing) => *existing = entry,
            None => self.state.shortcuts.push(entry),
        }
        self.persist();
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_shortcut(&mut self, id: &str) {
        let id = id.trim();
        let before = self.state.shortcuts.len();
        self.state.shortcuts.retain(|entry| entry.id != id);
        debug!(removed = before - self.state.shortcuts.len(), "deleted shortcut");
        self.persist();
    }

    /// Moves the named shortcuts to the front in the given order. Unknown
    /// ids are ignored and unnamed shortcuts keep their relative order after
    /// the named ones.
    #[tracing::instrument(skip(self, ids))]
    pub fn set_order<I, T>(&mut self, ids: I)
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut remaining: Vec<Option<ShortcutEntry>> = std::mem::take(&mut self.state.shortcuts)
            .into_iter()
            .map(Some)
            .collect();
        let mut ordered = Vec::with_capacity(remaining.len());

        for id in ids {
            let id = id.as_ref().trim();
            let slot = remaining
                .iter_mut()
                .find(|slot| slot.as_ref().is_some_and(|entry| entry.id == id));
            if let Some(entry) = slot.and_then(Option::take) {
                ordered.push(entry);
            }
        }

        ordered.extend(remaining.into_iter().flatten());
        self.state.shortcuts = ordered;
        self.persist();
    }

    /// Restores defaults and persists them.
    #[tracing::instrument(skip(self))]
    pub fn reset(&mut self) {
        self.state = SettingsSnapshot::default();
        self.persist();
    }

    fn persist(&self) {
        let json = match self.state.to_record_json() {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "failed serializing settings");
                return;
            }
        };
        if let Err(err) = self.storage.set_item(SETTINGS_STORAGE_KEY, &json) {
            warn!(error = %err, "failed persisting settings; keeping in-memory state");
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::storage::MemoryStorage;

    fn entry(id: &str) -> ShortcutEntry {
        ShortcutEntry::new(id, id.to_uppercase(), "", format!("https://{id}.example"))
    }

    fn hydrated_store() -> (MemoryStorage, SettingsStore<MemoryStorage>) {
        let storage = MemoryStorage::new();
        let mut store = SettingsStore::new(storage.clone());
        store.hydrate();
        (storage, store)
    }

    fn stored_value(storage: &MemoryStorage) -> Value {
        let raw = storage
            .get_item(SETTINGS_STORAGE_KEY)
            .expect("read")
            .expect("settings written");
        serde_json::from_str(&raw).expect("valid json")
    }

    #[test]
    fn set_order_is_a_stable_partial_reorder() {
        let (_, mut store) = hydrated_store();
        store.set_shortcuts(&[entry("a"), entry("b"), entry("c")]);

        store.set_order(["b", "a"]);
        assert_eq!(store.order(), vec!["b", "a", "c"]);

        store.set_order(["zzz", "c", "c"]);
        assert_eq!(store.order(), vec!["c", "b", "a"]);
    }

    #[test]
    fn upsert_updates_in_place_and_appends_new_ids() {
        let (_, mut store) = hydrated_store();
        store.set_shortcuts(&[entry("a"), entry("b")]);

        store.upsert_shortcut(&ShortcutEntry::new("a", "Alpha", "", ""));
        store.upsert_shortcut(&ShortcutEntry::new("", "New One", "", ""));
        store.upsert_shortcut(&ShortcutEntry::default());

        assert_eq!(store.order(), vec!["a", "b", "newone"]);
        assert_eq!(store.shortcuts()[0].label, "Alpha");
    }

    #[test]
    fn delete_removes_by_id() {
        let (storage, mut store) = hydrated_store();
        store.set_shortcuts(&[entry("a"), entry("b")]);
        store.delete_shortcut("a");
        store.delete_shortcut("missing");

        assert_eq!(store.order(), vec!["b"]);
        assert_eq!(stored_value(&storage)["shortcuts"][0]["id"], json!("b"));
    }

    #[test]
    fn invalid_enum_values_coerce_to_defaults() {
        let (_, mut store) = hydrated_store();
        store.set_provider("Bing");
        store.set_open_mode("new");
        assert_eq!(store.provider(), Provider::Bing);
        assert_eq!(store.open_mode(), OpenMode::New);

        store.set_provider("AltaVista");
        store.set_open_mode("tab");
        assert_eq!(store.provider(), Provider::Google);
        assert_eq!(store.open_mode(), OpenMode::Current);
    }

    #[test]
    fn mutations_persist_without_hydrate() {
        let storage = MemoryStorage::new();
        let mut store = SettingsStore::new(storage.clone());
        store.set_provider("Perplexity");
        assert!(!store.is_hydrated());
        assert_eq!(stored_value(&storage)["provider"], json!("Perplexity"));
        assert_eq!(storage.writes(), 1);

        store.set_order(["missing"]);
        assert_eq!(storage.writes(), 2);

        store.hydrate();
        assert_eq!(stored_value(&storage)["provider"], json!("Perplexity"));
    }

    #[test]
    fn reset_persists_defaults() {
        let storage = MemoryStorage::new();
        storage
            .set_item(
                SETTINGS_STORAGE_KEY,
                r#"{"provider":"Bing","openMode":"new","shortcuts":[{"id":"a"}]}"#,
            )
            .expect("seed");

        let mut store = SettingsStore::new(storage.clone());
        assert_eq!(store.provider(), Provider::Bing);
        store.reset();

        assert_eq!(store.snapshot(), &SettingsSnapshot::default());
        let stored = stored_value(&storage);
        assert_eq!(stored["provider"], json!("Google"));
        assert_eq!(stored["openMode"], json!("current"));
        assert_eq!(stored["shortcuts"], json!([]));
    }

    #[test]
    fn hydrate_is_idempotent() {
        let (storage, mut store) = hydrated_store();
        storage.remove_item(SETTINGS_STORAGE_KEY).expect("remove");
        store.hydrate();
        assert!(store.is_hydrated());
        assert!(storage.is_empty());
    }

    #[test]
    fn write_failures_keep_memory_state() {
        let (storage, mut store) = hydrated_store();
        storage.set_fail_writes(true);
        store.upsert_shortcut(&entry("a"));
        assert_eq!(store.order(), vec!["a"]);

        storage.set_fail_writes(false);
        store.set_open_mode("new");
        assert_eq!(stored_value(&storage)["shortcuts"][0]["id"], json!("a"));
    }

    #[test]
    fn record_carries_version() {
        let json = SettingsSnapshot::default()
            .to_record_json()
            .expect("serialize");
        let value: Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(value["version"], json!(SETTINGS_RECORD_VERSION));
    }

    #[test]
    fn persisted_shape_classification() {
        let legacy = PersistedSettings::from_value(&json!({"order": ["a", "b"]}));
        assert_eq!(legacy.version(), 1);

        let current = PersistedSettings::from_value(&json!({"shortcuts": [], "order": ["a"]}));
        assert_eq!(current.version(), 2);

        let declared =
            PersistedSettings::from_value(&json!({"version": 1, "order": ["a"], "shortcuts": []}));
        assert_eq!(declared.version(), 1);

        let future = PersistedSettings::from_value(&json!({"version": 9, "order": ["x"]}));
        assert_eq!(future.into_current().order(), vec!["x"]);
    }
}
