use homedash_core::storage::{FileStorage, MemoryStorage, Storage};
use homedash_core::tasks::{TASKS_STORAGE_KEY, TaskStore};
use serde_json::{Value, json};
use tempfile::tempdir;

#[test]
fn snapshot_survives_reopen() {
    let temp = tempdir().expect("tempdir");
    let storage = FileStorage::open(temp.path()).expect("open storage");

    let mut store = TaskStore::open(storage.clone());
    let project = store.add_project("Garden");
    let list = store.add_list("Spring", Some(&project));
    let task = store.add_task("Plant tomatoes", Some(&list));
    store.toggle_task(&task);

    let reopened = TaskStore::open(FileStorage::open(temp.path()).expect("reopen"));
    assert_eq!(reopened.projects().len(), 1);
    assert_eq!(reopened.lists_by_project(Some(&project))[0].title, "Spring");
    let tasks = reopened.tasks_by_list(Some(&list));
    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].done);
    assert!(reopened.state().last_loaded_at.is_some());
    assert!(reopened.state().last_saved_at.is_some());
}

#[test]
fn persisted_shape_uses_camel_case_keys() {
    let storage = MemoryStorage::new();
    let mut store = TaskStore::new(storage.clone());
    let list = store.add_list("Inbox", None);
    store.add_task("hello", Some(&list));

    let raw = storage
        .get_item(TASKS_STORAGE_KEY)
        .expect("read")
        .expect("snapshot saved");
    let value: Value = serde_json::from_str(&raw).expect("json");

    assert_eq!(value["order"]["lists"], json!([list.clone()]));
    assert_eq!(value["order"]["tasks"], json!([]));
    assert_eq!(value["lists"][&list]["taskIds"].as_array().map(Vec::len), Some(1));
    assert!(value["lastSavedAt"].is_i64());
    let task = value["tasks"]
        .as_object()
        .and_then(|tasks| tasks.values().next())
        .expect("one task");
    assert_eq!(task["listId"], json!(list));
    assert_eq!(task["done"], json!(false));
}

#[test]
fn cascade_delete_leaves_no_trace_after_reload() {
    let storage = MemoryStorage::new();
    let mut store = TaskStore::new(storage.clone());
    let project = store.add_project("P");
    let list = store.add_list("L", Some(&project));
    let task = store.add_task("T", Some(&list));
    store.delete_project(&project);
    store.delete_project(&project);

    let reloaded = TaskStore::open(storage);
    assert!(reloaded.task(&task).is_none());
    assert!(reloaded.list(&list).is_none());
    assert!(reloaded.project(&project).is_none());
    assert!(reloaded.state().is_empty());
    let order = &reloaded.state().order;
    assert!(order.tasks.is_empty() && order.lists.is_empty() && order.projects.is_empty());
}

#[test]
fn unreadable_snapshot_leaves_state_untouched() {
    let storage = MemoryStorage::new();
    let mut store = TaskStore::new(storage.clone());
    let id = store.add_task("keep me", None);

    storage
        .set_item(TASKS_STORAGE_KEY, "{broken")
        .expect("corrupt storage");
    store.load();
    assert!(store.task(&id).is_some());

    storage.remove_item(TASKS_STORAGE_KEY).expect("clear");
    store.load();
    assert!(store.task(&id).is_some());
}

#[test]
fn load_repairs_hand_edited_snapshot() {
    let storage = MemoryStorage::new();
    storage
        .set_item(
            TASKS_STORAGE_KEY,
            &json!({
                "tasks": {
                    "t1": {
                        "id": "t1", "title": "loose", "listId": "l1",
                        "createdAt": 5, "updatedAt": 5
                    },
                    "t2": {"id": "t2", "title": "top", "createdAt": 1, "updatedAt": 1}
                },
                "lists": {
                    "l1": {
                        "id": "l1", "title": "L", "projectId": "p-missing", "taskIds": [],
                        "createdAt": 1, "updatedAt": 1
                    }
                },
                "projects": {},
                "order": {"tasks": ["t2", "ghost"], "lists": [], "projects": ["ghost"]}
            })
            .to_string(),
        )
        .expect("seed");

    let store = TaskStore::open(storage);
    let list = store.list("l1").expect("list kept");
    assert_eq!(list.project_id, None);
    assert_eq!(list.task_ids, vec!["t1".to_string()]);
    assert_eq!(store.ungrouped_lists().len(), 1);
    assert_eq!(store.state().order.tasks, vec!["t2".to_string()]);
    assert!(store.state().order.projects.is_empty());
}

#[test]
fn mismatched_entity_id_follows_its_key() {
    let storage = MemoryStorage::new();
    storage
        .set_item(
            TASKS_STORAGE_KEY,
            &json!({
                "tasks": {"k": {"id": "other", "title": "t", "listId": "l1"}},
                "lists": {"l1": {"id": "l1", "title": "L", "taskIds": []}}
            })
            .to_string(),
        )
        .expect("seed");

    let mut store = TaskStore::open(storage);
    assert_eq!(store.task("k").expect("task").id, "k");
    assert_eq!(store.tasks_by_list(Some("l1")).len(), 1);

    store.delete_list("l1");
    assert!(store.state().tasks.is_empty());
    assert!(store.state().lists.is_empty());
}

#[test]
fn failed_writes_keep_memory_state() {
    let storage = MemoryStorage::new();
    let mut store = TaskStore::new(storage.clone());
    storage.set_fail_writes(true);

    let id = store.add_task("offline", None);
    assert!(store.task(&id).is_some());
    assert_eq!(store.state().last_saved_at, None);
    assert_eq!(storage.get_item(TASKS_STORAGE_KEY).expect("read"), None);
}
