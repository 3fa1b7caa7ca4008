use std::fs;

use tempfile::tempdir;
use todo_core::filter::FilterMode;
use todo_core::storage::{FileStore, KeyValueStore, MemoryStore};
use todo_core::store::TaskStore;

fn texts<S: KeyValueStore>(store: &TaskStore<S>) -> Vec<String> {
    store.tasks().iter().map(|t| t.text.clone()).collect()
}

#[test]
fn file_store_reopen_reproduces_list() {
    let temp = tempdir().expect("tempdir");

    let (milk, ids_before) = {
        let backend = FileStore::open(temp.path()).expect("open file store");
        let mut store = TaskStore::open(backend).expect("open task store");

        let milk = store.add_task("Buy milk").expect("add").expect("id");
        store.add_task("Walk dog").expect("add");
        store.add_task("Call mum").expect("add");
        store.toggle_task(milk).expect("toggle");
        store.reorder_task(0, 2).expect("reorder");
        store.set_filter(FilterMode::Completed);

        let ids: Vec<u64> = store.tasks().iter().map(|t| t.id).collect();
        (milk, ids)
    };

    let backend = FileStore::open(temp.path()).expect("reopen file store");
    let mut store = TaskStore::open(backend).expect("reopen task store");

    assert_eq!(texts(&store), vec!["Walk dog", "Call mum", "Buy milk"]);
    assert_eq!(
        store.tasks().iter().map(|t| t.id).collect::<Vec<_>>(),
        ids_before
    );
    assert!(store.get(milk).expect("milk").checked);
    assert_eq!(store.filter(), FilterMode::All);

    let fresh = store.add_task("New").expect("add").expect("id");
    assert!(ids_before.iter().all(|id| *id < fresh));
}

#[test]
fn corrupt_file_opens_empty_and_is_overwritten() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("tasks.json");
    fs::write(&path, "[{\"id\": 1, \"text\": ").expect("write corrupt");

    let mut store = TaskStore::open(FileStore::open(temp.path()).expect("open")).expect("open");
    assert!(store.is_empty());
    assert_eq!(
        fs::read_to_string(&path).expect("untouched"),
        "[{\"id\": 1, \"text\": "
    );

    let id = store.add_task("fresh start").expect("add").expect("id");
    let saved = fs::read_to_string(&path).expect("read");
    assert_eq!(
        saved,
        format!(r#"[{{"id":{id},"text":"fresh start","checked":false}}]"#)
    );
}

#[test]
fn legacy_local_state_records_load_under_their_key() {
    let raw = r#"[{"text":"Buy milk","checked":true},{"text":"Walk dog","checked":false}]"#;
    let backend = MemoryStore::with_entry("TodoTasks", raw);
    let mut store = TaskStore::open_with_key(backend, "TodoTasks").expect("open");

    assert_eq!(texts(&store), vec!["Buy milk", "Walk dog"]);
    assert_ne!(store.tasks()[0].id, store.tasks()[1].id);

    store.set_filter(FilterMode::Incompleted);
    let view: Vec<&str> = store.filtered_view().iter().map(|t| t.text.as_str()).collect();
    assert_eq!(view, vec!["Walk dog"]);

    let dog = store.tasks()[1].id;
    store.toggle_task(dog).expect("toggle");
    let saved = store
        .storage()
        .get("TodoTasks")
        .expect("get")
        .expect("saved value");
    assert!(saved.contains(&format!(r#""id":{dog}"#)));
    assert!(saved.contains(r#""text":"Walk dog","checked":true"#));
}

#[test]
fn add_toggle_then_filter_both_ways() {
    let mut store = TaskStore::open(MemoryStore::new()).expect("open");
    let milk = store.add_task("Buy milk").expect("add").expect("id");
    store.add_task("Walk dog").expect("add");
    store.toggle_task(milk).expect("toggle");

    store.set_filter(FilterMode::Completed);
    let completed: Vec<(&str, bool)> = store
        .filtered_view()
        .iter()
        .map(|t| (t.text.as_str(), t.checked))
        .collect();
    assert_eq!(completed, vec![("Buy milk", true)]);

    store.set_filter(FilterMode::Incompleted);
    let remaining: Vec<&str> = store.filtered_view().iter().map(|t| t.text.as_str()).collect();
    assert_eq!(remaining, vec!["Walk dog"]);

    store.set_filter(FilterMode::All);
    assert_eq!(store.filtered_view().len(), store.len());
}

#[test]
fn invalid_storage_key_is_refused() {
    assert!(TaskStore::open_with_key(MemoryStore::new(), "../tasks").is_err());
}
