use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Deserialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::task::{IdAllocator, Task, normalize_text};

pub const DEFAULT_KEY: &str = "tasks";

/// A local string-keyed store holding whole serialized values.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// One `<key>.json` file per key inside a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    pub data_dir: PathBuf,
}

impl FileStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened file store");
        Ok(Self { data_dir })
    }

    pub fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        validate_key(key)?;
        Ok(self.data_dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    #[tracing::instrument(skip(self))]
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(raw) => {
                debug!(file = %path.display(), bytes = raw.len(), "read stored value");
                Ok(Some(raw))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(file = %path.display(), "no stored value");
                Ok(None)
            }
            Err(err) => Err(err).with_context(|| format!("failed reading {}", path.display())),
        }
    }

    #[tracing::instrument(skip(self, value))]
    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        write_atomic(&path, value).with_context(|| format!("failed to save {key}"))
    }
}

/// Process-local store; nothing survives the value being dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let mut store = Self::new();
        store.entries.insert(key.to_string(), value.to_string());
        store
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub fn validate_key(key: &str) -> anyhow::Result<()> {
    if key.is_empty() {
        return Err(anyhow!("storage key cannot be empty"));
    }
    if key.starts_with('.') {
        return Err(anyhow!("storage key cannot start with '.': {key}"));
    }
    if let Some(bad) = key
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-')))
    {
        return Err(anyhow!("invalid character {bad:?} in storage key: {key}"));
    }
    Ok(())
}

#[tracing::instrument(skip(path, contents))]
fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
    debug!(file = %path.display(), bytes = contents.len(), "saving atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents.as_bytes())?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

/// Stored record shape. Older lists were written with `name` instead of
/// `text` and without ids.
#[derive(Debug, Deserialize)]
struct StoredTask {
    #[serde(default)]
    id: Option<u64>,
    #[serde(alias = "name")]
    text: String,
    #[serde(default)]
    checked: bool,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

pub fn encode_tasks(tasks: &[Task]) -> anyhow::Result<String> {
    serde_json::to_string(tasks).context("failed to serialize task list")
}

/// Parses a stored list. Missing or duplicate ids are replaced with fresh
/// ones from `ids`; blank records are dropped. Fails if a fresh id is
/// needed after `u64::MAX` is taken.
#[tracing::instrument(skip(raw, ids))]
pub fn decode_tasks(raw: &str, ids: &mut IdAllocator) -> anyhow::Result<Vec<Task>> {
    let records: Vec<StoredTask> =
        serde_json::from_str(raw).context("stored task list is not valid JSON")?;

    for id in records.iter().filter_map(|r| r.id) {
        ids.observe(id);
    }

    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(records.len());
    for (idx, record) in records.into_iter().enumerate() {
        let Some(text) = normalize_text(&record.text) else {
            warn!(index = idx, "dropping stored task with blank text");
            continue;
        };

        let id = match record.id {
            Some(id) if seen.insert(id) => id,
            other => {
                let fresh = ids
                    .next_id()
                    .with_context(|| format!("cannot assign an id to stored task {idx}"))?;
                if !seen.insert(fresh) {
                    return Err(anyhow!("fresh id {fresh} collides with a stored task"));
                }
                debug!(index = idx, stored = ?other, fresh, "assigned fresh task id");
                fresh
            }
        };

        out.push(Task {
            id,
            text,
            checked: record.checked,
            extra: record.extra,
        });
    }

    debug!(count = out.len(), "decoded task list");
    Ok(out)
}

/// Reads the list under `key`. Absent, blank or unreadable content yields
/// an empty list.
#[tracing::instrument(skip(storage, ids))]
pub fn load_tasks<S: KeyValueStore>(
    storage: &S,
    key: &str,
    ids: &mut IdAllocator,
) -> Vec<Task> {
    let raw = match storage.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(err) => {
            warn!(key, error = %format!("{err:#}"), "failed reading stored tasks; starting empty");
            return Vec::new();
        }
    };

    if raw.trim().is_empty() {
        return Vec::new();
    }

    match decode_tasks(&raw, ids) {
        Ok(tasks) => tasks,
        Err(err) => {
            warn!(key, error = %format!("{err:#}"), "stored tasks are corrupt; starting empty");
            Vec::new()
        }
    }
}
