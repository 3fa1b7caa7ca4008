use anyhow::Context;
use tracing::{debug, info, warn};

use crate::filter::FilterMode;
use crate::storage::{self, KeyValueStore};
use crate::task::{IdAllocator, Task, normalize_text};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    pub total: usize,
    pub completed: usize,
    pub incompleted: usize,
}

/// Owns the ordered task list and the active view filter, and writes the
/// full list to its backing store after every change to the list.
///
/// Mutations that fail validation or miss their target return `Ok(false)`
/// (or `Ok(None)` for [`TaskStore::add_task`]) and leave storage untouched.
/// If the write itself fails the change stays applied in memory and the
/// error is returned.
#[derive(Debug)]
pub struct TaskStore<S: KeyValueStore> {
    storage: S,
    key: String,
    tasks: Vec<Task>,
    filter: FilterMode,
    ids: IdAllocator,
}

impl<S: KeyValueStore> TaskStore<S> {
    pub fn open(storage: S) -> anyhow::Result<Self> {
        Self::open_with_key(storage, storage::DEFAULT_KEY)
    }

    #[tracing::instrument(skip(storage))]
    pub fn open_with_key(storage: S, key: &str) -> anyhow::Result<Self> {
        storage::validate_key(key).context("invalid storage key")?;

        let mut ids = IdAllocator::new();
        let tasks = storage::load_tasks(&storage, key, &mut ids);
        info!(key, count = tasks.len(), "loaded task list");

        Ok(Self {
            storage,
            key: key.to_string(),
            tasks,
            filter: FilterMode::default(),
            ids,
        })
    }

    #[tracing::instrument(skip(self, text))]
    pub fn add_task(&mut self, text: &str) -> anyhow::Result<Option<u64>> {
        let Some(text) = normalize_text(text) else {
            debug!("rejected blank task text");
            return Ok(None);
        };
        let id = self.ids.next_id()?;

        self.tasks.push(Task::from_normalized(id, text));
        info!(id, count = self.tasks.len(), "task added");
        self.persist()?;
        Ok(Some(id))
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_task(&mut self, id: u64) -> anyhow::Result<bool> {
        let Some(idx) = self.position(id) else {
            debug!("delete missed");
            return Ok(false);
        };

        self.tasks.remove(idx);
        info!(count = self.tasks.len(), "task deleted");
        self.persist()?;
        Ok(true)
    }

    #[tracing::instrument(skip(self))]
    pub fn toggle_task(&mut self, id: u64) -> anyhow::Result<bool> {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!("toggle missed");
            return Ok(false);
        };

        task.checked = !task.checked;
        info!(checked = task.checked, "task toggled");
        self.persist()?;
        Ok(true)
    }

    #[tracing::instrument(skip(self, new_text))]
    pub fn rename_task(&mut self, id: u64, new_text: &str) -> anyhow::Result<bool> {
        let Some(text) = normalize_text(new_text) else {
            debug!("rejected blank rename");
            return Ok(false);
        };
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!("rename missed");
            return Ok(false);
        };

        task.text = text;
        info!("task renamed");
        self.persist()?;
        Ok(true)
    }

    /// Moves the task at `from` so it ends up at `to`: it is removed first,
    /// then inserted into the shortened list. Both indices must be below
    /// the list length; otherwise nothing happens.
    #[tracing::instrument(skip(self))]
    pub fn reorder_task(&mut self, from: usize, to: usize) -> anyhow::Result<bool> {
        let len = self.tasks.len();
        if from >= len || to >= len {
            warn!(len, "reorder index out of range; ignored");
            return Ok(false);
        }
        if from == to {
            return Ok(true);
        }

        let task = self.tasks.remove(from);
        self.tasks.insert(to, task);
        info!("task moved");
        self.persist()?;
        Ok(true)
    }

    /// Drag-and-drop move expressed in positions of the current filtered
    /// view: the dragged task takes the list position of the drop target.
    #[tracing::instrument(skip(self))]
    pub fn reorder_visible(&mut self, from: usize, to: usize) -> anyhow::Result<bool> {
        let visible = self.visible_positions();
        let (Some(&list_from), Some(&list_to)) = (visible.get(from), visible.get(to)) else {
            warn!(visible = visible.len(), "view index out of range; ignored");
            return Ok(false);
        };

        debug!(list_from, list_to, "mapped view move onto list");
        self.reorder_task(list_from, list_to)
    }

    pub fn set_filter(&mut self, mode: FilterMode) {
        debug!(mode = %mode, "filter set");
        self.filter = mode;
    }

    /// String form of [`TaskStore::set_filter`]; unknown modes are ignored.
    pub fn set_filter_str(&mut self, mode: &str) -> bool {
        match mode.parse::<FilterMode>() {
            Ok(mode) => {
                self.set_filter(mode);
                true
            }
            Err(err) => {
                debug!(error = %err, "filter unchanged");
                false
            }
        }
    }

    pub fn filtered_view(&self) -> Vec<&Task> {
        self.filter.apply(&self.tasks)
    }

    pub fn filter(&self) -> FilterMode {
        self.filter
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn position(&self, id: u64) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn counts(&self) -> TaskCounts {
        let completed = self.tasks.iter().filter(|t| t.checked).count();
        TaskCounts {
            total: self.tasks.len(),
            completed,
            incompleted: self.tasks.len() - completed,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn visible_positions(&self) -> Vec<usize> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| self.filter.matches(task))
            .map(|(idx, _)| idx)
            .collect()
    }

    fn persist(&mut self) -> anyhow::Result<()> {
        let payload = storage::encode_tasks(&self.tasks)?;
        if let Err(err) = self.storage.set(&self.key, &payload) {
            warn!(key = %self.key, error = %format!("{err:#}"), "failed to persist task list");
            return Err(err.context("in-memory change kept but not saved"));
        }
        debug!(key = %self.key, count = self.tasks.len(), "persisted task list");
        Ok(())
    }
}
