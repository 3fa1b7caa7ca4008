use std::collections::BTreeMap;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: u64,

    #[serde(alias = "name")]
    pub text: String,

    #[serde(default)]
    pub checked: bool,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Task {
    /// Builds an unchecked task. Returns `None` when `text` is blank; the
    /// stored text is always trimmed.
    pub fn new(id: u64, text: &str) -> Option<Self> {
        normalize_text(text).map(|text| Self::from_normalized(id, text))
    }

    /// `text` must already have gone through [`normalize_text`].
    pub fn from_normalized(id: u64, text: String) -> Self {
        Self {
            id,
            text,
            checked: false,
            extra: BTreeMap::new(),
        }
    }
}

pub fn normalize_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Hands out task ids derived from the wall clock in milliseconds, never
/// repeating or going backwards within one allocator's lifetime.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    last: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `id` as issued so later allocations stay above it.
    pub fn observe(&mut self, id: u64) {
        self.last = self.last.max(id);
    }

    /// Fails once `u64::MAX` has been issued or observed.
    pub fn next_id_at(&mut self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let floor = self
            .last
            .checked_add(1)
            .ok_or_else(|| anyhow!("task ids exhausted (last issued {})", self.last))?;
        let clock = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let id = clock.max(floor);
        self.last = id;
        Ok(id)
    }

    pub fn next_id(&mut self) -> anyhow::Result<u64> {
        self.next_id_at(Utc::now())
    }
}
