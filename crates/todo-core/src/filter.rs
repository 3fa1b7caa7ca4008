use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{
  Deserialize,
  Serialize
};
use tracing::trace;

use crate::task::Task;

/// Which tasks the derived view shows.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize
)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
  #[default]
  All,
  Completed,
  Incompleted
}

impl FilterMode {
  pub const ALL_MODES: [FilterMode; 3] = [
    FilterMode::All,
    FilterMode::Completed,
    FilterMode::Incompleted
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      | FilterMode::All => "all",
      | FilterMode::Completed => {
        "completed"
      }
      | FilterMode::Incompleted => {
        "incompleted"
      }
    }
  }

  pub fn matches(
    self,
    task: &Task
  ) -> bool {
    let keep = match self {
      | FilterMode::All => true,
      | FilterMode::Completed => {
        task.checked
      }
      | FilterMode::Incompleted => {
        !task.checked
      }
    };
    trace!(
      mode = self.as_str(),
      id = task.id,
      keep,
      "filter evaluated"
    );
    keep
  }

  /// Tasks passing this filter, in list order.
  pub fn apply<'a>(
    self,
    tasks: &'a [Task]
  ) -> Vec<&'a Task> {
    tasks
      .iter()
      .filter(|task| self.matches(task))
      .collect()
  }
}

impl fmt::Display for FilterMode {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for FilterMode {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let wanted =
      s.trim().to_ascii_lowercase();
    Self::ALL_MODES
      .into_iter()
      .find(|mode| {
        mode.as_str() == wanted
      })
      .ok_or_else(|| {
        anyhow!(
          "unknown filter mode '{s}' \
           (expected all, completed \
           or incompleted)"
        )
      })
  }
}
