use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque task identifier.
///
/// Stored as a plain string so collections written by older builds, which
/// used millisecond timestamps as ids, still load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    id: TaskId,
    text: String,
    completed: bool,
    created_at: String,
}

impl Task {
    pub fn new(id: TaskId, text: String, created_at: String) -> Self {
        Self {
            id,
            text,
            completed: false,
            created_at,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    pub(crate) fn toggle_completed(&mut self) {
        self.completed = !self.completed;
    }
}
