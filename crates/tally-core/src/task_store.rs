use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::clock::{Clock, TimestampFormat};
use crate::storage::{KeyValueStore, TASKS_KEY};
use crate::task::{Task, TaskId};

/// Ordered task collection, written through to `S` after every change.
///
/// Every mutation rewrites the whole collection under [`TASKS_KEY`]. A write
/// that fails keeps the in-memory change and is reported through
/// [`TaskStore::last_persist_error`] until a later write succeeds.
#[derive(Debug)]
pub struct TaskStore<S, C> {
    storage: S,
    clock: C,
    format: TimestampFormat,
    tasks: Vec<Task>,
    last_persist_error: Option<String>,
}

impl<S: KeyValueStore, C: Clock> TaskStore<S, C> {
    #[tracing::instrument(skip_all)]
    pub fn hydrate(storage: S, clock: C, format: TimestampFormat) -> Self {
        let tasks = match storage.read(TASKS_KEY) {
            Ok(Some(raw)) => decode_tasks(&raw),
            Ok(None) => {
                debug!("no stored tasks; starting empty");
                Vec::new()
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed reading stored tasks; starting empty");
                Vec::new()
            }
        };

        info!(count = tasks.len(), "hydrated task store");
        Self {
            storage,
            clock,
            format,
            tasks,
            last_persist_error: None,
        }
    }

    /// Appends a task built from `raw` unless it is blank after trimming.
    #[tracing::instrument(skip(self, raw))]
    pub fn add(&mut self, raw: &str) -> Option<&Task> {
        let text = raw.trim();
        if text.is_empty() {
            debug!("rejected blank task text");
            return None;
        }

        let id = self.fresh_id();
        let created_at = self.format.render(self.clock.now());
        let task = Task::new(id, text.to_string(), created_at);
        debug!(id = %task.id(), "task added");

        self.tasks.push(task);
        self.persist();
        self.tasks.last()
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn toggle(&mut self, id: &TaskId) -> bool {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id() == id) else {
            debug!("toggle target not found");
            return false;
        };

        task.toggle_completed();
        debug!(completed = task.is_completed(), "task toggled");
        self.persist();
        true
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn delete(&mut self, id: &TaskId) -> bool {
        let Some(idx) = self.tasks.iter().position(|t| t.id() == id) else {
            debug!("delete target not found");
            return false;
        };

        self.tasks.remove(idx);
        debug!(remaining = self.tasks.len(), "task deleted");
        self.persist();
        true
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id() == id)
    }

    pub fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_completed()).count()
    }

    pub fn total_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Share of completed tasks in `0.0..=100.0`; zero for an empty list.
    pub fn progress_percent(&self) -> f64 {
        let total = self.total_count();
        if total == 0 {
            return 0.0;
        }
        self.completed_count() as f64 / total as f64 * 100.0
    }

    pub fn last_persist_error(&self) -> Option<&str> {
        self.last_persist_error.as_deref()
    }

    fn fresh_id(&self) -> TaskId {
        loop {
            let id = TaskId::generate();
            if self.get(&id).is_none() {
                return id;
            }
            warn!(id = %id, "generated id already in use; retrying");
        }
    }

    fn persist(&mut self) {
        let result = serde_json::to_string(&self.tasks)
            .map_err(anyhow::Error::from)
            .and_then(|encoded| self.storage.write(TASKS_KEY, &encoded));

        match result {
            Ok(()) => {
                if self.last_persist_error.take().is_some() {
                    info!("task persistence recovered");
                }
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(error = %message, "failed to persist tasks; keeping changes in memory");
                self.last_persist_error = Some(message);
            }
        }
    }
}

/// Parses a stored collection. Anything unreadable counts as no collection.
fn decode_tasks(raw: &str) -> Vec<Task> {
    let parsed: Vec<Task> = match serde_json::from_str(raw) {
        Ok(tasks) => tasks,
        Err(err) => {
            warn!(error = %err, "stored tasks are corrupt; starting empty");
            return Vec::new();
        }
    };

    let before = parsed.len();
    let parsed: Vec<Task> = parsed
        .into_iter()
        .filter(|task| !task.text().trim().is_empty())
        .collect();
    if parsed.len() != before {
        warn!(
            dropped = before - parsed.len(),
            "dropped stored tasks with blank text"
        );
    }

    let mut seen = HashSet::with_capacity(parsed.len());
    let before = parsed.len();
    let tasks: Vec<Task> = parsed
        .into_iter()
        .filter(|task| seen.insert(task.id().clone()))
        .collect();

    if tasks.len() != before {
        warn!(
            dropped = before - tasks.len(),
            "dropped tasks with duplicate ids"
        );
    }
    tasks
}
