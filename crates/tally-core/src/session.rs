use tracing::{debug, instrument};

use crate::clock::{Clock, TimestampFormat};
use crate::storage::KeyValueStore;
use crate::task::{Task, TaskId};
use crate::task_store::TaskStore;
use crate::theme::{ColorSchemeProbe, Theme, ThemePreference};

/// One user event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Add(String),
    Toggle(TaskId),
    Delete(TaskId),
    ToggleTheme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Changed,
    Ignored,
}

/// Settled view of the session handed to the renderer.
#[derive(Debug, Clone, Copy)]
pub struct Board<'a> {
    pub tasks: &'a [Task],
    pub completed: usize,
    pub total: usize,
    pub progress_percent: f64,
    pub theme: Theme,
}

/// The task list and theme preference of one running front end, both
/// backed by the same store.
#[derive(Debug)]
pub struct Session<S, C> {
    tasks: TaskStore<S, C>,
    theme: ThemePreference<S>,
}

impl<S, C> Session<S, C>
where
    S: KeyValueStore + Clone,
    C: Clock,
{
    #[instrument(skip_all)]
    pub fn open(
        storage: S,
        clock: C,
        format: TimestampFormat,
        probe: &dyn ColorSchemeProbe,
    ) -> Self {
        let theme = ThemePreference::initialize(storage.clone(), probe);
        let tasks = TaskStore::hydrate(storage, clock, format);
        Self { tasks, theme }
    }

    /// Runs one event to completion.
    #[instrument(skip(self))]
    pub fn apply(&mut self, action: Action) -> Outcome {
        let changed = match action {
            Action::Add(text) => self.tasks.add(&text).is_some(),
            Action::Toggle(id) => self.tasks.toggle(&id),
            Action::Delete(id) => self.tasks.delete(&id),
            Action::ToggleTheme => {
                self.theme.toggle();
                true
            }
        };

        let outcome = if changed {
            Outcome::Changed
        } else {
            Outcome::Ignored
        };
        debug!(?outcome, "action applied");
        outcome
    }

    pub fn tasks(&self) -> &TaskStore<S, C> {
        &self.tasks
    }

    pub fn theme(&self) -> Theme {
        self.theme.theme()
    }

    pub fn board(&self) -> Board<'_> {
        Board {
            tasks: self.tasks.tasks(),
            completed: self.tasks.completed_count(),
            total: self.tasks.total_count(),
            progress_percent: self.tasks.progress_percent(),
            theme: self.theme.theme(),
        }
    }

    /// Persistence problems left over from the events applied so far.
    pub fn persistence_warnings(&self) -> Vec<String> {
        [
            self.tasks.last_persist_error(),
            self.theme.last_persist_error(),
        ]
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect()
    }
}
