//! Task registry.
//!
//! All transitions go through [`TaskStore`] so their rules live in one place:
//! a task starts at most once, progress never goes backwards, and a terminal
//! task is never changed again.

use super::model::{Task, TaskError, TaskId, TaskStatus};
use crate::pipeline::PipelineReport;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use tracing::debug;

/// Progress of any task that has not completed.
pub const MAX_RUNNING_PROGRESS: u8 = 99;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task {id} already exists")]
    Duplicate { id: TaskId },

    #[error("task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("task store lock poisoned")]
    Poisoned,
}

pub trait TaskStore: Send + Sync {
    /// # Errors
    ///
    /// [`StoreError::Duplicate`] when the id is taken.
    fn insert(&self, task: Task) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Only when the store itself is unusable.
    fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// Compare-and-set `pending → running`. `Ok(false)` when the task is not
    /// pending, which means someone else already started it.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for unknown ids.
    fn mark_running(&self, id: TaskId) -> Result<bool, StoreError>;

    /// Raises progress to `progress` (capped below 100) and sets the message.
    /// Lower values than the current one are ignored.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidTransition`] unless the task is running.
    fn advance(&self, id: TaskId, progress: u8, message: &str) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// [`StoreError::InvalidTransition`] unless the task is running.
    fn complete(&self, id: TaskId, report: PipelineReport) -> Result<(), StoreError>;

    /// Progress stays where it was.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidTransition`] when the task is already terminal.
    fn fail(&self, id: TaskId, error: TaskError) -> Result<(), StoreError>;
}

/// Process-local store behind a single lock.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<T>(
        &self,
        id: TaskId,
        f: impl FnOnce(&mut Task) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut tasks = self.tasks.write().map_err(|_poisoned| StoreError::Poisoned)?;
        let task = tasks.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        f(task)
    }
}

fn require(task: &Task, expected: TaskStatus, to: TaskStatus) -> Result<(), StoreError> {
    if task.status == expected {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition {
            id: task.id,
            from: task.status,
            to,
        })
    }
}

impl TaskStore for InMemoryTaskStore {
    fn insert(&self, task: Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().map_err(|_poisoned| StoreError::Poisoned)?;
        if tasks.contains_key(&task.id) {
            return Err(StoreError::Duplicate { id: task.id });
        }
        tasks.insert(task.id, task);
        Ok(())
    }

    fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let tasks = self.tasks.read().map_err(|_poisoned| StoreError::Poisoned)?;
        Ok(tasks.get(&id).cloned())
    }

    fn mark_running(&self, id: TaskId) -> Result<bool, StoreError> {
        self.update(id, |task| {
            if task.status != TaskStatus::Pending {
                return Ok(false);
            }
            task.status = TaskStatus::Running;
            task.message = "Running".to_owned();
            task.updated_at = Utc::now();
            Ok(true)
        })
    }

    fn advance(&self, id: TaskId, progress: u8, message: &str) -> Result<(), StoreError> {
        self.update(id, |task| {
            require(task, TaskStatus::Running, TaskStatus::Running)?;
            let progress = progress.min(MAX_RUNNING_PROGRESS);
            if progress >= task.progress {
                task.progress = progress;
                message.clone_into(&mut task.message);
                task.updated_at = Utc::now();
                debug!(%id, progress, message, "Task progress");
            }
            Ok(())
        })
    }

    fn complete(&self, id: TaskId, report: PipelineReport) -> Result<(), StoreError> {
        self.update(id, |task| {
            require(task, TaskStatus::Running, TaskStatus::Completed)?;
            task.status = TaskStatus::Completed;
            task.progress = 100;
            task.message = "Completed".to_owned();
            task.result = Some(report);
            task.updated_at = Utc::now();
            Ok(())
        })
    }

    fn fail(&self, id: TaskId, error: TaskError) -> Result<(), StoreError> {
        self.update(id, |task| {
            if task.status.is_terminal() {
                return Err(StoreError::InvalidTransition {
                    id,
                    from: task.status,
                    to: TaskStatus::Failed,
                });
            }
            task.status = TaskStatus::Failed;
            task.message.clone_from(&error.message);
            task.error = Some(error);
            task.updated_at = Utc::now();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used)]
    use super::*;
    use crate::pipeline::Stage;
    use std::sync::Arc;
    use uuid::Uuid;

    fn running(store: &InMemoryTaskStore) -> TaskId {
        let id = Uuid::new_v4();
        store.insert(Task::new(id, "data.csv")).unwrap();
        assert!(store.mark_running(id).unwrap());
        id
    }

    #[test]
    fn test_mark_running_only_once() {
        let store = Arc::new(InMemoryTaskStore::new());
        let id = Uuid::new_v4();
        store.insert(Task::new(id, "data.csv")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.mark_running(id).unwrap())
            })
            .collect();
        let started = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(started, 1);
    }

    #[test]
    fn test_progress_never_decreases() {
        let store = InMemoryTaskStore::new();
        let id = running(&store);
        store.advance(id, 30, "Profile computed").unwrap();
        store.advance(id, 10, "Dataset loaded").unwrap();
        let task = store.get(id).unwrap().unwrap();
        assert_eq!(task.progress, 30);
        assert_eq!(task.message, "Profile computed");

        store.advance(id, 100, "Export complete").unwrap();
        assert_eq!(store.get(id).unwrap().unwrap().progress, MAX_RUNNING_PROGRESS);
    }

    #[test]
    fn test_failure_keeps_progress_and_is_final() {
        let store = InMemoryTaskStore::new();
        let id = running(&store);
        store.advance(id, 60, "Cleaning applied").unwrap();
        store
            .fail(id, TaskError::internal(Stage::FeatureAdvice, "boom"))
            .unwrap();

        let task = store.get(id).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.progress, 60);
        assert_eq!(task.message, "feature advice failed: boom");

        assert!(matches!(
            store.fail(id, TaskError::internal(Stage::Export, "again")),
            Err(StoreError::InvalidTransition { .. })
        ));
        assert!(store.advance(id, 90, "Validation finished").is_err());
        assert!(!store.mark_running(id).unwrap());
    }

    #[test]
    fn test_unknown_and_duplicate_ids() {
        let store = InMemoryTaskStore::new();
        let id = Uuid::new_v4();
        assert_eq!(store.mark_running(id), Err(StoreError::NotFound(id)));
        assert_eq!(store.get(id).unwrap(), None);

        store.insert(Task::new(id, "a.csv")).unwrap();
        assert_eq!(
            store.insert(Task::new(id, "b.csv")),
            Err(StoreError::Duplicate { id })
        );
        assert_eq!(store.get(id).unwrap().map(|t| t.file_name), Some("a.csv".to_owned()));
    }
}
