//! Task records and the snapshots handed to callers.

use crate::pipeline::{PipelineReport, Stage, StageFailure};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TaskId = Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a task failed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskError {
    /// Error class such as `IngestionError`.
    pub kind: String,
    pub stage: Stage,
    /// Always starts with `"<stage> failed: "`.
    pub message: String,
}

impl TaskError {
    pub fn internal(stage: Stage, detail: &str) -> Self {
        Self {
            kind: "InternalError".to_owned(),
            stage,
            message: format!("{stage} failed: {detail}"),
        }
    }
}

impl From<&StageFailure> for TaskError {
    fn from(failure: &StageFailure) -> Self {
        Self {
            kind: failure.kind().to_owned(),
            stage: failure.stage,
            message: failure.to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub status: TaskStatus,
    /// 0 to 100, never decreasing; 100 only once completed.
    pub progress: u8,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub file_name: String,
    /// Present only when completed.
    pub result: Option<PipelineReport>,
    /// Present only when failed.
    pub error: Option<TaskError>,
}

impl Task {
    pub fn new(id: TaskId, file_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: TaskStatus::Pending,
            progress: 0,
            message: "Queued".to_owned(),
            created_at: now,
            updated_at: now,
            file_name: file_name.into(),
            result: None,
            error: None,
        }
    }

    /// The stage that was running when progress stopped at its current value.
    pub fn current_stage(&self) -> Stage {
        Stage::ALL
            .into_iter()
            .find(|s| s.checkpoint() > self.progress)
            .unwrap_or(Stage::Export)
    }
}

/// Read-only view of a task for status queries.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: String,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<TaskError>,
    pub result: Option<PipelineReport>,
}

impl From<&Task> for TaskSnapshot {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            status: task.status,
            progress: task.progress,
            message: task.message.clone(),
            file_name: task.file_name.clone(),
            created_at: task.created_at,
            updated_at: task.updated_at,
            error: task.error.clone(),
            result: task.result.clone(),
        }
    }
}
