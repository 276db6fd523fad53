//! Background execution of submitted pipeline runs.
//!
//! `submit` stores the upload, records a pending task and queues a job on a
//! bounded channel. A dispatcher drains the queue and starts each job once a
//! worker permit is free; the pipeline itself runs on the blocking pool since
//! every stage is CPU-bound. Progress flows into the [`TaskStore`] as stages
//! complete.

use super::model::{Task, TaskError, TaskId, TaskSnapshot, TaskStatus};
use super::store::{InMemoryTaskStore, StoreError, TaskStore};
use crate::config::AppSettings;
use crate::export::{ExportFormat, ExportedFile};
use crate::ingest::SourceFormat;
use crate::integrity::hash_bytes;
use crate::pipeline::{PipelineConfig, PipelineInput, PipelineReport, Stage, run_pipeline};
use crate::utils::sanitize_name;
use crate::validation::ValidationSchema;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tracing::{Instrument as _, error, info, info_span, warn};
use uuid::Uuid;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A dataset and how to process it.
#[derive(Clone, Debug)]
pub struct Submission {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub format: SourceFormat,
    pub config: PipelineConfig,
    pub schema: Option<ValidationSchema>,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("task queue is closed")]
    QueueClosed,
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task {id} is {status}, results are only available once completed")]
    NotReady { id: TaskId, status: TaskStatus },

    #[error("task {id} has no {format} output")]
    FormatUnavailable { id: TaskId, format: ExportFormat },

    #[error("failed to read output: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-task directories under the work dir.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskDirs {
    pub root: PathBuf,
    pub upload: PathBuf,
    pub output: PathBuf,
    pub artifacts: PathBuf,
}

impl TaskDirs {
    pub fn new(work_dir: &Path, id: TaskId) -> Self {
        let root = work_dir.join(id.to_string());
        Self {
            upload: root.join("upload"),
            output: root.join("output"),
            artifacts: root.join("artifacts"),
            root,
        }
    }

    async fn create(&self) -> std::io::Result<()> {
        for dir in [&self.upload, &self.output, &self.artifacts] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }
}

/// Upload file name without any directory part, safe to join onto the upload dir.
fn upload_file_name(file_name: &str, format: SourceFormat) -> String {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map_or_else(|| "upload".to_owned(), sanitize_name);
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or_else(|| format.extension().to_owned(), str::to_lowercase);
    format!("{stem}.{}", sanitize_name(&extension))
}

struct Job {
    id: TaskId,
    source: PathBuf,
    format: SourceFormat,
    dirs: TaskDirs,
    config: PipelineConfig,
    schema: Option<ValidationSchema>,
}

impl Job {
    /// Runs the pipeline on the calling thread, reporting stage progress to `store`.
    fn run(&self, store: &dyn TaskStore) -> Result<PipelineReport, TaskError> {
        let input = PipelineInput {
            source: &self.source,
            format: self.format,
            schema: self.schema.as_ref(),
            output_dir: &self.dirs.output,
            artifacts_dir: &self.dirs.artifacts,
        };
        let mut on_stage = |stage: Stage| {
            if let Err(e) = store.advance(self.id, stage.checkpoint(), stage.message()) {
                warn!(id = %self.id, error = %e, "Failed to record progress");
            }
        };
        run_pipeline(&input, &self.config, &mut on_stage).map_err(|failure| TaskError::from(&failure))
    }
}

pub struct Orchestrator {
    store: Arc<dyn TaskStore>,
    queue: mpsc::Sender<Job>,
    work_dir: PathBuf,
}

impl Orchestrator {
    /// Starts the dispatcher on the current tokio runtime with an in-memory store.
    pub fn new(settings: &AppSettings) -> Self {
        Self::with_store(settings, Arc::new(InMemoryTaskStore::new()))
    }

    pub fn with_store(settings: &AppSettings, store: Arc<dyn TaskStore>) -> Self {
        let (queue, jobs) = mpsc::channel(settings.queue_capacity.max(1));
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_tasks.max(1)));
        // Exits once every sender is dropped and the queue is drained.
        tokio::spawn(dispatch(jobs, Arc::clone(&store), permits));
        info!(
            work_dir = %settings.work_dir.display(),
            workers = settings.max_concurrent_tasks,
            "Orchestrator started"
        );
        Self {
            store,
            queue,
            work_dir: settings.work_dir.clone(),
        }
    }

    pub fn task_dirs(&self, id: TaskId) -> TaskDirs {
        TaskDirs::new(&self.work_dir, id)
    }

    /// Stores the upload and queues the run. The task is `pending` on return.
    ///
    /// # Errors
    ///
    /// Fails when the upload cannot be written or the dispatcher has stopped.
    /// A task whose job could not be queued is marked failed.
    pub async fn submit(&self, submission: Submission) -> Result<TaskId, SubmitError> {
        let id = Uuid::new_v4();
        let dirs = self.task_dirs(id);
        dirs.create().await?;

        let source = dirs
            .upload
            .join(upload_file_name(&submission.file_name, submission.format));
        tokio::fs::write(&source, &submission.bytes).await?;

        self.store.insert(Task::new(id, submission.file_name.clone()))?;
        info!(%id, file = %submission.file_name, bytes = submission.bytes.len(), "Task submitted");

        let job = Job {
            id,
            source,
            format: submission.format,
            dirs,
            config: submission.config,
            schema: submission.schema,
        };
        if self.queue.send(job).await.is_err() {
            let error = TaskError::internal(Stage::Ingestion, "task queue is closed");
            if let Err(e) = self.store.fail(id, error) {
                warn!(%id, error = %e, "Failed to record queue failure");
            }
            return Err(SubmitError::QueueClosed);
        }
        Ok(id)
    }

    /// # Errors
    ///
    /// [`RetrievalError::NotFound`] for unknown ids.
    pub fn status(&self, id: TaskId) -> Result<TaskSnapshot, RetrievalError> {
        let task = self.store.get(id)?.ok_or(RetrievalError::NotFound(id))?;
        Ok(TaskSnapshot::from(&task))
    }

    /// Polls until the task is completed or failed.
    ///
    /// # Errors
    ///
    /// [`RetrievalError::NotFound`] for unknown ids.
    pub async fn wait(&self, id: TaskId) -> Result<TaskSnapshot, RetrievalError> {
        loop {
            let snapshot = self.status(id)?;
            if snapshot.status.is_terminal() {
                return Ok(snapshot);
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    fn completed_report(&self, id: TaskId) -> Result<PipelineReport, RetrievalError> {
        let task = self.store.get(id)?.ok_or(RetrievalError::NotFound(id))?;
        match (task.status, task.result) {
            (TaskStatus::Completed, Some(report)) => Ok(report),
            (status, _) => Err(RetrievalError::NotReady { id, status }),
        }
    }

    /// Bytes of an exported table, checked against the manifest checksum.
    ///
    /// # Errors
    ///
    /// [`RetrievalError::NotReady`] before completion,
    /// [`RetrievalError::FormatUnavailable`] when the format was not requested
    /// or failed to export, [`RetrievalError::Io`] when the file is gone or
    /// no longer matches its checksum.
    pub async fn fetch_output(
        &self,
        id: TaskId,
        format: ExportFormat,
    ) -> Result<Vec<u8>, RetrievalError> {
        let report = self.completed_report(id)?;
        let file = report
            .export
            .file(format)
            .cloned()
            .ok_or(RetrievalError::FormatUnavailable { id, format })?;
        read_verified(&file).await
    }

    /// Bytes of `report.json`.
    ///
    /// # Errors
    ///
    /// As for [`Self::fetch_output`]; a report that could not be written
    /// counts as unavailable.
    pub async fn fetch_report(&self, id: TaskId) -> Result<Vec<u8>, RetrievalError> {
        let report = self.completed_report(id)?;
        let path = report
            .export
            .report_file
            .ok_or(RetrievalError::NotReady {
                id,
                status: TaskStatus::Completed,
            })?;
        Ok(tokio::fs::read(path).await?)
    }
}

async fn read_verified(file: &ExportedFile) -> Result<Vec<u8>, RetrievalError> {
    let bytes = tokio::fs::read(&file.path).await?;
    if hash_bytes(&bytes) != file.sha256 {
        return Err(RetrievalError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{} does not match its recorded checksum", file.path.display()),
        )));
    }
    Ok(bytes)
}

async fn dispatch(
    mut jobs: mpsc::Receiver<Job>,
    store: Arc<dyn TaskStore>,
    permits: Arc<Semaphore>,
) {
    while let Some(job) = jobs.recv().await {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            error!("Worker pool closed, dropping queued tasks");
            break;
        };
        let store = Arc::clone(&store);
        let span = info_span!("task", id = %job.id);
        tokio::spawn(
            async move {
                execute(job, store).await;
                drop(permit);
            }
            .instrument(span),
        );
    }
}

async fn execute(job: Job, store: Arc<dyn TaskStore>) {
    let id = job.id;
    match store.mark_running(id) {
        Ok(true) => info!("Task started"),
        Ok(false) => {
            warn!("Task was not pending, skipping");
            return;
        }
        Err(e) => {
            error!(error = %e, "Failed to start task");
            return;
        }
    }

    let worker_store = Arc::clone(&store);
    let outcome = tokio::task::spawn_blocking(move || job.run(worker_store.as_ref())).await;

    let recorded = match outcome {
        Ok(Ok(report)) => {
            info!(summary = %report.summary(), "Task completed");
            store.complete(id, report)
        }
        Ok(Err(task_error)) => {
            warn!(kind = %task_error.kind, message = %task_error.message, "Task failed");
            store.fail(id, task_error)
        }
        Err(join_error) => {
            let stage = store
                .get(id)
                .ok()
                .flatten()
                .map_or(Stage::Ingestion, |t| t.current_stage());
            error!(error = %join_error, "Pipeline worker panicked");
            store.fail(id, TaskError::internal(stage, &format!("worker panicked: {join_error}")))
        }
    };
    if let Err(e) = recorded {
        error!(error = %e, "Failed to record task outcome");
    }
}
