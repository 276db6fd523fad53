//! Task orchestration: submitted datasets run through the pipeline in the
//! background while callers poll for status and results.
//!
//! A task moves `pending → running → completed | failed` and never leaves a
//! terminal state. Progress rises through the stage checkpoints
//! (10, 30, 60, 75, 90) and reaches 100 only on completion; a failed task
//! keeps the last checkpoint it reached.
//!
//! ```no_run
//! use scrubline::config::AppSettings;
//! use scrubline::ingest::SourceFormat;
//! use scrubline::pipeline::PipelineConfig;
//! use scrubline::task::{Orchestrator, Submission};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let orchestrator = Orchestrator::new(&AppSettings::default());
//! let id = orchestrator
//!     .submit(Submission {
//!         file_name: "orders.csv".to_owned(),
//!         bytes: std::fs::read("orders.csv")?,
//!         format: SourceFormat::Csv,
//!         config: PipelineConfig::default(),
//!         schema: None,
//!     })
//!     .await?;
//! let snapshot = orchestrator.wait(id).await?;
//! println!("{} at {}%", snapshot.status, snapshot.progress);
//! # Ok(())
//! # }
//! ```

pub mod model;
pub mod orchestrator;
pub mod store;

pub use model::{Task, TaskError, TaskId, TaskSnapshot, TaskStatus};
pub use orchestrator::{Orchestrator, RetrievalError, SubmitError, Submission, TaskDirs};
pub use store::{InMemoryTaskStore, StoreError, TaskStore};
