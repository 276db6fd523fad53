//! Application settings for the task orchestrator and the binary.
//!
//! Settings are read from `settings.json` in the platform config directory (or
//! an explicit path) and then overridden from the environment:
//!
//! - `SCRUBLINE_WORK_DIR`: root of the per-task upload/output/artifact directories
//! - `SCRUBLINE_MAX_CONCURRENT_TASKS`: worker pool size

use anyhow::{Context as _, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ENV_WORK_DIR: &str = "SCRUBLINE_WORK_DIR";
pub const ENV_MAX_CONCURRENT_TASKS: &str = "SCRUBLINE_MAX_CONCURRENT_TASKS";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AppSettings {
    /// Each task gets `<work_dir>/<task_id>/{upload,output,artifacts}`.
    pub work_dir: PathBuf,
    /// Pipelines running at the same time.
    pub max_concurrent_tasks: usize,
    /// Submissions that may wait for a worker before `submit` blocks.
    pub queue_capacity: usize,
    /// Also write rolling log files under the data directory.
    pub log_to_file: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            max_concurrent_tasks: 2,
            queue_capacity: 64,
            log_to_file: false,
        }
    }
}

fn default_work_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("scrubline")
        .join("tasks")
}

pub fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("scrubline").join("settings.json"))
}

impl AppSettings {
    /// Loads settings from `path`, or from the default location when `None`.
    /// A missing default file gives the defaults; a missing explicit file is
    /// an error. Environment overrides are applied last.
    ///
    /// # Errors
    ///
    /// Fails on unreadable or malformed files and on invalid overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(p) => Self::from_file(p)?,
            None => match get_config_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Self::default(),
            },
        };
        settings.with_overrides(|key| std::env::var(key).ok())
    }

    /// # Errors
    ///
    /// Fails when the file cannot be read or is not valid settings JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings {}", path.display()))?;
        let settings = serde_json::from_str(&content)
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Applies overrides looked up through `var`.
    ///
    /// # Errors
    ///
    /// Fails when the concurrency override is not a positive integer.
    pub fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(dir) = var(ENV_WORK_DIR).filter(|v| !v.trim().is_empty()) {
            self.work_dir = PathBuf::from(dir);
        }
        if let Some(raw) = var(ENV_MAX_CONCURRENT_TASKS) {
            self.max_concurrent_tasks = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_MAX_CONCURRENT_TASKS} must be an integer, got '{raw}'"))?;
        }
        self.validate()?;
        Ok(self)
    }

    /// # Errors
    ///
    /// Fails when the pool or the queue would have no capacity.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_tasks == 0 {
            bail!("max_concurrent_tasks must be at least 1");
        }
        if self.queue_capacity == 0 {
            bail!("queue_capacity must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_partial_file_keeps_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"max_concurrent_tasks": 8}"#)?;

        let settings = AppSettings::from_file(&path)?;
        assert_eq!(settings.max_concurrent_tasks, 8);
        assert_eq!(settings.queue_capacity, AppSettings::default().queue_capacity);
        Ok(())
    }

    #[test]
    fn test_env_overrides() -> Result<()> {
        let settings = AppSettings::default().with_overrides(env(&[
            (ENV_WORK_DIR, "/srv/scrubline"),
            (ENV_MAX_CONCURRENT_TASKS, " 4 "),
        ]))?;
        assert_eq!(settings.work_dir, PathBuf::from("/srv/scrubline"));
        assert_eq!(settings.max_concurrent_tasks, 4);
        Ok(())
    }

    #[test]
    fn test_invalid_overrides_are_rejected() {
        assert!(
            AppSettings::default()
                .with_overrides(env(&[(ENV_MAX_CONCURRENT_TASKS, "many")]))
                .is_err()
        );
        assert!(
            AppSettings::default()
                .with_overrides(env(&[(ENV_MAX_CONCURRENT_TASKS, "0")]))
                .is_err()
        );
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        assert!(AppSettings::load(Some(Path::new("/nonexistent/settings.json"))).is_err());
    }
}
