use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};
use scrubline::config::AppSettings;
use scrubline::ingest::{IngestOptions, SourceFormat, ingest_file};
use scrubline::pipeline::PipelineConfig;
use scrubline::profiling::{profile, visuals::render_visuals};
use scrubline::task::{Orchestrator, Submission, TaskStatus};
use scrubline::validation::{ValidationSchema, validate};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "scrubline", version, about = "Profile, clean, validate and export tabular data")]
pub struct Cli {
    /// Settings file. Defaults to `settings.json` in the platform config directory.
    #[arg(long, global = true, env = "SCRUBLINE_SETTINGS")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline as a task and print the final task snapshot as JSON
    Run {
        /// Input file (csv, xlsx, parquet)
        file: PathBuf,

        /// Declared format. Defaults to the file extension.
        #[arg(short, long)]
        format: Option<SourceFormat>,

        /// Path to a JSON pipeline configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Path to a JSON validation schema
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Overrides the work directory from the settings
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },
    /// Ingest and profile a file, printing the profile as JSON
    Profile {
        file: PathBuf,

        #[arg(short, long)]
        format: Option<SourceFormat>,

        /// Render SVG visuals into this directory
        #[arg(long)]
        visuals: Option<PathBuf>,

        /// Keep the original column names
        #[arg(long)]
        keep_names: bool,
    },
    /// Ingest a file and check it against a schema, printing the result as JSON
    Validate {
        file: PathBuf,

        /// Path to a JSON validation schema
        #[arg(long)]
        schema: PathBuf,

        #[arg(short, long)]
        format: Option<SourceFormat>,
    },
}

pub async fn run_command(command: Commands, settings: AppSettings) -> Result<()> {
    match command {
        Commands::Run {
            file,
            format,
            config,
            schema,
            work_dir,
        } => handle_run(&file, format, config, schema, work_dir, settings).await,
        Commands::Profile {
            file,
            format,
            visuals,
            keep_names,
        } => handle_profile(&file, format, visuals.as_deref(), keep_names),
        Commands::Validate {
            file,
            schema,
            format,
        } => handle_validate(&file, &schema, format),
    }
}

fn resolve_format(file: &Path, declared: Option<SourceFormat>) -> Result<SourceFormat> {
    declared
        .or_else(|| SourceFormat::from_path(file))
        .with_context(|| {
            format!(
                "Cannot infer the format of {}; pass --format csv|excel|parquet",
                file.display()
            )
        })
}

async fn handle_run(
    file: &Path,
    format: Option<SourceFormat>,
    config: Option<PathBuf>,
    schema: Option<PathBuf>,
    work_dir: Option<PathBuf>,
    mut settings: AppSettings,
) -> Result<()> {
    let format = resolve_format(file, format)?;
    let config = match config {
        Some(path) => PipelineConfig::from_file(&path)?,
        None => PipelineConfig::default(),
    };
    let schema = schema
        .map(|path| ValidationSchema::from_file(&path))
        .transpose()?;
    if let Some(dir) = work_dir {
        settings.work_dir = dir;
    }

    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map_or_else(|| "upload".to_owned(), |n| n.to_string_lossy().into_owned());

    let orchestrator = Orchestrator::new(&settings);
    let id = orchestrator
        .submit(Submission {
            file_name,
            bytes,
            format,
            config,
            schema,
        })
        .await?;
    let snapshot = orchestrator.wait(id).await?;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    if snapshot.status == TaskStatus::Failed {
        bail!("{}", snapshot.message);
    }
    Ok(())
}

fn handle_profile(
    file: &Path,
    format: Option<SourceFormat>,
    visuals: Option<&Path>,
    keep_names: bool,
) -> Result<()> {
    let options = IngestOptions {
        normalize_column_names: !keep_names,
        ..IngestOptions::default()
    };
    let df = ingest_file(file, resolve_format(file, format)?, &options)?;
    let report = profile(&df)?;
    if let Some(dir) = visuals {
        let manifest = render_visuals(&df, &report, dir);
        tracing::info!(
            files = manifest.files.len(),
            failures = manifest.failures.len(),
            "Visuals rendered"
        );
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn handle_validate(file: &Path, schema: &Path, format: Option<SourceFormat>) -> Result<()> {
    let schema = ValidationSchema::from_file(schema)?;
    let df = ingest_file(file, resolve_format(file, format)?, &IngestOptions::default())?;
    let result = validate(&df, &schema)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.passed {
        bail!("{}", result.summary());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "scrubline",
            "run",
            "data.bin",
            "--format",
            "parquet",
            "--schema",
            "schema.json",
        ]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Run {
                format: Some(SourceFormat::Parquet),
                schema: Some(_),
                ..
            })
        ));
    }

    #[test]
    fn test_format_falls_back_to_extension() {
        assert_eq!(
            resolve_format(Path::new("a.xlsx"), None).ok(),
            Some(SourceFormat::Excel)
        );
        assert!(resolve_format(Path::new("a.bin"), None).is_err());
    }
}
