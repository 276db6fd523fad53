//! Export of the cleaned table and the run report.
//!
//! Each requested format goes through its own [`TableWriter`]. Writers render
//! into memory, the bytes land next to the final name and are renamed into
//! place, so a failed format never leaves a half-written file behind. One
//! format failing does not stop the others; the export only fails when nothing
//! could be written.

use crate::error::PipelineError;
use crate::ingest::SourceFormat;
use crate::integrity::hash_file;
use crate::table::{ColumnKind, numeric_values, text_values};
use anyhow::{Context as _, Result, anyhow};
use indexmap::IndexSet;
use polars::prelude::*;
use rust_xlsxwriter::{DocProperties, ExcelDateTime, Workbook};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const REPORT_FILE: &str = "report.json";

/// Output formats share their names with the ingestible formats.
pub type ExportFormat = SourceFormat;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExportConfig {
    pub formats: Vec<ExportFormat>,
    /// File name stem of the table outputs.
    pub stem: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            formats: vec![ExportFormat::Csv, ExportFormat::Excel, ExportFormat::Parquet],
            stem: "cleaned".to_owned(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportedFile {
    pub format: ExportFormat,
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportFailure {
    pub format: ExportFormat,
    pub error: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportManifest {
    pub files: Vec<ExportedFile>,
    pub report_file: Option<PathBuf>,
    pub failures: Vec<ExportFailure>,
}

impl ExportManifest {
    pub fn file(&self, format: ExportFormat) -> Option<&ExportedFile> {
        self.files.iter().find(|f| f.format == format)
    }
}

/// Serializes a table into one file format.
pub trait TableWriter: Send + Sync {
    fn format(&self) -> ExportFormat;

    /// Renders the whole file into memory.
    ///
    /// # Errors
    ///
    /// Fails when the table cannot be represented in this format.
    fn render(&self, df: &DataFrame) -> Result<Vec<u8>>;
}

pub struct CsvTableWriter;

impl TableWriter for CsvTableWriter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Csv
    }

    fn render(&self, df: &DataFrame) -> Result<Vec<u8>> {
        let mut df = df.clone();
        let mut buffer = Vec::new();
        CsvWriter::new(&mut buffer)
            .include_header(true)
            .finish(&mut df)
            .context("CSV export failed")?;
        Ok(buffer)
    }
}

pub struct ParquetTableWriter;

impl TableWriter for ParquetTableWriter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Parquet
    }

    fn render(&self, df: &DataFrame) -> Result<Vec<u8>> {
        let mut df = df.clone();
        let mut buffer = Vec::new();
        ParquetWriter::new(&mut buffer)
            .finish(&mut df)
            .context("Parquet export failed")?;
        Ok(buffer)
    }
}

/// Writes the first worksheet with a header row. Numbers stay numeric,
/// booleans stay booleans, datetimes are written as ISO-8601 text.
pub struct ExcelTableWriter;

impl ExcelTableWriter {
    /// Creation time written into the document properties. Fixed so identical
    /// tables give identical files.
    fn properties() -> Result<DocProperties> {
        let created = ExcelDateTime::from_ymd(2000, 1, 1)?;
        Ok(DocProperties::new().set_creation_datetime(&created))
    }
}

impl TableWriter for ExcelTableWriter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Excel
    }

    fn render(&self, df: &DataFrame) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();
        workbook.set_properties(&Self::properties()?);
        let sheet = workbook.add_worksheet();

        for (idx, column) in df.get_columns().iter().enumerate() {
            let col = u16::try_from(idx).context("Too many columns for a worksheet")?;
            sheet.write_string(0, col, column.name().as_str())?;

            match ColumnKind::of(column) {
                ColumnKind::Integer | ColumnKind::Float => {
                    for (row, value) in numeric_values(column)?.into_iter().enumerate() {
                        if let Some(v) = value {
                            sheet.write_number(sheet_row(row)?, col, v)?;
                        }
                    }
                }
                ColumnKind::Boolean => {
                    for (row, value) in column.bool()?.into_iter().enumerate() {
                        if let Some(v) = value {
                            sheet.write_boolean(sheet_row(row)?, col, v)?;
                        }
                    }
                }
                ColumnKind::Text | ColumnKind::Datetime => {
                    for (row, value) in text_values(column)?.into_iter().enumerate() {
                        if let Some(v) = value {
                            sheet.write_string(sheet_row(row)?, col, v)?;
                        }
                    }
                }
            }
        }

        workbook
            .save_to_buffer()
            .map_err(|e| anyhow!("Excel export failed: {e}"))
    }
}

/// Worksheet row for a table row; row 0 holds the header.
fn sheet_row(row: usize) -> Result<u32> {
    u32::try_from(row + 1).context("Too many rows for a worksheet")
}

pub fn writer_for(format: ExportFormat) -> Box<dyn TableWriter> {
    match format {
        ExportFormat::Csv => Box::new(CsvTableWriter),
        ExportFormat::Excel => Box::new(ExcelTableWriter),
        ExportFormat::Parquet => Box::new(ParquetTableWriter),
    }
}

/// Writes `bytes` to a sibling temp file and renames it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("out")
    ));
    std::fs::write(&tmp, bytes).with_context(|| format!("Failed to write {}", tmp.display()))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        if let Err(cleanup) = std::fs::remove_file(&tmp) {
            warn!(path = %tmp.display(), error = %cleanup, "Failed to remove temp file");
        }
        return Err(anyhow!(e).context(format!("Failed to move output to {}", path.display())));
    }
    Ok(())
}

fn export_one(df: &DataFrame, writer: &dyn TableWriter, path: &Path) -> Result<ExportedFile> {
    let bytes = writer.render(df)?;
    write_atomic(path, &bytes)?;
    Ok(ExportedFile {
        format: writer.format(),
        path: path.to_path_buf(),
        bytes: bytes.len() as u64,
        sha256: hash_file(path)?,
    })
}

/// Writes every configured format plus `report.json` into `dir`.
///
/// # Errors
///
/// Returns [`PipelineError::Export`] when no table format could be written
/// and [`PipelineError::Io`] when `dir` cannot be created.
pub fn export(
    df: &DataFrame,
    report: &impl Serialize,
    dir: &Path,
    config: &ExportConfig,
) -> Result<ExportManifest, PipelineError> {
    std::fs::create_dir_all(dir)?;
    let mut manifest = ExportManifest::default();

    let formats: IndexSet<ExportFormat> = config.formats.iter().copied().collect();
    for format in formats {
        let path = dir.join(format!("{}.{}", config.stem, format.extension()));
        match export_one(df, writer_for(format).as_ref(), &path) {
            Ok(file) => {
                info!(format = %format, path = %file.path.display(), bytes = file.bytes, "Exported table");
                manifest.files.push(file);
            }
            Err(e) => {
                warn!(format = %format, error = %format!("{e:#}"), "Export format failed");
                manifest.failures.push(ExportFailure {
                    format,
                    error: format!("{e:#}"),
                });
            }
        }
    }

    if manifest.files.is_empty() {
        let reasons: Vec<String> = manifest
            .failures
            .iter()
            .map(|f| format!("{}: {}", f.format, f.error))
            .collect();
        return Err(PipelineError::Export(if reasons.is_empty() {
            "no export formats requested".to_owned()
        } else {
            reasons.join("; ")
        }));
    }

    let report_path = dir.join(REPORT_FILE);
    match serde_json::to_vec_pretty(report)
        .context("Failed to serialize report")
        .and_then(|json| write_atomic(&report_path, &json))
    {
        Ok(()) => manifest.report_file = Some(report_path),
        Err(e) => warn!(error = %format!("{e:#}"), "Failed to write report"),
    }

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used, clippy::indexing_slicing)]
    use super::*;
    use tempfile::TempDir;

    fn sample() -> PolarsResult<DataFrame> {
        df!(
            "id" => [1i64, 2, 3],
            "score" => [Some(1.5), None, Some(3.25)],
            "ok" => [true, false, true],
            "name" => [Some("a"), Some("b"), None],
        )
    }

    #[test]
    fn test_all_formats_and_report() -> Result<()> {
        let dir = TempDir::new()?;
        let df = sample()?;
        let manifest = export(&df, &serde_json::json!({"rows": 3}), dir.path(), &ExportConfig::default())?;

        assert_eq!(manifest.files.len(), 3);
        assert!(manifest.failures.is_empty());
        for file in &manifest.files {
            assert!(file.path.exists());
            assert_eq!(file.sha256.len(), 64);
            assert_eq!(std::fs::metadata(&file.path)?.len(), file.bytes);
        }
        assert_eq!(
            manifest.file(ExportFormat::Excel).map(|f| f.path.clone()),
            Some(dir.path().join("cleaned.xlsx"))
        );
        let report: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join(REPORT_FILE))?)?;
        assert_eq!(report["rows"], 3);
        Ok(())
    }

    #[test]
    fn test_exports_are_byte_identical() -> Result<()> {
        let df = sample()?;
        let first = TempDir::new()?;
        let second = TempDir::new()?;
        let a = export(&df, &serde_json::json!({}), first.path(), &ExportConfig::default())?;
        let b = export(&df, &serde_json::json!({}), second.path(), &ExportConfig::default())?;
        for (x, y) in a.files.iter().zip(&b.files) {
            assert_eq!(x.sha256, y.sha256, "{} differs between runs", x.format);
        }
        Ok(())
    }

    #[test]
    fn test_one_failed_format_is_recorded() -> Result<()> {
        let dir = TempDir::new()?;
        std::fs::create_dir(dir.path().join("cleaned.xlsx"))?;
        let manifest = export(&sample()?, &serde_json::json!({}), dir.path(), &ExportConfig::default())?;

        let formats: Vec<ExportFormat> = manifest.files.iter().map(|f| f.format).collect();
        assert_eq!(formats, vec![ExportFormat::Csv, ExportFormat::Parquet]);
        assert_eq!(manifest.failures.len(), 1);
        assert_eq!(manifest.failures[0].format, ExportFormat::Excel);
        assert!(!dir.path().join("cleaned.xlsx.tmp").exists());
        Ok(())
    }

    #[test]
    fn test_all_formats_failing_is_an_error() -> Result<()> {
        let dir = TempDir::new()?;
        std::fs::create_dir(dir.path().join("cleaned.csv"))?;
        let config = ExportConfig {
            formats: vec![ExportFormat::Csv],
            ..ExportConfig::default()
        };
        let err = export(&sample()?, &serde_json::json!({}), dir.path(), &config).unwrap_err();
        assert_eq!(err.kind(), "ExportError");
        assert!(!dir.path().join(REPORT_FILE).exists());
        Ok(())
    }

    #[test]
    fn test_repeated_formats_written_once() -> Result<()> {
        let dir = TempDir::new()?;
        let config = ExportConfig {
            formats: vec![ExportFormat::Csv, ExportFormat::Parquet, ExportFormat::Csv],
            ..ExportConfig::default()
        };
        let manifest = export(&sample()?, &serde_json::json!({}), dir.path(), &config)?;
        let formats: Vec<ExportFormat> = manifest.files.iter().map(|f| f.format).collect();
        assert_eq!(formats, vec![ExportFormat::Csv, ExportFormat::Parquet]);
        Ok(())
    }

    #[test]
    fn test_csv_roundtrips_through_ingest() -> Result<()> {
        let bytes = CsvTableWriter.render(&sample()?)?;
        let df = crate::ingest::ingest_bytes(
            &bytes,
            ExportFormat::Csv,
            &crate::ingest::IngestOptions::default(),
        )?;
        assert_eq!(df.shape(), (3, 4));
        assert_eq!(ColumnKind::of(df.column("score")?), ColumnKind::Float);
        Ok(())
    }
}
