//! Ingestion: raw csv, excel or parquet bytes into a typed table.
//!
//! Every reader produces text or native columns which are then normalised by
//! [`infer::infer_column_types`], so all formats share one set of semantic
//! types. Failures are reported as [`PipelineError::Ingestion`].
//!
//! ```no_run
//! use scrubline::ingest::{IngestOptions, SourceFormat, ingest_file};
//! use std::path::Path;
//!
//! let df = ingest_file(Path::new("sales.csv"), SourceFormat::Csv, &IngestOptions::default())?;
//! println!("{} rows", df.height());
//! # Ok::<(), scrubline::error::PipelineError>(())
//! ```

pub mod encoding;
pub mod infer;
pub mod sniff;

use crate::error::PipelineError;
use crate::utils::{dedupe_names, sanitize_names};
use anyhow::{Context as _, Result, anyhow, bail};
use calamine::{Data, Reader as _, open_workbook_auto_from_rs};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info};

/// Declared format of a submitted file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    #[serde(alias = "xlsx", alias = "xls")]
    Excel,
    Parquet,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Excel => "excel",
            Self::Parquet => "parquet",
        }
    }

    /// Extension of exported files in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Excel => "xlsx",
            Self::Parquet => "parquet",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => Some(Self::Csv),
            "xlsx" | "xls" | "xlsm" | "ods" => Some(Self::Excel),
            "parquet" | "pq" => Some(Self::Parquet),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "excel" | "xlsx" | "xls" => Ok(Self::Excel),
            "parquet" => Ok(Self::Parquet),
            other => Err(format!("unsupported format '{other}'")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IngestOptions {
    /// WHATWG encoding label; detected from the content when absent.
    pub encoding: Option<String>,
    /// CSV delimiter; sniffed from the first lines when absent.
    pub delimiter: Option<char>,
    /// Worksheet to read; the first one when absent.
    pub sheet_name: Option<String>,
    pub normalize_column_names: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            encoding: None,
            delimiter: None,
            sheet_name: None,
            normalize_column_names: true,
        }
    }
}

/// Reads and types a file from disk.
///
/// # Errors
///
/// Returns [`PipelineError::Ingestion`] if the file is unreadable, its content
/// does not match `format`, it is not valid in the declared encoding, or the
/// resulting table has no columns.
pub fn ingest_file(
    path: &Path,
    format: SourceFormat,
    options: &IngestOptions,
) -> Result<DataFrame, PipelineError> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))
        .map_err(|e| PipelineError::ingestion(&e))?;
    ingest_bytes(&bytes, format, options)
}

/// Reads and types an in-memory payload.
///
/// # Errors
///
/// See [`ingest_file`].
pub fn ingest_bytes(
    bytes: &[u8],
    format: SourceFormat,
    options: &IngestOptions,
) -> Result<DataFrame, PipelineError> {
    read_table(bytes, format, options).map_err(|e| PipelineError::ingestion(&e))
}

fn read_table(bytes: &[u8], format: SourceFormat, options: &IngestOptions) -> Result<DataFrame> {
    if bytes.is_empty() {
        bail!("file is empty");
    }
    sniff::check_declared_format(bytes, format)?;

    let raw = match format {
        SourceFormat::Csv => read_csv(bytes, options)?,
        SourceFormat::Excel => read_excel(bytes, options)?,
        SourceFormat::Parquet => read_parquet(bytes)?,
    };

    let mut df = infer::infer_column_types(raw)?;
    if df.width() == 0 {
        bail!("table has zero columns");
    }

    if options.normalize_column_names {
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        df.set_column_names(sanitize_names(&names))?;
    }

    info!(
        format = format.as_str(),
        rows = df.height(),
        columns = df.width(),
        "Ingested table"
    );
    Ok(df)
}

fn read_csv(bytes: &[u8], options: &IngestOptions) -> Result<DataFrame> {
    let decoded = encoding::decode(bytes, options.encoding.as_deref())?;
    let delimiter = match options.delimiter {
        Some(c) if c.is_ascii() => c as u8,
        Some(c) => bail!("delimiter '{c}' is not a single-byte character"),
        None => sniff::detect_delimiter(&decoded.text),
    };
    debug!(
        encoding = decoded.encoding,
        delimiter = %(delimiter as char),
        "Decoded delimited text"
    );

    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .map_parse_options(|parse| parse.with_separator(delimiter))
        .into_reader_with_file_handle(Cursor::new(decoded.text.into_bytes()))
        .finish()
        .context("Failed to parse delimited text")
}

fn read_excel(bytes: &[u8], options: &IngestOptions) -> Result<DataFrame> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).context("Failed to open workbook")?;

    let range = match &options.sheet_name {
        Some(name) => workbook
            .worksheet_range(name)
            .with_context(|| format!("Failed to read worksheet '{name}'"))?,
        None => workbook
            .worksheet_range_at(0)
            .ok_or_else(|| anyhow!("workbook has no worksheets"))?
            .context("Failed to read first worksheet")?,
    };

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        bail!("worksheet is empty");
    };
    let names = dedupe_names(
        header
            .iter()
            .enumerate()
            .map(|(i, cell)| cell_text(cell).unwrap_or_else(|| format!("column_{}", i + 1))),
    );

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); names.len()];
    for row in rows {
        for (idx, values) in cells.iter_mut().enumerate() {
            values.push(row.get(idx).and_then(cell_text));
        }
    }

    let columns = names
        .iter()
        .zip(cells)
        .map(|(name, values)| Column::new(name.as_str().into(), values))
        .collect();
    Ok(DataFrame::new(columns)?)
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => Some(f.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%dT%H:%M:%S").to_string()),
    }
}

fn read_parquet(bytes: &[u8]) -> Result<DataFrame> {
    ParquetReader::new(Cursor::new(bytes.to_vec()))
        .finish()
        .context("Failed to read Parquet")
}
