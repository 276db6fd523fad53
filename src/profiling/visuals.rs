//! SVG renderings of the profile: missingness heatmap, histograms, bar plots.
//!
//! Rendering is best-effort. Each artifact is written independently; a failed
//! one is logged and listed under [`VisualManifest::failures`].

use super::{ProfileReport, ranked_counts, stats};
use crate::table::{ColumnKind, numeric_values, present_numeric_values, text_values};
use crate::utils::sanitize_name;
use anyhow::{Context as _, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 360.0;
const MARGIN: f64 = 40.0;
const BAR_CATEGORIES: usize = 10;
/// Heatmap rows are bucketed so large tables stay legible.
const HEATMAP_MAX_ROWS: usize = 200;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisualKind {
    MissingHeatmap,
    Histogram,
    BarPlot,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisualArtifact {
    pub kind: VisualKind,
    pub column: Option<String>,
    pub path: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisualFailure {
    pub artifact: String,
    pub error: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisualManifest {
    pub files: Vec<VisualArtifact>,
    pub failures: Vec<VisualFailure>,
}

/// Renders every visual for `df` into `dir`.
///
/// Never fails as a whole; a directory that cannot be created shows up as a
/// failure for each artifact.
pub fn render_visuals(df: &DataFrame, report: &ProfileReport, dir: &Path) -> VisualManifest {
    let mut manifest = VisualManifest::default();
    let dir_ready = std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()));

    let mut jobs: Vec<(VisualKind, Option<String>, String)> = vec![(
        VisualKind::MissingHeatmap,
        None,
        "missing_values_heatmap.svg".to_owned(),
    )];
    for column in df.get_columns() {
        let name = column.name().to_string();
        let kind = ColumnKind::of(column);
        if kind.is_numeric() {
            let file = format!("histogram_{}.svg", sanitize_name(&name));
            jobs.push((VisualKind::Histogram, Some(name), file));
        } else if kind.is_categorical() {
            let file = format!("barplot_{}.svg", sanitize_name(&name));
            jobs.push((VisualKind::BarPlot, Some(name), file));
        }
    }

    for (kind, column, file) in jobs {
        let path = dir.join(&file);
        let rendered = match &dir_ready {
            Err(e) => Err(anyhow::anyhow!("{e:#}")),
            Ok(()) => render_one(df, report, kind, column.as_deref()).and_then(|svg| {
                std::fs::write(&path, svg)
                    .with_context(|| format!("Failed to write {}", path.display()))
            }),
        };
        match rendered {
            Ok(()) => {
                debug!(file = %file, "Rendered visual");
                manifest.files.push(VisualArtifact { kind, column, path });
            }
            Err(e) => {
                warn!(file = %file, error = %e, "Visual render failed");
                manifest.failures.push(VisualFailure {
                    artifact: file,
                    error: format!("{e:#}"),
                });
            }
        }
    }
    manifest
}

fn render_one(
    df: &DataFrame,
    report: &ProfileReport,
    kind: VisualKind,
    column: Option<&str>,
) -> Result<String> {
    match (kind, column) {
        (VisualKind::MissingHeatmap, _) => missing_heatmap_svg(df, report),
        (VisualKind::Histogram, Some(name)) => {
            histogram_svg(name, &present_numeric_values(df.column(name)?)?)
        }
        (VisualKind::BarPlot, Some(name)) => bar_plot_svg(name, &text_values(df.column(name)?)?),
        (_, None) => anyhow::bail!("no column given for {kind:?}"),
    }
}

fn svg_open(title: &str) -> Result<String> {
    let mut svg = String::new();
    write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}">"#
    )?;
    write!(
        svg,
        r#"<text x="{}" y="20" text-anchor="middle" font-family="sans-serif" font-size="14">{}</text>"#,
        WIDTH / 2.0,
        escape(title)
    )?;
    Ok(svg)
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// One cell per (row bucket, column); darker means more missing.
pub fn missing_heatmap_svg(df: &DataFrame, report: &ProfileReport) -> Result<String> {
    let rows = df.height();
    let cols = df.width();
    if rows == 0 || cols == 0 {
        anyhow::bail!("nothing to plot");
    }
    let buckets = rows.min(HEATMAP_MAX_ROWS);
    let per_bucket = rows.div_ceil(buckets);
    let cell_w = (WIDTH - 2.0 * MARGIN) / cols as f64;
    let cell_h = (HEIGHT - 2.0 * MARGIN) / buckets as f64;

    let mut svg = svg_open("Missing values")?;
    for (ci, column) in df.get_columns().iter().enumerate() {
        let missing: Vec<bool> = if ColumnKind::of(column) == ColumnKind::Float {
            numeric_values(column)?.iter().map(Option::is_none).collect()
        } else {
            column
                .as_materialized_series()
                .is_null()
                .into_iter()
                .map(|v| v.unwrap_or(true))
                .collect()
        };
        for (bi, chunk) in missing.chunks(per_bucket).enumerate() {
            let share = chunk.iter().filter(|m| **m).count() as f64 / chunk.len() as f64;
            if share == 0.0 {
                continue;
            }
            write!(
                svg,
                r##"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="#c0392b" fill-opacity="{:.3}"/>"##,
                MARGIN + ci as f64 * cell_w,
                MARGIN + bi as f64 * cell_h,
                cell_w,
                cell_h,
                share
            )?;
        }
        let pct = report.percent_missing(column.name()).unwrap_or(0.0);
        write!(
            svg,
            r#"<text x="{:.2}" y="{:.2}" text-anchor="middle" font-family="sans-serif" font-size="10">{} ({pct:.1}%)</text>"#,
            MARGIN + (ci as f64 + 0.5) * cell_w,
            HEIGHT - MARGIN / 2.0,
            escape(column.name())
        )?;
    }
    svg.push_str("</svg>");
    Ok(svg)
}

pub fn histogram_svg(column: &str, values: &[f64]) -> Result<String> {
    let (width, bins) = stats::histogram(values);
    let Some(max_count) = bins.iter().map(|(_, c)| *c).max().filter(|m| *m > 0) else {
        anyhow::bail!("column '{column}' has no values to plot");
    };
    let bar_w = (WIDTH - 2.0 * MARGIN) / bins.len() as f64;
    let plot_h = HEIGHT - 2.0 * MARGIN;

    let mut svg = svg_open(&format!("Histogram of {column} (bin width {width:.3})"))?;
    for (i, (start, count)) in bins.iter().enumerate() {
        let h = *count as f64 / max_count as f64 * plot_h;
        write!(
            svg,
            r##"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="#2e86c1"><title>{start:.3}: {count}</title></rect>"##,
            MARGIN + i as f64 * bar_w,
            HEIGHT - MARGIN - h,
            (bar_w - 1.0).max(0.5),
            h
        )?;
    }
    svg.push_str("</svg>");
    Ok(svg)
}

pub fn bar_plot_svg(column: &str, values: &[Option<String>]) -> Result<String> {
    let mut counts = ranked_counts(values);
    counts.truncate(BAR_CATEGORIES);
    let Some(max_count) = counts.first().map(|c| c.count) else {
        anyhow::bail!("column '{column}' has no values to plot");
    };
    let bar_w = (WIDTH - 2.0 * MARGIN) / counts.len() as f64;
    let plot_h = HEIGHT - 3.0 * MARGIN;

    let mut svg = svg_open(&format!("Top categories of {column}"))?;
    for (i, entry) in counts.iter().enumerate() {
        let h = entry.count as f64 / max_count as f64 * plot_h;
        let x = MARGIN + i as f64 * bar_w;
        write!(
            svg,
            r##"<rect x="{x:.2}" y="{:.2}" width="{:.2}" height="{h:.2}" fill="#27ae60"/>"##,
            HEIGHT - 2.0 * MARGIN - h,
            (bar_w - 2.0).max(0.5)
        )?;
        write!(
            svg,
            r#"<text x="{:.2}" y="{:.2}" text-anchor="middle" font-family="sans-serif" font-size="10">{} ({})</text>"#,
            x + bar_w / 2.0,
            HEIGHT - 1.5 * MARGIN,
            escape(&entry.value),
            entry.count
        )?;
    }
    svg.push_str("</svg>");
    Ok(svg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiling::profile;
    use tempfile::TempDir;

    #[test]
    fn test_render_visuals_writes_expected_files() -> Result<()> {
        let df = df!(
            "Amount" => [Some(1.0), None, Some(3.0), Some(9.0), Some(4.0)],
            "tier" => ["gold", "silver", "gold", "bronze", "gold"],
        )?;
        let report = profile(&df)?;
        let dir = TempDir::new()?;
        let manifest = render_visuals(&df, &report, dir.path());

        assert!(manifest.failures.is_empty(), "{:?}", manifest.failures);
        assert!(dir.path().join("missing_values_heatmap.svg").exists());
        assert!(dir.path().join("histogram_amount.svg").exists());
        assert!(dir.path().join("barplot_tier.svg").exists());
        assert_eq!(manifest.files.len(), 3);
        Ok(())
    }

    #[test]
    fn test_failed_render_is_recorded() -> Result<()> {
        let df = df!("empty" => [None::<f64>, None])?;
        let report = profile(&df)?;
        let dir = TempDir::new()?;
        let manifest = render_visuals(&df, &report, dir.path());

        assert_eq!(manifest.failures.len(), 1);
        assert_eq!(manifest.failures[0].artifact, "histogram_empty.svg");
        assert_eq!(manifest.files.len(), 1);
        Ok(())
    }

    #[test]
    fn test_labels_are_escaped() -> Result<()> {
        let svg = bar_plot_svg("c", &[Some("<b>&".to_owned())])?;
        assert!(svg.contains("&lt;b&gt;&amp;"));
        Ok(())
    }
}
