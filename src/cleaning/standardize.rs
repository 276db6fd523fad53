//! Text standardization: whitespace, unicode form, case, empty strings and
//! numbers stored as text.

use super::{CleaningAction, CleaningReport, CleaningStage, params};
use crate::error::PipelineError;
use crate::ingest::infer::{parse_float, parse_int};
use crate::table::{ColumnKind, text_values};
use anyhow::Result;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization as _;

const STAGE: &str = "standardize";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TextCase {
    Lower,
    Upper,
    Preserve,
}

impl TextCase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lower => "lower",
            Self::Upper => "upper",
            Self::Preserve => "preserve",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StandardizeConfig {
    pub enabled: bool,
    pub case: TextCase,
    pub trim_whitespace: bool,
    /// Apply unicode compatibility decomposition (NFKD).
    pub normalize_unicode: bool,
    /// Retype a text column whose every present value is a number.
    pub parse_numeric: bool,
    pub empty_as_null: bool,
}

impl Default for StandardizeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            case: TextCase::Lower,
            trim_whitespace: true,
            normalize_unicode: true,
            parse_numeric: true,
            empty_as_null: true,
        }
    }
}

/// A rewritten column and how many of its rows changed.
struct Standardized {
    series: Series,
    rows: usize,
    converted: Option<ColumnKind>,
}

pub struct TextStandardization {
    config: StandardizeConfig,
}

impl TextStandardization {
    pub fn new(config: StandardizeConfig) -> Self {
        Self { config }
    }

    pub fn standardize(&self, value: &str) -> Option<String> {
        let trimmed = if self.config.trim_whitespace {
            value.trim()
        } else {
            value
        };
        let normalized: String = if self.config.normalize_unicode {
            trimmed.nfkd().collect()
        } else {
            trimmed.to_owned()
        };
        let cased = match self.config.case {
            TextCase::Lower => normalized.to_lowercase(),
            TextCase::Upper => normalized.to_uppercase(),
            TextCase::Preserve => normalized,
        };
        if self.config.empty_as_null && cased.is_empty() {
            None
        } else {
            Some(cased)
        }
    }

    fn operations(&self) -> Vec<&'static str> {
        let mut ops = Vec::new();
        if self.config.trim_whitespace {
            ops.push("trim");
        }
        if self.config.normalize_unicode {
            ops.push("nfkd");
        }
        if self.config.case != TextCase::Preserve {
            ops.push(self.config.case.as_str());
        }
        if self.config.empty_as_null {
            ops.push("empty_as_null");
        }
        ops
    }

    /// `None` when nothing changed. Retyping counts every present row as changed.
    fn standardize_column(&self, column: &Column) -> Result<Option<Standardized>> {
        let before = text_values(column)?;
        let after: Vec<Option<String>> = before
            .iter()
            .map(|v| v.as_deref().and_then(|s| self.standardize(s)))
            .collect();
        let edited = before.iter().zip(&after).filter(|(b, a)| b != a).count();
        let name = column.name().clone();

        if self.config.parse_numeric {
            let present: Vec<&str> = after.iter().flatten().map(String::as_str).collect();
            if !present.is_empty() {
                let converted = if present.iter().all(|v| parse_int(v).is_some()) {
                    let ints: Vec<Option<i64>> =
                        after.iter().map(|v| v.as_deref().and_then(parse_int)).collect();
                    Some((Series::new(name.clone(), ints), ColumnKind::Integer))
                } else if present.iter().all(|v| parse_float(v).is_some()) {
                    let floats: Vec<Option<f64>> =
                        after.iter().map(|v| v.as_deref().and_then(parse_float)).collect();
                    Some((Series::new(name.clone(), floats), ColumnKind::Float))
                } else {
                    None
                };
                if let Some((series, kind)) = converted {
                    let rows = before
                        .iter()
                        .zip(&after)
                        .filter(|(b, a)| b.is_some() || a.is_some())
                        .count();
                    return Ok(Some(Standardized {
                        series,
                        rows,
                        converted: Some(kind),
                    }));
                }
            }
        }

        if edited == 0 {
            return Ok(None);
        }
        Ok(Some(Standardized {
            series: Series::new(name, after),
            rows: edited,
            converted: None,
        }))
    }
}

impl CleaningStage for TextStandardization {
    fn name(&self) -> &'static str {
        STAGE
    }

    fn apply(&self, df: &mut DataFrame, report: &mut CleaningReport) -> Result<(), PipelineError> {
        let text_columns: Vec<String> = df
            .get_columns()
            .iter()
            .filter(|c| ColumnKind::of(c) == ColumnKind::Text)
            .map(|c| c.name().to_string())
            .collect();

        for name in text_columns {
            let outcome = df
                .column(&name)
                .map_err(anyhow::Error::from)
                .and_then(|c| self.standardize_column(c));
            let Standardized {
                series,
                rows,
                converted,
            } = match outcome {
                Ok(Some(found)) => found,
                Ok(None) => continue,
                Err(e) => {
                    report.skip(STAGE, &name, format!("{e:#}"));
                    continue;
                }
            };
            if let Err(e) = df.replace(&name, series) {
                report.skip(STAGE, &name, format!("{e:#}"));
                continue;
            }

            let mut parameters = params([("operations", self.operations().into())]);
            if let Some(kind) = converted {
                parameters.insert("converted_to".to_owned(), kind.as_str().into());
            }
            report.record(CleaningAction {
                stage: STAGE.to_owned(),
                columns: vec![name],
                technique: "standardize_text".to_owned(),
                parameters,
                rows_affected: rows,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used, clippy::indexing_slicing)]
    use super::*;

    fn enabled() -> StandardizeConfig {
        StandardizeConfig {
            enabled: true,
            ..StandardizeConfig::default()
        }
    }

    fn run(df: &mut DataFrame, config: StandardizeConfig) -> CleaningReport {
        let mut report = CleaningReport::default();
        TextStandardization::new(config).apply(df, &mut report).unwrap();
        report
    }

    #[test]
    fn test_standardize_value() {
        let stage = TextStandardization::new(enabled());
        assert_eq!(stage.standardize("  New York "), Some("new york".to_owned()));
        assert_eq!(stage.standardize("   "), None);
        // NFKD splits the ligature and the accent.
        assert_eq!(
            stage.standardize("\u{FB01}anc\u{E9}"),
            Some("fiance\u{301}".to_owned())
        );
    }

    #[test]
    fn test_one_action_per_changed_column() -> Result<()> {
        let mut df = df!(
            "city" => [Some(" Oslo"), Some("lima"), Some("")],
            "code" => [Some("a"), Some("b"), Some("c")],
            "n" => [1i64, 2, 3],
        )?;
        let report = run(&mut df, enabled());

        assert_eq!(report.actions.len(), 1);
        let action = &report.actions[0];
        assert_eq!(action.columns, vec!["city"]);
        assert_eq!(action.rows_affected, 2);
        assert_eq!(action.parameters["operations"][0], "trim");
        let city: Vec<Option<&str>> = df.column("city")?.str()?.into_iter().collect();
        assert_eq!(city, vec![Some("oslo"), Some("lima"), None]);
        Ok(())
    }

    #[test]
    fn test_numeric_text_is_retyped() -> Result<()> {
        let mut df = df!(
            "qty" => [Some(" 12"), Some("7 "), None],
            "price" => [Some("1.5"), Some(" 2"), Some("")],
        )?;
        let report = run(&mut df, enabled());

        assert_eq!(ColumnKind::of(df.column("qty")?), ColumnKind::Integer);
        assert_eq!(ColumnKind::of(df.column("price")?), ColumnKind::Float);
        let price: Vec<Option<f64>> = df.column("price")?.f64()?.into_iter().collect();
        assert_eq!(price, vec![Some(1.5), Some(2.0), None]);
        assert_eq!(report.actions[0].parameters["converted_to"], "integer");
        assert_eq!(report.actions[1].parameters["converted_to"], "float");
        Ok(())
    }

    #[test]
    fn test_preserve_case_without_changes_records_nothing() -> Result<()> {
        let mut df = df!("name" => ["Ann", "Bob"])?;
        let config = StandardizeConfig {
            case: TextCase::Preserve,
            ..enabled()
        };
        let report = run(&mut df, config);
        assert!(report.actions.is_empty());
        Ok(())
    }
}
