//! Analysis report types and their text rendering.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analyzer::stats::IqrFences;
use crate::analyzer::AnalyzerConfig;
use crate::models::ColumnType;

#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub column: String,
    pub column_type: ColumnType,
    pub unique: usize,
    pub missing: usize,
    pub missing_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub rows: usize,
    pub columns: usize,
    pub missing_cells: usize,
    pub duplicate_rows: usize,
    pub column_info: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Outliers {
    #[serde(flatten)]
    pub fences: IqrFences,
    pub count: usize,
    pub pct: f64,
    /// Row positions of the outlying values, ascending.
    pub rows: Vec<usize>,
}

/// Statistics for one numeric column. Everything except the counts is
/// `None` when the column has fewer than two values.
#[derive(Debug, Clone, Serialize)]
pub struct NumericSummary {
    pub column: String,
    pub count: usize,
    pub missing: usize,
    pub missing_pct: f64,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std_dev: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub q1: Option<f64>,
    pub q3: Option<f64>,
    pub skewness: Option<f64>,
    pub kurtosis: Option<f64>,
    pub outliers: Option<Outliers>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frequency {
    pub value: String,
    pub count: usize,
    pub pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoricalSummary {
    pub column: String,
    pub unique: usize,
    pub missing: usize,
    /// Every distinct value, most frequent first; ties in value order.
    pub frequencies: Vec<Frequency>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationPair {
    pub a: String,
    pub b: String,
    pub r: f64,
    /// Rows where both columns had a value.
    pub pairs: usize,
}

/// Square, symmetric matrix over the numeric columns.
#[derive(Debug, Clone, Serialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        self.values[i][j]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub config: AnalyzerConfig,
    pub overview: Overview,
    pub numeric: Vec<NumericSummary>,
    pub correlations: CorrelationMatrix,
    pub strong_correlations: Vec<CorrelationPair>,
    pub categorical: Vec<CategoricalSummary>,
}

fn fmt_opt(v: Option<f64>, precision: usize) -> String {
    match v {
        Some(x) => format!("{x:.precision$}"),
        None => "n/a".to_string(),
    }
}

impl AnalysisReport {
    pub fn numeric_column(&self, column: &str) -> Option<&NumericSummary> {
        self.numeric.iter().find(|s| s.column == column)
    }

    pub fn categorical_column(&self, column: &str) -> Option<&CategoricalSummary> {
        self.categorical.iter().find(|s| s.column == column)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn render_text(&self) -> String {
        let wide = "=".repeat(80);
        let narrow = "=".repeat(50);
        let ov = &self.overview;
        let mut out = String::new();

        let _ = writeln!(out, "{wide}");
        let _ = writeln!(out, "COMPREHENSIVE EXPLORATORY DATA ANALYSIS REPORT");
        let _ = writeln!(out, "{wide}");
        let _ = writeln!(
            out,
            "Generated on: {}",
            self.generated_at.format("%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(out, "Dataset: {} rows x {} columns", ov.rows, ov.columns);

        let _ = writeln!(out, "\n{narrow}\nDATA QUALITY SUMMARY\n{narrow}");
        let _ = writeln!(out, "Missing values: {}", ov.missing_cells);
        let _ = writeln!(out, "Duplicate rows: {}", ov.duplicate_rows);

        let _ = writeln!(out, "\n{narrow}\nCOLUMN INFORMATION\n{narrow}");
        for info in &ov.column_info {
            let _ = writeln!(out, "{}:", info.column);
            let _ = writeln!(out, "  - Type: {}", info.column_type);
            let _ = writeln!(out, "  - Unique values: {}", info.unique);
            let _ = writeln!(out, "  - Missing: {} ({:.1}%)", info.missing, info.missing_pct);
        }

        if !self.numeric.is_empty() {
            let _ = writeln!(out, "\n{narrow}\nKEY STATISTICAL INSIGHTS\n{narrow}");
            for s in &self.numeric {
                let _ = writeln!(out, "\n{}:", s.column);
                let _ = writeln!(out, "  - Count: {}", s.count);
                let _ = writeln!(out, "  - Mean: {}", fmt_opt(s.mean, 2));
                let _ = writeln!(out, "  - Median: {}", fmt_opt(s.median, 2));
                let _ = writeln!(out, "  - Std Dev: {}", fmt_opt(s.std_dev, 2));
                let _ = writeln!(out, "  - Skewness: {}", fmt_opt(s.skewness, 2));
                let _ = writeln!(out, "  - Kurtosis: {}", fmt_opt(s.kurtosis, 2));
                if let Some(o) = &s.outliers {
                    let _ = writeln!(
                        out,
                        "  - Outliers (IQR): {} ({:.1}%), bounds [{:.2}, {:.2}]",
                        o.count, o.pct, o.fences.lower, o.fences.upper
                    );
                }
            }
        }

        let _ = writeln!(out, "\n{narrow}\nCORRELATIONS\n{narrow}");
        if self.strong_correlations.is_empty() {
            let _ = writeln!(
                out,
                "No strong correlations (|r| > {}) found",
                self.config.strong_correlation
            );
        } else {
            let _ = writeln!(
                out,
                "Strong correlations (|r| > {}):",
                self.config.strong_correlation
            );
            for p in &self.strong_correlations {
                let _ = writeln!(out, "{} - {}: {:.3}", p.a, p.b, p.r);
            }
        }

        if !self.categorical.is_empty() {
            let _ = writeln!(out, "\n{narrow}\nCATEGORICAL VARIABLES\n{narrow}");
            for c in &self.categorical {
                let _ = writeln!(out, "\n{} - Unique Values: {}", c.column, c.unique);
                for f in c.frequencies.iter().take(self.config.top_categories) {
                    let _ = writeln!(out, "  {}: {} ({:.1}%)", f.value, f.count, f.pct);
                }
            }
        }
        out
    }
}
