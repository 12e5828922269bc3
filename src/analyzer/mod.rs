// =============================================================================
// analyzer/mod.rs — WHAT IS IN THIS TABLE?
// =============================================================================
//
// Read-only exploratory statistics. The analyzer never touches the dataset
// it is given; it infers each column's type the same way the cleaner's type
// optimization does, then:
//
//   - numeric columns get count, mean, median, sample std dev, skewness,
//     kurtosis, quartiles and IQR outliers
//   - every pair of numeric columns gets a pairwise-complete Pearson r
//   - categorical and boolean columns get a frequency table
//
// Same input and thresholds, same report, every time. The only "error" is a
// column too short to describe, which shows up as null statistics.
// =============================================================================

pub mod report;
pub mod stats;

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::cleaner::types::{canonical, infer, numeric_value};
use crate::config::Config;
use crate::models::{ColumnType, Dataset};

pub use report::{
    AnalysisReport, CategoricalSummary, ColumnInfo, CorrelationMatrix, CorrelationPair,
    Frequency, NumericSummary, Outliers, Overview,
};
use stats::IqrFences;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzerConfig {
    /// |r| strictly above this is strong.
    pub strong_correlation: f64,
    pub iqr_multiplier: f64,
    /// Categories per column shown in the text report. The JSON keeps all.
    pub top_categories: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            strong_correlation: 0.7,
            iqr_multiplier: 1.5,
            top_categories: 10,
        }
    }
}

impl From<&Config> for AnalyzerConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            strong_correlation: cfg.strong_correlation,
            iqr_multiplier: cfg.iqr_multiplier,
            top_categories: cfg.top_categories,
        }
    }
}

fn pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

pub fn analyze(dataset: &Dataset, config: &AnalyzerConfig) -> AnalysisReport {
    let rows = dataset.len();
    let types: Vec<ColumnType> = (0..dataset.width())
        .map(|idx| infer(dataset.column_values(idx)).column_type)
        .collect();

    let overview = overview(dataset, &types);

    let numeric_idx: Vec<usize> = (0..dataset.width())
        .filter(|&i| types[i].is_numeric())
        .collect();
    let numeric: Vec<NumericSummary> = numeric_idx
        .iter()
        .map(|&idx| describe_numeric(dataset, idx, config.iqr_multiplier))
        .collect();

    let (correlations, strong_correlations) =
        correlate(dataset, &numeric_idx, config.strong_correlation);

    let categorical: Vec<CategoricalSummary> = (0..dataset.width())
        .filter(|&i| matches!(types[i], ColumnType::Categorical | ColumnType::Boolean))
        .map(|idx| describe_categorical(dataset, idx))
        .collect();

    info!(
        rows = rows,
        columns = dataset.width(),
        numeric = numeric.len(),
        categorical = categorical.len(),
        strong_correlations = strong_correlations.len(),
        "Analysis complete"
    );

    AnalysisReport {
        generated_at: Utc::now(),
        config: config.clone(),
        overview,
        numeric,
        correlations,
        strong_correlations,
        categorical,
    }
}

fn overview(dataset: &Dataset, types: &[ColumnType]) -> Overview {
    let rows = dataset.len();
    let column_info = dataset
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let missing = dataset.column_values(idx).filter(|v| v.is_missing()).count();
            let unique = dataset
                .column_values(idx)
                .filter(|v| !v.is_missing())
                .map(canonical)
                .collect::<HashSet<_>>()
                .len();
            ColumnInfo {
                column: name.clone(),
                column_type: types[idx],
                unique,
                missing,
                missing_pct: pct(missing, rows),
            }
        })
        .collect();

    let mut seen = HashSet::with_capacity(rows);
    let duplicate_rows = dataset
        .rows()
        .iter()
        .filter(|row| {
            let key: Vec<String> = row.iter().map(canonical).collect();
            !seen.insert(key)
        })
        .count();

    Overview {
        rows,
        columns: dataset.width(),
        missing_cells: dataset.missing_count(),
        duplicate_rows,
        column_info,
    }
}

fn describe_numeric(dataset: &Dataset, idx: usize, iqr_multiplier: f64) -> NumericSummary {
    let column = dataset.columns()[idx].clone();
    let rows = dataset.len();
    let missing = dataset.column_values(idx).filter(|v| v.is_missing()).count();
    let observed: Vec<(usize, f64)> = dataset
        .column_values(idx)
        .enumerate()
        .filter_map(|(row, v)| numeric_value(v).map(|x| (row, x)))
        .collect();
    let values: Vec<f64> = observed.iter().map(|&(_, x)| x).collect();

    let mut summary = NumericSummary {
        column,
        count: values.len(),
        missing,
        missing_pct: pct(missing, rows),
        mean: None,
        median: None,
        std_dev: None,
        min: None,
        max: None,
        q1: None,
        q3: None,
        skewness: None,
        kurtosis: None,
        outliers: None,
    };
    if values.len() < 2 {
        debug!(column = %summary.column, count = values.len(), "Too few values to describe");
        return summary;
    }

    let sorted = stats::sorted(&values);
    summary.mean = stats::mean(&values);
    summary.median = stats::median(&sorted);
    summary.std_dev = stats::std_dev(&values);
    summary.min = sorted.first().copied();
    summary.max = sorted.last().copied();
    summary.skewness = stats::skewness(&values);
    summary.kurtosis = stats::kurtosis(&values);

    if let Some(fences) = IqrFences::from_sorted(&sorted, iqr_multiplier) {
        summary.q1 = Some(fences.q1);
        summary.q3 = Some(fences.q3);
        let rows: Vec<usize> = observed
            .iter()
            .filter(|&&(_, x)| fences.is_outlier(x))
            .map(|&(row, _)| row)
            .collect();
        summary.outliers = Some(Outliers {
            fences,
            count: rows.len(),
            pct: pct(rows.len(), values.len()),
            rows,
        });
    }
    summary
}

fn correlate(
    dataset: &Dataset,
    numeric_idx: &[usize],
    threshold: f64,
) -> (CorrelationMatrix, Vec<CorrelationPair>) {
    let k = numeric_idx.len();
    let names: Vec<String> = numeric_idx
        .iter()
        .map(|&i| dataset.columns()[i].clone())
        .collect();
    let mut values = vec![vec![None; k]; k];
    let mut strong = Vec::new();

    let columns: Vec<Vec<Option<f64>>> = numeric_idx
        .iter()
        .map(|&i| dataset.column_values(i).map(numeric_value).collect())
        .collect();

    for a in 0..k {
        for b in a..k {
            let pairs: Vec<(f64, f64)> = columns[a]
                .iter()
                .zip(&columns[b])
                .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
                .collect();
            let r = stats::pearson(&pairs);
            // One computation per pair, mirrored, so r(a, b) == r(b, a) exactly.
            values[a][b] = r;
            values[b][a] = r;
            if a != b {
                if let Some(r) = r.filter(|r| r.abs() > threshold) {
                    strong.push(CorrelationPair {
                        a: names[a].clone(),
                        b: names[b].clone(),
                        r,
                        pairs: pairs.len(),
                    });
                }
            }
        }
    }

    (
        CorrelationMatrix {
            columns: names,
            values,
        },
        strong,
    )
}

fn describe_categorical(dataset: &Dataset, idx: usize) -> CategoricalSummary {
    let column = dataset.columns()[idx].clone();
    let missing = dataset.column_values(idx).filter(|v| v.is_missing()).count();
    let present = dataset.len() - missing;

    // canonical key -> (display value, count)
    let mut counts: HashMap<String, (String, usize)> = HashMap::new();
    for v in dataset.column_values(idx).filter(|v| !v.is_missing()) {
        counts
            .entry(canonical(v))
            .or_insert_with(|| (v.render(), 0))
            .1 += 1;
    }

    let mut by_value: BTreeMap<String, usize> = BTreeMap::new();
    for (value, count) in counts.into_values() {
        *by_value.entry(value).or_default() += count;
    }
    let mut frequencies: Vec<Frequency> = by_value
        .into_iter()
        .map(|(value, count)| Frequency {
            value,
            count,
            pct: pct(count, present),
        })
        .collect();
    // Stable sort over value-ordered input: ties stay in value order.
    frequencies.sort_by(|a, b| b.count.cmp(&a.count));

    CategoricalSummary {
        column,
        unique: frequencies.len(),
        missing,
        frequencies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    fn numeric_dataset(columns: &[&str], rows: Vec<Vec<Value>>) -> Dataset {
        Dataset::new(columns.iter().map(|c| c.to_string()).collect(), rows).unwrap()
    }

    #[test]
    fn test_perfect_linear_correlation_is_strong() {
        let rows = (1..=50)
            .map(|x| vec![Value::Int(x), Value::Int(2 * x)])
            .collect();
        let ds = numeric_dataset(&["x", "y"], rows);
        let report = analyze(&ds, &AnalyzerConfig::default());
        let r = report.correlations.get("x", "y").unwrap();
        assert!((r - 1.0).abs() < 1e-12);
        assert_eq!(report.strong_correlations.len(), 1);
        assert_eq!(report.strong_correlations[0].a, "x");
        assert_eq!(report.strong_correlations[0].b, "y");
    }

    #[test]
    fn test_correlation_matrix_is_symmetric_and_bounded() {
        let rows = (0..40)
            .map(|i| {
                let x = i as f64;
                vec![
                    Value::Float(x),
                    Value::Float((x * 0.37).sin() * 10.0 + x),
                    Value::Float(100.0 - x * x),
                ]
            })
            .collect();
        let ds = numeric_dataset(&["a", "b", "c"], rows);
        let report = analyze(&ds, &AnalyzerConfig::default());
        let m = &report.correlations;
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(m.values[i][j], m.values[j][i]);
                if let Some(r) = m.values[i][j] {
                    assert!(r.abs() <= 1.0);
                }
            }
        }
    }

    #[test]
    fn test_correlation_uses_pairwise_complete_rows() {
        let rows = vec![
            vec![Value::Int(1), Value::Int(2)],
            vec![Value::Int(2), Value::Missing],
            vec![Value::Int(3), Value::Int(6)],
            vec![Value::Missing, Value::Int(100)],
            vec![Value::Int(4), Value::Int(8)],
        ];
        let report = analyze(&numeric_dataset(&["x", "y"], rows), &AnalyzerConfig::default());
        assert_eq!(report.strong_correlations[0].pairs, 3);
        assert!((report.strong_correlations[0].r - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_short_columns_report_null_statistics() {
        let rows = vec![
            vec![Value::Int(5), Value::Int(1)],
            vec![Value::Missing, Value::Int(2)],
            vec![Value::Missing, Value::Int(3)],
        ];
        let report = analyze(&numeric_dataset(&["lonely", "ok"], rows), &AnalyzerConfig::default());
        let lonely = report.numeric_column("lonely").unwrap();
        assert_eq!(lonely.count, 1);
        assert_eq!(lonely.missing, 2);
        assert!(lonely.mean.is_none() && lonely.std_dev.is_none() && lonely.outliers.is_none());
        assert_eq!(report.correlations.get("lonely", "ok"), None);
        let ok = report.numeric_column("ok").unwrap();
        assert_eq!(ok.mean, Some(2.0));
        assert_eq!(ok.std_dev, Some(1.0));
        assert!(ok.kurtosis.is_none());
    }

    #[test]
    fn test_outliers_are_deterministic() {
        let mut rows: Vec<Vec<Value>> = (1..=20).map(|x| vec![Value::Int(x)]).collect();
        rows.push(vec![Value::Int(500)]);
        rows.push(vec![Value::Int(-300)]);
        let ds = numeric_dataset(&["v"], rows);
        let first = analyze(&ds, &AnalyzerConfig::default());
        let second = analyze(&ds, &AnalyzerConfig::default());
        let a = first.numeric_column("v").unwrap().outliers.clone().unwrap();
        let b = second.numeric_column("v").unwrap().outliers.clone().unwrap();
        assert_eq!(a.rows, vec![20, 21]);
        assert_eq!(a.rows, b.rows);
        assert_eq!(a.fences, b.fences);
    }

    #[test]
    fn test_missing_report_adds_up() {
        // 234 rows x 19 columns, 15 missing cells across 3 columns.
        let columns: Vec<String> = (0..19).map(|i| format!("c{i}")).collect();
        let rows: Vec<Vec<Value>> = (0..234)
            .map(|r| {
                (0..19)
                    .map(|c| {
                        let gap = (c == 2 && r < 4) || (c == 7 && r % 50 == 0) || (c == 11 && r >= 228);
                        if gap {
                            Value::Missing
                        } else {
                            Value::Int((r * 19 + c) as i64)
                        }
                    })
                    .collect()
            })
            .collect();
        let ds = Dataset::new(columns, rows).unwrap();
        let report = analyze(&ds, &AnalyzerConfig::default());
        let ov = &report.overview;
        assert_eq!((ov.rows, ov.columns), (234, 19));
        assert_eq!(ov.missing_cells, 15);
        let with_gaps: Vec<&ColumnInfo> = ov.column_info.iter().filter(|c| c.missing > 0).collect();
        assert_eq!(with_gaps.len(), 3);
        let weighted: f64 = ov
            .column_info
            .iter()
            .map(|c| c.missing_pct / 100.0 * ov.rows as f64)
            .sum();
        assert!((weighted - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_categorical_frequencies_and_duplicates() {
        let rows = vec![
            vec![Value::text("Retail")],
            vec![Value::text("Energy")],
            vec![Value::text("Retail")],
            vec![Value::Missing],
            vec![Value::text("Banking")],
            vec![Value::text("Energy")],
        ];
        let ds = numeric_dataset(&["Industry"], rows);
        let report = analyze(&ds, &AnalyzerConfig::default());
        let cat = report.categorical_column("Industry").unwrap();
        assert_eq!(cat.unique, 3);
        assert_eq!(cat.missing, 1);
        let order: Vec<(&str, usize)> = cat
            .frequencies
            .iter()
            .map(|f| (f.value.as_str(), f.count))
            .collect();
        assert_eq!(order, vec![("Energy", 2), ("Retail", 2), ("Banking", 1)]);
        assert_eq!(report.overview.duplicate_rows, 2);
    }

    #[test]
    fn test_numeric_text_is_analyzed_as_numbers() {
        let rows = (1..=5).map(|x| vec![Value::text(x.to_string())]).collect();
        let report = analyze(&numeric_dataset(&["n"], rows), &AnalyzerConfig::default());
        assert_eq!(report.numeric_column("n").unwrap().median, Some(3.0));
    }

    #[test]
    fn test_text_report_layout() {
        let rows = (1..=10)
            .map(|x| vec![Value::Int(x), Value::Int(3 * x), Value::text(if x % 2 == 0 { "even" } else { "odd" })])
            .collect();
        let ds = numeric_dataset(&["x", "y", "parity"], rows);
        let text = analyze(&ds, &AnalyzerConfig::default()).render_text();
        assert!(text.contains("COMPREHENSIVE EXPLORATORY DATA ANALYSIS REPORT"));
        assert!(text.contains("Dataset: 10 rows x 3 columns"));
        assert!(text.contains("x - y: 1.000"));
        assert!(text.contains("parity - Unique Values: 2"));
    }

    #[test]
    fn test_analysis_does_not_mutate_input() {
        let ds = numeric_dataset(&["v"], vec![vec![Value::text("1")], vec![Value::text("2")]]);
        let before = ds.clone();
        let _ = analyze(&ds, &AnalyzerConfig::default());
        assert_eq!(ds, before);
    }
}
