//! Missing-value strategies.
//!
//! Each column gets exactly one strategy, declared up front. There is no
//! heuristic fallback: a column nobody configured keeps its gaps as explicit
//! missing cells.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::analyzer::stats;
use crate::cleaner::types::{canonical, numeric_value};
use crate::models::Value;

/// Placeholders that mean "no value" in the wild.
pub const DEFAULT_MISSING_TOKENS: &[&str] = &[
    "", "N/A", "N/a", "n/a", "NA", "null", "NULL", "None", "NONE", "nan", "NaN",
];

/// What to do with a column's missing cells.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingStrategy {
    /// Keep them as explicit missing cells.
    #[default]
    Leave,
    /// Drop the whole row. Runs with the business rules.
    DropRow,
    /// Fill with a fixed value.
    Fill(String),
    Mean,
    Median,
    /// Most frequent value; ties go to the value seen first.
    Mode,
}

impl MissingStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            MissingStrategy::Leave => "leave",
            MissingStrategy::DropRow => "drop_row",
            MissingStrategy::Fill(_) => "fill",
            MissingStrategy::Mean => "mean",
            MissingStrategy::Median => "median",
            MissingStrategy::Mode => "mode",
        }
    }

    /// True for strategies that put a value into the cell.
    pub fn fills(&self) -> bool {
        matches!(
            self,
            MissingStrategy::Fill(_)
                | MissingStrategy::Mean
                | MissingStrategy::Median
                | MissingStrategy::Mode
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissingConfig {
    /// Cell text (after trimming) that is read as missing.
    pub tokens: Vec<String>,
    /// Strategy for columns not listed in `columns`.
    pub default: MissingStrategy,
    pub columns: BTreeMap<String, MissingStrategy>,
}

impl Default for MissingConfig {
    fn default() -> Self {
        Self {
            tokens: DEFAULT_MISSING_TOKENS.iter().map(|t| t.to_string()).collect(),
            default: MissingStrategy::Leave,
            columns: BTreeMap::new(),
        }
    }
}

impl MissingConfig {
    pub fn strategy_for(&self, column: &str) -> &MissingStrategy {
        self.columns.get(column).unwrap_or(&self.default)
    }

    pub fn token_set(&self) -> HashSet<String> {
        self.tokens.iter().map(|t| t.trim().to_string()).collect()
    }
}

/// True if `value` is text spelling out a missing placeholder.
pub fn is_token(tokens: &HashSet<String>, value: &Value) -> bool {
    match value {
        Value::Text(s) => tokens.contains(s.trim()),
        _ => false,
    }
}

/// The value a strategy fills with, given the column's values.
///
/// `Ok(None)` for strategies that never fill. `Err` carries the reason an
/// estimate could not be made; the caller flags the affected cells.
pub fn estimate(strategy: &MissingStrategy, values: &[Value]) -> Result<Option<Value>, String> {
    match strategy {
        MissingStrategy::Leave | MissingStrategy::DropRow => Ok(None),
        MissingStrategy::Fill(v) => Ok(Some(Value::text(v.clone()))),
        MissingStrategy::Mean | MissingStrategy::Median => {
            let numbers = numeric_only(values)?;
            let estimate = if *strategy == MissingStrategy::Mean {
                stats::mean(&numbers)
            } else {
                stats::median(&stats::sorted(&numbers))
            };
            estimate
                .map(|x| Some(Value::Float(x)))
                .ok_or_else(|| "no values to estimate from".to_string())
        }
        MissingStrategy::Mode => mode(values)
            .map(|v| Some(v.clone()))
            .ok_or_else(|| "no values to estimate from".to_string()),
    }
}

fn numeric_only(values: &[Value]) -> Result<Vec<f64>, String> {
    let mut numbers = Vec::with_capacity(values.len());
    for v in values.iter().filter(|v| !v.is_missing()) {
        match numeric_value(v) {
            Some(x) => numbers.push(x),
            None => return Err(format!("column is not numeric (found {})", v.render())),
        }
    }
    Ok(numbers)
}

fn mode(values: &[Value]) -> Option<&Value> {
    // canonical key -> (count, first position)
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (pos, v) in values.iter().enumerate().filter(|(_, v)| !v.is_missing()) {
        counts.entry(canonical(v)).or_insert((0, pos)).0 += 1;
    }
    counts
        .into_values()
        .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
        .map(|(_, pos)| &values[pos])
}
