//! Column type inference and narrowing.
//!
//! A column is narrowed to the smallest type every value fits into without
//! loss: boolean, then integer, then float, else it stays categorical.
//! "Without loss" is checked per cell. `"42"` becomes `42`, but `"007"` and
//! `"1,234"` would lose characters if parsed, so they stay text and are
//! reported; the rest of the column still narrows.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::models::{ColumnType, Dataset, Value};

static STRICT_INT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?(0|[1-9][0-9]*)$").expect("static regex"));

static STRICT_FLOAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?$").expect("static regex")
});

/// Digits with separators or leading zeros: numeric to a human, lossy to a parser.
static NUMERIC_LOOKING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?[0-9.,]*[0-9][0-9.,]*$").expect("static regex"));

/// Largest magnitude at which every integer is exactly representable as f64.
const EXACT_F64_INT: f64 = 9_007_199_254_740_992.0;

/// What a single cell could become.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellClass {
    Missing,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Looks numeric but would not survive a parse unchanged.
    Lossy,
    Text,
}

pub fn classify_cell(value: &Value) -> CellClass {
    match value {
        Value::Missing => CellClass::Missing,
        Value::Bool(b) => CellClass::Bool(*b),
        Value::Int(i) => CellClass::Int(*i),
        Value::Float(f) => CellClass::Float(*f),
        Value::Text(s) => classify_text(s),
    }
}

fn classify_text(s: &str) -> CellClass {
    match s {
        "true" => return CellClass::Bool(true),
        "false" => return CellClass::Bool(false),
        _ => {}
    }
    if STRICT_INT.is_match(s) {
        return match s.parse::<i64>() {
            Ok(i) => CellClass::Int(i),
            Err(_) => CellClass::Lossy,
        };
    }
    if STRICT_FLOAT.is_match(s) {
        return match s.parse::<f64>() {
            Ok(f) if f.is_finite() => CellClass::Float(f),
            _ => CellClass::Lossy,
        };
    }
    if NUMERIC_LOOKING.is_match(s) {
        return CellClass::Lossy;
    }
    CellClass::Text
}

/// Numeric view of a cell, including numeric text that parses losslessly.
pub fn numeric_value(value: &Value) -> Option<f64> {
    match classify_cell(value) {
        CellClass::Int(i) => Some(i as f64),
        CellClass::Float(f) => Some(f),
        _ => None,
    }
}

fn integral(f: f64) -> bool {
    f.is_finite() && f.fract() == 0.0 && f.abs() < EXACT_F64_INT
}

/// A string that is equal for two cells exactly when type narrowing would
/// make them equal: `"42"`, `42` and `42.0` agree, `"042"` does not.
pub fn canonical(value: &Value) -> String {
    match classify_cell(value) {
        CellClass::Missing => "\u{0}".to_string(),
        CellClass::Bool(b) => format!("b:{b}"),
        CellClass::Int(i) => format!("n:{i}"),
        CellClass::Float(f) if integral(f) => format!("n:{}", f as i64),
        CellClass::Float(f) => format!("n:{f:?}"),
        CellClass::Lossy | CellClass::Text => format!("t:{}", value.render()),
    }
}

/// The type a column's cells currently carry, without looking inside text.
pub fn stored_type<'a>(values: impl IntoIterator<Item = &'a Value>) -> ColumnType {
    let (mut bools, mut ints, mut floats, mut other, mut present) = (0, 0, 0, 0, 0);
    for v in values {
        match v {
            Value::Missing => continue,
            Value::Bool(_) => bools += 1,
            Value::Int(_) => ints += 1,
            Value::Float(_) => floats += 1,
            Value::Text(_) => other += 1,
        }
        present += 1;
    }
    if present == 0 {
        ColumnType::Empty
    } else if other > 0 || (bools > 0 && bools != present) {
        ColumnType::Categorical
    } else if bools == present {
        ColumnType::Boolean
    } else if floats > 0 {
        ColumnType::Float
    } else {
        ColumnType::Integer
    }
}

/// The narrowest type a column can take, plus the positions of cells that
/// would not survive the narrowing.
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    pub column_type: ColumnType,
    pub lossy: Vec<usize>,
}

pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> Inference {
    let classes: Vec<CellClass> = values.into_iter().map(classify_cell).collect();

    let mut present = 0;
    let mut bools = 0;
    let mut numeric = 0;
    let mut all_integral = true;
    let mut text = false;
    for class in &classes {
        match class {
            CellClass::Missing => continue,
            CellClass::Bool(_) => bools += 1,
            CellClass::Int(_) => numeric += 1,
            CellClass::Float(f) => {
                numeric += 1;
                all_integral &= integral(*f);
            }
            CellClass::Lossy => {}
            CellClass::Text => text = true,
        }
        present += 1;
    }

    let categorical = Inference {
        column_type: ColumnType::Categorical,
        lossy: Vec::new(),
    };
    if present == 0 {
        return Inference {
            column_type: ColumnType::Empty,
            lossy: Vec::new(),
        };
    }
    if bools == present {
        return Inference {
            column_type: ColumnType::Boolean,
            lossy: Vec::new(),
        };
    }
    if text || bools > 0 || numeric == 0 {
        return categorical;
    }

    let column_type = if all_integral {
        ColumnType::Integer
    } else {
        ColumnType::Float
    };
    let lossy = classes
        .iter()
        .enumerate()
        .filter(|(_, class)| match class {
            CellClass::Lossy => true,
            // An i64 beyond 2^53 cannot become an f64 exactly.
            CellClass::Int(i) => {
                column_type == ColumnType::Float && (*i as f64).abs() >= EXACT_F64_INT
            }
            _ => false,
        })
        .map(|(idx, _)| idx)
        .collect();

    Inference { column_type, lossy }
}

/// Convert one cell to `target`. `None` when it stays as it is.
fn narrow(value: &Value, target: ColumnType) -> Option<Value> {
    let class = classify_cell(value);
    let narrowed = match (target, class) {
        (ColumnType::Boolean, CellClass::Bool(b)) => Value::Bool(b),
        (ColumnType::Integer, CellClass::Int(i)) => Value::Int(i),
        (ColumnType::Integer, CellClass::Float(f)) if integral(f) => Value::Int(f as i64),
        (ColumnType::Float, CellClass::Int(i)) if (i as f64).abs() < EXACT_F64_INT => {
            Value::Float(i as f64)
        }
        (ColumnType::Float, CellClass::Float(f)) => Value::Float(f),
        _ => return None,
    };
    (&narrowed != value).then_some(narrowed)
}

/// The outcome of narrowing one column.
#[derive(Debug, Clone, Serialize)]
pub struct TypeDecision {
    pub column: String,
    pub before: ColumnType,
    pub after: ColumnType,
    /// Cells whose representation changed.
    pub converted: usize,
    /// Row positions left in their original form because narrowing would lose data.
    pub lossy_rows: Vec<usize>,
}

/// Narrow every column in place.
pub fn optimize(dataset: &mut Dataset) -> Vec<TypeDecision> {
    let mut decisions = Vec::with_capacity(dataset.width());
    for idx in 0..dataset.width() {
        let before = stored_type(dataset.column_values(idx));
        let inference = infer(dataset.column_values(idx));
        let target = inference.column_type;

        let mut converted = 0;
        if matches!(
            target,
            ColumnType::Boolean | ColumnType::Integer | ColumnType::Float
        ) {
            for row in dataset.rows_mut() {
                if let Some(v) = narrow(&row[idx], target) {
                    row[idx] = v;
                    converted += 1;
                }
            }
        }

        let column = dataset.columns()[idx].clone();
        debug!(
            column = %column,
            before = %before,
            after = %target,
            converted = converted,
            lossy = inference.lossy.len(),
            "Column type decided"
        );
        decisions.push(TypeDecision {
            column,
            before,
            after: target,
            converted,
            lossy_rows: inference.lossy,
        });
    }
    decisions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(vals: &[&str]) -> Vec<Value> {
        vals.iter()
            .map(|s| if s.is_empty() { Value::Missing } else { Value::text(*s) })
            .collect()
    }

    #[test]
    fn test_integer_text_narrows() {
        let inf = infer(&texts(&["1", "2", "", "-30"]));
        assert_eq!(inf.column_type, ColumnType::Integer);
        assert!(inf.lossy.is_empty());
    }

    #[test]
    fn test_mixed_numbers_become_float() {
        assert_eq!(infer(&texts(&["1", "2.5"])).column_type, ColumnType::Float);
        // Integral floats still fit an integer column.
        let vals = vec![Value::Float(3.0), Value::Int(4)];
        assert_eq!(infer(&vals).column_type, ColumnType::Integer);
    }

    #[test]
    fn test_leading_zeros_are_lossy_not_truncated() {
        let rows = texts(&["10001", "01234", "94105"])
            .into_iter()
            .map(|v| vec![v])
            .collect();
        let mut ds = Dataset::new(vec!["zip".into()], rows).unwrap();
        let decisions = optimize(&mut ds);
        assert_eq!(decisions[0].after, ColumnType::Integer);
        assert_eq!(decisions[0].lossy_rows, vec![1]);
        assert_eq!(ds.get(0, 0), Some(&Value::Int(10001)));
        assert_eq!(ds.get(1, 0), Some(&Value::text("01234")));
    }

    #[test]
    fn test_all_lossy_column_stays_categorical() {
        let inf = infer(&texts(&["01234", "02345"]));
        assert_eq!(inf.column_type, ColumnType::Categorical);
        assert!(inf.lossy.is_empty());
    }

    #[test]
    fn test_free_text_is_categorical_without_flags() {
        let inf = infer(&texts(&["12", "Plumbing", "7"]));
        assert_eq!(inf.column_type, ColumnType::Categorical);
        assert!(inf.lossy.is_empty());
    }

    #[test]
    fn test_boolean_and_empty_columns() {
        assert_eq!(infer(&texts(&["true", "false", ""])).column_type, ColumnType::Boolean);
        assert_eq!(infer(&texts(&["", ""])).column_type, ColumnType::Empty);
        // Y/N stays text: parsing it would lose the original spelling.
        assert_eq!(infer(&texts(&["Y", "N"])).column_type, ColumnType::Categorical);
    }

    #[test]
    fn test_optimize_is_idempotent() {
        let mut ds = Dataset::new(
            vec!["a".into(), "b".into()],
            vec![
                vec![Value::text("1"), Value::text("1.5")],
                vec![Value::text("2"), Value::text("007")],
            ],
        )
        .unwrap();
        optimize(&mut ds);
        let once = ds.clone();
        let decisions = optimize(&mut ds);
        assert_eq!(ds, once);
        assert!(decisions.iter().all(|d| d.converted == 0));
    }

    #[test]
    fn test_canonical_agrees_with_narrowing() {
        assert_eq!(canonical(&Value::text("42")), canonical(&Value::Int(42)));
        assert_eq!(canonical(&Value::Float(42.0)), canonical(&Value::Int(42)));
        assert_ne!(canonical(&Value::text("042")), canonical(&Value::Int(42)));
        assert_eq!(canonical(&Value::text("true")), canonical(&Value::Bool(true)));
        assert_ne!(canonical(&Value::Missing), canonical(&Value::text("")));
    }

    #[test]
    fn test_stored_type() {
        assert_eq!(stored_type(&[Value::Int(1), Value::Float(2.0)]), ColumnType::Float);
        assert_eq!(stored_type(&[Value::Missing]), ColumnType::Empty);
        assert_eq!(stored_type(&[Value::Int(1), Value::text("x")]), ColumnType::Categorical);
    }
}
