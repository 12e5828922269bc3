//! Business-rule exclusions: predicates that drop whole rows.
//!
//! Predicates are evaluated against the cell as it will look after field
//! normalization, so `"Yes"`, `"y"` and `"TRUE"` all trip the same truthy
//! flag, and a phone that normalization would blank counts as invalid.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cleaner::normalize::{phone_is_valid, truthy};
use crate::error::{Result, ToolkitError};
use crate::models::Value;

/// Which rows a rule removes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// The flag reads as yes.
    Truthy { column: String },
    /// Case-insensitive match on the trimmed text.
    Equals { column: String, value: String },
    OneOf { column: String, values: Vec<String> },
    /// Regex search on the rendered cell.
    Matches { column: String, pattern: String },
    /// Missing, or not exactly ten digits.
    InvalidPhone { column: String },
    Missing { column: String },
}

impl Predicate {
    pub fn column(&self) -> &str {
        match self {
            Predicate::Truthy { column }
            | Predicate::Equals { column, .. }
            | Predicate::OneOf { column, .. }
            | Predicate::Matches { column, .. }
            | Predicate::InvalidPhone { column }
            | Predicate::Missing { column } => column,
        }
    }

    pub fn compile(&self) -> Result<Matcher> {
        Ok(match self {
            Predicate::Truthy { .. } => Matcher::Truthy,
            Predicate::Equals { value, .. } => Matcher::OneOf(vec![value.trim().to_lowercase()]),
            Predicate::OneOf { values, .. } => {
                Matcher::OneOf(values.iter().map(|v| v.trim().to_lowercase()).collect())
            }
            Predicate::Matches { pattern, .. } => Matcher::Regex(Regex::new(pattern).map_err(
                |e| ToolkitError::Config(format!("exclusion pattern '{pattern}': {e}")),
            )?),
            Predicate::InvalidPhone { .. } => Matcher::InvalidPhone,
            Predicate::Missing { .. } => Matcher::Missing,
        })
    }
}

/// A named exclusion, as written in a rule file:
/// `{"name": "do_not_contact", "kind": "truthy", "column": "Do_Not_Contact"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub name: String,
    #[serde(flatten)]
    pub predicate: Predicate,
}

impl Exclusion {
    pub fn new(name: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

/// A predicate ready to run against cells.
#[derive(Debug, Clone)]
pub enum Matcher {
    Truthy,
    OneOf(Vec<String>),
    Regex(Regex),
    InvalidPhone,
    Missing,
}

impl Matcher {
    /// True if a row whose cell is `value` must be dropped.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Matcher::Truthy => truthy(value) == Some(true),
            Matcher::OneOf(wanted) => {
                !value.is_missing() && {
                    let rendered = value.render().trim().to_lowercase();
                    wanted.iter().any(|w| *w == rendered)
                }
            }
            Matcher::Regex(re) => !value.is_missing() && re.is_match(&value.render()),
            Matcher::InvalidPhone => !phone_is_valid(value),
            Matcher::Missing => value.is_missing(),
        }
    }
}
