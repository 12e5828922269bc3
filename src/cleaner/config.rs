//! Cleaner configuration: everything a run does, declared before it starts.
//!
//! The whole struct deserializes from a JSON rule file, with every field
//! optional:
//!
//! ```json
//! {
//!   "required_columns": ["Phone_Number"],
//!   "dedup": {"key_columns": ["First_Name", "Last_Name"]},
//!   "exclusions": [{"name": "do_not_contact", "kind": "truthy", "column": "Do_Not_Contact"}],
//!   "drop_columns": ["Not_Useful_Column"],
//!   "fields": [{"column": "Phone_Number", "kind": "phone", "policy": "blank"}],
//!   "address": {"column": "Address"},
//!   "missing": {"columns": {"Age": "median"}},
//!   "strict": false
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cleaner::missing::{is_token, MissingConfig, MissingStrategy};
use crate::cleaner::normalize::FieldTransform;
use crate::cleaner::rules::Exclusion;
use crate::error::{Result, ToolkitError};
use crate::models::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub enabled: bool,
    /// Compare only these columns. Empty means every column that survives pruning.
    pub key_columns: Vec<String>,
    /// Bloom pre-filter false-positive rate. Only affects speed, never results.
    pub false_positive_rate: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key_columns: Vec::new(),
            false_positive_rate: 0.001,
        }
    }
}

/// One per-field transform. At most one applies per column; a later rule
/// for the same column replaces an earlier one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub column: String,
    #[serde(flatten)]
    pub transform: FieldTransform,
}

impl FieldRule {
    pub fn new(column: impl Into<String>, transform: FieldTransform) -> Self {
        Self {
            column: column.into(),
            transform,
        }
    }
}

/// Split a one-line address into street, state and zip columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRule {
    pub column: String,
    #[serde(default = "default_street_column")]
    pub street_column: String,
    #[serde(default = "default_state_column")]
    pub state_column: String,
    #[serde(default = "default_zip_column")]
    pub zip_column: String,
    /// Remove the source column once every address in it parsed.
    #[serde(default = "default_true")]
    pub drop_source: bool,
    /// Drop the zip column when more than this share of it is empty.
    #[serde(default)]
    pub sparse_ratio: Option<f64>,
}

fn default_street_column() -> String {
    "Street_Address".into()
}

fn default_state_column() -> String {
    "State".into()
}

fn default_zip_column() -> String {
    "Zip_Code".into()
}

fn default_true() -> bool {
    true
}

impl AddressRule {
    pub fn for_column(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            street_column: default_street_column(),
            state_column: default_state_column(),
            zip_column: default_zip_column(),
            drop_source: true,
            sparse_ratio: None,
        }
    }

    pub fn derived_columns(&self) -> [&str; 3] {
        [
            self.street_column.as_str(),
            self.state_column.as_str(),
            self.zip_column.as_str(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    /// Columns that must exist, or the run fails before any rule executes.
    pub required_columns: Vec<String>,
    pub dedup: DedupConfig,
    /// Row exclusions, applied in order.
    pub exclusions: Vec<Exclusion>,
    /// Columns removed during field normalization.
    pub drop_columns: Vec<String>,
    /// Trim surrounding whitespace from every text cell.
    pub trim_text: bool,
    pub fields: Vec<FieldRule>,
    pub address: Option<AddressRule>,
    pub missing: MissingConfig,
    pub optimize_types: bool,
    /// Recognise contact columns (names, phones, flags, addresses) by their
    /// headers and apply the contact-list rules to any not configured above.
    pub detect_contact_columns: bool,
    /// Applied to the address rule the contact detection creates.
    pub sparse_column_ratio: f64,
    /// Fail the run with every flagged cell instead of reporting and continuing.
    pub strict: bool,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            required_columns: Vec::new(),
            dedup: DedupConfig::default(),
            exclusions: Vec::new(),
            drop_columns: Vec::new(),
            trim_text: true,
            fields: Vec::new(),
            address: None,
            missing: MissingConfig::default(),
            optimize_types: true,
            detect_contact_columns: false,
            sparse_column_ratio: 0.8,
            strict: false,
        }
    }
}

impl CleanerConfig {
    /// The customer contact-list preset: names title-cased, phones in
    /// `XXX-XXX-XXXX`, yes/no flags as `Y`/`N`, addresses split, scratch
    /// columns dropped, and rows that are do-not-contact or have no valid
    /// phone excluded.
    pub fn customer_contacts() -> Self {
        Self {
            detect_contact_columns: true,
            ..Self::default()
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let config: CleanerConfig = serde_json::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot run, or that would not be a fixed point.
    pub fn validate(&self) -> Result<()> {
        let rate = self.dedup.false_positive_rate;
        if !(rate > 0.0 && rate < 1.0) {
            return Err(ToolkitError::Config(format!(
                "dedup.false_positive_rate must be in (0, 1), got {rate}"
            )));
        }
        if !(0.0..=1.0).contains(&self.sparse_column_ratio) {
            return Err(ToolkitError::Config(format!(
                "sparse_column_ratio must be in [0, 1], got {}",
                self.sparse_column_ratio
            )));
        }
        if let Some(ratio) = self.address.as_ref().and_then(|a| a.sparse_ratio) {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(ToolkitError::Config(format!(
                    "address.sparse_ratio must be in [0, 1], got {ratio}"
                )));
            }
        }

        for exclusion in &self.exclusions {
            exclusion.predicate.compile()?;
        }

        let tokens = self.missing.token_set();
        let strategies = std::iter::once(("<default>", &self.missing.default)).chain(
            self.missing
                .columns
                .iter()
                .map(|(col, strategy)| (col.as_str(), strategy)),
        );
        for (column, strategy) in strategies {
            if let MissingStrategy::Fill(value) = strategy {
                if is_token(&tokens, &Value::text(value.clone())) {
                    return Err(ToolkitError::Config(format!(
                        "fill value {value:?} for column '{column}' is itself a missing token"
                    )));
                }
            }
        }
        Ok(())
    }
}
