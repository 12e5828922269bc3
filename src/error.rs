// =============================================================================
// error.rs — EVERY WAY A TABLE CAN DISAPPOINT YOU
// =============================================================================
//
// Three families of failure, kept apart on purpose:
//
// 1. Structural: the input is not a table, or a column the caller promised
//    is not there. Nothing runs, nothing is written.
// 2. Validation: strict mode found cells it could not make sense of. The
//    whole run fails at the end with every offending cell listed.
// 3. External: the remote page is down or does not contain the table we
//    were told to expect. Surfaced as-is; nobody retries behind your back.
// =============================================================================

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// A single cell the pipeline could not make sense of.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellIssue {
    /// Zero-based index of the row in the input dataset.
    pub row: usize,
    pub column: String,
    pub value: String,
    /// Which rule raised it, e.g. `normalize:phone`.
    pub rule: String,
    pub reason: String,
}

impl fmt::Display for CellIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {} column '{}' value {:?} ({}): {}",
            self.row, self.column, self.value, self.rule, self.reason
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolkitError {
    #[error("malformed input: {0}")]
    Structural(String),

    #[error("required columns missing from dataset: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("strict mode rejected {} cell(s):\n{}", .0.len(), render_issues(.0))]
    Validation(Vec<CellIssue>),

    #[error("source unavailable: {url}: {reason}")]
    SourceUnavailable { url: String, reason: String },

    #[error("schema not found at {url}: no table with headers [{}]", .expected.join(", "))]
    SchemaNotFound { url: String, expected: Vec<String> },

    #[error("unsupported file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ToolkitError>;

fn render_issues(issues: &[CellIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("  - {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_every_cell() {
        let err = ToolkitError::Validation(vec![
            CellIssue {
                row: 3,
                column: "Phone".into(),
                value: "12".into(),
                rule: "normalize:phone".into(),
                reason: "expected 10 digits".into(),
            },
            CellIssue {
                row: 7,
                column: "Active".into(),
                value: "maybe".into(),
                rule: "normalize:boolean".into(),
                reason: "not a yes/no value".into(),
            },
        ]);
        let msg = err.to_string();
        assert!(msg.contains("2 cell(s)"));
        assert!(msg.contains("row 3 column 'Phone'"));
        assert!(msg.contains("row 7 column 'Active'"));
    }

    #[test]
    fn test_schema_not_found_names_expected_headers() {
        let err = ToolkitError::SchemaNotFound {
            url: "https://example.org".into(),
            expected: vec!["Name".into(), "Revenue".into()],
        };
        assert!(err.to_string().contains("Name, Revenue"));
    }
}
