//! The cleaning report: what every rule did, and proof that the row counts add up.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::cleaner::types::TypeDecision;
use crate::dedup::DedupSnapshot;
use crate::error::CellIssue;

/// Pipeline step a rule belongs to. Only the first two may drop rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Deduplication,
    BusinessRule,
    Normalization,
    MissingValues,
    TypeOptimization,
}

impl Stage {
    pub fn may_drop_rows(self) -> bool {
        matches!(self, Stage::Deduplication | Stage::BusinessRule)
    }
}

/// Counters for one named rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleReport {
    pub rule: String,
    pub stage: Stage,
    pub rows_dropped: usize,
    pub values_changed: usize,
    pub cells_flagged: usize,
}

impl RuleReport {
    pub fn new(rule: impl Into<String>, stage: Stage) -> Self {
        Self {
            rule: rule.into(),
            stage,
            rows_dropped: 0,
            values_changed: 0,
            cells_flagged: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CleaningReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub strict: bool,
    pub original_rows: usize,
    pub final_rows: usize,
    pub original_columns: Vec<String>,
    pub final_columns: Vec<String>,
    pub columns_added: Vec<String>,
    pub columns_removed: Vec<String>,
    pub rules: Vec<RuleReport>,
    pub column_types: Vec<TypeDecision>,
    pub issues: Vec<CellIssue>,
    pub dedup: Option<DedupSnapshot>,
}

impl CleaningReport {
    pub fn new(original_rows: usize, original_columns: Vec<String>, strict: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            strict,
            original_rows,
            final_rows: original_rows,
            final_columns: original_columns.clone(),
            original_columns,
            columns_added: Vec::new(),
            columns_removed: Vec::new(),
            rules: Vec::new(),
            column_types: Vec::new(),
            issues: Vec::new(),
            dedup: None,
        }
    }

    /// Counters for `rule` in `stage`, created on first use.
    pub fn rule_mut(&mut self, rule: &str, stage: Stage) -> &mut RuleReport {
        let idx = match self
            .rules
            .iter()
            .position(|r| r.rule == rule && r.stage == stage)
        {
            Some(idx) => idx,
            None => {
                self.rules.push(RuleReport::new(rule, stage));
                self.rules.len() - 1
            }
        };
        &mut self.rules[idx]
    }

    pub fn column_added(&mut self, column: &str) {
        if let Some(pos) = self.columns_removed.iter().position(|c| c == column) {
            // Removed then re-created in the same run: net no change.
            self.columns_removed.remove(pos);
        } else if !self.columns_added.iter().any(|c| c == column) {
            self.columns_added.push(column.to_string());
        }
    }

    pub fn column_removed(&mut self, column: &str) {
        if let Some(pos) = self.columns_added.iter().position(|c| c == column) {
            self.columns_added.remove(pos);
        } else if !self.columns_removed.iter().any(|c| c == column) {
            self.columns_removed.push(column.to_string());
        }
    }

    pub fn rows_dropped(&self) -> usize {
        self.rules.iter().map(|r| r.rows_dropped).sum()
    }

    pub fn dropped_in(&self, stage: Stage) -> usize {
        self.rules
            .iter()
            .filter(|r| r.stage == stage)
            .map(|r| r.rows_dropped)
            .sum()
    }

    pub fn values_changed(&self) -> usize {
        self.rules.iter().map(|r| r.values_changed).sum()
    }

    /// `original - sum(dropped) == final`, and only dedup and business
    /// rules dropped anything.
    pub fn reconciles(&self) -> bool {
        self.original_rows.checked_sub(self.rows_dropped()) == Some(self.final_rows)
            && self
                .rules
                .iter()
                .all(|r| r.stage.may_drop_rows() || r.rows_dropped == 0)
    }

    /// `final / original`, or `None` for an empty input.
    pub fn retention_rate(&self) -> Option<f64> {
        (self.original_rows > 0).then(|| self.final_rows as f64 / self.original_rows as f64)
    }

    pub fn render_text(&self) -> String {
        let rule = "=".repeat(60);
        let mut out = String::new();
        let _ = writeln!(out, "\n{rule}");
        let _ = writeln!(out, "DATA CLEANING REPORT");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Run: {}", self.run_id);
        let _ = writeln!(out, "Generated: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
        let _ = writeln!(out, "Original rows: {}", self.original_rows);
        let _ = writeln!(out, "Duplicates removed: {}", self.dropped_in(Stage::Deduplication));
        for r in self.rules.iter().filter(|r| r.stage == Stage::BusinessRule) {
            let _ = writeln!(out, "Removed by {}: {}", r.rule, r.rows_dropped);
        }
        let _ = writeln!(out, "Final rows: {}", self.final_rows);
        if let Some(rate) = self.retention_rate() {
            let _ = writeln!(out, "Data retention rate: {:.1}%", rate * 100.0);
        }
        let _ = writeln!(out, "{rule}");

        let changes: Vec<&RuleReport> = self
            .rules
            .iter()
            .filter(|r| !r.stage.may_drop_rows() && (r.values_changed > 0 || r.cells_flagged > 0))
            .collect();
        if !changes.is_empty() {
            let _ = writeln!(out, "\nValue changes:");
            for r in changes {
                let _ = writeln!(
                    out,
                    "  {:<40} changed {:>6}  flagged {:>6}",
                    r.rule, r.values_changed, r.cells_flagged
                );
            }
        }

        if !self.columns_added.is_empty() {
            let _ = writeln!(out, "\nColumns added: {}", self.columns_added.join(", "));
        }
        if !self.columns_removed.is_empty() {
            let _ = writeln!(out, "Columns removed: {}", self.columns_removed.join(", "));
        }

        let retyped: Vec<&TypeDecision> = self
            .column_types
            .iter()
            .filter(|d| d.before != d.after || d.converted > 0)
            .collect();
        if !retyped.is_empty() {
            let _ = writeln!(out, "\nColumn types:");
            for d in retyped {
                let _ = writeln!(out, "  {}: {} -> {} ({} converted)", d.column, d.before, d.after, d.converted);
            }
        }

        if !self.issues.is_empty() {
            let _ = writeln!(out, "\nFlagged cells: {}", self.issues.len());
            for issue in self.issues.iter().take(20) {
                let _ = writeln!(out, "  - {issue}");
            }
            if self.issues.len() > 20 {
                let _ = writeln!(out, "  ... and {} more", self.issues.len() - 20);
            }
        }

        let _ = writeln!(out, "\nFinal dataset shape: ({}, {})", self.final_rows, self.final_columns.len());
        let _ = write!(out, "Columns: [{}]", self.final_columns.join(", "));
        out
    }
}
