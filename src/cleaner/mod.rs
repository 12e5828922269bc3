// =============================================================================
// cleaner/mod.rs — FIVE PASSES, ONE LEDGER
// =============================================================================
//
// The cleaning pipeline. Always the same order, because each pass depends
// on the one before it:
//
//   1. Deduplication       keep the first of each group of equal rows
//   2. Business rules      drop rows matching the caller's exclusions
//   3. Field normalization trim, placeholders to missing, per-field
//                          transforms, address splitting, column pruning
//   4. Missing values      one declared strategy per column
//   5. Type optimization   narrow each column without losing anything
//
// Only passes 1 and 2 remove rows. Everything else rewrites cells, and every
// rewrite, drop and flag is counted in the report, so that
// original_rows - dropped == final_rows always holds.
//
// Cleaning is a fixed point: running the output through the same config
// changes nothing. The plan makes that possible by letting dedup and the
// business rules judge each row as it will look after passes 3 and 4.
// =============================================================================

pub mod config;
pub mod missing;
pub mod normalize;
pub mod plan;
pub mod report;
pub mod rules;
pub mod types;

use tracing::{debug, info, warn};

use crate::dedup::DedupEngine;
use crate::error::{CellIssue, Result, ToolkitError};
use crate::models::{Dataset, Value};

pub use config::{AddressRule, CleanerConfig, DedupConfig, FieldRule};
pub use missing::{MissingConfig, MissingStrategy};
pub use normalize::{Case, FieldTransform, PhonePolicy};
pub use plan::Plan;
pub use report::{CleaningReport, RuleReport, Stage};
pub use rules::{Exclusion, Predicate};

use normalize::Outcome;

/// Clean `dataset` with `config`. Shorthand for `Cleaner::new(config)?.clean(dataset)`.
pub fn clean(dataset: Dataset, config: &CleanerConfig) -> Result<(Dataset, CleaningReport)> {
    Cleaner::new(config.clone())?.clean(dataset)
}

/// A validated cleaning configuration, reusable across datasets.
#[derive(Debug, Clone)]
pub struct Cleaner {
    config: CleanerConfig,
}

/// Mutable state of one run.
struct Run<'a> {
    plan: &'a Plan,
    dataset: Dataset,
    /// Input row index of each current row, so issues point at the input.
    origin: Vec<usize>,
    report: CleaningReport,
}

impl Cleaner {
    pub fn new(config: CleanerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CleanerConfig {
        &self.config
    }

    pub fn clean(&self, dataset: Dataset) -> Result<(Dataset, CleaningReport)> {
        let missing: Vec<String> = self
            .config
            .required_columns
            .iter()
            .filter(|c| !dataset.has_column(c))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ToolkitError::MissingColumns(missing));
        }

        let plan = Plan::resolve(&self.config, &dataset)?;
        let report = CleaningReport::new(
            dataset.len(),
            dataset.columns().to_vec(),
            self.config.strict,
        );
        info!(
            run_id = %report.run_id,
            rows = dataset.len(),
            columns = dataset.width(),
            strict = self.config.strict,
            "Cleaning run started"
        );

        let mut run = Run {
            plan: &plan,
            origin: (0..dataset.len()).collect(),
            dataset,
            report,
        };

        self.deduplicate(&mut run);
        self.apply_exclusions(&mut run);
        self.normalize_fields(&mut run)?;
        self.handle_missing(&mut run);
        if self.config.optimize_types {
            self.optimize_types(&mut run);
        }

        let Run {
            dataset,
            mut report,
            ..
        } = run;
        report.final_rows = dataset.len();
        report.final_columns = dataset.columns().to_vec();
        debug_assert!(report.reconciles(), "row counts must reconcile");

        info!(
            run_id = %report.run_id,
            original_rows = report.original_rows,
            final_rows = report.final_rows,
            dropped = report.rows_dropped(),
            changed = report.values_changed(),
            flagged = report.issues.len(),
            "Cleaning run finished"
        );

        if self.config.strict && !report.issues.is_empty() {
            warn!(flagged = report.issues.len(), "Strict mode: rejecting run");
            return Err(ToolkitError::Validation(report.issues));
        }
        Ok((dataset, report))
    }

    // =========================================================================
    // 1. DEDUPLICATION
    // =========================================================================

    fn deduplicate(&self, run: &mut Run<'_>) {
        let dedup = &self.config.dedup;
        if !dedup.enabled {
            debug!("Deduplication disabled");
            return;
        }
        let mut engine = DedupEngine::new(run.dataset.len(), dedup.false_positive_rate);
        let keep: Vec<bool> = run
            .dataset
            .rows()
            .iter()
            .map(|row| engine.check_and_insert(&run.plan.dedup_key(row)))
            .collect();
        let dropped = run.drop_rows(&keep);
        run.report.rule_mut("deduplicate", Stage::Deduplication).rows_dropped += dropped;
        run.report.dedup = Some(engine.snapshot());
        info!(rule = "deduplicate", rows_dropped = dropped, "Duplicates removed");
    }

    // =========================================================================
    // 2. BUSINESS RULES
    // =========================================================================

    fn apply_exclusions(&self, run: &mut Run<'_>) {
        let plan = run.plan;
        for exclusion in &plan.exclusions {
            let dropped = match exclusion.column {
                Some(idx) => {
                    let keep: Vec<bool> = run
                        .dataset
                        .column_values(idx)
                        .map(|v| !exclusion.matcher.matches(&plan.normalize_cell(idx, v)))
                        .collect();
                    run.drop_rows(&keep)
                }
                None => 0,
            };
            // Two exclusions may share a name; their drops add up.
            run.report
                .rule_mut(&exclusion.name, Stage::BusinessRule)
                .rows_dropped += dropped;
            info!(rule = %exclusion.name, rows_dropped = dropped, "Business rule applied");
        }
    }

    // =========================================================================
    // 3. FIELD NORMALIZATION
    // =========================================================================

    fn normalize_fields(&self, run: &mut Run<'_>) -> Result<()> {
        let plan = run.plan;

        // Columns have not moved yet, so plan positions are still valid.
        for idx in 0..plan.columns.len() {
            let column = plan.columns[idx].name.clone();
            for step in plan.steps(idx) {
                let rule = step.rule_name(&column);
                let mut changed = 0;
                for row in 0..run.dataset.len() {
                    let current = run.dataset.rows()[row][idx].clone();
                    let new = match plan.apply_step(&step, &current) {
                        Outcome::Unchanged => continue,
                        Outcome::Changed(v) => v,
                        Outcome::Invalid {
                            reason,
                            replacement,
                        } => {
                            run.flag(row, &column, &current, &rule, Stage::Normalization, reason);
                            match replacement {
                                Some(v) => v,
                                None => continue,
                            }
                        }
                    };
                    run.dataset.rows_mut()[row][idx] = new;
                    changed += 1;
                }
                if changed > 0 {
                    run.report.rule_mut(&rule, Stage::Normalization).values_changed += changed;
                    info!(rule = %rule, values_changed = changed, "Field normalized");
                }
            }
        }

        self.split_addresses(run)?;

        for col in plan.columns.iter().filter(|c| c.dropped) {
            if run.dataset.remove_column(&col.name) {
                run.report.column_removed(&col.name);
                info!(column = %col.name, "Column dropped");
            }
        }
        Ok(())
    }

    fn split_addresses(&self, run: &mut Run<'_>) -> Result<()> {
        let plan = run.plan;
        let Some(rule) = &plan.address else {
            return Ok(());
        };
        let Some(src) = run.dataset.column_index(&rule.column) else {
            return Ok(());
        };
        let rule_name = format!("address:{}", rule.column);
        let decided = plan.address_plan();

        let n = run.dataset.len();
        let mut parts: [Vec<Value>; 3] = [
            Vec::with_capacity(n),
            Vec::with_capacity(n),
            Vec::with_capacity(n),
        ];
        let mut unparsed = 0;
        for row in 0..n {
            let cell = run.dataset.rows()[row][src].clone();
            match plan.address_parts(&cell) {
                Some(split) => {
                    for (column, value) in parts.iter_mut().zip(split) {
                        column.push(value);
                    }
                }
                None => {
                    if !cell.is_missing() {
                        unparsed += 1;
                        let reason = match &cell {
                            Value::Text(_) => "expected 'street, state[, zip]'".to_string(),
                            other => format!("{} value is not an address", other.kind()),
                        };
                        run.flag(row, &rule.column, &cell, &rule_name, Stage::Normalization, reason);
                    }
                    parts.iter_mut().for_each(|v| v.push(Value::Missing));
                }
            }
        }

        let mut changed = 0;
        for (part, (name, values)) in rule.derived_columns().into_iter().zip(parts).enumerate() {
            if part == 2 && decided.drop_zip {
                if run.dataset.remove_column(name) {
                    run.report.column_removed(name);
                }
                info!(column = %name, rows = n, "Sparse column dropped");
                continue;
            }
            let values: Vec<Value> = match run.dataset.column_index(name) {
                // Same text already there: keep the stored value as is.
                Some(idx) => run
                    .dataset
                    .column_values(idx)
                    .zip(values)
                    .map(|(old, new)| {
                        if same_text(old, &new) {
                            old.clone()
                        } else {
                            changed += 1;
                            new
                        }
                    })
                    .collect(),
                None => {
                    changed += values.iter().filter(|v| !v.is_missing()).count();
                    values
                }
            };
            if run.dataset.upsert_column(name, values)? {
                run.report.column_added(name);
            }
        }

        if decided.drop_source {
            if run.dataset.remove_column(&rule.column) {
                run.report.column_removed(&rule.column);
            }
        } else if rule.drop_source && unparsed > 0 {
            warn!(
                column = %rule.column,
                unparsed = unparsed,
                "Keeping address column: some values did not parse"
            );
        }

        if changed > 0 {
            run.report.rule_mut(&rule_name, Stage::Normalization).values_changed += changed;
        }
        info!(rule = %rule_name, values_changed = changed, unparsed = unparsed, "Addresses split");
        Ok(())
    }

    // =========================================================================
    // 4. MISSING VALUES
    // =========================================================================

    fn handle_missing(&self, run: &mut Run<'_>) {
        let plan = run.plan;
        let columns = run.dataset.columns().to_vec();
        for (idx, column) in columns.iter().enumerate() {
            let strategy = self.config.missing.strategy_for(column);
            if !strategy.fills() {
                continue;
            }
            let Some(fill) = plan.fill_for(column) else {
                continue;
            };
            let rule = format!("{}:{column}", strategy.label());
            let gaps: Vec<usize> = run
                .dataset
                .column_values(idx)
                .enumerate()
                .filter(|(_, v)| v.is_missing())
                .map(|(row, _)| row)
                .collect();
            if gaps.is_empty() {
                continue;
            }
            match fill {
                Ok(value) => {
                    for &row in &gaps {
                        run.dataset.rows_mut()[row][idx] = value.clone();
                    }
                    run.report.rule_mut(&rule, Stage::MissingValues).values_changed += gaps.len();
                    info!(rule = %rule, values_changed = gaps.len(), "Missing values filled");
                }
                Err(reason) => {
                    for &row in &gaps {
                        run.flag(
                            row,
                            column,
                            &Value::Missing,
                            &rule,
                            Stage::MissingValues,
                            reason.clone(),
                        );
                    }
                    warn!(rule = %rule, gaps = gaps.len(), reason = %reason, "Missing values left unfilled");
                }
            }
        }
    }

    // =========================================================================
    // 5. TYPE OPTIMIZATION
    // =========================================================================

    fn optimize_types(&self, run: &mut Run<'_>) {
        let decisions = types::optimize(&mut run.dataset);
        let rule = "optimize_types";
        let mut converted = 0;
        for decision in &decisions {
            converted += decision.converted;
            let Some(idx) = run.dataset.column_index(&decision.column) else {
                continue;
            };
            for &row in &decision.lossy_rows {
                let value = run.dataset.rows()[row][idx].clone();
                run.flag(
                    row,
                    &decision.column,
                    &value,
                    rule,
                    Stage::TypeOptimization,
                    format!(
                        "cannot be stored as {} without loss; left as {}",
                        decision.after,
                        value.kind()
                    ),
                );
            }
        }
        run.report.rule_mut(rule, Stage::TypeOptimization).values_changed += converted;
        info!(rule = rule, values_changed = converted, "Column types optimized");
        run.report.column_types = decisions;
    }
}

/// Equal values, or the same non-missing text stored under another kind.
fn same_text(old: &Value, new: &Value) -> bool {
    old == new || (!old.is_missing() && !new.is_missing() && old.render() == new.render())
}

impl Run<'_> {
    /// Keep rows where `keep[i]` is true, in step with `origin`.
    fn drop_rows(&mut self, keep: &[bool]) -> usize {
        let dropped = self.dataset.retain_rows(|idx, _| keep[idx]);
        let mut idx = 0;
        self.origin.retain(|_| {
            let k = keep[idx];
            idx += 1;
            k
        });
        dropped
    }

    fn flag(
        &mut self,
        row: usize,
        column: &str,
        value: &Value,
        rule: &str,
        stage: Stage,
        reason: String,
    ) {
        let issue = CellIssue {
            row: self.origin[row],
            column: column.to_string(),
            value: value.render(),
            rule: rule.to_string(),
            reason,
        };
        debug!(issue = %issue, "Cell flagged");
        self.report.rule_mut(rule, stage).cells_flagged += 1;
        self.report.issues.push(issue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnType;

    fn dataset(columns: &[&str], rows: &[&[&str]]) -> Dataset {
        Dataset::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| {
                    r.iter()
                        .map(|s| if s.is_empty() { Value::Missing } else { Value::text(*s) })
                        .collect()
                })
                .collect(),
        )
        .unwrap()
    }

    fn contact_list() -> Dataset {
        dataset(
            &[
                "CustomerID",
                "First_Name",
                "Last_Name",
                "Phone_Number",
                "Address",
                "Paying Customer",
                "Do_Not_Contact",
                "Not_Useful_Column",
            ],
            &[
                &["1001", "Frodo", "Baggins", "123-545-5421", "123 Shire Lane, Shire", "Yes", "No", "True"],
                &["1002", "Abed", "Nadir", "123/643/9775", "93 West Main Street", "No", "Yes", "False"],
                &["1003", "Walter", "/White", "7066950392", "298 Drugs Driveway", "N", "", "True"],
                &["1004", "Dwight", "Schrute", "123-543-2345", "980 Paper Avenue, Pennsylvania, 18503", "Yes", "Y", "True"],
                &["1005", "Jon", "Snow", "876|678|3469", "123 Dragons Road", "Y", "No", "True"],
                &["1006", "Ron", "Swanson", "304-762-2467", "768 City Parkway", "Yes", "Yes", "True"],
                &["1007", "Jeff", "Winger", "", "1209 South Street", "No", "No", "False"],
                &["1008", "Sherlock", "Holmes", "876|678|3469", "98 Clue Drive", "N", "No", "True"],
                &["1009", "Gandalf", "", "N/a", "123 Middle Earth", "Yes", "", "False"],
                &["1010", "Peter", "Parker", "123-545-5421", "25th Main Street, New York", "Yes", "No", "True"],
                &["1010", "Peter", "Parker", "123-545-5421", "25th Main Street, New York", "Yes", "No", "True"],
                &["1011", "Samwise", "Gamgee", "Na--", "612 Shire Lane, Shire", "Yes", "No", "False"],
                &["1012", "Harry", "...Potter", "7066950392", "2039 Main Street", "No", "No", "True"],
            ],
        )
    }

    #[test]
    fn test_row_counts_reconcile() {
        let (out, report) = clean(contact_list(), &CleanerConfig::customer_contacts()).unwrap();
        assert!(report.reconciles());
        assert_eq!(report.original_rows, 13);
        assert_eq!(report.final_rows, out.len());
        assert_eq!(report.dropped_in(Stage::Deduplication), 1);
        assert_eq!(
            report.original_rows - report.rows_dropped(),
            report.final_rows
        );
        for r in &report.rules {
            assert!(r.stage.may_drop_rows() || r.rows_dropped == 0, "{}", r.rule);
        }
    }

    #[test]
    fn test_contact_preset_end_to_end() {
        let (out, report) = clean(contact_list(), &CleanerConfig::customer_contacts()).unwrap();

        // 1002, 1004, 1006 are do-not-contact. 1007, 1009, 1011 have no phone.
        let ids: Vec<Value> = out.column_by_name("CustomerID").unwrap().into_iter().cloned().collect();
        assert_eq!(
            ids,
            [1001, 1003, 1005, 1008, 1010, 1012].map(Value::Int).to_vec()
        );

        let phones = out.column_by_name("Phone_Number").unwrap();
        assert!(phones.iter().all(|p| p.as_str().is_some_and(|s| s.len() == 12)));
        assert_eq!(phones[2], &Value::text("876-678-3469"));

        let last = out.column_by_name("Last_Name").unwrap();
        assert_eq!(last[1], &Value::text("White"));
        assert_eq!(last[5], &Value::text("Potter"));

        assert!(!out.has_column("Not_Useful_Column"));
        assert!(out.has_column("Street_Address"));
        assert!(out.has_column("State"));
        // No surviving row has a zip, so the derived column is too sparse to keep.
        assert!(!out.has_column("Zip_Code"));
        assert!(report.columns_removed.contains(&"Not_Useful_Column".to_string()));
        assert!(report.columns_added.contains(&"Street_Address".to_string()));
        assert!(!report.columns_added.contains(&"Zip_Code".to_string()));
        // Four addresses have no comma: flagged, and the source column is kept.
        assert!(out.has_column("Address"));
        let unparsed = report.issues.iter().filter(|i| i.rule == "address:Address").count();
        assert_eq!(unparsed, 4);

        let paying = out.column_by_name("Paying Customer").unwrap();
        assert!(paying.iter().all(|v| *v == &Value::text("Y") || *v == &Value::text("N")));

        let types: Vec<(&str, ColumnType)> = report
            .column_types
            .iter()
            .map(|d| (d.column.as_str(), d.after))
            .collect();
        assert!(types.contains(&("CustomerID", ColumnType::Integer)));
    }

    #[test]
    fn test_cleaning_is_a_fixed_point() {
        let config = CleanerConfig::customer_contacts();
        let (once, _) = clean(contact_list(), &config).unwrap();
        let (twice, report) = clean(once.clone(), &config).unwrap();
        assert_eq!(twice, once);
        assert_eq!(report.rows_dropped(), 0);
        assert_eq!(report.values_changed(), 0);
    }

    #[test]
    fn test_fixed_point_with_fills() {
        let mut config = CleanerConfig::default();
        config.missing.columns.insert("Age".into(), MissingStrategy::Median);
        config.missing.columns.insert("City".into(), MissingStrategy::Mode);
        let input = dataset(
            &["Name", "Age", "City"],
            &[
                &["ada", "36", "London"],
                &["ada", "", "London"],
                &["bob", "n/a", " Paris "],
                &["cy", "40", "London"],
                &["cy", "40", ""],
                &["dee", "7", "Paris"],
            ],
        );
        let (once, report) = clean(input, &config).unwrap();
        assert!(report.reconciles());
        let (twice, _) = clean(once.clone(), &config).unwrap();
        assert_eq!(twice, once);
    }

    #[test]
    fn test_exact_duplicates_scenario() {
        // 2,361 rows, 5 exact duplicates, no exclusions.
        let mut rows: Vec<Vec<Value>> = (0..2356)
            .map(|i| vec![Value::Int(i), Value::text(format!("user{i}"))])
            .collect();
        for i in [3, 100, 999, 1500, 2300] {
            rows.push(rows[i].clone());
        }
        let ds = Dataset::new(vec!["id".into(), "login".into()], rows).unwrap();
        let (out, report) = clean(ds, &CleanerConfig::default()).unwrap();
        assert_eq!(report.original_rows, 2361);
        assert_eq!(out.len(), 2356);
        assert_eq!(report.dropped_in(Stage::Deduplication), 5);
        assert_eq!(report.dropped_in(Stage::BusinessRule), 0);
        let rate = report.retention_rate().unwrap();
        assert_eq!(format!("{:.1}", rate * 100.0), "99.8");
        assert!(report.render_text().contains("Data retention rate: 99.8%"));
    }

    #[test]
    fn test_dedup_on_key_subset_keeps_first() {
        let mut config = CleanerConfig::default();
        config.dedup.key_columns = vec!["email".into()];
        let ds = dataset(
            &["email", "seen"],
            &[&["a@x.org", "mon"], &["b@x.org", "tue"], &["a@x.org", "wed"]],
        );
        let (out, _) = clean(ds, &config).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.get(0, 1), Some(&Value::text("mon")));
    }

    #[test]
    fn test_missing_required_columns_fail_before_any_rule() {
        let mut config = CleanerConfig::default();
        config.required_columns = vec!["Phone".into(), "Email".into(), "name".into()];
        let err = clean(dataset(&["name"], &[&["x"]]), &config).unwrap_err();
        match err {
            ToolkitError::MissingColumns(cols) => assert_eq!(cols, vec!["Phone", "Email"]),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_rules_on_absent_columns_are_no_ops() {
        let mut config = CleanerConfig::default();
        config.exclusions.push(Exclusion::new(
            "banned",
            Predicate::Truthy {
                column: "Banned".into(),
            },
        ));
        config.fields.push(FieldRule::new(
            "Phone",
            FieldTransform::Phone {
                policy: PhonePolicy::Blank,
            },
        ));
        let (out, report) = clean(dataset(&["x"], &[&["1"], &["2"]]), &config).unwrap();
        assert_eq!(out.len(), 2);
        let banned = report.rules.iter().find(|r| r.rule == "banned").unwrap();
        assert_eq!(banned.rows_dropped, 0);
    }

    #[test]
    fn test_bad_cells_are_flagged_not_fatal() {
        let mut config = CleanerConfig::default();
        config.fields.push(FieldRule::new(
            "phone",
            FieldTransform::Phone {
                policy: PhonePolicy::Flag,
            },
        ));
        config.fields.push(FieldRule::new("active", FieldTransform::Boolean));
        let ds = dataset(
            &["phone", "active"],
            &[&["555 123 4567", "yes"], &["12345", "maybe"], &["5551234567", "no"]],
        );
        let (out, report) = clean(ds, &config).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.get(1, 0), Some(&Value::text("12345")));
        assert_eq!(report.issues.len(), 2);
        assert!(report.issues.iter().all(|i| i.row == 1));
    }

    #[test]
    fn test_strict_mode_lists_every_offending_cell() {
        let mut config = CleanerConfig::default();
        config.strict = true;
        config.fields.push(FieldRule::new("active", FieldTransform::Boolean));
        let ds = dataset(
            &["id", "active"],
            &[&["1", "yes"], &["2", "maybe"], &["3", "no"], &["4", "sometimes"]],
        );
        match clean(ds, &config).unwrap_err() {
            ToolkitError::Validation(issues) => {
                let rows: Vec<usize> = issues.iter().map(|i| i.row).collect();
                assert_eq!(rows, vec![1, 3]);
                assert!(issues.iter().all(|i| i.column == "active"));
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn test_issue_rows_point_at_the_input() {
        let mut config = CleanerConfig::default();
        config.fields.push(FieldRule::new("active", FieldTransform::Boolean));
        let ds = dataset(
            &["id", "active"],
            &[&["1", "yes"], &["1", "yes"], &["2", "maybe"]],
        );
        let (_, report) = clean(ds, &config).unwrap();
        assert_eq!(report.issues[0].row, 2);
    }

    #[test]
    fn test_lossy_values_stay_text_and_are_reported() {
        let ds = dataset(&["zip"], &[&["10001"], &["02139"], &["94105"]]);
        let (out, report) = clean(ds, &CleanerConfig::default()).unwrap();
        assert_eq!(out.get(0, 0), Some(&Value::Int(10001)));
        assert_eq!(out.get(1, 0), Some(&Value::text("02139")));
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].rule, "optimize_types");
    }

    #[test]
    fn test_drop_row_strategy_counts_as_business_rule() {
        let mut config = CleanerConfig::default();
        config.missing.columns.insert("email".into(), MissingStrategy::DropRow);
        let ds = dataset(
            &["id", "email"],
            &[&["1", "a@x.org"], &["2", "N/A"], &["3", ""], &["4", "b@x.org"]],
        );
        let (out, report) = clean(ds, &config).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(report.dropped_in(Stage::BusinessRule), 2);
        assert!(report.reconciles());
    }

    #[test]
    fn test_exclusions_sharing_a_name_still_reconcile() {
        let mut config = CleanerConfig::default();
        for column in ["status", "account"] {
            config.exclusions.push(Exclusion::new(
                "closed",
                Predicate::Equals {
                    column: column.into(),
                    value: "closed".into(),
                },
            ));
        }
        let ds = dataset(
            &["id", "status", "account"],
            &[&["1", "closed", "open"], &["2", "open", "closed"], &["3", "open", "open"]],
        );
        let (out, report) = clean(ds, &config).unwrap();
        assert_eq!(out.len(), 1);
        let closed: Vec<&RuleReport> = report.rules.iter().filter(|r| r.rule == "closed").collect();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].rows_dropped, 2);
        assert!(report.reconciles());
    }

    #[test]
    fn test_exclusion_named_like_a_builtin_rule_keeps_its_own_count() {
        let mut config = CleanerConfig::default();
        config.missing.columns.insert("email".into(), MissingStrategy::DropRow);
        config.exclusions.push(Exclusion::new(
            "deduplicate",
            Predicate::Equals {
                column: "id".into(),
                value: "2".into(),
            },
        ));
        config.exclusions.push(Exclusion::new(
            "missing:email",
            Predicate::Equals {
                column: "id".into(),
                value: "3".into(),
            },
        ));
        let ds = dataset(
            &["id", "email"],
            &[
                &["1", "a@x.org"],
                &["1", "a@x.org"],
                &["2", "b@x.org"],
                &["3", "c@x.org"],
                &["4", ""],
                &["5", "d@x.org"],
            ],
        );
        let (out, report) = clean(ds, &config).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(report.dropped_in(Stage::Deduplication), 1);
        assert_eq!(report.dropped_in(Stage::BusinessRule), 3);
        let missing = report.rules.iter().find(|r| r.rule == "missing:email").unwrap();
        assert_eq!(missing.rows_dropped, 2);
        assert!(report.reconciles());
    }

    #[test]
    fn test_fixed_point_when_sparse_zip_and_source_are_dropped() {
        let mut config = CleanerConfig::default();
        config.address = Some(AddressRule {
            sparse_ratio: Some(0.8),
            ..AddressRule::for_column("address")
        });
        let lines: Vec<String> = ["1 Main St, NY, 10001".to_string(), "1 Main St, NY".to_string()]
            .into_iter()
            .chain((2..10).map(|i| format!("{i} Elm St, CA")))
            .collect();
        let rows: Vec<[&str; 1]> = lines.iter().map(|l| [l.as_str()]).collect();
        let rows: Vec<&[&str]> = rows.iter().map(|r| &r[..]).collect();

        let (once, report) = clean(dataset(&["address"], &rows), &config).unwrap();
        // Without the zip the first two rows are the same address.
        assert_eq!(once.len(), 9);
        assert_eq!(report.dropped_in(Stage::Deduplication), 1);
        assert_eq!(once.columns(), ["Street_Address", "State"]);
        let split = report.rules.iter().find(|r| r.rule == "address:address").unwrap();
        assert_eq!(split.values_changed, 18);

        let (twice, again) = clean(once.clone(), &config).unwrap();
        assert_eq!(twice, once);
        assert_eq!(again.rows_dropped(), 0);
        assert_eq!(again.values_changed(), 0);
    }

    #[test]
    fn test_resplit_leaves_stored_zip_alone() {
        let mut config = CleanerConfig::default();
        config.address = Some(AddressRule {
            drop_source: false,
            ..AddressRule::for_column("address")
        });
        let ds = dataset(
            &["address"],
            &[&["1 Main St, NY, 10001"], &["2 Elm St, CA, 94105"]],
        );
        let (once, report) = clean(ds, &config).unwrap();
        assert_eq!(once.column_by_name("Zip_Code").unwrap()[0], &Value::Int(10001));
        let split = report.rules.iter().find(|r| r.rule == "address:address").unwrap();
        assert_eq!(split.values_changed, 6);

        let (twice, again) = clean(once.clone(), &config).unwrap();
        assert_eq!(twice, once);
        assert_eq!(again.values_changed(), 0);
        assert!(again.rules.iter().all(|r| r.rule != "address:address"));
    }

    #[test]
    fn test_dedup_keeps_cells_that_differ_as_text() {
        let ds = dataset(
            &["version", "note"],
            &[&["1.0", "x"], &["1", "x"], &["beta", "y"]],
        );
        let (out, report) = clean(ds, &CleanerConfig::default()).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(report.dropped_in(Stage::Deduplication), 0);
        assert_eq!(out.get(0, 0), Some(&Value::text("1.0")));
        assert_eq!(out.get(1, 0), Some(&Value::text("1")));
    }

    #[test]
    fn test_dedup_merges_numbers_that_narrow_alike() {
        let ds = dataset(
            &["version", "note"],
            &[&["1.0", "x"], &["1", "x"], &["2", "y"]],
        );
        let (out, _) = clean(ds.clone(), &CleanerConfig::default()).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.get(0, 0), Some(&Value::Int(1)));

        // Without type optimization the cells stay text and stay apart.
        let mut config = CleanerConfig::default();
        config.optimize_types = false;
        let (out, _) = clean(ds, &config).unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_placeholders_become_missing_not_zero() {
        let ds = dataset(
            &["id", "score"],
            &[&["1", "1"], &["2", "NaN"], &["3", "null"], &["4", "3"]],
        );
        let (out, _) = clean(ds, &CleanerConfig::default()).unwrap();
        assert_eq!(out.get(1, 1), Some(&Value::Missing));
        assert_eq!(out.get(2, 1), Some(&Value::Missing));
        assert_eq!(out.get(3, 1), Some(&Value::Int(3)));
    }
}
