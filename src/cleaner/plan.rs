//! A cleaner configuration resolved against one dataset's header.
//!
//! Resolution happens once, before any rule runs. It turns column names into
//! positions, adds the contact-detection rules, compiles exclusions, and
//! computes every fill value up front. It also settles the address split
//! (whether the source and the zip column survive) and how each dedup key
//! cell will be typed, both from the rows that pass the business rules.
//! Because the plan knows exactly what each cell will look like after
//! normalization, filling and type optimization, dedup and the business
//! rules can compare rows in their cleaned form. That is what makes a second
//! cleaning pass a no-op.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::cleaner::config::{AddressRule, CleanerConfig};
use crate::cleaner::missing::{estimate, is_token, MissingStrategy};
use crate::cleaner::normalize::{parse_address, Case, FieldTransform, Outcome, PhonePolicy};
use crate::cleaner::rules::{Exclusion, Matcher, Predicate};
use crate::cleaner::types::{canonical, infer};
use crate::column_scanner::{header_contains, scan_columns, ColumnRole};
use crate::error::Result;
use crate::models::{ColumnType, Dataset, Value};

/// Characters stripped from both ends of detected name columns.
pub const NAME_TRIM_CHARS: &str = "123./_-";

const DO_NOT_CONTACT: &[&str] = &["do_not_contact", "do not contact", "donotcontact"];

/// Separates cells inside a dedup key.
const KEY_SEPARATOR: char = '\u{1f}';

/// One step applied to every cell of a column during field normalization.
#[derive(Debug, Clone, Copy)]
pub enum CellStep<'a> {
    Trim,
    Tokens,
    Transform(&'a FieldTransform),
}

impl CellStep<'_> {
    /// The report entry this step's changes are counted under.
    pub fn rule_name(&self, column: &str) -> String {
        match self {
            CellStep::Trim => "trim_whitespace".into(),
            CellStep::Tokens => "missing_tokens".into(),
            CellStep::Transform(t) => format!("{}:{column}", t.label()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnPlan {
    pub name: String,
    pub transform: Option<FieldTransform>,
    pub dropped: bool,
}

#[derive(Debug, Clone)]
pub struct CompiledExclusion {
    pub name: String,
    pub column: Option<usize>,
    pub matcher: Matcher,
}

/// What the address split keeps, decided once for the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddressPlan {
    pub drop_source: bool,
    pub drop_zip: bool,
}

/// Where one dedup key cell comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeySlot {
    Column(usize),
    /// Street, state or zip split out of the address column.
    AddressPart(usize),
}

/// How a key cell is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyMode {
    /// The column will be narrowed: compare the typed value ("1.0" == "1").
    Typed,
    /// The column stays as it is: compare kind and text.
    Exact,
}

#[derive(Debug)]
pub struct Plan {
    pub columns: Vec<ColumnPlan>,
    pub exclusions: Vec<CompiledExclusion>,
    pub address: Option<AddressRule>,
    address_source: Option<usize>,
    tokens: HashSet<String>,
    trim_text: bool,
    address_plan: AddressPlan,
    key: Vec<(KeySlot, KeyMode)>,
    /// Fill value (or why there is none) per column that uses a filling strategy.
    fills: HashMap<String, std::result::Result<Value, String>>,
}

impl Plan {
    pub fn resolve(config: &CleanerConfig, dataset: &Dataset) -> Result<Plan> {
        let header = dataset.columns();
        let mut columns: Vec<ColumnPlan> = header
            .iter()
            .map(|name| ColumnPlan {
                name: name.clone(),
                transform: None,
                dropped: false,
            })
            .collect();

        for rule in &config.fields {
            match columns.iter_mut().find(|c| c.name == rule.column) {
                Some(col) => {
                    if col.transform.is_some() {
                        warn!(column = %rule.column, "Later field rule replaces an earlier one");
                    }
                    col.transform = Some(rule.transform.clone());
                }
                None => debug!(column = %rule.column, "Field rule names an absent column; skipped"),
            }
        }

        for name in &config.drop_columns {
            match columns.iter_mut().find(|c| &c.name == name) {
                Some(col) => col.dropped = true,
                None => debug!(column = %name, "Drop rule names an absent column; skipped"),
            }
        }

        let mut address = config.address.clone();
        let mut contact_exclusions = Vec::new();
        if config.detect_contact_columns {
            detect_contact_columns(
                config,
                &mut columns,
                &mut address,
                &mut contact_exclusions,
            );
        }

        for col in columns.iter_mut().filter(|c| c.dropped) {
            col.transform = None;
        }

        let address_source = address.as_ref().and_then(|rule| {
            let idx = dataset.column_index(&rule.column);
            if idx.is_none() {
                debug!(column = %rule.column, "Address column absent; address parsing skipped");
            }
            idx
        });
        if address_source.is_none() {
            address = None;
        }

        let mut plan = Plan {
            columns,
            exclusions: Vec::new(),
            address,
            address_source,
            tokens: config.missing.token_set(),
            trim_text: config.trim_text,
            address_plan: AddressPlan::default(),
            key: Vec::new(),
            fills: HashMap::new(),
        };

        // Exclusions: configured ones first, then detected contact rules,
        // then drop-row missing strategies.
        let drop_row_rules = plan
            .columns
            .iter()
            .filter(|c| !c.dropped)
            .filter(|c| *config.missing.strategy_for(&c.name) == MissingStrategy::DropRow)
            .map(|c| {
                Exclusion::new(
                    format!("missing:{}", c.name),
                    Predicate::Missing {
                        column: c.name.clone(),
                    },
                )
            })
            .collect::<Vec<_>>();
        for exclusion in config
            .exclusions
            .iter()
            .chain(&contact_exclusions)
            .chain(&drop_row_rules)
        {
            if plan.exclusions.iter().any(|e| e.name == exclusion.name) {
                warn!(rule = %exclusion.name, "Exclusion name repeats; drops are counted together");
            }
            let column = dataset.column_index(exclusion.predicate.column());
            if column.is_none() {
                debug!(rule = %exclusion.name, "Exclusion column absent; rule is a no-op");
            }
            plan.exclusions.push(CompiledExclusion {
                name: exclusion.name.clone(),
                column,
                matcher: exclusion.predicate.compile()?,
            });
        }

        // Only rows that pass every business rule reach the output, so the
        // address split and key typing are judged on those.
        let survivors: Vec<&[Value]> = dataset
            .rows()
            .iter()
            .map(Vec::as_slice)
            .filter(|row| !plan.excluded(row))
            .collect();

        plan.address_plan = plan.resolve_address(&survivors);
        plan.fills = plan.estimate_fills(config, dataset);
        let slots = plan.resolve_key_slots(config, dataset);
        plan.key = slots
            .into_iter()
            .map(|slot| {
                let mode = if config.optimize_types {
                    let cells: Vec<Value> =
                        survivors.iter().map(|row| plan.key_cell(slot, row)).collect();
                    match infer(&cells).column_type {
                        ColumnType::Boolean | ColumnType::Integer | ColumnType::Float => {
                            KeyMode::Typed
                        }
                        _ => KeyMode::Exact,
                    }
                } else {
                    KeyMode::Exact
                };
                (slot, mode)
            })
            .collect();
        debug!(key = ?plan.key, "Dedup key resolved");
        Ok(plan)
    }

    /// True when some exclusion will drop `row`.
    fn excluded(&self, row: &[Value]) -> bool {
        self.exclusions.iter().any(|e| {
            e.column
                .is_some_and(|idx| e.matcher.matches(&self.normalize_cell(idx, &row[idx])))
        })
    }

    fn resolve_address(&self, rows: &[&[Value]]) -> AddressPlan {
        let (Some(rule), Some(src)) = (&self.address, self.address_source) else {
            return AddressPlan::default();
        };
        let mut unparsed = 0;
        let mut no_zip = 0;
        for row in rows {
            let cell = self.normalize_cell(src, &row[src]);
            match self.address_parts(&cell) {
                Some(parts) => {
                    if parts[2].is_missing() {
                        no_zip += 1;
                    }
                }
                None => {
                    no_zip += 1;
                    if !cell.is_missing() {
                        unparsed += 1;
                    }
                }
            }
        }
        let n = rows.len();
        let decided = AddressPlan {
            drop_source: (rule.drop_source && unparsed == 0) || self.columns[src].dropped,
            drop_zip: rule
                .sparse_ratio
                .is_some_and(|ratio| n > 0 && no_zip as f64 / n as f64 > ratio),
        };
        debug!(
            column = %rule.column,
            rows = n,
            unparsed = unparsed,
            no_zip = no_zip,
            drop_source = decided.drop_source,
            drop_zip = decided.drop_zip,
            "Address split planned"
        );
        decided
    }

    /// Key cells for the address: the source itself while it survives,
    /// otherwise the parts that will replace it.
    fn address_slots(&self) -> Vec<KeySlot> {
        let Some(src) = self.address_source else {
            return Vec::new();
        };
        if !self.address_plan.drop_source {
            return vec![KeySlot::Column(src)];
        }
        (0..3)
            .filter(|&part| part != 2 || !self.address_plan.drop_zip)
            .map(KeySlot::AddressPart)
            .collect()
    }

    fn resolve_key_slots(&self, config: &CleanerConfig, dataset: &Dataset) -> Vec<KeySlot> {
        let derived: Vec<&str> = self
            .address
            .as_ref()
            .map(|rule| rule.derived_columns().to_vec())
            .unwrap_or_default();

        let mut slots = Vec::new();
        for name in &config.dedup.key_columns {
            let Some(idx) = dataset.column_index(name) else {
                warn!(column = %name, "Dedup key column absent; ignored");
                continue;
            };
            if Some(idx) == self.address_source {
                slots.extend(self.address_slots());
            } else if let Some(part) = derived.iter().position(|d| d == name) {
                // Rewritten by the address split before anyone sees it.
                if part != 2 || !self.address_plan.drop_zip {
                    slots.push(KeySlot::AddressPart(part));
                }
            } else {
                slots.push(KeySlot::Column(idx));
            }
        }
        if slots.is_empty() {
            slots = self
                .columns
                .iter()
                .enumerate()
                .filter(|(idx, c)| {
                    !c.dropped
                        && Some(*idx) != self.address_source
                        && !derived.contains(&c.name.as_str())
                })
                .map(|(idx, _)| KeySlot::Column(idx))
                .collect();
            slots.extend(self.address_slots());
        }
        slots
    }

    fn slot_name(&self, slot: KeySlot) -> &str {
        match slot {
            KeySlot::Column(idx) => &self.columns[idx].name,
            KeySlot::AddressPart(part) => self
                .address
                .as_ref()
                .map_or("", |rule| rule.derived_columns()[part]),
        }
    }

    /// The value `row` will hold in `slot` once normalized and filled.
    fn key_cell(&self, slot: KeySlot, row: &[Value]) -> Value {
        let v = match (slot, self.address_source) {
            (KeySlot::Column(idx), _) => self.normalize_cell(idx, &row[idx]),
            (KeySlot::AddressPart(part), Some(src)) => self
                .address_parts(&self.normalize_cell(src, &row[src]))
                .map(|parts| parts[part].clone())
                .unwrap_or(Value::Missing),
            (KeySlot::AddressPart(_), None) => Value::Missing,
        };
        if v.is_missing() {
            if let Some(Ok(fill)) = self.fills.get(self.slot_name(slot)) {
                return fill.clone();
            }
        }
        v
    }

    pub fn address_plan(&self) -> AddressPlan {
        self.address_plan
    }

    /// Street, state and zip of a normalized address cell, or `None` when
    /// it is missing or does not parse.
    pub fn address_parts(&self, cell: &Value) -> Option<[Value; 3]> {
        let parts = cell.as_str().and_then(parse_address)?;
        Some(
            [Value::Text(parts.street), Value::Text(parts.state), parts.zip.into()]
                .map(|v| self.apply_step(&CellStep::Tokens, &v).resolve(&v)),
        )
    }

    /// Fill values for every column with a filling strategy, computed from
    /// the normalized input so the dedup key can already see them.
    fn estimate_fills(
        &self,
        config: &CleanerConfig,
        dataset: &Dataset,
    ) -> HashMap<String, std::result::Result<Value, String>> {
        let mut fills = HashMap::new();

        let mut targets: Vec<(String, Vec<Value>, Option<usize>)> = Vec::new();
        for (idx, col) in self.columns.iter().enumerate().filter(|(_, c)| !c.dropped) {
            if config.missing.strategy_for(&col.name).fills() {
                let values = dataset
                    .column_values(idx)
                    .map(|v| self.normalize_cell(idx, v))
                    .collect();
                targets.push((col.name.clone(), values, Some(idx)));
            }
        }
        if let (Some(rule), Some(src)) = (&self.address, self.address_source) {
            for (part, name) in rule.derived_columns().into_iter().enumerate() {
                if !config.missing.strategy_for(name).fills() {
                    continue;
                }
                let values = dataset
                    .column_values(src)
                    .map(|v| {
                        self.address_parts(&self.normalize_cell(src, v))
                            .map(|parts| parts[part].clone())
                            .unwrap_or(Value::Missing)
                    })
                    .collect();
                targets.push((name.to_string(), values, None));
            }
        }

        for (name, values, idx) in targets {
            let strategy = config.missing.strategy_for(&name);
            let fill = match estimate(strategy, &values) {
                Ok(Some(v)) => {
                    let v = match idx {
                        Some(idx) => self.normalize_cell(idx, &v),
                        None => self.apply_steps(&[CellStep::Trim, CellStep::Tokens], &v),
                    };
                    if v.is_missing() {
                        Err(format!("{} estimate normalizes to missing", strategy.label()))
                    } else {
                        Ok(v)
                    }
                }
                Ok(None) => continue,
                Err(reason) => Err(reason),
            };
            debug!(column = %name, strategy = strategy.label(), fill = ?fill, "Fill value resolved");
            fills.insert(name, fill);
        }
        fills
    }

    /// Normalization steps for input column `idx`, in order.
    pub fn steps(&self, idx: usize) -> Vec<CellStep<'_>> {
        let col = &self.columns[idx];
        if col.dropped {
            return Vec::new();
        }
        let mut steps = Vec::with_capacity(4);
        if self.trim_text {
            steps.push(CellStep::Trim);
        }
        steps.push(CellStep::Tokens);
        if let Some(t) = &col.transform {
            steps.push(CellStep::Transform(t));
            // A transform can produce a placeholder ("n/a." -> "N/A").
            steps.push(CellStep::Tokens);
        }
        steps
    }

    pub fn apply_step(&self, step: &CellStep<'_>, value: &Value) -> Outcome {
        match step {
            CellStep::Trim => match value {
                Value::Text(s) if s.trim().len() != s.len() => {
                    Outcome::Changed(Value::text(s.trim()))
                }
                _ => Outcome::Unchanged,
            },
            CellStep::Tokens => {
                if is_token(&self.tokens, value) {
                    Outcome::Changed(Value::Missing)
                } else {
                    Outcome::Unchanged
                }
            }
            CellStep::Transform(t) => t.apply(value),
        }
    }

    fn apply_steps(&self, steps: &[CellStep<'_>], value: &Value) -> Value {
        steps.iter().fold(value.clone(), |v, step| {
            self.apply_step(step, &v).resolve(&v)
        })
    }

    /// What field normalization will turn `value` in input column `idx` into.
    pub fn normalize_cell(&self, idx: usize, value: &Value) -> Value {
        self.apply_steps(&self.steps(idx), value)
    }

    pub fn fill_for(&self, column: &str) -> Option<&std::result::Result<Value, String>> {
        self.fills.get(column)
    }

    /// A key equal for two input rows exactly when they will be equal on the
    /// key columns once cleaned.
    pub fn dedup_key(&self, row: &[Value]) -> String {
        let mut key = String::new();
        for &(slot, mode) in &self.key {
            let v = self.key_cell(slot, row);
            match mode {
                KeyMode::Typed => key.push_str(&canonical(&v)),
                KeyMode::Exact if v.is_missing() => key.push('\u{0}'),
                KeyMode::Exact => {
                    key.push_str(v.kind());
                    key.push(':');
                    key.push_str(&v.render());
                }
            }
            key.push(KEY_SEPARATOR);
        }
        key
    }
}

/// Contact-list rules for columns recognised by header.
fn detect_contact_columns(
    config: &CleanerConfig,
    columns: &mut [ColumnPlan],
    address: &mut Option<AddressRule>,
    exclusions: &mut Vec<Exclusion>,
) {
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    let scans = scan_columns(&names);
    let derived: Vec<String> = AddressRule::for_column("")
        .derived_columns()
        .iter()
        .map(|s| s.to_string())
        .collect();

    for (col, scan) in columns.iter_mut().zip(scans) {
        if col.dropped {
            continue;
        }
        if scan.role == ColumnRole::Unused {
            debug!(column = %col.name, "Scratch column detected; dropping");
            col.dropped = true;
            continue;
        }

        let detected = match scan.role {
            ColumnRole::Name => Some(FieldTransform::Text {
                trim_chars: NAME_TRIM_CHARS.into(),
                case: Case::Title,
            }),
            ColumnRole::Phone => Some(FieldTransform::Phone {
                policy: PhonePolicy::Blank,
            }),
            ColumnRole::Flag => Some(FieldTransform::Boolean),
            ColumnRole::Email => Some(FieldTransform::Text {
                trim_chars: String::new(),
                case: Case::Lower,
            }),
            ColumnRole::Currency => Some(FieldTransform::Currency),
            _ => None,
        };
        if col.transform.is_none() {
            if let Some(t) = detected {
                debug!(column = %col.name, role = %scan.role, kind = t.label(), "Contact column detected");
                col.transform = Some(t);
            }
        }

        match scan.role {
            ColumnRole::Flag if DO_NOT_CONTACT.iter().any(|k| header_contains(&col.name, k)) => {
                exclusions.push(Exclusion::new(
                    format!("do_not_contact:{}", col.name),
                    Predicate::Truthy {
                        column: col.name.clone(),
                    },
                ));
            }
            ColumnRole::Phone => {
                exclusions.push(Exclusion::new(
                    format!("invalid_phone:{}", col.name),
                    Predicate::InvalidPhone {
                        column: col.name.clone(),
                    },
                ));
            }
            ColumnRole::Address if address.is_none() && !derived.contains(&col.name) => {
                *address = Some(AddressRule {
                    sparse_ratio: Some(config.sparse_column_ratio),
                    ..AddressRule::for_column(col.name.clone())
                });
            }
            _ => {}
        }
    }
}
