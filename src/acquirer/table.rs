//! HTML table extraction. Pure: takes the page text, returns a dataset.

use std::collections::HashSet;
use std::sync::LazyLock;

use aho_corasick::AhoCorasick;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::acquirer::SourceDescriptor;
use crate::error::{Result, ToolkitError};
use crate::models::{Dataset, Value};

/// `<table` in any letter case.
static TABLE_TAG: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(["<table"])
        .expect("static tag pattern always compiles")
});

/// Extract the first table matching `desc.table_selector` whose header row
/// mentions every expected label.
pub fn parse_table(html: &str, desc: &SourceDescriptor) -> Result<Dataset> {
    let not_found = || ToolkitError::SchemaNotFound {
        url: desc.url.clone(),
        expected: desc.expected_headers.clone(),
    };

    // No table markup at all: skip building the DOM.
    if !TABLE_TAG.is_match(html) {
        debug!(url = %desc.url, "Page contains no table markup");
        return Err(not_found());
    }

    let table_sel = Selector::parse(&desc.table_selector).map_err(|e| {
        ToolkitError::Config(format!(
            "invalid table selector '{}': {e:?}",
            desc.table_selector
        ))
    })?;
    let row_sel = Selector::parse("tr").map_err(|e| {
        ToolkitError::Config(format!("invalid row selector: {e:?}"))
    })?;

    let document = Html::parse_document(html);
    let mut candidates = 0usize;

    for table in document.select(&table_sel) {
        candidates += 1;
        let mut rows = table.select(&row_sel);
        let Some(header_row) = rows.next() else {
            continue;
        };
        let headers = cell_texts(header_row);
        if !has_expected_headers(&headers, &desc.expected_headers) {
            debug!(table = candidates, headers = ?headers, "Table header does not match");
            continue;
        }

        let columns = unique_column_names(headers);
        let numeric: Vec<bool> = columns
            .iter()
            .map(|c| desc.is_numeric_column(c))
            .collect();

        let mut data = Vec::new();
        let mut skipped = 0usize;
        let mut unparsed = 0usize;
        for row in rows {
            let cells = cell_texts(row);
            if cells.is_empty() {
                continue;
            }
            if cells.len() != columns.len() {
                skipped += 1;
                continue;
            }
            let values = cells
                .into_iter()
                .zip(&numeric)
                .map(|(cell, &is_numeric)| {
                    if is_numeric {
                        let v = parse_number(&cell);
                        if v.is_missing() && !cell.is_empty() {
                            unparsed += 1;
                            debug!(cell = %cell, "Numeric cell did not parse");
                        }
                        v
                    } else if cell.is_empty() {
                        Value::Missing
                    } else {
                        Value::Text(cell)
                    }
                })
                .collect();
            data.push(values);
        }

        if skipped > 0 {
            warn!(
                url = %desc.url,
                skipped = skipped,
                "Skipped rows whose cell count differs from the header"
            );
        }
        if unparsed > 0 {
            warn!(url = %desc.url, cells = unparsed, "Numeric cells left missing");
        }
        info!(
            url = %desc.url,
            table = candidates,
            rows = data.len(),
            columns = columns.len(),
            "Extracted table"
        );
        return Dataset::new(columns, data);
    }

    warn!(
        url = %desc.url,
        tables = candidates,
        expected = ?desc.expected_headers,
        "No table with the expected headers"
    );
    Err(not_found())
}

/// Text of the direct `th`/`td` children of a row, whitespace collapsed.
fn cell_texts(row: ElementRef<'_>) -> Vec<String> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| matches!(el.value().name(), "th" | "td"))
        .map(|el| {
            el.text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

fn has_expected_headers(headers: &[String], expected: &[String]) -> bool {
    let lowered: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();
    expected.iter().all(|label| {
        let label = label.to_lowercase();
        lowered.iter().any(|h| h.contains(&label))
    })
}

/// Blank headers get a positional name and repeats get a numeric suffix,
/// so the header always forms a valid dataset.
fn unique_column_names(headers: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(headers.len());
    headers
        .into_iter()
        .enumerate()
        .map(|(idx, h)| {
            let base = if h.is_empty() {
                format!("column_{}", idx + 1)
            } else {
                h
            };
            let mut name = base.clone();
            let mut n = 2;
            while !seen.insert(name.clone()) {
                name = format!("{base}_{n}");
                n += 1;
            }
            name
        })
        .collect()
}

/// `$1,234.5` -> 1234.5. Anything that is not a number becomes missing.
fn parse_number(cell: &str) -> Value {
    let cleaned: String = cell.chars().filter(|c| !matches!(c, '$' | ',')).collect();
    let cleaned = cleaned.trim();
    if let Ok(i) = cleaned.parse::<i64>() {
        return Value::Int(i);
    }
    match cleaned.parse::<f64>() {
        Ok(f) if f.is_finite() => Value::Float(f),
        _ => Value::Missing,
    }
}
