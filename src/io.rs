// =============================================================================
// io.rs — GETTING TABLES IN AND OUT
// =============================================================================
//
// CSV and JSON only. CSV cells arrive as text (empty field = missing) and
// it is the cleaner's type optimization that decides what they really are.
// JSON must be an array of flat objects; keys missing from some objects
// become explicit missing cells, never omitted columns.
// =============================================================================

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use serde_json::{Map, Value as Json};
use tracing::{debug, info};

use crate::error::{Result, ToolkitError};
use crate::models::{Dataset, Value};

/// Load a dataset, picking the format from the file extension.
pub fn load(path: &Path) -> Result<Dataset> {
    let ext = extension(path);
    let dataset = match ext.as_str() {
        "csv" => read_csv(File::open(path)?)?,
        "json" => read_json(File::open(path)?)?,
        _ => return Err(ToolkitError::UnsupportedFormat(path.to_path_buf())),
    };
    info!(
        path = %path.display(),
        rows = dataset.len(),
        columns = dataset.width(),
        "Loaded dataset"
    );
    Ok(dataset)
}

/// Save a dataset, picking the format from the file extension. Parent
/// directories are created as needed.
pub fn save(dataset: &Dataset, path: &Path) -> Result<()> {
    let ext = extension(path);
    if ext != "csv" && ext != "json" {
        return Err(ToolkitError::UnsupportedFormat(path.to_path_buf()));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    if ext == "csv" {
        write_csv(dataset, file)?;
    } else {
        write_json(dataset, file)?;
    }
    info!(path = %path.display(), rows = dataset.len(), "Saved dataset");
    Ok(())
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn read_csv<R: Read>(reader: R) -> Result<Dataset> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    let columns: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut rows = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| {
            if matches!(e.kind(), csv::ErrorKind::UnequalLengths { .. }) {
                ToolkitError::Structural(format!("csv record {idx}: {e}"))
            } else {
                ToolkitError::Csv(e)
            }
        })?;
        rows.push(
            record
                .iter()
                .map(|cell| {
                    if cell.is_empty() {
                        Value::Missing
                    } else {
                        Value::text(cell)
                    }
                })
                .collect(),
        );
    }
    debug!(rows = rows.len(), "Parsed csv records");
    Dataset::new(columns, rows)
}

pub fn write_csv<W: Write>(dataset: &Dataset, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(dataset.columns())?;
    for row in dataset.rows() {
        wtr.write_record(row.iter().map(Value::render))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read a JSON array of flat objects.
pub fn read_json<R: Read>(reader: R) -> Result<Dataset> {
    let doc: Json = serde_json::from_reader(reader)?;
    let Json::Array(items) = doc else {
        return Err(ToolkitError::Structural(
            "expected a JSON array of records at the top level".into(),
        ));
    };

    let mut objects = Vec::with_capacity(items.len());
    let mut columns: Vec<String> = Vec::new();
    for (idx, item) in items.into_iter().enumerate() {
        let Json::Object(obj) = item else {
            return Err(ToolkitError::Structural(format!(
                "record {idx} is not a JSON object"
            )));
        };
        for key in obj.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
        objects.push(obj);
    }

    let mut rows = Vec::with_capacity(objects.len());
    for (idx, obj) in objects.iter().enumerate() {
        let mut row = Vec::with_capacity(columns.len());
        for col in &columns {
            let cell = match obj.get(col) {
                None => Value::Missing,
                Some(v) => from_json(v).ok_or_else(|| {
                    ToolkitError::Structural(format!(
                        "record {idx} field '{col}' is nested; only flat records are tabular"
                    ))
                })?,
            };
            row.push(cell);
        }
        rows.push(row);
    }
    Dataset::new(columns, rows)
}

fn from_json(v: &Json) -> Option<Value> {
    Some(match v {
        Json::Null => Value::Missing,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64()?),
        },
        Json::String(s) => Value::Text(s.clone()),
        Json::Array(_) | Json::Object(_) => return None,
    })
}

/// Write the dataset as a JSON array of objects, columns in dataset order.
pub fn write_json<W: Write>(dataset: &Dataset, writer: W) -> Result<()> {
    let records: Vec<Map<String, Json>> = dataset
        .rows()
        .iter()
        .map(|row| {
            dataset
                .columns()
                .iter()
                .zip(row)
                .map(|(col, value)| (col.clone(), serde_json::to_value(value).unwrap_or(Json::Null)))
                .collect()
        })
        .collect();
    serde_json::to_writer_pretty(writer, &records)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_empty_fields_become_missing() {
        let data = "name,age\nAda,36\nBob,\n";
        let ds = read_csv(data.as_bytes()).unwrap();
        assert_eq!(ds.columns(), &["name".to_string(), "age".to_string()]);
        assert_eq!(ds.get(0, 1), Some(&Value::text("36")));
        assert_eq!(ds.get(1, 1), Some(&Value::Missing));
    }

    #[test]
    fn test_ragged_csv_is_structural() {
        let data = "a,b\n1,2\n3\n";
        let err = read_csv(data.as_bytes()).unwrap_err();
        assert!(matches!(err, ToolkitError::Structural(_)));
    }

    #[test]
    fn test_json_sparse_keys_become_missing_cells() {
        let data = r#"[{"a": 1, "b": "x"}, {"a": 2.5}, {"c": true}]"#;
        let ds = read_json(data.as_bytes()).unwrap();
        assert_eq!(ds.columns(), &["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(ds.get(1, 0), Some(&Value::Float(2.5)));
        assert_eq!(ds.get(1, 1), Some(&Value::Missing));
        assert_eq!(ds.get(2, 2), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_json_non_tabular_shapes_fail_fast() {
        assert!(matches!(
            read_json(r#"{"a": 1}"#.as_bytes()).unwrap_err(),
            ToolkitError::Structural(_)
        ));
        assert!(matches!(
            read_json(r#"[{"a": [1, 2]}]"#.as_bytes()).unwrap_err(),
            ToolkitError::Structural(_)
        ));
        assert!(matches!(
            read_json(r#"[1, 2]"#.as_bytes()).unwrap_err(),
            ToolkitError::Structural(_)
        ));
    }

    #[test]
    fn test_save_and_load_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let ds = Dataset::new(
            vec!["id".into(), "city".into()],
            vec![
                vec![Value::Int(1), Value::text("Oslo")],
                vec![Value::Int(2), Value::Missing],
            ],
        )
        .unwrap();

        let csv_path = dir.path().join("out/cleaned.csv");
        save(&ds, &csv_path).unwrap();
        let back = load(&csv_path).unwrap();
        assert_eq!(back.get(0, 1), Some(&Value::text("Oslo")));
        assert_eq!(back.get(1, 1), Some(&Value::Missing));

        let json_path = dir.path().join("cleaned.json");
        save(&ds, &json_path).unwrap();
        let back = load(&json_path).unwrap();
        assert_eq!(back, ds);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let err = load(Path::new("data.xlsx")).unwrap_err();
        assert!(matches!(err, ToolkitError::UnsupportedFormat(_)));
    }
}
