//! Batch ingestion. Records are validated once here so analyzers can rely on
//! typed `QueryRow`s.

use crate::errors::InputError;
use crate::model::{Batch, QueryRow, DATABASE_SCHEMA, GENERATED_SQL, GOLDEN_SQL};
use serde_json::{Map, Value};
use std::path::Path;

/// Reads a batch from a `.json` array or a `.jsonl` file of objects.
pub fn load_batch(path: &Path) -> Result<Batch, InputError> {
    let raw = std::fs::read_to_string(path).map_err(|e| InputError::Unreadable {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let jsonl = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jsonl"));

    let records = if jsonl {
        parse_jsonl(&raw)?
    } else {
        parse_json_array(&raw)?
    };
    tracing::info!(
        event = "batch.loaded",
        path = %path.display(),
        rows = records.len()
    );
    Batch::from_records(records)
}

fn parse_json_array(raw: &str) -> Result<Vec<Value>, InputError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => Err(InputError::NotAnArray),
        Err(e) => Err(InputError::Malformed {
            line: e.line(),
            message: format!("parse error: {}", e),
        }),
    }
}

fn parse_jsonl(raw: &str) -> Result<Vec<Value>, InputError> {
    let mut out = Vec::new();
    for (i, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let v = serde_json::from_str(line).map_err(|e| InputError::Malformed {
            line: i + 1,
            message: format!("parse error: {}", e),
        })?;
        out.push(v);
    }
    Ok(out)
}

impl Batch {
    /// Validates raw records into a batch.
    ///
    /// `generated_sql` must be a string on every record. `golden_sql` and
    /// `database_schema` may be strings or null; blank cells count as absent.
    /// Any other key is carried through untouched.
    pub fn from_records(records: Vec<Value>) -> Result<Batch, InputError> {
        if records.is_empty() {
            return Err(InputError::EmptyBatch);
        }

        let mut columns: Vec<String> = Vec::new();
        let mut rows = Vec::with_capacity(records.len());

        for (index, record) in records.into_iter().enumerate() {
            let Value::Object(mut obj) = record else {
                return Err(InputError::InvalidRow {
                    row: index,
                    message: "record is not an object".into(),
                });
            };
            for k in obj.keys() {
                if !columns.contains(k) {
                    columns.push(k.clone());
                }
            }

            let generated_sql = match obj.remove(GENERATED_SQL) {
                Some(Value::String(s)) => s,
                Some(other) => {
                    return Err(InputError::InvalidRow {
                        row: index,
                        message: format!("{} must be a string, got {}", GENERATED_SQL, other),
                    })
                }
                None if columns.iter().any(|c| c == GENERATED_SQL) => {
                    return Err(InputError::InvalidRow {
                        row: index,
                        message: format!("{} is missing", GENERATED_SQL),
                    })
                }
                None => return Err(InputError::MissingColumn(GENERATED_SQL.to_string())),
            };

            rows.push(QueryRow {
                index,
                generated_sql,
                golden_sql: optional_text(&mut obj, GOLDEN_SQL, index)?,
                database_schema: optional_text(&mut obj, DATABASE_SCHEMA, index)?,
                extra: obj.into_iter().collect(),
            });
        }

        // optional columns only count when some row fills them
        columns.retain(|c| match c.as_str() {
            GOLDEN_SQL => rows.iter().any(|r| r.golden_sql.is_some()),
            DATABASE_SCHEMA => rows.iter().any(|r| r.database_schema.is_some()),
            _ => true,
        });

        Ok(Batch { columns, rows })
    }
}

fn optional_text(
    obj: &mut Map<String, Value>,
    key: &str,
    row: usize,
) -> Result<Option<String>, InputError> {
    match obj.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(InputError::InvalidRow {
            row,
            message: format!("{} must be a string or null, got {}", key, other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Mode;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_from_records_types_rows_and_keeps_extras() {
        let batch = Batch::from_records(vec![
            json!({"id": 7, "generated_sql": "SELECT 1", "golden_sql": "SELECT 1"}),
            json!({"generated_sql": "SELECT 2", "golden_sql": null, "database_schema": "  "}),
        ])
        .unwrap();

        assert_eq!(batch.columns, vec!["id", "generated_sql", "golden_sql"]);
        assert_eq!(batch.rows[0].extra["id"], json!(7));
        assert_eq!(batch.rows[1].golden_sql, None);
        assert_eq!(batch.rows[1].database_schema, None);
        assert_eq!(batch.mode().unwrap(), Mode::WithGolden);
    }

    #[test]
    fn test_from_records_rejects_bad_input() {
        assert!(matches!(
            Batch::from_records(vec![]),
            Err(InputError::EmptyBatch)
        ));
        assert!(matches!(
            Batch::from_records(vec![json!({"golden_sql": "SELECT 1"})]),
            Err(InputError::MissingColumn(_))
        ));
        assert!(matches!(
            Batch::from_records(vec![json!({"generated_sql": 3})]),
            Err(InputError::InvalidRow { row: 0, .. })
        ));
        assert!(matches!(
            Batch::from_records(vec![
                json!({"generated_sql": "SELECT 1"}),
                json!({"note": "x"})
            ]),
            Err(InputError::InvalidRow { row: 1, .. })
        ));
    }

    #[test]
    fn test_load_jsonl_skips_blank_lines() {
        let mut f = tempfile::Builder::new().suffix(".jsonl").tempfile().unwrap();
        writeln!(f, r#"{{"generated_sql": "SELECT 1"}}"#).unwrap();
        writeln!(f).unwrap();
        writeln!(f, r#"{{"generated_sql": "SELECT 2"}}"#).unwrap();

        let batch = load_batch(f.path()).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.mode().unwrap(), Mode::GeneratedOnly);
    }

    #[test]
    fn test_parse_errors_report_file_lines() {
        let mut f = tempfile::Builder::new().suffix(".jsonl").tempfile().unwrap();
        writeln!(f, r#"{{"generated_sql": "SELECT 1"}}"#).unwrap();
        writeln!(f).unwrap();
        writeln!(f, r#"{{"generated_sql": "#).unwrap();
        let err = load_batch(f.path()).unwrap_err();
        assert!(matches!(err, InputError::Malformed { line: 3, .. }));
        assert!(err.to_string().starts_with("input error: line 3:"));

        let mut f = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(f, "[").unwrap();
        writeln!(f, r#"  {{"generated_sql": "SELECT 1"}},"#).unwrap();
        writeln!(f, "  nope").unwrap();
        writeln!(f, "]").unwrap();
        let err = load_batch(f.path()).unwrap_err();
        assert!(matches!(err, InputError::Malformed { line: 3, .. }));

        let mut f = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(f, r#"{{"generated_sql": "SELECT 1"}}"#).unwrap();
        assert!(matches!(load_batch(f.path()), Err(InputError::NotAnArray)));
    }

    #[test]
    fn test_load_missing_file_is_unreadable() {
        let err = load_batch(Path::new("/nonexistent/batch.json")).unwrap_err();
        assert!(matches!(err, InputError::Unreadable { .. }));
    }
}
