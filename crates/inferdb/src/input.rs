//! Tabular input: CSV/TSV reading, type guessing, and btable construction.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use indexmap::IndexMap;

use crate::error::{EngineError, Result};
use crate::schema::{Codebook, ColumnSchema, ColumnType, TableSchema};
use crate::table::Btable;
use crate::value::Value;

/// Delimiters to try when auto-detecting.
const DELIMITERS: &[u8] = &[b'\t', b',', b';', b'|'];

/// Read a delimited file into a header and raw string rows.
pub fn read_delimited(path: impl AsRef<Path>) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let path = path.as_ref();
    let mut contents = Vec::new();
    File::open(path)
        .and_then(|mut f| f.read_to_end(&mut contents))
        .map_err(|e| EngineError::Input(format!("Failed to read '{}': {}", path.display(), e)))?;

    let delimiter = detect_delimiter(&contents)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(contents.as_slice());

    let header: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();
    if header.is_empty() {
        return Err(EngineError::Input("No columns found".to_string()));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row: Vec<String> = record.iter().map(|s| s.to_string()).collect();
        // Pad short records so every row covers the header.
        row.resize(header.len(), String::new());
        rows.push(row);
    }
    if rows.is_empty() {
        return Err(EngineError::Input("No data rows found".to_string()));
    }

    Ok((header, rows))
}

/// Detect the delimiter by counting candidates in the first line.
fn detect_delimiter(contents: &[u8]) -> Result<u8> {
    let first_line = contents.split(|&b| b == b'\n').next().unwrap_or(&[]);
    DELIMITERS
        .iter()
        .copied()
        .map(|d| (d, first_line.iter().filter(|&&b| b == d).count()))
        .max_by_key(|&(_, count)| count)
        .filter(|&(_, count)| count > 0)
        .map(|(d, _)| d)
        .ok_or_else(|| EngineError::Input("Could not detect delimiter".to_string()))
}

/// Build a btable from a header and raw string rows.
///
/// Column names are lowercased and trimmed. Types not present in `declared`
/// are guessed from the data; if no key column was declared or guessed, the
/// first all-unique text column becomes the key. Categorical columns get a
/// codebook built from their data.
pub fn build_btable(
    header: &[String],
    raw_rows: &[Vec<String>],
    declared: Option<&IndexMap<String, ColumnType>>,
) -> Result<Btable> {
    if header.is_empty() {
        return Err(EngineError::Input("No columns found".to_string()));
    }
    let names: Vec<String> = header
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();

    let parsed: Vec<Vec<Value>> = raw_rows
        .iter()
        .map(|row| {
            names
                .iter()
                .enumerate()
                .map(|(i, _)| Value::parse(row.get(i).map(String::as_str).unwrap_or("")))
                .collect()
        })
        .collect();

    let mut types: Vec<ColumnType> = names
        .iter()
        .enumerate()
        .map(|(i, name)| match declared.and_then(|d| d.get(name)) {
            Some(t) => *t,
            None => guess_column_type(parsed.iter().map(move |row| &row[i])),
        })
        .collect();

    if let Some(declared) = declared {
        for name in declared.keys() {
            if !names.iter().any(|n| n == name) {
                return Err(EngineError::Input(format!(
                    "Declared type for unknown column '{}'",
                    name
                )));
            }
        }
    }

    if !types.contains(&ColumnType::Key) {
        if let Some(idx) = pick_key_column(&names, &parsed, &types) {
            types[idx] = ColumnType::Key;
        }
    }

    let columns: Vec<ColumnSchema> = names
        .iter()
        .zip(types.iter())
        .enumerate()
        .map(|(position, (name, &column_type))| {
            let mut col = ColumnSchema::new(name.clone(), position, column_type);
            if column_type == ColumnType::Categorical {
                col.codebook = Some(Codebook::from_values(
                    parsed.iter().map(|row| &row[position]),
                ));
            }
            col
        })
        .collect();

    Ok(Btable::new(TableSchema::with_columns(columns), parsed))
}

/// Guess a column type from its parsed values: numeric-only columns are
/// continuous, everything else categorical. Fully-missing columns default to
/// categorical.
fn guess_column_type<'a>(values: impl Iterator<Item = &'a Value>) -> ColumnType {
    let mut seen_any = false;
    let mut all_numeric = true;
    for value in values {
        match value {
            Value::Number(_) => seen_any = true,
            Value::Text(_) => {
                seen_any = true;
                all_numeric = false;
            }
            Value::Missing => {}
        }
    }
    if seen_any && all_numeric {
        ColumnType::Continuous
    } else {
        ColumnType::Categorical
    }
}

/// Find the first guessed-categorical column whose values are all present and
/// distinct; such a column serves as the row identifier.
fn pick_key_column(
    names: &[String],
    rows: &[Vec<Value>],
    types: &[ColumnType],
) -> Option<usize> {
    for (idx, _) in names.iter().enumerate() {
        if types[idx] != ColumnType::Categorical {
            continue;
        }
        let mut seen = std::collections::HashSet::new();
        let all_unique = rows.iter().all(|row| match &row[idx] {
            Value::Text(s) => seen.insert(s.clone()),
            _ => false,
        });
        if all_unique && !rows.is_empty() {
            return Some(idx);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn raw(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_type_guessing() {
        let header = vec!["sample".to_string(), "age".to_string(), "job".to_string()];
        let rows = raw(&[
            &["s1", "25", "nurse"],
            &["s2", "40", "chef"],
            &["s3", "31", "nurse"],
        ]);
        let table = build_btable(&header, &rows, None).unwrap();
        assert_eq!(table.schema.columns[0].column_type, ColumnType::Key);
        assert_eq!(table.schema.columns[1].column_type, ColumnType::Continuous);
        assert_eq!(table.schema.columns[2].column_type, ColumnType::Categorical);
    }

    #[test]
    fn test_declared_types_override_guess() {
        let header = vec!["age".to_string()];
        let rows = raw(&[&["25"], &["40"]]);
        let mut declared = IndexMap::new();
        declared.insert("age".to_string(), ColumnType::Categorical);
        let table = build_btable(&header, &rows, Some(&declared)).unwrap();
        assert_eq!(table.schema.columns[0].column_type, ColumnType::Categorical);
    }

    #[test]
    fn test_declared_unknown_column_fails() {
        let header = vec!["age".to_string()];
        let rows = raw(&[&["25"]]);
        let mut declared = IndexMap::new();
        declared.insert("height".to_string(), ColumnType::Continuous);
        assert!(build_btable(&header, &rows, Some(&declared)).is_err());
    }

    #[test]
    fn test_missing_markers_parse_to_missing() {
        let header = vec!["job".to_string()];
        let rows = raw(&[&["NA"], &["chef"]]);
        let table = build_btable(&header, &rows, None).unwrap();
        assert!(table.rows[0][0].is_missing());
    }

    #[test]
    fn test_read_delimited_tsv_auto_detect() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"id\tage\ns1\t25\ns2\t40\n").unwrap();
        let (header, rows) = read_delimited(file.path()).unwrap();
        assert_eq!(header, vec!["id", "age"]);
        assert_eq!(rows.len(), 2);
    }
}
