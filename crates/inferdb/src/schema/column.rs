//! Per-column schema: declared type plus the categorical codebook.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

use super::types::ColumnType;

/// Mapping between categorical values and their numeric codes.
///
/// Codes are assigned in first-seen order over the column's data, so the same
/// data always yields the same codebook.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "SerializedCodebook")]
pub struct Codebook {
    values: Vec<String>,
    #[serde(skip)]
    index: IndexMap<String, usize>,
}

/// Wire shape of a codebook: the value list alone. The lookup index is
/// derived state and is rebuilt on the way in.
#[derive(Deserialize)]
struct SerializedCodebook {
    values: Vec<String>,
}

impl From<SerializedCodebook> for Codebook {
    fn from(raw: SerializedCodebook) -> Self {
        let mut book = Codebook {
            values: raw.values,
            index: IndexMap::new(),
        };
        book.rebuild_index();
        book
    }
}

impl Codebook {
    /// Build a codebook from the distinct non-missing values of a column.
    pub fn from_values<'a>(values: impl Iterator<Item = &'a Value>) -> Self {
        let mut book = Codebook::default();
        for value in values {
            if let Value::Text(s) = value {
                book.intern(s);
            } else if let Value::Number(n) = value {
                // Numeric cells in a categorical column code by their text form.
                book.intern(&n.to_string());
            }
        }
        book
    }

    fn intern(&mut self, value: &str) -> usize {
        if let Some(&code) = self.index.get(value) {
            return code;
        }
        let code = self.values.len();
        self.values.push(value.to_string());
        self.index.insert(value.to_string(), code);
        code
    }

    /// Rebuild the lookup index after deserialization.
    pub fn rebuild_index(&mut self) {
        self.index = self
            .values
            .iter()
            .enumerate()
            .map(|(i, v)| (v.clone(), i))
            .collect();
    }

    /// Code for a value, if it is in the book.
    pub fn code_of(&self, value: &str) -> Option<usize> {
        self.index.get(value).copied()
    }

    /// Value for a code, if in range.
    pub fn value_of(&self, code: usize) -> Option<&str> {
        self.values.get(code).map(|s| s.as_str())
    }

    /// Number of distinct values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no values have been interned.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Schema for a single btable column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name (lowercased on ingest).
    pub name: String,
    /// Position in the full projection.
    pub position: usize,
    /// Declared type.
    pub column_type: ColumnType,
    /// Codebook for categorical columns; `None` otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codebook: Option<Codebook>,
}

impl ColumnSchema {
    /// Create a column schema with no codebook.
    pub fn new(name: impl Into<String>, position: usize, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            position,
            column_type,
            codebook: None,
        }
    }

    /// Encode a value into the numeric code passed to the backend.
    ///
    /// Continuous columns pass numbers through; categorical columns look the
    /// value up in the codebook. `None` means the value cannot be coded
    /// (missing, or a categorical value outside the book).
    pub fn encode(&self, value: &Value) -> Option<f64> {
        match self.column_type {
            ColumnType::Continuous => value.as_f64(),
            ColumnType::Categorical => {
                let book = self.codebook.as_ref()?;
                let text = match value {
                    Value::Text(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Missing => return None,
                };
                book.code_of(&text).map(|c| c as f64)
            }
            ColumnType::Key | ColumnType::Ignore => None,
        }
    }

    /// Decode a backend code back into an original-typed value.
    pub fn decode(&self, code: f64) -> Value {
        match self.column_type {
            ColumnType::Continuous => Value::Number(code),
            ColumnType::Categorical => self
                .codebook
                .as_ref()
                .and_then(|book| book.value_of(code.round() as usize))
                .map(|s| Value::Text(s.to_string()))
                .unwrap_or(Value::Missing),
            ColumnType::Key | ColumnType::Ignore => Value::Missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categorical_column() -> ColumnSchema {
        let values = vec![
            Value::Text("CD".to_string()),
            Value::Text("UC".to_string()),
            Value::Text("CD".to_string()),
        ];
        let mut col = ColumnSchema::new("diagnosis", 1, ColumnType::Categorical);
        col.codebook = Some(Codebook::from_values(values.iter()));
        col
    }

    #[test]
    fn test_codebook_first_seen_order() {
        let col = categorical_column();
        let book = col.codebook.as_ref().unwrap();
        assert_eq!(book.code_of("CD"), Some(0));
        assert_eq!(book.code_of("UC"), Some(1));
        assert_eq!(book.len(), 2);
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let col = categorical_column();
        let code = col.encode(&Value::Text("UC".to_string())).unwrap();
        assert_eq!(col.decode(code), Value::Text("UC".to_string()));
    }

    #[test]
    fn test_continuous_passthrough() {
        let col = ColumnSchema::new("age", 0, ColumnType::Continuous);
        assert_eq!(col.encode(&Value::Number(31.0)), Some(31.0));
        assert_eq!(col.decode(31.0), Value::Number(31.0));
    }

    #[test]
    fn test_missing_encodes_to_none() {
        let col = categorical_column();
        assert_eq!(col.encode(&Value::Missing), None);
    }

    #[test]
    fn test_deserialized_codebook_still_encodes() {
        let col = categorical_column();
        let serialized = serde_json::to_string(&col).unwrap();
        let restored: ColumnSchema = serde_json::from_str(&serialized).unwrap();
        assert_eq!(restored.encode(&Value::Text("UC".to_string())), Some(1.0));
        assert_eq!(restored.decode(0.0), Value::Text("CD".to_string()));
    }
}
