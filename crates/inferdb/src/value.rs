//! Cell values for btable rows.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single cell value in a btable.
///
/// Continuous columns hold `Number` values, categorical columns hold `Text`
/// values, and `Missing` marks an absent cell in either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A numeric value (continuous columns).
    Number(f64),
    /// A text value (categorical and key columns).
    Text(String),
    /// A missing cell.
    Missing,
}

impl Value {
    /// Parse a raw string cell into a value.
    ///
    /// Blank cells and common NA spellings become `Missing`; anything that
    /// parses as a float becomes `Number`; everything else is `Text`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || is_missing_marker(trimmed) {
            return Value::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Value::Number(n),
            _ => Value::Text(trimmed.to_string()),
        }
    }

    /// Returns true if this is the missing marker.
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Total order used for sorting result rows: missing sorts first, numbers
    /// before text, numbers by `f64::total_cmp`, text lexicographically.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        use Value::*;
        match (self, other) {
            (Missing, Missing) => Ordering::Equal,
            (Missing, _) => Ordering::Less,
            (_, Missing) => Ordering::Greater,
            (Number(a), Number(b)) => a.total_cmp(b),
            (Number(_), Text(_)) => Ordering::Less,
            (Text(_), Number(_)) => Ordering::Greater,
            (Text(a), Text(b)) => a.cmp(b),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::Missing => write!(f, "NA"),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// NA spellings treated as missing on ingest.
fn is_missing_marker(s: &str) -> bool {
    matches!(
        s.to_ascii_lowercase().as_str(),
        "na" | "n/a" | "nan" | "null" | "none" | "missing"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(Value::parse("3.5"), Value::Number(3.5));
        assert_eq!(Value::parse(" 42 "), Value::Number(42.0));
    }

    #[test]
    fn test_parse_missing_markers() {
        for raw in ["", "NA", "n/a", "NaN", "null", "None", "missing"] {
            assert!(Value::parse(raw).is_missing(), "{:?}", raw);
        }
    }

    #[test]
    fn test_parse_text() {
        assert_eq!(Value::parse("CD"), Value::Text("CD".to_string()));
    }

    #[test]
    fn test_sort_cmp_missing_first() {
        let mut vals = vec![
            Value::Number(2.0),
            Value::Missing,
            Value::Text("a".to_string()),
            Value::Number(1.0),
        ];
        vals.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(vals[0], Value::Missing);
        assert_eq!(vals[1], Value::Number(1.0));
        assert_eq!(vals[3], Value::Text("a".to_string()));
    }
}
