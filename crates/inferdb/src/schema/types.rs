//! Core type definitions for btable schemas.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Declared type of a btable column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Numeric values modeled as continuous.
    Continuous,
    /// Discrete values modeled as categorical.
    Categorical,
    /// Row-identifier column; not modeled.
    Key,
    /// Column excluded from modeling entirely.
    Ignore,
}

impl ColumnType {
    /// Returns true if values in this column are passed to the backend.
    pub fn is_modeled(&self) -> bool {
        matches!(self, ColumnType::Continuous | ColumnType::Categorical)
    }

    /// Returns true if this column appears in the active projection.
    pub fn is_active(&self) -> bool {
        !matches!(self, ColumnType::Ignore)
    }

    /// Parse a user-supplied type name, as accepted by `update_schema`.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "continuous" | "numerical" => Ok(ColumnType::Continuous),
            "categorical" | "multinomial" => Ok(ColumnType::Categorical),
            "key" => Ok(ColumnType::Key),
            "ignore" => Ok(ColumnType::Ignore),
            other => Err(EngineError::Parse(format!(
                "Unknown column type '{}'; expected continuous, categorical, key, or ignore",
                other
            ))),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Continuous => "continuous",
            ColumnType::Categorical => "categorical",
            ColumnType::Key => "key",
            ColumnType::Ignore => "ignore",
        };
        f.write_str(name)
    }
}
