//! Table-level schema: the full column list and its projections.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

use super::column::ColumnSchema;
use super::types::ColumnType;

/// Schema for an entire btable.
///
/// The full projection is every declared column in original order; the active
/// projection drops ignored columns; the modeled projection keeps only the
/// continuous and categorical columns the backend sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Schemas for each column, in original order.
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Create a table schema with the given columns.
    pub fn with_columns(columns: Vec<ColumnSchema>) -> Self {
        Self { columns }
    }

    /// Get a column by name.
    pub fn get_column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Get a column by name, failing with `NoSuchColumn` against `table`.
    pub fn require_column(&self, table: &str, name: &str) -> Result<&ColumnSchema> {
        self.get_column(name).ok_or_else(|| EngineError::NoSuchColumn {
            table: table.to_string(),
            column: name.to_string(),
        })
    }

    /// All column names in original order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Columns in the active projection.
    pub fn active_columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.iter().filter(|c| c.column_type.is_active())
    }

    /// Columns the backend models, in original order.
    pub fn modeled_columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.iter().filter(|c| c.column_type.is_modeled())
    }

    /// Index of a column within the modeled projection, if it is modeled.
    pub fn modeled_index(&self, name: &str) -> Option<usize> {
        self.modeled_columns().position(|c| c.name == name)
    }

    /// Column schema at a modeled-projection index.
    pub fn modeled_column(&self, modeled_idx: usize) -> Option<&ColumnSchema> {
        self.modeled_columns().nth(modeled_idx)
    }

    /// Number of modeled columns.
    pub fn modeled_count(&self) -> usize {
        self.modeled_columns().count()
    }

    /// The declared key column, if one exists.
    pub fn key_column(&self) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.column_type == ColumnType::Key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TableSchema {
        TableSchema::with_columns(vec![
            ColumnSchema::new("id", 0, ColumnType::Key),
            ColumnSchema::new("age", 1, ColumnType::Continuous),
            ColumnSchema::new("notes", 2, ColumnType::Ignore),
            ColumnSchema::new("job", 3, ColumnType::Categorical),
        ])
    }

    #[test]
    fn test_projections() {
        let s = schema();
        let active: Vec<_> = s.active_columns().map(|c| c.name.as_str()).collect();
        assert_eq!(active, vec!["id", "age", "job"]);
        let modeled: Vec<_> = s.modeled_columns().map(|c| c.name.as_str()).collect();
        assert_eq!(modeled, vec!["age", "job"]);
    }

    #[test]
    fn test_modeled_index_skips_unmodeled() {
        let s = schema();
        assert_eq!(s.modeled_index("age"), Some(0));
        assert_eq!(s.modeled_index("job"), Some(1));
        assert_eq!(s.modeled_index("id"), None);
    }

    #[test]
    fn test_require_column_error() {
        let s = schema();
        let err = s.require_column("people", "height").unwrap_err();
        assert!(matches!(err, EngineError::NoSuchColumn { .. }));
    }
}
