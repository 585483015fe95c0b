//! The btable: a named dataset with a fixed schema and immutable row data.

use serde::{Deserialize, Serialize};
use serde_json::{Value as Json, json};

use crate::schema::{ColumnType, TableSchema};
use crate::value::Value;

/// A structured table with typed columns.
///
/// Rows hold every declared column (the full projection); the active and
/// modeled projections are derived through the schema. Row identity is the
/// row's position, stable for the table's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Btable {
    /// Column schemas, full projection.
    pub schema: TableSchema,
    /// Row data, full projection, original order.
    pub rows: Vec<Vec<Value>>,
}

impl Btable {
    /// Create a btable from a schema and full-projection rows.
    pub fn new(schema: TableSchema, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Cell value by row index and full-projection column position.
    pub fn value(&self, row: usize, position: usize) -> &Value {
        &self.rows[row][position]
    }

    /// Values of one column, full projection, in row order.
    pub fn column_values(&self, position: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().map(move |row| &row[position])
    }

    /// One row restricted to the active projection.
    pub fn active_row(&self, row: usize) -> Vec<Value> {
        self.schema
            .active_columns()
            .map(|c| self.rows[row][c.position].clone())
            .collect()
    }

    /// The coded data matrix the backend sees: one entry per row, one code
    /// per modeled column, missing cells as JSON null.
    pub fn coded_matrix(&self) -> Json {
        let matrix: Vec<Vec<Json>> = self
            .rows
            .iter()
            .map(|row| {
                self.schema
                    .modeled_columns()
                    .map(|c| match c.encode(&row[c.position]) {
                        Some(code) => json!(code),
                        None => Json::Null,
                    })
                    .collect()
            })
            .collect();
        json!(matrix)
    }

    /// Column metadata passed alongside the coded matrix: type and category
    /// count per modeled column.
    pub fn coded_metadata(&self) -> Json {
        let columns: Vec<Json> = self
            .schema
            .modeled_columns()
            .map(|c| {
                json!({
                    "name": c.name,
                    "type": c.column_type,
                    "categories": match c.column_type {
                        ColumnType::Categorical => {
                            c.codebook.as_ref().map(|b| b.len()).unwrap_or(0)
                        }
                        _ => 0,
                    },
                })
            })
            .collect();
        json!({ "columns": columns, "num_rows": self.row_count() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Codebook, ColumnSchema};

    fn people() -> Btable {
        let rows = vec![
            vec![
                Value::Text("r1".to_string()),
                Value::Number(25.0),
                Value::Text("nurse".to_string()),
            ],
            vec![
                Value::Text("r2".to_string()),
                Value::Number(40.0),
                Value::Text("chef".to_string()),
            ],
        ];
        let mut job = ColumnSchema::new("job", 2, ColumnType::Categorical);
        job.codebook = Some(Codebook::from_values(rows.iter().map(|r| &r[2])));
        let schema = TableSchema::with_columns(vec![
            ColumnSchema::new("id", 0, ColumnType::Key),
            ColumnSchema::new("age", 1, ColumnType::Continuous),
            job,
        ]);
        Btable::new(schema, rows)
    }

    #[test]
    fn test_coded_matrix_shape() {
        let t = people();
        let coded = t.coded_matrix();
        let matrix = coded.as_array().unwrap();
        assert_eq!(matrix.len(), 2);
        // Key column is not modeled, so two codes per row.
        assert_eq!(matrix[0].as_array().unwrap().len(), 2);
        assert_eq!(matrix[1].as_array().unwrap()[0], 40.0);
    }

    #[test]
    fn test_active_row_keeps_key() {
        let t = people();
        let row = t.active_row(0);
        assert_eq!(row.len(), 3);
        assert_eq!(row[0], Value::Text("r1".to_string()));
    }
}
