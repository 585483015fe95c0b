//! Resolved query-function descriptors and their evaluation.
//!
//! The parser turns function expressions into these descriptors; the
//! pipelines evaluate them per row (or once, for aggregates) against one
//! ensemble snapshot.

use serde_json::json;

use crate::backend::{BackendClient, ops};
use crate::error::Result;
use crate::models::LatentState;
use crate::table::Btable;
use crate::value::Value;

/// A row-level query function.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryFunction {
    /// The row's stable identifier (its original index).
    RowId,
    /// A raw column, by full-projection position.
    Column { position: usize },
    /// Similarity of each row to a target row, optionally with respect to
    /// one modeled column.
    Similarity {
        target_row: usize,
        wrt: Option<usize>,
    },
    /// How typical each row is of the table.
    RowTypicality,
    /// How typical a column is; one value for the whole table.
    ColumnTypicality { column: usize },
    /// Predictive log probability of each row's observed value in a column.
    PredictiveProbability { column: usize },
    /// Marginal probability of a specific coded value; one value for the
    /// whole table.
    Probability { column: usize, code: f64 },
}

impl QueryFunction {
    /// Whether this function needs a non-empty ensemble.
    pub fn requires_ensemble(&self) -> bool {
        !matches!(self, QueryFunction::RowId | QueryFunction::Column { .. })
    }

    /// Whether this function yields one value for the whole table rather
    /// than one per row.
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            QueryFunction::ColumnTypicality { .. } | QueryFunction::Probability { .. }
        )
    }
}

/// A resolved `(function, label, aggregate, requires_ensemble)` descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFunction {
    pub function: QueryFunction,
    /// Output column name for this function.
    pub label: String,
}

impl ResolvedFunction {
    pub fn new(function: QueryFunction, label: impl Into<String>) -> Self {
        Self {
            function,
            label: label.into(),
        }
    }
}

/// One ordering key: a function and a direction.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderKey {
    pub function: QueryFunction,
    pub descending: bool,
}

/// A column-level relationship function, used by `estimate_columns` and the
/// pairwise dispatchers. Column indices are modeled-projection indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnFunction {
    Typicality,
    DependenceProbability { other: usize },
    MutualInformation { other: usize },
    Correlation { other: usize },
}

impl ColumnFunction {
    /// The backend operation this function dispatches to.
    pub fn operation(&self) -> &'static str {
        match self {
            ColumnFunction::Typicality => "column_typicality",
            ColumnFunction::DependenceProbability { .. } => "dependence_probability",
            ColumnFunction::MutualInformation { .. } => "mutual_information",
            ColumnFunction::Correlation { .. } => "correlation",
        }
    }
}

/// A column-level where predicate: `function op threshold`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPredicate {
    pub function: ColumnFunction,
    pub op: CompareOp,
    pub threshold: f64,
}

/// A column-level ordering key.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnOrderKey {
    pub function: ColumnFunction,
    pub descending: bool,
    /// Human-readable description, used as a result column header.
    pub label: String,
}

/// Comparison operators accepted in where clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Apply the operator to two cell values. Missing cells satisfy no
    /// predicate.
    pub fn compare(&self, left: &Value, right: &Value) -> bool {
        if left.is_missing() || right.is_missing() {
            return false;
        }
        match self {
            CompareOp::Eq => values_equal(left, right),
            CompareOp::Ne => !values_equal(left, right),
            _ => {
                let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
                    return false;
                };
                match self {
                    CompareOp::Lt => a < b,
                    CompareOp::Le => a <= b,
                    CompareOp::Gt => a > b,
                    CompareOp::Ge => a >= b,
                    CompareOp::Eq | CompareOp::Ne => unreachable!(),
                }
            }
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => (a - b).abs() < 1e-9,
        (Value::Text(a), Value::Text(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

/// A raw-column where predicate: `column op value`.
#[derive(Debug, Clone, PartialEq)]
pub struct WherePredicate {
    /// Full-projection column position.
    pub position: usize,
    pub op: CompareOp,
    pub value: Value,
}

impl WherePredicate {
    /// Whether a full-projection row satisfies this predicate.
    pub fn matches(&self, row: &[Value]) -> bool {
        self.op.compare(&row[self.position], &self.value)
    }
}

/// Everything function evaluation needs: one consistent snapshot of the
/// table and ensemble, plus the backend client.
pub struct EvalContext<'a> {
    pub client: &'a dyn BackendClient,
    pub table: &'a Btable,
    pub latents: &'a [LatentState],
}

impl<'a> EvalContext<'a> {
    /// Evaluate a row-level function for the row at original index
    /// `row_index` with full-projection values `row`.
    pub fn evaluate(
        &self,
        function: &QueryFunction,
        row_index: usize,
        row: &[Value],
    ) -> Result<Value> {
        match function {
            QueryFunction::RowId => Ok(Value::Number(row_index as f64)),
            QueryFunction::Column { position } => Ok(row[*position].clone()),
            QueryFunction::Similarity { target_row, wrt } => {
                let mut extra = json!({ "row": row_index, "target_row": target_row });
                if let Some(wrt) = wrt {
                    extra["wrt_columns"] = json!([wrt]);
                }
                self.relation("similarity", extra)
            }
            QueryFunction::RowTypicality => {
                self.relation("row_typicality", json!({ "row": row_index }))
            }
            QueryFunction::ColumnTypicality { column } => {
                self.relation("column_typicality", json!({ "column": column }))
            }
            QueryFunction::PredictiveProbability { column } => self.relation(
                "predictive_probability",
                json!({ "row": row_index, "column": column }),
            ),
            QueryFunction::Probability { column, code } => {
                self.relation("probability", json!({ "column": column, "code": code }))
            }
        }
    }

    /// Evaluate a column-level function for the modeled column `column`.
    pub fn evaluate_column(&self, function: &ColumnFunction, column: usize) -> Result<f64> {
        let extra = match function {
            ColumnFunction::Typicality => json!({ "column": column }),
            ColumnFunction::DependenceProbability { other }
            | ColumnFunction::MutualInformation { other }
            | ColumnFunction::Correlation { other } => {
                json!({ "column_a": column, "column_b": other })
            }
        };
        ops::relation(self.client, self.table, self.latents, function.operation(), extra)
    }

    fn relation(&self, operation: &str, extra: serde_json::Value) -> Result<Value> {
        ops::relation(self.client, self.table, self.latents, operation, extra)
            .map(Value::Number)
    }
}
