//! Clause parsing: function lists, where clauses, and order-by clauses.
//!
//! Pure functions from clause text plus schema to resolved descriptors.
//! Column-list names expand to their member columns at resolution time, and
//! every descriptor carries its ensemble requirement so the pipelines check
//! preconditions once, before any backend call.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{EngineError, Result};
use crate::query::functions::{
    ColumnFunction, ColumnOrderKey, ColumnPredicate, CompareOp, OrderKey, QueryFunction,
    ResolvedFunction, WherePredicate,
};
use crate::schema::TableSchema;
use crate::value::Value;

static SIMILARITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)similarity to (\d+)(?: with respect to (\S+))?$").unwrap()
});
static TYPICALITY_OF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i)typicality of (\S+)$").unwrap());
static PREDICTIVE_PROBABILITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i)predictive probability of (\S+)$").unwrap());
static PROBABILITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i)probability of (\S+)\s*=\s*(.+)$").unwrap());
static PREDICATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)\s*(<=|>=|!=|=|<|>)\s*(.+)$").unwrap());
static AND_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+and\s+").unwrap());
static DEPENDENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i)dependence probability to (\S+)$").unwrap());
static MUTUAL_INFO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i)mutual information with (\S+)$").unwrap());
static CORRELATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i)correlation with (\S+)$").unwrap());

/// Parse a comma-separated function list into resolved descriptors.
///
/// `*` expands to the active projection, column-list names expand to their
/// member columns, and a `row_id` descriptor is always prepended. Output
/// labels are the expression texts (column names for expansions).
pub fn parse_functions(
    text: &str,
    table: &str,
    schema: &TableSchema,
    column_lists: &IndexMap<String, Vec<String>>,
) -> Result<Vec<ResolvedFunction>> {
    let mut resolved = vec![ResolvedFunction::new(QueryFunction::RowId, "row_id")];

    for item in split_commas(text) {
        if item == "*" {
            for column in schema.active_columns() {
                resolved.push(ResolvedFunction::new(
                    QueryFunction::Column {
                        position: column.position,
                    },
                    column.name.clone(),
                ));
            }
            continue;
        }
        if let Some(members) = column_lists.get(&item.to_ascii_lowercase()) {
            if members.is_empty() {
                return Err(EngineError::EmptyList {
                    kind: "Column",
                    name: item,
                });
            }
            for name in members {
                let column = schema.require_column(table, name)?;
                resolved.push(ResolvedFunction::new(
                    QueryFunction::Column {
                        position: column.position,
                    },
                    column.name.clone(),
                ));
            }
            continue;
        }
        let function = parse_function_expr(&item, table, schema)?;
        resolved.push(ResolvedFunction::new(function, item));
    }

    Ok(resolved)
}

/// Parse one function expression: a raw column name or a model-backed
/// function over the schema.
pub fn parse_function_expr(
    expr: &str,
    table: &str,
    schema: &TableSchema,
) -> Result<QueryFunction> {
    let expr = expr.trim();

    if let Some(caps) = SIMILARITY_RE.captures(expr) {
        let target_row: usize = caps[1]
            .parse()
            .map_err(|_| EngineError::Parse(format!("Invalid row index in '{}'", expr)))?;
        let wrt = match caps.get(2) {
            Some(name) => Some(require_modeled(table, schema, name.as_str())?),
            None => None,
        };
        return Ok(QueryFunction::Similarity { target_row, wrt });
    }
    if expr.eq_ignore_ascii_case("typicality") {
        return Ok(QueryFunction::RowTypicality);
    }
    if let Some(caps) = TYPICALITY_OF_RE.captures(expr) {
        let column = require_modeled(table, schema, &caps[1])?;
        return Ok(QueryFunction::ColumnTypicality { column });
    }
    if let Some(caps) = PREDICTIVE_PROBABILITY_RE.captures(expr) {
        let column = require_modeled(table, schema, &caps[1])?;
        return Ok(QueryFunction::PredictiveProbability { column });
    }
    if let Some(caps) = PROBABILITY_RE.captures(expr) {
        let name = caps[1].to_string();
        let column_schema = schema.require_column(table, &name.to_ascii_lowercase())?;
        let value = parse_literal(&caps[2]);
        let code = column_schema.encode(&value).ok_or_else(|| {
            EngineError::Parse(format!("Value '{}' is not valid for column '{}'", caps[2].trim(), name))
        })?;
        let column = require_modeled(table, schema, &name)?;
        return Ok(QueryFunction::Probability { column, code });
    }

    let column = schema.require_column(table, &expr.to_ascii_lowercase())?;
    Ok(QueryFunction::Column {
        position: column.position,
    })
}

/// Parse a row where clause: `column op value` terms joined by `and`.
pub fn parse_where_clause(
    text: &str,
    table: &str,
    schema: &TableSchema,
) -> Result<Vec<WherePredicate>> {
    split_and(text)
        .into_iter()
        .map(|term| {
            let caps = PREDICATE_RE
                .captures(&term)
                .ok_or_else(|| EngineError::Parse(format!("Invalid predicate '{}'", term)))?;
            let column = schema.require_column(table, caps[1].trim().to_ascii_lowercase().as_str())?;
            Ok(WherePredicate {
                position: column.position,
                op: parse_op(&caps[2])?,
                value: parse_literal(&caps[3]),
            })
        })
        .collect()
}

/// Parse a row order-by clause: comma-separated `expr [asc|desc]` keys.
/// Ascending is the default direction.
pub fn parse_order_by_clause(
    text: &str,
    table: &str,
    schema: &TableSchema,
) -> Result<Vec<OrderKey>> {
    split_commas(text)
        .into_iter()
        .map(|item| {
            let (expr, descending) = split_direction(&item);
            Ok(OrderKey {
                function: parse_function_expr(expr, table, schema)?,
                descending,
            })
        })
        .collect()
}

/// Parse a column-level where clause for `estimate_columns`: predicates over
/// single-column statistics joined by `and`.
pub fn parse_column_where_clause(
    text: &str,
    table: &str,
    schema: &TableSchema,
) -> Result<Vec<ColumnPredicate>> {
    split_and(text)
        .into_iter()
        .map(|term| {
            let caps = PREDICATE_RE
                .captures(&term)
                .ok_or_else(|| EngineError::Parse(format!("Invalid predicate '{}'", term)))?;
            let threshold: f64 = caps[3].trim().parse().map_err(|_| {
                EngineError::Parse(format!("Expected a numeric threshold in '{}'", term))
            })?;
            Ok(ColumnPredicate {
                function: parse_column_function(caps[1].trim(), table, schema)?,
                op: parse_op(&caps[2])?,
                threshold,
            })
        })
        .collect()
}

/// Parse a column-level order-by clause: comma-separated
/// `column-function [asc|desc]` keys. Descending is the default, so the
/// strongest columns rank first.
pub fn parse_column_order_by_clause(
    text: &str,
    table: &str,
    schema: &TableSchema,
) -> Result<Vec<ColumnOrderKey>> {
    split_commas(text)
        .into_iter()
        .map(|item| {
            let lower = item.to_ascii_lowercase();
            let (expr, descending) = if lower.ends_with(" asc") {
                (item[..item.len() - 4].trim_end(), false)
            } else if lower.ends_with(" desc") {
                (item[..item.len() - 5].trim_end(), true)
            } else {
                (item.as_str(), true)
            };
            Ok(ColumnOrderKey {
                function: parse_column_function(expr, table, schema)?,
                descending,
                label: expr.to_string(),
            })
        })
        .collect()
}

fn parse_column_function(
    expr: &str,
    table: &str,
    schema: &TableSchema,
) -> Result<ColumnFunction> {
    if expr.eq_ignore_ascii_case("typicality") {
        return Ok(ColumnFunction::Typicality);
    }
    if let Some(caps) = DEPENDENCE_RE.captures(expr) {
        let other = require_modeled(table, schema, &caps[1])?;
        return Ok(ColumnFunction::DependenceProbability { other });
    }
    if let Some(caps) = MUTUAL_INFO_RE.captures(expr) {
        let other = require_modeled(table, schema, &caps[1])?;
        return Ok(ColumnFunction::MutualInformation { other });
    }
    if let Some(caps) = CORRELATION_RE.captures(expr) {
        let other = require_modeled(table, schema, &caps[1])?;
        return Ok(ColumnFunction::Correlation { other });
    }
    Err(EngineError::Parse(format!(
        "Unknown column function '{}'",
        expr
    )))
}

/// Look a column up and require that the backend models it.
fn require_modeled(table: &str, schema: &TableSchema, name: &str) -> Result<usize> {
    let name = name.to_ascii_lowercase();
    schema.require_column(table, &name)?;
    schema.modeled_index(&name).ok_or_else(|| {
        EngineError::Parse(format!(
            "Column '{}' is not modeled (key or ignored) and cannot be used here",
            name
        ))
    })
}

fn parse_op(text: &str) -> Result<CompareOp> {
    match text {
        "=" => Ok(CompareOp::Eq),
        "!=" => Ok(CompareOp::Ne),
        "<" => Ok(CompareOp::Lt),
        "<=" => Ok(CompareOp::Le),
        ">" => Ok(CompareOp::Gt),
        ">=" => Ok(CompareOp::Ge),
        other => Err(EngineError::Parse(format!("Unknown operator '{}'", other))),
    }
}

/// Parse a literal value, stripping surrounding quotes.
fn parse_literal(text: &str) -> Value {
    let trimmed = text.trim();
    let unquoted = trimmed
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
        .unwrap_or(trimmed);
    Value::parse(unquoted)
}

fn split_commas(text: &str) -> Vec<String> {
    text.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn split_and(text: &str) -> Vec<String> {
    AND_SPLIT_RE
        .split(text)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Split a trailing `asc`/`desc` direction marker off an order-by item.
fn split_direction(item: &str) -> (&str, bool) {
    let lower = item.to_ascii_lowercase();
    if lower.ends_with(" desc") {
        (item[..item.len() - 5].trim_end(), true)
    } else if lower.ends_with(" asc") {
        (item[..item.len() - 4].trim_end(), false)
    } else {
        (item, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Codebook, ColumnSchema, ColumnType};

    fn schema() -> TableSchema {
        let mut job = ColumnSchema::new("job", 2, ColumnType::Categorical);
        let values = vec![Value::Text("nurse".to_string()), Value::Text("chef".to_string())];
        job.codebook = Some(Codebook::from_values(values.iter()));
        TableSchema::with_columns(vec![
            ColumnSchema::new("id", 0, ColumnType::Key),
            ColumnSchema::new("age", 1, ColumnType::Continuous),
            job,
        ])
    }

    #[test]
    fn test_star_expands_to_active_projection() {
        let resolved =
            parse_functions("*", "people", &schema(), &IndexMap::new()).unwrap();
        let labels: Vec<_> = resolved.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["row_id", "id", "age", "job"]);
    }

    #[test]
    fn test_column_list_expansion() {
        let mut lists = IndexMap::new();
        lists.insert("mine".to_string(), vec!["age".to_string()]);
        let resolved = parse_functions("mine", "people", &schema(), &lists).unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[1].label, "age");
    }

    #[test]
    fn test_similarity_with_respect_to() {
        let f = parse_function_expr("similarity to 1 with respect to age", "people", &schema())
            .unwrap();
        assert_eq!(
            f,
            QueryFunction::Similarity {
                target_row: 1,
                wrt: Some(0)
            }
        );
    }

    #[test]
    fn test_probability_encodes_value() {
        let f = parse_function_expr("probability of job = 'chef'", "people", &schema()).unwrap();
        assert_eq!(f, QueryFunction::Probability { column: 1, code: 1.0 });
    }

    #[test]
    fn test_probability_unknown_value_fails() {
        let err =
            parse_function_expr("probability of job = 'pilot'", "people", &schema()).unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));
    }

    #[test]
    fn test_unknown_column_fails() {
        let err = parse_function_expr("height", "people", &schema()).unwrap_err();
        assert!(matches!(err, EngineError::NoSuchColumn { .. }));
    }

    #[test]
    fn test_where_clause_and_terms() {
        let preds = parse_where_clause("age > 30 and job = 'nurse'", "people", &schema()).unwrap();
        assert_eq!(preds.len(), 2);
        assert_eq!(preds[0].position, 1);
        assert_eq!(preds[0].op, CompareOp::Gt);
        assert_eq!(preds[1].value, Value::Text("nurse".to_string()));
    }

    #[test]
    fn test_order_by_directions() {
        let keys = parse_order_by_clause("age desc, job", "people", &schema()).unwrap();
        assert!(keys[0].descending);
        assert!(!keys[1].descending);
    }

    #[test]
    fn test_key_column_rejected_for_model_functions() {
        let err = parse_function_expr("typicality of id", "people", &schema()).unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));
    }

    #[test]
    fn test_column_where_clause() {
        let preds =
            parse_column_where_clause("typicality > 0.5", "people", &schema()).unwrap();
        assert_eq!(preds[0].function, ColumnFunction::Typicality);
        assert_eq!(preds[0].threshold, 0.5);
    }

    #[test]
    fn test_column_order_by_defaults_descending() {
        let keys =
            parse_column_order_by_clause("correlation with age", "people", &schema()).unwrap();
        assert_eq!(keys[0].function, ColumnFunction::Correlation { other: 0 });
        assert!(keys[0].descending);
    }
}
