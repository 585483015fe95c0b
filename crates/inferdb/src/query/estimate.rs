//! Relational analysis: column ranking and pairwise matrices.

use crate::error::{EngineError, Result};
use crate::query::functions::{ColumnOrderKey, ColumnPredicate, EvalContext};
use crate::value::Value;

/// Pair functions supported by the pairwise-column dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairFunction {
    DependenceProbability,
    MutualInformation,
    Correlation,
}

impl PairFunction {
    /// Resolve a user-supplied function name.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "dependence probability" => Ok(PairFunction::DependenceProbability),
            "mutual information" => Ok(PairFunction::MutualInformation),
            "correlation" => Ok(PairFunction::Correlation),
            other => Err(EngineError::Parse(format!(
                "Unknown pairwise function '{}'",
                other
            ))),
        }
    }

    fn operation(&self) -> &'static str {
        match self {
            PairFunction::DependenceProbability => "dependence_probability",
            PairFunction::MutualInformation => "mutual_information",
            PairFunction::Correlation => "correlation",
        }
    }
}

/// One ranked column: its name and the values of each ordering key.
#[derive(Debug, Clone)]
pub struct RankedColumn {
    pub name: String,
    pub key_values: Vec<f64>,
}

/// Rank modeled columns: filter by column-level predicates, order by
/// column-level keys, truncate to `limit`.
///
/// Predicates and ordering are model-backed, so either one present with an
/// empty ensemble fails with `NoModels`; with neither, the full column set
/// comes back in schema order.
pub fn estimate_columns(
    ctx: &EvalContext<'_>,
    table_name: &str,
    conditions: &[ColumnPredicate],
    order: &[ColumnOrderKey],
    limit: Option<usize>,
) -> Result<Vec<RankedColumn>> {
    if ctx.latents.is_empty() && (!conditions.is_empty() || !order.is_empty()) {
        return Err(EngineError::NoModels(table_name.to_string()));
    }

    let mut columns: Vec<usize> = (0..ctx.table.schema.modeled_count()).collect();

    for predicate in conditions {
        let mut kept = Vec::with_capacity(columns.len());
        for column in columns {
            let value = ctx.evaluate_column(&predicate.function, column)?;
            if predicate.op.compare(&Value::Number(value), &Value::Number(predicate.threshold)) {
                kept.push(column);
            }
        }
        columns = kept;
    }

    let mut ranked: Vec<(Vec<f64>, usize)> = Vec::with_capacity(columns.len());
    for column in columns {
        let mut key_values = Vec::with_capacity(order.len());
        for key in order {
            key_values.push(ctx.evaluate_column(&key.function, column)?);
        }
        ranked.push((key_values, column));
    }
    ranked.sort_by(|(a, _), (b, _)| {
        for (i, key) in order.iter().enumerate() {
            let ord = a[i].total_cmp(&b[i]);
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });

    if let Some(limit) = limit {
        ranked.truncate(limit);
    }

    let mut out = Vec::with_capacity(ranked.len());
    for (key_values, column) in ranked {
        let schema_column = ctx.table.schema.modeled_column(column).ok_or_else(|| {
            EngineError::Backend(format!("Modeled column index {} out of range", column))
        })?;
        out.push(RankedColumn {
            name: schema_column.name.clone(),
            key_values,
        });
    }
    Ok(out)
}

/// Symmetric pairwise similarity matrix over the given rows.
pub fn pairwise_rows(ctx: &EvalContext<'_>, rows: &[usize]) -> Result<Vec<Vec<f64>>> {
    pairwise(rows.len(), |i, j| {
        ctx.evaluate(
            &crate::query::functions::QueryFunction::Similarity {
                target_row: rows[j],
                wrt: None,
            },
            rows[i],
            &[],
        )
        .map(|v| v.as_f64().unwrap_or(0.0))
    })
}

/// Symmetric pairwise matrix of `function` over the given modeled columns.
pub fn pairwise_columns(
    ctx: &EvalContext<'_>,
    columns: &[usize],
    function: PairFunction,
) -> Result<Vec<Vec<f64>>> {
    pairwise(columns.len(), |i, j| {
        crate::backend::ops::relation(
            ctx.client,
            ctx.table,
            ctx.latents,
            function.operation(),
            serde_json::json!({ "column_a": columns[i], "column_b": columns[j] }),
        )
    })
}

/// Fill a symmetric matrix, evaluating each unordered pair once.
fn pairwise(
    n: usize,
    mut entry: impl FnMut(usize, usize) -> Result<f64>,
) -> Result<Vec<Vec<f64>>> {
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let value = entry(i, j)?;
            matrix[i][j] = value;
            matrix[j][i] = value;
        }
    }
    Ok(matrix)
}

/// Partition matrix indices into connected components under a relationship
/// threshold: indices `i` and `j` connect when `matrix[i][j] >= threshold`.
///
/// Components come back ordered by their smallest member, members sorted,
/// and every index lands in exactly one component.
pub fn threshold_components(matrix: &[Vec<f64>], threshold: f64) -> Vec<Vec<usize>> {
    let n = matrix.len();
    let mut assigned = vec![false; n];
    let mut components = Vec::new();

    for start in 0..n {
        if assigned[start] {
            continue;
        }
        let mut component = Vec::new();
        let mut stack = vec![start];
        assigned[start] = true;
        while let Some(i) = stack.pop() {
            component.push(i);
            for j in 0..n {
                if !assigned[j] && i != j && matrix[i][j] >= threshold {
                    assigned[j] = true;
                    stack.push(j);
                }
            }
        }
        component.sort_unstable();
        components.push(component);
    }

    components
}
