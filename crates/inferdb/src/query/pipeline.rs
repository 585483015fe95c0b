//! The select/infer pipeline: filter, impute, order, compute, limit.
//!
//! A pure function of one table snapshot, one ensemble snapshot, and one
//! parsed query. No stage mutates the ensemble or the table, and every
//! precondition is checked before the first backend call.

use std::collections::HashMap;

use crate::error::{EngineError, Result};
use crate::query::functions::{EvalContext, OrderKey, ResolvedFunction, WherePredicate};
use crate::value::Value;

/// Imputation settings for `infer`; absent for plain `select`.
#[derive(Debug, Clone, Copy)]
pub struct ImputeSpec {
    /// Minimum confidence for an imputed point estimate to replace the
    /// missing marker.
    pub confidence: f64,
    /// Backend draws per imputed cell.
    pub numsamples: usize,
}

/// A parsed select/infer query, ready to execute.
#[derive(Debug, Clone)]
pub struct SelectPlan {
    pub functions: Vec<ResolvedFunction>,
    pub conditions: Vec<WherePredicate>,
    pub order_by: Vec<OrderKey>,
    pub limit: Option<usize>,
    pub impute: Option<ImputeSpec>,
}

/// A surviving working-set row: original index plus a full-projection copy
/// that imputation may fill in.
struct WorkingRow {
    index: usize,
    values: Vec<Value>,
}

/// Execute a select/infer plan, returning output labels and result rows.
pub fn execute(ctx: &EvalContext<'_>, table_name: &str, plan: &SelectPlan) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
    // Precondition: model-backed functions (selected or order-by) and
    // imputation are illegal against an empty ensemble.
    if ctx.latents.is_empty() {
        if plan.impute.is_some() {
            return Err(EngineError::NoModels(table_name.to_string()));
        }
        let selected = plan.functions.iter().map(|f| &f.function);
        let ordered = plan.order_by.iter().map(|k| &k.function);
        if selected.chain(ordered).any(|f| f.requires_ensemble()) {
            return Err(EngineError::NoModels(table_name.to_string()));
        }
    }

    let mut rows = filter_and_impute(ctx, plan)?;
    order_rows(ctx, &mut rows, &plan.order_by)?;

    if let Some(limit) = plan.limit {
        rows.truncate(limit);
    }

    // Aggregates yield one value for the whole table; compute each once.
    let mut aggregate_cache: HashMap<usize, Value> = HashMap::new();
    let mut data = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut out = Vec::with_capacity(plan.functions.len());
        for (i, resolved) in plan.functions.iter().enumerate() {
            let value = if resolved.function.is_aggregate() {
                match aggregate_cache.get(&i) {
                    Some(value) => value.clone(),
                    None => {
                        let value = ctx.evaluate(&resolved.function, row.index, &row.values)?;
                        aggregate_cache.insert(i, value.clone());
                        value
                    }
                }
            } else {
                ctx.evaluate(&resolved.function, row.index, &row.values)?
            };
            out.push(value);
        }
        data.push(out);
    }

    let labels = plan.functions.iter().map(|f| f.label.clone()).collect();
    Ok((labels, data))
}

/// Build the working row set: drop rows failing the where predicates, then
/// fill requested missing cells from the ensemble when imputing.
fn filter_and_impute(ctx: &EvalContext<'_>, plan: &SelectPlan) -> Result<Vec<WorkingRow>> {
    let mut rows: Vec<WorkingRow> = ctx
        .table
        .rows
        .iter()
        .enumerate()
        .filter(|(_, values)| plan.conditions.iter().all(|p| p.matches(values)))
        .map(|(index, values)| WorkingRow {
            index,
            values: values.clone(),
        })
        .collect();

    let Some(impute) = plan.impute else {
        return Ok(rows);
    };

    // Imputation targets: the requested raw columns that the backend models.
    let targets: Vec<(usize, usize)> = plan
        .functions
        .iter()
        .filter_map(|f| match f.function {
            crate::query::functions::QueryFunction::Column { position } => {
                let column = &ctx.table.schema.columns[position];
                ctx.table
                    .schema
                    .modeled_index(&column.name)
                    .map(|modeled| (position, modeled))
            }
            _ => None,
        })
        .collect();

    for row in &mut rows {
        for &(position, modeled) in &targets {
            if !row.values[position].is_missing() {
                continue;
            }
            let imputed = crate::backend::ops::impute(
                ctx.client,
                ctx.table,
                ctx.latents,
                row.index,
                modeled,
                impute.numsamples,
            )?;
            // Below-threshold estimates keep the missing marker.
            if imputed.confidence >= impute.confidence {
                row.values[position] =
                    ctx.table.schema.columns[position].decode(imputed.code);
            }
        }
    }

    Ok(rows)
}

/// Reorder the working set by the order-by keys; ties fall back to the next
/// key, and finally to original row order (the sort is stable).
fn order_rows(ctx: &EvalContext<'_>, rows: &mut Vec<WorkingRow>, keys: &[OrderKey]) -> Result<()> {
    if keys.is_empty() {
        return Ok(());
    }

    let mut keyed: Vec<(Vec<Value>, WorkingRow)> = Vec::with_capacity(rows.len());
    for row in rows.drain(..) {
        let mut key_values = Vec::with_capacity(keys.len());
        for key in keys {
            key_values.push(ctx.evaluate(&key.function, row.index, &row.values)?);
        }
        keyed.push((key_values, row));
    }

    keyed.sort_by(|(a, _), (b, _)| {
        for (i, key) in keys.iter().enumerate() {
            let ord = a[i].sort_cmp(&b[i]);
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });

    rows.extend(keyed.into_iter().map(|(_, row)| row));
    Ok(())
}
