//! The simulate pipeline: synthetic rows drawn from the ensemble.

use crate::backend::ops;
use crate::error::{EngineError, Result};
use crate::query::functions::{EvalContext, QueryFunction, ResolvedFunction};
use crate::value::Value;

/// Fixed column=value assignments conditioning the draws.
#[derive(Debug, Clone)]
pub struct Given {
    /// Column name, lowercased.
    pub column: String,
    pub value: Value,
}

/// Draw `numpredictions` synthetic rows for the queried columns.
///
/// Given values are encoded and attached to a synthetic unseen row; one
/// backend call samples every queried column not fixed by a given. Given
/// columns are echoed verbatim in every output row, never resampled.
pub fn execute(
    ctx: &EvalContext<'_>,
    table_name: &str,
    functions: &[ResolvedFunction],
    givens: &[Given],
    numpredictions: usize,
) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
    if ctx.latents.is_empty() {
        return Err(EngineError::NoModels(table_name.to_string()));
    }

    // Simulate targets are raw modeled columns only; the row_id descriptor
    // the function parser prepends is skipped.
    let schema = &ctx.table.schema;
    let mut queried: Vec<(String, usize)> = Vec::new();
    for resolved in functions {
        match resolved.function {
            QueryFunction::RowId => continue,
            QueryFunction::Column { position } => {
                let column = &schema.columns[position];
                let modeled = schema.modeled_index(&column.name).ok_or_else(|| {
                    EngineError::Parse(format!(
                        "Column '{}' is not modeled and cannot be simulated",
                        column.name
                    ))
                })?;
                queried.push((column.name.clone(), modeled));
            }
            _ => {
                return Err(EngineError::Parse(format!(
                    "simulate accepts only raw columns, not '{}'",
                    resolved.label
                )));
            }
        }
    }
    if queried.is_empty() {
        return Err(EngineError::Parse(
            "simulate requires at least one column".to_string(),
        ));
    }

    // Encode givens to the coded representation.
    let mut given_coded: Vec<(usize, f64)> = Vec::with_capacity(givens.len());
    for given in givens {
        let column = schema.require_column(table_name, &given.column)?;
        let modeled = schema.modeled_index(&column.name).ok_or_else(|| {
            EngineError::Parse(format!(
                "Column '{}' is not modeled and cannot be a given",
                column.name
            ))
        })?;
        let code = column.encode(&given.value).ok_or_else(|| {
            EngineError::Parse(format!(
                "Value '{}' is not valid for column '{}'",
                given.value, column.name
            ))
        })?;
        given_coded.push((modeled, code));
    }

    let targets: Vec<usize> = queried
        .iter()
        .map(|&(_, modeled)| modeled)
        .filter(|modeled| !given_coded.iter().any(|&(g, _)| g == *modeled))
        .collect();

    let draws = if targets.is_empty() {
        vec![Vec::new(); numpredictions]
    } else {
        ops::predictive_sample(
            ctx.client,
            ctx.table,
            ctx.latents,
            &given_coded,
            &targets,
            numpredictions,
        )?
    };

    // Merge draws with the givens and decode back to original value types.
    let mut data = Vec::with_capacity(numpredictions);
    for draw in draws {
        let mut row = Vec::with_capacity(queried.len());
        for &(ref name, modeled) in &queried {
            if let Some(given) = givens.iter().find(|g| &g.column == name) {
                row.push(given.value.clone());
            } else {
                let sampled = targets.iter().position(|&t| t == modeled).and_then(|i| draw.get(i));
                let code = sampled.copied().ok_or_else(|| {
                    EngineError::Backend(format!(
                        "Backend draw missing a value for column '{}'",
                        name
                    ))
                })?;
                let column = schema.require_column(table_name, name)?;
                row.push(column.decode(code));
            }
        }
        data.push(row);
    }

    let labels = queried.into_iter().map(|(name, _)| name).collect();
    Ok((labels, data))
}
