//! Typed wrappers for the backend operations the coordinator issues.
//!
//! Each wrapper builds the operation's parameter map, invokes the client,
//! and parses the result back into core types. Latent states pass through
//! as opaque blobs in both directions.

use serde_json::{Map, Value as Json, json};

use crate::error::{EngineError, Result};
use crate::models::{Diagnostics, InitStrategy, LatentState, ModelConfig};
use crate::table::Btable;

use super::BackendClient;

/// Result of one per-model analyze round.
#[derive(Debug, Clone)]
pub struct AnalyzeOutcome {
    /// Refined latent state.
    pub latent: LatentState,
    /// Diagnostic series for the completed iterations; its length is the
    /// number of iterations the backend actually ran.
    pub diagnostics: Diagnostics,
}

/// Result of one cell imputation.
#[derive(Debug, Clone, Copy)]
pub struct Imputation {
    /// Imputed value, in coded form.
    pub code: f64,
    /// Backend confidence in the point estimate (0.0-1.0).
    pub confidence: f64,
}

fn init_name(strategy: InitStrategy) -> &'static str {
    match strategy {
        InitStrategy::Together => "together",
        InitStrategy::FromThePrior => "from_the_prior",
    }
}

fn table_params(table: &Btable) -> Map<String, Json> {
    let mut params = Map::new();
    params.insert("table".to_string(), table.coded_metadata());
    params.insert("data".to_string(), table.coded_matrix());
    params
}

fn ensemble_params(table: &Btable, latents: &[LatentState]) -> Map<String, Json> {
    let mut params = table_params(table);
    params.insert(
        "column_states".to_string(),
        Json::Array(latents.iter().map(|l| l.column_state.clone()).collect()),
    );
    params.insert(
        "row_states".to_string(),
        Json::Array(latents.iter().map(|l| l.row_state.clone()).collect()),
    );
    params
}

fn expect_f64(operation: &str, result: &Json) -> Result<f64> {
    result.as_f64().ok_or_else(|| {
        EngineError::Backend(format!(
            "Operation '{}' returned a non-numeric result: {}",
            operation, result
        ))
    })
}

/// Initialize `n` fresh chains sharing one configuration.
pub fn initialize(
    client: &dyn BackendClient,
    table: &Btable,
    n: usize,
    config: &ModelConfig,
) -> Result<Vec<LatentState>> {
    let mut params = table_params(table);
    params.insert("n_chains".to_string(), json!(n));
    params.insert(
        "initialization".to_string(),
        json!(init_name(config.initialization)),
    );
    params.insert(
        "row_initialization".to_string(),
        json!(init_name(config.row_initialization)),
    );

    let result = client.invoke("initialize", Json::Object(params))?;
    let column_states = result
        .get("column_states")
        .and_then(Json::as_array)
        .ok_or_else(|| EngineError::Backend("initialize returned no column_states".to_string()))?;
    let row_states = result
        .get("row_states")
        .and_then(Json::as_array)
        .ok_or_else(|| EngineError::Backend("initialize returned no row_states".to_string()))?;
    if column_states.len() != n || row_states.len() != n {
        return Err(EngineError::Backend(format!(
            "initialize returned {} states for {} requested chains",
            column_states.len(),
            n
        )));
    }

    Ok(column_states
        .iter()
        .zip(row_states.iter())
        .map(|(c, r)| LatentState {
            column_state: c.clone(),
            row_state: r.clone(),
        })
        .collect())
}

/// Refine one model's latent state for an iteration or wall-clock budget.
///
/// The backend may stop early on a time budget; callers must read the
/// completed iteration count from the diagnostics length, never assume the
/// requested count.
pub fn analyze_one(
    client: &dyn BackendClient,
    table: &Btable,
    latent: &LatentState,
    kernel_list: &[String],
    iterations: u64,
    seconds: Option<u64>,
) -> Result<AnalyzeOutcome> {
    let mut params = table_params(table);
    params.insert("column_state".to_string(), latent.column_state.clone());
    params.insert("row_state".to_string(), latent.row_state.clone());
    params.insert("kernel_list".to_string(), json!(kernel_list));
    params.insert("n_steps".to_string(), json!(iterations));
    params.insert("with_diagnostics".to_string(), json!(true));
    if let Some(seconds) = seconds {
        params.insert("max_time".to_string(), json!(seconds));
    }

    let result = client.invoke("analyze", Json::Object(params))?;
    let latent = LatentState {
        column_state: result
            .get("column_state")
            .cloned()
            .ok_or_else(|| EngineError::Backend("analyze returned no column_state".to_string()))?,
        row_state: result
            .get("row_state")
            .cloned()
            .ok_or_else(|| EngineError::Backend("analyze returned no row_state".to_string()))?,
    };
    let diagnostics: Diagnostics = serde_json::from_value(
        result
            .get("diagnostics")
            .cloned()
            .ok_or_else(|| EngineError::Backend("analyze returned no diagnostics".to_string()))?,
    )?;

    Ok(AnalyzeOutcome { latent, diagnostics })
}

/// Draw `n` joint samples of the target columns, conditioned on coded given
/// values attached to a synthetic unseen row.
pub fn predictive_sample(
    client: &dyn BackendClient,
    table: &Btable,
    latents: &[LatentState],
    givens: &[(usize, f64)],
    targets: &[usize],
    n: usize,
) -> Result<Vec<Vec<f64>>> {
    let mut params = ensemble_params(table, latents);
    let unseen_row = table.row_count();
    params.insert(
        "givens".to_string(),
        Json::Array(
            givens
                .iter()
                .map(|&(col, code)| json!([unseen_row, col, code]))
                .collect(),
        ),
    );
    params.insert(
        "targets".to_string(),
        Json::Array(targets.iter().map(|&col| json!([unseen_row, col])).collect()),
    );
    params.insert("n".to_string(), json!(n));

    let result = client.invoke("simple_predictive_sample", Json::Object(params))?;
    let draws: Vec<Vec<f64>> = serde_json::from_value(result)?;
    if draws.len() != n {
        return Err(EngineError::Backend(format!(
            "simple_predictive_sample returned {} draws for {} requested",
            draws.len(),
            n
        )));
    }
    Ok(draws)
}

/// Impute one missing cell: `numsamples` draws reduced to a point estimate
/// with a confidence.
pub fn impute(
    client: &dyn BackendClient,
    table: &Btable,
    latents: &[LatentState],
    row: usize,
    column: usize,
    numsamples: usize,
) -> Result<Imputation> {
    let mut params = ensemble_params(table, latents);
    params.insert("row".to_string(), json!(row));
    params.insert("column".to_string(), json!(column));
    params.insert("numsamples".to_string(), json!(numsamples));

    let result = client.invoke("impute_and_confidence", Json::Object(params))?;
    let code = expect_f64(
        "impute_and_confidence",
        result.get("value").unwrap_or(&Json::Null),
    )?;
    let confidence = expect_f64(
        "impute_and_confidence",
        result.get("confidence").unwrap_or(&Json::Null),
    )?;
    Ok(Imputation { code, confidence })
}

/// Evaluate a scalar relationship function (similarity, typicality,
/// probability, dependence, mutual information, correlation).
pub fn relation(
    client: &dyn BackendClient,
    table: &Btable,
    latents: &[LatentState],
    operation: &str,
    extra: Json,
) -> Result<f64> {
    let mut params = ensemble_params(table, latents);
    if let Json::Object(extra) = extra {
        params.extend(extra);
    }
    let result = client.invoke(operation, Json::Object(params))?;
    expect_f64(operation, &result)
}
