//! Deterministic mock inference backend.
//!
//! Implements the full backend operation contract with cheap deterministic
//! stand-ins for the real statistical algorithms. Useful for tests and for
//! exercising the pipeline without a real backend attached.

use std::sync::Mutex;

use serde_json::{Value as Json, json};

use super::InferenceBackend;

/// Iterations the mock completes per analyze round when a wall-clock budget
/// is present, to exercise the "backend stopped early" path.
const TIME_BUDGET_ITERATIONS: u64 = 25;

/// Mock backend with predictable, seedable behavior.
pub struct MockBackend {
    rng: Mutex<fastrand::Rng>,
}

impl MockBackend {
    /// Create a mock backend with a fixed default seed.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Create a mock backend with an explicit seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(fastrand::Rng::with_seed(seed)),
        }
    }

    fn initialize(&self, params: &Json) -> Result<Json, String> {
        let n = params
            .get("n_chains")
            .and_then(Json::as_u64)
            .ok_or("initialize: missing n_chains")? as usize;
        let mut rng = self.rng.lock().expect("rng lock poisoned");
        let column_states: Vec<Json> = (0..n)
            .map(|i| json!({ "chain": i, "seed": rng.u64(..), "refined": 0 }))
            .collect();
        let row_states: Vec<Json> = (0..n).map(|_| json!([])).collect();
        Ok(json!({ "column_states": column_states, "row_states": row_states }))
    }

    fn analyze(&self, params: &Json) -> Result<Json, String> {
        let requested = params
            .get("n_steps")
            .and_then(Json::as_u64)
            .ok_or("analyze: missing n_steps")?;
        let completed = if params.get("max_time").is_some() {
            requested.min(TIME_BUDGET_ITERATIONS)
        } else {
            requested
        };

        let mut column_state = params
            .get("column_state")
            .cloned()
            .ok_or("analyze: missing column_state")?;
        let refined = column_state
            .get("refined")
            .and_then(Json::as_u64)
            .unwrap_or(0);
        if let Some(obj) = column_state.as_object_mut() {
            obj.insert("refined".to_string(), json!(refined + completed));
        }
        let row_state = params
            .get("row_state")
            .cloned()
            .ok_or("analyze: missing row_state")?;

        let mut rng = self.rng.lock().expect("rng lock poisoned");
        let logscore: Vec<f64> = (0..completed)
            .map(|i| -1000.0 + (refined + i) as f64 * 0.5 + rng.f64())
            .collect();
        let num_views: Vec<f64> = (0..completed).map(|_| 1.0 + rng.f64() * 3.0).collect();
        let column_crp_alpha: Vec<f64> = (0..completed).map(|_| rng.f64()).collect();

        Ok(json!({
            "column_state": column_state,
            "row_state": row_state,
            "diagnostics": {
                "logscore": logscore,
                "num_views": num_views,
                "column_crp_alpha": column_crp_alpha,
            },
        }))
    }

    fn predictive_sample(&self, params: &Json) -> Result<Json, String> {
        let n = params
            .get("n")
            .and_then(Json::as_u64)
            .ok_or("simple_predictive_sample: missing n")? as usize;
        let targets = params
            .get("targets")
            .and_then(Json::as_array)
            .ok_or("simple_predictive_sample: missing targets")?;
        let target_cols: Vec<usize> = targets
            .iter()
            .filter_map(|t| t.as_array()?.get(1)?.as_u64())
            .map(|c| c as usize)
            .collect();

        let mut rng = self.rng.lock().expect("rng lock poisoned");
        let draws: Vec<Vec<f64>> = (0..n)
            .map(|_| {
                target_cols
                    .iter()
                    .map(|&col| {
                        let observed = column_codes(params, col);
                        if observed.is_empty() {
                            0.0
                        } else {
                            observed[rng.usize(0..observed.len())]
                        }
                    })
                    .collect()
            })
            .collect();
        Ok(json!(draws))
    }

    fn impute(&self, params: &Json) -> Result<Json, String> {
        let col = params
            .get("column")
            .and_then(Json::as_u64)
            .ok_or("impute_and_confidence: missing column")? as usize;
        let observed = column_codes(params, col);
        let total = data_rows(params).max(1);
        // Point estimate is the modal observed code; confidence is the
        // observed fraction of the column.
        let value = modal_code(&observed);
        let confidence = observed.len() as f64 / total as f64;
        Ok(json!({ "value": value, "confidence": confidence }))
    }

    fn relation(&self, operation: &str, params: &Json) -> Result<Json, String> {
        let value = match operation {
            "similarity" => {
                let row = require_u64(params, "row")?;
                let target = require_u64(params, "target_row")?;
                if row == target {
                    1.0
                } else {
                    1.0 / (1.0 + row.abs_diff(target) as f64)
                }
            }
            "row_typicality" => {
                let row = require_u64(params, "row")?;
                ((row * 37 + 11) % 100) as f64 / 100.0
            }
            "column_typicality" => {
                let col = require_u64(params, "column")?;
                ((col * 29 + 7) % 100) as f64 / 100.0
            }
            "predictive_probability" => {
                let row = require_u64(params, "row")?;
                let col = require_u64(params, "column")?;
                -0.1 - ((row * 13 + col * 7) % 50) as f64 / 25.0
            }
            "probability" => {
                let col = require_u64(params, "column")? as usize;
                let code = params
                    .get("code")
                    .and_then(Json::as_f64)
                    .ok_or("probability: missing code")?;
                let observed = column_codes(params, col);
                if observed.is_empty() {
                    0.01
                } else {
                    let hits = observed.iter().filter(|&&c| (c - code).abs() < 1e-9).count();
                    (hits as f64 / observed.len() as f64).max(0.01)
                }
            }
            "dependence_probability" | "mutual_information" | "correlation" => {
                let a = require_u64(params, "column_a")?;
                let b = require_u64(params, "column_b")?;
                pair_strength(a, b)
            }
            other => return Err(format!("unknown operation '{}'", other)),
        };
        Ok(json!(value))
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for MockBackend {
    fn execute(&self, operation: &str, params: Json) -> Result<Json, String> {
        match operation {
            "initialize" => self.initialize(&params),
            "analyze" => self.analyze(&params),
            "simple_predictive_sample" => self.predictive_sample(&params),
            "impute_and_confidence" => self.impute(&params),
            other => self.relation(other, &params),
        }
    }
}

/// Symmetric deterministic pair strength in [0, 1]; 1.0 on the diagonal.
fn pair_strength(a: u64, b: u64) -> f64 {
    if a == b {
        return 1.0;
    }
    let (lo, hi) = (a.min(b), a.max(b));
    ((lo * 31 + hi * 17) % 100) as f64 / 100.0
}

fn require_u64(params: &Json, key: &str) -> Result<u64, String> {
    params
        .get(key)
        .and_then(Json::as_u64)
        .ok_or_else(|| format!("missing parameter '{}'", key))
}

/// Observed (non-null) codes of one column of the coded data matrix.
fn column_codes(params: &Json, col: usize) -> Vec<f64> {
    params
        .get("data")
        .and_then(Json::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.as_array()?.get(col)?.as_f64())
                .collect()
        })
        .unwrap_or_default()
}

fn data_rows(params: &Json) -> usize {
    params
        .get("data")
        .and_then(Json::as_array)
        .map(|rows| rows.len())
        .unwrap_or(0)
}

/// Most frequent code, ties broken by first occurrence.
fn modal_code(observed: &[f64]) -> f64 {
    let mut best = 0.0;
    let mut best_count = 0;
    for &candidate in observed {
        let count = observed
            .iter()
            .filter(|&&c| (c - candidate).abs() < 1e-9)
            .count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}
