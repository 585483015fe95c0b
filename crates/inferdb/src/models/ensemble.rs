//! Ensemble lifecycle: initialize, analyze, drop, save, load.

use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::backend::{BackendClient, ops};
use crate::catalog::Catalog;
use crate::error::{EngineError, Result};

use super::{
    LEGACY_ITERATIONS, LatentState, Model, ModelConfig, ModelSelection, ModelSpec,
};

/// Portable save envelope for an ensemble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedModels {
    /// When the ensemble was exported.
    pub saved_at: DateTime<Utc>,
    /// Models keyed by their id at save time.
    pub models: IndexMap<u64, Model>,
}

/// Legacy save shape: two parallel latent-state lists, no iteration counts
/// or configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyArchive {
    pub column_states: Vec<Json>,
    pub row_states: Vec<Json>,
}

/// Either save format, as accepted by `load_models`.
#[derive(Debug, Clone)]
pub enum ModelArchive {
    Current(SavedModels),
    Legacy(LegacyArchive),
}

impl<'de> Deserialize<'de> for ModelArchive {
    /// Detects the format by shape: the current envelope carries a `models`
    /// field, legacy archives carry the two parallel state lists. The
    /// numeric model-id keys of the envelope map do not survive serde's
    /// untagged content buffering, so detection inspects the JSON directly.
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        let value = Json::deserialize(deserializer)?;
        if value.get("models").is_some() {
            SavedModels::deserialize(value)
                .map(ModelArchive::Current)
                .map_err(D::Error::custom)
        } else {
            LegacyArchive::deserialize(value)
                .map(ModelArchive::Legacy)
                .map_err(D::Error::custom)
        }
    }
}

/// Per-model outcome of one analyze call.
#[derive(Debug, Clone)]
pub struct AnalyzeReport {
    /// `(model_id, completed_iterations)` for every updated model.
    pub updated: Vec<(u64, u64)>,
}

/// Owns ensemble edits: the only component that writes model state.
pub struct EnsembleManager {
    catalog: Arc<dyn Catalog>,
    client: Arc<dyn BackendClient>,
}

impl EnsembleManager {
    pub fn new(catalog: Arc<dyn Catalog>, client: Arc<dyn BackendClient>) -> Self {
        Self { catalog, client }
    }

    fn require_table(&self, table: &str) -> Result<()> {
        if !self.catalog.table_exists(table) {
            return Err(EngineError::NoSuchTable(table.to_string()));
        }
        Ok(())
    }

    /// Initialize `n` fresh models sharing one configuration.
    ///
    /// The configuration must match any existing ensemble's exactly; this is
    /// the only point where config consistency is enforced.
    pub fn initialize_models(
        &self,
        table: &str,
        n: usize,
        spec: Option<&ModelSpec>,
    ) -> Result<Vec<u64>> {
        self.require_table(table)?;
        let config = ModelSpec::resolve(spec);

        if let Some(existing) = self.catalog.model_config(table)? {
            if existing != config {
                return Err(EngineError::ConfigMismatch {
                    existing: format!("{:?}", existing),
                });
            }
        }

        let snapshot = self.catalog.get_table(table)?;
        let latents = ops::initialize(self.client.as_ref(), &snapshot, n, &config)?;
        let models: Vec<Model> = latents
            .into_iter()
            .map(|latent| Model::new(latent, config.clone()))
            .collect();
        self.catalog.add_models(table, models)
    }

    /// Refine the selected models for an iteration or wall-clock budget.
    ///
    /// Each selected model is an independent unit of work, refined by its own
    /// backend call on its own worker. Completed models are persisted even if
    /// a sibling's call fails; the first failure is reported after all
    /// completed updates are applied.
    pub fn analyze(
        &self,
        table: &str,
        selection: &ModelSelection,
        iterations: Option<u64>,
        seconds: Option<u64>,
        kernel_override: Option<&[String]>,
    ) -> Result<AnalyzeReport> {
        self.require_table(table)?;
        let models = self.catalog.get_models(table)?;
        if models.is_empty() {
            return Err(EngineError::NoModels(table.to_string()));
        }

        let selected: Vec<u64> = match selection {
            ModelSelection::All => models.keys().copied().collect(),
            ModelSelection::Ids(ids) => ids.clone(),
        };
        if selected.is_empty() {
            return Err(EngineError::Input(format!(
                "Model selection for btable '{}' names no models",
                table
            )));
        }
        for id in &selected {
            if !models.contains_key(id) {
                return Err(EngineError::Backend(format!(
                    "Model {} does not exist for btable '{}'",
                    id, table
                )));
            }
        }

        let iterations = iterations.unwrap_or(1000);
        let kernel_list: Vec<String> = match kernel_override {
            Some(kernels) => kernels.to_vec(),
            None => models[&selected[0]]
                .config
                .as_ref()
                .map(|c| c.kernel_list.clone())
                .unwrap_or_default(),
        };

        let snapshot = self.catalog.get_table(table)?;
        let client = self.client.as_ref();

        // One worker per selected model; join before applying anything is
        // not required for isolation, but applying after the join keeps the
        // apply loop single-threaded against the catalog.
        let outcomes: Vec<(u64, Result<ops::AnalyzeOutcome>)> = thread::scope(|scope| {
            let handles: Vec<_> = selected
                .iter()
                .map(|&id| {
                    let latent = models[&id].latent.clone();
                    let kernels = kernel_list.clone();
                    let snapshot = &snapshot;
                    scope.spawn(move || {
                        (
                            id,
                            ops::analyze_one(client, snapshot, &latent, &kernels, iterations, seconds),
                        )
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("analyze worker panicked"))
                .collect()
        });

        let mut updated = Vec::new();
        let mut first_failure: Option<EngineError> = None;
        for (id, outcome) in outcomes {
            match outcome {
                Ok(outcome) => {
                    // Completed count comes from the diagnostics length; the
                    // backend may stop early on a time budget.
                    let completed = outcome.diagnostics.logscore.len() as u64;
                    let mut model = models[&id].clone();
                    model.latent = outcome.latent;
                    model.iterations += completed;
                    model.diagnostics.extend(&outcome.diagnostics);
                    self.catalog.update_model(table, id, model)?;
                    updated.push((id, completed));
                }
                Err(err) => {
                    if first_failure.is_none() {
                        first_failure = Some(err);
                    }
                }
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(AnalyzeReport { updated }),
        }
    }

    /// Drop the selected models; dropping all returns the ensemble to empty
    /// without deleting the table.
    pub fn drop_models(&self, table: &str, selection: &ModelSelection) -> Result<()> {
        self.require_table(table)?;
        match selection {
            ModelSelection::All => self.catalog.drop_models(table, None),
            ModelSelection::Ids(ids) => self.catalog.drop_models(table, Some(ids)),
        }
    }

    /// Export the ensemble for the client to persist.
    pub fn save_models(&self, table: &str) -> Result<SavedModels> {
        self.require_table(table)?;
        Ok(SavedModels {
            saved_at: Utc::now(),
            models: self.catalog.get_models(table)?,
        })
    }

    /// Import previously saved models as new models.
    ///
    /// Legacy-format archives are upgraded in place: iteration counts default
    /// to the fixed legacy constant and configuration is absent. Loaded
    /// models that do carry a configuration are checked against a non-empty
    /// existing ensemble's config.
    pub fn load_models(&self, table: &str, archive: ModelArchive) -> Result<Vec<u64>> {
        self.require_table(table)?;

        let incoming: Vec<Model> = match archive {
            ModelArchive::Current(saved) => saved.models.into_values().collect(),
            ModelArchive::Legacy(legacy) => legacy
                .column_states
                .into_iter()
                .zip(legacy.row_states)
                .map(|(column_state, row_state)| Model {
                    latent: LatentState {
                        column_state,
                        row_state,
                    },
                    iterations: LEGACY_ITERATIONS,
                    diagnostics: Default::default(),
                    config: None,
                })
                .collect(),
        };

        if let Some(existing) = self.catalog.model_config(table)? {
            for model in &incoming {
                if let Some(config) = &model.config {
                    if *config != existing {
                        return Err(EngineError::ConfigMismatch {
                            existing: format!("{:?}", existing),
                        });
                    }
                }
            }
        }

        self.catalog.add_models(table, incoming)
    }

    /// One consistent snapshot of the ensemble's latent states, in id order.
    pub fn latent_snapshot(&self, table: &str) -> Result<Vec<LatentState>> {
        self.require_table(table)?;
        Ok(self
            .catalog
            .get_models(table)?
            .values()
            .map(|m| m.latent.clone())
            .collect())
    }

    /// The configuration shared by the current ensemble, if any.
    pub fn config(&self, table: &str) -> Result<Option<ModelConfig>> {
        self.catalog.model_config(table)
    }
}
