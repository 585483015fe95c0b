//! Model ensemble types and lifecycle management.
//!
//! A model is one independent inference chain: an opaque latent-state pair
//! the backend owns, an iteration counter, and per-iteration diagnostic
//! series. All models of a non-empty ensemble share one configuration.

mod ensemble;

pub use ensemble::{AnalyzeReport, EnsembleManager, LegacyArchive, ModelArchive, SavedModels};

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Iteration count assigned to models loaded from the legacy save format,
/// which stored no per-model counter.
pub const LEGACY_ITERATIONS: u64 = 500;

/// Initialization strategy passed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitStrategy {
    Together,
    FromThePrior,
}

/// Configuration shared by every model in an ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Inference kernels to cycle; empty means the backend default set.
    pub kernel_list: Vec<String>,
    /// Column-structure initialization strategy.
    pub initialization: InitStrategy,
    /// Row-assignment initialization strategy.
    pub row_initialization: InitStrategy,
}

/// Named model-configuration presets.
///
/// Unknown or absent preset names map to `Standard`, the backend's default
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelPreset {
    /// Backend default: full structure learning.
    #[default]
    Standard,
    /// Single view, single category: independent columns.
    NaiveBayes,
    /// Single view with row clustering.
    CrpMixture,
}

impl ModelPreset {
    /// Resolve a user-supplied preset name; anything unrecognized is the
    /// standard configuration.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "naive bayes" => ModelPreset::NaiveBayes,
            "crp mixture" => ModelPreset::CrpMixture,
            _ => ModelPreset::Standard,
        }
    }

    /// The fixed configuration this preset names.
    pub fn config(&self) -> ModelConfig {
        match self {
            ModelPreset::Standard => ModelConfig {
                kernel_list: Vec::new(),
                initialization: InitStrategy::FromThePrior,
                row_initialization: InitStrategy::FromThePrior,
            },
            ModelPreset::NaiveBayes => ModelConfig {
                kernel_list: vec!["column_hyperparameters".to_string()],
                initialization: InitStrategy::Together,
                row_initialization: InitStrategy::Together,
            },
            ModelPreset::CrpMixture => ModelConfig {
                kernel_list: vec![
                    "column_hyperparameters".to_string(),
                    "row_partition_hyperparameters".to_string(),
                    "row_partition_assignments".to_string(),
                ],
                initialization: InitStrategy::Together,
                row_initialization: InitStrategy::FromThePrior,
            },
        }
    }
}

/// How a caller names the configuration for `initialize_models`.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSpec {
    /// A named preset.
    Preset(ModelPreset),
    /// An explicit configuration.
    Custom(ModelConfig),
}

impl ModelSpec {
    /// Resolve to a concrete configuration.
    pub fn resolve(spec: Option<&ModelSpec>) -> ModelConfig {
        match spec {
            Some(ModelSpec::Preset(preset)) => preset.config(),
            Some(ModelSpec::Custom(config)) => config.clone(),
            None => ModelPreset::Standard.config(),
        }
    }
}

/// Opaque latent-state pair owned by the backend.
///
/// The column state carries the column partition and its metadata, the row
/// state carries per-view row assignments. The core never inspects either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatentState {
    pub column_state: Json,
    pub row_state: Json,
}

/// Per-iteration diagnostic series for one model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub logscore: Vec<f64>,
    pub num_views: Vec<f64>,
    pub column_crp_alpha: Vec<f64>,
}

impl Diagnostics {
    /// Append one backend analyze round's series.
    pub fn extend(&mut self, other: &Diagnostics) {
        self.logscore.extend_from_slice(&other.logscore);
        self.num_views.extend_from_slice(&other.num_views);
        self.column_crp_alpha
            .extend_from_slice(&other.column_crp_alpha);
    }
}

/// One inference chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Latent state, mutated only by `analyze`.
    pub latent: LatentState,
    /// Cumulative completed iterations.
    pub iterations: u64,
    /// Per-iteration diagnostic series.
    #[serde(default)]
    pub diagnostics: Diagnostics,
    /// Configuration the model was created with; absent for legacy loads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ModelConfig>,
}

impl Model {
    /// A freshly initialized model: zero iterations, empty diagnostics.
    pub fn new(latent: LatentState, config: ModelConfig) -> Self {
        Self {
            latent,
            iterations: 0,
            diagnostics: Diagnostics::default(),
            config: Some(config),
        }
    }
}

/// Which models an ensemble-level operation selects.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ModelSelection {
    /// Every model in the ensemble.
    #[default]
    All,
    /// Specific model ids.
    Ids(Vec<u64>),
}
