//! Error types for the inferdb library.

use thiserror::Error;

/// Main error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The referenced btable does not exist.
    #[error("No btable with name '{0}'")]
    NoSuchTable(String),

    /// A create or INTO target collides with an existing btable.
    #[error("Btable with name '{0}' already exists")]
    TableAlreadyExists(String),

    /// The operation requires a non-empty model ensemble.
    #[error("Btable '{0}' has no models. Create some with initialize_models first")]
    NoModels(String),

    /// New models were requested with a configuration incompatible with the
    /// existing ensemble's.
    #[error("Model config must match the existing ensemble config: {existing}")]
    ConfigMismatch { existing: String },

    /// A referenced column name is not part of the table's schema.
    #[error("Btable '{table}' has no column '{column}'")]
    NoSuchColumn { table: String, column: String },

    /// A named row or column list was referenced but has zero members.
    #[error("{kind} list '{name}' has no members")]
    EmptyList { kind: &'static str, name: String },

    /// The inference backend failed or was unreachable.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Clause or function text could not be resolved against the schema.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Error reading tabular input data.
    #[error("Input error: {0}")]
    Input(String),

    /// Error from the CSV library.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
