//! InferDB: a query-execution and model-lifecycle coordinator for tabular
//! probabilistic inference.
//!
//! InferDB registers tabular datasets (btables), grows ensembles of
//! independent inference models over them through a pluggable backend, and
//! answers SQL-like queries whose functions (similarity, typicality,
//! imputation, simulation, dependence) are computed from the ensemble.
//!
//! # Core Principles
//!
//! - **Opaque latent state**: model internals belong to the backend; the
//!   coordinator stores and forwards them, never inspects them
//! - **Snapshot execution**: every query runs against one consistent table
//!   and ensemble snapshot
//! - **Failure isolation**: per-model analyze failures never discard
//!   sibling models' completed work
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use inferdb::{Engine, MockBackend, SelectRequest};
//!
//! let engine = Engine::in_memory(Arc::new(MockBackend::new()));
//! engine.create_btable("people", "people.csv", None).unwrap();
//! engine.initialize_models("people", 4, None).unwrap();
//! engine.analyze("people", &Default::default(), Some(100), None, None).unwrap();
//!
//! let result = engine
//!     .select("people", &SelectRequest { columns: "*", limit: Some(10), ..Default::default() })
//!     .unwrap();
//! println!("{} rows", result.data.len());
//! ```

pub mod backend;
pub mod catalog;
pub mod error;
pub mod input;
pub mod models;
pub mod parse;
pub mod query;
pub mod schema;
pub mod table;
pub mod value;

mod engine;

pub use crate::engine::{
    DEFAULT_INFER_SAMPLES, Engine, InferRequest, QueryResult, SelectRequest, SimulateRequest,
};
pub use backend::{BackendClient, InferenceBackend, LocalClient, MockBackend, RemoteClient};
pub use catalog::{Catalog, MemoryCatalog};
pub use error::{EngineError, Result};
pub use models::{
    Model, ModelArchive, ModelConfig, ModelPreset, ModelSelection, ModelSpec, SavedModels,
};
pub use query::OutputShape;
pub use schema::{ColumnSchema, ColumnType, TableSchema};
pub use table::Btable;
pub use value::Value;
