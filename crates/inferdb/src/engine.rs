//! The coordinator: one entry point per verb, no model or table state of
//! its own.
//!
//! Every call borrows one table snapshot and one ensemble snapshot from the
//! catalog, runs to completion against them, and returns a [`QueryResult`].
//! Ensemble writes go through the [`EnsembleManager`]; everything else is
//! read-only against the catalog except named-list and derived-table
//! creation.

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::backend::{BackendClient, InferenceBackend, LocalClient, RemoteClient};
use crate::catalog::{Catalog, MemoryCatalog};
use crate::error::{EngineError, Result};
use crate::input;
use crate::models::{
    AnalyzeReport, EnsembleManager, ModelArchive, ModelPreset, ModelSelection, ModelSpec,
    SavedModels,
};
use crate::parse;
use crate::query::{
    estimate, pipeline, shaping, simulate, EvalContext, Given, ImputeSpec, OutputShape,
    PairFunction, SelectPlan,
};
use crate::schema::{Codebook, ColumnType};
use crate::table::Btable;
use crate::value::Value;

/// Backend draws per imputed cell when `infer` gets no explicit count.
pub const DEFAULT_INFER_SAMPLES: usize = 50;

/// Tabular result of one coordinator call.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Output column labels.
    pub columns: Vec<String>,
    /// Result rows, one cell per label.
    pub data: Vec<Vec<Value>>,
    /// Status text for verbs that produce no rows (or rows plus a note).
    pub message: Option<String>,
}

impl QueryResult {
    fn rows(columns: Vec<String>, data: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            data,
            message: None,
        }
    }

    fn message(text: impl Into<String>) -> Self {
        Self {
            columns: Vec::new(),
            data: Vec::new(),
            message: Some(text.into()),
        }
    }
}

/// A select query: functions plus optional filtering, ordering, limiting,
/// reshaping, and a derived-table name.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectRequest<'a> {
    /// Comma-separated function list; `*` is the active projection.
    pub columns: &'a str,
    /// Raw-column where clause.
    pub conditions: Option<&'a str>,
    /// Order-by clause.
    pub order_by: Option<&'a str>,
    pub limit: Option<usize>,
    pub shape: OutputShape,
    /// Save the (unshaped) result as a new btable with this name.
    pub into: Option<&'a str>,
}

/// An infer query: a select plus confidence-gated imputation.
#[derive(Debug, Clone, Copy, Default)]
pub struct InferRequest<'a> {
    pub columns: &'a str,
    pub conditions: Option<&'a str>,
    pub order_by: Option<&'a str>,
    pub limit: Option<usize>,
    /// Minimum imputation confidence; below it the missing marker stays.
    pub confidence: f64,
    /// Backend draws per imputed cell; defaults to [`DEFAULT_INFER_SAMPLES`].
    pub numsamples: Option<usize>,
    pub shape: OutputShape,
    pub into: Option<&'a str>,
}

/// A simulate query: columns to draw, optional givens, and a draw count.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulateRequest<'a> {
    pub columns: &'a str,
    /// `column = value` terms joined by `and`.
    pub givens: Option<&'a str>,
    pub numpredictions: usize,
    pub shape: OutputShape,
    pub into: Option<&'a str>,
}

/// Query-execution and model-lifecycle coordinator.
pub struct Engine {
    catalog: Arc<dyn Catalog>,
    client: Arc<dyn BackendClient>,
    ensembles: EnsembleManager,
}

impl Engine {
    /// Create a coordinator over an explicit catalog and backend client.
    pub fn new(catalog: Arc<dyn Catalog>, client: Arc<dyn BackendClient>) -> Self {
        let ensembles = EnsembleManager::new(Arc::clone(&catalog), Arc::clone(&client));
        Self {
            catalog,
            client,
            ensembles,
        }
    }

    /// An in-memory coordinator over an in-process backend.
    pub fn in_memory(backend: Arc<dyn InferenceBackend>) -> Self {
        Self::new(
            Arc::new(MemoryCatalog::new()),
            Arc::new(LocalClient::new(backend)),
        )
    }

    /// An in-memory coordinator over a remote backend at `host:port`.
    pub fn remote(host: &str, port: u16) -> Result<Self> {
        Ok(Self::new(
            Arc::new(MemoryCatalog::new()),
            Arc::new(RemoteClient::new(host, port)?),
        ))
    }

    // ------------------------------------------------------------------
    // Btable lifecycle

    /// Create a btable from a delimited file, auto-detecting the delimiter
    /// and guessing undeclared column types from the data.
    pub fn create_btable(
        &self,
        name: &str,
        path: impl AsRef<Path>,
        declared: Option<&IndexMap<String, ColumnType>>,
    ) -> Result<QueryResult> {
        let (header, rows) = input::read_delimited(path)?;
        self.create_btable_from_rows(name, &header, &rows, declared)
    }

    /// Create a btable from an in-memory header and raw string rows.
    pub fn create_btable_from_rows(
        &self,
        name: &str,
        header: &[String],
        rows: &[Vec<String>],
        declared: Option<&IndexMap<String, ColumnType>>,
    ) -> Result<QueryResult> {
        let name = name.to_ascii_lowercase();
        let table = input::build_btable(header, rows, declared)?;
        let row_count = table.row_count();
        let column_count = table.schema.columns.len();
        self.catalog.create_table(&name, table)?;
        Ok(QueryResult::message(format!(
            "Created btable '{}' with {} rows and {} columns",
            name, row_count, column_count
        )))
    }

    /// Delete a btable, its ensemble, and everything scoped to it.
    pub fn drop_btable(&self, name: &str) -> Result<QueryResult> {
        self.catalog.drop_table(name)?;
        Ok(QueryResult::message(format!("Dropped btable '{}'", name)))
    }

    /// Names of all btables, in creation order.
    pub fn list_btables(&self) -> QueryResult {
        let data = self
            .catalog
            .list_tables()
            .into_iter()
            .map(|name| vec![Value::Text(name)])
            .collect();
        QueryResult::rows(vec!["btable".to_string()], data)
    }

    /// Per-column name, type, and label.
    pub fn show_schema(&self, name: &str) -> Result<QueryResult> {
        let table = self.catalog.get_table(name)?;
        let labels = self.catalog.get_column_labels(name)?;
        let data = table
            .schema
            .columns
            .iter()
            .map(|column| {
                vec![
                    Value::Text(column.name.clone()),
                    Value::Text(column.column_type.to_string()),
                    labels
                        .get(&column.name)
                        .map(|l| Value::Text(l.clone()))
                        .unwrap_or(Value::Missing),
                ]
            })
            .collect();
        Ok(QueryResult::rows(
            vec!["column".to_string(), "type".to_string(), "label".to_string()],
            data,
        ))
    }

    /// Change column types. Fails while models exist, since the coded
    /// projection the ensemble was trained on would no longer match.
    pub fn update_schema(
        &self,
        name: &str,
        changes: &IndexMap<String, ColumnType>,
    ) -> Result<QueryResult> {
        if !self.catalog.get_models(name)?.is_empty() {
            return Err(EngineError::Input(format!(
                "Btable '{}' has models; drop them before updating the schema",
                name
            )));
        }

        let mut table = self.catalog.get_table(name)?;
        for (column_name, &column_type) in changes {
            let column_name = column_name.to_ascii_lowercase();
            table.schema.require_column(name, &column_name)?;
            let position = table
                .schema
                .columns
                .iter()
                .position(|c| c.name == column_name)
                .ok_or_else(|| EngineError::NoSuchColumn {
                    table: name.to_string(),
                    column: column_name.clone(),
                })?;
            let column = &mut table.schema.columns[position];
            column.column_type = column_type;
        }
        // Codebooks follow the new types.
        let rows = table.rows.clone();
        for column in &mut table.schema.columns {
            column.codebook = match column.column_type {
                ColumnType::Categorical => Some(Codebook::from_values(
                    rows.iter().map(|row| &row[column.position]),
                )),
                _ => None,
            };
        }
        self.catalog.replace_table(name, table)?;
        Ok(QueryResult::message(format!(
            "Updated schema for btable '{}'",
            name
        )))
    }

    /// Attach human-readable labels to columns.
    pub fn label_columns(&self, name: &str, labels: &[(String, String)]) -> Result<QueryResult> {
        let table = self.catalog.get_table(name)?;
        for (column, label) in labels {
            let column = column.to_ascii_lowercase();
            table.schema.require_column(name, &column)?;
            self.catalog.add_column_label(name, &column, label)?;
        }
        Ok(QueryResult::message(format!(
            "Labeled {} columns in btable '{}'",
            labels.len(),
            name
        )))
    }

    /// All column labels for a table.
    pub fn show_labels(&self, name: &str) -> Result<QueryResult> {
        let labels = self.catalog.get_column_labels(name)?;
        let data = labels
            .into_iter()
            .map(|(column, label)| vec![Value::Text(column), Value::Text(label)])
            .collect();
        Ok(QueryResult::rows(
            vec!["column".to_string(), "label".to_string()],
            data,
        ))
    }

    /// Set free-form key/value metadata on a table.
    pub fn update_metadata(&self, name: &str, entries: &[(String, String)]) -> Result<QueryResult> {
        for (key, value) in entries {
            self.catalog.add_user_metadata(name, key, value)?;
        }
        Ok(QueryResult::message(format!(
            "Updated {} metadata entries for btable '{}'",
            entries.len(),
            name
        )))
    }

    /// All metadata key/value pairs for a table.
    pub fn show_metadata(&self, name: &str) -> Result<QueryResult> {
        let metadata = self.catalog.get_user_metadata(name)?;
        let data = metadata
            .into_iter()
            .map(|(key, value)| vec![Value::Text(key), Value::Text(value)])
            .collect();
        Ok(QueryResult::rows(
            vec!["key".to_string(), "value".to_string()],
            data,
        ))
    }

    // ------------------------------------------------------------------
    // Model lifecycle

    /// Initialize `n` fresh models, optionally under a named preset.
    /// Unrecognized preset names fall back to the standard configuration.
    pub fn initialize_models(
        &self,
        name: &str,
        n: usize,
        preset: Option<&str>,
    ) -> Result<QueryResult> {
        let spec = preset.map(|p| ModelSpec::Preset(ModelPreset::from_name(p)));
        let ids = self.ensembles.initialize_models(name, n, spec.as_ref())?;
        Ok(QueryResult::message(format!(
            "Initialized {} models for btable '{}'",
            ids.len(),
            name
        )))
    }

    /// Refine the selected models. Returns per-model completed iteration
    /// counts; a sibling failure surfaces after completed models persist.
    ///
    /// `kernels` overrides the ensemble configuration's kernel list for this
    /// call only; model state keeps its configured kernels afterwards.
    pub fn analyze(
        &self,
        name: &str,
        selection: &ModelSelection,
        iterations: Option<u64>,
        seconds: Option<u64>,
        kernels: Option<&[String]>,
    ) -> Result<QueryResult> {
        let AnalyzeReport { updated } =
            self.ensembles.analyze(name, selection, iterations, seconds, kernels)?;
        let count = updated.len();
        let data = updated
            .into_iter()
            .map(|(id, completed)| {
                vec![Value::Number(id as f64), Value::Number(completed as f64)]
            })
            .collect();
        let mut result = QueryResult::rows(
            vec!["model_id".to_string(), "iterations".to_string()],
            data,
        );
        result.message = Some(format!("Analyzed {} models of btable '{}'", count, name));
        Ok(result)
    }

    /// Drop the selected models.
    pub fn drop_models(&self, name: &str, selection: &ModelSelection) -> Result<QueryResult> {
        self.ensembles.drop_models(name, selection)?;
        Ok(QueryResult::message(format!(
            "Dropped models from btable '{}'",
            name
        )))
    }

    /// Export the ensemble for the caller to persist.
    pub fn save_models(&self, name: &str) -> Result<SavedModels> {
        self.ensembles.save_models(name)
    }

    /// Export the ensemble as JSON to a file.
    pub fn save_models_to(&self, name: &str, path: impl AsRef<Path>) -> Result<QueryResult> {
        let saved = self.ensembles.save_models(name)?;
        let count = saved.models.len();
        let file = std::fs::File::create(path.as_ref()).map_err(|e| {
            EngineError::Input(format!(
                "Failed to create '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        serde_json::to_writer(file, &saved)?;
        Ok(QueryResult::message(format!(
            "Saved {} models of btable '{}'",
            count, name
        )))
    }

    /// Import previously saved models as new models.
    pub fn load_models(&self, name: &str, archive: ModelArchive) -> Result<QueryResult> {
        let ids = self.ensembles.load_models(name, archive)?;
        Ok(QueryResult::message(format!(
            "Loaded {} models into btable '{}'",
            ids.len(),
            name
        )))
    }

    /// Import models from a JSON file in either save format.
    pub fn load_models_from(&self, name: &str, path: impl AsRef<Path>) -> Result<QueryResult> {
        let file = std::fs::File::open(path.as_ref()).map_err(|e| {
            EngineError::Input(format!(
                "Failed to open '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let archive: ModelArchive = serde_json::from_reader(file)?;
        self.load_models(name, archive)
    }

    /// Per-model id, cumulative iteration count, and configuration summary.
    pub fn show_models(&self, name: &str) -> Result<QueryResult> {
        let models = self.catalog.get_models(name)?;
        let data = models
            .iter()
            .map(|(&id, model)| {
                let config = match &model.config {
                    None => Value::Missing,
                    Some(config) if config.kernel_list.is_empty() => {
                        Value::Text("default".to_string())
                    }
                    Some(config) => Value::Text(config.kernel_list.join(",")),
                };
                vec![
                    Value::Number(id as f64),
                    Value::Number(model.iterations as f64),
                    config,
                ]
            })
            .collect();
        Ok(QueryResult::rows(
            vec![
                "model_id".to_string(),
                "iterations".to_string(),
                "config".to_string(),
            ],
            data,
        ))
    }

    /// One model's per-iteration diagnostic series.
    pub fn show_diagnostics(&self, name: &str, model_id: u64) -> Result<QueryResult> {
        let models = self.catalog.get_models(name)?;
        let model = models.get(&model_id).ok_or_else(|| {
            EngineError::Backend(format!(
                "Model {} does not exist for btable '{}'",
                model_id, name
            ))
        })?;
        let diagnostics = &model.diagnostics;
        let data = (0..diagnostics.logscore.len())
            .map(|i| {
                vec![
                    Value::Number(i as f64 + 1.0),
                    Value::Number(diagnostics.logscore[i]),
                    diagnostics
                        .num_views
                        .get(i)
                        .map(|&v| Value::Number(v))
                        .unwrap_or(Value::Missing),
                    diagnostics
                        .column_crp_alpha
                        .get(i)
                        .map(|&v| Value::Number(v))
                        .unwrap_or(Value::Missing),
                ]
            })
            .collect();
        Ok(QueryResult::rows(
            vec![
                "iteration".to_string(),
                "logscore".to_string(),
                "num_views".to_string(),
                "column_crp_alpha".to_string(),
            ],
            data,
        ))
    }

    // ------------------------------------------------------------------
    // Queries

    /// Run a select: filter, order, compute, limit.
    pub fn select(&self, name: &str, request: &SelectRequest<'_>) -> Result<QueryResult> {
        self.run_select(name, request, None)
    }

    /// Run an infer: a select whose missing requested cells are imputed
    /// from the ensemble when the backend is confident enough.
    pub fn infer(&self, name: &str, request: &InferRequest<'_>) -> Result<QueryResult> {
        let impute = ImputeSpec {
            confidence: request.confidence,
            numsamples: request.numsamples.unwrap_or(DEFAULT_INFER_SAMPLES),
        };
        let select = SelectRequest {
            columns: request.columns,
            conditions: request.conditions,
            order_by: request.order_by,
            limit: request.limit,
            shape: request.shape,
            into: request.into,
        };
        self.run_select(name, &select, Some(impute))
    }

    fn run_select(
        &self,
        name: &str,
        request: &SelectRequest<'_>,
        impute: Option<ImputeSpec>,
    ) -> Result<QueryResult> {
        let table = self.catalog.get_table(name)?;
        let latents = self.ensembles.latent_snapshot(name)?;
        let column_lists = self.catalog.get_column_lists(name)?;

        let functions = parse::parse_functions(request.columns, name, &table.schema, &column_lists)?;
        let conditions = match request.conditions {
            Some(text) => parse::parse_where_clause(text, name, &table.schema)?,
            None => Vec::new(),
        };
        let order_by = match request.order_by {
            Some(text) => parse::parse_order_by_clause(text, name, &table.schema)?,
            None => Vec::new(),
        };
        let plan = SelectPlan {
            functions,
            conditions,
            order_by,
            limit: request.limit,
            impute,
        };

        let ctx = EvalContext {
            client: self.client.as_ref(),
            table: &table,
            latents: &latents,
        };
        let (labels, data) = pipeline::execute(&ctx, name, &plan)?;
        self.finish(&table, labels, data, request.shape, request.into)
    }

    /// Draw synthetic rows from the ensemble, optionally conditioned on
    /// fixed `column = value` givens.
    pub fn simulate(&self, name: &str, request: &SimulateRequest<'_>) -> Result<QueryResult> {
        let table = self.catalog.get_table(name)?;
        let latents = self.ensembles.latent_snapshot(name)?;
        let column_lists = self.catalog.get_column_lists(name)?;

        let functions = parse::parse_functions(request.columns, name, &table.schema, &column_lists)?;
        let givens = match request.givens {
            Some(text) => parse_givens(text, name, &table)?,
            None => Vec::new(),
        };

        let ctx = EvalContext {
            client: self.client.as_ref(),
            table: &table,
            latents: &latents,
        };
        let (labels, data) =
            simulate::execute(&ctx, name, &functions, &givens, request.numpredictions)?;
        self.finish(&table, labels, data, request.shape, request.into)
    }

    /// Apply the derived-table and reshaping stages to a computed result.
    fn finish(
        &self,
        source: &Btable,
        labels: Vec<String>,
        data: Vec<Vec<Value>>,
        shape: OutputShape,
        into: Option<&str>,
    ) -> Result<QueryResult> {
        let mut message = None;
        if let Some(into) = into {
            let created = self.store_result(source, into, &labels, &data)?;
            message = Some(created);
        }
        // Frequency and histogram shapes reduce the first queried column,
        // not the row_id bookkeeping column.
        let (labels, data) = match shape {
            OutputShape::Freq | OutputShape::Hist
                if labels.first().is_some_and(|l| l == "row_id") =>
            {
                (
                    labels[1..].to_vec(),
                    data.into_iter().map(|row| row[1..].to_vec()).collect(),
                )
            }
            _ => (labels, data),
        };
        let (labels, data) = shaping::apply(shape, labels, data);
        let mut result = QueryResult::rows(labels, data);
        result.message = message;
        Ok(result)
    }

    /// Persist a result set as a new btable. The `row_id` column is dropped,
    /// and columns matching the source schema keep their declared types.
    /// Fails on a name collision.
    fn store_result(
        &self,
        source: &Btable,
        name: &str,
        labels: &[String],
        data: &[Vec<Value>],
    ) -> Result<String> {
        let name = name.to_ascii_lowercase();
        let kept: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, label)| label.as_str() != "row_id")
            .map(|(i, _)| i)
            .collect();

        let header: Vec<String> = kept.iter().map(|&i| labels[i].clone()).collect();
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|row| kept.iter().map(|&i| row[i].to_string()).collect())
            .collect();

        let mut declared = IndexMap::new();
        for label in &header {
            if let Some(column) = source.schema.get_column(&label.to_ascii_lowercase()) {
                declared.insert(label.to_ascii_lowercase(), column.column_type);
            }
        }

        let table = input::build_btable(&header, &rows, Some(&declared))?;
        let row_count = table.row_count();
        self.catalog.create_table(&name, table)?;
        Ok(format!(
            "Created btable '{}' with {} rows",
            name, row_count
        ))
    }

    // ------------------------------------------------------------------
    // Relational analysis

    /// Rank modeled columns by column-level statistics, optionally saving
    /// the ranked names as a column list.
    pub fn estimate_columns(
        &self,
        name: &str,
        conditions: Option<&str>,
        order_by: Option<&str>,
        limit: Option<usize>,
        into: Option<&str>,
    ) -> Result<QueryResult> {
        let table = self.catalog.get_table(name)?;
        let latents = self.ensembles.latent_snapshot(name)?;

        let conditions = match conditions {
            Some(text) => parse::parse_column_where_clause(text, name, &table.schema)?,
            None => Vec::new(),
        };
        let order_by = match order_by {
            Some(text) => parse::parse_column_order_by_clause(text, name, &table.schema)?,
            None => Vec::new(),
        };

        let ctx = EvalContext {
            client: self.client.as_ref(),
            table: &table,
            latents: &latents,
        };
        let ranked = estimate::estimate_columns(&ctx, name, &conditions, &order_by, limit)?;

        let mut message = None;
        if let Some(into) = into {
            let list = into.to_ascii_lowercase();
            let names: Vec<String> = ranked.iter().map(|r| r.name.clone()).collect();
            let count = names.len();
            self.catalog.add_column_list(name, &list, names)?;
            message = Some(format!("Saved {} columns as list '{}'", count, list));
        }

        let mut labels = vec!["column".to_string()];
        labels.extend(order_by.iter().map(|key| key.label.clone()));
        let data = ranked
            .into_iter()
            .map(|column| {
                let mut row = vec![Value::Text(column.name)];
                row.extend(column.key_values.into_iter().map(Value::Number));
                row
            })
            .collect();
        let mut result = QueryResult::rows(labels, data);
        result.message = message;
        Ok(result)
    }

    /// Pairwise matrix of a relationship function over modeled columns,
    /// optionally restricted to a stored column list (or an inline
    /// comma-separated set) and optionally clustered at a threshold.
    ///
    /// Clusters persist as column lists named `{clusters}_{i}`.
    pub fn estimate_pairwise(
        &self,
        name: &str,
        function: &str,
        columns: Option<&str>,
        clusters: Option<(&str, f64)>,
    ) -> Result<QueryResult> {
        let table = self.catalog.get_table(name)?;
        let latents = self.ensembles.latent_snapshot(name)?;
        if latents.is_empty() {
            return Err(EngineError::NoModels(name.to_string()));
        }
        let function = PairFunction::parse(function)?;

        let column_names: Vec<String> = match columns {
            Some(text) => self.resolve_column_set(name, text, &table)?,
            None => table
                .schema
                .modeled_columns()
                .map(|c| c.name.clone())
                .collect(),
        };
        let mut indices = Vec::with_capacity(column_names.len());
        for column_name in &column_names {
            table.schema.require_column(name, column_name)?;
            let modeled = table.schema.modeled_index(column_name).ok_or_else(|| {
                EngineError::Parse(format!(
                    "Column '{}' is not modeled (key or ignored) and cannot be used here",
                    column_name
                ))
            })?;
            indices.push(modeled);
        }

        let ctx = EvalContext {
            client: self.client.as_ref(),
            table: &table,
            latents: &latents,
        };
        let matrix = estimate::pairwise_columns(&ctx, &indices, function)?;

        let mut message = None;
        if let Some((clusters_name, threshold)) = clusters {
            let components = estimate::threshold_components(&matrix, threshold);
            let count = components.len();
            for (i, component) in components.into_iter().enumerate() {
                let list = format!("{}_{}", clusters_name.to_ascii_lowercase(), i);
                let members = component
                    .into_iter()
                    .map(|idx| column_names[idx].clone())
                    .collect();
                self.catalog.add_column_list(name, &list, members)?;
            }
            message = Some(format!(
                "Saved {} clusters as column lists '{}_0'..'{}_{}'",
                count,
                clusters_name.to_ascii_lowercase(),
                clusters_name.to_ascii_lowercase(),
                count.saturating_sub(1)
            ));
        }

        let mut result = QueryResult::rows(
            std::iter::once("column".to_string())
                .chain(column_names.iter().cloned())
                .collect(),
            matrix
                .into_iter()
                .zip(column_names.iter())
                .map(|(row, column_name)| {
                    std::iter::once(Value::Text(column_name.clone()))
                        .chain(row.into_iter().map(Value::Number))
                        .collect()
                })
                .collect(),
        );
        result.message = message;
        Ok(result)
    }

    /// Pairwise matrix over rows, optionally restricted to a stored row list
    /// and optionally clustered at a threshold.
    ///
    /// Similarity is the only row-pairwise function. Clusters persist as row
    /// lists named `{clusters}_{i}`.
    pub fn estimate_pairwise_row(
        &self,
        name: &str,
        function: &str,
        rows: Option<&str>,
        clusters: Option<(&str, f64)>,
    ) -> Result<QueryResult> {
        if !function.trim().eq_ignore_ascii_case("similarity") {
            return Err(EngineError::Parse(format!(
                "Unknown row-pairwise function '{}'",
                function
            )));
        }
        let table = self.catalog.get_table(name)?;
        let latents = self.ensembles.latent_snapshot(name)?;
        if latents.is_empty() {
            return Err(EngineError::NoModels(name.to_string()));
        }

        let row_indices: Vec<usize> = match rows {
            Some(list) => self.catalog.get_row_list(name, &list.to_ascii_lowercase())?,
            None => (0..table.row_count()).collect(),
        };
        for &row in &row_indices {
            if row >= table.row_count() {
                return Err(EngineError::Input(format!(
                    "Row {} is out of range for btable '{}'",
                    row, name
                )));
            }
        }

        let ctx = EvalContext {
            client: self.client.as_ref(),
            table: &table,
            latents: &latents,
        };
        let matrix = estimate::pairwise_rows(&ctx, &row_indices)?;

        let mut message = None;
        if let Some((clusters_name, threshold)) = clusters {
            let components = estimate::threshold_components(&matrix, threshold);
            let count = components.len();
            for (i, component) in components.into_iter().enumerate() {
                let list = format!("{}_{}", clusters_name.to_ascii_lowercase(), i);
                let members = component.into_iter().map(|idx| row_indices[idx]).collect();
                self.catalog.add_row_list(name, &list, members)?;
            }
            message = Some(format!("Saved {} clusters as row lists", count));
        }

        // Rows label by their key value when a key column exists.
        let key = table.schema.key_column().map(|c| c.position);
        let row_label = |row: usize| match key {
            Some(position) => table.value(row, position).to_string(),
            None => row.to_string(),
        };

        let mut result = QueryResult::rows(
            std::iter::once("row".to_string())
                .chain(row_indices.iter().map(|&row| row_label(row)))
                .collect(),
            matrix
                .into_iter()
                .zip(row_indices.iter())
                .map(|(matrix_row, &row)| {
                    std::iter::once(Value::Text(row_label(row)))
                        .chain(matrix_row.into_iter().map(Value::Number))
                        .collect()
                })
                .collect(),
        );
        result.message = message;
        Ok(result)
    }

    /// Resolve an inline column set: a stored list name, or comma-separated
    /// column names.
    fn resolve_column_set(&self, name: &str, text: &str, table: &Btable) -> Result<Vec<String>> {
        let text = text.trim();
        let lists = self.catalog.get_column_lists(name)?;
        if !text.contains(',') {
            if let Some(members) = lists.get(&text.to_ascii_lowercase()) {
                if members.is_empty() {
                    return Err(EngineError::EmptyList {
                        kind: "Column",
                        name: text.to_ascii_lowercase(),
                    });
                }
                return Ok(members.clone());
            }
        }
        text.split(',')
            .map(|item| {
                let column = item.trim().to_ascii_lowercase();
                table.schema.require_column(name, &column)?;
                Ok(column)
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Introspection

    /// Names of a stored column list, or of every active column.
    pub fn show_columns(&self, name: &str, list: Option<&str>) -> Result<QueryResult> {
        let columns: Vec<String> = match list {
            Some(list) => self
                .catalog
                .get_column_list(name, &list.to_ascii_lowercase())?,
            None => {
                let table = self.catalog.get_table(name)?;
                table
                    .schema
                    .active_columns()
                    .map(|c| c.name.clone())
                    .collect()
            }
        };
        let data = columns.into_iter().map(|c| vec![Value::Text(c)]).collect();
        Ok(QueryResult::rows(vec!["column".to_string()], data))
    }

    /// Stored column lists and their sizes.
    pub fn show_column_lists(&self, name: &str) -> Result<QueryResult> {
        let lists = self.catalog.get_column_lists(name)?;
        let data = lists
            .into_iter()
            .map(|(list, members)| {
                vec![Value::Text(list), Value::Number(members.len() as f64)]
            })
            .collect();
        Ok(QueryResult::rows(
            vec!["list".to_string(), "columns".to_string()],
            data,
        ))
    }

    /// Stored row lists and their sizes.
    pub fn show_row_lists(&self, name: &str) -> Result<QueryResult> {
        let lists = self.catalog.get_row_lists(name)?;
        let data = lists
            .into_iter()
            .map(|(list, members)| {
                vec![Value::Text(list), Value::Number(members.len() as f64)]
            })
            .collect();
        Ok(QueryResult::rows(
            vec!["list".to_string(), "rows".to_string()],
            data,
        ))
    }
}

/// Parse simulate givens: `column = value` terms joined by `and`. Only
/// equality is meaningful as a conditioning value.
fn parse_givens(text: &str, name: &str, table: &Btable) -> Result<Vec<Given>> {
    let predicates = parse::parse_where_clause(text, name, &table.schema)?;
    predicates
        .into_iter()
        .map(|predicate| {
            if predicate.op != crate::query::CompareOp::Eq {
                return Err(EngineError::Parse(
                    "simulate givens must be 'column = value' terms".to_string(),
                ));
            }
            Ok(Given {
                column: table.schema.columns[predicate.position].name.clone(),
                value: predicate.value,
            })
        })
        .collect()
}
