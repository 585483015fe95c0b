//! The catalog: sole owner of tables, ensembles, and named lists.
//!
//! The coordinator borrows snapshots from the catalog for the duration of one
//! call; it never owns table or model state. `MemoryCatalog` is the bundled
//! thread-safe implementation.

mod memory;

pub use memory::MemoryCatalog;

use indexmap::IndexMap;

use crate::error::Result;
use crate::models::{Model, ModelConfig};
use crate::table::Btable;

/// Storage contract the coordinator requires.
///
/// Every table-scoped call fails with `NoSuchTable` when the table is absent.
/// Named list writes are last-write-wins; table creation is hard-fail on
/// collision. Model updates are applied atomically per model id, so a
/// snapshot read never sees a half-updated model.
pub trait Catalog: Send + Sync {
    /// Whether a btable with this name exists.
    fn table_exists(&self, name: &str) -> bool;

    /// Register a new btable; fails with `TableAlreadyExists` on collision.
    fn create_table(&self, name: &str, table: Btable) -> Result<()>;

    /// Delete a btable and everything scoped to it.
    fn drop_table(&self, name: &str) -> Result<()>;

    /// Names of all btables, in creation order.
    fn list_tables(&self) -> Vec<String>;

    /// Snapshot of a btable's schema and rows.
    fn get_table(&self, name: &str) -> Result<Btable>;

    /// Replace a btable's schema and rows in place (schema updates only;
    /// callers enforce the no-models precondition).
    fn replace_table(&self, name: &str, table: Btable) -> Result<()>;

    /// Snapshot of the full ensemble, ordered by model id.
    fn get_models(&self, name: &str) -> Result<IndexMap<u64, Model>>;

    /// Append models to the ensemble, assigning the next free ids.
    /// Returns the assigned ids.
    fn add_models(&self, name: &str, models: Vec<Model>) -> Result<Vec<u64>>;

    /// Replace one model's state as a single atomic unit.
    fn update_model(&self, name: &str, id: u64, model: Model) -> Result<()>;

    /// Drop the given model ids, or every model when `ids` is `None`.
    fn drop_models(&self, name: &str, ids: Option<&[u64]>) -> Result<()>;

    /// The shared configuration of the current ensemble, if any model
    /// carries one.
    fn model_config(&self, name: &str) -> Result<Option<ModelConfig>> {
        Ok(self
            .get_models(name)?
            .values()
            .find_map(|m| m.config.clone()))
    }

    /// All named column lists for a table.
    fn get_column_lists(&self, name: &str) -> Result<IndexMap<String, Vec<String>>>;

    /// One named column list.
    fn get_column_list(&self, name: &str, list: &str) -> Result<Vec<String>>;

    /// Create or overwrite a named column list.
    fn add_column_list(&self, name: &str, list: &str, columns: Vec<String>) -> Result<()>;

    /// All named row lists for a table.
    fn get_row_lists(&self, name: &str) -> Result<IndexMap<String, Vec<usize>>>;

    /// One named row list.
    fn get_row_list(&self, name: &str, list: &str) -> Result<Vec<usize>>;

    /// Create or overwrite a named row list.
    fn add_row_list(&self, name: &str, list: &str, rows: Vec<usize>) -> Result<()>;

    /// All column labels for a table.
    fn get_column_labels(&self, name: &str) -> Result<IndexMap<String, String>>;

    /// Set one column label, replacing any existing label.
    fn add_column_label(&self, name: &str, column: &str, label: &str) -> Result<()>;

    /// All user metadata key/value pairs for a table.
    fn get_user_metadata(&self, name: &str) -> Result<IndexMap<String, String>>;

    /// Set one user metadata value, replacing any existing value.
    fn add_user_metadata(&self, name: &str, key: &str, value: &str) -> Result<()>;
}
