//! In-memory catalog implementation.

use std::sync::RwLock;

use indexmap::IndexMap;

use crate::error::{EngineError, Result};
use crate::models::{Model, ModelConfig};
use crate::table::Btable;

use super::Catalog;

/// Everything the catalog holds for one btable.
#[derive(Debug, Default)]
struct TableEntry {
    table: Option<Btable>,
    models: IndexMap<u64, Model>,
    next_model_id: u64,
    column_lists: IndexMap<String, Vec<String>>,
    row_lists: IndexMap<String, Vec<usize>>,
    labels: IndexMap<String, String>,
    user_metadata: IndexMap<String, String>,
}

/// Thread-safe in-memory catalog.
///
/// One `RwLock` guards the whole registry; every trait method takes the lock
/// once, so per-model updates are atomic with respect to snapshot reads.
#[derive(Default)]
pub struct MemoryCatalog {
    tables: RwLock<IndexMap<String, TableEntry>>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry<T>(
        &self,
        name: &str,
        f: impl FnOnce(&TableEntry) -> Result<T>,
    ) -> Result<T> {
        let tables = self.tables.read().expect("catalog lock poisoned");
        let entry = tables
            .get(name)
            .ok_or_else(|| EngineError::NoSuchTable(name.to_string()))?;
        f(entry)
    }

    fn with_entry_mut<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut TableEntry) -> Result<T>,
    ) -> Result<T> {
        let mut tables = self.tables.write().expect("catalog lock poisoned");
        let entry = tables
            .get_mut(name)
            .ok_or_else(|| EngineError::NoSuchTable(name.to_string()))?;
        f(entry)
    }
}

impl Catalog for MemoryCatalog {
    fn table_exists(&self, name: &str) -> bool {
        self.tables
            .read()
            .expect("catalog lock poisoned")
            .contains_key(name)
    }

    fn create_table(&self, name: &str, table: Btable) -> Result<()> {
        let mut tables = self.tables.write().expect("catalog lock poisoned");
        if tables.contains_key(name) {
            return Err(EngineError::TableAlreadyExists(name.to_string()));
        }
        tables.insert(
            name.to_string(),
            TableEntry {
                table: Some(table),
                ..TableEntry::default()
            },
        );
        Ok(())
    }

    fn drop_table(&self, name: &str) -> Result<()> {
        let mut tables = self.tables.write().expect("catalog lock poisoned");
        tables
            .shift_remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::NoSuchTable(name.to_string()))
    }

    fn list_tables(&self) -> Vec<String> {
        self.tables
            .read()
            .expect("catalog lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    fn get_table(&self, name: &str) -> Result<Btable> {
        self.with_entry(name, |entry| {
            entry
                .table
                .clone()
                .ok_or_else(|| EngineError::NoSuchTable(name.to_string()))
        })
    }

    fn replace_table(&self, name: &str, table: Btable) -> Result<()> {
        self.with_entry_mut(name, |entry| {
            entry.table = Some(table);
            Ok(())
        })
    }

    fn get_models(&self, name: &str) -> Result<IndexMap<u64, Model>> {
        self.with_entry(name, |entry| {
            let mut models = entry.models.clone();
            models.sort_keys();
            Ok(models)
        })
    }

    fn add_models(&self, name: &str, models: Vec<Model>) -> Result<Vec<u64>> {
        self.with_entry_mut(name, |entry| {
            let mut ids = Vec::with_capacity(models.len());
            for model in models {
                let id = entry.next_model_id;
                entry.next_model_id += 1;
                entry.models.insert(id, model);
                ids.push(id);
            }
            Ok(ids)
        })
    }

    fn update_model(&self, name: &str, id: u64, model: Model) -> Result<()> {
        self.with_entry_mut(name, |entry| {
            match entry.models.get_mut(&id) {
                Some(slot) => {
                    *slot = model;
                    Ok(())
                }
                None => Err(EngineError::Backend(format!(
                    "Model {} does not exist for btable '{}'",
                    id, name
                ))),
            }
        })
    }

    fn drop_models(&self, name: &str, ids: Option<&[u64]>) -> Result<()> {
        self.with_entry_mut(name, |entry| {
            match ids {
                Some(ids) => {
                    for id in ids {
                        entry.models.shift_remove(id);
                    }
                }
                None => entry.models.clear(),
            }
            Ok(())
        })
    }

    fn get_column_lists(&self, name: &str) -> Result<IndexMap<String, Vec<String>>> {
        self.with_entry(name, |entry| Ok(entry.column_lists.clone()))
    }

    fn get_column_list(&self, name: &str, list: &str) -> Result<Vec<String>> {
        self.with_entry(name, |entry| {
            entry
                .column_lists
                .get(list)
                .filter(|members| !members.is_empty())
                .cloned()
                .ok_or_else(|| EngineError::EmptyList {
                    kind: "Column",
                    name: list.to_string(),
                })
        })
    }

    fn add_column_list(&self, name: &str, list: &str, columns: Vec<String>) -> Result<()> {
        self.with_entry_mut(name, |entry| {
            entry.column_lists.insert(list.to_string(), columns);
            Ok(())
        })
    }

    fn get_row_lists(&self, name: &str) -> Result<IndexMap<String, Vec<usize>>> {
        self.with_entry(name, |entry| Ok(entry.row_lists.clone()))
    }

    fn get_row_list(&self, name: &str, list: &str) -> Result<Vec<usize>> {
        self.with_entry(name, |entry| {
            entry
                .row_lists
                .get(list)
                .filter(|members| !members.is_empty())
                .cloned()
                .ok_or_else(|| EngineError::EmptyList {
                    kind: "Row",
                    name: list.to_string(),
                })
        })
    }

    fn add_row_list(&self, name: &str, list: &str, rows: Vec<usize>) -> Result<()> {
        self.with_entry_mut(name, |entry| {
            entry.row_lists.insert(list.to_string(), rows);
            Ok(())
        })
    }

    fn get_column_labels(&self, name: &str) -> Result<IndexMap<String, String>> {
        self.with_entry(name, |entry| Ok(entry.labels.clone()))
    }

    fn add_column_label(&self, name: &str, column: &str, label: &str) -> Result<()> {
        self.with_entry_mut(name, |entry| {
            entry.labels.insert(column.to_string(), label.to_string());
            Ok(())
        })
    }

    fn get_user_metadata(&self, name: &str) -> Result<IndexMap<String, String>> {
        self.with_entry(name, |entry| Ok(entry.user_metadata.clone()))
    }

    fn add_user_metadata(&self, name: &str, key: &str, value: &str) -> Result<()> {
        self.with_entry_mut(name, |entry| {
            entry
                .user_metadata
                .insert(key.to_string(), value.to_string());
            Ok(())
        })
    }
}

// model_config uses the trait default over get_models.
impl MemoryCatalog {
    /// Convenience accessor mirroring the trait default, usable without a
    /// trait object.
    pub fn config_of(&self, name: &str) -> Result<Option<ModelConfig>> {
        Catalog::model_config(self, name)
    }
}
