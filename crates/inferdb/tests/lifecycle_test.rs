//! Btable and model lifecycle tests against the mock backend.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::json;

use inferdb::models::LegacyArchive;
use inferdb::{
    ColumnType, Engine, EngineError, MockBackend, ModelArchive, ModelSelection,
};

fn strings(rows: &[&[&str]]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| row.iter().map(|s| s.to_string()).collect())
        .collect()
}

fn header() -> Vec<String> {
    ["id", "age", "job"].iter().map(|s| s.to_string()).collect()
}

fn people_engine() -> Engine {
    let engine = Engine::in_memory(Arc::new(MockBackend::with_seed(7)));
    let rows = strings(&[
        &["p1", "25", "nurse"],
        &["p2", "40", "chef"],
        &["p3", "31", "nurse"],
        &["p4", "52", ""],
    ]);
    engine
        .create_btable_from_rows("people", &header(), &rows, None)
        .unwrap();
    engine
}

#[test]
fn test_create_btable_guesses_types() {
    let engine = people_engine();
    let schema = engine.show_schema("people").unwrap();
    let types: Vec<String> = schema
        .data
        .iter()
        .map(|row| row[1].to_string())
        .collect();
    assert_eq!(types, vec!["key", "continuous", "categorical"]);
}

#[test]
fn test_create_btable_collision_fails() {
    let engine = people_engine();
    let err = engine
        .create_btable_from_rows("people", &header(), &strings(&[&["x", "1", "a"]]), None)
        .unwrap_err();
    assert!(matches!(err, EngineError::TableAlreadyExists(_)));
}

#[test]
fn test_drop_btable_removes_everything() {
    let engine = people_engine();
    engine.initialize_models("people", 2, None).unwrap();
    engine.drop_btable("people").unwrap();
    assert!(engine.list_btables().data.is_empty());
    assert!(matches!(
        engine.show_models("people").unwrap_err(),
        EngineError::NoSuchTable(_)
    ));
}

#[test]
fn test_initialize_models_counts() {
    let engine = people_engine();
    engine.initialize_models("people", 3, None).unwrap();
    assert_eq!(engine.show_models("people").unwrap().data.len(), 3);
}

#[test]
fn test_config_mismatch_leaves_ensemble_intact() {
    let engine = people_engine();
    engine.initialize_models("people", 3, None).unwrap();
    let err = engine
        .initialize_models("people", 2, Some("naive bayes"))
        .unwrap_err();
    assert!(matches!(err, EngineError::ConfigMismatch { .. }));
    assert_eq!(engine.show_models("people").unwrap().data.len(), 3);
}

#[test]
fn test_unknown_preset_is_standard() {
    let engine = people_engine();
    engine
        .initialize_models("people", 1, Some("something exotic"))
        .unwrap();
    // A second batch under the default config must be accepted.
    engine.initialize_models("people", 1, None).unwrap();
    assert_eq!(engine.show_models("people").unwrap().data.len(), 2);
}

#[test]
fn test_analyze_accumulates_iterations() {
    let engine = people_engine();
    engine.initialize_models("people", 2, None).unwrap();
    engine
        .analyze("people", &ModelSelection::All, Some(10), None, None)
        .unwrap();
    engine
        .analyze("people", &ModelSelection::All, Some(5), None, None)
        .unwrap();
    let models = engine.show_models("people").unwrap();
    for row in &models.data {
        assert_eq!(row[1].as_f64(), Some(15.0));
    }
}

#[test]
fn test_analyze_time_budget_counts_completed_iterations() {
    let engine = people_engine();
    engine.initialize_models("people", 1, None).unwrap();
    // The mock stops after 25 iterations when a wall-clock budget is set.
    let report = engine
        .analyze("people", &ModelSelection::All, Some(1000), Some(5), None)
        .unwrap();
    assert_eq!(report.data[0][1].as_f64(), Some(25.0));
    let models = engine.show_models("people").unwrap();
    assert_eq!(models.data[0][1].as_f64(), Some(25.0));
}

#[test]
fn test_analyze_selected_subset() {
    let engine = people_engine();
    engine.initialize_models("people", 3, None).unwrap();
    engine
        .analyze("people", &ModelSelection::Ids(vec![1]), Some(8), None, None)
        .unwrap();
    let models = engine.show_models("people").unwrap();
    let by_id: Vec<(f64, f64)> = models
        .data
        .iter()
        .map(|row| (row[0].as_f64().unwrap(), row[1].as_f64().unwrap()))
        .collect();
    assert_eq!(by_id, vec![(0.0, 0.0), (1.0, 8.0), (2.0, 0.0)]);
}

#[test]
fn test_analyze_without_models_fails() {
    let engine = people_engine();
    let err = engine
        .analyze("people", &ModelSelection::All, Some(10), None, None)
        .unwrap_err();
    assert!(matches!(err, EngineError::NoModels(_)));
}

#[test]
fn test_analyze_unknown_model_id_fails() {
    let engine = people_engine();
    engine.initialize_models("people", 1, None).unwrap();
    assert!(
        engine
            .analyze("people", &ModelSelection::Ids(vec![9]), Some(1), None, None)
            .is_err()
    );
}

#[test]
fn test_analyze_empty_selection_fails() {
    let engine = people_engine();
    engine.initialize_models("people", 2, None).unwrap();
    let err = engine
        .analyze("people", &ModelSelection::Ids(vec![]), Some(1), None, None)
        .unwrap_err();
    assert!(matches!(err, EngineError::Input(_)));
}

#[test]
fn test_analyze_kernel_override() {
    let engine = people_engine();
    engine.initialize_models("people", 1, None).unwrap();
    let kernels = vec!["column_partition_assignments".to_string()];
    engine
        .analyze("people", &ModelSelection::All, Some(3), None, Some(&kernels))
        .unwrap();
    let models = engine.show_models("people").unwrap();
    assert_eq!(models.data[0][1].as_f64(), Some(3.0));
}

#[test]
fn test_show_diagnostics_series_length() {
    let engine = people_engine();
    engine.initialize_models("people", 1, None).unwrap();
    engine
        .analyze("people", &ModelSelection::All, Some(6), None, None)
        .unwrap();
    let diagnostics = engine.show_diagnostics("people", 0).unwrap();
    assert_eq!(diagnostics.data.len(), 6);
    assert_eq!(diagnostics.data[0][0].as_f64(), Some(1.0));
}

#[test]
fn test_save_load_round_trip() {
    let engine = people_engine();
    engine.initialize_models("people", 2, None).unwrap();
    engine
        .analyze("people", &ModelSelection::All, Some(4), None, None)
        .unwrap();

    let saved = engine.save_models("people").unwrap();
    engine
        .drop_models("people", &ModelSelection::All)
        .unwrap();
    assert!(engine.show_models("people").unwrap().data.is_empty());

    engine
        .load_models("people", ModelArchive::Current(saved))
        .unwrap();
    let models = engine.show_models("people").unwrap();
    assert_eq!(models.data.len(), 2);
    for row in &models.data {
        assert_eq!(row[1].as_f64(), Some(4.0));
    }
}

#[test]
fn test_save_load_through_files() {
    let engine = people_engine();
    engine.initialize_models("people", 2, None).unwrap();
    let file = tempfile::NamedTempFile::new().unwrap();
    engine.save_models_to("people", file.path()).unwrap();
    engine
        .drop_models("people", &ModelSelection::All)
        .unwrap();
    engine.load_models_from("people", file.path()).unwrap();
    assert_eq!(engine.show_models("people").unwrap().data.len(), 2);
}

#[test]
fn test_legacy_archive_gets_fixed_iteration_count() {
    let engine = people_engine();
    let archive: ModelArchive = serde_json::from_value(json!({
        "column_states": [{ "chain": 0, "refined": 0 }],
        "row_states": [[]],
    }))
    .unwrap();
    assert!(matches!(archive, ModelArchive::Legacy(_)));
    engine.load_models("people", archive).unwrap();
    let models = engine.show_models("people").unwrap();
    assert_eq!(models.data[0][1].as_f64(), Some(500.0));
    // Legacy models carry no configuration.
    assert!(models.data[0][2].is_missing());
}

#[test]
fn test_legacy_models_skip_config_check() {
    let engine = people_engine();
    engine
        .initialize_models("people", 1, Some("naive bayes"))
        .unwrap();
    // A legacy archive carries no configuration, so it loads into any
    // ensemble.
    let archive = ModelArchive::Legacy(LegacyArchive {
        column_states: vec![json!({ "chain": 0 })],
        row_states: vec![json!([])],
    });
    engine.load_models("people", archive).unwrap();
    assert_eq!(engine.show_models("people").unwrap().data.len(), 2);
}

#[test]
fn test_update_schema_blocked_by_models() {
    let engine = people_engine();
    engine.initialize_models("people", 1, None).unwrap();
    let mut changes = IndexMap::new();
    changes.insert("age".to_string(), ColumnType::Ignore);
    assert!(engine.update_schema("people", &changes).is_err());

    engine
        .drop_models("people", &ModelSelection::All)
        .unwrap();
    engine.update_schema("people", &changes).unwrap();
    let schema = engine.show_schema("people").unwrap();
    assert_eq!(schema.data[1][1].to_string(), "ignore");
}

#[test]
fn test_update_schema_unknown_column_fails() {
    let engine = people_engine();
    let mut changes = IndexMap::new();
    changes.insert("height".to_string(), ColumnType::Continuous);
    assert!(matches!(
        engine.update_schema("people", &changes).unwrap_err(),
        EngineError::NoSuchColumn { .. }
    ));
}

#[test]
fn test_labels_and_metadata() {
    let engine = people_engine();
    engine
        .label_columns(
            "people",
            &[("age".to_string(), "Age in years".to_string())],
        )
        .unwrap();
    let labels = engine.show_labels("people").unwrap();
    assert_eq!(labels.data.len(), 1);
    assert_eq!(labels.data[0][1].to_string(), "Age in years");

    let err = engine
        .label_columns("people", &[("height".to_string(), "cm".to_string())])
        .unwrap_err();
    assert!(matches!(err, EngineError::NoSuchColumn { .. }));

    engine
        .update_metadata(
            "people",
            &[("source".to_string(), "survey 2024".to_string())],
        )
        .unwrap();
    let metadata = engine.show_metadata("people").unwrap();
    assert_eq!(metadata.data[0][1].to_string(), "survey 2024");
}
