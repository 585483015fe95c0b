//! End-to-end query tests against the mock backend.

use std::sync::Arc;

use inferdb::{
    Engine, EngineError, InferRequest, MockBackend, ModelSelection, OutputShape,
    SelectRequest, SimulateRequest, Value,
};

fn strings(rows: &[&[&str]]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| row.iter().map(|s| s.to_string()).collect())
        .collect()
}

fn people_engine() -> Engine {
    let engine = Engine::in_memory(Arc::new(MockBackend::with_seed(7)));
    let header: Vec<String> = ["id", "age", "job"].iter().map(|s| s.to_string()).collect();
    let rows = strings(&[
        &["p1", "25", "nurse"],
        &["p2", "40", "chef"],
        &["p3", "31", "nurse"],
        &["p4", "52", ""],
    ]);
    engine
        .create_btable_from_rows("people", &header, &rows, None)
        .unwrap();
    engine
}

fn modeled_engine() -> Engine {
    let engine = people_engine();
    engine.initialize_models("people", 2, None).unwrap();
    engine
        .analyze("people", &ModelSelection::All, Some(5), None, None)
        .unwrap();
    engine
}

#[test]
fn test_select_star_without_models() {
    let engine = people_engine();
    let result = engine
        .select("people", &SelectRequest { columns: "*", ..Default::default() })
        .unwrap();
    assert_eq!(result.columns, vec!["row_id", "id", "age", "job"]);
    assert_eq!(result.data.len(), 4);
    assert_eq!(result.data[0][1], Value::Text("p1".to_string()));
}

#[test]
fn test_model_function_without_models_fails() {
    let engine = people_engine();
    let err = engine
        .select(
            "people",
            &SelectRequest { columns: "id, similarity to 0", ..Default::default() },
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::NoModels(_)));
}

#[test]
fn test_model_function_in_order_by_without_models_fails() {
    let engine = people_engine();
    let err = engine
        .select(
            "people",
            &SelectRequest {
                columns: "id",
                order_by: Some("typicality"),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::NoModels(_)));
}

#[test]
fn test_select_where_order_limit() {
    let engine = people_engine();
    let result = engine
        .select(
            "people",
            &SelectRequest {
                columns: "id, age",
                conditions: Some("job = 'nurse'"),
                order_by: Some("age desc"),
                limit: Some(1),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(result.data.len(), 1);
    assert_eq!(result.data[0][1], Value::Text("p3".to_string()));
}

#[test]
fn test_where_on_missing_cell_never_matches() {
    let engine = people_engine();
    let result = engine
        .select(
            "people",
            &SelectRequest {
                columns: "id",
                conditions: Some("job != 'nurse'"),
                ..Default::default()
            },
        )
        .unwrap();
    // p4's job is missing and is excluded from both = and !=.
    let ids: Vec<String> = result.data.iter().map(|row| row[1].to_string()).collect();
    assert_eq!(ids, vec!["p2"]);
}

#[test]
fn test_select_similarity_orders_by_row_distance() {
    let engine = modeled_engine();
    let result = engine
        .select(
            "people",
            &SelectRequest {
                columns: "id",
                order_by: Some("similarity to 0 desc"),
                ..Default::default()
            },
        )
        .unwrap();
    // Mock similarity decays with row distance, so row 0 ranks first.
    assert_eq!(result.data[0][1], Value::Text("p1".to_string()));
    assert_eq!(result.data[3][1], Value::Text("p4".to_string()));
}

#[test]
fn test_aggregate_function_is_constant_across_rows() {
    let engine = modeled_engine();
    let result = engine
        .select(
            "people",
            &SelectRequest { columns: "id, typicality of age", ..Default::default() },
        )
        .unwrap();
    let first = result.data[0][2].clone();
    assert!(result.data.iter().all(|row| row[2] == first));
}

#[test]
fn test_infer_without_models_fails() {
    let engine = people_engine();
    let err = engine
        .infer(
            "people",
            &InferRequest {
                columns: "id, job",
                confidence: 0.0,
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::NoModels(_)));
}

#[test]
fn test_infer_fills_confident_cells() {
    let engine = modeled_engine();
    let result = engine
        .infer(
            "people",
            &InferRequest {
                columns: "id, job",
                confidence: 0.5,
                ..Default::default()
            },
        )
        .unwrap();
    // Mock confidence is the observed fraction (0.75), above the threshold;
    // the modal job code decodes to "nurse".
    assert_eq!(result.data[3][2], Value::Text("nurse".to_string()));
}

#[test]
fn test_infer_below_confidence_keeps_missing() {
    let engine = modeled_engine();
    let result = engine
        .infer(
            "people",
            &InferRequest {
                columns: "id, job",
                confidence: 0.9,
                ..Default::default()
            },
        )
        .unwrap();
    assert!(result.data[3][2].is_missing());
}

#[test]
fn test_infer_leaves_observed_cells_alone() {
    let engine = modeled_engine();
    let result = engine
        .infer(
            "people",
            &InferRequest {
                columns: "id, job",
                confidence: 0.0,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(result.data[0][2], Value::Text("nurse".to_string()));
    assert_eq!(result.data[1][2], Value::Text("chef".to_string()));
}

#[test]
fn test_simulate_draw_count_and_givens() {
    let engine = modeled_engine();
    let result = engine
        .simulate(
            "people",
            &SimulateRequest {
                columns: "age, job",
                givens: Some("job = 'chef'"),
                numpredictions: 5,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(result.columns, vec!["age", "job"]);
    assert_eq!(result.data.len(), 5);
    // Given columns are echoed verbatim, never resampled.
    assert!(
        result
            .data
            .iter()
            .all(|row| row[1] == Value::Text("chef".to_string()))
    );
    // Drawn ages come from observed codes.
    let observed = [25.0, 40.0, 31.0, 52.0];
    assert!(
        result
            .data
            .iter()
            .all(|row| observed.contains(&row[0].as_f64().unwrap()))
    );
}

#[test]
fn test_simulate_without_models_fails() {
    let engine = people_engine();
    let err = engine
        .simulate(
            "people",
            &SimulateRequest { columns: "age", numpredictions: 1, ..Default::default() },
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::NoModels(_)));
}

#[test]
fn test_simulate_rejects_functions_and_unmodeled_columns() {
    let engine = modeled_engine();
    assert!(
        engine
            .simulate(
                "people",
                &SimulateRequest {
                    columns: "typicality",
                    numpredictions: 1,
                    ..Default::default()
                },
            )
            .is_err()
    );
    assert!(
        engine
            .simulate(
                "people",
                &SimulateRequest { columns: "id", numpredictions: 1, ..Default::default() },
            )
            .is_err()
    );
}

#[test]
fn test_estimate_columns_plain_lists_modeled_columns() {
    let engine = people_engine();
    let result = engine
        .estimate_columns("people", None, None, None, None)
        .unwrap();
    let names: Vec<String> = result.data.iter().map(|row| row[0].to_string()).collect();
    assert_eq!(names, vec!["age", "job"]);
}

#[test]
fn test_estimate_columns_ordering_requires_models() {
    let engine = people_engine();
    let err = engine
        .estimate_columns("people", None, Some("typicality"), None, None)
        .unwrap_err();
    assert!(matches!(err, EngineError::NoModels(_)));
}

#[test]
fn test_estimate_columns_saves_list() {
    let engine = modeled_engine();
    engine
        .estimate_columns("people", None, Some("typicality"), Some(1), Some("best"))
        .unwrap();
    let columns = engine.show_columns("people", Some("best")).unwrap();
    assert_eq!(columns.data.len(), 1);

    // Overwriting the same list name is silent.
    engine
        .estimate_columns("people", None, None, None, Some("best"))
        .unwrap();
    let columns = engine.show_columns("people", Some("best")).unwrap();
    assert_eq!(columns.data.len(), 2);
}

#[test]
fn test_pairwise_column_matrix_is_symmetric() {
    let engine = modeled_engine();
    let result = engine
        .estimate_pairwise("people", "dependence probability", None, None)
        .unwrap();
    assert_eq!(result.columns, vec!["column", "age", "job"]);
    assert_eq!(result.data.len(), 2);
    assert_eq!(result.data[0][2], result.data[1][1]);
    assert_eq!(result.data[0][1].as_f64(), Some(1.0));
    assert_eq!(result.data[1][2].as_f64(), Some(1.0));
}

#[test]
fn test_pairwise_clusters_partition_columns() {
    let engine = modeled_engine();
    // Above any off-diagonal strength: every column is its own cluster.
    engine
        .estimate_pairwise("people", "correlation", None, Some(("iso", 1.01)))
        .unwrap();
    let lists = engine.show_column_lists("people").unwrap();
    let names: Vec<String> = lists.data.iter().map(|row| row[0].to_string()).collect();
    assert!(names.contains(&"iso_0".to_string()));
    assert!(names.contains(&"iso_1".to_string()));
    let sizes: f64 = lists
        .data
        .iter()
        .filter(|row| row[0].to_string().starts_with("iso_"))
        .map(|row| row[1].as_f64().unwrap())
        .sum();
    assert_eq!(sizes, 2.0);

    // At zero threshold everything connects.
    engine
        .estimate_pairwise("people", "correlation", None, Some(("all", 0.0)))
        .unwrap();
    let all = engine.show_columns("people", Some("all_0")).unwrap();
    assert_eq!(all.data.len(), 2);
}

#[test]
fn test_pairwise_unknown_function_fails() {
    let engine = modeled_engine();
    assert!(
        engine
            .estimate_pairwise("people", "rapport", None, None)
            .is_err()
    );
}

#[test]
fn test_pairwise_without_models_fails() {
    let engine = people_engine();
    let err = engine
        .estimate_pairwise("people", "correlation", None, None)
        .unwrap_err();
    assert!(matches!(err, EngineError::NoModels(_)));
}

#[test]
fn test_pairwise_rows_labels_by_key() {
    let engine = modeled_engine();
    let result = engine.estimate_pairwise_row("people", "similarity", None, None).unwrap();
    assert_eq!(result.columns, vec!["row", "p1", "p2", "p3", "p4"]);
    assert_eq!(result.data[0][1].as_f64(), Some(1.0));
    // Symmetry.
    assert_eq!(result.data[0][2], result.data[1][1]);
}

#[test]
fn test_pairwise_row_clusters_save_row_lists() {
    let engine = modeled_engine();
    // Mock similarity of adjacent rows is 0.5, so 0.4 chains everything
    // into one component.
    engine
        .estimate_pairwise_row("people", "similarity", None, Some(("near", 0.4)))
        .unwrap();
    let lists = engine.show_row_lists("people").unwrap();
    assert_eq!(lists.data.len(), 1);
    assert_eq!(lists.data[0][0].to_string(), "near_0");
    assert_eq!(lists.data[0][1].as_f64(), Some(4.0));
}

#[test]
fn test_pairwise_row_unknown_function_fails() {
    let engine = modeled_engine();
    let err = engine
        .estimate_pairwise_row("people", "rapport", None, None)
        .unwrap_err();
    assert!(matches!(err, EngineError::Parse(_)));
}

#[test]
fn test_missing_row_list_fails() {
    let engine = modeled_engine();
    let err = engine
        .estimate_pairwise_row("people", "similarity", Some("ghost"), None)
        .unwrap_err();
    assert!(matches!(err, EngineError::EmptyList { .. }));
}

#[test]
fn test_select_into_creates_btable() {
    let engine = people_engine();
    engine
        .select(
            "people",
            &SelectRequest {
                columns: "id, age, job",
                conditions: Some("age < 35"),
                into: Some("young"),
                ..Default::default()
            },
        )
        .unwrap();

    let names: Vec<String> = engine
        .list_btables()
        .data
        .iter()
        .map(|row| row[0].to_string())
        .collect();
    assert!(names.contains(&"young".to_string()));

    let result = engine
        .select("young", &SelectRequest { columns: "*", ..Default::default() })
        .unwrap();
    assert_eq!(result.data.len(), 2);
    // Derived columns keep the source's declared types.
    let schema = engine.show_schema("young").unwrap();
    let age_row = schema
        .data
        .iter()
        .find(|row| row[0].to_string() == "age")
        .unwrap();
    assert_eq!(age_row[1].to_string(), "continuous");
}

#[test]
fn test_select_into_collision_fails() {
    let engine = people_engine();
    let request = SelectRequest {
        columns: "id, age",
        into: Some("copy"),
        ..Default::default()
    };
    engine.select("people", &request).unwrap();
    let err = engine.select("people", &request).unwrap_err();
    assert!(matches!(err, EngineError::TableAlreadyExists(_)));
}

#[test]
fn test_freq_shape_counts_first_queried_column() {
    let engine = people_engine();
    let result = engine
        .select(
            "people",
            &SelectRequest {
                columns: "job",
                shape: OutputShape::Freq,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(result.columns, vec!["job", "frequency", "probability"]);
    assert_eq!(result.data[0][0], Value::Text("nurse".to_string()));
    assert_eq!(result.data[0][1].as_f64(), Some(2.0));
}

#[test]
fn test_column_list_expands_in_select() {
    let engine = modeled_engine();
    engine
        .estimate_columns("people", None, None, None, Some("both"))
        .unwrap();
    let result = engine
        .select("people", &SelectRequest { columns: "both", ..Default::default() })
        .unwrap();
    assert_eq!(result.columns, vec!["row_id", "age", "job"]);
}

#[test]
fn test_zero_member_column_list_fails() {
    let engine = modeled_engine();
    // A limit of zero saves a list with no members.
    engine
        .estimate_columns("people", None, None, Some(0), Some("none"))
        .unwrap();
    let err = engine
        .select("people", &SelectRequest { columns: "none", ..Default::default() })
        .unwrap_err();
    assert!(matches!(err, EngineError::EmptyList { .. }));
    let err = engine
        .estimate_pairwise("people", "correlation", Some("none"), None)
        .unwrap_err();
    assert!(matches!(err, EngineError::EmptyList { .. }));
}

#[test]
fn test_ignored_column_leaves_star_projection() {
    let engine = people_engine();
    let mut changes = indexmap::IndexMap::new();
    changes.insert("age".to_string(), inferdb::ColumnType::Ignore);
    engine.update_schema("people", &changes).unwrap();
    let result = engine
        .select("people", &SelectRequest { columns: "*", ..Default::default() })
        .unwrap();
    assert_eq!(result.columns, vec!["row_id", "id", "job"]);
}
