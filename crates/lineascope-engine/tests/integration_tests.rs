//! End-to-end engine tests over the in-memory store
//!
//! A build pass runs over the fixture scripts, then every query operation
//! is exercised against the resulting metadata.

use std::path::PathBuf;
use std::sync::Arc;

use pretty_assertions::assert_eq;

use lineascope_core::{ColumnOrigin, FactSet, MetadataNamespace, TableLineage};
use lineascope_engine::{
    EngineError, MetadataBuilder, RowLookup, SourceStatus, TraceEngine, TraceOutcome,
};
use lineascope_store::{ColumnInfo, MemoryStore, MetadataStore};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/etl")
}

/// Store with metadata built from the fixture scripts, plus an engine
async fn built() -> (MemoryStore, TraceEngine) {
    let store = MemoryStore::new();
    let builder = MetadataBuilder::new(Arc::new(store.clone()));
    builder.build_dir(&fixtures_dir()).await.unwrap();
    let engine = TraceEngine::new(Arc::new(store.clone()));
    (store, engine)
}

#[tokio::test]
async fn build_pass_reports_fixture_counts() {
    let store = MemoryStore::new();
    let builder = MetadataBuilder::new(Arc::new(store.clone()));
    let summary = builder.build_dir(&fixtures_dir()).await.unwrap();

    assert_eq!(summary.script_files, 2);
    assert_eq!(summary.distinct_targets, 3);
    assert_eq!(summary.table_facts, 4);
    assert_eq!(summary.column_facts, 2);
}

#[tokio::test]
async fn building_twice_yields_identical_facts() {
    let builder = MetadataBuilder::new(Arc::new(MemoryStore::new()));
    let first = builder.extract_facts(&fixtures_dir()).unwrap();
    let second = builder.extract_facts(&fixtures_dir()).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn build_on_missing_directory_fails_without_store_writes() {
    let store = MemoryStore::new();
    let builder = MetadataBuilder::new(Arc::new(store.clone()));
    let missing = fixtures_dir().join("does_not_exist");

    let err = builder.build_dir(&missing).await.unwrap_err();
    assert!(matches!(err, EngineError::NoScripts { .. }));

    let ns = MetadataNamespace::default();
    let lineage_table = ns.table_lineage_ident().unwrap();
    assert!(!store.table_exists(&lineage_table).await.unwrap());
}

#[tokio::test]
async fn failed_rebuild_keeps_prior_metadata_queryable() {
    let (store, engine) = built().await;

    store.set_fail_rebuild(true);
    let builder = MetadataBuilder::new(Arc::new(store.clone()));
    let err = builder.build_dir(&fixtures_dir()).await.unwrap_err();
    assert!(matches!(err, EngineError::BuildFailed { .. }));

    let upstream = engine
        .get_upstream_tables("conformed.churn_risk")
        .await
        .unwrap();
    assert_eq!(upstream, vec!["stg.employees", "stg.job_history"]);
}

#[tokio::test]
async fn trace_reports_recorded_derivation() {
    let (_store, engine) = built().await;

    let outcome = engine
        .trace_column_lineage("conformed.churn_risk", "risk_level")
        .await
        .unwrap();

    let TraceOutcome::Found(fact) = &outcome else {
        panic!("expected a recorded fact, got {outcome:?}");
    };
    assert_eq!(fact.origin, ColumnOrigin::Computed);
    assert_eq!(fact.source_tables, "stg.job_history, stg.employees");
    assert_eq!(fact.sql_file_name, "02_conformed.sql");

    let report = outcome.render();
    assert!(report.contains("conformed.churn_risk.risk_level"));
    assert!(report.contains("CASE"));
    assert!(report.contains("02_conformed.sql"));

    let aggregated = engine
        .trace_column_lineage("conformed.churn_risk", "job_count")
        .await
        .unwrap();
    let TraceOutcome::Found(fact) = aggregated else {
        panic!("expected a recorded fact");
    };
    assert_eq!(fact.origin, ColumnOrigin::Aggregated);
}

#[tokio::test]
async fn missing_metadata_and_missing_fact_stay_distinguishable() {
    // No build has run: distinct "metadata missing" outcome.
    let empty_engine = TraceEngine::new(Arc::new(MemoryStore::new()));
    let missing = empty_engine
        .trace_column_lineage("conformed.churn_risk", "risk_level")
        .await
        .unwrap();
    assert!(matches!(missing, TraceOutcome::MetadataMissing { .. }));

    // Metadata built, but the column has no fact: distinct "not found".
    let (_store, engine) = built().await;
    let not_found = engine
        .trace_column_lineage("conformed.churn_risk", "emp_id")
        .await
        .unwrap();
    assert!(matches!(not_found, TraceOutcome::NotFound { .. }));

    assert_ne!(missing, not_found);
}

#[tokio::test]
async fn upstream_of_leaf_table_is_empty_not_an_error() {
    let (_store, engine) = built().await;
    let upstream = engine.get_upstream_tables("raw.employees").await.unwrap();
    assert!(upstream.is_empty());
}

#[tokio::test]
async fn lineage_tree_expands_to_raw_sources() {
    let (_store, engine) = built().await;

    let tree = engine
        .get_lineage_tree("conformed.churn_risk", None)
        .await
        .unwrap();

    let children = tree.upstream().expect("expanded tree");
    assert_eq!(
        children.keys().collect::<Vec<_>>(),
        vec!["stg.employees", "stg.job_history"]
    );

    let staging = children.get("stg.employees").unwrap();
    let raw = staging.upstream().expect("staging expands further");
    assert!(raw.get("raw.employees").unwrap().is_source());
}

#[tokio::test]
async fn depth_zero_truncates_before_anything_else() {
    let (_store, engine) = built().await;

    let truncated = engine
        .get_lineage_tree("conformed.churn_risk", Some(0))
        .await
        .unwrap();
    assert!(truncated.is_truncated());

    // Even a leaf table truncates at depth zero.
    let leaf = engine
        .get_lineage_tree("raw.employees", Some(0))
        .await
        .unwrap();
    assert!(leaf.is_truncated());

    let source = engine
        .get_lineage_tree("raw.employees", Some(5))
        .await
        .unwrap();
    assert!(source.is_source());
}

#[tokio::test]
async fn cyclic_metadata_short_circuits_instead_of_recursing() {
    let store = MemoryStore::new();
    let ns = MetadataNamespace::default();
    let facts = FactSet {
        table_lineage: vec![
            TableLineage::new("warehouse.a", "warehouse.b", "sql"),
            TableLineage::new("warehouse.b", "warehouse.a", "sql"),
        ],
        column_lineage: Vec::new(),
    };
    store.rebuild(&ns, &facts).await.unwrap();

    let engine = TraceEngine::new(Arc::new(store));
    let tree = engine
        .get_lineage_tree("warehouse.a", Some(10))
        .await
        .unwrap();

    let b = tree.upstream().unwrap().get("warehouse.b").unwrap();
    let back = b.upstream().unwrap().get("warehouse.a").unwrap();
    assert!(back.is_cycle());
}

#[tokio::test]
async fn diamond_sharing_is_not_flagged_as_a_cycle() {
    let store = MemoryStore::new();
    let ns = MetadataNamespace::default();
    let facts = FactSet {
        table_lineage: vec![
            TableLineage::new("mart.top", "stg.left", "sql"),
            TableLineage::new("mart.top", "stg.right", "sql"),
            TableLineage::new("stg.left", "raw.base", "sql"),
            TableLineage::new("stg.right", "raw.base", "sql"),
        ],
        column_lineage: Vec::new(),
    };
    store.rebuild(&ns, &facts).await.unwrap();

    let engine = TraceEngine::new(Arc::new(store));
    let tree = engine.get_lineage_tree("mart.top", None).await.unwrap();

    for branch in ["stg.left", "stg.right"] {
        let subtree = tree.upstream().unwrap().get(branch).unwrap();
        let base = subtree.upstream().unwrap().get("raw.base").unwrap();
        assert!(base.is_source(), "shared upstream must not read as a cycle");
    }
}

#[tokio::test]
async fn source_health_captures_per_source_outcomes() {
    let (store, engine) = built().await;

    // One healthy source, one empty, one missing from the store entirely.
    store
        .add_table(
            "stg",
            "employees",
            vec![ColumnInfo::new("emp_id", "INTEGER")],
            vec![vec!["1".to_string()], vec!["2".to_string()]],
        )
        .await;
    store
        .add_table(
            "stg",
            "job_history",
            vec![ColumnInfo::new("emp_id", "INTEGER")],
            vec![],
        )
        .await;

    let report = engine
        .check_table_sources("conformed.churn_risk")
        .await
        .unwrap();
    let checks = report.checks().expect("per-source report");

    let employees = checks.get("stg.employees").unwrap();
    assert_eq!(employees.status, SourceStatus::Healthy);
    assert_eq!(employees.row_count, Some(2));

    let history = checks.get("stg.job_history").unwrap();
    assert_eq!(history.status, SourceStatus::Empty);
    assert_eq!(history.row_count, Some(0));

    // The staging tables themselves read from raw tables that were never
    // loaded: those checks fail per-source without aborting the call.
    let staging_report = engine.check_table_sources("stg.employees").await.unwrap();
    let staging_checks = staging_report.checks().unwrap();
    let raw = staging_checks.get("raw.employees").unwrap();
    assert_eq!(raw.status, SourceStatus::Error);
    assert!(raw.error.as_deref().unwrap_or_default().contains("raw.employees"));
}

#[tokio::test]
async fn source_health_reports_missing_upstream_as_error_object() {
    let (_store, engine) = built().await;
    let report = engine.check_table_sources("raw.employees").await.unwrap();
    assert!(report.checks().is_none());
}

#[tokio::test]
async fn trace_results_are_cached_until_cleared() {
    let (store, engine) = built().await;

    let first = engine
        .trace_column_lineage("conformed.churn_risk", "risk_level")
        .await
        .unwrap();
    let second = engine
        .trace_column_lineage("conformed.churn_risk", "risk_level")
        .await
        .unwrap();
    assert_eq!(first.render(), second.render());
    assert_eq!(engine.cached_traces(), 1);

    // Rebuild with an empty fact set; the cache intentionally keeps
    // serving the stale report until cleared.
    let ns = MetadataNamespace::default();
    store.rebuild(&ns, &FactSet::default()).await.unwrap();

    let stale = engine
        .trace_column_lineage("conformed.churn_risk", "risk_level")
        .await
        .unwrap();
    assert!(stale.is_found());

    engine.clear_cache();
    assert_eq!(engine.cached_traces(), 0);

    let fresh = engine
        .trace_column_lineage("conformed.churn_risk", "risk_level")
        .await
        .unwrap();
    assert!(matches!(fresh, TraceOutcome::NotFound { .. }));
}

#[tokio::test]
async fn malformed_identifiers_are_rejected_before_the_store() {
    let (_store, engine) = built().await;

    for bad in ["emp; DROP TABLE x", "' OR 1=1", "", "a.b.c"] {
        let err = engine.get_upstream_tables(bad).await.unwrap_err();
        assert!(
            matches!(err, EngineError::InvalidIdentifier(_)),
            "expected rejection for {bad:?}"
        );

        let err = engine
            .trace_column_lineage(bad, "risk_level")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidIdentifier(_)));
    }

    let err = engine
        .trace_column_lineage("conformed.churn_risk", "1; SELECT *")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidIdentifier(_)));

    let err = engine
        .inspect_row("raw.employees", "key; --", "1")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidIdentifier(_)));

    // Valid identifiers pass the same gate.
    assert!(engine.get_upstream_tables("raw.employees").await.is_ok());
    assert!(engine.get_upstream_tables("employees").await.is_ok());
}

#[tokio::test]
async fn inspect_row_returns_field_map_or_marker() {
    let (store, engine) = built().await;
    store
        .add_table(
            "raw",
            "employees",
            vec![
                ColumnInfo::new("emp_id", "INTEGER"),
                ColumnInfo::new("name", "VARCHAR"),
            ],
            vec![vec!["7".to_string(), "ada".to_string()]],
        )
        .await;

    let found = engine.inspect_row("raw.employees", "emp_id", "7").await.unwrap();
    let RowLookup::Found { row } = found else {
        panic!("expected a row");
    };
    assert_eq!(row.get("name").map(String::as_str), Some("ada"));

    let missing = engine.inspect_row("raw.employees", "emp_id", "99").await.unwrap();
    assert!(!missing.is_found());
}

#[tokio::test]
async fn discovery_operations_reflect_store_contents() {
    let (store, engine) = built().await;
    store
        .add_table(
            "raw",
            "employees",
            vec![ColumnInfo::new("emp_id", "INTEGER")],
            vec![],
        )
        .await;

    let schemas = engine.list_schemas().await.unwrap();
    assert!(schemas.contains(&"meta".to_string()));
    assert!(schemas.contains(&"raw".to_string()));

    let meta_tables = engine.list_tables(Some("meta")).await.unwrap();
    let names: Vec<String> = meta_tables.iter().map(|t| t.name.clone()).collect();
    assert_eq!(names, vec!["column_lineage", "table_lineage"]);

    let columns = engine.describe_columns("raw.employees").await.unwrap();
    assert_eq!(columns[0].name, "emp_id");

    assert_eq!(engine.count_rows("raw.employees").await.unwrap(), 0);
    assert_eq!(engine.count_rows("meta.table_lineage").await.unwrap(), 4);
}
