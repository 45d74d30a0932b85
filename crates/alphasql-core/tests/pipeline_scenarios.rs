//! End-to-end scenarios exercising extraction, graph construction, and the
//! catalog driver together, per spec.md §8's testable properties (S1-S6).

use std::collections::HashMap;
use std::path::PathBuf;

use alphasql_core::catalog::{self, Catalog};
use alphasql_core::error::EngineError;
use alphasql_core::graph::{self, GraphOptions};
use alphasql_core::types::{CanonicalName, ColumnType, IdentifierInfo};
use alphasql_core::{extract, parse_script};
use rstest::rstest;

fn extract_file(path: &str, sql: &str) -> (PathBuf, IdentifierInfo) {
    let nodes = parse_script(sql).unwrap_or_else(|e| panic!("{path}: {e}"));
    let result = extract(&nodes).unwrap_or_else(|e| panic!("{path}: {e}"));
    (PathBuf::from(path), result.info)
}

fn parse_file(path: &str, sql: &str) -> (PathBuf, Vec<alphasql_core::ScriptNode>) {
    (PathBuf::from(path), parse_script(sql).unwrap_or_else(|e| panic!("{path}: {e}")))
}

#[test]
fn s1_linear_pipeline_orders_files_and_resolves_types() {
    let a_sql = "CREATE TABLE A AS SELECT 1 AS x;";
    let b_sql = "CREATE TABLE B AS SELECT x+1 FROM A;";
    let files = vec![extract_file("a.sql", a_sql), extract_file("b.sql", b_sql)];

    let graph = graph::build(&files, &GraphOptions::default()).expect("graph builds");
    assert!(graph.external_required_tables.is_empty());
    assert_eq!(graph.topological_order().unwrap(), vec!["a.sql", "b.sql"]);

    let parsed = vec![parse_file("a.sql", a_sql), parse_file("b.sql", b_sql)];
    let final_catalog = catalog::run(&parsed, Catalog::new()).expect("pipeline type-checks");
    assert_eq!(final_catalog.sorted_table_names(), vec!["a".to_string(), "b".to_string()]);
    assert_eq!(final_catalog.table(&CanonicalName::from("a")).unwrap().column("x").unwrap().ty, ColumnType::Int64);
    assert_eq!(final_catalog.table(&CanonicalName::from("b")).unwrap().column("x").unwrap().ty, ColumnType::Int64);
}

#[test]
fn s2_cycle_between_two_files_is_detected() {
    let a_sql = "CREATE TABLE A AS SELECT * FROM B;";
    let b_sql = "CREATE TABLE B AS SELECT * FROM A;";
    let files = vec![extract_file("a.sql", a_sql), extract_file("b.sql", b_sql)];

    let graph = graph::build(&files, &GraphOptions::default()).expect("graph builds despite the cycle");
    assert!(graph.find_cycle().is_some());
    assert!(matches!(graph.topological_order(), Err(EngineError::CycleDetected(_))));
}

#[rstest]
#[case("a.sql", "b.sql")]
#[case("b.sql", "a.sql")]
fn s3_duplicate_create_is_rejected_regardless_of_file_order(#[case] first: &str, #[case] second: &str) {
    let sql = "CREATE TABLE T AS SELECT 1 AS x;";
    let mut by_name: HashMap<&str, (PathBuf, IdentifierInfo)> = HashMap::new();
    by_name.insert("a.sql", extract_file("a.sql", sql));
    by_name.insert("b.sql", extract_file("b.sql", sql));
    let files = vec![by_name.remove(first).unwrap(), by_name.remove(second).unwrap()];

    let err = graph::build(&files, &GraphOptions::default()).unwrap_err();
    assert!(matches!(err, EngineError::DuplicateDefinition { name, .. } if name.eq_ignore_ascii_case("T")));
}

#[test]
fn s4_external_table_reference_is_reported() {
    let files = vec![extract_file("only.sql", "SELECT * FROM ext.raw;")];

    let graph = graph::build(&files, &GraphOptions::default()).expect("graph builds");
    assert_eq!(graph.inner.node_count(), 1);
    let external: Vec<String> = graph.external_required_tables.iter().map(|q| q.display()).collect();
    assert_eq!(external, vec!["ext.raw".to_string()]);
}

#[test]
fn s5_temp_table_does_not_leak_into_exported_facts_or_warnings() {
    let (_, info) =
        extract_file("a.sql", "CREATE TEMP TABLE t AS SELECT 1 AS x; INSERT INTO t VALUES (2);");
    assert!(info.tables.created.is_empty());
    assert!(info.tables.inserted.is_empty());

    let nodes = parse_script("CREATE TEMP TABLE t AS SELECT 1 AS x; INSERT INTO t VALUES (2);").unwrap();
    let result = extract(&nodes).unwrap();
    assert!(result.warnings.is_empty());
}

#[test]
fn s6_procedure_call_hoists_its_side_effect_and_the_dag_orders_the_call_after_the_definition() {
    let p_sql = "CREATE PROCEDURE p() BEGIN CREATE TABLE Art AS SELECT 1 AS x; END;";
    let q_sql = "CALL p();";
    let files = vec![extract_file("p.sql", p_sql), extract_file("q.sql", q_sql)];

    let graph = graph::build(&files, &GraphOptions::default()).expect("graph builds");
    assert_eq!(graph.topological_order().unwrap(), vec!["p.sql", "q.sql"]);

    let parsed = vec![parse_file("p.sql", p_sql), parse_file("q.sql", q_sql)];
    let final_catalog = catalog::run(&parsed, Catalog::new()).expect("pipeline type-checks");
    assert!(final_catalog.table(&CanonicalName::from("art")).is_some());
}
