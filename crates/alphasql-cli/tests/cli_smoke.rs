use std::fs;
use std::process::Command;

use tempfile::tempdir;

#[test]
fn alphadag_builds_a_dag_for_a_linear_pipeline() {
    let dir = tempdir().expect("temp dir");
    fs::write(dir.path().join("a.sql"), "CREATE TABLE A AS SELECT 1 AS x;").unwrap();
    fs::write(dir.path().join("b.sql"), "CREATE TABLE B AS SELECT x+1 FROM A;").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_alphadag"))
        .arg(dir.path())
        .output()
        .expect("run alphadag");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "expected exit 0, got: {stdout}");
    assert!(stdout.contains("digraph"), "expected DOT output: {stdout}");
}

#[test]
fn alphadag_reports_a_cycle_as_a_warning_and_exits_zero_without_warning_as_error() {
    let dir = tempdir().expect("temp dir");
    fs::write(dir.path().join("a.sql"), "CREATE TABLE A AS SELECT * FROM B;").unwrap();
    fs::write(dir.path().join("b.sql"), "CREATE TABLE B AS SELECT * FROM A;").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_alphadag"))
        .arg(dir.path())
        .output()
        .expect("run alphadag");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success());
    assert!(stderr.contains("cycle detected"), "expected cycle warning: {stderr}");
}

#[test]
fn alphadag_warning_as_error_escalates_the_cycle_to_exit_one() {
    let dir = tempdir().expect("temp dir");
    fs::write(dir.path().join("a.sql"), "CREATE TABLE A AS SELECT * FROM B;").unwrap();
    fs::write(dir.path().join("b.sql"), "CREATE TABLE B AS SELECT * FROM A;").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_alphadag"))
        .arg(dir.path())
        .arg("--warning_as_error")
        .output()
        .expect("run alphadag");

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn alphacheck_replays_a_dag_against_an_empty_catalog_and_succeeds() {
    let dir = tempdir().expect("temp dir");
    let a_path = dir.path().join("a.sql");
    fs::write(&a_path, "CREATE TABLE A AS SELECT 1 AS x;").unwrap();
    let dag_path = dir.path().join("dag.dot");
    fs::write(
        &dag_path,
        format!(
            "digraph {{\n    0 [ label = \"{}\" type = \"query\" ]\n}}\n",
            a_path.display()
        ),
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_alphacheck"))
        .arg(&dag_path)
        .output()
        .expect("run alphacheck");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "expected exit 0, got: {stdout}");
    assert!(stdout.contains("OK"), "expected OK summary: {stdout}");
}
