use std::path::{Path, PathBuf};
use std::process::{Command, Output};

mod support;

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("should write temp file");
    path
}

fn sqlmisc(args: &[&Path], extra: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sqlmisc"))
        .args(args)
        .args(extra)
        .env_remove("RUST_LOG")
        .output()
        .expect("should run sqlmisc binary")
}

#[test]
fn clean_query_exits_zero_and_prints_a_report() {
    let temp = tempfile::tempdir().expect("temp dir");
    let query = write(temp.path(), "clean.sql", "SELECT dname FROM dept");
    let schema = support::fixture_dir("scott").join("schema.sql");

    let output = sqlmisc(&[&query, Path::new("--schema"), &schema], &[]);
    assert_eq!(output.status.code(), Some(0), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("# SQL Misconception Report"));
}

#[test]
fn syntax_errors_exit_one() {
    let temp = tempfile::tempdir().expect("temp dir");
    let query = write(temp.path(), "null.sql", "SELECT ename FROM emp WHERE comm = NULL");
    let schema = support::fixture_dir("scott").join("schema.sql");

    let output = sqlmisc(&[&query, Path::new("--schema"), &schema], &["--format", "json"]);
    assert_eq!(output.status.code(), Some(1), "{output:?}");
    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    let ids: Vec<u64> = json[0]["findings"]
        .as_array()
        .expect("findings array")
        .iter()
        .filter_map(|f| f["id"].as_u64())
        .collect();
    assert!(ids.contains(&21), "{ids:?}");
}

#[test]
fn unsupported_statements_exit_two_after_writing_outputs() {
    let temp = tempfile::tempdir().expect("temp dir");
    let query = write(temp.path(), "delete.sql", "DELETE FROM emp");
    let schema = support::fixture_dir("scott").join("schema.sql");
    let out = temp.path().join("out");

    let output = sqlmisc(
        &[&query, Path::new("--schema"), &schema, Path::new("--output-dir"), &out],
        &[],
    );
    assert_eq!(output.status.code(), Some(2), "{output:?}");
    let report = std::fs::read_to_string(out.join("delete_report.md")).expect("report written");
    assert!(report.contains("unsupported statement"));
    assert!(out.join("delete.json").exists());
}

#[test]
fn missing_schema_exits_two() {
    let temp = tempfile::tempdir().expect("temp dir");
    let query = write(temp.path(), "q.sql", "SELECT 1");
    let output = sqlmisc(&[&query], &[]);
    assert_eq!(output.status.code(), Some(2), "{output:?}");
    assert!(String::from_utf8_lossy(&output.stderr).contains("--schema"));
}

#[test]
fn solutions_and_sample_are_used() {
    let temp = tempfile::tempdir().expect("temp dir");
    let query = write(
        temp.path(),
        "attempt.sql",
        "SELECT ename FROM emp WHERE empno NOT IN (SELECT mgr FROM emp) ORDER BY ename",
    );
    let solution = write(
        temp.path(),
        "solution.sql",
        "SELECT ename FROM emp WHERE NOT EXISTS (SELECT * FROM emp m WHERE m.mgr = emp.empno)",
    );
    let schema = support::fixture_dir("scott").join("schema.sql");
    let sample = support::fixture_dir("scott").join("sample.json");

    let output = sqlmisc(
        &[
            &query,
            Path::new("--schema"),
            &schema,
            Path::new("--solution"),
            &solution,
            Path::new("--sample"),
            &sample,
        ],
        &["--format", "json"],
    );
    assert_eq!(output.status.code(), Some(0), "{output:?}");
    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    let findings = json[0]["findings"].as_array().expect("findings array");
    let null_in_subquery = findings
        .iter()
        .find(|f| f["id"] == 46)
        .expect("NULL in subquery");
    assert_eq!(null_in_subquery["confidence"], "definite");
    assert!(findings.iter().any(|f| f["id"] == 76), "{findings:?}");
}
