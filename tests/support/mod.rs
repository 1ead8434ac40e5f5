#![allow(dead_code)]

use std::path::PathBuf;

use sql_misconceptions::catalog::ddl::parse_schema;
use sql_misconceptions::catalog::SchemaCatalog;
use sql_misconceptions::classifier::finding::Finding;
use sql_misconceptions::sampler::InMemorySample;
use sql_misconceptions::{Analyzer, Outcome};

pub(crate) fn fixture_dir(fixture: &str) -> PathBuf {
    PathBuf::from("tests/fixtures").join(fixture)
}

pub(crate) fn read_fixture(fixture: &str, file: &str) -> String {
    let path = fixture_dir(fixture).join(file);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display()))
}

pub(crate) fn scott_catalog() -> SchemaCatalog {
    parse_schema(&read_fixture("scott", "schema.sql")).expect("fixture schema should parse")
}

pub(crate) fn scott_sample() -> InMemorySample {
    InMemorySample::from_json(&read_fixture("scott", "sample.json"))
        .expect("fixture sample should parse")
}

pub(crate) fn analyzer() -> Analyzer {
    Analyzer::new(scott_catalog())
}

pub(crate) fn analyzer_with_sample() -> Analyzer {
    analyzer().with_sample(Box::new(scott_sample()))
}

pub(crate) fn analyze(analyzer: &Analyzer, sql: &str) -> Outcome {
    analyzer
        .analyze::<&str>(sql, &[])
        .unwrap_or_else(|e| panic!("analysis of `{sql}` failed: {e}"))
}

pub(crate) fn ids(sql: &str) -> Vec<u16> {
    analyze(&analyzer(), sql).diagnostics.ids()
}

pub(crate) fn find(outcome: &Outcome, id: u16) -> Option<&Finding> {
    outcome.diagnostics.findings.iter().find(|f| f.id == id)
}
