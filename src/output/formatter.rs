use std::path::{Component, Path};

use serde::Serialize;

use crate::engine::Outcome;
use crate::error::OutputError;
use crate::output::{report, NamedOutcome};

#[derive(Serialize)]
struct Entry<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    outcome: Option<&'a Outcome>,
}

/// Serialize the results as a JSON array, one object per query.
pub fn to_json(results: &[NamedOutcome]) -> Result<String, OutputError> {
    let entries: Vec<Entry<'_>> = results
        .iter()
        .map(|named| match &named.result {
            Ok(outcome) => Entry {
                name: &named.name,
                error: None,
                outcome: Some(outcome),
            },
            Err(error) => Entry {
                name: &named.name,
                error: Some(error.to_string()),
                outcome: None,
            },
        })
        .collect();
    Ok(serde_json::to_string_pretty(&entries)?)
}

/// Write `{name}.json` and `{name}_report.md` into `output_dir`.
pub fn write_output(
    output_dir: &Path,
    name: &str,
    results: &[NamedOutcome],
) -> Result<(), OutputError> {
    validate_output_name(name)?;

    std::fs::create_dir_all(output_dir).map_err(|source| OutputError::Io {
        path: output_dir.display().to_string(),
        source,
    })?;

    let json_path = output_dir.join(format!("{name}.json"));
    std::fs::write(&json_path, to_json(results)?).map_err(|source| OutputError::Io {
        path: json_path.display().to_string(),
        source,
    })?;

    let report_path = output_dir.join(format!("{name}_report.md"));
    std::fs::write(&report_path, report::build_report(results)).map_err(|source| {
        OutputError::Io {
            path: report_path.display().to_string(),
            source,
        }
    })?;

    Ok(())
}

fn validate_output_name(name: &str) -> Result<(), OutputError> {
    let invalid = |reason| {
        Err(OutputError::InvalidName {
            name: name.to_string(),
            reason,
        })
    };
    if name.trim().is_empty() {
        return invalid("the name is empty");
    }
    let candidate = Path::new(name);
    if candidate.is_absolute() {
        return invalid("absolute paths are not allowed");
    }
    if candidate.components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    }) {
        return invalid("traversal segments are not allowed");
    }
    if name.contains('/') || name.contains('\\') {
        return invalid("path separators are not allowed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;

    fn results() -> Vec<NamedOutcome> {
        vec![
            NamedOutcome {
                name: "ok.sql".to_string(),
                result: Ok(Outcome::default()),
            },
            NamedOutcome {
                name: "bad.sql".to_string(),
                result: Err(AnalysisError::UnsupportedStatement("DELETE".to_string())),
            },
        ]
    }

    #[test]
    fn json_has_one_object_per_query() {
        let json: serde_json::Value =
            serde_json::from_str(&to_json(&results()).expect("json")).expect("valid json");
        assert_eq!(json[0]["name"], "ok.sql");
        assert_eq!(json[0]["findings"], serde_json::json!([]));
        assert!(json[0].get("error").is_none());
        assert_eq!(json[1]["error"], "unsupported statement: DELETE");
    }

    #[test]
    fn write_output_reports_directory_creation_errors() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("file");
        std::fs::write(&path, "not a directory").expect("should create marker file");

        let err = write_output(&path, "output", &results()).expect_err("directory creation should fail");
        assert!(matches!(err, OutputError::Io { .. }));
    }

    #[test]
    fn write_output_rejects_unsafe_names() {
        let dir = tempfile::tempdir().expect("temp dir");
        for name in ["nested/output", "../escape", " "] {
            let err = write_output(dir.path(), name, &results()).expect_err("unsafe name");
            assert!(err.to_string().starts_with("invalid output name"));
        }
    }

    #[test]
    fn write_output_writes_json_and_report() {
        let dir = tempfile::tempdir().expect("temp dir");
        write_output(dir.path(), "exercise", &results()).expect("write_output should succeed");

        let json = std::fs::read_to_string(dir.path().join("exercise.json")).expect("json file");
        let report =
            std::fs::read_to_string(dir.path().join("exercise_report.md")).expect("report file");
        assert!(json.contains("\"ok.sql\""));
        assert!(report.contains("## bad.sql"));
    }
}
