use std::fmt::{self, Write};

use crate::classifier::finding::Finding;
use crate::output::NamedOutcome;

/// Build a Markdown report with one section per analyzed query.
pub fn build_report(results: &[NamedOutcome]) -> String {
    let mut report = String::new();
    // Writing into a `String` cannot fail.
    let _ = write_report(&mut report, results);
    report
}

fn write_report(report: &mut String, results: &[NamedOutcome]) -> fmt::Result {
    writeln!(report, "# SQL Misconception Report")?;

    for named in results {
        writeln!(report)?;
        writeln!(report, "## {}", named.name)?;
        writeln!(report)?;

        let outcome = match &named.result {
            Ok(outcome) => outcome,
            Err(error) => {
                writeln!(report, "Analysis failed: {error}")?;
                continue;
            }
        };
        if let Some(parse_error) = &outcome.parse_error {
            writeln!(report, "The query did not parse ({parse_error}); only lexical checks ran.")?;
            writeln!(report)?;
        }

        let findings = &outcome.diagnostics.findings;
        if findings.is_empty() {
            writeln!(report, "No misconceptions found.")?;
        } else {
            writeln!(report, "| ID | Category | Severity | Confidence | Location | Message |")?;
            writeln!(report, "|----|----------|----------|------------|----------|---------|")?;
            for finding in findings {
                writeln!(
                    report,
                    "| {} | {} | {} | {} | {} | {} |",
                    finding.id,
                    finding.category.code(),
                    finding.severity,
                    finding.confidence,
                    finding.location,
                    cell(&message(finding))
                )?;
            }
        }

        let inconclusive = &outcome.diagnostics.inconclusive;
        if !inconclusive.is_empty() {
            writeln!(report)?;
            writeln!(report, "### Inconclusive")?;
            writeln!(report)?;
            for marker in inconclusive {
                writeln!(report, "- {marker}")?;
            }
        }
    }
    Ok(())
}

fn message(finding: &Finding) -> String {
    let mut text = format!("**{}**: {}", finding.title(), finding.message());
    for fact in &finding.evidence {
        write!(text, " ({fact})").ok();
    }
    text
}

fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::finding::{Inconclusive, Location};
    use crate::engine::Outcome;
    use crate::error::AnalysisError;
    use crate::output::aggregator::Diagnostics;

    #[test]
    fn report_lists_findings_failures_and_markers() {
        let results = vec![
            NamedOutcome {
                name: "q1.sql".to_string(),
                result: Ok(Outcome {
                    parse_error: None,
                    diagnostics: Diagnostics {
                        findings: vec![Finding::complication(88, Location::query())
                            .param("expression", "ename LIKE 'A|B'")],
                        inconclusive: vec![Inconclusive {
                            check: "many_duplicates".to_string(),
                            id: Some(49),
                            location: Location::query(),
                            reason: "no sample database configured".to_string(),
                        }],
                    },
                }),
            },
            NamedOutcome {
                name: "q2.sql".to_string(),
                result: Err(AnalysisError::UnsupportedStatement("DELETE".to_string())),
            },
            NamedOutcome {
                name: "q3.sql".to_string(),
                result: Ok(Outcome::default()),
            },
        ];
        let report = build_report(&results);
        assert!(report.starts_with("# SQL Misconception Report\n"));
        assert!(report.contains("| 88 | COM | info | definite | query |"));
        assert!(report.contains("A\\|B"));
        assert!(report.contains("- many_duplicates (query): no sample database configured"));
        assert!(report.contains("Analysis failed: unsupported statement: DELETE"));
        assert!(report.contains("## q3.sql\n\nNo misconceptions found."));
    }
}
