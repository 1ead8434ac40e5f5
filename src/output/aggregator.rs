use serde::{Deserialize, Serialize};

use crate::classifier::catalog;
use crate::classifier::finding::{Finding, Inconclusive};
use crate::classifier::registry::Emitted;
use crate::error::AnalysisError;

/// Final, ordered result of one analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Findings ordered by category, ID, position and snippet.
    pub findings: Vec<Finding>,
    /// Checks that reached no verdict.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inconclusive: Vec<Inconclusive>,
}

impl Diagnostics {
    /// True when some finding has severity `error`.
    pub fn has_errors(&self) -> bool {
        self.findings
            .iter()
            .any(|finding| finding.severity == catalog::Severity::Error)
    }

    /// IDs of the findings, in order.
    pub fn ids(&self) -> Vec<u16> {
        self.findings.iter().map(|finding| finding.id).collect()
    }
}

fn validate(emitted: &Emitted) -> Result<(), AnalysisError> {
    let finding = &emitted.finding;
    let entry = catalog::lookup(finding.id).ok_or_else(|| AnalysisError::UnknownMisconception {
        id: finding.id,
        check: emitted.check.to_string(),
    })?;
    if entry.category != finding.category {
        return Err(AnalysisError::CategoryMismatch {
            id: finding.id,
            found: finding.category.code().to_string(),
            expected: entry.category.code().to_string(),
        });
    }
    Ok(())
}

/// Validate, deduplicate and order the findings of one query.
///
/// Two findings with the same ID at the same location are one finding; the
/// definite one wins over a heuristic one.
pub fn aggregate(
    emitted: Vec<Emitted>,
    mut inconclusive: Vec<Inconclusive>,
) -> Result<Diagnostics, AnalysisError> {
    for item in &emitted {
        validate(item)?;
    }
    let mut findings: Vec<Finding> = emitted.into_iter().map(|item| item.finding).collect();
    findings.sort_by(|a, b| {
        (a.category, a.id, &a.location.span, &a.location.snippet, &a.location.clause)
            .cmp(&(b.category, b.id, &b.location.span, &b.location.snippet, &b.location.clause))
            .then_with(|| b.confidence.cmp(&a.confidence))
    });
    findings.dedup_by(|later, kept| later.id == kept.id && later.location == kept.location);

    inconclusive.sort();
    inconclusive.dedup();
    Ok(Diagnostics {
        findings,
        inconclusive,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::catalog::Category;
    use crate::classifier::finding::{Confidence, Location};
    use crate::parser::lexical::Clause;
    use crate::parser::sql_parser::SourceSpan;

    fn at(line: u64, column: u64, snippet: &str) -> Location {
        let span = SourceSpan {
            start_line: line,
            start_column: column,
            end_line: line,
            end_column: column + 1,
        };
        Location::new(Some(Clause::Where), span, snippet)
    }

    fn emit(finding: Finding) -> Emitted {
        Emitted {
            check: "test",
            finding,
        }
    }

    #[test]
    fn orders_by_category_then_id_then_position() {
        let diagnostics = aggregate(
            vec![
                emit(Finding::complication(88, at(1, 5, "a"))),
                emit(Finding::semantic(40, at(2, 1, "b"))),
                emit(Finding::syntax(21, at(1, 9, "c"))),
                emit(Finding::semantic(40, at(1, 1, "d"))),
                emit(Finding::logical(66, Location::query())),
            ],
            Vec::new(),
        )
        .expect("valid findings");
        let order: Vec<(u16, &str)> = diagnostics
            .findings
            .iter()
            .map(|f| (f.id, f.location.snippet.as_str()))
            .collect();
        assert_eq!(order, vec![(21, "c"), (40, "d"), (40, "b"), (66, ""), (88, "a")]);
    }

    #[test]
    fn duplicates_collapse_to_the_definite_finding() {
        let diagnostics = aggregate(
            vec![
                emit(Finding::semantic(46, at(1, 1, "x")).heuristic()),
                emit(Finding::semantic(46, at(1, 1, "x"))),
                emit(Finding::semantic(46, at(3, 1, "x"))),
            ],
            Vec::new(),
        )
        .expect("valid findings");
        assert_eq!(diagnostics.ids(), vec![46, 46]);
        assert_eq!(diagnostics.findings[0].confidence, Confidence::Definite);
    }

    #[test]
    fn unknown_ids_and_wrong_categories_are_rejected() {
        let mut unknown = Finding::semantic(40, Location::query());
        unknown.id = 107;
        assert_eq!(
            aggregate(vec![emit(unknown)], Vec::new()),
            Err(AnalysisError::UnknownMisconception {
                id: 107,
                check: "test".to_string()
            })
        );

        let mut mislabeled = Finding::semantic(40, Location::query());
        mislabeled.category = Category::Syntax;
        assert!(matches!(
            aggregate(vec![emit(mislabeled)], Vec::new()),
            Err(AnalysisError::CategoryMismatch { id: 40, .. })
        ));
    }

    #[test]
    fn aggregation_is_idempotent() {
        let findings = vec![
            emit(Finding::semantic(40, at(2, 1, "b"))),
            emit(Finding::syntax(21, at(1, 9, "c"))),
        ];
        let once = aggregate(findings, Vec::new()).expect("valid findings");
        let again = aggregate(
            once.findings.iter().cloned().map(emit).collect(),
            once.inconclusive.clone(),
        )
        .expect("valid findings");
        assert_eq!(once, again);
    }
}
