use sql_misconceptions::classifier::finding::{Finding, Inconclusive, Location};
use sql_misconceptions::error::AnalysisError;
use sql_misconceptions::output::aggregator::Diagnostics;
use sql_misconceptions::output::{report, NamedOutcome};
use sql_misconceptions::parser::lexical::Clause;
use sql_misconceptions::parser::sql_parser::SourceSpan;
use sql_misconceptions::Outcome;

mod support;

fn where_span() -> SourceSpan {
    SourceSpan {
        start_line: 1,
        start_column: 29,
        end_line: 1,
        end_column: 53,
    }
}

#[test]
fn markdown_report_layout() {
    let results = vec![
        NamedOutcome {
            name: "contradiction.sql".to_string(),
            result: Ok(Outcome {
                parse_error: None,
                diagnostics: Diagnostics {
                    findings: vec![Finding::semantic(
                        40,
                        Location::new(Some(Clause::Where), where_span(), "sal > 1000 AND sal < 500"),
                    )
                    .param("detail", "`sal > 1000 AND sal < 500` leaves no possible value")],
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
            name: "delete.sql".to_string(),
            result: Err(AnalysisError::UnsupportedStatement("DELETE".to_string())),
        },
        NamedOutcome {
            name: "clean.sql".to_string(),
            result: Ok(Outcome::default()),
        },
    ];

    insta::assert_snapshot!(report::build_report(&results).trim_end(), @r"
    # SQL Misconception Report

    ## contradiction.sql

    | ID | Category | Severity | Confidence | Location | Message |
    |----|----------|----------|------------|----------|---------|
    | 40 | SEM | warning | definite | WHERE at 1:29 | **Tautological or inconsistent expression**: `sal > 1000 AND sal < 500` leaves no possible value |

    ### Inconclusive

    - many_duplicates (query): no sample database configured

    ## delete.sql

    Analysis failed: unsupported statement: DELETE

    ## clean.sql

    No misconceptions found.
    ");
}

#[test]
fn engine_report_mentions_every_query() {
    let analyzer = support::analyzer();
    let queries = ["SELECT ename FROM emp WHERE comm = NULL", "SELECT ename FROM emp WHERE (sal > 1"];
    let results: Vec<NamedOutcome> = analyzer
        .analyze_batch(&queries, &[])
        .into_iter()
        .zip(["null.sql", "broken.sql"])
        .map(|(result, name)| NamedOutcome {
            name: name.to_string(),
            result,
        })
        .collect();
    let text = report::build_report(&results);
    assert!(text.contains("## null.sql"));
    assert!(text.contains("| 21 | SYN | error | definite |"));
    assert!(text.contains("The query did not parse"));
}
