use sql_misconceptions::classifier::catalog::Category;
use sql_misconceptions::classifier::finding::{Confidence, Finding, Location};
use sql_misconceptions::classifier::registry::Emitted;
use sql_misconceptions::config::EngineConfig;
use sql_misconceptions::error::AnalysisError;
use sql_misconceptions::output::aggregator;

mod support;

#[test]
fn missing_join_is_anchored_at_the_unjoined_variable() {
    let outcome = support::analyze(
        &support::analyzer(),
        "SELECT e.ename FROM emp e, dept d, salgrade s WHERE e.deptno = d.deptno",
    );
    let missing: Vec<&Finding> = outcome
        .diagnostics
        .findings
        .iter()
        .filter(|f| f.id == 48)
        .collect();
    assert_eq!(missing.len(), 1, "{:?}", outcome.diagnostics.findings);
    assert_eq!(missing[0].location.snippet, "salgrade s");
    assert_eq!(missing[0].param_value("variable"), Some("s"));
}

#[test]
fn self_join_through_the_manager_key_is_not_a_missing_join() {
    let ids = support::ids("SELECT e.ename FROM emp e, emp m WHERE e.mgr = m.empno");
    assert!(!ids.contains(&48), "{ids:?}");
}

#[test]
fn subsumed_disjunct_is_reported_as_a_simplification() {
    let outcome = support::analyze(
        &support::analyzer(),
        "SELECT ename FROM emp WHERE sal > 500 OR sal > 700",
    );
    let simplification = support::find(&outcome, 82).expect("simplifiable expression");
    assert_eq!(simplification.location.snippet, "sal > 700");
}

#[test]
fn null_in_subquery_is_definite_with_a_sample_and_heuristic_without() {
    let sql = "SELECT ename FROM emp WHERE empno NOT IN (SELECT mgr FROM emp)";

    let sampled = support::analyze(&support::analyzer_with_sample(), sql);
    let finding = support::find(&sampled, 46).expect("NULL in subquery");
    assert_eq!(finding.confidence, Confidence::Definite);
    assert!(!finding.evidence.is_empty());

    let unsampled = support::analyze(&support::analyzer(), sql);
    let finding = support::find(&unsampled, 46).expect("NULL in subquery");
    assert_eq!(finding.confidence, Confidence::Heuristic);
}

#[test]
fn sample_without_nulls_clears_the_subquery() {
    let outcome = support::analyze(
        &support::analyzer_with_sample(),
        "SELECT dname FROM dept WHERE deptno NOT IN (SELECT mgr FROM emp WHERE job = 'SALESMAN')",
    );
    assert!(support::find(&outcome, 46).is_none());
}

#[test]
fn many_duplicates_depend_on_the_threshold() {
    let sql = "SELECT job FROM emp";
    let default = support::analyze(&support::analyzer_with_sample(), sql);
    assert!(support::find(&default, 49).is_none());

    let strict = support::analyzer()
        .with_config(EngineConfig {
            many_duplicates_threshold: 3,
            ..EngineConfig::default()
        })
        .with_sample(Box::new(support::scott_sample()));
    let outcome = support::analyze(&strict, sql);
    let finding = support::find(&outcome, 49).expect("many duplicates");
    assert_eq!(finding.param_value("duplicates"), Some("5"));
}

#[test]
fn repeated_runs_are_identical() {
    let analyzer = support::analyzer_with_sample();
    let sql = "SELECT DISTINCT e.ename, e.ename FROM emp e, dept d \
               WHERE e.sal > 1000 AND e.sal < 500 OR e.comm = NULL";
    let first = support::analyze(&analyzer, sql);
    let second = support::analyze(&analyzer, sql);
    assert_eq!(first, second);
    assert!(!first.diagnostics.findings.is_empty());
}

#[test]
fn findings_are_ordered_by_category_first() {
    let outcome = support::analyze(
        &support::analyzer(),
        "SELECT ename FROM emp WHERE ename LIKE 'KING' AND comm = NULL",
    );
    let categories: Vec<Category> = outcome
        .diagnostics
        .findings
        .iter()
        .map(|f| f.category)
        .collect();
    let mut sorted = categories.clone();
    sorted.sort();
    assert_eq!(categories, sorted);
    assert!(support::find(&outcome, 21).is_some());
    assert!(support::find(&outcome, 88).is_some());
}

#[test]
fn the_same_finding_from_two_checks_is_reported_once() {
    let location = Location::query();
    let emitted = vec![
        Emitted {
            check: "first",
            finding: Finding::semantic(40, location.clone()).param("detail", "x"),
        },
        Emitted {
            check: "second",
            finding: Finding::semantic(40, location).param("detail", "x"),
        },
    ];
    let diagnostics = aggregator::aggregate(emitted, Vec::new()).expect("valid findings");
    assert_eq!(diagnostics.ids(), vec![40]);
}

#[test]
fn reference_solutions_drive_logical_findings() {
    let outcome = support::analyzer()
        .analyze(
            "SELECT ename FROM emp WHERE job = 'CLERK' OR sal > 1000",
            &["SELECT ename FROM emp WHERE job = 'CLERK' AND sal > 1000"],
        )
        .expect("outcome");
    assert_eq!(
        outcome
            .diagnostics
            .findings
            .iter()
            .filter(|f| f.category == Category::Logical)
            .map(|f| f.id)
            .collect::<Vec<_>>(),
        vec![52]
    );
}

#[test]
fn write_statements_are_rejected_per_query() {
    let results = support::analyzer().analyze_batch(
        &["UPDATE emp SET sal = 1", "SELECT dname FROM dept"],
        &[],
    );
    assert!(matches!(results[0], Err(AnalysisError::UnsupportedStatement(_))));
    assert!(results[1].is_ok());
}

#[test]
fn disabled_checks_are_silent() {
    let sql = "SELECT ename FROM emp WHERE comm = NULL";
    assert!(support::ids(sql).contains(&21));
    let quiet = support::analyzer().with_config(EngineConfig {
        disabled_checks: vec![21],
        ..EngineConfig::default()
    });
    assert!(!support::analyze(&quiet, sql).diagnostics.ids().contains(&21));
}

#[test]
fn predicate_findings_quote_the_whole_literal_as_written() {
    let outcome = support::analyze(
        &support::analyzer(),
        "SELECT ename FROM emp WHERE comm IS NOT NULL AND comm > 0",
    );
    let redundant = support::find(&outcome, 45).expect("redundant IS NOT NULL");
    assert_eq!(redundant.location.snippet, "comm IS NOT NULL");
    assert_eq!(redundant.location.span.start_column, 29);
    assert_eq!(redundant.location.span.end_column, 45);

    let outcome = support::analyze(
        &support::analyzer(),
        "SELECT ename FROM emp WHERE comm NOT IN (1, NULL)",
    );
    let contradiction = support::find(&outcome, 40).expect("never true");
    assert_eq!(contradiction.location.snippet, "comm NOT IN (1, NULL)");
    assert_eq!(contradiction.location.span.start_column, 29);
    assert_eq!(contradiction.location.span.end_column, 50);
}

#[test]
fn repeated_conditions_are_simplifications() {
    let outcome = support::analyze(
        &support::analyzer(),
        "SELECT ename FROM emp WHERE deptno = 10 OR deptno = 10",
    );
    let finding = support::find(&outcome, 82).expect("repeated disjunct");
    assert_eq!(
        finding.param_value("detail"),
        Some("`deptno = 10` is already covered by `deptno = 10`")
    );

    let outcome = support::analyze(
        &support::analyzer(),
        "SELECT ename FROM emp WHERE deptno = 10 AND deptno = 10",
    );
    let finding = support::find(&outcome, 82).expect("repeated conjunct");
    assert_eq!(
        finding.param_value("detail"),
        Some("`deptno = 10` is implied by `deptno = 10`")
    );
}

#[test]
fn conditions_that_only_need_a_value_are_not_simplifications() {
    for sql in [
        "SELECT ename FROM emp WHERE sal > 10 AND sal IN (SELECT losal FROM salgrade)",
        "SELECT ename FROM emp WHERE sal > 10 OR sal IN (SELECT losal FROM salgrade)",
        "SELECT e.ename FROM emp e, emp m \
         WHERE e.sal > 1 AND m.sal > 1 AND e.sal = m.sal AND e.mgr = m.empno",
    ] {
        let ids = support::ids(sql);
        assert!(!ids.contains(&82), "{sql}: {ids:?}");
    }
}
