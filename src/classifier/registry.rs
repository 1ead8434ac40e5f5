use std::sync::LazyLock;

use rayon::prelude::*;
use tracing::debug;

use crate::classifier::checks::{complications, lexical, schema, semantic, solutions};
use crate::classifier::context::CheckContext;
use crate::classifier::finding::Finding;
use crate::config::EngineConfig;
use crate::parser::lexical::LexicalFacts;
use crate::sampler::ProbePlan;

/// How a check consumes the query.
#[derive(Clone, Copy)]
pub enum CheckKind {
    /// Token-level facts only; runs even when the query does not parse.
    Lexical(fn(&LexicalFacts) -> Vec<Finding>),
    /// The analyzed query.
    Query(fn(&CheckContext<'_, '_>) -> Vec<Finding>),
    /// The analyzed query, with findings that depend on sampled data.
    Sampled(fn(&CheckContext<'_, '_>) -> Vec<ProbePlan>),
}

impl std::fmt::Debug for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckKind::Lexical(_) => write!(f, "Lexical"),
            CheckKind::Query(_) => write!(f, "Query"),
            CheckKind::Sampled(_) => write!(f, "Sampled"),
        }
    }
}

/// One registered check.
#[derive(Debug, Clone, Copy)]
pub struct CheckRecord {
    /// Catalog IDs the check may report.
    pub ids: &'static [u16],
    /// Name used in logs and inconclusive markers.
    pub name: &'static str,
    /// Entry point.
    pub kind: CheckKind,
}

impl CheckRecord {
    const fn lexical(
        ids: &'static [u16],
        name: &'static str,
        check: fn(&LexicalFacts) -> Vec<Finding>,
    ) -> Self {
        Self {
            ids,
            name,
            kind: CheckKind::Lexical(check),
        }
    }

    const fn query(
        ids: &'static [u16],
        name: &'static str,
        check: fn(&CheckContext<'_, '_>) -> Vec<Finding>,
    ) -> Self {
        Self {
            ids,
            name,
            kind: CheckKind::Query(check),
        }
    }

    const fn sampled(
        ids: &'static [u16],
        name: &'static str,
        check: fn(&CheckContext<'_, '_>) -> Vec<ProbePlan>,
    ) -> Self {
        Self {
            ids,
            name,
            kind: CheckKind::Sampled(check),
        }
    }

    /// False when every ID of the check is disabled.
    pub fn is_enabled(&self, config: &EngineConfig) -> bool {
        self.ids.iter().any(|id| !config.is_disabled(*id))
    }
}

/// Every check, built once per process.
pub static REGISTRY: LazyLock<Vec<CheckRecord>> = LazyLock::new(|| {
    vec![
        // Token level.
        CheckRecord::lexical(&[22, 38], "semicolons", lexical::semicolons),
        CheckRecord::lexical(&[34], "brackets", lexical::brackets),
        CheckRecord::lexical(&[37], "nonstandard_operators", lexical::nonstandard_operators),
        CheckRecord::lexical(&[36], "nonstandard_keywords", lexical::nonstandard_keywords),
        CheckRecord::lexical(&[32], "keyword_syntax", lexical::keyword_syntax),
        CheckRecord::lexical(&[35], "misapplied_is", lexical::misapplied_is),
        CheckRecord::lexical(&[33], "list_commas", lexical::list_commas),
        CheckRecord::lexical(&[19, 24, 30], "clause_sequence", lexical::clause_sequence),
        // Names and types.
        CheckRecord::query(&[1], "repeated_correlation_names", schema::repeated_correlation_names),
        CheckRecord::query(&[33], "select_list_commas", schema::select_list_commas),
        CheckRecord::query(&[2, 4, 9, 25, 27], "column_references", schema::column_references),
        CheckRecord::query(&[7, 8, 9], "relation_references", schema::relation_references),
        CheckRecord::query(&[5], "undefined_functions", schema::undefined_functions),
        CheckRecord::query(&[6], "undefined_parameters", schema::undefined_parameters),
        CheckRecord::query(&[11, 13], "comparison_types", schema::comparison_types),
        CheckRecord::query(&[12], "operator_without_column", schema::operator_without_column),
        CheckRecord::query(&[14, 15, 16, 17], "grouping", schema::grouping),
        CheckRecord::query(&[20], "missing_from", schema::missing_from),
        CheckRecord::query(&[21], "null_comparisons", schema::null_comparisons),
        CheckRecord::query(&[23], "date_literals", schema::date_literals),
        CheckRecord::query(&[26], "subquery_width", schema::subquery_width),
        CheckRecord::query(&[28, 29], "misplaced_conditions", schema::misplaced_conditions),
        // Semantic errors.
        CheckRecord::query(&[39, 40, 45, 50], "predicate_verdicts", semantic::predicate_verdicts),
        CheckRecord::query(&[41], "distinct_in_sum", semantic::distinct_in_sum),
        CheckRecord::query(&[43, 44], "wildcards", semantic::wildcards),
        CheckRecord::sampled(&[46], "null_in_subquery", semantic::null_in_subquery),
        CheckRecord::query(&[47, 48], "join_connectivity", semantic::join_connectivity),
        CheckRecord::sampled(&[49], "many_duplicates", semantic::many_duplicates),
        CheckRecord::query(&[51], "duplicate_outputs", semantic::duplicate_outputs),
        // Differences from a reference solution.
        CheckRecord::query(&[52, 53, 54, 55, 57, 65, 66, 67, 68, 69], "solution_conditions", solutions::conditions),
        CheckRecord::query(&[58, 59, 60, 61, 62], "solution_joins", solutions::joins),
        CheckRecord::query(&[70, 71, 72, 73], "solution_outputs", solutions::outputs),
        CheckRecord::query(&[74, 75, 76, 77], "solution_ordering", solutions::ordering),
        CheckRecord::query(&[78, 79, 80, 81], "solution_aggregates", solutions::aggregates),
        // Complications.
        CheckRecord::query(&[82, 87], "simplifications", complications::simplifications),
        CheckRecord::query(&[83], "unnecessary_distinct", complications::unnecessary_distinct),
        CheckRecord::query(&[84], "unnecessary_joins", complications::unnecessary_joins),
        CheckRecord::query(&[85], "unused_correlation_names", complications::unused_correlation_names),
        CheckRecord::query(&[86], "identical_correlation_names", complications::identical_correlation_names),
        CheckRecord::query(&[88], "like_without_wildcards", complications::like_without_wildcards),
        CheckRecord::query(&[89, 94, 100], "subquery_clutter", complications::subquery_clutter),
        CheckRecord::query(&[90], "replaceable_subqueries", complications::replaceable_subqueries),
        CheckRecord::query(&[91, 92, 93], "aggregate_arguments", complications::aggregate_arguments),
        CheckRecord::query(&[95, 96, 97, 101], "grouping_complications", complications::grouping),
        CheckRecord::query(&[98, 102], "unions", complications::unions),
        CheckRecord::query(&[99], "ordering_columns", complications::ordering_columns),
        CheckRecord::query(&[103], "movable_conditions", complications::movable_conditions),
        CheckRecord::query(&[104, 105], "outer_joins", complications::outer_joins),
        CheckRecord::query(&[106], "derived_tables", complications::derived_tables),
    ]
});

/// A finding together with the check that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Emitted {
    /// Producing check.
    pub check: &'static str,
    /// The finding.
    pub finding: Finding,
}

fn emitted(check: &'static str, findings: Vec<Finding>, config: &EngineConfig) -> Vec<Emitted> {
    findings
        .into_iter()
        .filter(|finding| !config.is_disabled(finding.id))
        .map(|finding| Emitted { check, finding })
        .collect()
}

/// Run the enabled lexical checks.
pub fn run_lexical(facts: &LexicalFacts, config: &EngineConfig) -> Vec<Emitted> {
    REGISTRY
        .par_iter()
        .filter(|record| record.is_enabled(config))
        .flat_map_iter(|record| match record.kind {
            CheckKind::Lexical(check) => emitted(record.name, check(facts), config),
            CheckKind::Query(_) | CheckKind::Sampled(_) => Vec::new(),
        })
        .collect()
}

/// Run the enabled query and sampled checks, in parallel.
pub fn run_query(ctx: &CheckContext<'_, '_>) -> (Vec<Emitted>, Vec<ProbePlan>) {
    let config = ctx.config;
    let (findings, plans): (Vec<Vec<Emitted>>, Vec<Vec<ProbePlan>>) = REGISTRY
        .par_iter()
        .filter(|record| record.is_enabled(config))
        .map(|record| match record.kind {
            CheckKind::Lexical(_) => (Vec::new(), Vec::new()),
            CheckKind::Query(check) => {
                let found = check(ctx);
                debug!(check = record.name, findings = found.len(), "check finished");
                (emitted(record.name, found, config), Vec::new())
            }
            CheckKind::Sampled(check) => {
                let plans = check(ctx)
                    .into_iter()
                    .filter(|plan| !config.is_disabled(plan.finding.id))
                    .collect();
                (Vec::new(), plans)
            }
        })
        .unzip();
    (
        findings.into_iter().flatten().collect(),
        plans.into_iter().flatten().collect(),
    )
}
