//! The analysis pipeline for one query and for batches of queries.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sqlparser::ast::Query;
use tracing::{debug, debug_span, warn};

use crate::catalog::SchemaCatalog;
use crate::classifier::context::{Analysis, CheckContext};
use crate::classifier::finding::Inconclusive;
use crate::classifier::registry::{self, Emitted};
use crate::config::EngineConfig;
use crate::error::{AnalysisError, ParseFailure};
use crate::output::aggregator::{self, Diagnostics};
use crate::parser::sql_parser::{parse_query, ParsedQuery};
use crate::sampler::{self, ProbeOutcome, SampleDatabase};

/// Result of analyzing one query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Why the query text did not parse; only lexical checks ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
    /// Findings and inconclusive markers.
    #[serde(flatten)]
    pub diagnostics: Diagnostics,
}

/// Runs the checks against a schema and an optional sample database.
pub struct Analyzer {
    catalog: SchemaCatalog,
    config: EngineConfig,
    sample: Option<Box<dyn SampleDatabase>>,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("config", &self.config)
            .field("sample", &self.sample.as_ref().map(|sample| sample.describe()))
            .finish_non_exhaustive()
    }
}

impl Analyzer {
    /// Analyzer over `catalog` with default settings and no sample.
    pub fn new(catalog: SchemaCatalog) -> Self {
        Self {
            catalog,
            config: EngineConfig::default(),
            sample: None,
        }
    }

    /// Replace the settings.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Answer data-dependent checks from `sample`.
    #[must_use]
    pub fn with_sample(mut self, sample: Box<dyn SampleDatabase>) -> Self {
        self.sample = Some(sample);
        self
    }

    /// Settings in use.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Schema in use.
    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Analyze `sql`, comparing it with the reference `solutions` if any.
    ///
    /// Text that does not parse still gets the lexical checks; the parse
    /// error is recorded in the outcome. Statements other than queries are
    /// rejected.
    pub fn analyze<S: AsRef<str>>(
        &self,
        sql: &str,
        solutions: &[S],
    ) -> Result<Outcome, AnalysisError> {
        let parsed = ParsedQuery::parse(sql);
        let _span = debug_span!("analyze", statements = parsed.lexical.statement_count).entered();
        let mut emitted = registry::run_lexical(&parsed.lexical, &self.config);
        debug!(findings = emitted.len(), "lexical checks finished");

        let (parse_error, inconclusive) = match &parsed.ast {
            Ok(query) => {
                let (found, inconclusive) = self.analyze_query(&parsed, query, solutions);
                emitted.extend(found);
                (None, inconclusive)
            }
            Err(ParseFailure::NotAQuery(kind)) => {
                return Err(AnalysisError::UnsupportedStatement(kind.clone()));
            }
            Err(failure) => {
                debug!(%failure, "query did not parse");
                (Some(failure.to_string()), Vec::new())
            }
        };

        let diagnostics = aggregator::aggregate(emitted, inconclusive)?;
        Ok(Outcome {
            parse_error,
            diagnostics,
        })
    }

    /// Analyze every query of `queries` in parallel against the same solutions.
    pub fn analyze_batch<S: AsRef<str> + Sync>(
        &self,
        queries: &[S],
        solutions: &[S],
    ) -> Vec<Result<Outcome, AnalysisError>> {
        queries
            .par_iter()
            .map(|sql| self.analyze(sql.as_ref(), solutions))
            .collect()
    }

    fn analyze_query<S: AsRef<str>>(
        &self,
        parsed: &ParsedQuery,
        query: &Query,
        solutions: &[S],
    ) -> (Vec<Emitted>, Vec<Inconclusive>) {
        let analysis = Analysis::build(query, &self.catalog, &self.config);
        debug!(
            scopes = analysis.model.scopes.len(),
            variables = analysis.model.vars.len(),
            "query analyzed"
        );

        let solution_queries: Vec<Query> = solutions
            .iter()
            .filter_map(|solution| match parse_query(solution.as_ref()) {
                Ok(query) => Some(query),
                Err(error) => {
                    warn!(%error, "skipping reference solution that does not parse");
                    None
                }
            })
            .collect();
        let solution_analyses: Vec<Analysis<'_>> = solution_queries
            .iter()
            .map(|query| Analysis::build(query, &self.catalog, &self.config))
            .collect();

        let ctx = CheckContext {
            sql: &parsed.sql,
            lexical: &parsed.lexical,
            analysis: &analysis,
            catalog: &self.catalog,
            config: &self.config,
            solutions: &solution_analyses,
        };

        let mut inconclusive: Vec<Inconclusive> = analysis
            .inconclusive_budgets()
            .into_iter()
            .map(|(scope, budget)| {
                warn!(budget, "predicate exceeds the normalization budget");
                Inconclusive {
                    check: "normalizer".to_string(),
                    id: None,
                    location: ctx.at_scope(scope),
                    reason: format!(
                        "the predicate expands to more than {budget} conjunctions"
                    ),
                }
            })
            .collect();

        let (mut emitted, plans) = registry::run_query(&ctx);
        debug!(findings = emitted.len(), probes = plans.len(), "query checks finished");

        for outcome in sampler::resolve(plans, self.sample.as_deref(), &self.config) {
            match outcome {
                ProbeOutcome::Confirmed(finding) => emitted.push(Emitted {
                    check: "sampler",
                    finding,
                }),
                ProbeOutcome::Cleared => {}
                ProbeOutcome::Inconclusive(marker) => inconclusive.push(marker),
            }
        }
        (emitted, inconclusive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ddl::parse_schema;
    use crate::classifier::finding::Confidence;

    const SCHEMA: &str = "
        CREATE TABLE dept (deptno INT PRIMARY KEY, dname TEXT NOT NULL, loc TEXT);
        CREATE TABLE emp (
            empno INT PRIMARY KEY,
            ename TEXT NOT NULL,
            job TEXT,
            mgr INT REFERENCES emp (empno),
            sal NUMERIC NOT NULL,
            comm NUMERIC,
            deptno INT NOT NULL REFERENCES dept (deptno)
        );
    ";

    fn analyzer() -> Analyzer {
        Analyzer::new(parse_schema(SCHEMA).expect("schema"))
    }

    #[test]
    fn parse_failures_run_lexical_checks_only() {
        let outcome = analyzer()
            .analyze::<&str>("SELECT ename FROM emp WHERE (sal > 1000", &[])
            .expect("outcome");
        assert!(outcome.parse_error.is_some());
        assert_eq!(outcome.diagnostics.ids(), vec![34]);
    }

    #[test]
    fn other_statements_are_rejected() {
        let error = analyzer()
            .analyze::<&str>("DELETE FROM emp", &[])
            .expect_err("not a query");
        assert!(matches!(error, AnalysisError::UnsupportedStatement(_)));
    }

    #[test]
    fn null_probe_falls_back_without_a_sample() {
        let outcome = analyzer()
            .analyze::<&str>(
                "SELECT ename FROM emp WHERE empno NOT IN (SELECT mgr FROM emp)",
                &[],
            )
            .expect("outcome");
        let finding = outcome
            .diagnostics
            .findings
            .iter()
            .find(|f| f.id == 46)
            .expect("NULL in subquery");
        assert_eq!(finding.confidence, Confidence::Heuristic);
    }

    #[test]
    fn budget_overruns_are_inconclusive() {
        let config = EngineConfig {
            dnf_conjunction_budget: 2,
            ..EngineConfig::default()
        };
        let outcome = analyzer()
            .with_config(config)
            .analyze::<&str>(
                "SELECT ename FROM emp WHERE (sal > 1 OR comm > 1) AND (job = 'A' OR mgr = 1)",
                &[],
            )
            .expect("outcome");
        let overruns: Vec<_> = outcome
            .diagnostics
            .inconclusive
            .iter()
            .filter(|marker| marker.check == "normalizer")
            .collect();
        assert_eq!(overruns.len(), 1);
        assert!(overruns[0].reason.contains('2'), "{}", overruns[0].reason);
    }

    #[test]
    fn batches_keep_query_order() {
        let queries = [
            "SELECT ename FROM emp WHERE sal > 1000 AND sal < 500",
            "DELETE FROM emp",
            "SELECT dname FROM dept",
        ];
        let results = analyzer().analyze_batch(&queries, &[]);
        assert_eq!(results.len(), 3);
        assert!(results[0].as_ref().expect("first").diagnostics.ids().contains(&40));
        assert!(results[1].is_err());
        assert!(results[2].as_ref().expect("third").diagnostics.findings.is_empty());
    }
}
