//! Read-only probes against a sample database.
//!
//! Some misconceptions depend on data rather than on the query: a `NOT IN`
//! subquery only misbehaves if it actually returns NULL, and duplicates only
//! matter if there are many. Checks describe what they need as a
//! [`ProbePlan`]; the sampler answers within row and time budgets and turns
//! every failure into an [`Inconclusive`] marker.

/// Sample rows held in memory.
pub mod memory;
/// Sample database reached through a `PostgreSQL` connection pool.
#[cfg(feature = "db")]
pub mod postgres;

use std::time::Duration;

use rayon::prelude::*;
use sqlparser::ast::Query;
use tracing::{debug, warn};

use crate::classifier::finding::{Finding, Inconclusive};
use crate::config::{EngineConfig, SamplerConfig};
use crate::error::SampleError;

pub use memory::InMemorySample;

/// Question asked of the sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    /// Does the single-column query return at least one NULL?
    NullInSubquery {
        /// The subquery.
        query: Query,
    },
    /// How many rows of the query's result repeat an earlier row?
    Duplicates {
        /// The query.
        query: Query,
    },
}

impl Probe {
    /// Probe query for a SQL engine, reading at most `limit + 1` rows of the
    /// probed query. Returns two counts: rows read and matching rows.
    pub fn sql(&self, limit: u64) -> String {
        let read = limit.saturating_add(1);
        match self {
            Probe::NullInSubquery { query } => format!(
                "SELECT COUNT(*) AS total, COUNT(*) FILTER (WHERE probe.v IS NULL) AS hits \
                 FROM (SELECT * FROM ({query}) AS src LIMIT {read}) AS probe(v)"
            ),
            Probe::Duplicates { query } => format!(
                "SELECT COUNT(*) AS total, COUNT(*) - COUNT(DISTINCT probe) AS hits \
                 FROM (SELECT * FROM ({query}) AS src LIMIT {read}) AS probe"
            ),
        }
    }

    /// Short name for logs and markers.
    pub fn kind(&self) -> &'static str {
        match self {
            Probe::NullInSubquery { .. } => "null-in-subquery",
            Probe::Duplicates { .. } => "duplicates",
        }
    }
}

/// Answer to a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeAnswer {
    /// Whether a NULL was found.
    NullPresent(bool),
    /// Number of duplicate rows.
    Duplicates(u64),
}

/// Limits applied to one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeBudget {
    /// Rows the probe may read.
    pub max_rows: u64,
    /// Wall-clock limit.
    pub timeout: Duration,
}

impl From<&SamplerConfig> for ProbeBudget {
    fn from(config: &SamplerConfig) -> Self {
        Self {
            max_rows: config.max_rows,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

/// A read-only source of sample rows.
pub trait SampleDatabase: Send + Sync {
    /// Short description for logs.
    fn describe(&self) -> String;

    /// Answer `probe` within `budget`.
    fn probe(&self, probe: &Probe, budget: ProbeBudget) -> Result<ProbeAnswer, SampleError>;
}

/// A data-dependent finding waiting for the sample's answer.
#[derive(Debug, Clone)]
pub struct ProbePlan {
    /// Check that planned the probe.
    pub check: &'static str,
    /// The question.
    pub probe: Probe,
    /// Finding to report when the answer confirms it.
    pub finding: Finding,
    /// Finding to report, with heuristic confidence, when no sample is configured.
    pub fallback: Option<Finding>,
}

/// Outcome of resolving one plan.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// The misconception is present.
    Confirmed(Finding),
    /// The sample shows the misconception is absent.
    Cleared,
    /// No verdict.
    Inconclusive(Inconclusive),
}

/// Resolve every plan against `sample`, in parallel.
pub fn resolve(
    plans: Vec<ProbePlan>,
    sample: Option<&dyn SampleDatabase>,
    config: &EngineConfig,
) -> Vec<ProbeOutcome> {
    let budget = ProbeBudget::from(&config.sampler);
    plans
        .into_par_iter()
        .map(|plan| resolve_one(plan, sample, budget, config.many_duplicates_threshold))
        .collect()
}

fn resolve_one(
    plan: ProbePlan,
    sample: Option<&dyn SampleDatabase>,
    budget: ProbeBudget,
    threshold: u64,
) -> ProbeOutcome {
    let Some(sample) = sample else {
        return match plan.fallback {
            Some(fallback) => ProbeOutcome::Confirmed(fallback.heuristic()),
            None => inconclusive(&plan, &SampleError::Unavailable),
        };
    };
    debug!(check = plan.check, probe = plan.probe.kind(), sample = %sample.describe(), "running probe");
    match sample.probe(&plan.probe, budget) {
        Ok(ProbeAnswer::NullPresent(true)) => ProbeOutcome::Confirmed(
            plan.finding
                .evidence(format!("the sample {} returns NULL", sample.describe())),
        ),
        Ok(ProbeAnswer::Duplicates(count)) if count >= threshold => ProbeOutcome::Confirmed(
            plan.finding
                .param("duplicates", count)
                .evidence(format!("{count} duplicate rows in the sample {}", sample.describe())),
        ),
        Ok(_) => ProbeOutcome::Cleared,
        Err(error) => {
            warn!(check = plan.check, probe = plan.probe.kind(), %error, "probe failed");
            inconclusive(&plan, &error)
        }
    }
}

fn inconclusive(plan: &ProbePlan, error: &SampleError) -> ProbeOutcome {
    ProbeOutcome::Inconclusive(Inconclusive {
        check: plan.check.to_string(),
        id: Some(plan.finding.id),
        location: plan.finding.location.clone(),
        reason: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::finding::{Confidence, Location};
    use crate::parser::sql_parser::parse_query;

    struct Fixed(Result<ProbeAnswer, SampleError>);

    impl SampleDatabase for Fixed {
        fn describe(&self) -> String {
            "fixed".to_string()
        }

        fn probe(&self, _: &Probe, _: ProbeBudget) -> Result<ProbeAnswer, SampleError> {
            self.0.clone()
        }
    }

    fn plan(fallback: bool) -> ProbePlan {
        let finding = Finding::semantic(46, Location::query());
        ProbePlan {
            check: "null_in_subquery",
            probe: Probe::NullInSubquery {
                query: parse_query("SELECT mgr FROM emp").expect("query"),
            },
            fallback: fallback.then(|| finding.clone()),
            finding,
        }
    }

    #[test]
    fn missing_sample_falls_back_or_is_inconclusive() {
        let config = EngineConfig::default();
        let resolved = resolve(vec![plan(true), plan(false)], None, &config);
        match &resolved[0] {
            ProbeOutcome::Confirmed(finding) => assert_eq!(finding.confidence, Confidence::Heuristic),
            other => panic!("expected heuristic finding, got {other:?}"),
        }
        assert!(matches!(resolved[1], ProbeOutcome::Inconclusive(_)));
    }

    #[test]
    fn sample_answers_decide_the_plan() {
        let config = EngineConfig::default();
        let yes = Fixed(Ok(ProbeAnswer::NullPresent(true)));
        let no = Fixed(Ok(ProbeAnswer::NullPresent(false)));
        let slow = Fixed(Err(SampleError::Timeout { timeout_ms: 5 }));
        let confirmed = resolve(vec![plan(true)], Some(&yes as &dyn SampleDatabase), &config);
        match &confirmed[0] {
            ProbeOutcome::Confirmed(finding) => assert_eq!(finding.confidence, Confidence::Definite),
            other => panic!("expected definite finding, got {other:?}"),
        }
        assert_eq!(resolve(vec![plan(true)], Some(&no as &dyn SampleDatabase), &config), vec![ProbeOutcome::Cleared]);
        match &resolve(vec![plan(true)], Some(&slow as &dyn SampleDatabase), &config)[0] {
            ProbeOutcome::Inconclusive(marker) => assert!(marker.reason.contains("5 ms")),
            other => panic!("expected inconclusive, got {other:?}"),
        }
    }

    #[test]
    fn probe_sql_wraps_the_query_with_a_limit() {
        let query = parse_query("SELECT mgr FROM emp").expect("query");
        let sql = Probe::NullInSubquery { query }.sql(100);
        assert!(sql.contains("FROM (SELECT mgr FROM emp) AS src LIMIT 101"));
        assert!(sql.contains("probe.v IS NULL"));
    }
}
