use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_types::BigInt;
use tracing::debug;

use crate::config::SamplerConfig;
use crate::error::SampleError;
use crate::sampler::{Probe, ProbeAnswer, ProbeBudget, SampleDatabase};

#[derive(QueryableByName)]
struct ProbeRow {
    #[diesel(sql_type = BigInt)]
    total: i64,
    #[diesel(sql_type = BigInt)]
    hits: i64,
}

/// A sample database behind a pool of `PostgreSQL` connections.
///
/// Every probe runs in its own read-only transaction with a local
/// `statement_timeout`, and reads at most one row more than the budget.
pub struct PostgresSample {
    pool: Pool<ConnectionManager<PgConnection>>,
    url_host: String,
}

impl PostgresSample {
    /// Open a pool of at most `config.pool_size` connections to `url`.
    pub fn connect(url: &str, config: &SamplerConfig) -> Result<Self, SampleError> {
        let manager = ConnectionManager::<PgConnection>::new(url);
        let pool = Pool::builder()
            .max_size(config.pool_size.max(1))
            .connection_timeout(config.timeout())
            .build(manager)
            .map_err(|e| SampleError::Connection(e.to_string()))?;
        let url_host = url
            .rsplit('@')
            .next()
            .unwrap_or(url)
            .to_string();
        Ok(Self { pool, url_host })
    }
}

impl SampleDatabase for PostgresSample {
    fn describe(&self) -> String {
        format!("postgres ({})", self.url_host)
    }

    fn probe(&self, probe: &Probe, budget: ProbeBudget) -> Result<ProbeAnswer, SampleError> {
        let timeout_ms = u64::try_from(budget.timeout.as_millis()).unwrap_or(u64::MAX);
        let mut conn = self
            .pool
            .get()
            .map_err(|e| SampleError::Connection(e.to_string()))?;
        let sql = probe.sql(budget.max_rows);
        debug!(probe = probe.kind(), %sql, "sampling");
        let row = conn
            .build_transaction()
            .read_only()
            .run(|conn| {
                diesel::sql_query(format!("SET LOCAL statement_timeout = {timeout_ms}"))
                    .execute(conn)?;
                diesel::sql_query(&sql).get_result::<ProbeRow>(conn)
            })
            .map_err(|error| classify(&error, timeout_ms))?;
        answer(
            probe,
            u64::try_from(row.total).unwrap_or(0),
            u64::try_from(row.hits).unwrap_or(0),
            budget.max_rows,
        )
    }
}

/// Turn the counts read within the budget into an answer.
///
/// A NULL seen among the rows read settles the question even when more rows
/// remain; a count of duplicates over a truncated result does not.
fn answer(probe: &Probe, total: u64, hits: u64, max_rows: u64) -> Result<ProbeAnswer, SampleError> {
    match probe {
        Probe::NullInSubquery { .. } if hits > 0 => Ok(ProbeAnswer::NullPresent(true)),
        _ if total > max_rows => Err(SampleError::RowBudgetExhausted { limit: max_rows }),
        Probe::NullInSubquery { .. } => Ok(ProbeAnswer::NullPresent(false)),
        Probe::Duplicates { .. } => Ok(ProbeAnswer::Duplicates(hits)),
    }
}

fn classify(error: &diesel::result::Error, timeout_ms: u64) -> SampleError {
    let message = error.to_string();
    if message.contains("statement timeout") {
        SampleError::Timeout { timeout_ms }
    } else {
        SampleError::Query(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::sql_parser::parse_query;

    fn nulls() -> Probe {
        Probe::NullInSubquery {
            query: parse_query("SELECT mgr FROM emp").expect("query"),
        }
    }

    #[test]
    fn null_found_before_the_budget_runs_out_is_an_answer() {
        assert_eq!(answer(&nulls(), 11, 1, 10), Ok(ProbeAnswer::NullPresent(true)));
        assert_eq!(
            answer(&nulls(), 11, 0, 10),
            Err(SampleError::RowBudgetExhausted { limit: 10 })
        );
        assert_eq!(answer(&nulls(), 10, 0, 10), Ok(ProbeAnswer::NullPresent(false)));
    }

    #[test]
    fn truncated_duplicate_counts_exhaust_the_budget() {
        let probe = Probe::Duplicates {
            query: parse_query("SELECT deptno FROM emp").expect("query"),
        };
        assert_eq!(
            answer(&probe, 11, 4, 10),
            Err(SampleError::RowBudgetExhausted { limit: 10 })
        );
        assert_eq!(answer(&probe, 10, 4, 10), Ok(ProbeAnswer::Duplicates(4)));
    }
}
