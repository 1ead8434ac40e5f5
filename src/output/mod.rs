/// Validates, deduplicates and orders the findings of one query.
pub mod aggregator;
/// Writes JSON results and the Markdown report to disk.
pub mod formatter;
/// Builds the Markdown report.
pub mod report;

use crate::engine::Outcome;
use crate::error::AnalysisError;

/// The result of one query, labeled for reporting.
#[derive(Debug, Clone)]
pub struct NamedOutcome {
    /// Label, usually the query's file name.
    pub name: String,
    /// What the engine returned.
    pub result: Result<Outcome, AnalysisError>,
}
