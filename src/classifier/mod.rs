/// The fixed catalog of 106 misconceptions with their categories and message templates.
pub mod catalog;
/// The checks, grouped by the kind of reasoning they need.
pub mod checks;
/// Per-query analysis shared by the checks.
pub mod context;
/// Findings, locations and inconclusive markers.
pub mod finding;
/// Process-wide table of checks and the parallel runner.
pub mod registry;
