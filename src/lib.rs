//! Detect misconceptions in SQL queries: tautologies and contradictions,
//! missing joins, NULL pitfalls, needless complications, and differences
//! from a reference solution.
#![warn(missing_docs)]

/// Relations, columns and keys the queries are checked against.
pub mod catalog;
/// Misconception catalog, checks and the registry that runs them.
pub mod classifier;
/// Engine settings loaded from defaults, TOML and the environment.
pub mod config;
/// Single-query and batch analysis pipeline.
pub mod engine;
/// Error types.
pub mod error;
/// Join graphs per disjunct: missing and redundant joins.
pub mod joins;
/// Three-valued predicate atoms, DNF normalization and the consistency oracle.
pub mod logic;
/// Aggregation of findings, JSON output and the Markdown report.
pub mod output;
/// SQL parsing, lexical facts and expression helpers.
pub mod parser;
/// Scopes, tuple variables and column resolution.
pub mod query;
/// Read-only probes against a sample database.
pub mod sampler;

pub use engine::{Analyzer, Outcome};
