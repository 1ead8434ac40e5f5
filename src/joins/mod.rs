/// Missing, redundant and suspicious joins.
pub mod analysis;
/// Per-conjunction join graphs.
pub mod graph;

pub use analysis::{
    analyze_joins, analyze_scope, Disconnected, Excuse, JoinReport, RedundantJoin, SuspiciousJoin,
};
pub use graph::{build_graphs, EdgeKind, EdgeSource, GraphOutcome, JoinEdge, JoinGraph, Node};
