//! Boolean reasoning over WHERE, HAVING and ON predicates.

/// Predicate atoms, literal values and the boolean tree above them.
pub mod atom;
/// DNF conversion under three-valued logic.
pub mod normalizer;
/// Verdicts and simplifications over normalized predicates.
pub mod oracle;
/// Kleene three-valued truth.
pub mod truth;

pub use atom::{Atom, AtomKind, ColumnResolver, CompareOp, Operand, Predicate, Scalar};
pub use normalizer::{
    normalize_model, Conjunction, Dnf, Literal, NormalizeOutcome, NormalizedPredicate,
    ScopePredicates,
};
pub use oracle::{analyze, Conflict, OracleReport, Simplification, Verdict};
pub use truth::Truth;
