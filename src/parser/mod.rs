/// SQL expression helpers shared by the scope model, the normalizer and the checks.
pub mod expr;
/// Token-level facts gathered before parsing.
pub mod lexical;
/// Identifier and relation-name normalization helpers (schema-qualified names, quoted identifiers).
pub mod names;
/// Thin wrapper around `sqlparser` for query parsing.
pub mod sql_parser;
