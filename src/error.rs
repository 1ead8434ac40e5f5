use thiserror::Error;

/// Fatal error for the analysis of a single query.
///
/// Expected conditions (schema misses, sampler failures, normalization
/// overruns) never surface here; they become findings or inconclusive markers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// A checker emitted a misconception ID that is not in the catalog.
    #[error("checker `{check}` emitted unknown misconception id {id}")]
    UnknownMisconception {
        /// Offending ID.
        id: u16,
        /// Name of the check that produced it.
        check: String,
    },
    /// A finding carried a category different from its catalog entry.
    #[error("misconception {id} reported as {found} but cataloged as {expected}")]
    CategoryMismatch {
        /// Misconception ID.
        id: u16,
        /// Category code on the finding.
        found: String,
        /// Category code in the catalog.
        expected: String,
    },
    /// The statement handed to the engine is not a query.
    #[error("unsupported statement: {0}")]
    UnsupportedStatement(String),
    /// The AST violates a structural assumption of the engine.
    #[error("malformed AST: {0}")]
    MalformedAst(String),
}

/// Error while building a [`crate::catalog::SchemaCatalog`].
#[derive(Debug, Error)]
pub enum CatalogError {
    /// DDL text failed to parse.
    #[error("failed to parse schema DDL: {0}")]
    Ddl(#[from] sqlparser::parser::ParserError),
    /// Catalog JSON was malformed.
    #[error("invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The same relation was declared twice.
    #[error("relation `{0}` is declared more than once")]
    DuplicateRelation(String),
    /// A key or foreign key names a column the relation does not have.
    #[error("relation `{relation}` has no column `{column}`")]
    UnknownColumn {
        /// Relation being declared.
        relation: String,
        /// Missing column.
        column: String,
    },
    /// Live introspection failed.
    #[error("catalog introspection failed: {0}")]
    Introspection(String),
}

/// Error raised by a sample-database probe.
///
/// The engine turns every variant into an inconclusive marker for the
/// dependent check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SampleError {
    /// No sample database was configured.
    #[error("no sample database configured")]
    Unavailable,
    /// The probe read more rows than allowed.
    #[error("row budget of {limit} rows exhausted")]
    RowBudgetExhausted {
        /// Configured row limit.
        limit: u64,
    },
    /// The probe ran past its deadline.
    #[error("probe exceeded its {timeout_ms} ms time budget")]
    Timeout {
        /// Configured timeout.
        timeout_ms: u64,
    },
    /// Connecting to the sample database failed.
    #[error("sample connection failed: {0}")]
    Connection(String),
    /// The sample cannot answer this kind of probe.
    #[error("probe not supported by this sample: {0}")]
    Unsupported(String),
    /// The probe query itself failed.
    #[error("sample query failed: {0}")]
    Query(String),
}

/// Error returned when query text cannot be turned into an AST.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    /// The SQL parser rejected the text.
    #[error("SQL parse error: {0}")]
    Syntax(String),
    /// The text holds no statement.
    #[error("no SQL statement found")]
    Empty,
    /// The text holds more than one statement.
    #[error("expected a single statement, found {0}")]
    MultipleStatements(usize),
    /// The statement is not a query.
    #[error("statement is not a query: {0}")]
    NotAQuery(String),
}

/// Error while writing results to disk.
#[derive(Debug, Error)]
pub enum OutputError {
    /// The output name would escape the output directory.
    #[error("invalid output name '{name}': {reason}")]
    InvalidName {
        /// Rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// Creating the directory or writing a file failed.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Path being written.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Results could not be serialized.
    #[error("failed to serialize results: {0}")]
    Json(#[from] serde_json::Error),
}
