use serde::{Deserialize, Serialize};
use std::fmt;

use crate::classifier::catalog::{self, Category, Severity};
use crate::parser::lexical::Clause;
use crate::parser::sql_parser::SourceSpan;

/// How certain a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Follows from the heuristic fallback or from sampled data.
    Heuristic,
    /// Follows from the query and the schema alone.
    Definite,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Heuristic => write!(f, "heuristic"),
            Confidence::Definite => write!(f, "definite"),
        }
    }
}

/// Where a finding points.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Clause of the offending construct, if it belongs to one.
    pub clause: Option<Clause>,
    /// Source position; unknown spans sort first.
    pub span: SourceSpan,
    /// The offending text.
    pub snippet: String,
}

impl Location {
    /// Location of `snippet` at `span` inside `clause`.
    pub fn new(clause: Option<Clause>, span: SourceSpan, snippet: impl Into<String>) -> Self {
        Self {
            clause,
            span,
            snippet: snippet.into(),
        }
    }

    /// Location of the query as a whole.
    pub fn query() -> Self {
        Self::default()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.clause, self.span.is_unknown()) {
            (Some(clause), false) => write!(f, "{clause} at {}", self.span),
            (Some(clause), true) => write!(f, "{clause}"),
            (None, false) => write!(f, "{}", self.span),
            (None, true) => write!(f, "query"),
        }
    }
}

/// One detected misconception.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Catalog ID.
    pub id: u16,
    /// Catalog category, as claimed by the emitting check.
    pub category: Category,
    /// Where it occurs.
    pub location: Location,
    /// Severity.
    pub severity: Severity,
    /// Certainty.
    pub confidence: Confidence,
    /// Message template parameters, in insertion order.
    pub params: Vec<(String, String)>,
    /// Supporting facts (implying atoms, sampled counts, ...).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<String>,
}

impl Finding {
    fn new(id: u16, category: Category, location: Location) -> Self {
        Self {
            id,
            category,
            location,
            severity: category.severity(),
            confidence: Confidence::Definite,
            params: Vec::new(),
            evidence: Vec::new(),
        }
    }

    /// A syntax finding.
    pub fn syntax(id: u16, location: Location) -> Self {
        Self::new(id, Category::Syntax, location)
    }

    /// A semantic finding.
    pub fn semantic(id: u16, location: Location) -> Self {
        Self::new(id, Category::Semantic, location)
    }

    /// A finding from the comparison with a reference solution.
    pub fn logical(id: u16, location: Location) -> Self {
        Self::new(id, Category::Logical, location)
    }

    /// A complication finding.
    pub fn complication(id: u16, location: Location) -> Self {
        Self::new(id, Category::Complication, location)
    }

    /// Add a template parameter.
    #[must_use]
    pub fn param(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.params.push((name.to_string(), value.to_string()));
        self
    }

    /// Add a piece of evidence.
    #[must_use]
    pub fn evidence(mut self, fact: impl Into<String>) -> Self {
        self.evidence.push(fact.into());
        self
    }

    /// Mark the finding as heuristic.
    #[must_use]
    pub fn heuristic(mut self) -> Self {
        self.confidence = Confidence::Heuristic;
        self
    }

    /// Value of a template parameter.
    pub fn param_value(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Catalog title; empty for an unknown ID.
    pub fn title(&self) -> &'static str {
        catalog::lookup(self.id).map_or("", |entry| entry.title)
    }

    /// Message rendered from the catalog template.
    pub fn message(&self) -> String {
        catalog::lookup(self.id)
            .map(|entry| catalog::render(entry.template, &self.params))
            .unwrap_or_default()
    }
}

/// A check that could not reach a verdict.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Inconclusive {
    /// Name of the check or analysis stage.
    pub check: String,
    /// Misconception the check would have reported, if it is a single one.
    pub id: Option<u16>,
    /// Where the undecided construct is.
    pub location: Location,
    /// Why no verdict was reached.
    pub reason: String,
}

impl fmt::Display for Inconclusive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.check, self.location, self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_take_severity_from_the_category() {
        let finding = Finding::syntax(4, Location::query()).param("column", "enam");
        assert_eq!(finding.severity, Severity::Error);
        assert_eq!(finding.message(), "column `enam` does not exist");
        assert_eq!(finding.title(), "Undefined column");

        let complication = Finding::complication(88, Location::query()).heuristic();
        assert_eq!(complication.severity, Severity::Info);
        assert_eq!(complication.confidence, Confidence::Heuristic);
    }

    #[test]
    fn locations_display_clause_and_position() {
        let span = SourceSpan {
            start_line: 1,
            start_column: 8,
            end_line: 1,
            end_column: 12,
        };
        assert_eq!(
            Location::new(Some(Clause::Where), span, "x").to_string(),
            "WHERE at 1:8"
        );
        assert_eq!(Location::query().to_string(), "query");
    }
}
