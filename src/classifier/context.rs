use sqlparser::ast::{Expr, Query};

use crate::catalog::SchemaCatalog;
use crate::classifier::finding::Location;
use crate::config::EngineConfig;
use crate::joins::{analyze_joins, JoinReport};
use crate::logic::normalizer::{normalize_model, NormalizedPredicate, ScopePredicates};
use crate::logic::oracle::{analyze, OracleReport};
use crate::parser::lexical::{Clause, LexicalFacts};
use crate::parser::sql_parser::expression_span;
use crate::query::{QueryModel, ScopeId, VarId};

/// Oracle reports of the predicates of one scope, parallel to [`ScopePredicates`].
#[derive(Debug, Clone, Default)]
pub struct ScopeOracle {
    /// WHERE plus inner ON conditions.
    pub filter: Option<OracleReport>,
    /// HAVING.
    pub having: Option<OracleReport>,
    /// Each outer-join ON condition, in the order of `ScopePredicates::outer_joins`.
    pub outer_joins: Vec<Option<OracleReport>>,
}

/// Everything derived from one query before the checks run.
#[derive(Debug)]
pub struct Analysis<'q> {
    /// The query.
    pub query: &'q Query,
    /// Scopes, variables and resolved column references.
    pub model: QueryModel<'q>,
    /// Normalized predicates, indexed by scope.
    pub predicates: Vec<ScopePredicates<'q>>,
    /// Oracle verdicts, indexed by scope.
    pub oracle: Vec<ScopeOracle>,
    /// Join findings, indexed by scope.
    pub joins: Vec<JoinReport>,
}

impl<'q> Analysis<'q> {
    /// Run the scope model, normalizer, oracle and join analysis in sequence.
    pub fn build(query: &'q Query, catalog: &'q SchemaCatalog, config: &EngineConfig) -> Self {
        let model = QueryModel::build(query, catalog);
        let predicates = normalize_model(&model, config.dnf_conjunction_budget);
        let oracle = predicates
            .iter()
            .map(|scope| ScopeOracle {
                filter: scope.filter.as_ref().and_then(analyze),
                having: scope.having.as_ref().and_then(analyze),
                outer_joins: scope
                    .outer_joins
                    .iter()
                    .map(|(_, predicate)| analyze(predicate))
                    .collect(),
            })
            .collect();
        let joins = analyze_joins(&model, &predicates);
        Self {
            query,
            model,
            predicates,
            oracle,
            joins,
        }
    }

    /// Every normalized predicate with its oracle report.
    pub fn reports(&self) -> Vec<(&NormalizedPredicate<'q>, Option<&OracleReport>)> {
        let mut out = Vec::new();
        for (predicates, oracle) in self.predicates.iter().zip(&self.oracle) {
            if let Some(filter) = &predicates.filter {
                out.push((filter, oracle.filter.as_ref()));
            }
            if let Some(having) = &predicates.having {
                out.push((having, oracle.having.as_ref()));
            }
            for (index, (_, on)) in predicates.outer_joins.iter().enumerate() {
                out.push((on, oracle.outer_joins.get(index).and_then(Option::as_ref)));
            }
        }
        out
    }

    /// Budgets of predicates that were left unnormalized.
    pub fn inconclusive_budgets(&self) -> Vec<(ScopeId, usize)> {
        self.predicates
            .iter()
            .flat_map(|scope| scope.all())
            .filter_map(|predicate| match predicate.outcome {
                crate::logic::NormalizeOutcome::Inconclusive { budget } => {
                    Some((predicate.scope, budget))
                }
                crate::logic::NormalizeOutcome::Normalized(_) => None,
            })
            .collect()
    }
}

/// Immutable inputs shared by every query check.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a, 'q> {
    /// Query text.
    pub sql: &'a str,
    /// Token-level facts.
    pub lexical: &'a LexicalFacts,
    /// The analyzed query.
    pub analysis: &'a Analysis<'q>,
    /// Schema.
    pub catalog: &'q SchemaCatalog,
    /// Engine settings.
    pub config: &'a EngineConfig,
    /// Reference solutions of the exercise, if any.
    pub solutions: &'a [Analysis<'q>],
}

impl<'a, 'q> CheckContext<'a, 'q> {
    /// Scope model of the query.
    pub fn model(&self) -> &'a QueryModel<'q> {
        &self.analysis.model
    }

    /// Location of an expression.
    pub fn at_expr(&self, clause: Option<Clause>, expr: &Expr) -> Location {
        Location::new(clause, expression_span(self.sql, expr), expr.to_string())
    }

    /// Location of a tuple variable's declaration.
    pub fn at_var(&self, var: VarId) -> Location {
        let tuple = self.analysis.model.var(var);
        let snippet = match (tuple.object, tuple.alias) {
            (Some(object), Some(alias)) => format!("{object} {alias}"),
            (Some(object), None) => object.to_string(),
            (None, Some(alias)) => alias.to_string(),
            (None, None) => tuple.name.clone(),
        };
        Location::new(Some(Clause::From), tuple.span, snippet)
    }

    /// Location of a whole SELECT block.
    pub fn at_scope(&self, scope: ScopeId) -> Location {
        let scope = self.analysis.model.scope(scope);
        Location::new(Some(Clause::Select), scope.span, first_line(&scope.select.to_string()))
    }
}

fn first_line(text: &str) -> String {
    const LIMIT: usize = 80;
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > LIMIT {
        let cut: String = line.chars().take(LIMIT).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}
