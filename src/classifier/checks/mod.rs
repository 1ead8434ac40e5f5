/// Complications (COM): correct but needlessly complicated queries.
pub mod complications;
/// Token-level syntax checks (SYN) that run even when parsing fails.
pub mod lexical;
/// Name resolution, typing and grouping errors (SYN).
pub mod schema;
/// Semantic errors (SEM) from the oracle, the join graph and the sample.
pub mod semantic;
/// Differences from reference solutions (LOG).
pub mod solutions;

use std::collections::BTreeMap;

use sqlparser::ast::{BinaryOperator, Expr, Ident, JoinConstraint, SelectItem};

use crate::classifier::context::CheckContext;
use crate::classifier::finding::Location;
use crate::logic::oracle::constant_columns;
use crate::logic::{Atom, AtomKind, Conjunction, Literal, NormalizedPredicate, Scalar, Verdict};
use crate::parser::expr::unnest;
use crate::parser::lexical::Clause;
use crate::parser::names::ident_key;
use crate::parser::sql_parser::expression_span;
use crate::query::{ColumnKey, QueryModel, ScopeId, SelectScope, VarId};

/// Projection items that are expressions, with their aliases.
pub(crate) fn projection<'q>(scope: &SelectScope<'q>) -> Vec<(&'q Expr, Option<&'q Ident>)> {
    scope
        .select
        .projection
        .iter()
        .filter_map(|item| match item {
            SelectItem::UnnamedExpr(expr) => Some((expr, None)),
            SelectItem::ExprWithAlias { expr, alias } => Some((expr, Some(alias))),
            _ => None,
        })
        .collect()
}

/// True when the SELECT list has `*` or `var.*`.
pub(crate) fn has_wildcard(scope: &SelectScope<'_>) -> bool {
    scope.select.projection.iter().any(|item| {
        matches!(
            item,
            SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..)
        )
    })
}

/// Every expression of a scope with its clause. Subqueries are not entered.
pub(crate) fn scope_exprs<'q>(
    model: &QueryModel<'q>,
    scope: &SelectScope<'q>,
) -> Vec<(Clause, &'q Expr)> {
    let mut exprs: Vec<(Clause, &'q Expr)> = projection(scope)
        .into_iter()
        .map(|(expr, _)| (Clause::Select, expr))
        .collect();
    for var in &scope.vars {
        if let Some(JoinConstraint::On(on)) = model.var(*var).constraint {
            exprs.push((Clause::From, on));
        }
    }
    if let Some(selection) = &scope.select.selection {
        exprs.push((Clause::Where, selection));
    }
    exprs.extend(scope.group_by().iter().map(|e| (Clause::GroupBy, e)));
    if let Some(having) = &scope.select.having {
        exprs.push((Clause::Having, having));
    }
    exprs.extend(scope.order_by().iter().map(|o| (Clause::OrderBy, &o.expr)));
    exprs
}

/// The only disjunct of a normalized predicate.
pub(crate) fn sole_conjunction<'p>(predicate: &'p NormalizedPredicate<'_>) -> Option<&'p Conjunction> {
    match predicate.outcome.dnf()?.conjunctions.as_slice() {
        [only] => Some(only),
        _ => None,
    }
}

/// Display text of a literal: the atom, with `NOT` for negative literals.
pub(crate) fn literal_text(predicate: &NormalizedPredicate<'_>, literal: Literal) -> String {
    let atom = &predicate.atoms[literal.atom];
    let text = &atom.text;
    if literal.positive {
        return text.clone();
    }
    match &atom.kind {
        AtomKind::IsNull(_) => match text.strip_suffix(" IS NULL") {
            Some(operand) => format!("{operand} IS NOT NULL"),
            None => format!("NOT ({text})"),
        },
        AtomKind::InList { .. } | AtomKind::InSubquery { .. } if text.contains(" IN ") => {
            text.replacen(" IN ", " NOT IN ", 1)
        }
        AtomKind::Like { case_insensitive, .. } => {
            let keyword = if *case_insensitive { " ILIKE " } else { " LIKE " };
            text.replacen(keyword, &format!(" NOT{keyword}"), 1)
        }
        AtomKind::Exists(_) => format!("NOT {text}"),
        _ => format!("NOT ({text})"),
    }
}

/// Display text of a conjunction.
pub(crate) fn conjunction_text(predicate: &NormalizedPredicate<'_>, conjunction: &Conjunction) -> String {
    conjunction
        .iter()
        .map(|literal| literal_text(predicate, *literal))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Location of a literal: the whole source expression of its atom, shown as
/// the literal reads (`comm IS NOT NULL` rather than `comm IS NULL`).
pub(crate) fn at_literal(
    ctx: &CheckContext<'_, '_>,
    predicate: &NormalizedPredicate<'_>,
    literal: Literal,
) -> Location {
    let atom = &predicate.atoms[literal.atom];
    Location::new(
        Some(atom.clause),
        expression_span(ctx.sql, atom.expr),
        literal_text(predicate, literal),
    )
}

/// Location of a whole predicate: its first source expression.
pub(crate) fn at_predicate(ctx: &CheckContext<'_, '_>, predicate: &NormalizedPredicate<'_>) -> Location {
    match predicate.sources.first() {
        Some((clause, expr)) => ctx.at_expr(Some(*clause), expr),
        None => ctx.at_scope(predicate.scope),
    }
}

/// Display text of a whole predicate.
pub(crate) fn predicate_text(predicate: &NormalizedPredicate<'_>) -> String {
    predicate
        .sources
        .iter()
        .map(|(_, expr)| expr.to_string())
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Columns that the WHERE clause of `scope` fixes to the same constant in
/// every satisfiable disjunct. `None` when the filter is missing, not
/// normalized or never variable.
pub(crate) fn shared_constants(
    ctx: &CheckContext<'_, '_>,
    scope: ScopeId,
) -> Option<BTreeMap<ColumnKey, Scalar>> {
    let filter = ctx.analysis.predicates[scope].filter.as_ref()?;
    let report = ctx.analysis.oracle[scope].filter.as_ref()?;
    if report.formula != Verdict::Variable {
        return None;
    }
    let dnf = filter.outcome.dnf()?;
    let mut shared: Option<BTreeMap<ColumnKey, Scalar>> = None;
    for (conjunction, verdicts) in dnf.conjunctions.iter().zip(&report.conjunctions) {
        if verdicts.verdict != Verdict::Variable {
            continue;
        }
        let constants = constant_columns(filter, conjunction);
        shared = Some(match shared {
            None => constants,
            Some(mut so_far) => {
                so_far.retain(|key, value| constants.get(key) == Some(value));
                so_far
            }
        });
    }
    shared
}

/// True when the columns of `exprs`, together with the columns WHERE fixes
/// to constants, contain a key of `var`.
pub(crate) fn covers_key(
    ctx: &CheckContext<'_, '_>,
    scope: &SelectScope<'_>,
    var: VarId,
    exprs: &[&Expr],
) -> bool {
    let model = ctx.model();
    if model.is_single_row_var(var) {
        return true;
    }
    let Some(relation) = model.relation_of(var) else {
        return false;
    };
    let mut columns: Vec<String> = exprs
        .iter()
        .filter_map(|expr| model.resolve_expr(scope.id, expr))
        .filter(|column| column.key.var == var)
        .map(|column| column.key.column)
        .collect();
    if let Some(constants) = shared_constants(ctx, scope.id) {
        columns.extend(
            constants
                .into_keys()
                .filter(|key| key.var == var)
                .map(|key| key.column),
        );
    }
    let names: Vec<&str> = columns.iter().map(String::as_str).collect();
    relation.is_key(&names)
}

/// True when the SELECT list of `scope` contains a key of `var`, directly
/// or through `*`.
pub(crate) fn output_has_key(ctx: &CheckContext<'_, '_>, scope: &SelectScope<'_>, var: VarId) -> bool {
    let name = &ctx.model().var(var).name;
    let starred = scope.select.projection.iter().any(|item| match item {
        SelectItem::Wildcard(_) => true,
        SelectItem::QualifiedWildcard(object, _) => {
            object.0.last().map(ident_key).as_ref() == Some(name)
        }
        _ => false,
    });
    if starred && ctx.model().relation_of(var).is_some_and(|r| r.keys().next().is_some()) {
        return true;
    }
    let exprs: Vec<&Expr> = projection(scope).into_iter().map(|(expr, _)| expr).collect();
    covers_key(ctx, scope, var, &exprs)
}

/// True when the literal cannot be TRUE while `key` is NULL.
pub(crate) fn rejects_null(atom: &Atom<'_>, positive: bool, key: &ColumnKey) -> bool {
    if !atom.columns().iter().any(|column| &column.key == key) {
        return false;
    }
    match &atom.kind {
        AtomKind::IsNull(_) => !positive,
        AtomKind::Compare { .. }
        | AtomKind::InList { .. }
        | AtomKind::InSubquery { .. }
        | AtomKind::Quantified { .. }
        | AtomKind::Like { .. } => true,
        _ => false,
    }
}

/// True when every disjunct of `predicate` rejects rows where `key` is NULL.
pub(crate) fn filter_rejects_null(predicate: &NormalizedPredicate<'_>, key: &ColumnKey) -> bool {
    predicate.outcome.dnf().is_some_and(|dnf| {
        !dnf.conjunctions.is_empty()
            && dnf.conjunctions.iter().all(|conjunction| {
                conjunction
                    .iter()
                    .any(|literal| rejects_null(&predicate.atoms[literal.atom], literal.positive, key))
            })
    })
}

/// Operands of a top-level AND chain.
pub(crate) fn conjuncts(expr: &Expr) -> Vec<&Expr> {
    match unnest(expr) {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            let mut parts = conjuncts(left);
            parts.extend(conjuncts(right));
            parts
        }
        other => vec![other],
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use sqlparser::ast::Query;

    use crate::catalog::ddl::parse_schema;
    use crate::catalog::SchemaCatalog;
    use crate::classifier::context::{Analysis, CheckContext};
    use crate::classifier::finding::Finding;
    use crate::config::EngineConfig;
    use crate::parser::lexical::{scan, LexicalFacts};
    use crate::parser::sql_parser::parse_query;

    pub const SCHEMA: &str = "
        CREATE TABLE dept (deptno INTEGER PRIMARY KEY, dname TEXT NOT NULL, loc TEXT);
        CREATE TABLE emp (
            empno INTEGER PRIMARY KEY,
            ename TEXT,
            job TEXT,
            mgr INTEGER REFERENCES emp,
            hiredate DATE,
            sal NUMERIC,
            comm NUMERIC,
            deptno INTEGER NOT NULL REFERENCES dept
        );
        CREATE TABLE salgrade (grade INTEGER PRIMARY KEY, losal NUMERIC, hisal NUMERIC);
    ";

    pub struct Fixture {
        pub catalog: SchemaCatalog,
        pub config: EngineConfig,
        pub sql: String,
        pub lexical: LexicalFacts,
        pub query: Query,
        pub solutions: Vec<Query>,
    }

    impl Fixture {
        pub fn new(sql: &str) -> Self {
            Self::with_solutions(sql, &[])
        }

        pub fn with_solutions(sql: &str, solutions: &[&str]) -> Self {
            Self {
                catalog: parse_schema(SCHEMA).expect("schema"),
                config: EngineConfig::default(),
                sql: sql.to_string(),
                lexical: scan(sql),
                query: parse_query(sql).expect("query"),
                solutions: solutions
                    .iter()
                    .map(|s| parse_query(s).expect("solution"))
                    .collect(),
            }
        }

        /// Run one check over the fixture.
        pub fn run(&self, check: fn(&CheckContext<'_, '_>) -> Vec<Finding>) -> Vec<Finding> {
            let analysis = Analysis::build(&self.query, &self.catalog, &self.config);
            let solutions: Vec<Analysis<'_>> = self
                .solutions
                .iter()
                .map(|q| Analysis::build(q, &self.catalog, &self.config))
                .collect();
            let ctx = CheckContext {
                sql: &self.sql,
                lexical: &self.lexical,
                analysis: &analysis,
                catalog: &self.catalog,
                config: &self.config,
                solutions: &solutions,
            };
            check(&ctx)
        }

        /// IDs reported by one check.
        pub fn ids(&self, check: fn(&CheckContext<'_, '_>) -> Vec<Finding>) -> Vec<u16> {
            self.run(check).iter().map(|f| f.id).collect()
        }
    }
}
