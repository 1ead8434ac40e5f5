//! Differences between the query and the closest reference solution.
//!
//! Both queries are reduced to a [`Profile`] of their main SELECT block, in
//! which column references read `relation.column` so that correlation names
//! do not matter. The solution with the fewest differences is the one
//! compared against.

use std::collections::BTreeSet;

use sqlparser::ast::{BinaryOperator, Expr, OrderByExpr, Query, UnaryOperator, Value};

use crate::classifier::checks::{conjuncts, has_wildcard, projection};
use crate::classifier::context::{Analysis, CheckContext};
use crate::classifier::finding::Finding;
use crate::logic::CompareOp;
use crate::parser::expr::{
    canonical_text, column_idents, column_refs, function_has_distinct, function_has_wildcard,
    function_args, is_aggregate_call, is_constant, normalized_function_name, unnest, walk_expr,
};
use crate::parser::lexical::Clause;
use crate::parser::names::ident_key;
use crate::query::{QueryModel, ScopeId, SelectScope, VarId};

#[derive(Debug, Clone, Copy, Default)]
struct Render {
    strip_not: bool,
    mask_columns: bool,
    unquote: bool,
}

fn relation_label(model: &QueryModel<'_>, var: VarId) -> String {
    let tuple = model.var(var);
    tuple.relation_name().unwrap_or(&tuple.name).to_string()
}

fn column_label(model: &QueryModel<'_>, scope: ScopeId, expr: &Expr) -> Option<String> {
    let column = model.resolve_expr(scope, expr)?;
    Some(format!(
        "{}.{}",
        relation_label(model, column.key.var),
        column.key.column
    ))
}

fn not(negated: bool) -> &'static str {
    if negated {
        "NOT "
    } else {
        ""
    }
}

fn canonical_query(query: &Query) -> String {
    query
        .to_string()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Text of `expr` with columns written as `relation.column`.
fn render(model: &QueryModel<'_>, scope: ScopeId, expr: &Expr, mode: Render) -> String {
    let inner = Render {
        strip_not: false,
        ..mode
    };
    let sub = |e: &Expr| render(model, scope, e, inner);
    let flip = |negated: bool| not(negated && !mode.strip_not);
    let expr = unnest(expr);
    if column_idents(expr).is_some() {
        if mode.mask_columns {
            return "?".to_string();
        }
        return column_label(model, scope, expr).unwrap_or_else(|| canonical_text(expr));
    }
    match expr {
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr,
        } if mode.strip_not => sub(expr),
        Expr::UnaryOp { op, expr } => format!("{op} {}", sub(expr)),
        Expr::BinaryOp { left, op, right } => match CompareOp::from_binary(op) {
            Some(compare) if is_constant(left) && !is_constant(right) => {
                format!("({} {} {})", sub(right), compare.mirror(), sub(left))
            }
            _ => format!("({} {op} {})", sub(left), sub(right)),
        },
        Expr::IsNull(operand) => format!("{} IS NULL", sub(operand)),
        Expr::IsNotNull(operand) => format!("{} IS {}NULL", sub(operand), flip(true)),
        Expr::InList {
            expr,
            list,
            negated,
        } => format!(
            "{} {}IN ({})",
            sub(expr),
            flip(*negated),
            list.iter().map(sub).collect::<Vec<_>>().join(", ")
        ),
        Expr::InSubquery {
            expr,
            subquery,
            negated,
        } => format!(
            "{} {}IN ({})",
            sub(expr),
            flip(*negated),
            canonical_query(subquery)
        ),
        Expr::Exists { subquery, negated } => {
            format!("{}EXISTS ({})", flip(*negated), canonical_query(subquery))
        }
        Expr::Between {
            expr,
            negated,
            low,
            high,
        } => format!(
            "{} {}BETWEEN {} AND {}",
            sub(expr),
            flip(*negated),
            sub(low),
            sub(high)
        ),
        Expr::Like {
            negated,
            expr,
            pattern,
            ..
        } => format!("{} {}LIKE {}", sub(expr), flip(*negated), sub(pattern)),
        Expr::ILike {
            negated,
            expr,
            pattern,
            ..
        } => format!("{} {}ILIKE {}", sub(expr), flip(*negated), sub(pattern)),
        Expr::Function(func) => {
            let args = if function_has_wildcard(func) {
                "*".to_string()
            } else {
                function_args(func)
                    .into_iter()
                    .map(sub)
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let distinct = if function_has_distinct(func) {
                "DISTINCT "
            } else {
                ""
            };
            format!("{}({distinct}{args})", normalized_function_name(func))
        }
        Expr::Value(Value::SingleQuotedString(text)) if mode.unquote => text.clone(),
        Expr::Value(Value::Number(text, _)) => text.clone(),
        other => canonical_text(other),
    }
}

fn signature(model: &QueryModel<'_>, scope: ScopeId, expr: &Expr) -> String {
    render(model, scope, expr, Render::default())
}

fn is_negated(expr: &Expr) -> bool {
    matches!(
        unnest(expr),
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            ..
        } | Expr::IsNotNull(_)
            | Expr::InList { negated: true, .. }
            | Expr::InSubquery { negated: true, .. }
            | Expr::Exists { negated: true, .. }
            | Expr::Between { negated: true, .. }
            | Expr::Like { negated: true, .. }
            | Expr::ILike { negated: true, .. }
    )
}

fn is_negated_subquery(expr: &Expr) -> bool {
    match unnest(expr) {
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr,
        } => matches!(unnest(expr), Expr::InSubquery { .. } | Expr::Exists { .. }),
        Expr::InSubquery { negated, .. } | Expr::Exists { negated, .. } => *negated,
        _ => false,
    }
}

fn join_operands(expr: &Expr) -> Option<(&Expr, CompareOp, &Expr)> {
    match unnest(expr) {
        Expr::BinaryOp { left, op, right } => {
            CompareOp::from_binary(op).map(|op| (left.as_ref(), op, right.as_ref()))
        }
        _ => None,
    }
}

/// A WHERE or HAVING conjunct.
#[derive(Debug)]
struct Condition<'q> {
    expr: &'q Expr,
    clause: Clause,
    sig: String,
    core: String,
    shape: String,
    loose: String,
    negated: bool,
    columns: BTreeSet<String>,
    disjuncts: Vec<String>,
}

/// A comparison between columns of two tuple variables.
#[derive(Debug)]
struct JoinCondition<'q> {
    expr: &'q Expr,
    columns: (String, String),
    relations: (String, String),
    op: CompareOp,
    written: CompareOp,
}

#[derive(Debug)]
struct Output<'q> {
    expr: &'q Expr,
    alias: Option<String>,
    sig: String,
}

#[derive(Debug)]
struct Ordering<'q> {
    expr: &'q Expr,
    sig: String,
    descending: bool,
}

#[derive(Debug)]
struct Aggregate<'q> {
    expr: &'q Expr,
    clause: Clause,
    name: String,
    distinct: bool,
    args: String,
}

/// What the comparison looks at in one query.
#[derive(Debug)]
struct Profile<'q> {
    scope: ScopeId,
    relations: Vec<(VarId, String)>,
    conditions: Vec<Condition<'q>>,
    joins: Vec<JoinCondition<'q>>,
    outputs: Option<Vec<Output<'q>>>,
    distinct: bool,
    grouped: bool,
    order: Vec<Ordering<'q>>,
    aggregates: Vec<Aggregate<'q>>,
}

fn main_scope<'m, 'q>(analysis: &'m Analysis<'q>) -> Option<&'m SelectScope<'q>> {
    let model = &analysis.model;
    let id = *model.scopes_of_query(analysis.query).first()?;
    Some(model.scope(id))
}

impl<'q> Profile<'q> {
    fn build(analysis: &Analysis<'q>) -> Option<Self> {
        let model = &analysis.model;
        let scope = main_scope(analysis)?;
        let id = scope.id;
        let local = |expr: &Expr| {
            model
                .resolve_expr(id, expr)
                .filter(|column| !column.outer)
                .map(|column| column.key.var)
        };

        let mut sources: Vec<(Clause, &'q Expr)> = Vec::new();
        for var in &scope.vars {
            let tuple = model.var(*var);
            if let (false, Some(sqlparser::ast::JoinConstraint::On(on))) =
                (tuple.join.is_outer(), tuple.constraint)
            {
                sources.extend(conjuncts(on).into_iter().map(|e| (Clause::From, e)));
            }
        }
        if let Some(selection) = &scope.select.selection {
            sources.extend(conjuncts(selection).into_iter().map(|e| (Clause::Where, e)));
        }
        if let Some(having) = &scope.select.having {
            sources.extend(conjuncts(having).into_iter().map(|e| (Clause::Having, e)));
        }

        let mut conditions = Vec::new();
        let mut joins = Vec::new();
        for (clause, expr) in sources {
            if let Some((left, op, right)) = join_operands(expr) {
                if let (Some(a), Some(b)) = (local(left), local(right)) {
                    if a != b {
                        let (Some(l), Some(r)) =
                            (column_label(model, id, left), column_label(model, id, right))
                        else {
                            continue;
                        };
                        let written = op;
                        let (columns, op) = if l <= r {
                            ((l, r), op)
                        } else {
                            ((r, l), op.mirror())
                        };
                        let mut relations = (relation_label(model, a), relation_label(model, b));
                        if relations.0 > relations.1 {
                            relations = (relations.1, relations.0);
                        }
                        joins.push(JoinCondition {
                            expr,
                            columns,
                            relations,
                            op,
                            written,
                        });
                        continue;
                    }
                }
            }
            let clause = if clause == Clause::From {
                Clause::Where
            } else {
                clause
            };
            conditions.push(Condition {
                expr,
                clause,
                sig: signature(model, id, expr),
                core: render(
                    model,
                    id,
                    expr,
                    Render {
                        strip_not: true,
                        ..Render::default()
                    },
                ),
                shape: render(
                    model,
                    id,
                    expr,
                    Render {
                        mask_columns: true,
                        ..Render::default()
                    },
                ),
                loose: render(
                    model,
                    id,
                    expr,
                    Render {
                        unquote: true,
                        ..Render::default()
                    },
                ),
                negated: is_negated(expr),
                columns: column_refs(expr)
                    .into_iter()
                    .filter_map(|c| column_label(model, id, c))
                    .collect(),
                disjuncts: disjuncts(expr)
                    .into_iter()
                    .map(|d| signature(model, id, d))
                    .collect(),
            });
        }

        let outputs = (!has_wildcard(scope)).then(|| {
            projection(scope)
                .into_iter()
                .map(|(expr, alias)| Output {
                    expr,
                    alias: alias.map(ident_key),
                    sig: signature(model, id, expr),
                })
                .collect()
        });

        let order = scope
            .order_by()
            .iter()
            .map(|item: &'q OrderByExpr| Ordering {
                expr: &item.expr,
                sig: signature(model, id, &item.expr),
                descending: item.asc == Some(false),
            })
            .collect();

        let mut aggregates = Vec::new();
        let mut roots: Vec<(Clause, &'q Expr)> =
            projection(scope).into_iter().map(|(expr, _)| (Clause::Select, expr)).collect();
        roots.extend(scope.select.having.iter().map(|e| (Clause::Having, e)));
        roots.extend(scope.order_by().iter().map(|o| (Clause::OrderBy, &o.expr)));
        for (clause, root) in roots {
            walk_expr(root, &mut |expr| {
                if let Expr::Function(func) = expr {
                    if is_aggregate_call(func) {
                        let args = if function_has_wildcard(func) {
                            "*".to_string()
                        } else {
                            function_args(func)
                                .into_iter()
                                .map(|arg| signature(model, id, arg))
                                .collect::<Vec<_>>()
                                .join(", ")
                        };
                        aggregates.push(Aggregate {
                            expr,
                            clause,
                            name: normalized_function_name(func),
                            distinct: function_has_distinct(func),
                            args,
                        });
                    }
                }
            });
        }

        Some(Self {
            scope: id,
            relations: scope
                .vars
                .iter()
                .map(|var| (*var, relation_label(model, *var)))
                .collect(),
            conditions,
            joins,
            outputs,
            distinct: scope.select.distinct.is_some(),
            grouped: !scope.group_by().is_empty(),
            order,
            aggregates,
        })
    }
}

fn disjuncts(expr: &Expr) -> Vec<&Expr> {
    match unnest(expr) {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Or,
            right,
        } => {
            let mut parts = disjuncts(left);
            parts.extend(disjuncts(right));
            parts
        }
        other => vec![other],
    }
}

/// Remove and return the first element matching `pred`.
fn take<T>(items: &mut Vec<T>, pred: impl Fn(&T) -> bool) -> Option<T> {
    let index = items.iter().position(pred)?;
    Some(items.remove(index))
}

fn compare_conditions(
    ctx: &CheckContext<'_, '_>,
    student: &Profile<'_>,
    solution: &Profile<'_>,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut expected: Vec<&Condition<'_>> = solution.conditions.iter().collect();
    let mut pending: Vec<&Condition<'_>> = Vec::new();

    for condition in &student.conditions {
        if take(&mut expected, |t| t.sig == condition.sig && t.clause == condition.clause).is_some() {
            continue;
        }
        if let Some(t) = take(&mut expected, |t| t.sig == condition.sig) {
            findings.push(
                Finding::logical(69, ctx.at_expr(Some(condition.clause), condition.expr))
                    .param("expression", condition.expr)
                    .param("expected", t.clause)
                    .param("clause", condition.clause),
            );
            continue;
        }
        pending.push(condition);
    }

    let mut extraneous = Vec::new();
    for condition in pending {
        let location = ctx.at_expr(Some(condition.clause), condition.expr);
        if condition.disjuncts.len() > 1 {
            let matched: Vec<usize> = condition
                .disjuncts
                .iter()
                .filter_map(|d| expected.iter().position(|t| &t.sig == d))
                .collect();
            if matched.len() == condition.disjuncts.len() {
                expected.retain(|t| !condition.disjuncts.contains(&t.sig));
                findings.push(Finding::logical(52, location).param("expression", condition.expr));
                continue;
            }
        }
        if take(&mut expected, |t| {
            t.core == condition.core && t.negated != condition.negated
        })
        .is_some()
        {
            let id = if condition.negated { 53 } else { 54 };
            findings.push(Finding::logical(id, location).param("expression", condition.expr));
            continue;
        }
        let not_equal = matches!(
            unnest(condition.expr),
            Expr::BinaryOp {
                op: BinaryOperator::NotEq,
                ..
            }
        );
        if not_equal && take(&mut expected, |t| is_negated_subquery(t.expr)).is_some() {
            findings.push(Finding::logical(55, location).param("expression", condition.expr));
            continue;
        }
        if take(&mut expected, |t| t.loose == condition.loose).is_some() {
            findings.push(Finding::logical(65, location).param("expression", condition.expr));
            continue;
        }
        if let Some(t) = take(&mut expected, |t| {
            t.shape == condition.shape && t.columns != condition.columns
        }) {
            findings.push(
                Finding::logical(67, location)
                    .param("expression", condition.expr)
                    .param("expected", t.expr),
            );
            continue;
        }
        if let Some(t) = take(&mut expected, |t| {
            !t.columns.is_empty() && t.columns == condition.columns
        }) {
            findings.push(
                Finding::logical(57, location)
                    .param("expression", condition.expr)
                    .param("expected", t.expr),
            );
            continue;
        }
        extraneous.push((condition, location));
    }
    for (condition, location) in extraneous {
        findings.push(Finding::logical(68, location).param("expression", condition.expr));
    }
    for t in expected {
        findings.push(
            Finding::logical(66, ctx.at_scope(student.scope)).param("expected", t.expr),
        );
    }
    findings
}

fn compare_joins(
    ctx: &CheckContext<'_, '_>,
    student: &Profile<'_>,
    solution: &Profile<'_>,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut expected: Vec<&str> = solution.relations.iter().map(|(_, r)| r.as_str()).collect();
    let mut extra: Vec<(VarId, &str)> = Vec::new();
    for (var, relation) in &student.relations {
        if take(&mut expected, |r| *r == relation.as_str()).is_none() {
            extra.push((*var, relation.as_str()));
        }
    }
    let mut missing = expected.into_iter();
    for (var, relation) in extra {
        let finding = match missing.next() {
            Some(wanted) => Finding::logical(58, ctx.at_var(var))
                .param("relation", relation)
                .param("expected", wanted),
            None => Finding::logical(59, ctx.at_var(var)).param("relation", relation),
        };
        findings.push(finding);
    }
    for wanted in missing {
        findings.push(Finding::logical(62, ctx.at_scope(student.scope)).param("relation", wanted));
    }

    let mut expected: Vec<&JoinCondition<'_>> = solution.joins.iter().collect();
    let mut pending = Vec::new();
    for join in &student.joins {
        if take(&mut expected, |t| t.columns == join.columns && t.op == join.op).is_none() {
            pending.push(join);
        }
    }
    for join in pending {
        let location = ctx.at_expr(Some(Clause::Where), join.expr);
        if let Some(t) = take(&mut expected, |t| t.columns == join.columns) {
            findings.push(
                Finding::logical(61, location)
                    .param("expression", join.expr)
                    .param("operator", join.written)
                    .param("expected", t.written),
            );
        } else if take(&mut expected, |t| t.relations == join.relations).is_some() {
            findings.push(Finding::logical(60, location).param("expression", join.expr));
        }
    }
    findings
}

fn compare_outputs(
    ctx: &CheckContext<'_, '_>,
    student: &Profile<'_>,
    solution: &Profile<'_>,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    if solution.distinct && !student.distinct && !student.grouped {
        findings.push(Finding::logical(72, ctx.at_scope(student.scope)));
    }
    let (Some(mine), Some(theirs)) = (&student.outputs, &solution.outputs) else {
        return findings;
    };
    let mut expected: Vec<&Output<'_>> = theirs.iter().collect();
    for output in mine {
        let location = ctx.at_expr(Some(Clause::Select), output.expr);
        match take(&mut expected, |t| t.sig == output.sig) {
            Some(t) => {
                if let Some(alias) = t.alias.as_ref().filter(|a| Some(*a) != output.alias.as_ref()) {
                    findings.push(
                        Finding::logical(73, location)
                            .param("expression", output.expr)
                            .param("expected", alias),
                    );
                }
            }
            None => {
                findings.push(Finding::logical(70, location).param("expression", output.expr));
            }
        }
    }
    for t in expected {
        let wanted = match &t.alias {
            Some(alias) => format!("{} AS {alias}", t.expr),
            None => t.expr.to_string(),
        };
        findings.push(Finding::logical(71, ctx.at_scope(student.scope)).param("expected", wanted));
    }
    findings
}

fn direction(descending: bool) -> &'static str {
    if descending {
        "descending"
    } else {
        "ascending"
    }
}

fn compare_ordering(
    ctx: &CheckContext<'_, '_>,
    student: &Profile<'_>,
    solution: &Profile<'_>,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    if solution.order.is_empty() {
        if let Some(first) = student.order.first() {
            findings.push(Finding::logical(76, ctx.at_expr(Some(Clause::OrderBy), first.expr)));
        }
        return findings;
    }
    for (mine, theirs) in student.order.iter().zip(&solution.order) {
        let location = ctx.at_expr(Some(Clause::OrderBy), mine.expr);
        if mine.sig != theirs.sig {
            findings.push(
                Finding::logical(75, location)
                    .param("expression", mine.expr)
                    .param("expected", theirs.expr),
            );
        } else if mine.descending != theirs.descending {
            findings.push(
                Finding::logical(77, location)
                    .param("expression", mine.expr)
                    .param("direction", direction(mine.descending))
                    .param("expected", direction(theirs.descending)),
            );
        }
    }
    for theirs in solution.order.iter().skip(student.order.len()) {
        findings.push(
            Finding::logical(74, ctx.at_scope(student.scope)).param("expected", theirs.expr),
        );
    }
    findings
}

fn compare_aggregates(
    ctx: &CheckContext<'_, '_>,
    student: &Profile<'_>,
    solution: &Profile<'_>,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut expected: Vec<&Aggregate<'_>> = solution.aggregates.iter().collect();
    let mut pending = Vec::new();
    for aggregate in &student.aggregates {
        let exact = take(&mut expected, |t| {
            t.name == aggregate.name && t.distinct == aggregate.distinct && t.args == aggregate.args
        });
        if exact.is_none() {
            pending.push(aggregate);
        }
    }
    for aggregate in pending {
        let location = ctx.at_expr(Some(aggregate.clause), aggregate.expr);
        if let Some(t) = take(&mut expected, |t| {
            t.name == aggregate.name && t.args == aggregate.args
        }) {
            findings.push(if aggregate.distinct {
                Finding::logical(78, location).param("expression", aggregate.expr)
            } else {
                Finding::logical(79, location).param("expected", t.expr)
            });
        } else if let Some(t) = take(&mut expected, |t| {
            t.args == aggregate.args && t.distinct == aggregate.distinct
        }) {
            findings.push(
                Finding::logical(80, location)
                    .param("expression", aggregate.expr)
                    .param("function", aggregate.name.to_uppercase())
                    .param("expected", t.name.to_uppercase()),
            );
        } else if let Some(t) = take(&mut expected, |t| t.name == aggregate.name) {
            findings.push(
                Finding::logical(81, location)
                    .param("expression", aggregate.expr)
                    .param("expected", t.expr),
            );
        }
    }
    findings
}

fn all_differences(
    ctx: &CheckContext<'_, '_>,
    student: &Profile<'_>,
    solution: &Profile<'_>,
) -> Vec<Finding> {
    let mut findings = compare_conditions(ctx, student, solution);
    findings.extend(compare_joins(ctx, student, solution));
    findings.extend(compare_outputs(ctx, student, solution));
    findings.extend(compare_ordering(ctx, student, solution));
    findings.extend(compare_aggregates(ctx, student, solution));
    findings
}

/// Differences from the reference solution closest to the query.
fn differences(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let Some(student) = Profile::build(ctx.analysis) else {
        return Vec::new();
    };
    ctx.solutions
        .iter()
        .filter_map(Profile::build)
        .map(|solution| all_differences(ctx, &student, &solution))
        .min_by_key(Vec::len)
        .unwrap_or_default()
}

fn only(ctx: &CheckContext<'_, '_>, ids: &[u16]) -> Vec<Finding> {
    if ctx.solutions.is_empty() {
        return Vec::new();
    }
    differences(ctx)
        .into_iter()
        .filter(|finding| ids.contains(&finding.id))
        .collect()
}

/// WHERE and HAVING conditions that differ from the solution's (52–57, 65–69).
pub fn conditions(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    only(ctx, &[52, 53, 54, 55, 57, 65, 66, 67, 68, 69])
}

/// Relations and join conditions that differ from the solution's (58–62).
pub fn joins(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    only(ctx, &[58, 59, 60, 61, 62])
}

/// SELECT list and DISTINCT (70–73).
pub fn outputs(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    only(ctx, &[70, 71, 72, 73])
}

/// ORDER BY (74–77).
pub fn ordering(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    only(ctx, &[74, 75, 76, 77])
}

/// Aggregate calls (78–81).
pub fn aggregates(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    only(ctx, &[78, 79, 80, 81])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::checks::test_support::Fixture;

    fn ids(sql: &str, solution: &str, check: fn(&CheckContext<'_, '_>) -> Vec<Finding>) -> Vec<u16> {
        Fixture::with_solutions(sql, &[solution]).ids(check)
    }

    #[test]
    fn no_solution_no_findings() {
        assert!(Fixture::new("SELECT ename FROM emp WHERE sal > 1").run(conditions).is_empty());
    }

    #[test]
    fn correlation_names_do_not_matter() {
        let fixture = Fixture::with_solutions(
            "SELECT x.ename FROM emp x WHERE x.sal > 1000 ORDER BY x.ename",
            &["SELECT ename FROM emp WHERE 1000 < sal ORDER BY ename"],
        );
        for check in [conditions, joins, outputs, ordering, aggregates] {
            assert!(fixture.run(check).is_empty());
        }
    }

    #[test]
    fn condition_differences() {
        let solution = "SELECT ename FROM emp WHERE job = 'CLERK' AND sal > 1000";
        assert_eq!(
            ids("SELECT ename FROM emp WHERE job = 'CLERK' OR sal > 1000", solution, conditions),
            vec![52]
        );
        assert_eq!(
            ids("SELECT ename FROM emp WHERE NOT job = 'CLERK' AND sal > 1000", solution, conditions),
            vec![53]
        );
        assert_eq!(
            ids("SELECT ename FROM emp WHERE job = 'CLERK' AND sal > 2000", solution, conditions),
            vec![57]
        );
        assert_eq!(
            ids("SELECT ename FROM emp WHERE job = 'CLERK' AND sal > '1000'", solution, conditions),
            vec![65]
        );
        assert_eq!(
            ids("SELECT ename FROM emp WHERE job = 'CLERK' AND comm > 1000", solution, conditions),
            vec![67]
        );
        assert_eq!(ids("SELECT ename FROM emp WHERE job = 'CLERK'", solution, conditions), vec![66]);
        assert_eq!(
            ids(
                "SELECT ename FROM emp WHERE job = 'CLERK' AND sal > 1000 AND deptno = 10",
                solution,
                conditions
            ),
            vec![68]
        );
    }

    #[test]
    fn missing_not_and_wrong_clause() {
        assert_eq!(
            ids(
                "SELECT ename FROM emp WHERE comm IS NULL",
                "SELECT ename FROM emp WHERE comm IS NOT NULL",
                conditions
            ),
            vec![54]
        );
        assert_eq!(
            ids(
                "SELECT job, COUNT(*) FROM emp GROUP BY job HAVING job <> 'CLERK'",
                "SELECT job, COUNT(*) FROM emp WHERE job <> 'CLERK' GROUP BY job",
                conditions
            ),
            vec![69]
        );
    }

    #[test]
    fn join_differences() {
        let solution = "SELECT e.ename FROM emp e JOIN dept d ON e.deptno = d.deptno";
        assert_eq!(ids("SELECT e.ename FROM emp e", solution, joins), vec![62]);
        assert_eq!(
            ids("SELECT e.ename FROM emp e, salgrade s WHERE e.sal > s.losal", solution, joins),
            vec![58]
        );
        assert_eq!(
            ids(
                "SELECT e.ename FROM emp e JOIN dept d ON e.deptno > d.deptno",
                solution,
                joins
            ),
            vec![61]
        );
        assert_eq!(
            ids(
                "SELECT e.ename FROM emp e, dept d, salgrade s WHERE e.deptno = d.deptno",
                solution,
                joins
            ),
            vec![59]
        );
    }

    #[test]
    fn output_differences() {
        let solution = "SELECT DISTINCT ename AS name, job FROM emp";
        let findings = Fixture::with_solutions("SELECT ename, sal FROM emp", &[solution]).run(outputs);
        assert_eq!(findings.iter().map(|f| f.id).collect::<Vec<_>>(), vec![72, 73, 70, 71]);
        assert_eq!(findings[1].param_value("expected"), Some("name"));
    }

    #[test]
    fn ordering_differences() {
        let solution = "SELECT ename FROM emp ORDER BY sal DESC, ename";
        assert_eq!(ids("SELECT ename FROM emp ORDER BY sal", solution, ordering), vec![77, 74]);
        assert_eq!(ids("SELECT ename FROM emp ORDER BY ename", solution, ordering), vec![75, 74]);
        assert_eq!(
            ids("SELECT ename FROM emp ORDER BY ename", "SELECT ename FROM emp", ordering),
            vec![76]
        );
    }

    #[test]
    fn aggregate_differences() {
        let solution = "SELECT COUNT(DISTINCT job), MAX(sal) FROM emp";
        assert_eq!(
            ids("SELECT COUNT(job), MIN(sal) FROM emp", solution, aggregates),
            vec![79, 80]
        );
        assert_eq!(
            ids("SELECT COUNT(DISTINCT job), MAX(DISTINCT sal) FROM emp", solution, aggregates),
            vec![78]
        );
        assert_eq!(
            ids("SELECT COUNT(DISTINCT ename), MAX(sal) FROM emp", solution, aggregates),
            vec![81]
        );
    }

    #[test]
    fn closest_solution_is_used() {
        let fixture = Fixture::with_solutions(
            "SELECT ename FROM emp WHERE sal > 1000",
            &[
                "SELECT ename, job FROM emp WHERE deptno = 10",
                "SELECT ename FROM emp WHERE sal > 1000",
            ],
        );
        for check in [conditions, joins, outputs, ordering, aggregates] {
            assert!(fixture.run(check).is_empty());
        }
    }
}
