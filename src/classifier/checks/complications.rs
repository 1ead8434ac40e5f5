use std::collections::BTreeSet;

use sqlparser::ast::{Distinct, Expr, JoinConstraint, SelectItem, SetOperator};

use crate::catalog::TypeClass;
use crate::classifier::checks::{
    at_literal, conjunction_text, conjuncts, covers_key, literal_text, output_has_key, projection,
    rejects_null, scope_exprs, shared_constants, sole_conjunction,
};
use crate::classifier::context::CheckContext;
use crate::classifier::finding::Finding;
use crate::logic::oracle::pinned_by_range;
use crate::logic::{
    analyze, AtomKind, CompareOp, NormalizedPredicate, Operand, Scalar, Simplification, Verdict,
};
use crate::parser::expr::{
    canonical_text, column_refs, contains_aggregate, function_args, function_has_distinct,
    is_aggregate_call, is_constant, normalized_function_name, string_literal, subqueries,
    walk_expr,
};
use crate::parser::lexical::Clause;
use crate::parser::names::ident_key;
use crate::query::{
    ColumnKey, JoinKind, ResolvedColumn, ScopeId, ScopeRole, SelectScope, VarId, VarSource,
};

/// Literals implied by the rest of their disjunct and disjuncts covered by
/// another one (82); ranges that admit a single value (87).
pub fn simplifications(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (predicate, report) in ctx.analysis.reports() {
        let (Some(report), Some(dnf)) = (report, predicate.outcome.dnf()) else {
            continue;
        };
        for simplification in &report.simplifications {
            match simplification {
                Simplification::AtomTrue {
                    conjunction,
                    literal,
                    implied_by,
                } if !implied_by.is_empty() => {
                    let conjunction = &dnf.conjunctions[*conjunction];
                    let redundant = conjunction[*literal];
                    let atom = &predicate.atoms[redundant.atom];
                    // IS NOT NULL next to a comparison is its own misconception.
                    if matches!(atom.kind, AtomKind::IsNull(_)) && !redundant.positive {
                        continue;
                    }
                    let implied: Vec<String> = implied_by
                        .iter()
                        .map(|position| literal_text(predicate, conjunction[*position]))
                        .collect();
                    findings.push(Finding::complication(82, at_literal(ctx, predicate, redundant)).param(
                        "detail",
                        format!(
                            "`{}` is implied by `{}`",
                            literal_text(predicate, redundant),
                            implied.join(" AND ")
                        ),
                    ));
                }
                Simplification::DisjunctFalse {
                    conjunction,
                    subsumed_by: Some(covering),
                } => {
                    let subsumed = &dnf.conjunctions[*conjunction];
                    let Some(first) = subsumed.first() else {
                        continue;
                    };
                    findings.push(
                        Finding::complication(82, at_literal(ctx, predicate, *first)).param(
                            "detail",
                            format!(
                                "`{}` is already covered by `{}`",
                                conjunction_text(predicate, subsumed),
                                conjunction_text(predicate, &dnf.conjunctions[*covering])
                            ),
                        ),
                    );
                }
                _ => {}
            }
        }
        for (index, conjunction) in dnf.conjunctions.iter().enumerate() {
            if report.conjunctions.get(index).map(|c| c.verdict) != Some(Verdict::Variable) {
                continue;
            }
            for (key, positions, value) in pinned_by_range(predicate, conjunction) {
                let Some(&first) = positions.first() else {
                    continue;
                };
                let text: Vec<String> = positions
                    .iter()
                    .map(|position| literal_text(predicate, conjunction[*position]))
                    .collect();
                let value = match column_class(predicate, &key) {
                    Some(TypeClass::Temporal) => Scalar::Date(value),
                    _ => Scalar::Number(value),
                };
                findings.push(
                    Finding::complication(87, at_literal(ctx, predicate, conjunction[first]))
                        .param("expression", text.join(" AND "))
                        .param("value", value),
                );
            }
        }
    }
    findings
}

fn column_class(predicate: &NormalizedPredicate<'_>, key: &ColumnKey) -> Option<TypeClass> {
    predicate
        .atoms
        .iter()
        .flat_map(|atom| atom.columns())
        .find(|column| &column.key == key)
        .map(|column| column.type_class)
}

/// DISTINCT over rows that are already unique (83).
pub fn unnecessary_distinct(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let model = ctx.model();
    model
        .scopes
        .iter()
        .filter(|scope| matches!(scope.select.distinct, Some(Distinct::Distinct)))
        .filter(|scope| {
            if model.is_single_row(scope.id) {
                return true;
            }
            if !scope.group_by().is_empty() {
                let selected: BTreeSet<String> = projection(scope)
                    .into_iter()
                    .map(|(expr, _)| canonical_text(expr))
                    .collect();
                return scope
                    .group_by()
                    .iter()
                    .all(|expr| selected.contains(&canonical_text(expr)));
            }
            !scope.vars.is_empty()
                && scope
                    .vars
                    .iter()
                    .all(|var| output_has_key(ctx, scope, *var))
        })
        .map(|scope| Finding::complication(83, ctx.at_scope(scope.id)))
        .collect()
}

/// Tuple variables only joined on their key and otherwise unused (84).
pub fn unnecessary_joins(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let model = ctx.model();
    ctx.analysis
        .joins
        .iter()
        .flat_map(|report| &report.redundant)
        .map(|redundant| {
            let var = model.var(redundant.var);
            let other = model.var(redundant.foreign.var);
            Finding::complication(84, ctx.at_var(redundant.var))
                .param("variable", &var.name)
                .evidence(format!(
                    "`{}.{}` already holds `{}.{}`",
                    other.name, redundant.foreign.column, var.name, redundant.key.column
                ))
        })
        .collect()
}

/// Correlation names that never qualify a column, for relations that occur
/// once in their FROM clause (85).
pub fn unused_correlation_names(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let model = ctx.model();
    let mut qualified: BTreeSet<VarId> = model
        .column_refs
        .iter()
        .filter(|r| matches!(r.expr, Expr::CompoundIdentifier(_)))
        .filter_map(|r| r.resolution.column().map(|c| c.key.var))
        .collect();
    for scope in &model.scopes {
        for item in &scope.select.projection {
            if let SelectItem::QualifiedWildcard(object, _) = item {
                let name = object.0.last().map(ident_key);
                qualified.extend(
                    scope
                        .vars
                        .iter()
                        .filter(|var| Some(&model.var(**var).name) == name.as_ref()),
                );
            }
        }
    }
    let mut findings = Vec::new();
    for scope in &model.scopes {
        for &var in &scope.vars {
            let tuple = model.var(var);
            let Some(alias) = tuple.alias else {
                continue;
            };
            if !matches!(tuple.source, VarSource::Relation { .. } | VarSource::Cte(_)) {
                continue;
            }
            let same_relation = scope
                .vars
                .iter()
                .filter(|other| model.var(**other).relation_name() == tuple.relation_name())
                .count();
            if same_relation == 1 && !qualified.contains(&var) && !uses_using(ctx, scope) {
                findings.push(
                    Finding::complication(85, ctx.at_var(var)).param("name", ident_key(alias)),
                );
            }
        }
    }
    findings
}

fn uses_using(ctx: &CheckContext<'_, '_>, scope: &SelectScope<'_>) -> bool {
    scope.vars.iter().any(|var| {
        matches!(
            ctx.model().var(*var).constraint,
            Some(JoinConstraint::Using(_) | JoinConstraint::Natural)
        )
    })
}

/// Two tuple variables over one relation equated on a key (86).
pub fn identical_correlation_names(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let model = ctx.model();
    let mut findings = Vec::new();
    for scope in &model.scopes {
        let Some(filter) = ctx.analysis.predicates[scope.id].filter.as_ref() else {
            continue;
        };
        let Some(conjunction) = sole_conjunction(filter) else {
            continue;
        };
        let equalities: Vec<(&ColumnKey, &ColumnKey)> = conjunction
            .iter()
            .filter(|literal| literal.positive)
            .filter_map(|literal| match &filter.atoms[literal.atom].kind {
                AtomKind::Compare {
                    left: Operand::Column(a),
                    op: CompareOp::Eq,
                    right: Operand::Column(b),
                } => Some((&a.key, &b.key)),
                _ => None,
            })
            .collect();
        for (i, &first) in scope.vars.iter().enumerate() {
            for &second in &scope.vars[i + 1..] {
                let (a, b) = (model.var(first), model.var(second));
                if a.join.is_outer() || b.join.is_outer() {
                    continue;
                }
                let (Some(relation), Some(other)) = (model.relation_of(first), model.relation_of(second))
                else {
                    continue;
                };
                if relation.name != other.name || relation.schema != other.schema {
                    continue;
                }
                let equated = |column: &String| {
                    equalities.iter().any(|(x, y)| {
                        let pair = |p: &ColumnKey, q: &ColumnKey| {
                            p.var == first && q.var == second && &p.column == column && &q.column == column
                        };
                        pair(x, y) || pair(y, x)
                    })
                };
                if relation.keys().any(|key| key.iter().all(equated)) {
                    findings.push(
                        Finding::complication(86, ctx.at_var(second))
                            .param("first", &a.name)
                            .param("second", &b.name),
                    );
                }
            }
        }
    }
    findings
}

/// LIKE with a pattern that has no wildcard at all (88).
pub fn like_without_wildcards(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for scope in &ctx.model().scopes {
        for (clause, root) in scope_exprs(ctx.model(), scope) {
            walk_expr(root, &mut |expr| {
                let (Expr::Like { pattern, .. } | Expr::ILike { pattern, .. }) = expr else {
                    return;
                };
                if string_literal(pattern).is_some_and(|p| !p.contains(['%', '_', '*', '?'])) {
                    findings.push(
                        Finding::complication(88, ctx.at_expr(Some(clause), expr))
                            .param("expression", expr),
                    );
                }
            });
        }
    }
    findings
}

fn role_name(role: ScopeRole) -> &'static str {
    match role {
        ScopeRole::Derived => "FROM",
        ScopeRole::Cte => "WITH",
        ScopeRole::Exists => "EXISTS",
        ScopeRole::In => "IN",
        ScopeRole::Quantified => "ANY/ALL",
        ScopeRole::Scalar => "scalar",
        ScopeRole::Root | ScopeRole::SetOperand => "top-level",
    }
}

/// Decorated EXISTS subqueries (89, 94) and ORDER BY in subqueries (100).
pub fn subquery_clutter(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for scope in &ctx.model().scopes {
        if scope.role == ScopeRole::Exists {
            let plain = match scope.select.projection.as_slice() {
                [SelectItem::Wildcard(_)] => true,
                [SelectItem::UnnamedExpr(expr)] => is_constant(expr),
                _ => false,
            };
            if !plain {
                findings.push(Finding::complication(89, ctx.at_scope(scope.id)));
            }
            if let (Some(first), None) = (scope.group_by().first(), &scope.select.having) {
                findings.push(Finding::complication(94, ctx.at_expr(Some(Clause::GroupBy), first)));
            }
        }
        let limited = scope.query.limit.is_some() || scope.query.fetch.is_some();
        if !scope.role.is_top_level() && !limited {
            if let Some(first) = scope.order_by().first() {
                findings.push(
                    Finding::complication(100, ctx.at_expr(Some(Clause::OrderBy), &first.expr))
                        .param("role", role_name(scope.role)),
                );
            }
        }
    }
    findings
}

/// IN or EXISTS over the same relation, matched on its key (90).
pub fn replaceable_subqueries(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let model = ctx.model();
    let mut findings = Vec::new();
    for scope in &model.scopes {
        if !matches!(scope.role, ScopeRole::Exists | ScopeRole::In) || scope.negated {
            continue;
        }
        let (Some(parent), Some(host), [inner]) = (scope.parent, scope.host_expr, scope.vars.as_slice())
        else {
            continue;
        };
        let Some(relation) = model.relation_of(*inner) else {
            continue;
        };
        let mut pairs: Vec<(String, ColumnKey)> = Vec::new();
        if let Some((filter, conjunction)) = ctx.analysis.predicates[scope.id]
            .filter
            .as_ref()
            .and_then(|filter| sole_conjunction(filter).map(|c| (filter, c)))
        {
            for literal in conjunction.iter().filter(|l| l.positive) {
                if let AtomKind::Compare {
                    left: Operand::Column(a),
                    op: CompareOp::Eq,
                    right: Operand::Column(b),
                } = &filter.atoms[literal.atom].kind
                {
                    for (local, outer) in [(a, b), (b, a)] {
                        if local.key.var == *inner && outer.outer {
                            pairs.push((local.key.column.clone(), outer.key.clone()));
                        }
                    }
                }
            }
        }
        if let Expr::InSubquery { expr: operand, .. } = host {
            let outer = model.resolve_expr(parent, operand);
            let selected = model
                .outputs(scope.id)
                .and_then(<[_]>::first)
                .and_then(|column| column.origin.clone());
            if let (Some(outer), Some(selected)) = (outer, selected) {
                if selected.var == *inner {
                    pairs.push((selected.column, outer.key));
                }
            }
        }
        let parent_vars = &model.scope(parent).vars;
        let replaceable = parent_vars.iter().any(|outer_var| {
            model.relation_of(*outer_var).is_some_and(|r| r.name == relation.name && r.schema == relation.schema)
                && relation.keys().any(|key| {
                    key.iter().all(|column| {
                        pairs.iter().any(|(local, outer)| {
                            local == column && outer.var == *outer_var && &outer.column == column
                        })
                    })
                })
        });
        if replaceable {
            findings.push(Finding::complication(90, ctx.at_expr(scope.host_clause, host)));
        }
    }
    findings
}

/// Aggregates over one value per group (91), DISTINCT in MIN or MAX (92)
/// and COUNT over a NOT NULL column (93).
pub fn aggregate_arguments(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let model = ctx.model();
    let mut findings = Vec::new();
    for scope in &model.scopes {
        let grouped: Vec<String> = scope.group_by().iter().map(canonical_text).collect();
        let group_exprs: Vec<&Expr> = scope.group_by().iter().collect();
        for (clause, root) in scope_exprs(model, scope) {
            walk_expr(root, &mut |expr| {
                let Expr::Function(func) = expr else {
                    return;
                };
                if !is_aggregate_call(func) {
                    return;
                }
                let name = normalized_function_name(func);
                let args = function_args(func);
                let location = ctx.at_expr(Some(clause), expr);
                match (name.as_str(), args.as_slice()) {
                    ("min" | "max", _) if function_has_distinct(func) => findings.push(
                        Finding::complication(92, location).param("expression", expr),
                    ),
                    ("min" | "max" | "avg", [arg]) if !grouped.is_empty() => {
                        let single = grouped.contains(&canonical_text(arg))
                            || model.resolve_expr(scope.id, arg).is_some_and(|column| {
                                !column.outer && covers_key(ctx, scope, column.key.var, &group_exprs)
                            });
                        if single {
                            findings.push(
                                Finding::complication(91, location).param("expression", expr),
                            );
                        }
                    }
                    ("count", [arg]) if !function_has_distinct(func) => {
                        let never_null = model
                            .resolve_expr(scope.id, arg)
                            .is_some_and(|column| !column.nullable && !column.outer);
                        if never_null {
                            findings.push(
                                Finding::complication(93, location).param("expression", expr),
                            );
                        }
                    }
                    _ => {}
                }
            });
        }
    }
    findings
}

/// Grouping on a key (95), on constants only (96), without aggregates (97),
/// and HAVING conditions that do not depend on the groups (101).
pub fn grouping(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let model = ctx.model();
    let mut findings = Vec::new();
    for scope in &model.scopes {
        let group_by = scope.group_by();
        let Some(first) = group_by.first() else {
            continue;
        };
        let at_group = ctx.at_expr(Some(Clause::GroupBy), first);
        let group_exprs: Vec<&Expr> = group_by.iter().collect();
        if !scope.vars.is_empty()
            && scope
                .vars
                .iter()
                .all(|var| covers_key(ctx, scope, *var, &group_exprs))
        {
            findings.push(Finding::complication(95, at_group.clone()));
        } else if let Some(constants) = shared_constants(ctx, scope.id) {
            let fixed = group_by.iter().all(|expr| {
                model
                    .resolve_expr(scope.id, expr)
                    .is_some_and(|column| constants.contains_key(&column.key))
            });
            if fixed {
                findings.push(Finding::complication(96, at_group.clone()));
            }
        }
        let aggregated = projection(scope)
            .iter()
            .any(|(expr, _)| contains_aggregate(expr))
            || scope.select.having.is_some()
            || scope.order_by().iter().any(|o| contains_aggregate(&o.expr));
        if !aggregated {
            let selected: BTreeSet<String> = projection(scope)
                .into_iter()
                .map(|(expr, _)| canonical_text(expr))
                .collect();
            let grouped: BTreeSet<String> = group_by.iter().map(canonical_text).collect();
            if selected == grouped && projection(scope).len() == scope.select.projection.len() {
                findings.push(Finding::complication(97, at_group));
            }
        }
        if let Some(having) = &scope.select.having {
            for part in conjuncts(having) {
                if !contains_aggregate(part) && subqueries(part).is_empty() {
                    findings.push(
                        Finding::complication(101, ctx.at_expr(Some(Clause::Having), part))
                            .param("expression", part),
                    );
                }
            }
        }
    }
    findings
}

/// Single-relation operands of one SELECT block shape for a UNION.
fn union_operand<'m, 'q>(
    ctx: &'m CheckContext<'_, 'q>,
    scopes: &[ScopeId],
) -> Option<&'m SelectScope<'q>> {
    let [only] = scopes else {
        return None;
    };
    let scope = ctx.model().scope(*only);
    let plain = scope.vars.len() == 1
        && scope.group_by().is_empty()
        && scope.select.having.is_none()
        && scope.select.distinct.is_none()
        && !projection(scope).iter().any(|(expr, _)| contains_aggregate(expr));
    plain.then_some(scope)
}

fn selected_columns(ctx: &CheckContext<'_, '_>, scope: &SelectScope<'_>) -> Option<Vec<String>> {
    let items = projection(scope);
    if items.len() != scope.select.projection.len() {
        return None;
    }
    items
        .into_iter()
        .map(|(expr, _)| {
            ctx.model()
                .resolve_expr(scope.id, expr)
                .map(|column| column.key.column)
        })
        .collect()
}

/// UNION of two selections from one relation (98) and UNION of disjoint
/// operands that each return unique rows (102).
pub fn unions(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let model = ctx.model();
    let mut findings = Vec::new();
    for operation in &model.set_operations {
        if operation.op != SetOperator::Union {
            continue;
        }
        let (Some(left), Some(right)) = (
            union_operand(ctx, &operation.left),
            union_operand(ctx, &operation.right),
        ) else {
            continue;
        };
        let (left_var, right_var) = (left.vars[0], right.vars[0]);
        let (Some(left_relation), Some(right_relation)) =
            (model.relation_of(left_var), model.relation_of(right_var))
        else {
            continue;
        };
        if left_relation.name != right_relation.name || left_relation.schema != right_relation.schema {
            continue;
        }
        let (Some(left_columns), Some(right_columns)) =
            (selected_columns(ctx, left), selected_columns(ctx, right))
        else {
            continue;
        };
        if left_columns != right_columns {
            continue;
        }
        let location = ctx.at_scope(right.id);
        if operation.is_distinct_union() {
            findings.push(Finding::complication(98, location.clone()));
        }
        if operation.is_distinct_union()
            && output_has_key(ctx, left, left_var)
            && output_has_key(ctx, right, right_var)
            && disjoint(ctx, left, right, left_var)
        {
            findings.push(Finding::complication(102, location));
        }
    }
    findings
}

/// True when no row of the shared relation satisfies both WHERE clauses.
fn disjoint(
    ctx: &CheckContext<'_, '_>,
    left: &SelectScope<'_>,
    right: &SelectScope<'_>,
    left_var: VarId,
) -> bool {
    let (Some(left_where), Some(right_where)) = (&left.select.selection, &right.select.selection)
    else {
        return false;
    };
    let model = ctx.model();
    let resolver = |expr: &Expr| -> Option<ResolvedColumn> {
        model
            .resolve_expr(left.id, expr)
            .or_else(|| model.resolve_expr(right.id, expr))
            .map(|mut column| {
                if !column.outer {
                    column.key.var = left_var;
                }
                column
            })
    };
    let combined = NormalizedPredicate::build(
        left.id,
        vec![(Clause::Where, left_where), (Clause::Where, right_where)],
        &resolver,
        ctx.config.dnf_conjunction_budget,
    );
    analyze(&combined).is_some_and(|report| report.formula == Verdict::AlwaysFalse)
}

/// ORDER BY items after a key or on a constant column (99).
pub fn ordering_columns(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let model = ctx.model();
    let mut findings = Vec::new();
    for scope in &model.scopes {
        let order_by = scope.order_by();
        if order_by.is_empty() {
            continue;
        }
        let constants = shared_constants(ctx, scope.id).unwrap_or_default();
        let mut earlier: Vec<&Expr> = Vec::new();
        for item in order_by {
            let constant = model
                .resolve_expr(scope.id, &item.expr)
                .is_some_and(|column| constants.contains_key(&column.key));
            let after_key = !earlier.is_empty()
                && !scope.vars.is_empty()
                && scope
                    .vars
                    .iter()
                    .all(|var| covers_key(ctx, scope, *var, &earlier));
            if constant || after_key {
                findings.push(
                    Finding::complication(99, ctx.at_expr(Some(Clause::OrderBy), &item.expr))
                        .param("expression", &item.expr),
                );
            }
            earlier.push(&item.expr);
        }
    }
    findings
}

/// Conditions of an IN or EXISTS subquery that only test outer columns (103).
pub fn movable_conditions(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let model = ctx.model();
    let mut findings = Vec::new();
    for scope in &model.scopes {
        if !matches!(scope.role, ScopeRole::Exists | ScopeRole::In) || scope.negated {
            continue;
        }
        let Some(selection) = &scope.select.selection else {
            continue;
        };
        for part in conjuncts(selection) {
            if !subqueries(part).is_empty() {
                continue;
            }
            let columns = column_refs(part);
            let outer_only = !columns.is_empty()
                && columns.iter().all(|column| {
                    model
                        .resolve_expr(scope.id, column)
                        .is_some_and(|resolved| resolved.outer)
                });
            if outer_only {
                findings.push(
                    Finding::complication(103, ctx.at_expr(Some(Clause::Where), part))
                        .param("expression", part),
                );
            }
        }
    }
    findings
}

/// Outer-join conditions on the preserved side (104) and WHERE conditions
/// that reject the NULL rows of an outer join (105).
pub fn outer_joins(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let model = ctx.model();
    let mut findings = Vec::new();
    for scope in &model.scopes {
        for &var in &scope.vars {
            let tuple = model.var(var);
            if let (JoinKind::Left, Some(JoinConstraint::On(on))) = (tuple.join, tuple.constraint) {
                for part in conjuncts(on) {
                    let columns = column_refs(part);
                    let preserved_only = !columns.is_empty()
                        && subqueries(part).is_empty()
                        && columns.iter().all(|column| {
                            model
                                .resolve_expr(scope.id, column)
                                .is_some_and(|resolved| !resolved.outer && resolved.key.var != var)
                        });
                    if preserved_only {
                        findings.push(
                            Finding::complication(104, ctx.at_expr(Some(Clause::From), part))
                                .param("expression", part),
                        );
                    }
                }
            }
            if tuple.null_supplied {
                if let Some(finding) = null_rejecting_filter(ctx, scope.id, var) {
                    findings.push(finding);
                }
            }
        }
    }
    findings
}

fn null_rejecting_filter(ctx: &CheckContext<'_, '_>, scope: ScopeId, var: VarId) -> Option<Finding> {
    let filter = ctx.analysis.predicates[scope].filter.as_ref()?;
    let dnf = filter.outcome.dnf()?;
    let mut first = None;
    for conjunction in &dnf.conjunctions {
        let rejecting = conjunction.iter().find(|literal| {
            let atom = &filter.atoms[literal.atom];
            atom.clause == Clause::Where
                && atom
                    .columns()
                    .iter()
                    .any(|column| column.key.var == var && rejects_null(atom, literal.positive, &column.key))
        })?;
        first.get_or_insert(*rejecting);
    }
    let literal = first?;
    Some(
        Finding::complication(105, at_literal(ctx, filter, literal))
            .param("expression", literal_text(filter, literal))
            .param("variable", &ctx.model().var(var).name),
    )
}

/// Derived tables that only filter and project one level of FROM (106).
pub fn derived_tables(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let model = ctx.model();
    model
        .vars
        .iter()
        .filter(|tuple| !tuple.null_supplied && !tuple.join.is_outer())
        .filter_map(|tuple| {
            let VarSource::Derived(scopes) = &tuple.source else {
                return None;
            };
            let [inner] = scopes.as_slice() else {
                return None;
            };
            let inner = model.scope(*inner);
            let query = inner.query;
            let simple = inner.owns_modifiers
                && inner.select.distinct.is_none()
                && inner.group_by().is_empty()
                && inner.select.having.is_none()
                && query.order_by.is_none()
                && query.limit.is_none()
                && query.offset.is_none()
                && query.fetch.is_none()
                && !projection(inner).iter().any(|(expr, _)| contains_aggregate(expr));
            simple.then(|| {
                Finding::complication(106, ctx.at_var(tuple.id)).param("variable", &tuple.name)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::checks::test_support::Fixture;

    #[test]
    fn implied_literals_and_subsumed_disjuncts() {
        let implied = Fixture::new("SELECT ename FROM emp WHERE sal > 1000 AND sal > 500");
        let findings = implied.run(simplifications);
        assert_eq!(findings.len(), 1);
        assert_eq!(
            findings[0].param_value("detail"),
            Some("`sal > 500` is implied by `sal > 1000`")
        );
        let subsumed = Fixture::new("SELECT ename FROM emp WHERE sal > 500 OR sal > 700");
        let findings = subsumed.run(simplifications);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].location.snippet, "sal > 700");
    }

    #[test]
    fn range_with_one_value() {
        let fixture = Fixture::new("SELECT ename FROM emp WHERE deptno BETWEEN 20 AND 20");
        let findings = fixture.run(simplifications);
        assert_eq!(findings.iter().map(|f| f.id).collect::<Vec<_>>(), vec![87]);
        assert_eq!(findings[0].param_value("value"), Some("20"));
    }

    #[test]
    fn distinct_over_unique_rows() {
        assert_eq!(Fixture::new("SELECT DISTINCT empno, ename FROM emp").ids(unnecessary_distinct), vec![83]);
        assert!(Fixture::new("SELECT DISTINCT job FROM emp").run(unnecessary_distinct).is_empty());
    }

    #[test]
    fn correlation_names() {
        assert_eq!(Fixture::new("SELECT ename FROM emp e").ids(unused_correlation_names), vec![85]);
        assert!(Fixture::new("SELECT e.ename FROM emp e")
            .run(unused_correlation_names)
            .is_empty());
        let same = Fixture::new("SELECT a.ename FROM emp a, emp b WHERE a.empno = b.empno");
        assert_eq!(same.ids(identical_correlation_names), vec![86]);
    }

    #[test]
    fn like_and_exists_clutter() {
        assert_eq!(
            Fixture::new("SELECT ename FROM emp WHERE job LIKE 'CLERK'").ids(like_without_wildcards),
            vec![88]
        );
        let exists = Fixture::new(
            "SELECT dname FROM dept d WHERE EXISTS \
             (SELECT ename FROM emp e WHERE e.deptno = d.deptno GROUP BY ename ORDER BY ename)",
        );
        assert_eq!(exists.ids(subquery_clutter), vec![89, 94, 100]);
        assert!(Fixture::new("SELECT dname FROM dept d WHERE EXISTS (SELECT * FROM emp e WHERE e.deptno = d.deptno)")
            .run(subquery_clutter)
            .is_empty());
    }

    #[test]
    fn in_over_the_same_relation() {
        let fixture = Fixture::new(
            "SELECT ename FROM emp WHERE empno IN (SELECT empno FROM emp WHERE sal > 1000)",
        );
        assert_eq!(fixture.ids(replaceable_subqueries), vec![90]);
        let other = Fixture::new("SELECT ename FROM emp WHERE empno IN (SELECT mgr FROM emp)");
        assert!(other.run(replaceable_subqueries).is_empty());
    }

    #[test]
    fn aggregate_arguments_that_do_nothing() {
        let fixture = Fixture::new(
            "SELECT deptno, MAX(deptno), MIN(DISTINCT sal), COUNT(empno) FROM emp GROUP BY deptno",
        );
        assert_eq!(fixture.ids(aggregate_arguments), vec![91, 92, 93]);
        assert!(Fixture::new("SELECT COUNT(comm) FROM emp").run(aggregate_arguments).is_empty());
    }

    #[test]
    fn grouping_complications() {
        assert_eq!(
            Fixture::new("SELECT empno, COUNT(*) FROM emp GROUP BY empno").ids(grouping),
            vec![95]
        );
        assert_eq!(
            Fixture::new("SELECT job, COUNT(*) FROM emp WHERE job = 'CLERK' GROUP BY job").ids(grouping),
            vec![96]
        );
        assert_eq!(Fixture::new("SELECT job FROM emp GROUP BY job").ids(grouping), vec![97]);
        assert_eq!(
            Fixture::new("SELECT job, COUNT(*) FROM emp GROUP BY job HAVING job <> 'CLERK'").ids(grouping),
            vec![101]
        );
    }

    #[test]
    fn unions_of_one_relation() {
        let fixture = Fixture::new(
            "SELECT empno, ename FROM emp WHERE sal > 1000 UNION SELECT empno, ename FROM emp WHERE sal < 500",
        );
        assert_eq!(fixture.ids(unions), vec![98, 102]);
        let overlapping = Fixture::new(
            "SELECT empno FROM emp WHERE sal > 1000 UNION SELECT empno FROM emp WHERE sal > 500",
        );
        assert_eq!(overlapping.ids(unions), vec![98]);
    }

    #[test]
    fn order_by_after_key() {
        let fixture = Fixture::new("SELECT empno, ename FROM emp ORDER BY empno, ename");
        assert_eq!(fixture.ids(ordering_columns), vec![99]);
        assert!(Fixture::new("SELECT ename FROM emp ORDER BY ename, empno")
            .run(ordering_columns)
            .is_empty());
    }

    #[test]
    fn outer_condition_in_subquery() {
        let fixture = Fixture::new(
            "SELECT dname FROM dept d WHERE EXISTS \
             (SELECT * FROM emp e WHERE e.deptno = d.deptno AND d.loc = 'DALLAS')",
        );
        let findings = fixture.run(movable_conditions);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].param_value("expression"), Some("d.loc = 'DALLAS'"));
    }

    #[test]
    fn outer_join_complications() {
        let preserved = Fixture::new(
            "SELECT d.dname, e.ename FROM dept d LEFT JOIN emp e ON e.deptno = d.deptno AND d.loc = 'DALLAS'",
        );
        assert_eq!(preserved.ids(outer_joins), vec![104]);
        let rejected = Fixture::new(
            "SELECT d.dname, e.ename FROM dept d LEFT JOIN emp e ON e.deptno = d.deptno WHERE e.sal > 1000",
        );
        let findings = rejected.run(outer_joins);
        assert_eq!(findings.iter().map(|f| f.id).collect::<Vec<_>>(), vec![105]);
        assert_eq!(findings[0].param_value("variable"), Some("e"));
        let anti = Fixture::new(
            "SELECT d.dname FROM dept d LEFT JOIN emp e ON e.deptno = d.deptno WHERE e.empno IS NULL",
        );
        assert!(anti.run(outer_joins).is_empty());
    }

    #[test]
    fn simple_derived_table() {
        let fixture = Fixture::new("SELECT x.ename FROM (SELECT ename, sal FROM emp WHERE sal > 1000) x");
        assert_eq!(fixture.ids(derived_tables), vec![106]);
        let grouped = Fixture::new("SELECT x.n FROM (SELECT COUNT(*) AS n FROM emp GROUP BY deptno) x");
        assert!(grouped.run(derived_tables).is_empty());
    }
}
