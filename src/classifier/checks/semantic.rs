use std::collections::BTreeSet;

use sqlparser::ast::{BinaryOperator, Expr, SelectItem, SetExpr};

use crate::classifier::checks::{
    at_literal, at_predicate, conjunction_text, filter_rejects_null, literal_text, output_has_key,
    predicate_text, projection, scope_exprs, shared_constants,
};
use crate::classifier::context::CheckContext;
use crate::classifier::finding::{Finding, Location};
use crate::logic::{AtomKind, Conflict, NormalizedPredicate, Operand, OracleReport, Simplification};
use crate::parser::expr::{
    canonical_text, function_has_distinct, normalized_function_name, string_literal, walk_expr,
};
use crate::parser::lexical::Clause;
use crate::parser::names::ident_key;
use crate::query::scope::output_name;
use crate::query::{ScopeRole, SelectScope, VarId};
use crate::sampler::{Probe, ProbePlan};

/// Contradictions (39), tautologies and inconsistencies (40), `IS NOT NULL`
/// implied by a comparison (45) and output columns fixed by WHERE (50).
pub fn predicate_verdicts(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (predicate, report) in ctx.analysis.reports() {
        if let Some(report) = report {
            verdict_findings(ctx, predicate, report, &mut findings);
        }
    }
    for scope in &ctx.model().scopes {
        if scope.role.is_top_level() {
            findings.extend(constant_outputs(ctx, scope));
        }
    }
    findings
}

fn verdict_findings(
    ctx: &CheckContext<'_, '_>,
    predicate: &NormalizedPredicate<'_>,
    report: &OracleReport,
    findings: &mut Vec<Finding>,
) {
    let Some(dnf) = predicate.outcome.dnf() else {
        return;
    };
    for simplification in &report.simplifications {
        match simplification {
            Simplification::FormulaTrue => findings.push(
                Finding::semantic(40, at_predicate(ctx, predicate))
                    .param("detail", format!("`{}` is always true", predicate_text(predicate))),
            ),
            Simplification::FormulaFalse if dnf.conjunctions.len() > 1 => findings.push(
                Finding::semantic(40, at_predicate(ctx, predicate))
                    .param("detail", format!("`{}` is never true", predicate_text(predicate))),
            ),
            Simplification::AtomFalse {
                conjunction,
                literal,
                with,
                conflict,
            } => {
                let conjunction = &dnf.conjunctions[*conjunction];
                let culprit = conjunction[*literal];
                let atom = &predicate.atoms[culprit.atom];
                let text = literal_text(predicate, culprit);
                let others: Vec<String> = with
                    .iter()
                    .map(|position| literal_text(predicate, conjunction[*position]))
                    .collect();
                let detail = match conflict {
                    Conflict::Equalities => {
                        let mut parts = others;
                        parts.push(text);
                        findings.push(
                            Finding::semantic(39, at_literal(ctx, predicate, culprit))
                                .param("expression", parts.join(" AND ")),
                        );
                        continue;
                    }
                    // Comparisons with NULL are reported on their own.
                    Conflict::Unknown if compares_with_null(&atom.kind) => continue,
                    Conflict::Unknown => format!("`{text}` is always unknown"),
                    Conflict::Alone => format!("`{text}` is never true"),
                    Conflict::EmptyRange => format!(
                        "`{}` leaves no possible value",
                        conjunction_text(predicate, conjunction)
                    ),
                    Conflict::NullAndValue => {
                        format!("`{text}` contradicts `{}`", others.join(" AND "))
                    }
                };
                findings.push(Finding::semantic(40, at_literal(ctx, predicate, culprit)).param("detail", detail));
            }
            Simplification::AtomTrue {
                conjunction,
                literal,
                implied_by,
            } => {
                let conjunction = &dnf.conjunctions[*conjunction];
                let redundant = conjunction[*literal];
                let atom = &predicate.atoms[redundant.atom];
                if implied_by.is_empty() {
                    findings.push(Finding::semantic(40, at_literal(ctx, predicate, redundant)).param(
                        "detail",
                        format!("`{}` is always true", literal_text(predicate, redundant)),
                    ));
                } else if matches!(atom.kind, AtomKind::IsNull(_)) && !redundant.positive {
                    let implied: Vec<String> = implied_by
                        .iter()
                        .map(|position| literal_text(predicate, conjunction[*position]))
                        .collect();
                    findings.push(
                        Finding::semantic(45, at_literal(ctx, predicate, redundant))
                            .param("redundant", literal_text(predicate, redundant))
                            .param("implied_by", implied.join(" AND ")),
                    );
                }
            }
            _ => {}
        }
    }
}

fn compares_with_null(kind: &AtomKind<'_>) -> bool {
    match kind {
        AtomKind::Compare { left, right, .. } => {
            matches!(left, Operand::Null) || matches!(right, Operand::Null)
        }
        _ => false,
    }
}

/// Output columns that WHERE fixes to the same constant in every disjunct.
fn constant_outputs(ctx: &CheckContext<'_, '_>, scope: &SelectScope<'_>) -> Vec<Finding> {
    let Some(constants) = shared_constants(ctx, scope.id) else {
        return Vec::new();
    };
    projection(scope)
        .into_iter()
        .filter_map(|(expr, alias)| {
            let column = ctx.model().resolve_expr(scope.id, expr)?;
            let value = constants.get(&column.key)?;
            let name = alias.map(ident_key).unwrap_or_else(|| output_name(expr));
            Some(
                Finding::semantic(50, ctx.at_expr(Some(Clause::Select), expr))
                    .param("column", name)
                    .param("value", value),
            )
        })
        .collect()
}

/// `SUM(DISTINCT ...)` and `AVG(DISTINCT ...)` (41).
pub fn distinct_in_sum(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for scope in &ctx.model().scopes {
        for (clause, root) in scope_exprs(ctx.model(), scope) {
            walk_expr(root, &mut |expr| {
                if let Expr::Function(func) = expr {
                    let name = normalized_function_name(func);
                    if matches!(name.as_str(), "sum" | "avg") && function_has_distinct(func) {
                        findings.push(
                            Finding::semantic(41, ctx.at_expr(Some(clause), expr))
                                .param("expression", expr),
                        );
                    }
                }
            });
        }
    }
    findings
}

/// `%` compared with `=` (43) and `*` or `?` used as LIKE wildcards (44).
pub fn wildcards(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for scope in &ctx.model().scopes {
        for (clause, root) in scope_exprs(ctx.model(), scope) {
            walk_expr(root, &mut |expr| match expr {
                Expr::BinaryOp {
                    left,
                    op: BinaryOperator::Eq | BinaryOperator::NotEq,
                    right,
                } => {
                    let pattern = string_literal(left).or_else(|| string_literal(right));
                    if pattern.is_some_and(|p| p.contains('%')) {
                        findings.push(
                            Finding::semantic(43, ctx.at_expr(Some(clause), expr))
                                .param("expression", expr),
                        );
                    }
                }
                Expr::Like { pattern, .. } | Expr::ILike { pattern, .. } => {
                    let Some(text) = string_literal(pattern) else {
                        return;
                    };
                    if text.contains(['%', '_']) {
                        return;
                    }
                    if let Some(wildcard) = ['*', '?'].into_iter().find(|w| text.contains(*w)) {
                        findings.push(
                            Finding::semantic(44, ctx.at_expr(Some(clause), expr))
                                .param("pattern", text)
                                .param("wildcard", wildcard),
                        );
                    }
                }
                _ => {}
            });
        }
    }
    findings
}

/// `NOT IN` and `ALL` over a subquery whose column may be NULL (46).
///
/// Planned as a probe; without a sample the finding is reported as a heuristic.
pub fn null_in_subquery(ctx: &CheckContext<'_, '_>) -> Vec<ProbePlan> {
    let model = ctx.model();
    let mut plans = Vec::new();
    for (predicate, _) in ctx.analysis.reports() {
        let Some(dnf) = predicate.outcome.dnf() else {
            continue;
        };
        let mut planned = BTreeSet::new();
        for literal in dnf.conjunctions.iter().flatten() {
            let atom = &predicate.atoms[literal.atom];
            let subquery = match &atom.kind {
                AtomKind::InSubquery { subquery, .. } if !literal.positive => subquery,
                AtomKind::Quantified { all, subquery, .. } if *all == literal.positive => subquery,
                _ => continue,
            };
            if !planned.insert(literal.atom) {
                continue;
            }
            let Some(&inner) = model.scopes_of_query(subquery).first() else {
                continue;
            };
            let Some(first) = model.outputs(inner).and_then(<[_]>::first) else {
                continue;
            };
            if !first.nullable {
                continue;
            }
            let filtered = first.origin.as_ref().is_some_and(|key| {
                ctx.analysis.predicates[inner]
                    .filter
                    .as_ref()
                    .is_some_and(|filter| filter_rejects_null(filter, key))
            });
            if filtered {
                continue;
            }
            let finding = Finding::semantic(46, at_literal(ctx, predicate, *literal))
                .param("expression", literal_text(predicate, *literal));
            plans.push(ProbePlan {
                check: "null_in_subquery",
                probe: Probe::NullInSubquery {
                    query: (*subquery).clone(),
                },
                fallback: Some(finding.clone()),
                finding,
            });
        }
    }
    plans
}

/// Join conditions between unrelated columns (47) and tuple variables left
/// out of the join graph (48).
pub fn join_connectivity(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for report in &ctx.analysis.joins {
        for suspicious in &report.suspicious {
            findings.push(
                Finding::semantic(
                    47,
                    Location::new(None, suspicious.span, suspicious.text.clone()),
                )
                .param("expression", &suspicious.text)
                .heuristic(),
            );
        }
        for missing in report.missing() {
            let mut finding = Finding::semantic(48, ctx.at_var(missing.var))
                .param("variable", &ctx.model().var(missing.var).name);
            if let Some(conjunction) = missing.conjunction {
                finding = finding.evidence(format!("disconnected in disjunct {}", conjunction + 1));
            }
            findings.push(finding);
        }
    }
    findings
}

/// Root SELECT that can return many duplicate rows (49).
///
/// Only planned when neither DISTINCT, grouping nor the selected columns
/// rule duplicates out.
pub fn many_duplicates(ctx: &CheckContext<'_, '_>) -> Vec<ProbePlan> {
    let model = ctx.model();
    if !matches!(ctx.analysis.query.body.as_ref(), SetExpr::Select(_)) {
        return Vec::new();
    }
    let Some(root) = model.scopes.iter().find(|s| s.role == ScopeRole::Root) else {
        return Vec::new();
    };
    if root.select.distinct.is_some()
        || !root.group_by().is_empty()
        || root.select.having.is_some()
        || model.is_single_row(root.id)
        || root.vars.is_empty()
    {
        return Vec::new();
    }
    if root.vars.iter().all(|var| output_has_key(ctx, root, *var)) {
        return Vec::new();
    }
    vec![ProbePlan {
        check: "many_duplicates",
        probe: Probe::Duplicates {
            query: ctx.analysis.query.clone(),
        },
        finding: Finding::semantic(49, ctx.at_scope(root.id)),
        fallback: None,
    }]
}

/// The same expression or column selected twice (51).
pub fn duplicate_outputs(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let model = ctx.model();
    let mut findings = Vec::new();
    for scope in &model.scopes {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for item in &scope.select.projection {
            let covered: Vec<VarId> = match item {
                SelectItem::Wildcard(_) => scope.vars.clone(),
                SelectItem::QualifiedWildcard(name, _) => {
                    let qualifier = name.0.last().map(ident_key);
                    scope
                        .vars
                        .iter()
                        .copied()
                        .filter(|var| Some(&model.var(*var).name) == qualifier.as_ref())
                        .collect()
                }
                _ => continue,
            };
            for var in covered {
                for column in model.columns_of(var).unwrap_or_default() {
                    seen.insert(format!("{var}.{}", column.name));
                }
            }
        }
        for (expr, _) in projection(scope) {
            let key = match model.resolve_expr(scope.id, expr) {
                Some(column) if !column.outer => {
                    format!("{}.{}", column.key.var, column.key.column)
                }
                _ => canonical_text(expr),
            };
            if !seen.insert(key) {
                findings.push(
                    Finding::semantic(51, ctx.at_expr(Some(Clause::Select), expr))
                        .param("expression", expr),
                );
            }
        }
    }
    findings
}
