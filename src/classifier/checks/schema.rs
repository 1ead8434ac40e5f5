use std::collections::BTreeMap;

use sqlparser::ast::{BinaryOperator, Expr, SelectItem, Value};

use crate::catalog::TypeClass;
use crate::classifier::checks::{projection, scope_exprs};
use crate::classifier::context::CheckContext;
use crate::classifier::finding::{Finding, Location};
use crate::logic::atom::{literal_scalar, parse_date_literal, DateFieldError};
use crate::logic::CompareOp;
use crate::parser::expr::{
    aggregate_calls, canonical_text, child_exprs, column_idents, contains_aggregate,
    function_args, is_aggregate_call, is_constant, is_null_literal, normalized_function_name,
    string_literal, unnest, walk_expr, AGGREGATE_FUNCTIONS,
};
use crate::parser::lexical::Clause;
use crate::parser::names::{closest_match, ident_key};
use crate::parser::sql_parser::alias_without_as;
use crate::query::{Resolution, ResolvedColumn, ScopeId, ScopeRole, SelectScope, VarSource};

/// Built-in functions of `PostgreSQL` that the checks accept without a catalog entry.
pub const BUILTIN_FUNCTIONS: &[&str] = &[
    "abs", "age", "array_length", "array_to_string", "btrim", "ceil", "ceiling", "char_length",
    "character_length", "coalesce", "concat", "concat_ws", "cume_dist", "current_date",
    "current_time", "current_timestamp", "current_user", "date_part", "date_trunc", "dense_rank",
    "exp", "first_value", "floor", "format", "generate_series", "greatest", "initcap", "lag",
    "last_value", "lead", "least", "left", "length", "ln", "localtime", "localtimestamp", "log",
    "lower", "lpad", "ltrim", "make_date", "md5", "mod", "now", "ntile", "nullif",
    "octet_length", "percent_rank", "power", "random", "rank", "regexp_matches",
    "regexp_replace", "repeat", "replace", "reverse", "right", "round", "row_number", "rpad",
    "rtrim", "sign", "split_part", "sqrt", "string_to_array", "strpos", "substr", "to_char",
    "to_date", "to_number", "to_timestamp", "trunc", "unnest", "upper",
];

const MAX_EDITS: usize = 2;

fn walk_scope<'q>(
    ctx: &CheckContext<'_, 'q>,
    scope: &SelectScope<'q>,
    visit: &mut dyn FnMut(Clause, &'q Expr),
) {
    for (clause, expr) in scope_exprs(ctx.model(), scope) {
        walk_expr(expr, &mut |node| visit(clause, node));
    }
}

/// The same relation twice in one FROM clause under the same name (1).
pub fn repeated_correlation_names(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let model = ctx.model();
    let mut findings = Vec::new();
    for scope in &model.scopes {
        let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
        for var in &scope.vars {
            let tuple = model.var(*var);
            let count = seen.entry(tuple.name.as_str()).or_insert(0);
            *count += 1;
            if *count == 2 {
                findings.push(
                    Finding::syntax(1, ctx.at_var(*var)).param("relation", &tuple.name),
                );
            }
        }
    }
    findings
}

/// A SELECT item whose alias, written without `AS`, names a column of the
/// FROM clause: `SELECT ename sal` meant `SELECT ename, sal` (33).
pub fn select_list_commas(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let model = ctx.model();
    let mut findings = Vec::new();
    for scope in &model.scopes {
        for item in &scope.select.projection {
            let SelectItem::ExprWithAlias { expr, alias } = item else {
                continue;
            };
            let key = ident_key(alias);
            let names_column = scope.vars.iter().any(|var| {
                model
                    .columns_of(*var)
                    .is_some_and(|columns| columns.iter().any(|column| column.name == key))
            });
            if names_column && alias_without_as(ctx.sql, alias) {
                findings.push(
                    Finding::syntax(33, ctx.at_expr(Some(Clause::Select), expr))
                        .param("text", format!("{expr} {alias}")),
                );
            }
        }
    }
    findings
}

/// Column references that do not resolve: ambiguous (2), undefined (4),
/// misspelled (9), undefined correlation names (25) and relation names used
/// as columns (27).
pub fn column_references(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let model = ctx.model();
    let mut findings = Vec::new();
    for reference in &model.column_refs {
        let location = ctx.at_expr(Some(reference.clause), reference.expr);
        let visible = visible_vars(ctx, reference.scope);
        match &reference.resolution {
            Resolution::Ambiguous { column, vars } => {
                let candidates: Vec<String> =
                    vars.iter().map(|v| format!("`{}`", model.var(*v).name)).collect();
                findings.push(
                    Finding::syntax(2, location)
                        .param("column", column)
                        .param("candidates", candidates.join(" and ")),
                );
            }
            Resolution::UndefinedColumn { var, column } => {
                let names_relation = var.is_none()
                    && (visible.iter().any(|v| model.var(*v).name == *column)
                        || ctx.catalog.lookup(column).is_some());
                if names_relation {
                    findings.push(Finding::syntax(27, location).param("name", column));
                    continue;
                }
                findings.push(Finding::syntax(4, location.clone()).param("column", reference.expr));
                let pool: Vec<&str> = match var {
                    Some(var) => column_names(ctx, &[*var]),
                    None => column_names(ctx, &visible),
                };
                if let Some(suggestion) = closest_match(column, pool, MAX_EDITS) {
                    findings.push(
                        Finding::syntax(9, location)
                            .param("name", column)
                            .param("suggestion", suggestion),
                    );
                }
            }
            Resolution::UndefinedQualifier { qualifier, .. } => {
                findings.push(Finding::syntax(25, location.clone()).param("qualifier", qualifier));
                let names = visible.iter().map(|v| model.var(*v).name.as_str());
                if let Some(suggestion) = closest_match(qualifier, names, MAX_EDITS) {
                    findings.push(
                        Finding::syntax(9, location)
                            .param("name", qualifier)
                            .param("suggestion", suggestion),
                    );
                }
            }
            Resolution::Column(_) | Resolution::OutputAlias(_) | Resolution::UnknownSource(_) => {}
        }
    }
    findings
}

/// Tuple variables visible from `scope`, innermost first.
fn visible_vars(ctx: &CheckContext<'_, '_>, scope: ScopeId) -> Vec<usize> {
    let model = ctx.model();
    let mut vars = Vec::new();
    let mut current = Some(scope);
    while let Some(s) = current {
        vars.extend(model.scope(s).vars.iter().copied());
        current = model.scope(s).outer;
    }
    vars
}

fn column_names<'a>(ctx: &CheckContext<'a, '_>, vars: &[usize]) -> Vec<&'a str> {
    vars.iter()
        .filter_map(|v| ctx.model().columns_of(*v))
        .flatten()
        .map(|c| c.name.as_str())
        .collect()
}

/// Relations that are not in the catalog (7), unknown schemas (8) and
/// likely misspellings of either (9).
pub fn relation_references(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let model = ctx.model();
    let mut findings = Vec::new();
    for tuple in &model.vars {
        let VarSource::Unresolved { schema, name } = &tuple.source else {
            continue;
        };
        let location = ctx.at_var(tuple.id);
        match schema {
            Some(schema) if !ctx.catalog.has_schema(schema) => {
                findings.push(Finding::syntax(8, location.clone()).param("schema", schema));
                let schemas = ctx.catalog.schema_names();
                if let Some(suggestion) = closest_match(schema, schemas, MAX_EDITS) {
                    findings.push(
                        Finding::syntax(9, location)
                            .param("name", schema)
                            .param("suggestion", suggestion),
                    );
                }
            }
            _ => {
                let written = tuple.object.map_or_else(|| name.clone(), ToString::to_string);
                findings.push(Finding::syntax(7, location.clone()).param("relation", written));
                let candidates = ctx
                    .catalog
                    .relation_names()
                    .chain(model.ctes.iter().map(|c| c.name.as_str()));
                if let Some(suggestion) = closest_match(name, candidates, MAX_EDITS) {
                    findings.push(
                        Finding::syntax(9, location)
                            .param("name", name)
                            .param("suggestion", suggestion),
                    );
                }
            }
        }
    }
    findings
}

/// Calls of functions that are neither built in nor in the catalog (5).
///
/// Heuristic: the built-in list covers common functions only.
pub fn undefined_functions(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for scope in &ctx.model().scopes {
        walk_scope(ctx, scope, &mut |clause, node| {
            let Expr::Function(func) = node else {
                return;
            };
            let name = normalized_function_name(func);
            let known = AGGREGATE_FUNCTIONS.contains(&name.as_str())
                || BUILTIN_FUNCTIONS.contains(&name.as_str())
                || ctx.catalog.has_function(&name);
            if !known {
                findings.push(
                    Finding::syntax(5, ctx.at_expr(Some(clause), node))
                        .param("function", &func.name)
                        .heuristic(),
                );
            }
        });
    }
    findings
}

/// Placeholders such as `$1` or `?` (6).
pub fn undefined_parameters(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for scope in &ctx.model().scopes {
        walk_scope(ctx, scope, &mut |clause, node| {
            if let Expr::Value(Value::Placeholder(name)) = node {
                findings.push(Finding::syntax(6, ctx.at_expr(Some(clause), node)).param("parameter", name));
            }
        });
    }
    findings
}

enum Side {
    Column(ResolvedColumn),
    Literal,
    Undefined(String),
    Other,
}

fn classify_side(ctx: &CheckContext<'_, '_>, scope: ScopeId, expr: &Expr) -> Side {
    let expr = unnest(expr);
    if let Some(idents) = column_idents(expr) {
        return match ctx.model().resolve(scope, idents) {
            Resolution::Column(column) => Side::Column(column),
            Resolution::UndefinedColumn { var: None, column } if idents.len() == 1 => {
                Side::Undefined(column)
            }
            _ => Side::Other,
        };
    }
    if is_constant(expr) && !is_null_literal(expr) {
        Side::Literal
    } else {
        Side::Other
    }
}

fn literal_class(expr: &Expr) -> Option<TypeClass> {
    match unnest(expr) {
        Expr::Value(Value::Number(text, _)) if text.contains(['.', 'e', 'E']) => {
            Some(TypeClass::Numeric)
        }
        Expr::Value(Value::Number(..)) => Some(TypeClass::Integer),
        Expr::UnaryOp { expr, .. } => literal_class(expr),
        Expr::Value(Value::Boolean(_)) => Some(TypeClass::Boolean),
        _ => None,
    }
}

/// Bare words compared with character columns (11) and comparisons across
/// incompatible domains (13).
pub fn comparison_types(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for scope in &ctx.model().scopes {
        walk_scope(ctx, scope, &mut |clause, node| {
            let Expr::BinaryOp { left, op, right } = node else {
                return;
            };
            if CompareOp::from_binary(op).is_none() {
                return;
            }
            let sides = (
                classify_side(ctx, scope.id, left),
                classify_side(ctx, scope.id, right),
            );
            let location = ctx.at_expr(Some(clause), node);
            match sides {
                (Side::Column(column), Side::Undefined(word))
                | (Side::Undefined(word), Side::Column(column))
                    if column.type_class == TypeClass::Text =>
                {
                    findings.push(Finding::syntax(11, location).param("name", word));
                }
                (Side::Column(a), Side::Column(b)) => {
                    if !a.type_class.is_compatible_with(b.type_class) {
                        findings.push(mismatch(location, left, a.type_class, right, b.type_class));
                    }
                }
                (Side::Column(column), Side::Literal) => {
                    if let Some(found) = literal_mismatch(&column, right) {
                        findings.push(mismatch(location, left, column.type_class, right, found));
                    }
                }
                (Side::Literal, Side::Column(column)) => {
                    if let Some(found) = literal_mismatch(&column, left) {
                        findings.push(mismatch(location, left, found, right, column.type_class));
                    }
                }
                _ => {}
            }
        });
    }
    findings
}

/// Class of a literal that cannot be read in the column's domain.
fn literal_mismatch(column: &ResolvedColumn, literal: &Expr) -> Option<TypeClass> {
    let expected = column.type_class;
    if expected == TypeClass::Other {
        return None;
    }
    if let Some(text) = string_literal(literal) {
        // Out-of-range dates are reported as field overflows.
        if expected == TypeClass::Temporal {
            return matches!(parse_date_literal(text), Err(DateFieldError::Malformed))
                .then_some(TypeClass::Text);
        }
        return literal_scalar(literal, Some(expected))
            .is_none()
            .then_some(TypeClass::Text);
    }
    let found = literal_class(literal)?;
    (!expected.is_compatible_with(found)).then_some(found)
}

fn mismatch(
    location: Location,
    left: &Expr,
    left_type: TypeClass,
    right: &Expr,
    right_type: TypeClass,
) -> Finding {
    Finding::syntax(13, location)
        .param("left", left)
        .param("left_type", left_type)
        .param("right", right)
        .param("right_type", right_type)
}

/// `x = 'a' OR 'b'`: a bare value as an operand of AND/OR (12).
pub fn operator_without_column(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for scope in &ctx.model().scopes {
        walk_scope(ctx, scope, &mut |clause, node| {
            let Expr::BinaryOp {
                left,
                op: BinaryOperator::And | BinaryOperator::Or,
                right,
            } = node
            else {
                return;
            };
            let bare_value = |e: &Expr| {
                is_constant(e) && !matches!(unnest(e), Expr::Value(Value::Boolean(_) | Value::Null))
            };
            let condition = |e: &Expr| {
                matches!(
                    unnest(e),
                    Expr::BinaryOp { op, .. } if CompareOp::from_binary(op).is_some()
                        || matches!(op, BinaryOperator::And | BinaryOperator::Or)
                )
            };
            if (bare_value(right) && condition(left)) || (bare_value(left) && condition(right)) {
                findings.push(
                    Finding::syntax(12, ctx.at_expr(Some(clause), node)).param("expression", node),
                );
            }
        });
    }
    findings
}

/// Aggregates outside SELECT and HAVING (14), nested aggregates (15), columns
/// neither grouped nor aggregated (16) and HAVING without GROUP BY (17).
pub fn grouping(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let model = ctx.model();
    let mut findings = Vec::new();
    for scope in &model.scopes {
        let exprs = scope_exprs(model, scope);
        for (clause, expr) in &exprs {
            for func in aggregate_calls(expr) {
                if matches!(clause, Clause::Where | Clause::GroupBy | Clause::From) {
                    findings.push(
                        Finding::syntax(14, ctx.at_expr(Some(*clause), expr))
                            .param("function", &func.name)
                            .param("clause", clause),
                    );
                }
                for arg in function_args(func) {
                    for inner in aggregate_calls(arg) {
                        findings.push(
                            Finding::syntax(15, ctx.at_expr(Some(*clause), expr))
                                .param("inner", inner)
                                .param("outer", &func.name),
                        );
                    }
                }
            }
        }
        let grouped = !scope.group_by().is_empty()
            || exprs.iter().any(|(clause, expr)| {
                matches!(clause, Clause::Select | Clause::Having | Clause::OrderBy)
                    && contains_aggregate(expr)
            });
        if scope.select.having.is_some() && scope.group_by().is_empty() {
            findings.push(Finding::syntax(17, ctx.at_scope(scope.id)));
        }
        if !grouped {
            continue;
        }
        let group_texts: Vec<String> = scope.group_by().iter().map(canonical_text).collect();
        let group_keys: Vec<ResolvedColumn> = scope
            .group_by()
            .iter()
            .filter_map(|e| model.resolve_expr(scope.id, e))
            .collect();
        for (clause, expr) in &exprs {
            if !matches!(clause, Clause::Select | Clause::Having | Clause::OrderBy) {
                continue;
            }
            let mut bare = Vec::new();
            ungrouped_columns(expr, &group_texts, &mut bare);
            for column in bare {
                let Some(resolved) = model.resolve_expr(scope.id, column) else {
                    continue;
                };
                if resolved.outer || determined_by(ctx, &resolved, &group_keys) {
                    continue;
                }
                findings.push(
                    Finding::syntax(16, ctx.at_expr(Some(*clause), column)).param("column", column),
                );
            }
        }
    }
    findings
}

/// Column references outside aggregates that are not part of a grouped expression.
fn ungrouped_columns<'q>(expr: &'q Expr, group_texts: &[String], out: &mut Vec<&'q Expr>) {
    if group_texts.contains(&canonical_text(expr)) {
        return;
    }
    match expr {
        Expr::Function(func) if is_aggregate_call(func) => {}
        _ if column_idents(expr).is_some() => out.push(expr),
        _ => {
            for child in child_exprs(expr) {
                ungrouped_columns(child, group_texts, out);
            }
        }
    }
}

/// True when the column is grouped, or the primary key of its variable is.
fn determined_by(
    ctx: &CheckContext<'_, '_>,
    column: &ResolvedColumn,
    group_keys: &[ResolvedColumn],
) -> bool {
    if group_keys.iter().any(|g| g.key == column.key) {
        return true;
    }
    let Some(relation) = ctx.model().relation_of(column.key.var) else {
        return false;
    };
    !relation.primary_key.is_empty()
        && relation.primary_key.iter().all(|pk| {
            group_keys
                .iter()
                .any(|g| g.key.var == column.key.var && g.key.column == *pk)
        })
}

/// Columns referenced in a SELECT without FROM (20).
pub fn missing_from(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let model = ctx.model();
    model
        .scopes
        .iter()
        .filter(|scope| scope.select.from.is_empty())
        .filter(|scope| {
            model.refs_in(scope.id).any(|r| {
                matches!(
                    r.resolution,
                    Resolution::UndefinedColumn { .. } | Resolution::UndefinedQualifier { .. }
                )
            })
        })
        .map(|scope| Finding::syntax(20, ctx.at_scope(scope.id)))
        .collect()
}

/// `x = NULL` and friends (21).
pub fn null_comparisons(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for scope in &ctx.model().scopes {
        walk_scope(ctx, scope, &mut |clause, node| {
            if let Expr::BinaryOp { left, op, right } = node {
                if CompareOp::from_binary(op).is_some()
                    && (is_null_literal(left) || is_null_literal(right))
                {
                    findings.push(
                        Finding::syntax(21, ctx.at_expr(Some(clause), node)).param("expression", node),
                    );
                }
            }
        });
    }
    findings
}

/// Date and timestamp literals with a field out of range (23).
pub fn date_literals(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    for scope in &ctx.model().scopes {
        walk_scope(ctx, scope, &mut |clause, node| {
            let dated: Vec<(&Expr, &str)> = match node {
                Expr::TypedString { data_type, value }
                    if TypeClass::from_sql_type(&data_type.to_string()) == TypeClass::Temporal =>
                {
                    vec![(node, value.as_str())]
                }
                Expr::BinaryOp { left, op, right } if CompareOp::from_binary(op).is_some() => {
                    let temporal = |e: &Expr| {
                        ctx.model()
                            .resolve_expr(scope.id, e)
                            .is_some_and(|c| c.type_class == TypeClass::Temporal)
                    };
                    [(left, right), (right, left)]
                        .into_iter()
                        .filter(|(column, _)| temporal(column))
                        .filter_map(|(_, other)| Some((other.as_ref(), string_literal(other)?)))
                        .collect()
                }
                _ => Vec::new(),
            };
            for (literal, text) in dated {
                if let Err(DateFieldError::Overflow { field, value }) = parse_date_literal(text) {
                    findings.push(
                        Finding::syntax(23, ctx.at_expr(Some(clause), literal))
                            .param("literal", literal)
                            .param("field", format!("{field} {value}")),
                    );
                }
            }
        });
    }
    findings
}

/// Subqueries returning several columns where one is expected (26).
pub fn subquery_width(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let model = ctx.model();
    model
        .scopes
        .iter()
        .filter(|scope| matches!(scope.role, ScopeRole::In | ScopeRole::Quantified | ScopeRole::Scalar))
        .filter(|scope| {
            !matches!(
                scope.host_expr.map(unnest),
                Some(Expr::InSubquery { expr, .. }) if matches!(unnest(expr), Expr::Tuple(_))
            )
        })
        .filter_map(|scope| {
            let count = model.outputs(scope.id)?.len();
            (count > 1).then(|| Finding::syntax(26, ctx.at_scope(scope.id)).param("count", count))
        })
        .collect()
}

/// Comparisons as SELECT items (28) and bare columns as WHERE (29).
pub fn misplaced_conditions(ctx: &CheckContext<'_, '_>) -> Vec<Finding> {
    let model = ctx.model();
    let mut findings = Vec::new();
    for scope in &model.scopes {
        for (expr, alias) in projection(scope) {
            let Expr::BinaryOp { left, op, right } = unnest(expr) else {
                continue;
            };
            let restricts = CompareOp::from_binary(op).is_some()
                && ((column_idents(unnest(left)).is_some() && is_constant(right))
                    || (is_constant(left) && column_idents(unnest(right)).is_some()));
            if restricts && alias.is_none() {
                findings.push(
                    Finding::syntax(28, ctx.at_expr(Some(Clause::Select), expr))
                        .param("expression", expr)
                        .heuristic(),
                );
            }
        }
        let Some(selection) = &scope.select.selection else {
            continue;
        };
        let projected = match unnest(selection) {
            Expr::Tuple(items) => items.iter().all(|e| column_idents(unnest(e)).is_some()),
            other => model
                .resolve_expr(scope.id, other)
                .is_some_and(|c| c.type_class != TypeClass::Boolean && c.type_class != TypeClass::Other),
        };
        if projected {
            findings.push(
                Finding::syntax(29, ctx.at_expr(Some(Clause::Where), selection))
                    .param("expression", selection),
            );
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::checks::test_support::Fixture;

    #[test]
    fn undefined_and_misspelled_columns() {
        let fixture = Fixture::new("SELECT enam FROM emp WHERE x.sal > 1");
        let findings = fixture.run(column_references);
        let ids: Vec<u16> = findings.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![4, 9, 25]);
        assert_eq!(findings[1].message(), "`enam` does not exist; did you mean `ename`?");
    }

    #[test]
    fn ambiguous_and_relation_as_column() {
        let fixture = Fixture::new("SELECT deptno, dept FROM emp e JOIN dept d ON e.deptno = d.deptno");
        let findings = fixture.run(column_references);
        assert_eq!(findings.iter().map(|f| f.id).collect::<Vec<_>>(), vec![2, 27]);
        assert_eq!(
            findings[0].message(),
            "column `deptno` is ambiguous: it exists in `e` and `d`"
        );
    }

    #[test]
    fn unknown_relations_and_schemas() {
        let fixture = Fixture::new("SELECT * FROM empp, nowhere.dept");
        assert_eq!(fixture.ids(relation_references), vec![7, 9, 8]);
    }

    #[test]
    fn repeated_relation_needs_aliases() {
        assert_eq!(Fixture::new("SELECT 1 FROM emp, emp").ids(repeated_correlation_names), vec![1]);
        assert!(Fixture::new("SELECT 1 FROM emp e, emp m").ids(repeated_correlation_names).is_empty());
    }

    #[test]
    fn alias_naming_a_column_is_a_missing_comma() {
        let findings = Fixture::new("SELECT ename sal, job AS deptno, sal total FROM emp").run(select_list_commas);
        assert_eq!(findings.iter().map(|f| f.id).collect::<Vec<_>>(), vec![33]);
        assert_eq!(findings[0].message(), "a comma is missing near `ename sal`");
        assert_eq!(findings[0].location.snippet, "ename");
    }

    #[test]
    fn type_problems() {
        let fixture = Fixture::new(
            "SELECT ename FROM emp WHERE ename = SMITH AND sal = 'abc' AND hiredate > '1981-02-30'",
        );
        assert_eq!(fixture.ids(comparison_types), vec![11, 13]);
        assert_eq!(fixture.ids(date_literals), vec![23]);
    }

    #[test]
    fn grouping_errors() {
        let fixture = Fixture::new(
            "SELECT deptno, ename, MAX(COUNT(*)) FROM emp WHERE SUM(sal) > 1 GROUP BY deptno",
        );
        assert_eq!(fixture.ids(grouping), vec![15, 14, 16]);
        let by_key = Fixture::new("SELECT e.empno, e.ename, COUNT(*) FROM emp e GROUP BY e.empno");
        assert!(by_key.ids(grouping).is_empty());
        assert_eq!(Fixture::new("SELECT COUNT(*) FROM emp HAVING COUNT(*) > 1").ids(grouping), vec![17]);
    }

    #[test]
    fn null_comparison_and_bare_values() {
        let fixture = Fixture::new("SELECT ename FROM emp WHERE mgr = NULL OR job = 'CLERK' OR 'MANAGER'");
        assert_eq!(fixture.ids(null_comparisons), vec![21]);
        assert_eq!(fixture.ids(operator_without_column), vec![12]);
    }

    #[test]
    fn subquery_with_two_columns() {
        let fixture = Fixture::new("SELECT ename FROM emp WHERE deptno IN (SELECT deptno, dname FROM dept)");
        assert_eq!(fixture.ids(subquery_width), vec![26]);
    }

    #[test]
    fn functions_parameters_and_missing_from() {
        assert_eq!(Fixture::new("SELECT lenght(ename) FROM emp").ids(undefined_functions), vec![5]);
        assert!(Fixture::new("SELECT upper(ename) FROM emp").ids(undefined_functions).is_empty());
        assert_eq!(Fixture::new("SELECT ename FROM emp WHERE sal > $1").ids(undefined_parameters), vec![6]);
        assert_eq!(Fixture::new("SELECT ename WHERE sal > 1").ids(missing_from), vec![20]);
    }

    #[test]
    fn conditions_in_the_wrong_clause() {
        assert_eq!(Fixture::new("SELECT sal > 1000 FROM emp").ids(misplaced_conditions), vec![28]);
        assert_eq!(Fixture::new("SELECT ename FROM emp WHERE ename").ids(misplaced_conditions), vec![29]);
    }
}
