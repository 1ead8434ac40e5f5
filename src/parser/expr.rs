use sqlparser::ast::{
    DuplicateTreatment, Expr, Function, FunctionArg, FunctionArgExpr, FunctionArguments, Ident,
    Query, Value,
};

use crate::parser::names::normalize_identifier;

/// Aggregate functions recognised by the checks.
pub const AGGREGATE_FUNCTIONS: &[&str] = &[
    "count",
    "sum",
    "avg",
    "min",
    "max",
    "every",
    "bool_and",
    "bool_or",
    "string_agg",
    "array_agg",
    "stddev",
    "variance",
];

/// Extract a simple column name from an expression.
///
/// Supports plain identifiers (`sal`) and qualified identifiers
/// (`public.emp.sal`), returning only the terminal column component.
pub fn extract_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.clone()),
        Expr::CompoundIdentifier(parts) => Some(parts.last()?.value.clone()),
        Expr::Nested(inner) => extract_column_name(inner),
        Expr::Cast { expr, .. } => extract_column_name(expr),
        _ => None,
    }
}

/// Identifier parts of a column reference, without unwrapping anything.
pub fn column_idents(expr: &Expr) -> Option<&[Ident]> {
    match expr {
        Expr::Identifier(ident) => Some(std::slice::from_ref(ident)),
        Expr::CompoundIdentifier(parts) => Some(parts.as_slice()),
        _ => None,
    }
}

/// Strip redundant parentheses.
pub fn unnest(expr: &Expr) -> &Expr {
    match expr {
        Expr::Nested(inner) => unnest(inner),
        other => other,
    }
}

/// Extract the expression payload from a SQL function argument.
pub fn function_arg_expr(arg: &FunctionArg) -> Option<&Expr> {
    match arg {
        FunctionArg::Unnamed(FunctionArgExpr::Expr(expr))
        | FunctionArg::Named {
            arg: FunctionArgExpr::Expr(expr),
            ..
        }
        | FunctionArg::ExprNamed {
            arg: FunctionArgExpr::Expr(expr),
            ..
        } => Some(expr),
        _ => None,
    }
}

/// Lower-cased terminal name of a function call.
pub fn normalized_function_name(func: &Function) -> String {
    func.name
        .0
        .last()
        .map(|ident| normalize_identifier(&ident.value))
        .unwrap_or_default()
}

/// Expression arguments of a function call, skipping wildcards.
pub fn function_args(func: &Function) -> Vec<&Expr> {
    match &func.args {
        FunctionArguments::List(list) => list.args.iter().filter_map(function_arg_expr).collect(),
        _ => Vec::new(),
    }
}

/// True for `COUNT(*)` style calls.
pub fn function_has_wildcard(func: &Function) -> bool {
    match &func.args {
        FunctionArguments::List(list) => list.args.iter().any(|arg| {
            matches!(
                arg,
                FunctionArg::Unnamed(FunctionArgExpr::Wildcard)
                    | FunctionArg::Unnamed(FunctionArgExpr::QualifiedWildcard(_))
            )
        }),
        _ => false,
    }
}

/// True when the argument list starts with `DISTINCT`.
pub fn function_has_distinct(func: &Function) -> bool {
    matches!(
        &func.args,
        FunctionArguments::List(list)
            if matches!(list.duplicate_treatment, Some(DuplicateTreatment::Distinct))
    )
}

/// True when the call is an aggregate (and not a window function).
pub fn is_aggregate_call(func: &Function) -> bool {
    func.over.is_none() && AGGREGATE_FUNCTIONS.contains(&normalized_function_name(func).as_str())
}

/// Direct sub-expressions of `expr`. Subqueries are not entered.
pub fn child_exprs(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::BinaryOp { left, right, .. } => vec![left.as_ref(), right.as_ref()],
        Expr::UnaryOp { expr, .. }
        | Expr::Nested(expr)
        | Expr::IsNull(expr)
        | Expr::IsNotNull(expr)
        | Expr::IsTrue(expr)
        | Expr::IsNotTrue(expr)
        | Expr::IsFalse(expr)
        | Expr::IsNotFalse(expr)
        | Expr::IsUnknown(expr)
        | Expr::IsNotUnknown(expr)
        | Expr::Cast { expr, .. }
        | Expr::Collate { expr, .. }
        | Expr::Extract { expr, .. }
        | Expr::Ceil { expr, .. }
        | Expr::Floor { expr, .. } => vec![expr.as_ref()],
        Expr::IsDistinctFrom(left, right) | Expr::IsNotDistinctFrom(left, right) => {
            vec![left.as_ref(), right.as_ref()]
        }
        Expr::InList { expr, list, .. } => {
            let mut children: Vec<&Expr> = vec![expr.as_ref()];
            children.extend(list.iter());
            children
        }
        Expr::InSubquery { expr, .. } => vec![expr.as_ref()],
        Expr::Between {
            expr, low, high, ..
        } => vec![expr.as_ref(), low.as_ref(), high.as_ref()],
        Expr::Like { expr, pattern, .. }
        | Expr::ILike { expr, pattern, .. }
        | Expr::SimilarTo { expr, pattern, .. } => vec![expr.as_ref(), pattern.as_ref()],
        Expr::AnyOp { left, right, .. } | Expr::AllOp { left, right, .. } => {
            vec![left.as_ref(), right.as_ref()]
        }
        Expr::Function(func) => function_args(func),
        Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            let mut children: Vec<&Expr> = Vec::new();
            children.extend(operand.as_deref());
            children.extend(conditions.iter());
            children.extend(results.iter());
            children.extend(else_result.as_deref());
            children
        }
        Expr::Tuple(items) => items.iter().collect(),
        _ => Vec::new(),
    }
}

/// Visit `expr` and every sub-expression in pre-order, without entering subqueries.
pub fn walk_expr<'a>(expr: &'a Expr, visit: &mut dyn FnMut(&'a Expr)) {
    visit(expr);
    for child in child_exprs(expr) {
        walk_expr(child, visit);
    }
}

/// Subqueries directly reachable from `expr` (not nested inside other subqueries).
pub fn subqueries(expr: &Expr) -> Vec<&Query> {
    let mut found = Vec::new();
    walk_expr(expr, &mut |node| match node {
        Expr::Exists { subquery, .. }
        | Expr::InSubquery { subquery, .. }
        | Expr::Subquery(subquery) => found.push(subquery.as_ref()),
        _ => {}
    });
    found
}

/// Column references within `expr`, not entering subqueries.
pub fn column_refs(expr: &Expr) -> Vec<&Expr> {
    let mut found = Vec::new();
    walk_expr(expr, &mut |node| {
        if column_idents(node).is_some() {
            found.push(node);
        }
    });
    found
}

/// Aggregate calls within `expr`, not entering subqueries.
pub fn aggregate_calls(expr: &Expr) -> Vec<&Function> {
    let mut found = Vec::new();
    walk_expr(expr, &mut |node| {
        if let Expr::Function(func) = node {
            if is_aggregate_call(func) {
                found.push(func);
            }
        }
    });
    found
}

/// True when `expr` contains an aggregate call outside subqueries.
pub fn contains_aggregate(expr: &Expr) -> bool {
    !aggregate_calls(expr).is_empty()
}

/// String payload of a character literal.
pub fn string_literal(expr: &Expr) -> Option<&str> {
    match unnest(expr) {
        Expr::Value(
            Value::SingleQuotedString(s)
            | Value::DoubleQuotedString(s)
            | Value::EscapedStringLiteral(s)
            | Value::NationalStringLiteral(s),
        ) => Some(s.as_str()),
        _ => None,
    }
}

/// True for literal constants, including negated numbers and typed strings.
pub fn is_constant(expr: &Expr) -> bool {
    match unnest(expr) {
        Expr::Value(Value::Placeholder(_)) => false,
        Expr::Value(_) | Expr::TypedString { .. } => true,
        Expr::UnaryOp { expr, .. } => is_constant(expr),
        Expr::Cast { expr, .. } => is_constant(expr),
        _ => false,
    }
}

/// True for the `NULL` literal.
pub fn is_null_literal(expr: &Expr) -> bool {
    matches!(unnest(expr), Expr::Value(Value::Null))
}

/// Canonical text of an expression used to compare projections and atoms.
///
/// Case-insensitive for unquoted identifiers and keywords.
pub fn canonical_text(expr: &Expr) -> String {
    let mut text = String::new();
    let mut in_string = false;
    for ch in unnest(expr).to_string().chars() {
        if ch == '\'' {
            in_string = !in_string;
        }
        if in_string {
            text.push(ch);
        } else if !ch.is_whitespace() {
            text.push(ch.to_ascii_lowercase());
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::ast::{Expr, Ident};
    use sqlparser::dialect::PostgreSqlDialect;
    use sqlparser::parser::Parser;

    fn parse_expr(sql: &str) -> Expr {
        Parser::new(&PostgreSqlDialect {})
            .try_with_sql(sql)
            .unwrap()
            .parse_expr()
            .unwrap()
    }

    #[test]
    fn extract_column_name_handles_simple_and_qualified_identifiers() {
        let simple = Expr::Identifier(Ident::new("sal"));
        let qualified = Expr::CompoundIdentifier(vec![
            Ident::new("public"),
            Ident::new("emp"),
            Ident::new("sal"),
        ]);
        let nested = Expr::Nested(Box::new(Expr::Identifier(Ident::new("sal"))));

        assert_eq!(extract_column_name(&simple).as_deref(), Some("sal"));
        assert_eq!(extract_column_name(&qualified).as_deref(), Some("sal"));
        assert_eq!(extract_column_name(&nested).as_deref(), Some("sal"));
        assert_eq!(
            extract_column_name(&parse_expr("CAST(sal AS TEXT)")).as_deref(),
            Some("sal")
        );
    }

    #[test]
    fn walk_expr_skips_subqueries() {
        let expr = parse_expr("a = 1 AND b IN (SELECT c FROM t WHERE d = 2)");
        let names: Vec<String> = column_refs(&expr)
            .into_iter()
            .filter_map(extract_column_name)
            .collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(subqueries(&expr).len(), 1);
    }

    #[test]
    fn aggregate_detection_ignores_window_functions() {
        assert!(contains_aggregate(&parse_expr("SUM(DISTINCT sal) + 1")));
        assert!(!contains_aggregate(&parse_expr(
            "SUM(sal) OVER (PARTITION BY deptno)"
        )));
        let Expr::BinaryOp { left, .. } = parse_expr("SUM(DISTINCT sal) + 1") else {
            panic!("expected binary op");
        };
        let Expr::Function(func) = *left else {
            panic!("expected function");
        };
        assert!(function_has_distinct(&func));
        assert_eq!(normalized_function_name(&func), "sum");
    }

    #[test]
    fn canonical_text_ignores_case_and_spacing_outside_strings() {
        assert_eq!(
            canonical_text(&parse_expr("E.Sal  >  500")),
            canonical_text(&parse_expr("e.sal>500"))
        );
        assert_ne!(
            canonical_text(&parse_expr("ename = 'Ann'")),
            canonical_text(&parse_expr("ename = 'ann'"))
        );
    }
}
