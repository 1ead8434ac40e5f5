use std::fmt;

use serde::{Deserialize, Serialize};
use sqlparser::ast::{Expr, Ident, Query, Spanned, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Span, Token, Tokenizer};

use crate::error::ParseFailure;
use crate::parser::lexical::{self, LexicalFacts};

/// Line/column range in the query text (1-based; zero when unknown).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SourceSpan {
    /// First line.
    pub start_line: u64,
    /// First column.
    pub start_column: u64,
    /// Last line.
    pub end_line: u64,
    /// Column just past the end.
    pub end_column: u64,
}

impl SourceSpan {
    /// True when the parser could not attach a position.
    pub fn is_unknown(&self) -> bool {
        self.start_line == 0
    }
}

impl From<Span> for SourceSpan {
    fn from(span: Span) -> Self {
        Self {
            start_line: span.start.line,
            start_column: span.start.column,
            end_line: span.end.line,
            end_column: span.end.column,
        }
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            write!(f, "?")
        } else {
            write!(f, "{}:{}", self.start_line, self.start_column)
        }
    }
}

/// Span of the whole of `expr` within `sql`.
///
/// Parser spans of some expressions cover only their leading operand
/// (`x IS NULL`, `x IN (1, 2)`, `NOT x`). The rendered expression is lined up
/// with the tokens of `sql` around that span; when they do not line up, the
/// parser span is returned.
pub fn expression_span(sql: &str, expr: &Expr) -> SourceSpan {
    let parsed = SourceSpan::from(expr.span());
    if parsed.is_unknown() {
        return parsed;
    }
    let dialect = PostgreSqlDialect {};
    let Ok(source) = Tokenizer::new(&dialect, sql).tokenize_with_location() else {
        return parsed;
    };
    let Ok(rendered) = Tokenizer::new(&dialect, &expr.to_string()).tokenize() else {
        return parsed;
    };
    let source: Vec<_> = source
        .into_iter()
        .filter(|t| !matches!(t.token, Token::Whitespace(_)))
        .collect();
    let rendered: Vec<String> = rendered
        .iter()
        .filter(|t| !matches!(t, Token::Whitespace(_)))
        .map(token_key)
        .collect();
    let Some(anchor) = source.iter().position(|t| {
        (t.span.start.line, t.span.start.column) >= (parsed.start_line, parsed.start_column)
    }) else {
        return parsed;
    };
    let lowest = anchor.saturating_sub(rendered.len());
    for start in (lowest..=anchor).rev() {
        let end = start + rendered.len();
        if end <= anchor || end > source.len() {
            continue;
        }
        let matches = source[start..end]
            .iter()
            .map(|t| token_key(&t.token))
            .eq(rendered.iter().cloned());
        if matches {
            return SourceSpan::from(Span::new(source[start].span.start, source[end - 1].span.end));
        }
    }
    parsed
}

/// True when `alias` is written right after its expression, without `AS`.
pub fn alias_without_as(sql: &str, alias: &Ident) -> bool {
    let dialect = PostgreSqlDialect {};
    let Ok(tokens) = Tokenizer::new(&dialect, sql).tokenize_with_location() else {
        return false;
    };
    let mut previous = None;
    for token in tokens {
        if matches!(token.token, Token::Whitespace(_)) {
            continue;
        }
        if token.span.start == alias.span.start {
            return !matches!(&previous, Some(Token::Word(word)) if word.keyword == Keyword::AS);
        }
        previous = Some(token.token);
    }
    false
}

fn token_key(token: &Token) -> String {
    token.to_string().to_ascii_uppercase()
}

/// One SQL query as handed to the engine: its AST (if it parsed) and its
/// lexical facts.
#[derive(Debug, Clone)]
pub struct ParsedQuery {
    /// Original text.
    pub sql: String,
    /// Token-level facts, available even when parsing fails.
    pub lexical: LexicalFacts,
    /// The parsed query, or why parsing failed.
    pub ast: Result<Query, ParseFailure>,
}

impl ParsedQuery {
    /// Tokenize and parse `sql` with the `PostgreSQL` dialect.
    pub fn parse(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            lexical: lexical::scan(sql),
            ast: parse_query(sql),
        }
    }

    /// The AST, when the text parsed as a single query.
    pub fn query(&self) -> Option<&Query> {
        self.ast.as_ref().ok()
    }
}

/// Parse exactly one query statement.
pub fn parse_query(sql: &str) -> Result<Query, ParseFailure> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| ParseFailure::Syntax(e.to_string()))?;
    let mut statements = statements.into_iter();
    let first = statements.next().ok_or(ParseFailure::Empty)?;
    let remaining = statements.count();
    if remaining > 0 {
        return Err(ParseFailure::MultipleStatements(remaining + 1));
    }
    match first {
        Statement::Query(query) => Ok(*query),
        other => Err(ParseFailure::NotAQuery(statement_kind(&other))),
    }
}

fn statement_kind(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_query_accepts_a_single_select() {
        let parsed = ParsedQuery::parse("SELECT ename FROM emp WHERE sal > 500;");
        assert!(parsed.query().is_some());
        assert!(parsed.lexical.ends_with_semicolon);
    }

    #[test]
    fn parse_query_rejects_non_queries_and_batches() {
        assert_eq!(
            parse_query("DELETE FROM emp"),
            Err(ParseFailure::NotAQuery("DELETE".to_string()))
        );
        assert_eq!(
            parse_query("SELECT 1; SELECT 2"),
            Err(ParseFailure::MultipleStatements(2))
        );
        assert_eq!(parse_query("  "), Err(ParseFailure::Empty));
    }

    #[test]
    fn parse_failure_keeps_lexical_facts() {
        let parsed = ParsedQuery::parse("SELECT ename FROM emp WHERE sal > 5 WHERE comm > 1");
        assert!(parsed.query().is_none());
        assert_eq!(parsed.lexical.clause_blocks.len(), 1);
    }

    #[test]
    fn spans_convert_from_parser_locations() {
        let parsed = ParsedQuery::parse("SELECT ename\nFROM emp");
        let query = parsed.query().expect("query should parse");
        let select = query.body.as_select().expect("plain select");
        let span = SourceSpan::from(sqlparser::ast::Spanned::span(&select.projection[0]));
        assert_eq!((span.start_line, span.start_column), (1, 8));
    }

    fn where_clause(sql: &str) -> Expr {
        let parsed = ParsedQuery::parse(sql);
        let query = parsed.query().expect("query should parse");
        let select = query.body.as_select().expect("plain select");
        select.selection.clone().expect("WHERE clause")
    }

    #[test]
    fn expression_span_covers_the_whole_predicate() {
        let sql = "SELECT ename FROM emp\nWHERE comm NOT IN (1, NULL)";
        let span = expression_span(sql, &where_clause(sql));
        assert_eq!(
            (span.start_line, span.start_column, span.end_line, span.end_column),
            (2, 7, 2, 28)
        );

        let sql = "SELECT ename FROM emp WHERE comm  is not   null";
        let span = expression_span(sql, &where_clause(sql));
        assert_eq!((span.start_column, span.end_column), (29, 48));
    }

    #[test]
    fn alias_without_as_looks_at_the_preceding_token() {
        let parsed = ParsedQuery::parse("SELECT ename sal, job AS title FROM emp");
        let query = parsed.query().expect("query should parse");
        let select = query.body.as_select().expect("plain select");
        let aliases: Vec<bool> = select
            .projection
            .iter()
            .filter_map(|item| match item {
                sqlparser::ast::SelectItem::ExprWithAlias { alias, .. } => {
                    Some(alias_without_as(&parsed.sql, alias))
                }
                _ => None,
            })
            .collect();
        assert_eq!(aliases, vec![true, false]);
    }
}
