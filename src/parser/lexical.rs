//! Token-level facts about the query text.
//!
//! Some misconceptions (unbalanced brackets, repeated clauses, missing
//! semicolons) are only visible before or instead of a successful parse. The
//! tokenizer pass records them once so the checks never touch raw text.

use serde::{Deserialize, Serialize};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Span, Token, TokenWithSpan, Tokenizer};

use crate::parser::sql_parser::SourceSpan;

/// Clause of a SELECT block, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Clause {
    /// `SELECT`
    Select,
    /// `FROM`
    From,
    /// `WHERE`
    Where,
    /// `GROUP BY`
    GroupBy,
    /// `HAVING`
    Having,
    /// `ORDER BY`
    OrderBy,
    /// `LIMIT`
    Limit,
}

impl std::fmt::Display for Clause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Clause::Select => write!(f, "SELECT"),
            Clause::From => write!(f, "FROM"),
            Clause::Where => write!(f, "WHERE"),
            Clause::GroupBy => write!(f, "GROUP BY"),
            Clause::Having => write!(f, "HAVING"),
            Clause::OrderBy => write!(f, "ORDER BY"),
            Clause::Limit => write!(f, "LIMIT"),
        }
    }
}

/// Clause keywords of one SELECT block at one parenthesis depth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClauseBlock {
    /// Keywords in source order.
    pub clauses: Vec<(Clause, SourceSpan)>,
}

/// A token sequence worth reporting, with an optional replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexicalMark {
    /// Offending text.
    pub text: String,
    /// Suggested standard spelling, if any.
    pub suggestion: Option<String>,
    /// Where it occurs.
    pub span: SourceSpan,
}

/// Bracket counts for one bracket kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketCount {
    /// Opening brackets.
    pub open: usize,
    /// Closing brackets.
    pub close: usize,
    /// First occurrence.
    pub first: Option<SourceSpan>,
}

impl BracketCount {
    fn record(&mut self, opening: bool, span: SourceSpan) {
        if opening {
            self.open += 1;
        } else {
            self.close += 1;
        }
        self.first.get_or_insert(span);
    }

    /// True when any bracket of this kind occurs.
    pub fn is_used(&self) -> bool {
        self.open + self.close > 0
    }

    /// True when opening and closing counts differ.
    pub fn is_unbalanced(&self) -> bool {
        self.open != self.close
    }
}

/// Everything the lexical checks need to know about the query text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexicalFacts {
    /// Tokenizer failure, if the text could not be tokenized.
    pub tokenizer_error: Option<String>,
    /// Span of the last significant token.
    pub end: Option<SourceSpan>,
    /// True when the last significant token is `;`.
    pub ends_with_semicolon: bool,
    /// Semicolons that terminate an empty statement.
    pub extra_semicolons: Vec<SourceSpan>,
    /// Number of non-empty statements.
    pub statement_count: usize,
    /// `(` and `)`.
    pub round: BracketCount,
    /// `[` and `]`.
    pub square: BracketCount,
    /// `{` and `}`.
    pub curly: BracketCount,
    /// Operators borrowed from programming languages.
    pub nonstandard_operators: Vec<LexicalMark>,
    /// Vendor keywords with a standard equivalent.
    pub nonstandard_keywords: Vec<LexicalMark>,
    /// Predicate keywords written like function calls (`LIKE(`).
    pub keyword_calls: Vec<LexicalMark>,
    /// Keywords written without separating whitespace (`ORDERBY`).
    pub glued_keywords: Vec<LexicalMark>,
    /// `IS` followed by something other than NULL/TRUE/FALSE/UNKNOWN/NOT/DISTINCT.
    pub misapplied_is: Vec<LexicalMark>,
    /// Clause keywords per SELECT block.
    pub clause_blocks: Vec<ClauseBlock>,
    /// Two adjacent items of a GROUP BY or ORDER BY list with no comma between.
    pub missing_commas: Vec<LexicalMark>,
}

const NONSTANDARD_KEYWORDS: &[(&str, Option<&str>)] = &[
    ("TOP", Some("LIMIT")),
    ("MINUS", Some("EXCEPT")),
    ("ISNULL", Some("IS NULL")),
    ("NOTNULL", Some("IS NOT NULL")),
    ("REGEXP", Some("SIMILAR TO")),
    ("RLIKE", Some("SIMILAR TO")),
];

const GLUED_KEYWORDS: &[(&str, &str)] = &[
    ("ORDERBY", "ORDER BY"),
    ("GROUPBY", "GROUP BY"),
    ("ISNOT", "IS NOT"),
    ("NOTIN", "NOT IN"),
    ("LEFTJOIN", "LEFT JOIN"),
    ("INNERJOIN", "INNER JOIN"),
];

const IS_OPERANDS: &[&str] = &[
    "NULL",
    "NOT",
    "TRUE",
    "FALSE",
    "UNKNOWN",
    "DISTINCT",
    "DOCUMENT",
    "JSON",
    "NORMALIZED",
];

/// Tokenize `sql` and collect lexical facts.
pub fn scan(sql: &str) -> LexicalFacts {
    let dialect = PostgreSqlDialect {};
    let tokens = match Tokenizer::new(&dialect, sql).tokenize_with_location() {
        Ok(tokens) => tokens,
        Err(error) => {
            return LexicalFacts {
                tokenizer_error: Some(error.to_string()),
                ..LexicalFacts::default()
            }
        }
    };
    let significant: Vec<TokenWithSpan> = tokens
        .into_iter()
        .filter(|t| !matches!(t.token, Token::Whitespace(_) | Token::EOF))
        .collect();

    let mut facts = LexicalFacts::default();
    let mut scanner = BlockScanner::default();
    let mut statement_has_content = false;
    let mut depth = 0usize;
    // Depth of the GROUP BY or ORDER BY list being read.
    let mut list_depth: Option<usize> = None;

    for (idx, token) in significant.iter().enumerate() {
        let span = SourceSpan::from(token.span);
        let next = significant.get(idx + 1).map(|t| &t.token);
        let previous = idx.checked_sub(1).and_then(|i| significant.get(i));

        if let Some(before) = previous {
            if list_depth == Some(depth)
                && ends_list_item(&before.token)
                && starts_list_item(&token.token)
            {
                let text = format!("{} {}", before.token, token.token);
                let both = SourceSpan::from(Span::new(before.span.start, token.span.end));
                facts.missing_commas.push(mark(&text, None, both));
            }
        }
        let previous = previous.map(|t| &t.token);

        match &token.token {
            Token::SemiColon => {
                if statement_has_content {
                    facts.statement_count += 1;
                } else {
                    facts.extra_semicolons.push(span);
                }
                statement_has_content = false;
                scanner.reset();
                depth = 0;
                list_depth = None;
                continue;
            }
            Token::LParen => {
                facts.round.record(true, span);
                scanner.open();
                depth += 1;
            }
            Token::RParen => {
                facts.round.record(false, span);
                scanner.close();
                depth = depth.saturating_sub(1);
                if list_depth.is_some_and(|d| d > depth) {
                    list_depth = None;
                }
            }
            Token::LBracket | Token::RBracket => {
                facts
                    .square
                    .record(matches!(token.token, Token::LBracket), span)
            }
            Token::LBrace | Token::RBrace => {
                facts.curly.record(matches!(token.token, Token::LBrace), span)
            }
            Token::DoubleEq => facts.nonstandard_operators.push(mark("==", Some("="), span)),
            Token::Overlap => facts
                .nonstandard_operators
                .push(mark("&&", Some("AND"), span)),
            Token::ExclamationMark => facts
                .nonstandard_operators
                .push(mark("!", Some("NOT"), span)),
            Token::ShiftLeft => facts.nonstandard_operators.push(mark("<<", None, span)),
            Token::ShiftRight => facts.nonstandard_operators.push(mark(">>", None, span)),
            Token::Char(c) => {
                let suggestion = match c {
                    '≠' => Some("<>"),
                    '≥' => Some(">="),
                    '≤' => Some("<="),
                    _ => None,
                };
                if suggestion.is_some() {
                    facts
                        .nonstandard_operators
                        .push(mark(&c.to_string(), suggestion, span));
                }
            }
            Token::Word(word) if word.quote_style.is_none() => {
                let upper = word.value.to_ascii_uppercase();
                if let Some((_, suggestion)) =
                    NONSTANDARD_KEYWORDS.iter().find(|(kw, _)| *kw == upper)
                {
                    facts
                        .nonstandard_keywords
                        .push(mark(&word.value, *suggestion, span));
                }
                if let Some((_, suggestion)) = GLUED_KEYWORDS.iter().find(|(kw, _)| *kw == upper) {
                    facts
                        .glued_keywords
                        .push(mark(&word.value, Some(suggestion), span));
                }
                if matches!(upper.as_str(), "LIKE" | "ILIKE" | "BETWEEN")
                    && matches!(next, Some(Token::LParen))
                {
                    facts.keyword_calls.push(mark(&word.value, None, span));
                }
                if upper == "IS" && !next.is_some_and(is_operand_word) {
                    facts.misapplied_is.push(mark(&word.value, None, span));
                }
                let after_distinct = matches!(
                    previous,
                    Some(Token::Word(w)) if w.value.eq_ignore_ascii_case("distinct")
                );
                let followed_by_by = matches!(
                    next,
                    Some(Token::Word(w)) if w.value.eq_ignore_ascii_case("by")
                );
                let clause_keyword = matches!(
                    upper.as_str(),
                    "SELECT"
                        | "FROM"
                        | "WHERE"
                        | "HAVING"
                        | "LIMIT"
                        | "OFFSET"
                        | "UNION"
                        | "INTERSECT"
                        | "EXCEPT"
                );
                if clause_keyword && list_depth == Some(depth) {
                    list_depth = None;
                }
                if matches!(upper.as_str(), "GROUP" | "ORDER") && followed_by_by {
                    list_depth = Some(depth);
                }
                match upper.as_str() {
                    "SELECT" => scanner.start_block(span),
                    "FROM" if !after_distinct => scanner.push(Clause::From, span),
                    "WHERE" => scanner.push(Clause::Where, span),
                    "GROUP" if followed_by_by => scanner.push(Clause::GroupBy, span),
                    "HAVING" => scanner.push(Clause::Having, span),
                    "ORDER" if followed_by_by => scanner.push(Clause::OrderBy, span),
                    "LIMIT" => scanner.push(Clause::Limit, span),
                    "UNION" | "INTERSECT" | "EXCEPT" => scanner.end_block(),
                    _ => {}
                }
            }
            _ => {}
        }
        statement_has_content = true;
    }

    if statement_has_content {
        facts.statement_count += 1;
    }
    facts.ends_with_semicolon = matches!(
        significant.last().map(|t| &t.token),
        Some(Token::SemiColon)
    );
    facts.end = significant.last().map(|t| SourceSpan::from(t.span));
    facts.clause_blocks = scanner.finish();
    facts
}

fn is_list_word(token: &Token) -> bool {
    matches!(token, Token::Word(word) if word.keyword == Keyword::NoKeyword || word.quote_style.is_some())
}

fn ends_list_item(token: &Token) -> bool {
    is_list_word(token) || matches!(token, Token::Number(..) | Token::RParen)
}

fn starts_list_item(token: &Token) -> bool {
    is_list_word(token) || matches!(token, Token::Number(..))
}

fn is_operand_word(token: &Token) -> bool {
    match token {
        Token::Word(word) => IS_OPERANDS
            .iter()
            .any(|operand| word.value.eq_ignore_ascii_case(operand)),
        _ => false,
    }
}

fn mark(text: &str, suggestion: Option<&str>, span: SourceSpan) -> LexicalMark {
    LexicalMark {
        text: text.to_string(),
        suggestion: suggestion.map(str::to_string),
        span,
    }
}

/// Tracks the open SELECT block at every parenthesis depth.
#[derive(Default)]
struct BlockScanner {
    blocks: Vec<ClauseBlock>,
    open_at_depth: Vec<Option<usize>>,
}

impl BlockScanner {
    fn top(&mut self) -> &mut Option<usize> {
        if self.open_at_depth.is_empty() {
            self.open_at_depth.push(None);
        }
        let last = self.open_at_depth.len() - 1;
        &mut self.open_at_depth[last]
    }

    fn open(&mut self) {
        self.top();
        self.open_at_depth.push(None);
    }

    fn close(&mut self) {
        if self.open_at_depth.len() > 1 {
            self.open_at_depth.pop();
        }
    }

    fn start_block(&mut self, span: SourceSpan) {
        self.blocks.push(ClauseBlock {
            clauses: vec![(Clause::Select, span)],
        });
        let index = self.blocks.len() - 1;
        *self.top() = Some(index);
    }

    fn end_block(&mut self) {
        *self.top() = None;
    }

    fn push(&mut self, keyword: Clause, span: SourceSpan) {
        if let Some(index) = *self.top() {
            self.blocks[index].clauses.push((keyword, span));
        }
    }

    fn reset(&mut self) {
        self.open_at_depth.clear();
    }

    fn finish(self) -> Vec<ClauseBlock> {
        self.blocks
    }
}
