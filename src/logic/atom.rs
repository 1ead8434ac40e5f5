//! Predicate atoms and the boolean tree above them.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;
use sqlparser::ast::{BinaryOperator, DataType, Expr, Query, Spanned, UnaryOperator, Value};

use crate::catalog::TypeClass;
use crate::logic::truth::Truth;
use crate::parser::expr::{canonical_text, column_idents, string_literal, unnest};
use crate::parser::lexical::Clause;
use crate::parser::sql_parser::SourceSpan;
use crate::query::{QueryModel, ResolvedColumn, ScopeId};

/// Comparison operator of an atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
}

impl CompareOp {
    /// Map a binary operator, if it is a comparison.
    pub fn from_binary(op: &BinaryOperator) -> Option<Self> {
        Some(match op {
            BinaryOperator::Eq => CompareOp::Eq,
            BinaryOperator::NotEq => CompareOp::NotEq,
            BinaryOperator::Lt => CompareOp::Lt,
            BinaryOperator::LtEq => CompareOp::LtEq,
            BinaryOperator::Gt => CompareOp::Gt,
            BinaryOperator::GtEq => CompareOp::GtEq,
            _ => return None,
        })
    }

    /// `NOT (a op b)` is `a op.negate() b`, exactly, under three-valued logic.
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::NotEq,
            CompareOp::NotEq => CompareOp::Eq,
            CompareOp::Lt => CompareOp::GtEq,
            CompareOp::LtEq => CompareOp::Gt,
            CompareOp::Gt => CompareOp::LtEq,
            CompareOp::GtEq => CompareOp::Lt,
        }
    }

    /// `a op b` is `b op.mirror() a`.
    pub fn mirror(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::LtEq => CompareOp::GtEq,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::GtEq => CompareOp::LtEq,
            other => other,
        }
    }

    /// Whether the operator holds for two values in this order.
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::LtEq => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
        }
    }

    /// True for `<`, `<=`, `>` and `>=`.
    pub fn is_ordering(self) -> bool {
        !matches!(self, CompareOp::Eq | CompareOp::NotEq)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "="),
            CompareOp::NotEq => write!(f, "<>"),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::LtEq => write!(f, "<="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::GtEq => write!(f, ">="),
        }
    }
}

/// A literal value, interpreted in the domain of the column it is compared with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Scalar {
    /// Integer or decimal number.
    Number(f64),
    /// Character string.
    Text(String),
    /// Days since 1970-01-01, with the time of day as fraction.
    Date(f64),
    /// Boolean.
    Bool(bool),
}

impl Scalar {
    /// Order of two values of the same domain; `None` across domains.
    pub fn compare(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Number(a), Scalar::Number(b)) | (Scalar::Date(a), Scalar::Date(b)) => {
                a.partial_cmp(b)
            }
            (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
            (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Numeric position on the ordered line, for numbers and dates.
    pub fn position(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) | Scalar::Date(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::Text(s) => write!(f, "'{s}'"),
            Scalar::Date(d) => {
                let days = d.floor();
                let (year, month, day) = civil_from_days(days as i64);
                let seconds = ((d - days) * 86_400.0).round() as u32;
                if seconds == 0 {
                    write!(f, "DATE '{year:04}-{month:02}-{day:02}'")
                } else {
                    write!(
                        f,
                        "TIMESTAMP '{year:04}-{month:02}-{day:02} {:02}:{:02}:{:02}'",
                        seconds / 3600,
                        seconds / 60 % 60,
                        seconds % 60
                    )
                }
            }
            Scalar::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
        }
    }
}

/// Invalid field in a date literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFieldError {
    /// Not of the form `YYYY-MM-DD[ HH:MM[:SS]]`.
    Malformed,
    /// A field outside its range.
    Overflow {
        /// Field name (`month`, `day`, `hour`, `minute`, `second`).
        field: &'static str,
        /// Offending value.
        value: u32,
    },
}

/// Parse a date or timestamp literal into days since the Unix epoch.
pub fn parse_date_literal(text: &str) -> Result<f64, DateFieldError> {
    let text = text.trim();
    let (date, time) = match text.split_once([' ', 'T']) {
        Some((date, time)) => (date, Some(time.trim())),
        None => (text, None),
    };
    let mut parts = date.split('-');
    let (Some(year), Some(month), Some(day), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(DateFieldError::Malformed);
    };
    let year: i64 = year.parse().map_err(|_| DateFieldError::Malformed)?;
    let month: u32 = month.parse().map_err(|_| DateFieldError::Malformed)?;
    let day: u32 = day.parse().map_err(|_| DateFieldError::Malformed)?;
    if !(1..=12).contains(&month) {
        return Err(DateFieldError::Overflow {
            field: "month",
            value: month,
        });
    }
    if day == 0 || day > days_in_month(year, month) {
        return Err(DateFieldError::Overflow {
            field: "day",
            value: day,
        });
    }
    let mut fraction = 0.0;
    if let Some(time) = time.filter(|t| !t.is_empty()) {
        let fields: Vec<&str> = time.split(':').collect();
        if !(2..=3).contains(&fields.len()) {
            return Err(DateFieldError::Malformed);
        }
        let limits: [(&'static str, u32); 3] = [("hour", 23), ("minute", 59), ("second", 59)];
        let mut seconds = 0.0;
        for ((field, limit), raw) in limits.iter().zip(&fields) {
            let value: f64 = raw.parse().map_err(|_| DateFieldError::Malformed)?;
            if value < 0.0 || value >= f64::from(*limit + 1) {
                return Err(DateFieldError::Overflow {
                    field: *field,
                    value: value as u32,
                });
            }
            seconds = seconds * 60.0 + value;
        }
        if fields.len() == 2 {
            seconds *= 60.0;
        }
        fraction = seconds / 86_400.0;
    }
    Ok(days_from_civil(year, month, day) as f64 + fraction)
}

fn days_in_month(year: i64, month: u32) -> u32 {
    match month {
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let year_of_era = year - era * 400;
    let month = i64::from(month);
    let shifted_month = if month > 2 { month - 3 } else { month + 9 };
    let day_of_year = (153 * shifted_month + 2) / 5 + i64::from(day) - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    era * 146_097 + day_of_era - 719_468
}

fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let day_of_era = z - era * 146_097;
    let year_of_era =
        (day_of_era - day_of_era / 1460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let shifted_month = (5 * day_of_year + 2) / 153;
    let day = (day_of_year - (153 * shifted_month + 2) / 5 + 1) as u32;
    let month = if shifted_month < 10 {
        shifted_month + 3
    } else {
        shifted_month - 9
    } as u32;
    let year = year_of_era + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A resolved column.
    Column(ResolvedColumn),
    /// A literal value.
    Literal(Scalar),
    /// The `NULL` literal.
    Null,
    /// Any other expression.
    Other,
}

impl Operand {
    /// The column, for column operands.
    pub fn column(&self) -> Option<&ResolvedColumn> {
        match self {
            Operand::Column(column) => Some(column),
            _ => None,
        }
    }
}

/// What an atom tests.
#[derive(Debug, Clone)]
pub enum AtomKind<'q> {
    /// `left op right`.
    Compare {
        /// Left operand.
        left: Operand,
        /// Operator.
        op: CompareOp,
        /// Right operand.
        right: Operand,
    },
    /// `operand IS NULL`; the negative literal is `IS NOT NULL`.
    IsNull(Operand),
    /// `operand IN (v1, v2, ...)`.
    InList {
        /// Tested operand.
        operand: Operand,
        /// List items.
        values: Vec<Operand>,
    },
    /// `operand IN (subquery)`.
    InSubquery {
        /// Tested operand.
        operand: Operand,
        /// The subquery.
        subquery: &'q Query,
    },
    /// `operand op ANY/ALL (subquery)`.
    Quantified {
        /// Tested operand.
        operand: Operand,
        /// Operator.
        op: CompareOp,
        /// `ALL` rather than `ANY`.
        all: bool,
        /// The subquery.
        subquery: &'q Query,
    },
    /// `EXISTS (subquery)`.
    Exists(&'q Query),
    /// `operand [I]LIKE pattern`.
    Like {
        /// Tested operand.
        operand: Operand,
        /// Pattern, when it is a literal.
        pattern: Option<String>,
        /// `ILIKE`.
        case_insensitive: bool,
    },
    /// `TRUE`, `FALSE` or `NULL` as a condition.
    Constant(Truth),
    /// Any boolean expression the oracle does not interpret.
    Opaque,
}

/// An elementary predicate.
#[derive(Debug, Clone)]
pub struct Atom<'q> {
    /// Interpretation.
    pub kind: AtomKind<'q>,
    /// Source expression (the whole `BETWEEN` for its two halves).
    pub expr: &'q Expr,
    /// Display text.
    pub text: String,
    /// Clause of origin.
    pub clause: Clause,
    /// Position in the query text.
    pub span: SourceSpan,
    key: String,
}

impl Atom<'_> {
    /// Operand columns of the atom, not including list items.
    pub fn columns(&self) -> Vec<&ResolvedColumn> {
        match &self.kind {
            AtomKind::Compare { left, right, .. } => {
                left.column().into_iter().chain(right.column()).collect()
            }
            AtomKind::IsNull(operand)
            | AtomKind::InList { operand, .. }
            | AtomKind::InSubquery { operand, .. }
            | AtomKind::Quantified { operand, .. }
            | AtomKind::Like { operand, .. } => operand.column().into_iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Subquery referenced by the atom.
    pub fn subquery(&self) -> Option<&Query> {
        match &self.kind {
            AtomKind::InSubquery { subquery, .. }
            | AtomKind::Quantified { subquery, .. }
            | AtomKind::Exists(subquery) => Some(subquery),
            _ => None,
        }
    }
}

/// Boolean structure over interned atoms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Index into the atom table.
    Atom(usize),
    /// Negation.
    Not(Box<Predicate>),
    /// Conjunction.
    And(Vec<Predicate>),
    /// Disjunction.
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Evaluate under an assignment of truth values to atoms.
    pub fn eval(&self, assignment: &dyn Fn(usize) -> Truth) -> Truth {
        match self {
            Predicate::Atom(index) => assignment(*index),
            Predicate::Not(inner) => !inner.eval(assignment),
            Predicate::And(items) => items
                .iter()
                .fold(Truth::True, |acc, item| acc.and(item.eval(assignment))),
            Predicate::Or(items) => items
                .iter()
                .fold(Truth::False, |acc, item| acc.or(item.eval(assignment))),
        }
    }
}

/// Resolves column references to catalog columns.
pub trait ColumnResolver {
    /// The column an expression refers to, if it is a resolvable column reference.
    fn resolve_column(&self, expr: &Expr) -> Option<ResolvedColumn>;
}

/// Resolution from a scope of a [`QueryModel`].
pub struct ScopeResolver<'m, 'q> {
    /// The model.
    pub model: &'m QueryModel<'q>,
    /// Scope where the predicate occurs.
    pub scope: ScopeId,
}

impl ColumnResolver for ScopeResolver<'_, '_> {
    fn resolve_column(&self, expr: &Expr) -> Option<ResolvedColumn> {
        self.model.resolve_expr(self.scope, expr)
    }
}

impl<F> ColumnResolver for F
where
    F: Fn(&Expr) -> Option<ResolvedColumn>,
{
    fn resolve_column(&self, expr: &Expr) -> Option<ResolvedColumn> {
        self(expr)
    }
}

/// Interns atoms and builds predicate trees.
pub struct AtomTable<'q, 'r> {
    atoms: Vec<Atom<'q>>,
    clause: Clause,
    resolver: &'r dyn ColumnResolver,
}

impl<'q, 'r> AtomTable<'q, 'r> {
    /// Start an empty table.
    pub fn new(resolver: &'r dyn ColumnResolver) -> Self {
        Self {
            atoms: Vec::new(),
            clause: Clause::Where,
            resolver,
        }
    }

    /// The interned atoms.
    pub fn into_atoms(self) -> Vec<Atom<'q>> {
        self.atoms
    }

    /// Convert a boolean expression of `clause` into a predicate tree.
    pub fn predicate(&mut self, expr: &'q Expr, clause: Clause) -> Predicate {
        self.clause = clause;
        self.build(expr)
    }

    fn build(&mut self, expr: &'q Expr) -> Predicate {
        match expr {
            Expr::Nested(inner) => self.build(inner),
            Expr::BinaryOp {
                left,
                op: BinaryOperator::And,
                right,
            } => Predicate::And(vec![self.build(left), self.build(right)]),
            Expr::BinaryOp {
                left,
                op: BinaryOperator::Or,
                right,
            } => Predicate::Or(vec![self.build(left), self.build(right)]),
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr: inner,
            } => Predicate::Not(Box::new(self.build(inner))),
            Expr::Between {
                expr: operand,
                negated,
                low,
                high,
            } => {
                let lower = self.comparison(expr, operand, CompareOp::GtEq, low);
                let upper = self.comparison(expr, operand, CompareOp::LtEq, high);
                let both = Predicate::And(vec![Predicate::Atom(lower), Predicate::Atom(upper)]);
                if *negated {
                    Predicate::Not(Box::new(both))
                } else {
                    both
                }
            }
            Expr::IsNull(operand) => Predicate::Atom(self.is_null(expr, operand)),
            Expr::IsNotNull(operand) => {
                Predicate::Not(Box::new(Predicate::Atom(self.is_null(expr, operand))))
            }
            Expr::InList {
                expr: operand,
                list,
                negated,
            } => {
                let operand_value = self.operand(operand, None);
                let hint = hint_of(&operand_value);
                let values = list.iter().map(|item| self.operand(item, hint)).collect();
                let atom = self.intern(
                    expr,
                    format!("{} IN", canonical_text(operand)),
                    list_key(list),
                    AtomKind::InList {
                        operand: operand_value,
                        values,
                    },
                    in_text(expr, *negated),
                );
                negate_if(Predicate::Atom(atom), *negated)
            }
            Expr::InSubquery {
                expr: operand,
                subquery,
                negated,
            } => {
                let kind = AtomKind::InSubquery {
                    operand: self.operand(operand, None),
                    subquery,
                };
                let atom = self.intern(
                    expr,
                    format!("{} IN", canonical_text(operand)),
                    canonical_query(subquery),
                    kind,
                    in_text(expr, *negated),
                );
                negate_if(Predicate::Atom(atom), *negated)
            }
            Expr::Exists { subquery, negated } => {
                let atom = self.intern(
                    expr,
                    "EXISTS".to_string(),
                    canonical_query(subquery),
                    AtomKind::Exists(subquery),
                    in_text(expr, *negated),
                );
                negate_if(Predicate::Atom(atom), *negated)
            }
            Expr::Like {
                negated,
                expr: operand,
                pattern,
                any: false,
                ..
            }
            | Expr::ILike {
                negated,
                expr: operand,
                pattern,
                any: false,
                ..
            } => {
                let case_insensitive = matches!(expr, Expr::ILike { .. });
                let kind = AtomKind::Like {
                    operand: self.operand(operand, None),
                    pattern: string_literal(pattern).map(str::to_string),
                    case_insensitive,
                };
                let atom = self.intern(
                    expr,
                    format!("{} LIKE{}", canonical_text(operand), case_insensitive),
                    canonical_text(pattern),
                    kind,
                    in_text(expr, *negated),
                );
                negate_if(Predicate::Atom(atom), *negated)
            }
            Expr::BinaryOp { left, op, right } => match CompareOp::from_binary(op) {
                Some(op) => Predicate::Atom(self.comparison(expr, left, op, right)),
                None => Predicate::Atom(self.opaque(expr)),
            },
            Expr::AnyOp {
                left,
                compare_op,
                right,
                ..
            }
            | Expr::AllOp {
                left,
                compare_op,
                right,
            } => match (CompareOp::from_binary(compare_op), unnest(right)) {
                (Some(op), Expr::Subquery(subquery)) => {
                    let all = matches!(expr, Expr::AllOp { .. });
                    let kind = AtomKind::Quantified {
                        operand: self.operand(left, None),
                        op,
                        all,
                        subquery,
                    };
                    let atom = self.intern(
                        expr,
                        format!("{} {op} {}", canonical_text(left), all),
                        canonical_query(subquery),
                        kind,
                        expr.to_string(),
                    );
                    Predicate::Atom(atom)
                }
                _ => Predicate::Atom(self.opaque(expr)),
            },
            Expr::Value(Value::Boolean(value)) => {
                Predicate::Atom(self.constant(expr, Truth::from(*value)))
            }
            Expr::Value(Value::Null) => Predicate::Atom(self.constant(expr, Truth::Unknown)),
            _ => Predicate::Atom(self.opaque(expr)),
        }
    }

    fn comparison(&mut self, source: &'q Expr, left: &Expr, op: CompareOp, right: &Expr) -> usize {
        let mut left_operand = self.operand(left, None);
        let mut right_operand = self.operand(right, hint_of(&left_operand));
        if let (Operand::Literal(_), Some(hint)) = (&left_operand, hint_of(&right_operand)) {
            left_operand = self.operand(left, Some(hint));
        }
        let (left_key, right_key) = (canonical_text(left), canonical_text(right));
        let text = if matches!(source, Expr::Between { .. }) {
            format!("{left} {op} {right}")
        } else {
            source.to_string()
        };
        // `5 < sal` and `sal > 5` intern to the same atom.
        let (op, key_left, key_right) = if matches!(left_operand, Operand::Literal(_))
            && !matches!(right_operand, Operand::Literal(_))
        {
            std::mem::swap(&mut left_operand, &mut right_operand);
            (op.mirror(), right_key, left_key)
        } else {
            (op, left_key, right_key)
        };
        self.intern(
            source,
            format!("{key_left} {op}"),
            key_right,
            AtomKind::Compare {
                left: left_operand,
                op,
                right: right_operand,
            },
            text,
        )
    }

    fn is_null(&mut self, source: &'q Expr, operand: &Expr) -> usize {
        let kind = AtomKind::IsNull(self.operand(operand, None));
        self.intern(
            source,
            format!("{} IS NULL", canonical_text(operand)),
            String::new(),
            kind,
            format!("{operand} IS NULL"),
        )
    }

    fn constant(&mut self, source: &'q Expr, truth: Truth) -> usize {
        self.intern(
            source,
            format!("CONST {truth}"),
            String::new(),
            AtomKind::Constant(truth),
            source.to_string(),
        )
    }

    fn opaque(&mut self, source: &'q Expr) -> usize {
        self.intern(
            source,
            "OPAQUE".to_string(),
            canonical_text(source),
            AtomKind::Opaque,
            source.to_string(),
        )
    }

    fn intern(
        &mut self,
        source: &'q Expr,
        head: String,
        tail: String,
        kind: AtomKind<'q>,
        text: String,
    ) -> usize {
        let key = format!("{head} {tail}");
        if let Some(index) = self.atoms.iter().position(|atom| atom.key == key) {
            return index;
        }
        self.atoms.push(Atom {
            kind,
            expr: source,
            text,
            clause: self.clause,
            span: SourceSpan::from(source.span()),
            key,
        });
        self.atoms.len() - 1
    }

    fn operand(&self, expr: &Expr, hint: Option<TypeClass>) -> Operand {
        let inner = unnest(expr);
        if matches!(inner, Expr::Value(Value::Null)) {
            return Operand::Null;
        }
        if column_idents(inner).is_some() {
            return match self.resolver.resolve_column(inner) {
                Some(column) => Operand::Column(column),
                None => Operand::Other,
            };
        }
        match literal_scalar(inner, hint) {
            Some(scalar) => Operand::Literal(scalar),
            None => Operand::Other,
        }
    }
}

fn hint_of(operand: &Operand) -> Option<TypeClass> {
    operand.column().map(|c| c.type_class)
}

fn negate_if(predicate: Predicate, negated: bool) -> Predicate {
    if negated {
        Predicate::Not(Box::new(predicate))
    } else {
        predicate
    }
}

// The positive form, so `x NOT IN (...)` and `NOT x IN (...)` read the same.
fn in_text(expr: &Expr, negated: bool) -> String {
    let text = expr.to_string();
    if negated {
        text.replacen(" NOT ", " ", 1)
            .trim_start_matches("NOT ")
            .to_string()
    } else {
        text
    }
}

fn list_key(list: &[Expr]) -> String {
    let mut items: Vec<String> = list.iter().map(canonical_text).collect();
    items.sort();
    items.dedup();
    items.join(",")
}

fn canonical_query(query: &Query) -> String {
    query.to_string().to_ascii_lowercase()
}

/// Interpret a literal expression in the domain `hint`.
pub fn literal_scalar(expr: &Expr, hint: Option<TypeClass>) -> Option<Scalar> {
    match unnest(expr) {
        Expr::Value(Value::Number(text, _)) => text.parse().ok().map(Scalar::Number),
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match literal_scalar(expr, hint)? {
            Scalar::Number(n) => Some(Scalar::Number(-n)),
            _ => None,
        },
        Expr::Value(Value::Boolean(value)) => Some(Scalar::Bool(*value)),
        Expr::TypedString { data_type, value } => {
            literal_text(value, Some(type_class_of(data_type)))
        }
        Expr::Cast {
            expr, data_type, ..
        } => literal_scalar(expr, Some(type_class_of(data_type))),
        other => literal_text(string_literal(other)?, hint),
    }
}

fn literal_text(text: &str, hint: Option<TypeClass>) -> Option<Scalar> {
    match hint {
        Some(TypeClass::Temporal) => parse_date_literal(text).ok().map(Scalar::Date),
        Some(TypeClass::Integer | TypeClass::Numeric) => {
            text.trim().parse().ok().map(Scalar::Number)
        }
        Some(TypeClass::Boolean) => match text.trim().to_ascii_lowercase().as_str() {
            "t" | "true" | "yes" | "on" | "1" => Some(Scalar::Bool(true)),
            "f" | "false" | "no" | "off" | "0" => Some(Scalar::Bool(false)),
            _ => None,
        },
        _ => Some(Scalar::Text(text.to_string())),
    }
}

fn type_class_of(data_type: &DataType) -> TypeClass {
    TypeClass::from_sql_type(&data_type.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ColumnKey;
    use sqlparser::dialect::PostgreSqlDialect;
    use sqlparser::parser::Parser;

    fn parse_expr(sql: &str) -> Expr {
        Parser::new(&PostgreSqlDialect {})
            .try_with_sql(sql)
            .expect("tokenize")
            .parse_expr()
            .expect("expression")
    }

    fn integer_columns(expr: &Expr) -> Option<ResolvedColumn> {
        let name = column_idents(expr)?.last()?.value.to_ascii_lowercase();
        Some(ResolvedColumn {
            key: ColumnKey { var: 0, column: name },
            nullable: true,
            type_class: TypeClass::Integer,
            outer: false,
        })
    }

    #[test]
    fn mirrored_comparisons_share_an_atom() {
        let expr = parse_expr("5 < sal OR sal > 5");
        let resolver = integer_columns;
        let mut table = AtomTable::new(&resolver);
        let predicate = table.predicate(&expr, Clause::Where);
        assert_eq!(
            predicate,
            Predicate::Or(vec![Predicate::Atom(0), Predicate::Atom(0)])
        );
        let atoms = table.into_atoms();
        assert!(matches!(
            &atoms[0].kind,
            AtomKind::Compare {
                left: Operand::Column(_),
                op: CompareOp::Gt,
                right: Operand::Literal(Scalar::Number(n)),
            } if *n == 5.0
        ));
    }

    #[test]
    fn between_expands_into_two_bounds() {
        let expr = parse_expr("sal NOT BETWEEN 100 AND 200");
        let resolver = integer_columns;
        let mut table = AtomTable::new(&resolver);
        let predicate = table.predicate(&expr, Clause::Where);
        assert_eq!(
            predicate,
            Predicate::Not(Box::new(Predicate::And(vec![
                Predicate::Atom(0),
                Predicate::Atom(1)
            ])))
        );
        let atoms = table.into_atoms();
        assert_eq!(atoms[0].text, "sal >= 100");
        assert_eq!(atoms[1].text, "sal <= 200");
    }

    #[test]
    fn is_not_null_is_a_negated_is_null_atom() {
        let expr = parse_expr("comm IS NOT NULL AND comm IS NULL");
        let resolver = integer_columns;
        let mut table = AtomTable::new(&resolver);
        let predicate = table.predicate(&expr, Clause::Where);
        assert_eq!(
            predicate,
            Predicate::And(vec![
                Predicate::Not(Box::new(Predicate::Atom(0))),
                Predicate::Atom(0)
            ])
        );
    }

    #[test]
    fn date_literals_validate_fields() {
        assert_eq!(parse_date_literal("1970-01-02"), Ok(1.0));
        assert_eq!(
            parse_date_literal("2023-02-30"),
            Err(DateFieldError::Overflow {
                field: "day",
                value: 30
            })
        );
        assert_eq!(
            parse_date_literal("2023-13-01"),
            Err(DateFieldError::Overflow {
                field: "month",
                value: 13
            })
        );
        assert_eq!(parse_date_literal("2024-02-29"), Ok(19_782.0));
        assert_eq!(parse_date_literal("yesterday"), Err(DateFieldError::Malformed));
    }

    #[test]
    fn dates_display_as_literals() {
        assert_eq!(Scalar::Date(19_782.0).to_string(), "DATE '2024-02-29'");
        assert_eq!(Scalar::Date(0.5).to_string(), "TIMESTAMP '1970-01-01 12:00:00'");
    }

    #[test]
    fn literals_follow_the_column_domain() {
        assert_eq!(
            literal_scalar(&parse_expr("'500'"), Some(TypeClass::Integer)),
            Some(Scalar::Number(500.0))
        );
        assert_eq!(
            literal_scalar(&parse_expr("'500'"), Some(TypeClass::Text)),
            Some(Scalar::Text("500".to_string()))
        );
        assert_eq!(
            literal_scalar(&parse_expr("-2.5"), None),
            Some(Scalar::Number(-2.5))
        );
    }
}
