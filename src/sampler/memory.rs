use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use serde_json::{Map, Value as JsonValue};
use sqlparser::ast::{
    BinaryOperator, Expr, Query, SelectItem, SetExpr, TableFactor, UnaryOperator, Value,
};

use crate::error::SampleError;
use crate::logic::Truth;
use crate::parser::expr::column_idents;
use crate::parser::names::{fold_identifier, ident_key, object_name_keys};
use crate::sampler::{Probe, ProbeAnswer, ProbeBudget, SampleDatabase};

type Row = Map<String, JsonValue>;

/// Sample rows per relation, loaded from JSON.
///
/// The evaluator understands single-relation SELECTs whose projection is a
/// list of columns (or `*`) and whose WHERE combines column comparisons,
/// NULL tests, AND, OR and NOT. Anything else is reported as unsupported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InMemorySample {
    relations: BTreeMap<String, Vec<Row>>,
}

impl InMemorySample {
    /// Parse `{"relation": [{"column": value, ...}, ...], ...}`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: BTreeMap<String, Vec<Row>> = serde_json::from_str(json)?;
        let relations = raw
            .into_iter()
            .map(|(name, rows)| {
                let rows = rows
                    .into_iter()
                    .map(|row| {
                        row.into_iter()
                            .map(|(column, value)| (fold_identifier(&column), value))
                            .collect()
                    })
                    .collect();
                (fold_identifier(&name), rows)
            })
            .collect();
        Ok(Self { relations })
    }

    /// Number of rows of `relation`, if present.
    pub fn row_count(&self, relation: &str) -> Option<usize> {
        self.relations.get(relation).map(Vec::len)
    }

    fn evaluate(&self, query: &Query, budget: ProbeBudget) -> Result<Vec<Vec<JsonValue>>, SampleError> {
        let unsupported = |what: &str| SampleError::Unsupported(what.to_string());
        let SetExpr::Select(select) = query.body.as_ref() else {
            return Err(unsupported("set operations"));
        };
        if query.with.is_some() || select.having.is_some() || select.distinct.is_some() {
            return Err(unsupported("WITH, HAVING or DISTINCT"));
        }
        let [from] = select.from.as_slice() else {
            return Err(unsupported("more than one relation"));
        };
        if !from.joins.is_empty() {
            return Err(unsupported("joins"));
        }
        let TableFactor::Table { name, alias, .. } = &from.relation else {
            return Err(unsupported("derived tables"));
        };
        let (_, relation) = object_name_keys(name);
        let correlation = alias
            .as_ref()
            .map_or_else(|| relation.clone(), |a| ident_key(&a.name));
        let rows = self
            .relations
            .get(&relation)
            .ok_or_else(|| SampleError::Query(format!("relation `{relation}` is not in the sample")))?;

        let started = Instant::now();
        let mut out = Vec::new();
        for (read, row) in rows.iter().enumerate() {
            if read as u64 >= budget.max_rows {
                return Err(SampleError::RowBudgetExhausted {
                    limit: budget.max_rows,
                });
            }
            if started.elapsed() > budget.timeout {
                return Err(SampleError::Timeout {
                    timeout_ms: u64::try_from(budget.timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            let env = Env {
                row,
                correlation: &correlation,
            };
            if let Some(selection) = &select.selection {
                if env.truth(selection)? != Truth::True {
                    continue;
                }
            }
            let mut projected = Vec::new();
            for item in &select.projection {
                match item {
                    SelectItem::Wildcard(_) => projected.extend(row.values().cloned()),
                    SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                        projected.push(env.value(expr)?);
                    }
                    SelectItem::QualifiedWildcard(..) => {
                        return Err(unsupported("qualified wildcards"));
                    }
                }
            }
            out.push(projected);
        }
        Ok(out)
    }
}

impl SampleDatabase for InMemorySample {
    fn describe(&self) -> String {
        format!("in-memory ({} relations)", self.relations.len())
    }

    fn probe(&self, probe: &Probe, budget: ProbeBudget) -> Result<ProbeAnswer, SampleError> {
        match probe {
            Probe::NullInSubquery { query } => {
                let rows = self.evaluate(query, budget)?;
                Ok(ProbeAnswer::NullPresent(
                    rows.iter().any(|row| row.first().is_some_and(JsonValue::is_null)),
                ))
            }
            Probe::Duplicates { query } => {
                let rows = self.evaluate(query, budget)?;
                let distinct: BTreeSet<String> = rows
                    .iter()
                    .map(|row| JsonValue::Array(row.clone()).to_string())
                    .collect();
                Ok(ProbeAnswer::Duplicates((rows.len() - distinct.len()) as u64))
            }
        }
    }
}

struct Env<'a> {
    row: &'a Row,
    correlation: &'a str,
}

impl Env<'_> {
    fn value(&self, expr: &Expr) -> Result<JsonValue, SampleError> {
        if let Some(idents) = column_idents(expr) {
            let (column, qualifier) = match idents {
                [column] => (column, None),
                [.., qualifier, column] => (column, Some(ident_key(qualifier))),
                [] => return Err(SampleError::Unsupported("empty identifier".to_string())),
            };
            if qualifier.is_some_and(|q| q != self.correlation) {
                return Err(SampleError::Unsupported(format!(
                    "correlated reference `{expr}`"
                )));
            }
            let key = ident_key(column);
            return self
                .row
                .get(&key)
                .cloned()
                .ok_or_else(|| SampleError::Query(format!("column `{key}` is not in the sample")));
        }
        match expr {
            Expr::Nested(inner) => self.value(inner),
            Expr::Value(Value::Null) => Ok(JsonValue::Null),
            Expr::Value(Value::Boolean(b)) => Ok(JsonValue::Bool(*b)),
            Expr::Value(Value::Number(text, _)) => text
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(JsonValue::Number)
                .ok_or_else(|| SampleError::Unsupported(format!("number `{text}`"))),
            Expr::Value(Value::SingleQuotedString(text)) => Ok(JsonValue::String(text.clone())),
            Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr,
            } => match self.value(expr)? {
                JsonValue::Number(n) => n
                    .as_f64()
                    .and_then(|v| serde_json::Number::from_f64(-v))
                    .map(JsonValue::Number)
                    .ok_or_else(|| SampleError::Unsupported(format!("`{expr}`"))),
                _ => Err(SampleError::Unsupported(format!("`-{expr}`"))),
            },
            other => Err(SampleError::Unsupported(format!("expression `{other}`"))),
        }
    }

    fn truth(&self, expr: &Expr) -> Result<Truth, SampleError> {
        match expr {
            Expr::Nested(inner) => self.truth(inner),
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr,
            } => Ok(!self.truth(expr)?),
            Expr::BinaryOp {
                left,
                op: BinaryOperator::And,
                right,
            } => Ok(self.truth(left)?.and(self.truth(right)?)),
            Expr::BinaryOp {
                left,
                op: BinaryOperator::Or,
                right,
            } => Ok(self.truth(left)?.or(self.truth(right)?)),
            Expr::BinaryOp { left, op, right } => {
                let (left, right) = (self.value(left)?, self.value(right)?);
                compare(&left, op, &right)
            }
            Expr::IsNull(inner) => Ok(Truth::from(self.value(inner)?.is_null())),
            Expr::IsNotNull(inner) => Ok(Truth::from(!self.value(inner)?.is_null())),
            Expr::Value(Value::Boolean(b)) => Ok(Truth::from(*b)),
            Expr::Value(Value::Null) => Ok(Truth::Unknown),
            other => Err(SampleError::Unsupported(format!("condition `{other}`"))),
        }
    }
}

fn compare(left: &JsonValue, op: &BinaryOperator, right: &JsonValue) -> Result<Truth, SampleError> {
    use std::cmp::Ordering;
    let ordering = match (left, right) {
        (JsonValue::Null, _) | (_, JsonValue::Null) => return Ok(Truth::Unknown),
        (JsonValue::Number(a), JsonValue::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b)),
        (JsonValue::String(a), JsonValue::String(b)) => Some(a.cmp(b)),
        (JsonValue::Bool(a), JsonValue::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    };
    let Some(ordering) = ordering else {
        return Err(SampleError::Unsupported(format!(
            "comparison of {left} with {right}"
        )));
    };
    let holds = match op {
        BinaryOperator::Eq => ordering == Ordering::Equal,
        BinaryOperator::NotEq => ordering != Ordering::Equal,
        BinaryOperator::Lt => ordering == Ordering::Less,
        BinaryOperator::LtEq => ordering != Ordering::Greater,
        BinaryOperator::Gt => ordering == Ordering::Greater,
        BinaryOperator::GtEq => ordering != Ordering::Less,
        other => return Err(SampleError::Unsupported(format!("operator `{other}`"))),
    };
    Ok(Truth::from(holds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::sql_parser::parse_query;
    use std::time::Duration;

    const SAMPLE: &str = r#"{
        "EMP": [
            {"empno": 1, "ename": "KING", "mgr": null, "deptno": 10},
            {"empno": 2, "ename": "BLAKE", "mgr": 1, "deptno": 30},
            {"empno": 3, "ename": "ALLEN", "mgr": 2, "deptno": 30}
        ]
    }"#;

    fn budget() -> ProbeBudget {
        ProbeBudget {
            max_rows: 100,
            timeout: Duration::from_secs(5),
        }
    }

    fn probe_nulls(sql: &str) -> Result<ProbeAnswer, SampleError> {
        let sample = InMemorySample::from_json(SAMPLE).expect("sample");
        let query = parse_query(sql).expect("query");
        sample.probe(&Probe::NullInSubquery { query }, budget())
    }

    #[test]
    fn null_probe_sees_filtered_rows_only() {
        assert_eq!(probe_nulls("SELECT mgr FROM emp"), Ok(ProbeAnswer::NullPresent(true)));
        assert_eq!(
            probe_nulls("SELECT mgr FROM emp WHERE deptno = 30"),
            Ok(ProbeAnswer::NullPresent(false))
        );
        assert_eq!(
            probe_nulls("SELECT e.mgr FROM emp e WHERE NOT (e.ename = 'KING' OR e.empno > 2)"),
            Ok(ProbeAnswer::NullPresent(false))
        );
    }

    #[test]
    fn duplicates_are_counted_over_projected_columns() {
        let sample = InMemorySample::from_json(SAMPLE).expect("sample");
        let query = parse_query("SELECT deptno FROM emp").expect("query");
        assert_eq!(
            sample.probe(&Probe::Duplicates { query }, budget()),
            Ok(ProbeAnswer::Duplicates(1))
        );
    }

    #[test]
    fn budgets_and_unsupported_shapes_fail_the_probe() {
        let sample = InMemorySample::from_json(SAMPLE).expect("sample");
        let query = parse_query("SELECT mgr FROM emp").expect("query");
        let tight = ProbeBudget {
            max_rows: 2,
            timeout: Duration::from_secs(5),
        };
        assert_eq!(
            sample.probe(&Probe::NullInSubquery { query }, tight),
            Err(SampleError::RowBudgetExhausted { limit: 2 })
        );
        assert!(matches!(
            probe_nulls("SELECT e.mgr FROM emp e, dept d"),
            Err(SampleError::Unsupported(_))
        ));
        assert!(matches!(
            probe_nulls("SELECT mgr FROM emp WHERE deptno = x.deptno"),
            Err(SampleError::Unsupported(_))
        ));
        assert_eq!(sample.row_count("emp"), Some(3));
    }
}
