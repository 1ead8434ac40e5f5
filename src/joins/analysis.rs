//! Missing, unnecessary and suspicious joins read off the join graphs.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlparser::ast::SelectItem;

use crate::joins::graph::{build_graphs, EdgeKind, EdgeSource, GraphOutcome, JoinGraph, Node};
use crate::logic::normalizer::ScopePredicates;
use crate::logic::oracle::constant_columns;
use crate::logic::Scalar;
use crate::parser::names::object_name_keys;
use crate::parser::sql_parser::SourceSpan;
use crate::query::{ColumnKey, JoinKind, QueryModel, ScopeId, VarId, VarSource};

/// Why a disconnected variable is not a missing join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Excuse {
    /// Every column of some key is equated with a constant.
    ConstantKey,
    /// The variable ranges over at most one row.
    SingleRow,
}

/// A variable not joined to the rest of its scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Disconnected {
    /// First variable of the disconnected component.
    pub var: VarId,
    /// Conjunction of the filter, when there is one.
    pub conjunction: Option<usize>,
    /// Excuse, if the component is harmless.
    pub excuse: Option<Excuse>,
}

/// A variable whose join can be dropped without changing the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedundantJoin {
    /// The removable variable.
    pub var: VarId,
    /// Key column of the removable variable.
    pub key: ColumnKey,
    /// Foreign key column on the other side.
    pub foreign: ColumnKey,
}

/// An equality between two relations related by some foreign key, on
/// columns that are not that foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuspiciousJoin {
    /// Display text of the equality.
    pub text: String,
    /// Position of the equality.
    pub span: SourceSpan,
    /// Equated columns.
    pub columns: (ColumnKey, ColumnKey),
}

/// Join findings of one scope.
#[derive(Debug, Clone, Serialize)]
pub struct JoinReport {
    /// The scope.
    pub scope: ScopeId,
    /// The graphs analyzed, one per conjunction.
    pub graphs: Vec<JoinGraph>,
    /// Components not joined to the main one, excused or not.
    pub disconnected: Vec<Disconnected>,
    /// Joins that can be removed.
    pub redundant: Vec<RedundantJoin>,
    /// Equalities off the declared foreign key.
    pub suspicious: Vec<SuspiciousJoin>,
    /// Conjunction budget when the filter was not normalized.
    pub inconclusive: Option<usize>,
}

impl JoinReport {
    /// Disconnected components without an excuse.
    pub fn missing(&self) -> impl Iterator<Item = &Disconnected> {
        self.disconnected.iter().filter(|d| d.excuse.is_none())
    }
}

/// Analyze the joins of every scope.
pub fn analyze_joins(model: &QueryModel<'_>, predicates: &[ScopePredicates<'_>]) -> Vec<JoinReport> {
    model
        .scopes
        .iter()
        .map(|scope| analyze_scope(model, predicates, scope.id))
        .collect()
}

/// Analyze the joins of one scope.
pub fn analyze_scope(
    model: &QueryModel<'_>,
    predicates: &[ScopePredicates<'_>],
    scope: ScopeId,
) -> JoinReport {
    let mut report = JoinReport {
        scope,
        graphs: Vec::new(),
        disconnected: Vec::new(),
        redundant: Vec::new(),
        suspicious: Vec::new(),
        inconclusive: None,
    };
    let graphs = match build_graphs(model, predicates, scope) {
        GraphOutcome::Built(graphs) => graphs,
        GraphOutcome::Inconclusive { budget } => {
            report.inconclusive = Some(budget);
            return report;
        }
    };
    for graph in &graphs {
        disconnected(model, predicates, graph, &mut report.disconnected);
        suspicious(model, graph, &mut report.suspicious);
    }
    // A join is only dropped when one conjunction decides it.
    if let [only] = graphs.as_slice() {
        redundant(model, only, &mut report.redundant);
    }
    report.graphs = graphs;
    report
}

fn disconnected(
    model: &QueryModel<'_>,
    predicates: &[ScopePredicates<'_>],
    graph: &JoinGraph,
    out: &mut Vec<Disconnected>,
) {
    let scope = model.scope(graph.scope);
    let Some(first) = scope.vars.first() else {
        return;
    };
    let anchored = graph.edges_of(Node::Outer).next().is_some();
    let main = if anchored {
        graph.component_of(Node::Outer)
    } else {
        graph.component_of(Node::Var(*first))
    };
    let constants = match (
        graph.conjunction,
        predicates.get(graph.scope).and_then(|p| p.filter.as_ref()),
    ) {
        (Some(index), Some(filter)) => filter
            .outcome
            .dnf()
            .map(|dnf| constant_columns(filter, &dnf.conjunctions[index]))
            .unwrap_or_default(),
        _ => Default::default(),
    };
    for component in graph.components() {
        if graph.component_of(component[0]) == main {
            continue;
        }
        let Some(var) = scope
            .vars
            .iter()
            .copied()
            .find(|v| component.contains(&Node::Var(*v)))
        else {
            continue;
        };
        let reportable = component.iter().all(|node| match node {
            Node::Var(v) => {
                let var = model.var(*v);
                var.join != JoinKind::Cross
                    && !matches!(
                        var.source,
                        VarSource::Unresolved { .. } | VarSource::Opaque | VarSource::RecursiveCte(_)
                    )
            }
            Node::Outer => true,
        });
        if !reportable {
            continue;
        }
        let excuse = component.iter().find_map(|node| match node {
            Node::Var(v) => excuse_for(model, *v, &constants),
            Node::Outer => None,
        });
        out.push(Disconnected {
            var,
            conjunction: graph.conjunction,
            excuse,
        });
    }
}

fn excuse_for(
    model: &QueryModel<'_>,
    var: VarId,
    constants: &BTreeMap<ColumnKey, Scalar>,
) -> Option<Excuse> {
    if model.is_single_row_var(var) {
        return Some(Excuse::SingleRow);
    }
    let relation = model.relation_of(var)?;
    let pinned: Vec<&str> = constants
        .keys()
        .filter(|key| key.var == var)
        .map(|key| key.column.as_str())
        .collect();
    (!pinned.is_empty() && relation.is_key(&pinned)).then_some(Excuse::ConstantKey)
}

fn suspicious(model: &QueryModel<'_>, graph: &JoinGraph, out: &mut Vec<SuspiciousJoin>) {
    for edge in graph.edges.iter().filter(|e| e.kind == EdgeKind::Weak) {
        let (
            Some((left, right)),
            EdgeSource::Equality { text, span, .. },
            Node::Var(_),
            Node::Var(_),
        ) = (&edge.columns, &edge.source, edge.a, edge.b)
        else {
            continue;
        };
        let (Some(l), Some(r)) = (model.relation_of(left.var), model.relation_of(right.var)) else {
            continue;
        };
        let related = l.foreign_keys_to(&r.name).next().is_some()
            || r.foreign_keys_to(&l.name).next().is_some();
        if related
            && !graph.linked(edge.a, edge.b, EdgeKind::Key)
            && !out.iter().any(|s| s.span == *span && &s.text == text)
        {
            out.push(SuspiciousJoin {
                text: text.clone(),
                span: *span,
                columns: (left.clone(), right.clone()),
            });
        }
    }
}

fn redundant(model: &QueryModel<'_>, graph: &JoinGraph, out: &mut Vec<RedundantJoin>) {
    let scope = model.scope(graph.scope);
    if scope.vars.len() < 2 {
        return;
    }
    for &var in &scope.vars {
        let tuple = model.var(var);
        let inner = matches!(tuple.join, JoinKind::Base | JoinKind::Inner);
        let left_outer = tuple.join == JoinKind::Left && tuple.null_supplied;
        if !(inner || left_outer) {
            continue;
        }
        let Some(relation) = model.relation_of(var) else {
            continue;
        };
        let edges: Vec<_> = graph.edges_of(Node::Var(var)).collect();
        let [edge] = edges.as_slice() else {
            continue;
        };
        let (EdgeKind::Key, Some((a, b)), EdgeSource::Equality { .. }) =
            (edge.kind, &edge.columns, &edge.source)
        else {
            continue;
        };
        let (key, foreign) = if a.var == var { (a, b) } else { (b, a) };
        if foreign.var == var
            || !scope.vars.contains(&foreign.var)
            || !relation.is_key(&[key.column.as_str()])
        {
            continue;
        }
        if inner {
            let Some(other) = model.relation_of(foreign.var) else {
                continue;
            };
            let declared = other.foreign_keys_to(&relation.name).any(|fk| {
                fk.columns == [foreign.column.clone()] && fk.referenced_columns == [key.column.clone()]
            });
            let not_null = other
                .column(&foreign.column)
                .is_some_and(|column| !column.nullable)
                && !model.var(foreign.var).null_supplied;
            if !declared || !not_null {
                continue;
            }
        }
        if !only_join_references(model, var) || projects_all_of(model, graph.scope, var) {
            continue;
        }
        out.push(RedundantJoin {
            var,
            key: key.clone(),
            foreign: foreign.clone(),
        });
    }
}

/// True when the only reference to `var` anywhere is the one in its join equality.
fn only_join_references(model: &QueryModel<'_>, var: VarId) -> bool {
    model
        .column_refs
        .iter()
        .filter_map(|r| r.resolution.column())
        .filter(|c| c.key.var == var)
        .count()
        == 1
}

fn projects_all_of(model: &QueryModel<'_>, scope: ScopeId, var: VarId) -> bool {
    let name = &model.var(var).name;
    model
        .scope(scope)
        .select
        .projection
        .iter()
        .any(|item| match item {
            SelectItem::Wildcard(_) => true,
            SelectItem::QualifiedWildcard(object, _) => {
                object_name_keys(object).1 == *name
            }
            _ => false,
        })
}
