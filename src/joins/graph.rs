//! Join graphs: tuple variables linked by the equalities of one conjunction.

use serde::Serialize;
use sqlparser::ast::JoinConstraint;

use crate::catalog::Relation;
use crate::logic::normalizer::{
    Conjunction, NormalizeOutcome, NormalizedPredicate, ScopePredicates,
};
use crate::logic::{AtomKind, CompareOp, Operand};
use crate::parser::lexical::Clause;
use crate::parser::names::ident_key;
use crate::parser::sql_parser::SourceSpan;
use crate::query::{ColumnKey, QueryModel, ScopeId, VarId, VarSource};

/// A vertex of a join graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Node {
    /// A tuple variable of the scope or of a positive subquery in the conjunction.
    Var(VarId),
    /// Every variable of the enclosing scopes, for correlated blocks.
    Outer,
}

/// Strength of a join edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EdgeKind {
    /// Foreign key onto the referenced key, or any equality between two
    /// variables over the same relation.
    Key,
    /// Any other equality between columns of two variables.
    Weak,
}

/// Where a join edge comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EdgeSource {
    /// A column equality.
    Equality {
        /// Display text of the atom.
        text: String,
        /// Clause of the atom.
        clause: Clause,
        /// Position of the atom.
        span: SourceSpan,
    },
    /// `x IN (SELECT y ...)`, linking `x` with `y`.
    InSubquery {
        /// Position of the predicate.
        span: SourceSpan,
    },
    /// `USING` or `NATURAL`.
    Using,
    /// A lateral derived table referring to earlier variables.
    Lateral,
}

/// An undirected edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinEdge {
    /// One end.
    pub a: Node,
    /// Other end.
    pub b: Node,
    /// Strength.
    pub kind: EdgeKind,
    /// Equated columns, when the edge is a column equality.
    pub columns: Option<(ColumnKey, ColumnKey)>,
    /// Origin.
    pub source: EdgeSource,
}

impl JoinEdge {
    /// True when `node` is an end of the edge.
    pub fn touches(&self, node: Node) -> bool {
        self.a == node || self.b == node
    }
}

/// Graph of one scope under one conjunction of its filter.
#[derive(Debug, Clone, Serialize)]
pub struct JoinGraph {
    /// The scope.
    pub scope: ScopeId,
    /// Conjunction of the filter; `None` when the scope has no filter.
    pub conjunction: Option<usize>,
    /// Vertices; the scope's own variables come first, in FROM order.
    pub nodes: Vec<Node>,
    /// Edges.
    pub edges: Vec<JoinEdge>,
    components: Vec<usize>,
}

impl JoinGraph {
    /// Component index of `node`.
    pub fn component_of(&self, node: Node) -> Option<usize> {
        self.nodes
            .iter()
            .position(|n| *n == node)
            .map(|index| self.components[index])
    }

    /// Nodes grouped by component, in order of first appearance.
    pub fn components(&self) -> Vec<Vec<Node>> {
        let mut order: Vec<usize> = Vec::new();
        let mut groups: Vec<Vec<Node>> = Vec::new();
        for (node, component) in self.nodes.iter().zip(&self.components) {
            match order.iter().position(|c| c == component) {
                Some(index) => groups[index].push(*node),
                None => {
                    order.push(*component);
                    groups.push(vec![*node]);
                }
            }
        }
        groups
    }

    /// Edges incident to `node`.
    pub fn edges_of(&self, node: Node) -> impl Iterator<Item = &JoinEdge> {
        self.edges.iter().filter(move |edge| edge.touches(node))
    }

    /// True when both nodes are linked by some edge of the given kind.
    pub fn linked(&self, x: Node, y: Node, kind: EdgeKind) -> bool {
        self.edges
            .iter()
            .any(|edge| edge.kind == kind && edge.touches(x) && edge.touches(y))
    }

    fn add_node(&mut self, node: Node) {
        if !self.nodes.contains(&node) {
            self.nodes.push(node);
        }
    }

    fn node_for(&self, var: VarId) -> Option<Node> {
        if self.nodes.contains(&Node::Var(var)) {
            Some(Node::Var(var))
        } else if self.nodes.contains(&Node::Outer) {
            Some(Node::Outer)
        } else {
            None
        }
    }

    fn add_equality(
        &mut self,
        model: &QueryModel<'_>,
        left: &ColumnKey,
        right: &ColumnKey,
        source: EdgeSource,
    ) {
        let (Some(a), Some(b)) = (self.node_for(left.var), self.node_for(right.var)) else {
            return;
        };
        if a == b {
            return;
        }
        self.edges.push(JoinEdge {
            a,
            b,
            kind: edge_kind(model, left, right),
            columns: Some((left.clone(), right.clone())),
            source,
        });
    }

    fn settle(&mut self) {
        let mut sets = DisjointSet::new(self.nodes.len());
        for edge in &self.edges {
            let a = self.nodes.iter().position(|n| *n == edge.a);
            let b = self.nodes.iter().position(|n| *n == edge.b);
            if let (Some(a), Some(b)) = (a, b) {
                sets.union(a, b);
            }
        }
        self.components = (0..self.nodes.len()).map(|i| sets.find(i)).collect();
    }
}

/// Union-find over node indices.
#[derive(Debug)]
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut index: usize) -> usize {
        while self.parent[index] != index {
            self.parent[index] = self.parent[self.parent[index]];
            index = self.parent[index];
        }
        index
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a != b {
            self.parent[b.max(a)] = a.min(b);
        }
    }
}

/// Graphs of one scope, or the budget that stopped normalization.
#[derive(Debug, Clone, Serialize)]
pub enum GraphOutcome {
    /// One graph per conjunction of the filter.
    Built(Vec<JoinGraph>),
    /// The filter was not normalized.
    Inconclusive {
        /// The exceeded conjunction budget.
        budget: usize,
    },
}

/// Key edge when one column is a foreign key onto the other, or when both
/// variables range over the same relation.
pub fn edge_kind(model: &QueryModel<'_>, left: &ColumnKey, right: &ColumnKey) -> EdgeKind {
    let (Some(l), Some(r)) = (model.relation_of(left.var), model.relation_of(right.var)) else {
        return EdgeKind::Weak;
    };
    if l.name == r.name && l.schema == r.schema {
        return EdgeKind::Key;
    }
    if references(l, &left.column, &r.name, &right.column)
        || references(r, &right.column, &l.name, &left.column)
    {
        EdgeKind::Key
    } else {
        EdgeKind::Weak
    }
}

fn references(from: &Relation, column: &str, target: &str, target_column: &str) -> bool {
    from.foreign_keys_to(target).any(|fk| {
        fk.columns
            .iter()
            .zip(&fk.referenced_columns)
            .any(|(c, rc)| c == column && rc == target_column)
    })
}

/// Build the join graphs of `scope`.
pub fn build_graphs(
    model: &QueryModel<'_>,
    predicates: &[ScopePredicates<'_>],
    scope: ScopeId,
) -> GraphOutcome {
    let mut base = JoinGraph {
        scope,
        conjunction: None,
        nodes: model.scope(scope).vars.iter().map(|v| Node::Var(*v)).collect(),
        edges: Vec::new(),
        components: Vec::new(),
    };
    if model.scope(scope).outer.is_some() {
        base.add_node(Node::Outer);
    }
    add_using_edges(&mut base, model, scope);
    add_lateral_edges(&mut base, model, scope);
    if let Some(scope_predicates) = predicates.get(scope) {
        for (_, on) in &scope_predicates.outer_joins {
            if let Some(conjunction) = single_conjunction(on) {
                add_conjunction_edges(&mut base, model, predicates, on, conjunction);
            }
        }
    }

    let filter = predicates.get(scope).and_then(|p| p.filter.as_ref());
    let Some(filter) = filter else {
        base.settle();
        return GraphOutcome::Built(vec![base]);
    };
    let dnf = match &filter.outcome {
        NormalizeOutcome::Normalized(dnf) => dnf,
        NormalizeOutcome::Inconclusive { budget } => {
            return GraphOutcome::Inconclusive { budget: *budget }
        }
    };
    let graphs = dnf
        .conjunctions
        .iter()
        .enumerate()
        .map(|(index, conjunction)| {
            let mut graph = base.clone();
            graph.conjunction = Some(index);
            add_subquery_nodes(&mut graph, model, filter, conjunction);
            add_conjunction_edges(&mut graph, model, predicates, filter, conjunction);
            graph.settle();
            graph
        })
        .collect();
    GraphOutcome::Built(graphs)
}

fn single_conjunction<'a>(predicate: &'a NormalizedPredicate<'_>) -> Option<&'a Conjunction> {
    match predicate.outcome.dnf().map(|dnf| dnf.conjunctions.as_slice()) {
        Some([only]) => Some(only),
        _ => None,
    }
}

fn add_conjunction_edges(
    graph: &mut JoinGraph,
    model: &QueryModel<'_>,
    predicates: &[ScopePredicates<'_>],
    predicate: &NormalizedPredicate<'_>,
    conjunction: &Conjunction,
) {
    for literal in conjunction {
        let atom = &predicate.atoms[literal.atom];
        match &atom.kind {
            AtomKind::Compare {
                left: Operand::Column(left),
                op,
                right: Operand::Column(right),
            } => {
                let op = if literal.positive { *op } else { op.negate() };
                if op == CompareOp::Eq && left.key.var != right.key.var {
                    graph.add_equality(
                        model,
                        &left.key,
                        &right.key,
                        EdgeSource::Equality {
                            text: atom.text.clone(),
                            clause: atom.clause,
                            span: atom.span,
                        },
                    );
                }
            }
            AtomKind::InSubquery {
                operand: Operand::Column(column),
                subquery,
            } if literal.positive => {
                let origin = match model.scopes_of_query(subquery) {
                    [only] => model
                        .outputs(*only)
                        .and_then(|outputs| outputs.first())
                        .and_then(|output| output.origin.clone()),
                    _ => None,
                };
                if let Some(origin) = origin {
                    graph.add_equality(
                        model,
                        &column.key,
                        &origin,
                        EdgeSource::InSubquery { span: atom.span },
                    );
                }
            }
            _ => {}
        }
        let correlated = match &atom.kind {
            AtomKind::Exists(subquery) | AtomKind::InSubquery { subquery, .. } => Some(*subquery),
            _ => None,
        };
        if let Some(subquery) = correlated.filter(|_| literal.positive) {
            add_subquery_filter_edges(graph, model, predicates, subquery);
        }
    }
}

fn add_subquery_nodes(
    graph: &mut JoinGraph,
    model: &QueryModel<'_>,
    filter: &NormalizedPredicate<'_>,
    conjunction: &Conjunction,
) {
    for literal in conjunction.iter().filter(|l| l.positive) {
        let atom = &filter.atoms[literal.atom];
        if !matches!(atom.kind, AtomKind::Exists(_) | AtomKind::InSubquery { .. }) {
            continue;
        }
        if let Some(subquery) = atom.subquery() {
            if let [only] = model.scopes_of_query(subquery) {
                for var in &model.scope(*only).vars {
                    graph.add_node(Node::Var(*var));
                }
            }
        }
    }
}

fn add_subquery_filter_edges(
    graph: &mut JoinGraph,
    model: &QueryModel<'_>,
    predicates: &[ScopePredicates<'_>],
    subquery: &sqlparser::ast::Query,
) {
    let [only] = model.scopes_of_query(subquery) else {
        return;
    };
    let Some(sub) = predicates.get(*only) else {
        return;
    };
    if let Some(filter) = &sub.filter {
        if let Some(conjunction) = single_conjunction(filter) {
            add_conjunction_edges(graph, model, &[], filter, conjunction);
        }
    }
    for (_, on) in &sub.outer_joins {
        if let Some(conjunction) = single_conjunction(on) {
            add_conjunction_edges(graph, model, &[], on, conjunction);
        }
    }
}

fn add_using_edges(graph: &mut JoinGraph, model: &QueryModel<'_>, scope: ScopeId) {
    let vars = &model.scope(scope).vars;
    for (position, var) in vars.iter().enumerate() {
        let names: Vec<String> = match model.var(*var).constraint {
            Some(JoinConstraint::Using(idents)) => idents.iter().map(ident_key).collect(),
            Some(JoinConstraint::Natural) => model
                .columns_of(*var)
                .map(|columns| columns.iter().map(|c| c.name.clone()).collect())
                .unwrap_or_default(),
            _ => continue,
        };
        for name in names {
            let earlier = vars[..position].iter().find(|v| {
                model
                    .columns_of(**v)
                    .is_some_and(|columns| columns.iter().any(|c| c.name == name))
            });
            let Some(earlier) = earlier else {
                continue;
            };
            let left = ColumnKey {
                var: *earlier,
                column: name.clone(),
            };
            let right = ColumnKey {
                var: *var,
                column: name,
            };
            graph.add_equality(model, &left, &right, EdgeSource::Using);
        }
    }
}

fn add_lateral_edges(graph: &mut JoinGraph, model: &QueryModel<'_>, scope: ScopeId) {
    for var in &model.scope(scope).vars {
        let VarSource::Derived(inner) = &model.var(*var).source else {
            continue;
        };
        let targets: Vec<VarId> = model
            .column_refs
            .iter()
            .filter(|r| inner.contains(&r.scope))
            .filter_map(|r| r.resolution.column())
            .filter(|c| c.outer && model.var(c.key.var).scope == scope)
            .map(|c| c.key.var)
            .collect();
        for target in targets {
            if target != *var {
                graph.edges.push(JoinEdge {
                    a: Node::Var(target),
                    b: Node::Var(*var),
                    kind: EdgeKind::Weak,
                    columns: None,
                    source: EdgeSource::Lateral,
                });
            }
        }
    }
}
