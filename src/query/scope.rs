//! Scope model of one query.
//!
//! Every SELECT block becomes a [`SelectScope`]; every FROM item becomes a
//! [`TupleVar`]. Column references are resolved once, against the scope
//! chain, so checks never repeat name lookup.

use std::fmt;

use serde::Serialize;
use sqlparser::ast::{
    Expr, GroupByExpr, Ident, JoinConstraint, JoinOperator, ObjectName, OrderByExpr, Query, Select,
    SelectItem, SetExpr, SetOperator, SetQuantifier, Spanned, TableAlias, TableFactor,
    TableWithJoins, Value,
};

use crate::catalog::{Relation, SchemaCatalog, TypeClass};
use crate::parser::expr::{
    column_idents, contains_aggregate, is_aggregate_call, is_constant, normalized_function_name,
    unnest, walk_expr,
};
use crate::parser::lexical::Clause;
use crate::parser::names::{ident_key, object_name_keys};
use crate::parser::sql_parser::SourceSpan;

/// Index of a scope in [`QueryModel::scopes`].
pub type ScopeId = usize;
/// Index of a tuple variable in [`QueryModel::vars`].
pub type VarId = usize;

/// Why a SELECT block exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeRole {
    /// The outermost SELECT.
    Root,
    /// Operand of a top-level UNION/INTERSECT/EXCEPT.
    SetOperand,
    /// Derived table in FROM.
    Derived,
    /// Body of a common table expression.
    Cte,
    /// `EXISTS (...)` subquery.
    Exists,
    /// `IN (...)` subquery.
    In,
    /// `op ANY/ALL (...)` subquery.
    Quantified,
    /// Scalar subquery.
    Scalar,
}

impl ScopeRole {
    /// True for scopes whose rows form the query result.
    pub fn is_top_level(self) -> bool {
        matches!(self, ScopeRole::Root | ScopeRole::SetOperand)
    }
}

impl fmt::Display for ScopeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeRole::Root => write!(f, "query"),
            ScopeRole::SetOperand => write!(f, "set operand"),
            ScopeRole::Derived => write!(f, "derived table"),
            ScopeRole::Cte => write!(f, "common table expression"),
            ScopeRole::Exists => write!(f, "EXISTS subquery"),
            ScopeRole::In => write!(f, "IN subquery"),
            ScopeRole::Quantified => write!(f, "ANY/ALL subquery"),
            ScopeRole::Scalar => write!(f, "scalar subquery"),
        }
    }
}

/// One SELECT block.
#[derive(Debug, Clone)]
pub struct SelectScope<'q> {
    /// Identity.
    pub id: ScopeId,
    /// The SELECT itself.
    pub select: &'q Select,
    /// The query whose body holds this SELECT.
    pub query: &'q Query,
    /// True when `query.body` is this SELECT, so ORDER BY and LIMIT belong to it.
    pub owns_modifiers: bool,
    /// Enclosing scope, if any.
    pub parent: Option<ScopeId>,
    /// Scope consulted when a name does not resolve locally.
    pub outer: Option<ScopeId>,
    /// Why the block exists.
    pub role: ScopeRole,
    /// `NOT EXISTS` / `NOT IN`.
    pub negated: bool,
    /// Clause of the parent holding this subquery.
    pub host_clause: Option<Clause>,
    /// Predicate of the parent holding this subquery.
    pub host_expr: Option<&'q Expr>,
    /// Tuple variables of the FROM clause, in source order.
    pub vars: Vec<VarId>,
    /// Position of the block.
    pub span: SourceSpan,
}

impl<'q> SelectScope<'q> {
    /// `GROUP BY` expressions.
    pub fn group_by(&self) -> &'q [Expr] {
        match &self.select.group_by {
            GroupByExpr::Expressions(exprs, _) => exprs,
            GroupByExpr::All(_) => &[],
        }
    }

    /// ORDER BY items attached to this block.
    pub fn order_by(&self) -> &'q [OrderByExpr] {
        match (&self.query.order_by, self.owns_modifiers) {
            (Some(order_by), true) => &order_by.exprs,
            _ => &[],
        }
    }
}

/// How a tuple variable entered the FROM clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    /// First item of a FROM list entry (comma join).
    Base,
    /// `[INNER] JOIN`.
    Inner,
    /// `CROSS JOIN`.
    Cross,
    /// `LEFT [OUTER] JOIN`.
    Left,
    /// `RIGHT [OUTER] JOIN`.
    Right,
    /// `FULL [OUTER] JOIN`.
    Full,
    /// Any vendor join form.
    Other,
}

impl JoinKind {
    /// True for LEFT, RIGHT and FULL joins.
    pub fn is_outer(self) -> bool {
        matches!(self, JoinKind::Left | JoinKind::Right | JoinKind::Full)
    }
}

/// What a tuple variable ranges over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarSource {
    /// A catalog relation.
    Relation {
        /// Schema, as written or resolved.
        schema: Option<String>,
        /// Relation name.
        name: String,
    },
    /// A common table expression, by index in [`QueryModel::ctes`].
    Cte(usize),
    /// A derived table; scopes of its query.
    Derived(Vec<ScopeId>),
    /// A name that is neither in the catalog nor a visible CTE.
    Unresolved {
        /// Schema as written.
        schema: Option<String>,
        /// Relation name as written.
        name: String,
    },
    /// Self-reference inside a recursive CTE.
    RecursiveCte(usize),
    /// Table functions and other sources without known columns.
    Opaque,
}

/// A correlation name in some FROM clause.
#[derive(Debug, Clone)]
pub struct TupleVar<'q> {
    /// Identity.
    pub id: VarId,
    /// Owning scope.
    pub scope: ScopeId,
    /// Correlation name: the alias, or the relation name.
    pub name: String,
    /// Explicit alias.
    pub alias: Option<&'q Ident>,
    /// Relation name as written.
    pub object: Option<&'q ObjectName>,
    /// What the variable ranges over.
    pub source: VarSource,
    /// How it was joined.
    pub join: JoinKind,
    /// Join constraint attached to this variable.
    pub constraint: Option<&'q JoinConstraint>,
    /// The variable sits on the null-supplying side of an outer join.
    pub null_supplied: bool,
    /// Column renames from `AS alias (a, b)`.
    pub alias_columns: Vec<String>,
    /// Position of the name or alias.
    pub span: SourceSpan,
}

impl TupleVar<'_> {
    /// Catalog relation name, for relation-backed variables.
    pub fn relation_name(&self) -> Option<&str> {
        match &self.source {
            VarSource::Relation { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// A common table expression.
#[derive(Debug, Clone)]
pub struct CteDef<'q> {
    /// Name, folded.
    pub name: String,
    /// The alias as written.
    pub alias: &'q TableAlias,
    /// The CTE's query.
    pub query: &'q Query,
    /// Scopes of its body.
    pub scopes: Vec<ScopeId>,
}

/// A UNION, INTERSECT or EXCEPT.
#[derive(Debug, Clone)]
pub struct SetOperation<'q> {
    /// Operator.
    pub op: SetOperator,
    /// ALL / DISTINCT.
    pub quantifier: SetQuantifier,
    /// Scopes of the left operand.
    pub left: Vec<ScopeId>,
    /// Scopes of the right operand.
    pub right: Vec<ScopeId>,
    /// Query whose body holds the operation.
    pub query: &'q Query,
    /// Role shared by the operands.
    pub role: ScopeRole,
    /// Enclosing scope.
    pub parent: Option<ScopeId>,
}

impl SetOperation<'_> {
    /// True for `UNION` without `ALL`.
    pub fn is_distinct_union(&self) -> bool {
        self.op == SetOperator::Union
            && !matches!(
                self.quantifier,
                SetQuantifier::All | SetQuantifier::AllByName
            )
    }
}

/// Identity of a column of a tuple variable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ColumnKey {
    /// Tuple variable.
    pub var: VarId,
    /// Folded column name.
    pub column: String,
}

/// Output column of a SELECT block or column of a tuple variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputColumn {
    /// Column name.
    pub name: String,
    /// Whether NULL may appear.
    pub nullable: bool,
    /// Domain.
    pub type_class: TypeClass,
    /// Input column the output copies, if it is a plain reference.
    pub origin: Option<ColumnKey>,
}

/// A column reference resolved to a tuple variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    /// The column.
    pub key: ColumnKey,
    /// Whether NULL may appear, accounting for outer joins.
    pub nullable: bool,
    /// Domain.
    pub type_class: TypeClass,
    /// Resolved in an enclosing scope (correlated reference).
    pub outer: bool,
}

/// Result of resolving a column reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Unique match.
    Column(ResolvedColumn),
    /// An output alias of the same block (ORDER BY / GROUP BY).
    OutputAlias(String),
    /// Several tuple variables of the same scope have the column.
    Ambiguous {
        /// Column name.
        column: String,
        /// Candidate variables.
        vars: Vec<VarId>,
    },
    /// No variable has the column.
    UndefinedColumn {
        /// Qualifying variable, when the reference was qualified.
        var: Option<VarId>,
        /// Column name.
        column: String,
    },
    /// The qualifier names no visible tuple variable.
    UndefinedQualifier {
        /// Qualifier as written.
        qualifier: String,
        /// Column name.
        column: String,
    },
    /// The candidate variable ranges over a source with unknown columns.
    UnknownSource(VarId),
}

impl Resolution {
    /// The resolved column, if unique.
    pub fn column(&self) -> Option<&ResolvedColumn> {
        match self {
            Resolution::Column(column) => Some(column),
            _ => None,
        }
    }
}

/// A column reference occurring in some clause of some scope.
#[derive(Debug, Clone)]
pub struct ColumnRef<'q> {
    /// The identifier expression.
    pub expr: &'q Expr,
    /// Scope in which it occurs.
    pub scope: ScopeId,
    /// Clause in which it occurs.
    pub clause: Clause,
    /// Resolution result.
    pub resolution: Resolution,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ColumnsState {
    Pending,
    Known(Vec<OutputColumn>),
    Opaque,
}

#[derive(Clone, Copy)]
struct WalkContext<'q> {
    parent: Option<ScopeId>,
    outer: Option<ScopeId>,
    role: ScopeRole,
    negated: bool,
    host_clause: Option<Clause>,
    host_expr: Option<&'q Expr>,
}

impl WalkContext<'_> {
    fn detached(role: ScopeRole) -> Self {
        Self {
            parent: None,
            outer: None,
            role,
            negated: false,
            host_clause: None,
            host_expr: None,
        }
    }
}

/// Scopes, tuple variables and resolved column references of one query.
#[derive(Debug, Clone)]
pub struct QueryModel<'q> {
    /// Catalog used for resolution.
    pub catalog: &'q SchemaCatalog,
    /// The analyzed query.
    pub root: &'q Query,
    /// SELECT blocks in walk order (parents before children).
    pub scopes: Vec<SelectScope<'q>>,
    /// Tuple variables of all scopes.
    pub vars: Vec<TupleVar<'q>>,
    /// Common table expressions.
    pub ctes: Vec<CteDef<'q>>,
    /// Set operations.
    pub set_operations: Vec<SetOperation<'q>>,
    /// Every column reference outside subqueries of its own scope.
    pub column_refs: Vec<ColumnRef<'q>>,
    query_scopes: Vec<(&'q Query, Vec<ScopeId>)>,
    outputs: Vec<ColumnsState>,
    var_columns: Vec<ColumnsState>,
}

impl<'q> QueryModel<'q> {
    /// Build the scope model of `query`.
    pub fn build(query: &'q Query, catalog: &'q SchemaCatalog) -> Self {
        let mut model = Self {
            catalog,
            root: query,
            scopes: Vec::new(),
            vars: Vec::new(),
            ctes: Vec::new(),
            set_operations: Vec::new(),
            column_refs: Vec::new(),
            query_scopes: Vec::new(),
            outputs: Vec::new(),
            var_columns: Vec::new(),
        };
        let mut visible_ctes = Vec::new();
        model.walk_query(query, WalkContext::detached(ScopeRole::Root), &mut visible_ctes);
        model.settle_columns();
        model.collect_column_refs();
        model
    }

    fn walk_query(
        &mut self,
        query: &'q Query,
        ctx: WalkContext<'q>,
        visible_ctes: &mut Vec<usize>,
    ) -> Vec<ScopeId> {
        let mark = visible_ctes.len();
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                let index = self.ctes.len();
                self.ctes.push(CteDef {
                    name: ident_key(&cte.alias.name),
                    alias: &cte.alias,
                    query: &cte.query,
                    scopes: Vec::new(),
                });
                // Visible to its own body only as a recursive reference.
                visible_ctes.push(index);
                let scopes = self.walk_query(
                    &cte.query,
                    WalkContext::detached(ScopeRole::Cte),
                    visible_ctes,
                );
                self.ctes[index].scopes = scopes;
            }
        }
        let scopes = self.walk_set_expr(&query.body, query, true, ctx, visible_ctes);
        visible_ctes.truncate(mark);
        self.query_scopes.push((query, scopes.clone()));
        scopes
    }

    fn walk_set_expr(
        &mut self,
        body: &'q SetExpr,
        query: &'q Query,
        direct: bool,
        ctx: WalkContext<'q>,
        visible_ctes: &mut Vec<usize>,
    ) -> Vec<ScopeId> {
        match body {
            SetExpr::Select(select) => vec![self.add_scope(select, query, direct, ctx, visible_ctes)],
            SetExpr::Query(inner) => self.walk_query(inner, ctx, visible_ctes),
            SetExpr::SetOperation {
                op,
                set_quantifier,
                left,
                right,
            } => {
                let role = if ctx.role == ScopeRole::Root {
                    ScopeRole::SetOperand
                } else {
                    ctx.role
                };
                let operand_ctx = WalkContext { role, ..ctx };
                let left = self.walk_set_expr(left, query, false, operand_ctx, visible_ctes);
                let right = self.walk_set_expr(right, query, false, operand_ctx, visible_ctes);
                self.set_operations.push(SetOperation {
                    op: *op,
                    quantifier: *set_quantifier,
                    left: left.clone(),
                    right: right.clone(),
                    query,
                    role,
                    parent: ctx.parent,
                });
                left.into_iter().chain(right).collect()
            }
            _ => Vec::new(),
        }
    }

    fn add_scope(
        &mut self,
        select: &'q Select,
        query: &'q Query,
        direct: bool,
        ctx: WalkContext<'q>,
        visible_ctes: &mut Vec<usize>,
    ) -> ScopeId {
        let id = self.scopes.len();
        self.scopes.push(SelectScope {
            id,
            select,
            query,
            owns_modifiers: direct,
            parent: ctx.parent,
            outer: ctx.outer,
            role: ctx.role,
            negated: ctx.negated,
            host_clause: ctx.host_clause,
            host_expr: ctx.host_expr,
            vars: Vec::new(),
            span: SourceSpan::from(select.select_token.0.span),
        });
        self.outputs.push(ColumnsState::Pending);

        for table in &select.from {
            self.add_table_with_joins(id, table, visible_ctes);
        }
        for item in &select.projection {
            if let SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } = item {
                self.walk_subqueries(id, expr, Clause::Select, visible_ctes);
            }
        }
        if let Some(selection) = &select.selection {
            self.walk_subqueries(id, selection, Clause::Where, visible_ctes);
        }
        if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
            for expr in exprs {
                self.walk_subqueries(id, expr, Clause::GroupBy, visible_ctes);
            }
        }
        if let Some(having) = &select.having {
            self.walk_subqueries(id, having, Clause::Having, visible_ctes);
        }
        if direct {
            if let Some(order_by) = &query.order_by {
                for item in &order_by.exprs {
                    self.walk_subqueries(id, &item.expr, Clause::OrderBy, visible_ctes);
                }
            }
        }
        id
    }

    fn add_table_with_joins(
        &mut self,
        scope: ScopeId,
        table: &'q TableWithJoins,
        visible_ctes: &mut Vec<usize>,
    ) -> Vec<VarId> {
        let mut seen = self.add_factor(scope, &table.relation, JoinKind::Base, None, visible_ctes);
        for join in &table.joins {
            let (kind, constraint) = join_kind(&join.join_operator);
            let added = self.add_factor(scope, &join.relation, kind, constraint, visible_ctes);
            let null_supplied: Vec<VarId> = match kind {
                JoinKind::Left => added.clone(),
                JoinKind::Right => seen.clone(),
                JoinKind::Full => seen.iter().chain(added.iter()).copied().collect(),
                _ => Vec::new(),
            };
            for var in null_supplied {
                self.vars[var].null_supplied = true;
            }
            if let Some(JoinConstraint::On(on)) = constraint {
                self.walk_subqueries(scope, on, Clause::From, visible_ctes);
            }
            seen.extend(added);
        }
        seen
    }

    fn add_factor(
        &mut self,
        scope: ScopeId,
        factor: &'q TableFactor,
        join: JoinKind,
        constraint: Option<&'q JoinConstraint>,
        visible_ctes: &mut Vec<usize>,
    ) -> Vec<VarId> {
        let (name, alias, object, source, alias_columns, span) = match factor {
            TableFactor::Table {
                name: object,
                alias,
                args,
                ..
            } => {
                let (schema, relation) = object_name_keys(object);
                let source = if args.is_some() {
                    VarSource::Opaque
                } else {
                    self.table_source(schema, &relation, visible_ctes)
                };
                let span = object
                    .0
                    .last()
                    .map(|ident| SourceSpan::from(ident.span))
                    .unwrap_or_default();
                (
                    relation,
                    alias.as_ref(),
                    Some(object),
                    source,
                    alias_columns(alias.as_ref()),
                    span,
                )
            }
            TableFactor::Derived {
                lateral,
                subquery,
                alias,
            } => {
                let parent = &self.scopes[scope];
                let ctx = WalkContext {
                    parent: Some(scope),
                    outer: if *lateral { Some(scope) } else { parent.outer },
                    role: ScopeRole::Derived,
                    negated: false,
                    host_clause: Some(Clause::From),
                    host_expr: None,
                };
                let scopes = self.walk_query(subquery, ctx, visible_ctes);
                let span = SourceSpan::from(subquery.span());
                (
                    String::new(),
                    alias.as_ref(),
                    None,
                    VarSource::Derived(scopes),
                    alias_columns(alias.as_ref()),
                    span,
                )
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => {
                let vars = self.add_table_with_joins(scope, table_with_joins, visible_ctes);
                if let Some(first) = vars.first() {
                    self.vars[*first].join = join;
                    self.vars[*first].constraint = constraint;
                }
                return vars;
            }
            other => {
                let alias = match other {
                    TableFactor::TableFunction { alias, .. }
                    | TableFactor::Function { alias, .. }
                    | TableFactor::UNNEST { alias, .. } => alias.as_ref(),
                    _ => None,
                };
                (
                    String::new(),
                    alias,
                    None,
                    VarSource::Opaque,
                    alias_columns(alias),
                    SourceSpan::from(other.span()),
                )
            }
        };

        let id = self.vars.len();
        let correlation = alias.map(|a| ident_key(&a.name)).unwrap_or(name);
        let span = alias
            .map(|a| SourceSpan::from(a.name.span))
            .filter(|s| !s.is_unknown())
            .unwrap_or(span);
        let columns = match &source {
            VarSource::Relation { schema, name } => {
                match self.catalog.relation(schema.as_deref(), name) {
                    Some(relation) => {
                        ColumnsState::Known(rename(relation_columns(relation, id), &alias_columns))
                    }
                    None => ColumnsState::Opaque,
                }
            }
            VarSource::Derived(_) | VarSource::Cte(_) => ColumnsState::Pending,
            _ => ColumnsState::Opaque,
        };
        self.vars.push(TupleVar {
            id,
            scope,
            name: correlation,
            alias: alias.map(|a| &a.name),
            object,
            source,
            join,
            constraint,
            null_supplied: false,
            alias_columns,
            span,
        });
        self.var_columns.push(columns);
        self.scopes[scope].vars.push(id);
        vec![id]
    }

    fn table_source(
        &self,
        schema: Option<String>,
        relation: &str,
        visible_ctes: &[usize],
    ) -> VarSource {
        if schema.is_none() {
            if let Some(index) = visible_ctes
                .iter()
                .rev()
                .copied()
                .find(|i| self.ctes[*i].name == relation)
            {
                // The body of a CTE is walked before its scopes are recorded.
                return if self.ctes[index].scopes.is_empty() {
                    VarSource::RecursiveCte(index)
                } else {
                    VarSource::Cte(index)
                };
            }
        }
        match self.catalog.relation(schema.as_deref(), relation) {
            Some(found) => VarSource::Relation {
                schema: found.schema.clone().or(schema),
                name: found.name.clone(),
            },
            None => VarSource::Unresolved {
                schema,
                name: relation.to_string(),
            },
        }
    }

    fn walk_subqueries(
        &mut self,
        scope: ScopeId,
        expr: &'q Expr,
        clause: Clause,
        visible_ctes: &mut Vec<usize>,
    ) {
        let mut found: Vec<(&'q Query, ScopeRole, bool, &'q Expr)> = Vec::new();
        let mut quantified: Vec<&'q Query> = Vec::new();
        walk_expr(expr, &mut |node| match node {
            Expr::Exists { subquery, negated } => {
                found.push((subquery.as_ref(), ScopeRole::Exists, *negated, node))
            }
            Expr::InSubquery {
                subquery, negated, ..
            } => found.push((subquery.as_ref(), ScopeRole::In, *negated, node)),
            Expr::AnyOp { right, .. } | Expr::AllOp { right, .. } => {
                if let Expr::Subquery(subquery) = unnest(right) {
                    quantified.push(subquery.as_ref());
                    found.push((subquery.as_ref(), ScopeRole::Quantified, false, node));
                }
            }
            Expr::Subquery(subquery) => {
                if !quantified
                    .iter()
                    .any(|q| std::ptr::eq(*q, subquery.as_ref()))
                {
                    found.push((subquery.as_ref(), ScopeRole::Scalar, false, node));
                }
            }
            _ => {}
        });
        for (subquery, role, negated, host) in found {
            let ctx = WalkContext {
                parent: Some(scope),
                outer: Some(scope),
                role,
                negated,
                host_clause: Some(clause),
                host_expr: Some(host),
            };
            self.walk_query(subquery, ctx, visible_ctes);
        }
    }

    /// Compute output columns of every scope and the columns of derived and
    /// CTE variables. Sources that never settle stay opaque.
    fn settle_columns(&mut self) {
        loop {
            let mut progress = false;
            for scope in (0..self.scopes.len()).rev() {
                if self.outputs[scope] == ColumnsState::Pending
                    && self.scopes[scope]
                        .vars
                        .iter()
                        .all(|v| self.var_columns[*v] != ColumnsState::Pending)
                {
                    self.outputs[scope] = self.compute_outputs(scope);
                    progress = true;
                }
            }
            for var in 0..self.vars.len() {
                if self.var_columns[var] != ColumnsState::Pending {
                    continue;
                }
                let scopes = match &self.vars[var].source {
                    VarSource::Derived(scopes) => scopes.clone(),
                    VarSource::Cte(index) => self.ctes[*index].scopes.clone(),
                    _ => Vec::new(),
                };
                let state = self.combined_outputs(&scopes, var);
                if state != ColumnsState::Pending {
                    self.var_columns[var] = state;
                    progress = true;
                }
            }
            if !progress {
                break;
            }
        }
        for state in self.outputs.iter_mut().chain(self.var_columns.iter_mut()) {
            if *state == ColumnsState::Pending {
                *state = ColumnsState::Opaque;
            }
        }
    }

    fn combined_outputs(&self, scopes: &[ScopeId], var: VarId) -> ColumnsState {
        let Some(first) = scopes.first() else {
            return ColumnsState::Opaque;
        };
        if scopes
            .iter()
            .any(|s| self.outputs[*s] == ColumnsState::Pending)
        {
            return ColumnsState::Pending;
        }
        let ColumnsState::Known(first_columns) = &self.outputs[*first] else {
            return ColumnsState::Opaque;
        };
        let mut columns = first_columns.clone();
        for other in &scopes[1..] {
            if let ColumnsState::Known(other_columns) = &self.outputs[*other] {
                for (column, other) in columns.iter_mut().zip(other_columns) {
                    column.nullable |= other.nullable;
                }
            }
        }
        let renamed = rename(columns, &self.vars[var].alias_columns);
        ColumnsState::Known(
            renamed
                .into_iter()
                .map(|mut c| {
                    c.origin = Some(ColumnKey {
                        var,
                        column: c.name.clone(),
                    });
                    c
                })
                .collect(),
        )
    }

    fn compute_outputs(&self, scope: ScopeId) -> ColumnsState {
        let mut columns = Vec::new();
        for item in &self.scopes[scope].select.projection {
            match item {
                SelectItem::Wildcard(_) => {
                    for var in &self.scopes[scope].vars {
                        match &self.var_columns[*var] {
                            ColumnsState::Known(var_columns) => {
                                columns.extend(var_columns.iter().cloned())
                            }
                            _ => return ColumnsState::Opaque,
                        }
                    }
                }
                SelectItem::QualifiedWildcard(name, _) => {
                    let qualifier = object_name_keys(name).1;
                    let var = self.scopes[scope]
                        .vars
                        .iter()
                        .find(|v| self.vars[**v].name == qualifier);
                    match var.map(|v| &self.var_columns[*v]) {
                        Some(ColumnsState::Known(var_columns)) => {
                            columns.extend(var_columns.iter().cloned())
                        }
                        _ => return ColumnsState::Opaque,
                    }
                }
                SelectItem::UnnamedExpr(expr) => {
                    columns.push(self.expr_output(scope, expr, output_name(expr)));
                }
                SelectItem::ExprWithAlias { expr, alias } => {
                    columns.push(self.expr_output(scope, expr, ident_key(alias)));
                }
            }
        }
        ColumnsState::Known(columns)
    }

    fn expr_output(&self, scope: ScopeId, expr: &Expr, name: String) -> OutputColumn {
        let inner = match unnest(expr) {
            Expr::Cast { expr, .. } => unnest(expr),
            other => other,
        };
        if let Some(idents) = column_idents(inner) {
            if let Resolution::Column(resolved) = self.resolve(scope, idents) {
                return OutputColumn {
                    name,
                    nullable: resolved.nullable,
                    type_class: resolved.type_class,
                    origin: Some(resolved.key),
                };
            }
        }
        let (nullable, type_class) = match inner {
            Expr::Value(Value::Number(n, _)) if n.contains(['.', 'e', 'E']) => {
                (false, TypeClass::Numeric)
            }
            Expr::Value(Value::Number(..)) => (false, TypeClass::Integer),
            Expr::Value(Value::SingleQuotedString(_)) => (false, TypeClass::Text),
            Expr::Value(Value::Boolean(_)) => (false, TypeClass::Boolean),
            Expr::Function(func)
                if is_aggregate_call(func) && normalized_function_name(func) == "count" =>
            {
                (false, TypeClass::Integer)
            }
            _ => (true, TypeClass::Other),
        };
        OutputColumn {
            name,
            nullable,
            type_class,
            origin: None,
        }
    }

    fn collect_column_refs(&mut self) {
        let mut refs = Vec::new();
        for scope in &self.scopes {
            let id = scope.id;
            let select = scope.select;
            let mut visit = |expr: &'q Expr, clause: Clause| {
                walk_expr(expr, &mut |node| {
                    if let Some(idents) = column_idents(node) {
                        refs.push(ColumnRef {
                            expr: node,
                            scope: id,
                            clause,
                            resolution: self.resolve_in_clause(id, idents, clause),
                        });
                    }
                });
            };
            for item in &select.projection {
                if let SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } =
                    item
                {
                    visit(expr, Clause::Select);
                }
            }
            for var in &scope.vars {
                if let Some(JoinConstraint::On(on)) = self.vars[*var].constraint {
                    visit(on, Clause::From);
                }
            }
            if let Some(selection) = &select.selection {
                visit(selection, Clause::Where);
            }
            for expr in scope.group_by() {
                visit(expr, Clause::GroupBy);
            }
            if let Some(having) = &select.having {
                visit(having, Clause::Having);
            }
            for item in scope.order_by() {
                visit(&item.expr, Clause::OrderBy);
            }
        }
        self.column_refs = refs;
    }

    fn resolve_in_clause(&self, scope: ScopeId, idents: &[Ident], clause: Clause) -> Resolution {
        let alias_first = clause == Clause::OrderBy;
        let alias_fallback = clause == Clause::GroupBy;
        if let [single] = idents {
            let name = ident_key(single);
            let is_alias = self.scopes[scope].select.projection.iter().any(|item| {
                matches!(item, SelectItem::ExprWithAlias { alias, .. } if ident_key(alias) == name)
            });
            if is_alias && alias_first {
                return Resolution::OutputAlias(name);
            }
            let resolution = self.resolve(scope, idents);
            if is_alias && alias_fallback && resolution.column().is_none() {
                return Resolution::OutputAlias(name);
            }
            return resolution;
        }
        self.resolve(scope, idents)
    }

    /// Resolve `idents` (`col`, `var.col` or `schema.rel.col`) from `scope`
    /// outwards.
    pub fn resolve(&self, scope: ScopeId, idents: &[Ident]) -> Resolution {
        let (qualifier, column) = match idents {
            [] => {
                return Resolution::UndefinedColumn {
                    var: None,
                    column: String::new(),
                }
            }
            [column] => (None, ident_key(column)),
            [.., qualifier, column] => (Some(ident_key(qualifier)), ident_key(column)),
        };
        let mut current = Some(scope);
        let mut outer = false;
        while let Some(s) = current {
            if let Some(resolution) = self.resolve_local(s, qualifier.as_deref(), &column, outer) {
                return resolution;
            }
            current = self.scopes[s].outer;
            outer = true;
        }
        match qualifier {
            Some(qualifier) => Resolution::UndefinedQualifier { qualifier, column },
            None => Resolution::UndefinedColumn { var: None, column },
        }
    }

    fn resolve_local(
        &self,
        scope: ScopeId,
        qualifier: Option<&str>,
        column: &str,
        outer: bool,
    ) -> Option<Resolution> {
        let vars = &self.scopes[scope].vars;
        if let Some(qualifier) = qualifier {
            let var = vars
                .iter()
                .copied()
                .find(|v| self.vars[*v].name == qualifier)?;
            return Some(match &self.var_columns[var] {
                ColumnsState::Known(columns) => match columns.iter().find(|c| c.name == column) {
                    Some(found) => Resolution::Column(self.resolved(var, found, outer)),
                    None => Resolution::UndefinedColumn {
                        var: Some(var),
                        column: column.to_string(),
                    },
                },
                _ => Resolution::UnknownSource(var),
            });
        }

        let mut matches = Vec::new();
        let mut unknown = None;
        for var in vars.iter().copied() {
            match &self.var_columns[var] {
                ColumnsState::Known(columns) => {
                    if let Some(found) = columns.iter().find(|c| c.name == column) {
                        matches.push((var, found));
                    }
                }
                _ => {
                    unknown.get_or_insert(var);
                }
            }
        }
        match matches.as_slice() {
            [(var, found)] => Some(Resolution::Column(self.resolved(*var, found, outer))),
            [] => unknown.map(Resolution::UnknownSource),
            many => Some(Resolution::Ambiguous {
                column: column.to_string(),
                vars: many.iter().map(|(v, _)| *v).collect(),
            }),
        }
    }

    fn resolved(&self, var: VarId, column: &OutputColumn, outer: bool) -> ResolvedColumn {
        ResolvedColumn {
            key: ColumnKey {
                var,
                column: column.name.clone(),
            },
            nullable: column.nullable || self.vars[var].null_supplied,
            type_class: column.type_class,
            outer,
        }
    }

    /// Resolve an expression that is a plain column reference.
    pub fn resolve_expr(&self, scope: ScopeId, expr: &Expr) -> Option<ResolvedColumn> {
        let idents = column_idents(unnest(expr))?;
        match self.resolve(scope, idents) {
            Resolution::Column(resolved) => Some(resolved),
            _ => None,
        }
    }

    /// Scope by id.
    pub fn scope(&self, id: ScopeId) -> &SelectScope<'q> {
        &self.scopes[id]
    }

    /// Tuple variable by id.
    pub fn var(&self, id: VarId) -> &TupleVar<'q> {
        &self.vars[id]
    }

    /// Catalog relation behind a tuple variable.
    pub fn relation_of(&self, var: VarId) -> Option<&'q Relation> {
        match &self.vars[var].source {
            VarSource::Relation { schema, name } => self.catalog.relation(schema.as_deref(), name),
            _ => None,
        }
    }

    /// Columns of a tuple variable, if known.
    pub fn columns_of(&self, var: VarId) -> Option<&[OutputColumn]> {
        match &self.var_columns[var] {
            ColumnsState::Known(columns) => Some(columns),
            _ => None,
        }
    }

    /// Output columns of a scope, if known.
    pub fn outputs(&self, scope: ScopeId) -> Option<&[OutputColumn]> {
        match &self.outputs[scope] {
            ColumnsState::Known(columns) => Some(columns),
            _ => None,
        }
    }

    /// Scopes of a query that occurs somewhere in the analyzed tree.
    pub fn scopes_of_query(&self, query: &Query) -> &[ScopeId] {
        self.query_scopes
            .iter()
            .find(|(q, _)| std::ptr::eq(*q, query))
            .map(|(_, scopes)| scopes.as_slice())
            .unwrap_or(&[])
    }

    /// Direct child scopes of `scope` (subqueries and derived tables).
    pub fn children(&self, scope: ScopeId) -> impl Iterator<Item = &SelectScope<'q>> {
        self.scopes
            .iter()
            .filter(move |s| s.parent == Some(scope))
    }

    /// Column references occurring in `scope`.
    pub fn refs_in(&self, scope: ScopeId) -> impl Iterator<Item = &ColumnRef<'q>> {
        self.column_refs.iter().filter(move |r| r.scope == scope)
    }

    /// True when the scope returns at most one row: an aggregate without GROUP BY.
    pub fn is_single_row(&self, scope: ScopeId) -> bool {
        let s = &self.scopes[scope];
        if !s.group_by().is_empty() || s.select.having.is_some() {
            return false;
        }
        let exprs: Vec<&Expr> = s
            .select
            .projection
            .iter()
            .filter_map(|item| match item {
                SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                    Some(expr)
                }
                _ => None,
            })
            .collect();
        exprs.len() == s.select.projection.len()
            && exprs.iter().any(|e| contains_aggregate(e))
            && exprs.iter().all(|e| contains_aggregate(e) || is_constant(e))
    }

    /// True when a derived-table variable ranges over a single-row block.
    pub fn is_single_row_var(&self, var: VarId) -> bool {
        match &self.vars[var].source {
            VarSource::Relation { .. } => self.relation_of(var).is_some_and(|r| r.single_row),
            VarSource::Derived(scopes) => {
                matches!(scopes.as_slice(), [only] if self.is_single_row(*only))
            }
            VarSource::Cte(index) => {
                matches!(self.ctes[*index].scopes.as_slice(), [only] if self.is_single_row(*only))
            }
            _ => false,
        }
    }
}

fn join_kind(operator: &JoinOperator) -> (JoinKind, Option<&JoinConstraint>) {
    match operator {
        JoinOperator::Inner(constraint) => (JoinKind::Inner, Some(constraint)),
        JoinOperator::LeftOuter(constraint) => (JoinKind::Left, Some(constraint)),
        JoinOperator::RightOuter(constraint) => (JoinKind::Right, Some(constraint)),
        JoinOperator::FullOuter(constraint) => (JoinKind::Full, Some(constraint)),
        JoinOperator::CrossJoin => (JoinKind::Cross, None),
        _ => (JoinKind::Other, None),
    }
}

fn alias_columns(alias: Option<&TableAlias>) -> Vec<String> {
    alias
        .map(|a| a.columns.iter().map(|c| ident_key(&c.name)).collect())
        .unwrap_or_default()
}

fn relation_columns(relation: &Relation, var: VarId) -> Vec<OutputColumn> {
    relation
        .columns
        .iter()
        .map(|column| OutputColumn {
            name: column.name.clone(),
            nullable: column.nullable,
            type_class: column.type_class(),
            origin: Some(ColumnKey {
                var,
                column: column.name.clone(),
            }),
        })
        .collect()
}

fn rename(mut columns: Vec<OutputColumn>, names: &[String]) -> Vec<OutputColumn> {
    for (column, name) in columns.iter_mut().zip(names) {
        column.name = name.clone();
    }
    columns
}

/// Name `PostgreSQL` gives an unaliased output expression.
pub fn output_name(expr: &Expr) -> String {
    match unnest(expr) {
        Expr::Cast { expr, .. } => output_name(expr),
        Expr::Function(func) => normalized_function_name(func),
        other => column_idents(other)
            .and_then(|idents| idents.last())
            .map(ident_key)
            .unwrap_or_else(|| "?column?".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ddl::parse_schema;
    use crate::parser::sql_parser::parse_query;

    const SCHEMA: &str = "
        CREATE TABLE dept (deptno INT PRIMARY KEY, dname TEXT NOT NULL, loc TEXT);
        CREATE TABLE emp (
            empno INT PRIMARY KEY,
            ename TEXT,
            mgr INT REFERENCES emp,
            sal NUMERIC(7,2),
            deptno INT NOT NULL REFERENCES dept
        );";

    fn with_model(sql: &str, check: impl FnOnce(&QueryModel<'_>)) {
        let catalog = parse_schema(SCHEMA).expect("schema");
        let query = parse_query(sql).expect("query");
        let model = QueryModel::build(&query, &catalog);
        check(&model);
    }

    #[test]
    fn build_assigns_scopes_and_roles() {
        with_model(
            "SELECT e.ename FROM emp e WHERE EXISTS (SELECT 1 FROM dept d WHERE d.deptno = e.deptno)
             AND e.sal > (SELECT AVG(sal) FROM emp)",
            |model| {
                let roles: Vec<ScopeRole> = model.scopes.iter().map(|s| s.role).collect();
                assert_eq!(
                    roles,
                    vec![ScopeRole::Root, ScopeRole::Exists, ScopeRole::Scalar]
                );
                assert_eq!(model.scopes[1].parent, Some(0));
                assert!(model.is_single_row(2));
            },
        );
    }

    #[test]
    fn resolve_reports_ambiguity_and_correlation() {
        with_model(
            "SELECT deptno FROM emp e, dept d WHERE EXISTS (SELECT 1 FROM emp x WHERE x.mgr = e.empno)",
            |model| {
                let ambiguous = model
                    .refs_in(0)
                    .find(|r| r.clause == Clause::Select)
                    .expect("projection ref");
                assert!(matches!(ambiguous.resolution, Resolution::Ambiguous { .. }));

                let correlated = model
                    .refs_in(1)
                    .filter_map(|r| r.resolution.column())
                    .find(|c| c.outer)
                    .expect("correlated ref");
                assert_eq!(correlated.key.column, "empno");
                assert_eq!(model.var(correlated.key.var).name, "e");
            },
        );
    }

    #[test]
    fn resolve_flags_undefined_names() {
        with_model("SELECT x.ename, salary FROM emp e", |model| {
            let resolutions: Vec<&Resolution> =
                model.column_refs.iter().map(|r| &r.resolution).collect();
            assert!(matches!(
                resolutions[0],
                Resolution::UndefinedQualifier { qualifier, .. } if qualifier == "x"
            ));
            assert!(matches!(
                resolutions[1],
                Resolution::UndefinedColumn { var: None, column } if column == "salary"
            ));
        });
    }

    #[test]
    fn outer_joins_make_columns_nullable() {
        with_model(
            "SELECT d.dname FROM emp e LEFT JOIN dept d ON e.deptno = d.deptno",
            |model| {
                let dname = model.column_refs[0]
                    .resolution
                    .column()
                    .expect("resolved");
                assert!(dname.nullable);
                assert!(model.var(1).null_supplied);
                assert!(!model.var(0).null_supplied);
            },
        );
    }

    #[test]
    fn derived_tables_and_ctes_expose_outputs() {
        with_model(
            "WITH rich AS (SELECT empno AS id, sal FROM emp WHERE sal > 1000)
             SELECT r.id, t.total FROM rich r, (SELECT SUM(sal) AS total FROM emp) t",
            |model| {
                let names: Vec<String> = model
                    .column_refs
                    .iter()
                    .filter(|r| r.scope == 1)
                    .filter_map(|r| r.resolution.column().map(|c| c.key.column.clone()))
                    .collect();
                assert_eq!(names, vec!["id".to_string(), "total".to_string()]);
                let derived = model.scope(1).vars[1];
                assert!(model.is_single_row_var(derived));
                let id = model.column_refs.iter().find_map(|r| {
                    r.resolution.column().filter(|c| c.key.column == "id").cloned()
                });
                assert!(!id.expect("id resolved").nullable);
            },
        );
    }

    #[test]
    fn order_by_prefers_output_aliases() {
        with_model("SELECT sal AS pay FROM emp ORDER BY pay", |model| {
            let order_ref = model
                .column_refs
                .iter()
                .find(|r| r.clause == Clause::OrderBy)
                .expect("order ref");
            assert_eq!(order_ref.resolution, Resolution::OutputAlias("pay".to_string()));
        });
    }

    #[test]
    fn unknown_relations_do_not_cascade_into_undefined_columns() {
        with_model("SELECT foo FROM missing_table", |model| {
            assert!(matches!(
                model.var(0).source,
                VarSource::Unresolved { ref name, .. } if name == "missing_table"
            ));
            assert!(matches!(
                model.column_refs[0].resolution,
                Resolution::UnknownSource(0)
            ));
        });
    }
}
