/// SELECT blocks, tuple variables and column resolution.
pub mod scope;

pub use scope::{
    ColumnKey, ColumnRef, CteDef, JoinKind, OutputColumn, QueryModel, Resolution, ResolvedColumn,
    ScopeId, ScopeRole, SelectScope, SetOperation, TupleVar, VarId, VarSource,
};
