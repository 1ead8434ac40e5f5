//! Disjunctive normal form under three-valued logic.
//!
//! `NOT` is pushed down to the atoms with De Morgan's laws and ends up as the
//! polarity of a [`Literal`]; `AND` is distributed over `OR`. Both rewrites
//! are exact under Kleene logic, and so is dropping a repeated literal or a
//! repeated conjunction. Nothing else is simplified here.

use serde::Serialize;
use sqlparser::ast::{Expr, JoinConstraint};
use tracing::warn;

use crate::logic::atom::{Atom, AtomTable, ColumnResolver, Predicate, ScopeResolver};
use crate::logic::truth::Truth;
use crate::parser::lexical::Clause;
use crate::query::{JoinKind, QueryModel, ScopeId, VarId};

/// An atom with a polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Literal {
    /// Index into the atom table.
    pub atom: usize,
    /// False for a negated atom.
    pub positive: bool,
}

impl Literal {
    /// Value of the literal given the value of its atom.
    pub fn eval(self, atom_value: Truth) -> Truth {
        if self.positive {
            atom_value
        } else {
            !atom_value
        }
    }
}

/// Literals combined with AND.
pub type Conjunction = Vec<Literal>;

/// Conjunctions combined with OR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dnf {
    /// The disjuncts, in source order.
    pub conjunctions: Vec<Conjunction>,
}

impl Dnf {
    /// Evaluate under an assignment of truth values to atoms.
    pub fn eval(&self, assignment: &dyn Fn(usize) -> Truth) -> Truth {
        self.conjunctions.iter().fold(Truth::False, |acc, conjunction| {
            let value = conjunction.iter().fold(Truth::True, |acc, literal| {
                acc.and(literal.eval(assignment(literal.atom)))
            });
            acc.or(value)
        })
    }
}

/// Result of normalizing one predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NormalizeOutcome {
    /// The equivalent DNF.
    Normalized(Dnf),
    /// More conjunctions than the budget allows.
    Inconclusive {
        /// The exceeded budget.
        budget: usize,
    },
}

impl NormalizeOutcome {
    /// The DNF, when normalization finished.
    pub fn dnf(&self) -> Option<&Dnf> {
        match self {
            NormalizeOutcome::Normalized(dnf) => Some(dnf),
            NormalizeOutcome::Inconclusive { .. } => None,
        }
    }
}

/// A predicate with its atoms, source tree and normal form.
#[derive(Debug, Clone)]
pub struct NormalizedPredicate<'q> {
    /// Scope the predicate filters.
    pub scope: ScopeId,
    /// Source expressions AND-ed together, with their clauses.
    pub sources: Vec<(Clause, &'q Expr)>,
    /// Interned atoms.
    pub atoms: Vec<Atom<'q>>,
    /// Boolean structure over the atoms.
    pub tree: Predicate,
    /// Normal form.
    pub outcome: NormalizeOutcome,
}

impl<'q> NormalizedPredicate<'q> {
    /// Normalize the conjunction of `sources`.
    pub fn build(
        scope: ScopeId,
        sources: Vec<(Clause, &'q Expr)>,
        resolver: &dyn ColumnResolver,
        budget: usize,
    ) -> Self {
        let mut table = AtomTable::new(resolver);
        let mut parts: Vec<Predicate> = sources
            .iter()
            .map(|(clause, expr)| table.predicate(*expr, *clause))
            .collect();
        let tree = if parts.len() == 1 {
            parts.remove(0)
        } else {
            Predicate::And(parts)
        };
        let outcome = to_dnf(&tree, budget);
        if let NormalizeOutcome::Inconclusive { budget } = outcome {
            warn!(scope, budget, "conjunction budget exceeded; predicate left unnormalized");
        }
        Self {
            scope,
            sources,
            atoms: table.into_atoms(),
            tree,
            outcome,
        }
    }

    /// Clause of the first source, used to anchor whole-predicate findings.
    pub fn clause(&self) -> Clause {
        self.sources
            .first()
            .map(|(clause, _)| *clause)
            .unwrap_or(Clause::Where)
    }
}

/// The predicates of one SELECT block.
#[derive(Debug, Clone)]
pub struct ScopePredicates<'q> {
    /// The scope.
    pub scope: ScopeId,
    /// WHERE together with the ON conditions of inner joins.
    pub filter: Option<NormalizedPredicate<'q>>,
    /// HAVING.
    pub having: Option<NormalizedPredicate<'q>>,
    /// ON condition of each outer join, keyed by the joined variable.
    pub outer_joins: Vec<(VarId, NormalizedPredicate<'q>)>,
}

impl<'q> ScopePredicates<'q> {
    /// Every normalized predicate of the scope.
    pub fn all(&self) -> impl Iterator<Item = &NormalizedPredicate<'q>> {
        self.filter
            .iter()
            .chain(self.having.iter())
            .chain(self.outer_joins.iter().map(|(_, predicate)| predicate))
    }
}

/// Normalize the predicates of every scope of `model`.
pub fn normalize_model<'q>(model: &QueryModel<'q>, budget: usize) -> Vec<ScopePredicates<'q>> {
    model
        .scopes
        .iter()
        .map(|scope| {
            let resolver = ScopeResolver {
                model,
                scope: scope.id,
            };
            let mut filter_sources: Vec<(Clause, &'q Expr)> = Vec::new();
            let mut outer_joins = Vec::new();
            for var in &scope.vars {
                let var = model.var(*var);
                let Some(JoinConstraint::On(on)) = var.constraint else {
                    continue;
                };
                if var.join.is_outer() {
                    outer_joins.push((
                        var.id,
                        NormalizedPredicate::build(
                            scope.id,
                            vec![(Clause::From, on)],
                            &resolver,
                            budget,
                        ),
                    ));
                } else if matches!(var.join, JoinKind::Inner | JoinKind::Base) {
                    filter_sources.push((Clause::From, on));
                }
            }
            if let Some(selection) = &scope.select.selection {
                filter_sources.push((Clause::Where, selection));
            }
            let filter = (!filter_sources.is_empty())
                .then(|| NormalizedPredicate::build(scope.id, filter_sources, &resolver, budget));
            let having = scope.select.having.as_ref().map(|having| {
                NormalizedPredicate::build(scope.id, vec![(Clause::Having, having)], &resolver, budget)
            });
            ScopePredicates {
                scope: scope.id,
                filter,
                having,
                outer_joins,
            }
        })
        .collect()
}

/// Convert a predicate tree into DNF, giving up past `budget` conjunctions.
pub fn to_dnf(tree: &Predicate, budget: usize) -> NormalizeOutcome {
    match dnf_of(tree, true, budget) {
        Some(conjunctions) => NormalizeOutcome::Normalized(Dnf { conjunctions }),
        None => NormalizeOutcome::Inconclusive { budget },
    }
}

fn dnf_of(tree: &Predicate, positive: bool, budget: usize) -> Option<Vec<Conjunction>> {
    match tree {
        Predicate::Atom(atom) => Some(vec![vec![Literal {
            atom: *atom,
            positive,
        }]]),
        Predicate::Not(inner) => dnf_of(inner, !positive, budget),
        Predicate::And(items) | Predicate::Or(items) => {
            let conjunctive = matches!(tree, Predicate::And(_)) == positive;
            let mut result: Vec<Conjunction> = if conjunctive {
                vec![Vec::new()]
            } else {
                Vec::new()
            };
            for item in items {
                let part = dnf_of(item, positive, budget)?;
                if conjunctive {
                    let mut product = Vec::with_capacity(result.len() * part.len());
                    for left in &result {
                        for right in &part {
                            product.push(merge(left, right));
                            if product.len() > budget {
                                return None;
                            }
                        }
                    }
                    result = product;
                } else {
                    result.extend(part);
                    if result.len() > budget {
                        return None;
                    }
                }
            }
            Some(result)
        }
    }
}

// Repeated literals and conjunctions are kept so the oracle can report them.
fn merge(left: &[Literal], right: &[Literal]) -> Conjunction {
    left.iter().chain(right).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(index: usize) -> Predicate {
        Predicate::Atom(index)
    }

    fn not(inner: Predicate) -> Predicate {
        Predicate::Not(Box::new(inner))
    }

    fn assignments() -> Vec<[Truth; 3]> {
        let mut all = Vec::new();
        for a in Truth::ALL {
            for b in Truth::ALL {
                for c in Truth::ALL {
                    all.push([a, b, c]);
                }
            }
        }
        all
    }

    fn assert_equivalent(tree: &Predicate) {
        let NormalizeOutcome::Normalized(dnf) = to_dnf(tree, 64) else {
            panic!("budget should suffice");
        };
        for values in assignments() {
            let assignment = |i: usize| values[i];
            assert_eq!(
                tree.eval(&assignment),
                dnf.eval(&assignment),
                "{tree:?} under {values:?}"
            );
        }
    }

    #[test]
    fn de_morgan_and_distribution_are_exact() {
        let trees = [
            not(Predicate::And(vec![atom(0), Predicate::Or(vec![atom(1), not(atom(2))])])),
            Predicate::And(vec![
                Predicate::Or(vec![atom(0), atom(1)]),
                Predicate::Or(vec![atom(1), atom(2)]),
            ]),
            not(not(Predicate::Or(vec![atom(0), Predicate::And(vec![atom(1), atom(2)])]))),
            Predicate::And(vec![atom(0), not(atom(0))]),
        ];
        for tree in &trees {
            assert_equivalent(tree);
        }
    }

    #[test]
    fn negation_lands_on_literals() {
        let tree = not(Predicate::Or(vec![atom(0), atom(1)]));
        let NormalizeOutcome::Normalized(dnf) = to_dnf(&tree, 8) else {
            panic!("budget should suffice");
        };
        assert_eq!(
            dnf.conjunctions,
            vec![vec![
                Literal {
                    atom: 0,
                    positive: false
                },
                Literal {
                    atom: 1,
                    positive: false
                }
            ]]
        );
    }

    #[test]
    fn contradictory_literals_are_kept() {
        let tree = Predicate::And(vec![atom(0), not(atom(0))]);
        let dnf = to_dnf(&tree, 8);
        assert_eq!(dnf.dnf().map(|d| d.conjunctions[0].len()), Some(2));
    }

    #[test]
    fn repeated_literals_and_disjuncts_are_kept() {
        let literal = Literal {
            atom: 0,
            positive: true,
        };
        let tree = Predicate::Or(vec![atom(0), atom(0)]);
        assert_eq!(
            to_dnf(&tree, 8).dnf().map(|d| d.conjunctions.clone()),
            Some(vec![vec![literal], vec![literal]])
        );
        let tree = Predicate::And(vec![atom(0), atom(0)]);
        assert_eq!(
            to_dnf(&tree, 8).dnf().map(|d| d.conjunctions.clone()),
            Some(vec![vec![literal, literal]])
        );
    }

    #[test]
    fn budget_overrun_is_inconclusive() {
        let clause = |a, b| Predicate::Or(vec![atom(a), atom(b)]);
        let tree = Predicate::And(vec![clause(0, 1), clause(2, 3), clause(4, 5), clause(6, 7)]);
        assert_eq!(
            to_dnf(&tree, 16).dnf().map(|d| d.conjunctions.len()),
            Some(16)
        );
        assert_eq!(
            to_dnf(&tree, 15),
            NormalizeOutcome::Inconclusive { budget: 15 }
        );
    }
}
