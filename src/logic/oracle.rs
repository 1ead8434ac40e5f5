//! Consistency oracle over normalized predicates.
//!
//! Verdicts use filter semantics: a predicate is `AlwaysFalse` when no row can
//! make it TRUE, and `AlwaysTrue` when every row does. A verdict other than
//! `Variable` is only given when declared nullability or literal values prove
//! it; everything else stays `Variable`.

use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;

use crate::catalog::TypeClass;
use crate::logic::atom::{Atom, AtomKind, CompareOp, Operand, Scalar};
use crate::logic::normalizer::{Conjunction, Literal, NormalizedPredicate};
use crate::logic::truth::Truth;
use crate::query::ColumnKey;

/// Truth status of a formula, a conjunction or a literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// TRUE for every row.
    AlwaysTrue,
    /// Never TRUE, and not always UNKNOWN.
    AlwaysFalse,
    /// UNKNOWN for every row.
    AlwaysUnknown,
    /// Depends on the row.
    Variable,
}

/// Why a literal makes its conjunction unsatisfiable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Conflict {
    /// The literal can never be TRUE on its own.
    Alone,
    /// The literal is always UNKNOWN.
    Unknown,
    /// Two equalities pin the column to different values.
    Equalities,
    /// The bounds on the column leave no value.
    EmptyRange,
    /// The column must be NULL and have a value.
    NullAndValue,
}

/// One of the six simplifications the oracle reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Simplification {
    /// No row satisfies the predicate.
    FormulaFalse,
    /// Every row satisfies the predicate.
    FormulaTrue,
    /// A disjunct can be dropped.
    DisjunctFalse {
        /// The disjunct.
        conjunction: usize,
        /// Disjunct that already covers it, if it is subsumed rather than contradictory.
        subsumed_by: Option<usize>,
    },
    /// A disjunct is always TRUE, so the whole predicate is.
    DisjunctTrue {
        /// The disjunct.
        conjunction: usize,
    },
    /// A literal makes its conjunction unsatisfiable.
    AtomFalse {
        /// The conjunction.
        conjunction: usize,
        /// Position of the literal in the conjunction.
        literal: usize,
        /// Earlier literals it conflicts with.
        with: Vec<usize>,
        /// Kind of conflict.
        conflict: Conflict,
    },
    /// A literal is implied by the rest of its conjunction, or always TRUE.
    AtomTrue {
        /// The conjunction.
        conjunction: usize,
        /// Position of the literal in the conjunction.
        literal: usize,
        /// Literals implying it; empty when it is always TRUE by itself.
        implied_by: Vec<usize>,
    },
}

/// Verdicts for one conjunction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConjunctionReport {
    /// The conjunction as a whole.
    pub verdict: Verdict,
    /// Each literal within the conjunction.
    pub literals: Vec<Verdict>,
}

/// Everything the oracle decided about one predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OracleReport {
    /// The whole formula.
    pub formula: Verdict,
    /// Each disjunct.
    pub conjunctions: Vec<ConjunctionReport>,
    /// Simplifications found.
    pub simplifications: Vec<Simplification>,
}

/// What a literal requires of one column for the literal to be TRUE.
#[derive(Debug, Clone, PartialEq)]
enum Constraint {
    Null,
    NotNull,
    Compare(CompareOp, Scalar),
    In(Vec<Scalar>),
    NotIn(Vec<Scalar>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bound {
    value: f64,
    inclusive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Domain {
    Number,
    Date,
    Text,
    Bool,
}

fn domain_of(scalar: &Scalar) -> Domain {
    match scalar {
        Scalar::Number(_) => Domain::Number,
        Scalar::Date(_) => Domain::Date,
        Scalar::Text(_) => Domain::Text,
        Scalar::Bool(_) => Domain::Bool,
    }
}

/// Accumulated constraints on one column within a conjunction.
#[derive(Debug, Clone, Default)]
struct Region {
    nullable: bool,
    discrete: bool,
    must_be_null: bool,
    not_null: bool,
    valued: bool,
    mixed: bool,
    domain: Option<Domain>,
    lower: Option<Bound>,
    upper: Option<Bound>,
    allowed: Option<Vec<Scalar>>,
    excluded: Vec<Scalar>,
    equalities: usize,
}

const ENUMERATION_LIMIT: f64 = 64.0;

impl Region {
    fn new(nullable: bool, discrete: bool) -> Self {
        Self {
            nullable,
            discrete,
            ..Self::default()
        }
    }

    fn note_domain(&mut self, scalar: &Scalar) {
        let domain = domain_of(scalar);
        match self.domain {
            None => self.domain = Some(domain),
            Some(existing) if existing != domain => self.mixed = true,
            Some(_) => {}
        }
    }

    fn add(&mut self, constraint: &Constraint) {
        match constraint {
            Constraint::Null => self.must_be_null = true,
            Constraint::NotNull => self.not_null = true,
            Constraint::Compare(op, value) => {
                self.not_null = true;
                self.valued = true;
                self.note_domain(value);
                match (op, value.position()) {
                    (CompareOp::Eq, Some(p)) => {
                        self.equalities += 1;
                        self.raise_lower(Bound {
                            value: p,
                            inclusive: true,
                        });
                        self.lower_upper(Bound {
                            value: p,
                            inclusive: true,
                        });
                    }
                    (CompareOp::Eq, None) => {
                        self.equalities += 1;
                        self.restrict(std::slice::from_ref(value));
                    }
                    (CompareOp::NotEq, _) => self.excluded.push(value.clone()),
                    (CompareOp::Gt | CompareOp::GtEq, Some(p)) => self.raise_lower(Bound {
                        value: p,
                        inclusive: *op == CompareOp::GtEq,
                    }),
                    (CompareOp::Lt | CompareOp::LtEq, Some(p)) => self.lower_upper(Bound {
                        value: p,
                        inclusive: *op == CompareOp::LtEq,
                    }),
                    _ => {}
                }
            }
            Constraint::In(values) => {
                self.not_null = true;
                self.valued = true;
                for value in values {
                    self.note_domain(value);
                }
                if values.len() == 1 {
                    self.equalities += 1;
                }
                self.restrict(values);
            }
            Constraint::NotIn(values) => {
                self.not_null = true;
                self.valued = true;
                for value in values {
                    self.note_domain(value);
                }
                self.excluded.extend(values.iter().cloned());
            }
        }
    }

    fn restrict(&mut self, values: &[Scalar]) {
        let next: Vec<Scalar> = match &self.allowed {
            Some(current) => current
                .iter()
                .filter(|v| values.iter().any(|w| same(v, w)))
                .cloned()
                .collect(),
            None => values.to_vec(),
        };
        self.allowed = Some(next);
    }

    fn raise_lower(&mut self, bound: Bound) {
        let tighter = match self.lower {
            None => true,
            Some(current) => {
                bound.value > current.value
                    || (bound.value == current.value && !bound.inclusive && current.inclusive)
            }
        };
        if tighter {
            self.lower = Some(bound);
        }
    }

    fn lower_upper(&mut self, bound: Bound) {
        let tighter = match self.upper {
            None => true,
            Some(current) => {
                bound.value < current.value
                    || (bound.value == current.value && !bound.inclusive && current.inclusive)
            }
        };
        if tighter {
            self.upper = Some(bound);
        }
    }

    /// Bounds with integer discreteness applied.
    fn bounds(&self) -> (Option<Bound>, Option<Bound>) {
        if !self.discrete {
            return (self.lower, self.upper);
        }
        let lower = self.lower.map(|b| Bound {
            value: if b.inclusive {
                b.value.ceil()
            } else {
                b.value.floor() + 1.0
            },
            inclusive: true,
        });
        let upper = self.upper.map(|b| Bound {
            value: if b.inclusive {
                b.value.floor()
            } else {
                b.value.ceil() - 1.0
            },
            inclusive: true,
        });
        (lower, upper)
    }

    fn in_bounds(&self, value: &Scalar) -> bool {
        let Some(p) = value.position() else {
            return true;
        };
        let (lower, upper) = self.bounds();
        let above = lower.map_or(true, |b| p > b.value || (b.inclusive && p == b.value));
        let below = upper.map_or(true, |b| p < b.value || (b.inclusive && p == b.value));
        above && below
    }

    fn is_excluded(&self, value: &Scalar) -> bool {
        self.excluded.iter().any(|e| same(e, value))
    }

    fn admits(&self, value: &Scalar) -> bool {
        self.in_bounds(value)
            && !self.is_excluded(value)
            && self
                .allowed
                .as_ref()
                .map_or(true, |allowed| allowed.iter().any(|a| same(a, value)))
    }

    fn conflict(&self) -> Option<Conflict> {
        if self.must_be_null {
            if self.not_null || self.valued || !self.nullable {
                return Some(Conflict::NullAndValue);
            }
            return None;
        }
        if self.mixed {
            return None;
        }
        let empty_kind = if self.equalities >= 2 {
            Conflict::Equalities
        } else {
            Conflict::EmptyRange
        };
        let (lower, upper) = self.bounds();
        if let (Some(lo), Some(hi)) = (lower, upper) {
            if lo.value > hi.value || (lo.value == hi.value && !(lo.inclusive && hi.inclusive)) {
                return Some(empty_kind);
            }
        }
        if let Some(allowed) = &self.allowed {
            if !allowed.iter().any(|value| self.admits(value)) {
                return Some(empty_kind);
            }
            return None;
        }
        if let (Some(lo), Some(hi), Some(domain)) = (lower, upper, self.domain) {
            let finite = lo.value == hi.value || (self.discrete && hi.value - lo.value < ENUMERATION_LIMIT);
            if finite {
                let mut p = lo.value;
                let mut any = false;
                while p <= hi.value {
                    let scalar = match domain {
                        Domain::Date => Scalar::Date(p),
                        _ => Scalar::Number(p),
                    };
                    if !self.is_excluded(&scalar) {
                        any = true;
                        break;
                    }
                    p += 1.0;
                }
                if !any {
                    return Some(empty_kind);
                }
            }
        }
        if self.domain == Some(Domain::Bool)
            && [true, false]
                .iter()
                .all(|b| self.is_excluded(&Scalar::Bool(*b)))
        {
            return Some(empty_kind);
        }
        None
    }

    /// Whether every value admitted here satisfies `target`.
    fn implies(&self, target: &Constraint) -> bool {
        match target {
            Constraint::Null => self.must_be_null,
            Constraint::NotNull => self.not_null,
            _ if !self.valued || self.mixed || self.must_be_null => false,
            Constraint::Compare(op, value) => {
                if self.domain != Some(domain_of(value)) {
                    return false;
                }
                if let Some(allowed) = &self.allowed {
                    let admitted: Vec<&Scalar> =
                        allowed.iter().filter(|a| self.admits(a)).collect();
                    return !admitted.is_empty()
                        && admitted.iter().all(|a| {
                            a.compare(value)
                                .is_some_and(|ordering| op.holds(ordering))
                        });
                }
                let Some(p) = value.position() else {
                    return *op == CompareOp::NotEq && self.is_excluded(value);
                };
                let (lower, upper) = self.bounds();
                match op {
                    CompareOp::Gt => lower.is_some_and(|b| b.value > p || (b.value == p && !b.inclusive)),
                    CompareOp::GtEq => lower.is_some_and(|b| b.value >= p),
                    CompareOp::Lt => upper.is_some_and(|b| b.value < p || (b.value == p && !b.inclusive)),
                    CompareOp::LtEq => upper.is_some_and(|b| b.value <= p),
                    CompareOp::Eq => matches!(
                        (lower, upper),
                        (Some(lo), Some(hi)) if lo.value == p && hi.value == p && lo.inclusive && hi.inclusive
                    ),
                    CompareOp::NotEq => !self.in_bounds(value) || self.is_excluded(value),
                }
            }
            Constraint::In(values) => match &self.allowed {
                Some(allowed) => {
                    let admitted: Vec<&Scalar> =
                        allowed.iter().filter(|a| self.admits(a)).collect();
                    !admitted.is_empty()
                        && admitted
                            .iter()
                            .all(|a| values.iter().any(|v| same(a, v)))
                }
                None => match self.bounds() {
                    (Some(lo), Some(hi)) if lo.value == hi.value && lo.inclusive && hi.inclusive => {
                        values.iter().any(|v| v.position() == Some(lo.value))
                    }
                    _ => false,
                },
            },
            Constraint::NotIn(values) => values.iter().all(|v| !self.admits(v)),
        }
    }
}

fn same(a: &Scalar, b: &Scalar) -> bool {
    a.compare(b) == Some(Ordering::Equal)
}

/// What a literal requires of one column.
#[derive(Debug, Clone)]
struct Requirement {
    column: ColumnKey,
    constraint: Constraint,
    nullable: bool,
    discrete: bool,
    /// The constraint is the whole condition of the literal rather than a
    /// consequence of it. Only exact requirements can be implied.
    exact: bool,
}

/// Per-column requirements of a literal, for literals that pin columns.
fn requirements_of(atom: &Atom<'_>, positive: bool) -> Vec<Requirement> {
    let entry = |operand: &Operand, constraint: Constraint, exact: bool| {
        operand.column().map(|c| Requirement {
            column: c.key.clone(),
            constraint,
            nullable: c.nullable,
            discrete: c.type_class == TypeClass::Integer,
            exact,
        })
    };
    match &atom.kind {
        AtomKind::Compare { left, op, right } => {
            let op = if positive { *op } else { op.negate() };
            match (left, right) {
                (Operand::Column(_), Operand::Literal(value)) => {
                    // Strings and booleans only take part in equality reasoning.
                    match value {
                        Scalar::Text(_) | Scalar::Bool(_) if op.is_ordering() => {
                            entry(left, Constraint::NotNull, false).into_iter().collect()
                        }
                        _ => entry(left, Constraint::Compare(op, value.clone()), true)
                            .into_iter()
                            .collect(),
                    }
                }
                (Operand::Null, _) | (_, Operand::Null) => Vec::new(),
                _ => entry(left, Constraint::NotNull, false)
                    .into_iter()
                    .chain(entry(right, Constraint::NotNull, false))
                    .collect(),
            }
        }
        AtomKind::IsNull(operand) => {
            let constraint = if positive {
                Constraint::Null
            } else {
                Constraint::NotNull
            };
            entry(operand, constraint, true).into_iter().collect()
        }
        AtomKind::InList { operand, values } => {
            let has_null = values.iter().any(|v| matches!(v, Operand::Null));
            let literals: Option<Vec<Scalar>> = values
                .iter()
                .filter(|v| !matches!(v, Operand::Null))
                .map(|v| match v {
                    Operand::Literal(scalar) => Some(scalar.clone()),
                    _ => None,
                })
                .collect();
            let (constraint, exact) = match (literals, positive) {
                (Some(values), true) => (Constraint::In(values), true),
                // NOT IN over a list holding NULL is never TRUE.
                (Some(values), false) => (Constraint::NotIn(values), !has_null),
                (None, _) => (Constraint::NotNull, false),
            };
            entry(operand, constraint, exact).into_iter().collect()
        }
        AtomKind::Like { operand, .. } => entry(operand, Constraint::NotNull, false)
            .into_iter()
            .collect(),
        AtomKind::InSubquery { operand, .. } if positive => {
            entry(operand, Constraint::NotNull, false).into_iter().collect()
        }
        AtomKind::Quantified {
            operand, all: false, ..
        } if positive => entry(operand, Constraint::NotNull, false).into_iter().collect(),
        _ => Vec::new(),
    }
}

/// Exact requirements of a literal, or `None` when the literal asks for more
/// than its requirements express.
fn exact_requirements(atom: &Atom<'_>, positive: bool) -> Option<Vec<Requirement>> {
    let requirements = requirements_of(atom, positive);
    (!requirements.is_empty() && requirements.iter().all(|r| r.exact)).then_some(requirements)
}

/// Verdict of a literal on its own.
pub fn literal_verdict(atom: &Atom<'_>, positive: bool) -> Verdict {
    let as_verdict = |truth: Truth| match truth {
        Truth::True => Verdict::AlwaysTrue,
        Truth::False => Verdict::AlwaysFalse,
        Truth::Unknown => Verdict::AlwaysUnknown,
    };
    let literal = Literal { atom: 0, positive };
    match &atom.kind {
        AtomKind::Constant(truth) => as_verdict(literal.eval(*truth)),
        AtomKind::Compare { left, op, right } => {
            let op = if positive { *op } else { op.negate() };
            match (left, right) {
                (Operand::Null, _) | (_, Operand::Null) => Verdict::AlwaysUnknown,
                (Operand::Literal(a), Operand::Literal(b)) => match a.compare(b) {
                    Some(ordering) => as_verdict(Truth::from(op.holds(ordering))),
                    None => Verdict::Variable,
                },
                (Operand::Column(a), Operand::Column(b)) if a.key == b.key => {
                    if op.holds(Ordering::Equal) {
                        if a.nullable {
                            Verdict::Variable
                        } else {
                            Verdict::AlwaysTrue
                        }
                    } else {
                        Verdict::AlwaysFalse
                    }
                }
                _ => Verdict::Variable,
            }
        }
        AtomKind::IsNull(operand) => {
            let is_null = match operand {
                Operand::Null => Some(true),
                Operand::Literal(_) => Some(false),
                Operand::Column(column) if !column.nullable => Some(false),
                _ => None,
            };
            match is_null {
                Some(value) => as_verdict(literal.eval(Truth::from(value))),
                None => Verdict::Variable,
            }
        }
        AtomKind::InList { operand, values } => {
            if matches!(operand, Operand::Null) {
                return Verdict::AlwaysUnknown;
            }
            let has_null = values.iter().any(|v| matches!(v, Operand::Null));
            if !positive && has_null {
                // NOT IN over a list holding NULL is FALSE or UNKNOWN.
                Verdict::AlwaysFalse
            } else if values.iter().all(|v| matches!(v, Operand::Null)) {
                Verdict::AlwaysUnknown
            } else {
                Verdict::Variable
            }
        }
        _ => Verdict::Variable,
    }
}

/// Decide verdicts and simplifications for a normalized predicate.
///
/// Returns `None` when normalization was inconclusive.
pub fn analyze(predicate: &NormalizedPredicate<'_>) -> Option<OracleReport> {
    let dnf = predicate.outcome.dnf()?;
    let atoms = &predicate.atoms;
    let mut simplifications = Vec::new();
    let mut reports = Vec::with_capacity(dnf.conjunctions.len());
    for (index, conjunction) in dnf.conjunctions.iter().enumerate() {
        reports.push(analyze_conjunction(
            atoms,
            index,
            conjunction,
            &mut simplifications,
        ));
    }

    let many = dnf.conjunctions.len() > 1;
    let formula = if let Some(index) = reports
        .iter()
        .position(|r| r.verdict == Verdict::AlwaysTrue)
    {
        if many {
            simplifications.push(Simplification::DisjunctTrue { conjunction: index });
        }
        simplifications.push(Simplification::FormulaTrue);
        Verdict::AlwaysTrue
    } else if reports.iter().all(|r| r.verdict == Verdict::AlwaysUnknown) {
        Verdict::AlwaysUnknown
    } else if reports
        .iter()
        .all(|r| matches!(r.verdict, Verdict::AlwaysFalse | Verdict::AlwaysUnknown))
    {
        simplifications.push(Simplification::FormulaFalse);
        Verdict::AlwaysFalse
    } else if covers_every_row(atoms, &dnf.conjunctions) {
        simplifications.push(Simplification::FormulaTrue);
        Verdict::AlwaysTrue
    } else {
        if many {
            for (index, report) in reports.iter().enumerate() {
                if matches!(report.verdict, Verdict::AlwaysFalse | Verdict::AlwaysUnknown) {
                    simplifications.push(Simplification::DisjunctFalse {
                        conjunction: index,
                        subsumed_by: None,
                    });
                }
            }
            subsumed_disjuncts(atoms, &dnf.conjunctions, &reports, &mut simplifications);
        }
        Verdict::Variable
    };

    Some(OracleReport {
        formula,
        conjunctions: reports,
        simplifications,
    })
}

fn analyze_conjunction(
    atoms: &[Atom<'_>],
    index: usize,
    conjunction: &Conjunction,
    simplifications: &mut Vec<Simplification>,
) -> ConjunctionReport {
    let mut literals: Vec<Verdict> = conjunction
        .iter()
        .map(|l| literal_verdict(&atoms[l.atom], l.positive))
        .collect();

    let mut conflict_at = literals
        .iter()
        .position(|v| *v == Verdict::AlwaysFalse)
        .map(|position| (position, Vec::new(), Conflict::Alone));
    if conflict_at.is_none() {
        conflict_at = literals
            .iter()
            .position(|v| *v == Verdict::AlwaysUnknown)
            .map(|position| (position, Vec::new(), Conflict::Unknown));
    }
    if conflict_at.is_none() {
        conflict_at = first_region_conflict(atoms, conjunction);
    }

    if let Some((position, with, conflict)) = conflict_at {
        let verdict = if conflict == Conflict::Unknown
            && literals
                .iter()
                .all(|v| matches!(v, Verdict::AlwaysUnknown | Verdict::AlwaysTrue))
        {
            Verdict::AlwaysUnknown
        } else {
            Verdict::AlwaysFalse
        };
        if conflict != Conflict::Unknown {
            literals[position] = Verdict::AlwaysFalse;
        }
        simplifications.push(Simplification::AtomFalse {
            conjunction: index,
            literal: position,
            with,
            conflict,
        });
        return ConjunctionReport { verdict, literals };
    }

    if literals.iter().all(|v| *v == Verdict::AlwaysTrue) {
        return ConjunctionReport {
            verdict: Verdict::AlwaysTrue,
            literals,
        };
    }

    let mut removed: Vec<usize> = Vec::new();
    for position in 0..conjunction.len() {
        if literals[position] == Verdict::AlwaysTrue {
            continue;
        }
        let repeated = (0..position)
            .find(|earlier| !removed.contains(earlier) && conjunction[*earlier] == conjunction[position]);
        if let Some(earlier) = repeated {
            literals[position] = Verdict::AlwaysTrue;
            removed.push(position);
            simplifications.push(Simplification::AtomTrue {
                conjunction: index,
                literal: position,
                implied_by: vec![earlier],
            });
        }
    }
    for position in 0..conjunction.len() {
        if removed.contains(&position) {
            continue;
        }
        if literals[position] == Verdict::AlwaysTrue {
            removed.push(position);
            simplifications.push(Simplification::AtomTrue {
                conjunction: index,
                literal: position,
                implied_by: Vec::new(),
            });
            continue;
        }
        let literal = conjunction[position];
        let Some(targets) = exact_requirements(&atoms[literal.atom], literal.positive) else {
            continue;
        };
        let mut implied_by = Vec::new();
        let implied = targets.iter().all(|target| {
            let mut region = Region::new(target.nullable, target.discrete);
            for (other, other_literal) in conjunction.iter().enumerate() {
                if other == position || removed.contains(&other) {
                    continue;
                }
                for requirement in requirements_of(&atoms[other_literal.atom], other_literal.positive) {
                    if requirement.column == target.column {
                        region.add(&requirement.constraint);
                        if !implied_by.contains(&other) {
                            implied_by.push(other);
                        }
                    }
                }
            }
            region.implies(&target.constraint)
        });
        if implied {
            implied_by.sort_unstable();
            literals[position] = Verdict::AlwaysTrue;
            removed.push(position);
            simplifications.push(Simplification::AtomTrue {
                conjunction: index,
                literal: position,
                implied_by,
            });
        }
    }
    ConjunctionReport {
        verdict: Verdict::Variable,
        literals,
    }
}

fn first_region_conflict(
    atoms: &[Atom<'_>],
    conjunction: &Conjunction,
) -> Option<(usize, Vec<usize>, Conflict)> {
    let mut regions: BTreeMap<ColumnKey, (Region, Vec<usize>)> = BTreeMap::new();
    for (position, literal) in conjunction.iter().enumerate() {
        for requirement in requirements_of(&atoms[literal.atom], literal.positive) {
            let (region, sources) = regions.entry(requirement.column).or_insert_with(|| {
                (
                    Region::new(requirement.nullable, requirement.discrete),
                    Vec::new(),
                )
            });
            region.add(&requirement.constraint);
            if let Some(conflict) = region.conflict() {
                return Some((position, sources.clone(), conflict));
            }
            sources.push(position);
        }
    }
    None
}

/// Disjunct `i` is subsumed by `j` when `i` implies every literal of `j`.
fn subsumed_disjuncts(
    atoms: &[Atom<'_>],
    conjunctions: &[Conjunction],
    reports: &[ConjunctionReport],
    simplifications: &mut Vec<Simplification>,
) {
    let mut dropped: Vec<usize> = reports
        .iter()
        .enumerate()
        .filter(|(_, r)| r.verdict != Verdict::Variable)
        .map(|(i, _)| i)
        .collect();
    for i in 0..conjunctions.len() {
        if dropped.contains(&i) {
            continue;
        }
        // Of two equivalent disjuncts the later one is dropped.
        let covering = (0..conjunctions.len()).find(|j| {
            *j != i
                && !dropped.contains(j)
                && conjunction_implies(atoms, &conjunctions[i], &conjunctions[*j])
                && !(*j > i && conjunction_implies(atoms, &conjunctions[*j], &conjunctions[i]))
        });
        if let Some(j) = covering {
            dropped.push(i);
            simplifications.push(Simplification::DisjunctFalse {
                conjunction: i,
                subsumed_by: Some(j),
            });
        }
    }
}

fn conjunction_implies(atoms: &[Atom<'_>], premise: &Conjunction, conclusion: &Conjunction) -> bool {
    conclusion.iter().all(|target| {
        if premise.contains(target) {
            return true;
        }
        let Some(requirements) = exact_requirements(&atoms[target.atom], target.positive) else {
            return false;
        };
        requirements.iter().all(|requirement| {
            let mut region = Region::new(requirement.nullable, requirement.discrete);
            for literal in premise {
                for other in requirements_of(&atoms[literal.atom], literal.positive) {
                    if other.column == requirement.column {
                        region.add(&other.constraint);
                    }
                }
            }
            region.conflict().is_none() && region.implies(&requirement.constraint)
        })
    })
}

/// True when every disjunct is a single literal on the same column and their
/// union admits every value, NULL included.
fn covers_every_row(atoms: &[Atom<'_>], conjunctions: &[Conjunction]) -> bool {
    let mut column: Option<ColumnKey> = None;
    let mut nullable = true;
    let mut discrete = false;
    let mut covers_null = false;
    let mut covers_values = false;
    let mut intervals: Vec<(Option<Bound>, Option<Bound>)> = Vec::new();
    let mut booleans = [false, false];
    for conjunction in conjunctions {
        let [literal] = conjunction.as_slice() else {
            return false;
        };
        let Some(requirements) = exact_requirements(&atoms[literal.atom], literal.positive) else {
            return false;
        };
        let [requirement] = requirements.as_slice() else {
            return false;
        };
        match &column {
            None => column = Some(requirement.column.clone()),
            Some(existing) if *existing != requirement.column => return false,
            Some(_) => {}
        }
        nullable = requirement.nullable;
        discrete = requirement.discrete;
        match &requirement.constraint {
            Constraint::Null => covers_null = true,
            Constraint::NotNull => {
                if literal_is_null_test(&atoms[literal.atom]) {
                    covers_values = true;
                }
            }
            Constraint::Compare(op, value) => match (value, value.position()) {
                (Scalar::Bool(b), _) if *op == CompareOp::Eq => booleans[usize::from(*b)] = true,
                (_, Some(p)) => intervals.extend(intervals_of(*op, p)),
                _ => {}
            },
            Constraint::In(values) => {
                for value in values {
                    match value {
                        Scalar::Bool(b) => booleans[usize::from(*b)] = true,
                        other => {
                            if let Some(p) = other.position() {
                                intervals.push(point(p));
                            }
                        }
                    }
                }
            }
            Constraint::NotIn(_) => {}
        }
    }
    if booleans.iter().all(|b| *b) {
        covers_values = true;
    }
    if !intervals.is_empty() && intervals_cover_line(intervals, discrete) {
        covers_values = true;
    }
    covers_values && (covers_null || !nullable)
}

fn literal_is_null_test(atom: &Atom<'_>) -> bool {
    matches!(atom.kind, AtomKind::IsNull(_))
}

fn point(p: f64) -> (Option<Bound>, Option<Bound>) {
    let bound = Some(Bound {
        value: p,
        inclusive: true,
    });
    (bound, bound)
}

fn intervals_of(op: CompareOp, p: f64) -> Vec<(Option<Bound>, Option<Bound>)> {
    let at = |inclusive| Some(Bound { value: p, inclusive });
    match op {
        CompareOp::Eq => vec![point(p)],
        CompareOp::NotEq => vec![(None, at(false)), (at(false), None)],
        CompareOp::Lt => vec![(None, at(false))],
        CompareOp::LtEq => vec![(None, at(true))],
        CompareOp::Gt => vec![(at(false), None)],
        CompareOp::GtEq => vec![(at(true), None)],
    }
}

fn intervals_cover_line(mut intervals: Vec<(Option<Bound>, Option<Bound>)>, discrete: bool) -> bool {
    let tighten_lower = |b: Bound| {
        if discrete {
            Bound {
                value: if b.inclusive { b.value.ceil() } else { b.value.floor() + 1.0 },
                inclusive: true,
            }
        } else {
            b
        }
    };
    let tighten_upper = |b: Bound| {
        if discrete {
            Bound {
                value: if b.inclusive { b.value.floor() } else { b.value.ceil() - 1.0 },
                inclusive: true,
            }
        } else {
            b
        }
    };
    for interval in &mut intervals {
        interval.0 = interval.0.map(tighten_lower);
        interval.1 = interval.1.map(tighten_upper);
    }
    intervals.sort_by(|a, b| match (a.0, b.0) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x
            .value
            .partial_cmp(&y.value)
            .unwrap_or(Ordering::Equal)
            .then(y.inclusive.cmp(&x.inclusive)),
    });
    let mut iter = intervals.into_iter();
    let Some((None, mut reach)) = iter.next() else {
        return false;
    };
    for (lower, upper) in iter {
        let Some(current) = reach else {
            return true;
        };
        let Some(lower) = lower else {
            reach = match upper {
                None => None,
                Some(u) if u.value > current.value || (u.value == current.value && u.inclusive) => Some(u),
                Some(_) => Some(current),
            };
            continue;
        };
        let connected = if discrete {
            lower.value <= current.value + 1.0
        } else {
            lower.value < current.value
                || (lower.value == current.value && (lower.inclusive || current.inclusive))
        };
        if !connected {
            return false;
        }
        reach = match upper {
            None => None,
            Some(u) if u.value > current.value || (u.value == current.value && u.inclusive) => Some(u),
            Some(_) => Some(current),
        };
    }
    reach.is_none()
}

/// Columns pinned to one constant within a conjunction, propagated through
/// column equalities.
pub fn constant_columns(
    predicate: &NormalizedPredicate<'_>,
    conjunction: &Conjunction,
) -> BTreeMap<ColumnKey, Scalar> {
    let mut constants: BTreeMap<ColumnKey, Scalar> = BTreeMap::new();
    let mut edges: Vec<(ColumnKey, ColumnKey)> = Vec::new();
    for literal in conjunction {
        let atom = &predicate.atoms[literal.atom];
        match &atom.kind {
            AtomKind::Compare { left, op, right } => {
                let op = if literal.positive { *op } else { op.negate() };
                if op != CompareOp::Eq {
                    continue;
                }
                match (left, right) {
                    (Operand::Column(column), Operand::Literal(value)) => {
                        constants.insert(column.key.clone(), value.clone());
                    }
                    (Operand::Column(a), Operand::Column(b)) if a.key != b.key => {
                        edges.push((a.key.clone(), b.key.clone()));
                    }
                    _ => {}
                }
            }
            AtomKind::InList {
                operand: Operand::Column(column),
                values,
            } if literal.positive => {
                if let [Operand::Literal(value)] = values.as_slice() {
                    constants.insert(column.key.clone(), value.clone());
                }
            }
            _ => {}
        }
    }
    let mut queue: VecDeque<ColumnKey> = constants.keys().cloned().collect();
    while let Some(key) = queue.pop_front() {
        let Some(value) = constants.get(&key).cloned() else {
            continue;
        };
        for (a, b) in &edges {
            let next = if a == &key {
                b
            } else if b == &key {
                a
            } else {
                continue;
            };
            if !constants.contains_key(next) {
                constants.insert(next.clone(), value.clone());
                queue.push_back(next.clone());
            }
        }
    }
    constants
}

/// Columns whose ordering comparisons within a conjunction admit exactly one
/// value, with the literals responsible: `x >= 5 AND x <= 5`.
pub fn pinned_by_range(
    predicate: &NormalizedPredicate<'_>,
    conjunction: &Conjunction,
) -> Vec<(ColumnKey, Vec<usize>, f64)> {
    let mut regions: BTreeMap<ColumnKey, (Region, Vec<usize>)> = BTreeMap::new();
    for (position, literal) in conjunction.iter().enumerate() {
        for requirement in requirements_of(&predicate.atoms[literal.atom], literal.positive) {
            if let Constraint::Compare(op, _) = &requirement.constraint {
                if op.is_ordering() {
                    let (region, sources) = regions.entry(requirement.column).or_insert_with(|| {
                        (
                            Region::new(requirement.nullable, requirement.discrete),
                            Vec::new(),
                        )
                    });
                    region.add(&requirement.constraint);
                    sources.push(position);
                }
            }
        }
    }
    regions
        .into_iter()
        .filter_map(|(key, (region, sources))| match region.bounds() {
            (Some(lo), Some(hi))
                if sources.len() >= 2 && lo.value == hi.value && lo.inclusive && hi.inclusive =>
            {
                Some((key, sources, lo.value))
            }
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::expr::column_idents;
    use crate::parser::lexical::Clause;
    use crate::query::ResolvedColumn;
    use sqlparser::ast::Expr;
    use sqlparser::dialect::PostgreSqlDialect;
    use sqlparser::parser::Parser;

    fn parse_expr(sql: &str) -> Expr {
        Parser::new(&PostgreSqlDialect {})
            .try_with_sql(sql)
            .expect("tokenize")
            .parse_expr()
            .expect("expression")
    }

    // `sal` integer nullable, `empno` integer NOT NULL, `ename` text nullable.
    // Columns qualified with `m` belong to a second tuple variable.
    fn columns(expr: &Expr) -> Option<ResolvedColumn> {
        let idents = column_idents(expr)?;
        let name = idents.last()?.value.to_ascii_lowercase();
        let var = usize::from(idents.len() == 2 && idents[0].value == "m");
        let (nullable, type_class) = match name.as_str() {
            "sal" => (true, TypeClass::Integer),
            "empno" => (false, TypeClass::Integer),
            "ename" => (true, TypeClass::Text),
            "price" => (false, TypeClass::Numeric),
            _ => return None,
        };
        Some(ResolvedColumn {
            key: ColumnKey { var, column: name },
            nullable,
            type_class,
            outer: false,
        })
    }

    fn oracle_report(sql: &str) -> (OracleReport, Vec<String>) {
        let expr = parse_expr(sql);
        let resolver = columns;
        let predicate = NormalizedPredicate::build(0, vec![(Clause::Where, &expr)], &resolver, 64);
        let texts = predicate.atoms.iter().map(|a| a.text.clone()).collect();
        (analyze(&predicate).expect("normalized"), texts)
    }

    #[test]
    fn subsumed_disjunct_is_dropped() {
        let (report, texts) = oracle_report("sal > 500 OR sal > 700");
        assert_eq!(report.formula, Verdict::Variable);
        assert_eq!(
            report.simplifications,
            vec![Simplification::DisjunctFalse {
                conjunction: 1,
                subsumed_by: Some(0)
            }]
        );
        assert_eq!(texts[1], "sal > 700");
    }

    #[test]
    fn implied_atom_is_removable() {
        let (report, _) = oracle_report("sal > 700 AND sal > 500");
        assert_eq!(
            report.simplifications,
            vec![Simplification::AtomTrue {
                conjunction: 0,
                literal: 1,
                implied_by: vec![0]
            }]
        );
        assert_eq!(
            report.conjunctions[0].literals,
            vec![Verdict::Variable, Verdict::AlwaysTrue]
        );
    }

    #[test]
    fn free_columns_stay_variable() {
        for sql in ["sal > 500", "ename = 'KING'", "sal = sal", "sal IS NULL"] {
            let (report, _) = oracle_report(sql);
            assert_eq!(report.formula, Verdict::Variable, "{sql}");
            assert!(report.simplifications.is_empty(), "{sql}");
        }
    }

    #[test]
    fn contradictions_are_classified() {
        let (report, _) = oracle_report("empno = 1 AND empno = 2");
        assert_eq!(report.formula, Verdict::AlwaysFalse);
        assert!(report.simplifications.contains(&Simplification::AtomFalse {
            conjunction: 0,
            literal: 1,
            with: vec![0],
            conflict: Conflict::Equalities
        }));

        let (report, _) = oracle_report("sal > 5 AND sal < 6");
        assert_eq!(report.formula, Verdict::AlwaysFalse);

        let (report, _) = oracle_report("price > 5 AND price < 6");
        assert_eq!(report.formula, Verdict::Variable);

        let (report, _) = oracle_report("sal IS NULL AND sal > 3");
        assert!(report.simplifications.iter().any(|s| matches!(
            s,
            Simplification::AtomFalse {
                conflict: Conflict::NullAndValue,
                ..
            }
        )));
    }

    #[test]
    fn schema_constraints_justify_verdicts() {
        let (report, _) = oracle_report("empno IS NULL");
        assert_eq!(report.formula, Verdict::AlwaysFalse);

        let (report, _) = oracle_report("empno IS NOT NULL AND sal > 1");
        assert_eq!(
            report.simplifications,
            vec![Simplification::AtomTrue {
                conjunction: 0,
                literal: 0,
                implied_by: Vec::new()
            }]
        );
    }

    #[test]
    fn null_comparisons_are_always_unknown() {
        let (report, _) = oracle_report("sal = NULL");
        assert_eq!(report.formula, Verdict::AlwaysUnknown);
        let (report, _) = oracle_report("sal NOT IN (1, NULL)");
        assert_eq!(report.formula, Verdict::AlwaysFalse);
    }

    #[test]
    fn covering_disjuncts_make_a_tautology() {
        let (report, _) = oracle_report("sal IS NULL OR sal IS NOT NULL");
        assert_eq!(report.formula, Verdict::AlwaysTrue);
        let (report, _) = oracle_report("empno <= 4 OR empno >= 5");
        assert_eq!(report.formula, Verdict::AlwaysTrue);
        let (report, _) = oracle_report("sal <= 4 OR sal >= 5");
        assert_eq!(report.formula, Verdict::Variable);
        let (report, _) = oracle_report("1 = 1");
        assert_eq!(report.formula, Verdict::AlwaysTrue);
    }

    #[test]
    fn comparison_implies_not_null() {
        let (report, _) = oracle_report("sal > 0 AND sal IS NOT NULL");
        assert!(report.simplifications.contains(&Simplification::AtomTrue {
            conjunction: 0,
            literal: 1,
            implied_by: vec![0]
        }));
    }

    #[test]
    fn non_null_values_do_not_imply_richer_conditions() {
        for sql in [
            "sal > 10 AND sal IN (SELECT losal FROM salgrade)",
            "sal > 10 AND sal = ANY (SELECT losal FROM salgrade)",
            "ename = 'KING' AND ename > 'A'",
            "sal > 0 AND sal IN (1, empno)",
            "e.sal > 1 AND m.sal > 1 AND e.sal = m.sal",
        ] {
            let (report, _) = oracle_report(sql);
            assert_eq!(report.formula, Verdict::Variable, "{sql}");
            assert!(report.simplifications.is_empty(), "{sql}: {:?}", report.simplifications);
        }
    }

    #[test]
    fn disjuncts_are_not_subsumed_by_necessary_conditions() {
        for sql in [
            "sal > 10 OR sal IN (SELECT losal FROM salgrade)",
            "sal > 10 OR sal = ANY (SELECT losal FROM salgrade)",
            "ename = 'KING' OR ename LIKE 'K%'",
            "sal = 3 OR sal IN (1, empno)",
        ] {
            let (report, _) = oracle_report(sql);
            assert!(
                !report
                    .simplifications
                    .iter()
                    .any(|s| matches!(s, Simplification::DisjunctFalse { .. })),
                "{sql}: {:?}",
                report.simplifications
            );
        }
    }

    #[test]
    fn like_makes_not_null_removable_but_not_the_reverse() {
        let (report, _) = oracle_report("ename IS NOT NULL AND ename LIKE 'A%'");
        assert_eq!(
            report.simplifications,
            vec![Simplification::AtomTrue {
                conjunction: 0,
                literal: 0,
                implied_by: vec![1]
            }]
        );
    }

    #[test]
    fn necessary_conditions_still_detect_conflicts() {
        let (report, _) = oracle_report("ename IS NULL AND ename LIKE 'A%'");
        assert_eq!(report.formula, Verdict::AlwaysFalse);
    }

    #[test]
    fn constants_propagate_through_equalities() {
        let a = parse_expr("sal = empno AND empno = 7");
        let resolver = columns;
        let predicate = NormalizedPredicate::build(0, vec![(Clause::Where, &a)], &resolver, 64);
        let dnf = predicate.outcome.dnf().expect("dnf");
        let constants = constant_columns(&predicate, &dnf.conjunctions[0]);
        assert_eq!(
            constants.get(&ColumnKey {
                var: 0,
                column: "sal".to_string()
            }),
            Some(&Scalar::Number(7.0))
        );
    }

    #[test]
    fn ranges_collapsing_to_a_point_are_found() {
        let a = parse_expr("sal >= 10 AND sal <= 10");
        let resolver = columns;
        let predicate = NormalizedPredicate::build(0, vec![(Clause::Where, &a)], &resolver, 64);
        let dnf = predicate.outcome.dnf().expect("dnf");
        let pinned = pinned_by_range(&predicate, &dnf.conjunctions[0]);
        assert_eq!(pinned.len(), 1);
        assert_eq!(pinned[0].2, 10.0);
    }
}
