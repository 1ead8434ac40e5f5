use proptest::prelude::*;
use sql_misconceptions::logic::normalizer::to_dnf;
use sql_misconceptions::logic::{NormalizeOutcome, Predicate, Truth};

mod support;

fn predicate() -> impl Strategy<Value = Predicate> {
    let leaf = (0usize..3).prop_map(Predicate::Atom);
    leaf.prop_recursive(4, 24, 3, |inner| {
        prop_oneof![
            inner.clone().prop_map(|p| Predicate::Not(Box::new(p))),
            prop::collection::vec(inner.clone(), 1..4).prop_map(Predicate::And),
            prop::collection::vec(inner, 1..4).prop_map(Predicate::Or),
        ]
    })
}

fn assignments() -> impl Iterator<Item = [Truth; 3]> {
    Truth::ALL.into_iter().flat_map(|a| {
        Truth::ALL
            .into_iter()
            .flat_map(move |b| Truth::ALL.into_iter().map(move |c| [a, b, c]))
    })
}

proptest! {
    #[test]
    fn dnf_agrees_with_the_tree_under_three_valued_logic(tree in predicate()) {
        let outcome = to_dnf(&tree, 4096);
        prop_assume!(matches!(outcome, NormalizeOutcome::Normalized(_)));
        let dnf = outcome.dnf().expect("normalized");
        for values in assignments() {
            let assignment = |i: usize| values[i];
            prop_assert_eq!(tree.eval(&assignment), dnf.eval(&assignment));
        }
    }

    #[test]
    fn free_column_bounds_are_never_decided(
        op in prop::sample::select(vec!["=", "<>", "<", "<=", ">", ">="]),
        value in -10_000i64..10_000,
    ) {
        let sql = format!("SELECT ename FROM emp WHERE sal {op} {value}");
        let ids = support::ids(&sql);
        prop_assert!(!ids.contains(&39) && !ids.contains(&40), "{sql}: {ids:?}");
    }

    #[test]
    fn analysis_is_deterministic(low in 0i64..5_000, width in -100i64..100) {
        let sql = format!(
            "SELECT e.ename FROM emp e, dept d WHERE e.sal > {low} AND e.sal < {} OR d.loc = 'X'",
            low + width
        );
        prop_assert_eq!(support::ids(&sql), support::ids(&sql));
    }
}
