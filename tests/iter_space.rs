//! Iteration-space construction from op predicates.

use std::rc::Rc;

use iterloop::error::PassError;
use iterloop::ir::{DataType, Expr, Sym, SymTable};
use iterloop::iter::{infer_bounds, Domain, IterSpace, SpaceBuilder};
use iterloop::solver::IntervalSolver;

fn t() -> Sym {
    Sym::new("t", DataType::Int64)
}

fn build(iter: &Sym, tbl: SymTable, pred: &Expr) -> Result<IterSpace, PassError> {
    let solver = IntervalSolver::new();
    SpaceBuilder::new(iter, Rc::new(tbl), &solver).build(pred)
}

fn and_all(parts: Vec<Expr>) -> Expr {
    let mut it = parts.into_iter();
    let first = it.next().unwrap();
    it.fold(first, |acc, p| Expr::and(acc, p).unwrap())
}

#[test]
fn test_conjunction_tightens_bounds() {
    let t = t();
    let te = || Expr::sym(&t);
    let pred = and_all(vec![
        Expr::gte(te(), Expr::i64(0)).unwrap(),
        Expr::lte(te(), Expr::i64(99)).unwrap(),
        Expr::gte(te(), Expr::i64(10)).unwrap(),
        Expr::lt(te(), Expr::i64(50)).unwrap(),
    ]);
    let space = build(&t, SymTable::new(), &pred).unwrap();
    assert_eq!(space.domain, Domain::Free);
    assert_eq!(space.lower, Some(Expr::i64(10)));
    assert_eq!(space.upper, Some(Expr::i64(49)));
    assert_eq!(space.residual, None);
    assert_eq!(space.start_idx().unwrap(), Some(Expr::idx(10)));
    assert_eq!(space.end_idx().unwrap(), Some(Expr::idx(50)));
}

#[test]
fn test_bindings_are_followed() {
    let t = t();
    let lo = Sym::new("lo", DataType::Bool);
    let mut tbl = SymTable::new();
    tbl.bind(lo.clone(), Expr::gt(Expr::sym(&t), Expr::i64(4)).unwrap())
        .unwrap();
    let pred = Expr::and(
        Expr::sym(&lo),
        Expr::lt(Expr::sym(&t), Expr::i64(8)).unwrap(),
    )
    .unwrap();
    let space = build(&t, tbl, &pred).unwrap();
    assert_eq!(space.lower, Some(Expr::i64(5)));
    assert_eq!(space.upper, Some(Expr::i64(7)));
}

#[test]
fn test_union_covers_both_ranges() {
    let t = t();
    let te = || Expr::sym(&t);
    let left = and_all(vec![
        Expr::gte(te(), Expr::i64(0)).unwrap(),
        Expr::lt(te(), Expr::i64(10)).unwrap(),
    ]);
    let right = and_all(vec![
        Expr::gte(te(), Expr::i64(5)).unwrap(),
        Expr::lt(te(), Expr::i64(20)).unwrap(),
    ]);
    let pred = Expr::or(left, right).unwrap();
    let space = build(&t, SymTable::new(), &pred).unwrap();
    assert_eq!(space.domain, Domain::Free);
    assert_eq!(space.lower, Some(Expr::i64(0)));
    assert_eq!(space.upper, Some(Expr::i64(19)));
    // Rows between the ranges are filtered by the disjunction.
    assert!(space.residual.is_some());
}

#[test]
fn test_union_with_unbounded_side_is_unbounded() {
    let t = t();
    let te = || Expr::sym(&t);
    let left = and_all(vec![
        Expr::gte(te(), Expr::i64(0)).unwrap(),
        Expr::lt(te(), Expr::i64(10)).unwrap(),
    ]);
    let right = Expr::gte(te(), Expr::i64(5)).unwrap();
    let pred = Expr::or(left, right).unwrap();
    let space = build(&t, SymTable::new(), &pred).unwrap();
    assert_eq!(space.lower, Some(Expr::i64(0)));
    assert_eq!(space.upper, None);
    assert_eq!(space.end_idx().unwrap(), None);
}

#[test]
fn test_membership_makes_vector_domain() {
    let t = t();
    let vty = DataType::vector(vec![DataType::Int64, DataType::Int64], 1).unwrap();
    let v = Sym::new("v", vty);
    let pred = Expr::and(
        Expr::in_vec(Expr::sym(&t), Expr::sym(&v)).unwrap(),
        Expr::lt(Expr::sym(&t), Expr::i64(100)).unwrap(),
    )
    .unwrap();
    let space = build(&t, SymTable::new(), &pred).unwrap();
    assert_eq!(space.vector(), Some(&Expr::sym(&v)));
    assert_eq!(space.lower, None);
    assert_eq!(space.upper, Some(Expr::i64(99)));
    assert_eq!(space.start_idx().unwrap(), Some(Expr::idx(0)));
    assert!(space.end_idx().unwrap().is_some());
}

#[test]
fn test_two_vectors_intersect_with_lookup() {
    let t = t();
    let vty = DataType::vector(vec![DataType::Int64], 1).unwrap();
    let a = Sym::new("a", vty.clone());
    let b = Sym::new("b", vty);
    let pred = Expr::and(
        Expr::in_vec(Expr::sym(&t), Expr::sym(&a)).unwrap(),
        Expr::in_vec(Expr::sym(&t), Expr::sym(&b)).unwrap(),
    )
    .unwrap();
    let space = build(&t, SymTable::new(), &pred).unwrap();
    assert_eq!(space.vector(), Some(&Expr::sym(&a)));
    let residual = space.residual.unwrap().to_string();
    assert!(residual.contains("@vector_locate($b, $t)"), "{}", residual);
}

#[test]
fn test_union_of_two_vectors_unsupported() {
    let t = t();
    let vty = DataType::vector(vec![DataType::Int64], 1).unwrap();
    let a = Sym::new("a", vty.clone());
    let b = Sym::new("b", vty);
    let pred = Expr::or(
        Expr::in_vec(Expr::sym(&t), Expr::sym(&a)).unwrap(),
        Expr::in_vec(Expr::sym(&t), Expr::sym(&b)).unwrap(),
    )
    .unwrap();
    let err = build(&t, SymTable::new(), &pred).unwrap_err();
    assert!(matches!(err, PassError::Unsupported { .. }));
}

#[test]
fn test_non_linear_comparison_stays_residual() {
    let t = t();
    let te = || Expr::sym(&t);
    let odd = Expr::eq(
        Expr::nary(iterloop::ir::MathOp::Mod, vec![te(), Expr::i64(2)]).unwrap(),
        Expr::i64(1),
    )
    .unwrap();
    let pred = and_all(vec![
        Expr::gte(te(), Expr::i64(0)).unwrap(),
        odd.clone(),
        Expr::lt(te(), Expr::i64(9)).unwrap(),
    ]);
    let space = build(&t, SymTable::new(), &pred).unwrap();
    assert_eq!(space.lower, Some(Expr::i64(0)));
    assert_eq!(space.upper, Some(Expr::i64(8)));
    assert_eq!(space.residual, Some(odd));
}

#[test]
fn test_symbolic_bound_against_input() {
    let t = t();
    let n = Sym::new("n", DataType::Int64);
    let cmp = Expr::lt(Expr::sym(&t), Expr::sym(&n)).unwrap();
    let solver = IntervalSolver::new();
    let b = infer_bounds(&t, &cmp, &Rc::new(SymTable::new()), &solver)
        .unwrap()
        .unwrap();
    assert_eq!(b.lower, None);
    assert_eq!(b.upper, Some(Expr::sub(Expr::sym(&n), Expr::i64(1)).unwrap()));

    // Iterator on the right-hand side.
    let cmp = Expr::lte(Expr::sym(&n), Expr::sym(&t)).unwrap();
    let b = infer_bounds(&t, &cmp, &Rc::new(SymTable::new()), &solver)
        .unwrap()
        .unwrap();
    assert_eq!(b.lower, Some(Expr::sym(&n)));
    assert_eq!(b.upper, None);
}

#[test]
fn test_equality_pins_both_bounds() {
    let t = t();
    let cmp = Expr::eq(Expr::sym(&t), Expr::i64(7)).unwrap();
    let solver = IntervalSolver::new();
    let b = infer_bounds(&t, &cmp, &Rc::new(SymTable::new()), &solver)
        .unwrap()
        .unwrap();
    assert_eq!(b.lower, Some(Expr::i64(7)));
    assert_eq!(b.upper, Some(Expr::i64(7)));
}

#[test]
fn test_looked_up_vector_bounds_the_walk() {
    let t = t();
    let vty = DataType::vector(vec![DataType::Int64], 1).unwrap();
    let a = Sym::new("a", vty.clone());
    let b = Sym::new("b", vty);
    let pred = Expr::and(
        Expr::in_vec(Expr::sym(&t), Expr::sym(&a)).unwrap(),
        Expr::in_vec(Expr::sym(&t), Expr::sym(&b)).unwrap(),
    )
    .unwrap();
    let space = build(&t, SymTable::new(), &pred).unwrap();
    assert_eq!(space.vector(), Some(&Expr::sym(&a)));

    // First and last value of the looked-up vector, guarded against emptiness.
    let lower = space.lower.clone().unwrap().to_string();
    let upper = space.upper.clone().unwrap().to_string();
    assert!(lower.contains("@vector_lookup($b, 0)"), "{}", lower);
    assert!(upper.contains("@vector_len($b)"), "{}", upper);

    let start = space.start_idx().unwrap().unwrap().to_string();
    assert!(start.starts_with("@vector_locate($a, "), "{}", start);
    let end = space.end_idx().unwrap().unwrap().to_string();
    assert!(end.contains("@vector_locate($a, "), "{}", end);
}

#[test]
fn test_upper_bound_at_type_maximum() {
    let t = t();
    let pred = Expr::and(
        Expr::gte(Expr::sym(&t), Expr::i64(i64::MAX - 2)).unwrap(),
        Expr::lte(Expr::sym(&t), Expr::i64(i64::MAX)).unwrap(),
    )
    .unwrap();
    let space = build(&t, SymTable::new(), &pred).unwrap();
    assert_eq!(space.upper, Some(Expr::i64(i64::MAX)));
    // No position past the last one exists; the inclusive one does.
    assert_eq!(space.end_idx().unwrap(), None);
    assert_eq!(space.last_idx().unwrap(), Some(Expr::idx(i64::MAX)));
}
