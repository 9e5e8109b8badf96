//! Queries against the bundled interval solver.

use iterloop::error::SolverError;
use iterloop::ir::{DataType, Expr, MathOp, Sym};
use iterloop::solver::{IntervalSolver, SolveResult, Solver};

/// `forall t. (t >= p -> phi) and (t < p -> not phi)`
fn lower_query(t: &Sym, p: &Sym, phi: Expr) -> Expr {
    let te = Expr::sym(t);
    let pe = Expr::sym(p);
    let body = Expr::and(
        Expr::implies(Expr::gte(te.clone(), pe.clone()).unwrap(), phi.clone()).unwrap(),
        Expr::implies(Expr::lt(te, pe).unwrap(), Expr::not(phi).unwrap()).unwrap(),
    )
    .unwrap();
    Expr::forall(t, body).unwrap()
}

#[test]
fn test_lower_bound_model() {
    let t = Sym::new("t", DataType::Int64);
    let p = Sym::new("p", DataType::Int64);
    let phi = Expr::gt(Expr::sym(&t), Expr::i64(-3)).unwrap();
    let res = IntervalSolver::new()
        .solve(&lower_query(&t, &p, phi))
        .unwrap();
    match res {
        SolveResult::Sat(model) => assert_eq!(model.get(&p), Some(-2)),
        SolveResult::Unsat => panic!("expected a model"),
    }
}

#[test]
fn test_upper_only_formula_has_no_lower_bound() {
    let t = Sym::new("t", DataType::Int64);
    let p = Sym::new("p", DataType::Int64);
    let phi = Expr::lt(Expr::sym(&t), Expr::i64(50)).unwrap();
    let res = IntervalSolver::new()
        .solve(&lower_query(&t, &p, phi))
        .unwrap();
    assert_eq!(res, SolveResult::Unsat);
}

#[test]
fn test_scaled_term() {
    // 2 * t >= 7 holds from t = 4 on.
    let t = Sym::new("t", DataType::Int64);
    let p = Sym::new("p", DataType::Int64);
    let phi = Expr::gte(
        Expr::mul(Expr::i64(2), Expr::sym(&t)).unwrap(),
        Expr::i64(7),
    )
    .unwrap();
    let res = IntervalSolver::new()
        .solve(&lower_query(&t, &p, phi))
        .unwrap();
    match res {
        SolveResult::Sat(model) => assert_eq!(model.get(&p), Some(4)),
        SolveResult::Unsat => panic!("expected a model"),
    }
}

#[test]
fn test_forall_without_parameters() {
    let t = Sym::new("t", DataType::Int64);
    let taut = Expr::or(
        Expr::lt(Expr::sym(&t), Expr::i64(3)).unwrap(),
        Expr::gte(Expr::sym(&t), Expr::i64(3)).unwrap(),
    )
    .unwrap();
    let solver = IntervalSolver::new();
    assert!(solver.solve(&Expr::forall(&t, taut).unwrap()).unwrap().is_sat());

    let not_taut = Expr::lt(Expr::sym(&t), Expr::i64(3)).unwrap();
    assert_eq!(
        solver.solve(&Expr::forall(&t, not_taut).unwrap()).unwrap(),
        SolveResult::Unsat
    );
}

#[test]
fn test_non_linear_rejected() {
    let t = Sym::new("t", DataType::Int64);
    let u = Sym::new("u", DataType::Int64);
    let prod = Expr::mul(Expr::sym(&t), Expr::sym(&u)).unwrap();
    let f = Expr::gt(prod, Expr::i64(0)).unwrap();
    let err = IntervalSolver::new().solve(&f).unwrap_err();
    assert!(matches!(err, SolverError::Unsupported { .. }));

    let m = Expr::nary(MathOp::Mod, vec![Expr::sym(&t), Expr::i64(2)]).unwrap();
    let f = Expr::exists(&t, Expr::eq(m, Expr::i64(0)).unwrap()).unwrap();
    assert!(IntervalSolver::new().solve(&f).is_err());
}
