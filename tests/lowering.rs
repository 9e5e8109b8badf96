//! End-to-end lowering: declarative functions through the standard pipeline,
//! checked structurally and by evaluating the lowered loops.

use iterloop::error::{Error, PassError};
use iterloop::interp::{eval_func, eval_func_with, ColumnVector, Value};
use iterloop::ir::{DataType, Expr, ExprKind, Func, MathOp, Op, Reduce, Stmt, Sym, SymTable};
use iterloop::pass::{CanonPass, OpToLoopPass, Pass, PassManager, ValidateLoweredPass};
use iterloop::{lower_func, InterpConfig, PipelineConfig};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn and_all(parts: Vec<Expr>) -> Expr {
    let mut it = parts.into_iter();
    let first = it.next().unwrap();
    it.fold(first, |acc, p| Expr::and(acc, p).unwrap())
}

fn range(t: &Sym, lo: i64, hi: i64) -> Expr {
    and_all(vec![
        Expr::gte(Expr::sym(t), Expr::i64(lo)).unwrap(),
        Expr::lt(Expr::sym(t), Expr::i64(hi)).unwrap(),
    ])
}

fn ints(vals: &[i64]) -> Vec<Value> {
    vals.iter().map(|v| Value::Int(*v)).collect()
}

fn column(v: &Value, col: usize) -> Vec<Value> {
    v.as_vector().unwrap().borrow().column(col)
}

fn outer_loop(func: &Func) -> &iterloop::ir::Loop {
    match func.output.kind() {
        ExprKind::Loop(lp) => lp,
        other => panic!("expected a loop, got {:?}", other),
    }
}

/// `op t: 10 <= t < 50 -> [t * 2]`
fn doubled() -> Func {
    let t = Sym::new("t", DataType::Int64);
    let out = Expr::mul(Expr::sym(&t), Expr::i64(2)).unwrap();
    let op = Op::new(vec![t.clone()], range(&t, 10, 50), vec![out]).unwrap();
    Func::new("doubled", Expr::op(op), vec![], SymTable::new())
}

#[test]
fn test_bounded_op_loop_shape() {
    let func = doubled();
    let lowered = OpToLoopPass::new().run(&func).unwrap();
    let lp = outer_loop(&lowered);
    assert_eq!(lp.exit_cond.to_string(), "gte(load($t_idx), 50)");
    assert!(lp.body_cond.is_none());
    let init = lp.init.as_ref().unwrap().to_string();
    assert!(init.starts_with("store($t_idx, 10)"), "{}", init);
    assert!(lp.incr.is_some());
    assert!(!lp.is_canonical());
}

#[test]
fn test_bounded_op_evaluates() {
    let lowered = lower_func(&doubled(), &PipelineConfig::default()).unwrap();
    assert!(outer_loop(&lowered).is_canonical());

    let out = eval_func(&lowered, &[]).unwrap();
    let iters = column(&out, 0);
    let vals = column(&out, 1);
    assert_eq!(iters.len(), 40);
    assert_eq!(iters[0], Value::Int(10));
    assert_eq!(vals[0], Value::Int(20));
    assert_eq!(vals[39], Value::Int(98));
}

#[test]
fn test_residual_filter_skips_rows() {
    let t = Sym::new("t", DataType::Int64);
    let modulo = Expr::nary(MathOp::Mod, vec![Expr::sym(&t), Expr::i64(3)]).unwrap();
    let pred = Expr::and(range(&t, 0, 20), Expr::eq(modulo, Expr::i64(0)).unwrap()).unwrap();
    let op = Op::new(vec![t.clone()], pred, vec![Expr::bool(true)]).unwrap();
    let func = Func::new("thirds", Expr::op(op), vec![], SymTable::new());

    let raw = OpToLoopPass::new().run(&func).unwrap();
    assert!(outer_loop(&raw).body_cond.is_some());

    let lowered = lower_func(&func, &PipelineConfig::default()).unwrap();
    let lp = outer_loop(&lowered);
    assert!(lp.body_cond.is_none());
    assert!(matches!(&lp.body, Stmt::Stmts(parts) if matches!(parts[0], Stmt::IfElse(_))));

    let out = eval_func(&lowered, &[]).unwrap();
    assert_eq!(column(&out, 0), ints(&[0, 3, 6, 9, 12, 15, 18]));
}

#[test]
fn test_empty_range() {
    let t = Sym::new("t", DataType::Int64);
    let op = Op::new(vec![t.clone()], range(&t, 5, 5), vec![Expr::sym(&t)]).unwrap();
    let func = Func::new("empty", Expr::op(op), vec![], SymTable::new());
    let lowered = lower_func(&func, &PipelineConfig::default()).unwrap();
    let out = eval_func(&lowered, &[]).unwrap();
    assert!(out.as_vector().unwrap().borrow().is_empty());
}

fn keyed_ty() -> DataType {
    DataType::vector(vec![DataType::Int64, DataType::Int64], 1).unwrap()
}

fn keyed(keys: &[i64], vals: &[i64]) -> Value {
    let vec = ColumnVector::from_columns(keyed_ty(), vec![ints(keys), ints(vals)]).unwrap();
    Value::vector(vec)
}

/// `op t: t in a and t in b -> [a[t].0 + b[t].0]`
fn join() -> Func {
    let t = Sym::new("t", DataType::Int64);
    let a = Sym::new("a", keyed_ty());
    let b = Sym::new("b", keyed_ty());
    let pred = Expr::and(
        Expr::in_vec(Expr::sym(&t), Expr::sym(&a)).unwrap(),
        Expr::in_vec(Expr::sym(&t), Expr::sym(&b)).unwrap(),
    )
    .unwrap();
    let pay = |v: &Sym| Expr::get(Expr::element(Expr::sym(v), vec![Expr::sym(&t)]).unwrap(), 0).unwrap();
    let out = Expr::add(pay(&a), pay(&b)).unwrap();
    let op = Op::new(vec![t.clone()], pred, vec![out]).unwrap();
    Func::new("join", Expr::op(op), vec![a, b], SymTable::new())
}

#[test]
fn test_vector_join() {
    let lowered = lower_func(&join(), &PipelineConfig::default()).unwrap();
    let keys_a: Vec<i64> = (0..10).collect();
    let keys_b: Vec<i64> = (5..15).collect();
    let vals_a: Vec<i64> = keys_a.iter().map(|k| k * 100).collect();
    let vals_b: Vec<i64> = keys_b.iter().map(|k| k + 1).collect();
    let out = eval_func(&lowered, &[keyed(&keys_a, &vals_a), keyed(&keys_b, &vals_b)]).unwrap();

    assert_eq!(column(&out, 0), ints(&[5, 6, 7, 8, 9]));
    assert_eq!(column(&out, 1), ints(&[506, 607, 708, 809, 910]));
}

#[test]
fn test_vector_join_with_empty_side() {
    let lowered = lower_func(&join(), &PipelineConfig::default()).unwrap();
    let out = eval_func(&lowered, &[keyed(&[1, 2, 3], &[1, 1, 1]), keyed(&[], &[])]).unwrap();
    assert!(column(&out, 0).is_empty());
}

#[test]
fn test_disjoint_join_visits_no_rows() {
    let lowered = lower_func(&join(), &PipelineConfig::default()).unwrap();
    let keys_a: Vec<i64> = (0..10).collect();
    let keys_b: Vec<i64> = (1000..1010).collect();
    let args = [keyed(&keys_a, &keys_a), keyed(&keys_b, &keys_b)];
    // Without any iteration budget the walk itself has to be empty.
    let out = eval_func_with(&lowered, &args, &InterpConfig { max_steps: 0 }).unwrap();
    assert!(column(&out, 0).is_empty());
}

#[test]
fn test_join_walks_only_the_overlap() {
    let lowered = lower_func(&join(), &PipelineConfig::default()).unwrap();
    let keys_a: Vec<i64> = (0..10).collect();
    let keys_b: Vec<i64> = (5..15).collect();
    let args = [keyed(&keys_a, &keys_a), keyed(&keys_b, &keys_b)];
    let out = eval_func_with(&lowered, &args, &InterpConfig { max_steps: 5 }).unwrap();
    assert_eq!(column(&out, 0), ints(&[5, 6, 7, 8, 9]));
}

#[test]
fn test_not_null_filters_rows() {
    let t = Sym::new("t", DataType::Int64);
    let v = Sym::new("v", keyed_ty());
    let elem = || Expr::element(Expr::sym(&v), vec![Expr::sym(&t)]).unwrap();
    let pred = Expr::not_null(elem()).unwrap();
    let op = Op::new(vec![t.clone()], pred, vec![Expr::get(elem(), 0).unwrap()]).unwrap();
    let func = Func::new("valid", Expr::op(op), vec![v], SymTable::new());
    let lowered = lower_func(&func, &PipelineConfig::default()).unwrap();

    let data = ColumnVector::from_columns(keyed_ty(), vec![ints(&[1, 2, 3, 4]), ints(&[10, 20, 30, 40])])
        .unwrap()
        .with_null(1, 1)
        .with_null(3, 1);
    let out = eval_func(&lowered, &[Value::vector(data)]).unwrap();
    assert_eq!(column(&out, 0), ints(&[1, 3]));
    assert_eq!(column(&out, 1), ints(&[10, 30]));
}

fn sum_of(op: Op) -> Reduce {
    Reduce::new(op, || Ok(Expr::i64(0)), |s, row| Expr::add(s, Expr::get(row, 0)?)).unwrap()
}

#[test]
fn test_scalar_reduce() {
    let t = Sym::new("t", DataType::Int64);
    let op = Op::new(vec![t.clone()], range(&t, 0, 10), vec![Expr::sym(&t)]).unwrap();
    let func = Func::new("sum", Expr::reduce(sum_of(op)), vec![], SymTable::new());
    let lowered = lower_func(&func, &PipelineConfig::default()).unwrap();
    assert_eq!(eval_func(&lowered, &[]).unwrap(), Value::Int(45));
}

#[test]
fn test_range_ending_at_type_maximum() {
    let t = Sym::new("t", DataType::Int64);
    let pred = and_all(vec![
        Expr::gte(Expr::sym(&t), Expr::i64(i64::MAX - 2)).unwrap(),
        Expr::lte(Expr::sym(&t), Expr::i64(i64::MAX)).unwrap(),
    ]);
    let op = Op::new(vec![t.clone()], pred, vec![Expr::bool(true)]).unwrap();
    let func = Func::new("top", Expr::op(op), vec![], SymTable::new());
    let lowered = lower_func(&func, &PipelineConfig::default()).unwrap();

    let out = eval_func(&lowered, &[]).unwrap();
    assert_eq!(column(&out, 0), ints(&[i64::MAX - 2, i64::MAX - 1, i64::MAX]));
}

#[test]
fn test_sibling_reduces_share_iterator() {
    let s = Sym::new("s", DataType::Int64);
    let sq = Sym::new("sq", DataType::Int64);
    let mut tbl = SymTable::new();
    tbl.bind(sq.clone(), Expr::mul(Expr::sym(&s), Expr::sym(&s)).unwrap())
        .unwrap();
    let total = |hi: i64, out: &Sym| {
        let op = Op::new(vec![s.clone()], range(&s, 0, hi), vec![Expr::sym(out)]).unwrap();
        Expr::reduce(sum_of(op))
    };

    let plain = Expr::add(total(3, &s), total(5, &s)).unwrap();
    let func = Func::new("sums", plain, vec![], SymTable::new());
    let lowered = lower_func(&func, &PipelineConfig::default()).unwrap();
    assert_eq!(eval_func(&lowered, &[]).unwrap(), Value::Int(13));

    // `sq` depends on the iterator and is rebuilt for the second loop.
    let squares = Expr::add(total(3, &sq), total(4, &sq)).unwrap();
    let func = Func::new("squares", squares, vec![], tbl);
    let lowered = lower_func(&func, &PipelineConfig::default()).unwrap();
    assert_eq!(eval_func(&lowered, &[]).unwrap(), Value::Int(19));
}

#[test]
fn test_nested_reduce_with_outer_bound() {
    // op t: 0 <= t < 5 -> [sum(s for 0 <= s < t)]
    let t = Sym::new("t", DataType::Int64);
    let s = Sym::new("s", DataType::Int64);
    let inner_pred = and_all(vec![
        Expr::gte(Expr::sym(&s), Expr::i64(0)).unwrap(),
        Expr::lt(Expr::sym(&s), Expr::sym(&t)).unwrap(),
    ]);
    let inner = Op::new(vec![s.clone()], inner_pred, vec![Expr::sym(&s)]).unwrap();
    let outer = Op::new(
        vec![t.clone()],
        range(&t, 0, 5),
        vec![Expr::reduce(sum_of(inner))],
    )
    .unwrap();
    let func = Func::new("triangle", Expr::op(outer), vec![], SymTable::new());
    let lowered = lower_func(&func, &PipelineConfig::default()).unwrap();

    let out = eval_func(&lowered, &[]).unwrap();
    assert_eq!(column(&out, 0), ints(&[0, 1, 2, 3, 4]));
    assert_eq!(column(&out, 1), ints(&[0, 0, 1, 3, 6]));
}

#[test]
fn test_struct_state_reduce_is_scalarized() {
    // (count, sum) over the payload of v, result is the sum.
    let t = Sym::new("t", DataType::Int64);
    let v = Sym::new("v", keyed_ty());
    let pred = Expr::in_vec(Expr::sym(&t), Expr::sym(&v)).unwrap();
    let payload = Expr::get(Expr::element(Expr::sym(&v), vec![Expr::sym(&t)]).unwrap(), 0).unwrap();
    let op = Op::new(vec![t.clone()], pred, vec![payload]).unwrap();
    let red = Reduce::new(
        op,
        || Expr::new_struct(vec![Expr::i64(0), Expr::i64(0)]),
        |s, row| {
            Expr::new_struct(vec![
                Expr::add(Expr::get(s.clone(), 0)?, Expr::i64(1))?,
                Expr::add(Expr::get(s, 1)?, Expr::get(row, 0)?)?,
            ])
        },
    )
    .unwrap();
    let count = Sym::new("stats", red.ty().clone());
    let mut tbl = SymTable::new();
    tbl.bind(count.clone(), Expr::reduce(red)).unwrap();
    let output = Expr::add(
        Expr::get(Expr::sym(&count), 0).unwrap(),
        Expr::get(Expr::sym(&count), 1).unwrap(),
    )
    .unwrap();
    let func = Func::new("stats", output, vec![v], tbl);

    let lowered = lower_func(&func, &PipelineConfig::default()).unwrap();
    for (_, bound) in lowered.tbl.iter() {
        assert!(!bound.ty().is_struct(), "struct binding left: {}", bound);
    }
    let out = eval_func(&lowered, &[keyed(&[2, 4, 6], &[5, 7, 9])]).unwrap();
    assert_eq!(out, Value::Int(3 + 21));
}

#[test]
fn test_projection_of_construction() {
    let a = Sym::new("a", DataType::Int64);
    let b = Sym::new("b", DataType::Float64);
    let c = Sym::new("c", DataType::Bool);
    let s = Expr::new_struct(vec![Expr::sym(&a), Expr::sym(&b), Expr::sym(&c)]).unwrap();
    let func = Func::new("pick", Expr::get(s, 1).unwrap(), vec![a, b.clone(), c], SymTable::new());
    let lowered = lower_func(&func, &PipelineConfig::default()).unwrap();
    assert_eq!(lowered.output, Expr::sym(&b));
    assert!(lowered.tbl.is_empty());
}

#[test]
fn test_canon_is_idempotent() {
    let func = doubled();
    let mut pm = PassManager::new();
    pm.add_pass(OpToLoopPass::new());
    pm.add_pass(CanonPass);
    let once = pm.run(&func).unwrap();
    let twice = CanonPass.run(&once).unwrap();
    assert_eq!(once.to_string(), twice.to_string());
}

#[test]
fn test_lowering_is_deterministic() {
    let func = join();
    let a = lower_func(&func, &PipelineConfig::default()).unwrap();
    let b = lower_func(&func, &PipelineConfig::default()).unwrap();
    assert_eq!(a.to_string(), b.to_string());
}

#[test]
fn test_unbounded_iteration_rejected() {
    let t = Sym::new("t", DataType::Int64);
    let pred = Expr::gte(Expr::sym(&t), Expr::i64(0)).unwrap();
    let op = Op::new(vec![t.clone()], pred, vec![Expr::sym(&t)]).unwrap();
    let func = Func::new("open", Expr::op(op), vec![], SymTable::new());
    let err = lower_func(&func, &PipelineConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        Error::Pass(PassError::UnboundedIteration { side: "upper", .. })
    ));
    assert_eq!(err.diagnostic_code(), "E0203");
}

#[test]
fn test_multiple_iterators_rejected() {
    let t = Sym::new("t", DataType::Int64);
    let u = Sym::new("u", DataType::Int64);
    let pred = Expr::and(range(&t, 0, 3), range(&u, 0, 3)).unwrap();
    let op = Op::new(vec![t, u], pred, vec![Expr::bool(true)]).unwrap();
    let func = Func::new("grid", Expr::op(op), vec![], SymTable::new());
    let err = lower_func(&func, &PipelineConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        Error::Pass(PassError::MultipleIterators { count: 2 })
    ));
}

#[test]
fn test_validation_rejects_unlowered_function() {
    let err = ValidateLoweredPass.run(&doubled()).unwrap_err();
    assert!(matches!(err, PassError::Validation { ref detail, .. } if detail.contains("op")));
}

#[test]
fn test_validation_requires_scalarization() {
    let t = Sym::new("t", DataType::Int64);
    let op = Op::new(vec![t.clone()], range(&t, 0, 4), vec![Expr::sym(&t)]).unwrap();
    let func = Func::new("sum", Expr::reduce(sum_of(op)), vec![], SymTable::new());
    let config = PipelineConfig {
        dump_after: None,
        scalarize: false,
        validate: true,
    };
    let err = lower_func(&func, &config).unwrap_err();
    assert!(matches!(err, Error::Pass(PassError::Validation { .. })));

    // Without validation the struct-valued form still evaluates.
    let lowered = lower_func(&func, &PipelineConfig::unscalarized()).unwrap();
    assert_eq!(eval_func(&lowered, &[]).unwrap(), Value::Int(6));
}

#[test]
fn test_struct_input_rejected() {
    let x = Sym::new("x", DataType::struct_of(vec![DataType::Int64, DataType::Int64]).unwrap());
    let func = Func::new("proj", Expr::get(Expr::sym(&x), 0).unwrap(), vec![x], SymTable::new());
    let err = lower_func(&func, &PipelineConfig::default()).unwrap_err();
    assert!(matches!(err, Error::Pass(PassError::StructProjection { .. })));
}

#[test]
fn test_step_limit_aborts() {
    let lowered = lower_func(&doubled(), &PipelineConfig::default()).unwrap();
    let err = eval_func_with(&lowered, &[], &InterpConfig { max_steps: 5 }).unwrap_err();
    assert_eq!(err, iterloop::error::InterpError::StepLimit { limit: 5 });
}

#[test]
fn test_dump_after_pass_with_subscriber() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::DEBUG.into())
        .parse_lossy("iterloop=trace");
    let subscriber = FmtSubscriber::builder()
        .with_test_writer()
        .with_env_filter(env_filter)
        .finish();
    let config = PipelineConfig {
        dump_after: Some("canon".to_owned()),
        ..PipelineConfig::default()
    };
    let lowered = tracing::subscriber::with_default(subscriber, || {
        lower_func(&doubled(), &config)
    })
    .unwrap();
    assert_eq!(column(&eval_func(&lowered, &[]).unwrap(), 0).len(), 40);
}
