//! Tests that construct IR through the checked constructors.
//! These verify typing rules and structural invariants without lowering.

use iterloop::error::IrError;
use iterloop::ir::{DataType, Expr, Func, Op, Reduce, Sym, SymTable};

fn rows_ty() -> DataType {
    DataType::vector(vec![DataType::Int64, DataType::Float64], 1).unwrap()
}

#[test]
fn test_vector_type_views() {
    let ty = rows_ty();
    assert_eq!(ty.dim(), 1);
    assert_eq!(ty.iterty().unwrap(), DataType::Int64);
    assert_eq!(
        ty.valty().unwrap(),
        DataType::Struct(vec![DataType::Float64])
    );
    assert_eq!(ty.to_string(), "~[i64; f64]");
}

#[test]
fn test_invalid_types_rejected() {
    assert!(matches!(
        DataType::struct_of(vec![]),
        Err(IrError::InvalidType { .. })
    ));
    assert!(matches!(
        DataType::vector(vec![DataType::Int64], 2),
        Err(IrError::InvalidType { .. })
    ));
    let inner = rows_ty();
    assert!(DataType::vector(vec![DataType::Int64, inner], 1).is_err());
}

#[test]
fn test_arithmetic_requires_matching_types() {
    let err = Expr::add(Expr::i64(1), Expr::i32(1)).unwrap_err();
    assert!(matches!(err, IrError::TypeMismatch { .. }));
    let sum = Expr::add(Expr::i64(1), Expr::i64(2)).unwrap();
    assert_eq!(sum.ty(), &DataType::Int64);
    assert_eq!(sum.to_string(), "add(1, 2)");
}

#[test]
fn test_comparison_is_bool() {
    let t = Sym::new("t", DataType::Int64);
    let c = Expr::lt(Expr::sym(&t), Expr::i64(50)).unwrap();
    assert_eq!(c.ty(), &DataType::Bool);
    assert!(Expr::and(c.clone(), Expr::i64(1)).is_err());
}

#[test]
fn test_get_and_new() {
    let s = Expr::new_struct(vec![Expr::i64(1), Expr::bool(true)]).unwrap();
    assert_eq!(Expr::get(s.clone(), 1).unwrap().ty(), &DataType::Bool);
    assert!(matches!(
        Expr::get(s, 2),
        Err(IrError::ColumnOutOfRange { col: 2, .. })
    ));
    // A primitive is its own single field.
    assert_eq!(Expr::get(Expr::i64(3), 0).unwrap().ty(), &DataType::Int64);
    assert!(Expr::get(Expr::i64(3), 1).is_err());
}

#[test]
fn test_element_and_membership() {
    let v = Sym::new("v", rows_ty());
    let t = Sym::new("t", DataType::Int64);
    let e = Expr::element(Expr::sym(&v), vec![Expr::sym(&t)]).unwrap();
    assert_eq!(e.ty(), &DataType::Struct(vec![DataType::Float64]));
    assert!(Expr::not_null(e).is_ok());
    assert!(Expr::not_null(Expr::sym(&t)).is_err());

    let wrong = Sym::new("u", DataType::Int32);
    assert!(Expr::in_vec(Expr::sym(&wrong), Expr::sym(&v)).is_err());
    assert!(Expr::in_vec(Expr::sym(&t), Expr::sym(&v)).is_ok());
}

#[test]
fn test_op_type() {
    let t = Sym::new("t", DataType::Int64);
    let pred = Expr::lt(Expr::sym(&t), Expr::i64(10)).unwrap();
    let out = Expr::mul(Expr::sym(&t), Expr::f64(0.5));
    assert!(out.is_err());

    let op = Op::new(vec![t.clone()], pred.clone(), vec![Expr::bool(true)]).unwrap();
    assert_eq!(
        op.ty(),
        &DataType::vector(vec![DataType::Int64, DataType::Bool], 1).unwrap()
    );
    assert!(Op::new(vec![], pred, vec![]).is_err());
    assert!(Op::new(vec![t], Expr::i64(1), vec![]).is_err());
}

#[test]
fn test_reduce_state_type_is_stable() {
    let t = Sym::new("t", DataType::Int64);
    let pred = Expr::lt(Expr::sym(&t), Expr::i64(10)).unwrap();
    let op = Op::new(vec![t.clone()], pred, vec![Expr::sym(&t)]).unwrap();

    let ok = Reduce::new(
        op.clone(),
        || Ok(Expr::i64(0)),
        |s, row| Expr::add(s, Expr::get(row, 0)?),
    )
    .unwrap();
    assert_eq!(ok.ty(), &DataType::Int64);
    assert_eq!(
        ok.row().ty(),
        &DataType::Struct(vec![DataType::Int64])
    );

    let err = Reduce::new(op, || Ok(Expr::i64(0)), |_, _| Ok(Expr::bool(true))).unwrap_err();
    assert!(matches!(err, IrError::TypeMismatch { .. }));
}

#[test]
fn test_alloc_load_store_typing() {
    let addr = Expr::alloc_one(DataType::Int64).unwrap();
    assert_eq!(addr.ty(), &DataType::Int64.ptr());
    assert_eq!(Expr::load(addr.clone()).unwrap().ty(), &DataType::Int64);
    assert!(Expr::load(Expr::i64(0)).is_err());
    assert!(iterloop::ir::Stmt::store(addr.clone(), Expr::i32(1)).is_err());
    assert!(iterloop::ir::Stmt::store(addr, Expr::i64(1)).is_ok());
}

#[test]
fn test_func_check_finds_unbound_symbols() {
    let x = Sym::new("x", DataType::Int64);
    let y = Sym::new("y", DataType::Int64);
    let out = Expr::add(Expr::sym(&x), Expr::sym(&y)).unwrap();
    let f = Func::new("f", out, vec![x.clone()], SymTable::new());
    assert!(matches!(f.check(), Err(IrError::UnboundSymbol { name }) if name == "y"));

    let mut tbl = SymTable::new();
    tbl.bind(y.clone(), Expr::i64(2)).unwrap();
    assert!(matches!(
        tbl.bind(y.clone(), Expr::i64(3)),
        Err(IrError::DuplicateBinding { .. })
    ));
    let f = Func::new("f", Expr::add(Expr::sym(&x), Expr::sym(&y)).unwrap(), vec![x], tbl);
    assert!(f.check().is_ok());
}

#[test]
fn test_symbols_are_identities() {
    let a = Sym::new("t", DataType::Int64);
    let b = Sym::new("t", DataType::Int64);
    assert_ne!(a, b);
    assert_eq!(a, a.clone());
}
