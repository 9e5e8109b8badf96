//! Constant-folding constructors for bound arithmetic.
//!
//! Each helper builds the same node as its `Expr` counterpart but evaluates
//! it when the operands are literals, so `max(0, 10)` is `10` and
//! `(idx)(49 + 1)` is `50`.

use crate::error::IrError;
use crate::ir::{ConstVal, DataType, Expr};

/// Literal value on the integer line. `UInt64` literals are stored as their
/// bit pattern and read back unsigned.
fn wide(e: &Expr) -> Option<i128> {
    let v = e.as_int()?;
    Some(match e.ty() {
        DataType::UInt64 => v as u64 as i128,
        _ => v as i128,
    })
}

fn wides(a: &Expr, b: &Expr) -> Option<(i128, i128)> {
    Some((wide(a)?, wide(b)?))
}

/// Inclusive value range of an integral type.
fn range(ty: &DataType) -> (i128, i128) {
    match ty {
        DataType::Int8 => (i8::MIN as i128, i8::MAX as i128),
        DataType::Int16 => (i16::MIN as i128, i16::MAX as i128),
        DataType::Int32 => (i32::MIN as i128, i32::MAX as i128),
        DataType::UInt8 => (0, u8::MAX as i128),
        DataType::UInt16 => (0, u16::MAX as i128),
        DataType::UInt32 => (0, u32::MAX as i128),
        DataType::UInt64 => (0, u64::MAX as i128),
        _ => (i64::MIN as i128, i64::MAX as i128),
    }
}

/// Literal `v` of type `ty`, or `None` when `ty` cannot represent it.
fn literal(ty: &DataType, v: i128) -> Result<Option<Expr>, IrError> {
    let (lo, hi) = range(ty);
    if v < lo || v > hi {
        return Ok(None);
    }
    Expr::int(ty.clone(), v as i64).map(Some)
}

/// Smallest value of an integral type.
pub fn type_min(ty: &DataType) -> Result<Expr, IrError> {
    Expr::int(ty.clone(), range(ty).0 as i64)
}

/// Largest value of an integral type.
pub fn type_max(ty: &DataType) -> Result<Expr, IrError> {
    Expr::int(ty.clone(), range(ty).1 as i64)
}

/// `a + b`, folded when both are literals and the sum is representable.
pub fn add(a: Expr, b: Expr) -> Result<Expr, IrError> {
    if let Some((x, y)) = wides(&a, &b) {
        if let Some(sum) = literal(a.ty(), x + y)? {
            return Ok(sum);
        }
    }
    if b.as_int() == Some(0) {
        return Ok(a);
    }
    Expr::add(a, b)
}

pub fn sub(a: Expr, b: Expr) -> Result<Expr, IrError> {
    if let Some((x, y)) = wides(&a, &b) {
        if let Some(diff) = literal(a.ty(), x - y)? {
            return Ok(diff);
        }
    }
    if b.as_int() == Some(0) {
        return Ok(a);
    }
    Expr::sub(a, b)
}

pub fn max(a: Expr, b: Expr) -> Result<Expr, IrError> {
    if let Some((x, y)) = wides(&a, &b) {
        return Ok(if x >= y { a } else { b });
    }
    if a == b {
        return Ok(a);
    }
    Expr::max(a, b)
}

pub fn min(a: Expr, b: Expr) -> Result<Expr, IrError> {
    if let Some((x, y)) = wides(&a, &b) {
        return Ok(if x <= y { a } else { b });
    }
    if a == b {
        return Ok(a);
    }
    Expr::min(a, b)
}

/// `a + 1` in the type of `a`. `None` when `a` is the largest literal of
/// its type.
pub fn succ(a: Expr) -> Result<Option<Expr>, IrError> {
    if let Some(x) = wide(&a) {
        return literal(a.ty(), x + 1);
    }
    let one = Expr::int(a.ty().clone(), 1)?;
    add(a, one).map(Some)
}

/// `a - 1` in the type of `a`. `None` when `a` is the smallest literal of
/// its type.
pub fn pred(a: Expr) -> Result<Option<Expr>, IrError> {
    if let Some(x) = wide(&a) {
        return literal(a.ty(), x - 1);
    }
    let one = Expr::int(a.ty().clone(), 1)?;
    sub(a, one).map(Some)
}

pub fn cast(ty: DataType, a: Expr) -> Result<Expr, IrError> {
    if a.ty() == &ty {
        return Ok(a);
    }
    match a.as_const() {
        Some(ConstVal::Int(v)) if ty.is_integral() => Expr::int(ty, v),
        _ => Expr::cast(ty, a),
    }
}

pub fn and(a: Expr, b: Expr) -> Result<Expr, IrError> {
    match (a.as_const(), b.as_const()) {
        (Some(ConstVal::Bool(true)), _) => Ok(b),
        (_, Some(ConstVal::Bool(true))) => Ok(a),
        (Some(ConstVal::Bool(false)), _) | (_, Some(ConstVal::Bool(false))) => Ok(Expr::bool(false)),
        _ => Expr::and(a, b),
    }
}

pub fn or(a: Expr, b: Expr) -> Result<Expr, IrError> {
    match (a.as_const(), b.as_const()) {
        (Some(ConstVal::Bool(false)), _) => Ok(b),
        (_, Some(ConstVal::Bool(false))) => Ok(a),
        (Some(ConstVal::Bool(true)), _) | (_, Some(ConstVal::Bool(true))) => Ok(Expr::bool(true)),
        _ => Expr::or(a, b),
    }
}

/// Conjunction of optional conditions; `None` reads as `true`.
pub fn and_opt(a: Option<Expr>, b: Option<Expr>) -> Result<Option<Expr>, IrError> {
    Ok(match (a, b) {
        (Some(a), Some(b)) => Some(and(a, b)?),
        (a, None) => a,
        (None, b) => b,
    })
}

/// Tightest of two optional lower bounds; `None` reads as unbounded.
pub fn max_opt(a: Option<Expr>, b: Option<Expr>) -> Result<Option<Expr>, IrError> {
    Ok(match (a, b) {
        (Some(a), Some(b)) => Some(max(a, b)?),
        (a, None) => a,
        (None, b) => b,
    })
}

/// Tightest of two optional upper bounds; `None` reads as unbounded.
pub fn min_opt(a: Option<Expr>, b: Option<Expr>) -> Result<Option<Expr>, IrError> {
    Ok(match (a, b) {
        (Some(a), Some(b)) => Some(min(a, b)?),
        (a, None) => a,
        (None, b) => b,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_literals() {
        assert_eq!(max(Expr::i64(0), Expr::i64(10)).unwrap(), Expr::i64(10));
        assert_eq!(min(Expr::i64(99), Expr::i64(49)).unwrap(), Expr::i64(49));
        let next = succ(Expr::i64(49)).unwrap().unwrap();
        assert_eq!(cast(DataType::Idx, next).unwrap(), Expr::idx(50));
    }

    #[test]
    fn successor_of_type_maximum_is_absent() {
        assert_eq!(succ(Expr::i64(i64::MAX)).unwrap(), None);
        assert_eq!(pred(Expr::i64(i64::MIN)).unwrap(), None);
        assert_eq!(succ(Expr::i32(i32::MAX)).unwrap(), None);
        assert_eq!(succ(Expr::i64(i64::MAX - 1)).unwrap(), Some(Expr::i64(i64::MAX)));
        // An overflowing sum is kept as a node instead of wrapping.
        let sum = add(Expr::i64(i64::MAX), Expr::i64(1)).unwrap();
        assert!(sum.as_int().is_none());
    }

    #[test]
    fn unsigned_literals_order_above_signed_range() {
        let big = Expr::int(DataType::UInt64, -1).unwrap();
        let small = Expr::int(DataType::UInt64, 5).unwrap();
        assert_eq!(max(big.clone(), small.clone()).unwrap(), big);
        assert_eq!(min(big, small.clone()).unwrap(), small);
    }

    #[test]
    fn boolean_identities() {
        let c = Expr::lt(Expr::i64(1), Expr::i64(2)).unwrap();
        assert_eq!(and(Expr::bool(true), c.clone()).unwrap(), c);
        assert_eq!(or(c, Expr::bool(true)).unwrap(), Expr::bool(true));
    }
}
