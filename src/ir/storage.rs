//! Columnar storage primitives.
//!
//! Storage is an external collaborator: these are opaque `Call`s the code
//! generator resolves by name. Positions are `idx`; the iterator column of
//! a one-dimensional vector is column 0.

use crate::error::IrError;
use crate::ir::expr::Expr;
use crate::ir::types::DataType;

pub const VECTOR_LEN: &str = "vector_len";
pub const VECTOR_LOOKUP: &str = "vector_lookup";
pub const VECTOR_LOCATE: &str = "vector_locate";
pub const VECTOR_IS_VALID: &str = "vector_is_valid";
pub const VECTOR_MAKE: &str = "vector_make";
pub const VECTOR_SET_LEN: &str = "vector_set_len";

fn expect_vector(ctx: &str, vec: &Expr) -> Result<(), IrError> {
    if !vec.ty().is_vector() {
        return Err(IrError::mismatch(ctx, "~[..]", vec.ty()));
    }
    Ok(())
}

fn expect_idx(ctx: &str, idx: &Expr) -> Result<(), IrError> {
    if !idx.ty().is_idx() {
        return Err(IrError::mismatch(ctx, DataType::Idx, idx.ty()));
    }
    Ok(())
}

/// Number of rows in `vec`.
pub fn vector_len(vec: Expr) -> Result<Expr, IrError> {
    expect_vector(VECTOR_LEN, &vec)?;
    Ok(Expr::call(VECTOR_LEN, DataType::Idx, vec![vec]))
}

/// Iterator value stored at position `idx`.
pub fn vector_lookup(vec: Expr, idx: Expr) -> Result<Expr, IrError> {
    let iterty = vec.ty().iterty()?;
    expect_idx(VECTOR_LOOKUP, &idx)?;
    Ok(Expr::call(VECTOR_LOOKUP, iterty, vec![vec, idx]))
}

/// Position of the first row whose iterator is not less than `iter`.
pub fn vector_locate(vec: Expr, iter: Expr) -> Result<Expr, IrError> {
    let iterty = vec.ty().iterty()?;
    if iter.ty() != &iterty {
        return Err(IrError::mismatch(VECTOR_LOCATE, iterty, iter.ty()));
    }
    Ok(Expr::call(VECTOR_LOCATE, DataType::Idx, vec![vec, iter]))
}

pub fn vector_is_valid(vec: Expr, idx: Expr, col: usize) -> Result<Expr, IrError> {
    let ncols = vec.ty().columns()?.len();
    if col >= ncols {
        return Err(IrError::ColumnOutOfRange {
            col,
            ty: vec.ty().to_string(),
        });
    }
    expect_idx(VECTOR_IS_VALID, &idx)?;
    Ok(Expr::call(
        VECTOR_IS_VALID,
        DataType::Bool,
        vec![vec, idx, Expr::idx(col as i64)],
    ))
}

/// A fresh, empty vector of type `ty` with room for `capacity` rows.
pub fn vector_make(ty: DataType, capacity: Expr) -> Result<Expr, IrError> {
    if !ty.is_vector() {
        return Err(IrError::mismatch(VECTOR_MAKE, "~[..]", &ty));
    }
    expect_idx(VECTOR_MAKE, &capacity)?;
    Ok(Expr::call(VECTOR_MAKE, ty, vec![capacity]))
}

pub fn vector_set_len(vec: Expr, len: Expr) -> Result<Expr, IrError> {
    expect_vector(VECTOR_SET_LEN, &vec)?;
    expect_idx(VECTOR_SET_LEN, &len)?;
    Ok(Expr::call(VECTOR_SET_LEN, DataType::Void, vec![vec, len]))
}
