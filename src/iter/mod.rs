//! Iteration spaces.
//!
//! An [`IterSpace`] describes the values an `Op` iterator takes: a domain
//! (free integers or the rows of a vector), optional inclusive bounds, and a
//! residual condition every produced row must still satisfy. Spaces are
//! built bottom-up over the op predicate and combined with
//! [`IterSpace::intersect`] and [`IterSpace::union`].
//!
//! Every expression held by a space is written against the *input*
//! function: the iterator symbol and the vectors of the op being lowered.

pub mod bounds;
pub mod fold;

use std::rc::Rc;

use tracing::trace;

use crate::error::{IrError, PassError};
use crate::ir::storage;
use crate::ir::{ConstVal, DataType, Expr, ExprKind, MathOp, Sym, SymTable};
use crate::pass::rewrite::SymMemo;
use crate::solver::Solver;

pub use bounds::{infer_bounds, Bounds};

#[derive(Debug, Clone, PartialEq)]
pub enum Domain {
    /// Any value of the iterator type.
    Free,
    /// The iterator values stored in a one-dimensional vector.
    Vector(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IterSpace {
    pub iter: Sym,
    pub domain: Domain,
    pub lower: Option<Expr>,
    pub upper: Option<Expr>,
    pub residual: Option<Expr>,
}

impl IterSpace {
    /// Every value of the iterator type, unbounded.
    pub fn free(iter: &Sym) -> Self {
        IterSpace {
            iter: iter.clone(),
            domain: Domain::Free,
            lower: None,
            upper: None,
            residual: None,
        }
    }

    /// The iterator values of `vec`. The vector's own extent is implicit:
    /// absent bounds mean its first and last row.
    pub fn over_vector(iter: &Sym, vec: Expr) -> Result<Self, IrError> {
        if vec.ty().dim() != 1 {
            return Err(IrError::operand(
                "iteration domain",
                format!("'{}' is not a one-dimensional vector", vec.ty()),
            ));
        }
        let iterty = vec.ty().iterty()?;
        if &iterty != iter.ty() {
            return Err(IrError::mismatch("iteration domain", iter.ty(), iterty));
        }
        Ok(IterSpace {
            iter: iter.clone(),
            domain: Domain::Vector(vec),
            lower: None,
            upper: None,
            residual: None,
        })
    }

    /// A free space that only filters rows.
    pub fn filter(iter: &Sym, cond: Expr) -> Self {
        let mut s = IterSpace::free(iter);
        s.residual = Some(cond);
        s
    }

    pub fn bounded(iter: &Sym, lower: Option<Expr>, upper: Option<Expr>) -> Self {
        let mut s = IterSpace::free(iter);
        s.lower = lower;
        s.upper = upper;
        s
    }

    pub fn vector(&self) -> Option<&Expr> {
        match &self.domain {
            Domain::Vector(v) => Some(v),
            Domain::Free => None,
        }
    }

    pub fn iter_ty(&self) -> &DataType {
        self.iter.ty()
    }

    /// Iterator value at storage position `idx`.
    pub fn idx_to_iter(&self, idx: Expr) -> Result<Expr, IrError> {
        match &self.domain {
            Domain::Free => fold::cast(self.iter_ty().clone(), idx),
            Domain::Vector(v) => storage::vector_lookup(v.clone(), idx),
        }
    }

    /// Storage position of the first value not below `iter`.
    pub fn iter_to_idx(&self, iter: Expr) -> Result<Expr, IrError> {
        match &self.domain {
            Domain::Free => fold::cast(DataType::Idx, iter),
            Domain::Vector(v) => storage::vector_locate(v.clone(), iter),
        }
    }

    pub fn advance(&self, idx: Expr) -> Result<Expr, IrError> {
        fold::add(idx, Expr::idx(1))
    }

    /// First position to visit, or `None` when the space has no lower end.
    pub fn start_idx(&self) -> Result<Option<Expr>, IrError> {
        match (&self.lower, &self.domain) {
            (Some(lb), _) => Ok(Some(self.iter_to_idx(lb.clone())?)),
            (None, Domain::Vector(_)) => Ok(Some(Expr::idx(0))),
            (None, Domain::Free) => Ok(None),
        }
    }

    /// One past the last position to visit, or `None` when the space has no
    /// upper end or that position is not representable (an upper bound at
    /// the top of the iterator type); [`IterSpace::last_idx`] covers the
    /// latter.
    pub fn end_idx(&self) -> Result<Option<Expr>, IrError> {
        match (&self.upper, &self.domain) {
            (Some(ub), Domain::Vector(v)) => Ok(Some(past_position(v, ub.clone())?)),
            (Some(ub), Domain::Free) => match fold::succ(ub.clone())? {
                Some(next) => Ok(Some(self.iter_to_idx(next)?)),
                None => Ok(None),
            },
            (None, Domain::Vector(v)) => Ok(Some(storage::vector_len(v.clone())?)),
            (None, Domain::Free) => Ok(None),
        }
    }

    /// Last position to visit, inclusive, for a free space with an upper
    /// bound.
    pub fn last_idx(&self) -> Result<Option<Expr>, IrError> {
        match (&self.upper, &self.domain) {
            (Some(ub), Domain::Free) => Ok(Some(self.iter_to_idx(ub.clone())?)),
            _ => Ok(None),
        }
    }

    /// Whether the iterator value occurs in `vec`.
    fn membership(&self, vec: &Expr) -> Result<Expr, IrError> {
        let t = Expr::sym(&self.iter);
        let pos = storage::vector_locate(vec.clone(), t.clone())?;
        let in_range = Expr::lt(pos.clone(), storage::vector_len(vec.clone())?)?;
        let found = Expr::eq(storage::vector_lookup(vec.clone(), pos)?, t)?;
        Expr::select(in_range, found, Expr::bool(false))
    }

    /// The full membership condition of this space as a predicate on the
    /// iterator: bounds, domain and residual.
    pub fn condition(&self) -> Result<Option<Expr>, IrError> {
        let t = Expr::sym(&self.iter);
        let mut cond = None;
        if let Some(lb) = &self.lower {
            cond = fold::and_opt(cond, Some(Expr::lte(lb.clone(), t.clone())?))?;
        }
        if let Some(ub) = &self.upper {
            cond = fold::and_opt(cond, Some(Expr::lte(t.clone(), ub.clone())?))?;
        }
        if let Domain::Vector(v) = &self.domain {
            cond = fold::and_opt(cond, Some(self.membership(v)?))?;
        }
        fold::and_opt(cond, self.residual.clone())
    }

    /// Rows in both spaces. A vector domain drives the result; when both
    /// sides are vectors the left one drives, the right one is looked up, and
    /// the looked-up vector's first and last values bound the walk.
    pub fn intersect(self, other: IterSpace) -> Result<IterSpace, PassError> {
        let swap = self.vector().is_none() && other.vector().is_some();
        let (drive, inner) = if swap { (other, self) } else { (self, other) };
        let mut residual = fold::and_opt(drive.residual.clone(), inner.residual.clone())?;
        let (mut lower, mut upper) = (inner.lower.clone(), inner.upper.clone());
        if let Domain::Vector(v) = &inner.domain {
            let m = vector_membership(&drive.iter, v)?;
            residual = fold::and_opt(residual, Some(m))?;
            lower = Some(extent_bound(&inner, BoundSide::Lower)?);
            upper = Some(extent_bound(&inner, BoundSide::Upper)?);
        }
        Ok(IterSpace {
            iter: drive.iter,
            domain: drive.domain,
            lower: fold::max_opt(drive.lower, lower)?,
            upper: fold::min_opt(drive.upper, upper)?,
            residual,
        })
    }

    /// Rows in either space. The result is free: each side's full condition
    /// becomes a disjunct of the residual so no row of either is lost.
    pub fn union(self, other: IterSpace) -> Result<IterSpace, PassError> {
        if self.vector().is_some() && other.vector().is_some() {
            return Err(PassError::unsupported("iteration space", "union of two vector domains"));
        }
        let lower = union_bound(&self, &other, BoundSide::Lower)?;
        let upper = union_bound(&self, &other, BoundSide::Upper)?;
        let residual = match (self.condition()?, other.condition()?) {
            (Some(l), Some(r)) => Some(fold::or(l, r)?),
            _ => None,
        };
        Ok(IterSpace {
            iter: self.iter,
            domain: Domain::Free,
            lower,
            upper,
            residual,
        })
    }

    /// Applies `f` to every expression of the space.
    pub fn try_map<E>(&self, mut f: impl FnMut(&Expr) -> Result<Expr, E>) -> Result<IterSpace, E> {
        let domain = match &self.domain {
            Domain::Free => Domain::Free,
            Domain::Vector(v) => Domain::Vector(f(v)?),
        };
        let lower = self.lower.as_ref().map(&mut f).transpose()?;
        let upper = self.upper.as_ref().map(&mut f).transpose()?;
        let residual = self.residual.as_ref().map(&mut f).transpose()?;
        Ok(IterSpace {
            iter: self.iter.clone(),
            domain,
            lower,
            upper,
            residual,
        })
    }
}

fn vector_membership(iter: &Sym, vec: &Expr) -> Result<Expr, IrError> {
    IterSpace::over_vector(iter, vec.clone())?.membership(vec)
}

/// Position of the first row of `v` whose iterator value exceeds `ub`.
fn past_position(v: &Expr, ub: Expr) -> Result<Expr, IrError> {
    if ub.as_int().is_some() {
        return match fold::succ(ub)? {
            Some(next) => storage::vector_locate(v.clone(), next),
            None => storage::vector_len(v.clone()),
        };
    }
    // `locate(v, ub + 1)` would wrap when `ub` is the type maximum.
    let pos = storage::vector_locate(v.clone(), ub.clone())?;
    let len = storage::vector_len(v.clone())?;
    let found = Expr::eq(storage::vector_lookup(v.clone(), pos.clone())?, ub)?;
    let hit = Expr::select(Expr::lt(pos.clone(), len)?, found, Expr::bool(false))?;
    Expr::select(hit, fold::add(pos.clone(), Expr::idx(1))?, pos)
}

#[derive(Clone, Copy, PartialEq)]
enum BoundSide {
    Lower,
    Upper,
}

/// Bound of a space on one side as a single expression: the effective
/// bound, or for an empty vector a value past the other end so the walk is
/// empty. Without any bound the type extreme leaves the side open.
fn extent_bound(s: &IterSpace, side: BoundSide) -> Result<Expr, IrError> {
    let (open, empty) = match side {
        BoundSide::Lower => (fold::type_min(s.iter_ty())?, fold::type_max(s.iter_ty())?),
        BoundSide::Upper => (fold::type_max(s.iter_ty())?, fold::type_min(s.iter_ty())?),
    };
    Ok(match effective_bound(s, side)? {
        Some((value, Some(guard))) => Expr::select(guard, value, empty)?,
        Some((value, None)) => value,
        None => open,
    })
}

/// Effective bound of one side of a union, with the guard under which it is
/// defined (a vector's first/last row exists only when it is non-empty).
fn effective_bound(s: &IterSpace, side: BoundSide) -> Result<Option<(Expr, Option<Expr>)>, IrError> {
    let explicit = match side {
        BoundSide::Lower => &s.lower,
        BoundSide::Upper => &s.upper,
    };
    if let Some(b) = explicit {
        return Ok(Some((b.clone(), None)));
    }
    let Some(v) = s.vector() else {
        return Ok(None);
    };
    let len = storage::vector_len(v.clone())?;
    let pos = match side {
        BoundSide::Lower => Expr::idx(0),
        BoundSide::Upper => Expr::sub(len.clone(), Expr::idx(1))?,
    };
    let value = storage::vector_lookup(v.clone(), pos)?;
    let guard = Expr::gt(len, Expr::idx(0))?;
    Ok(Some((value, Some(guard))))
}

fn union_bound(l: &IterSpace, r: &IterSpace, side: BoundSide) -> Result<Option<Expr>, IrError> {
    let (Some((lv, lg)), Some((rv, rg))) = (effective_bound(l, side)?, effective_bound(r, side)?) else {
        return Ok(None);
    };
    let combine = |a: Expr, b: Expr| match side {
        BoundSide::Lower => fold::min(a, b),
        BoundSide::Upper => fold::max(a, b),
    };
    let both = combine(lv.clone(), rv.clone())?;
    Ok(Some(match (lg, rg) {
        (Some(g), None) => Expr::select(g, both, rv)?,
        (None, Some(g)) => Expr::select(g, both, lv)?,
        _ => both,
    }))
}

/// Builds the iteration space of one iterator from an op predicate.
pub struct SpaceBuilder<'s> {
    iter: Sym,
    tbl: Rc<SymTable>,
    solver: &'s dyn Solver,
    memo: SymMemo<IterSpace>,
}

impl<'s> SpaceBuilder<'s> {
    pub fn new(iter: &Sym, tbl: Rc<SymTable>, solver: &'s dyn Solver) -> Self {
        SpaceBuilder {
            iter: iter.clone(),
            tbl,
            solver,
            memo: SymMemo::new(),
        }
    }

    pub fn build(mut self, pred: &Expr) -> Result<IterSpace, PassError> {
        let space = self.eval(pred)?;
        trace!(
            iter = %self.iter,
            lower = ?space.lower.as_ref().map(|e| e.to_string()),
            upper = ?space.upper.as_ref().map(|e| e.to_string()),
            residual = space.residual.is_some(),
            "built iteration space"
        );
        Ok(space)
    }

    fn is_iter(&self, e: &Expr) -> bool {
        e.as_sym() == Some(&self.iter)
    }

    fn eval(&mut self, pred: &Expr) -> Result<IterSpace, PassError> {
        match pred.kind() {
            ExprKind::Sym(s) => {
                if let Some(space) = self.memo.get(s) {
                    return Ok(space.clone());
                }
                let tbl = Rc::clone(&self.tbl);
                match tbl.get(s) {
                    Some(bound) => {
                        let space = self.eval(bound)?;
                        self.memo.insert(s, space.clone());
                        Ok(space)
                    }
                    None => Ok(IterSpace::filter(&self.iter, pred.clone())),
                }
            }
            ExprKind::Const(ConstVal::Bool(true)) => Ok(IterSpace::free(&self.iter)),
            ExprKind::Nary { op: MathOp::And, args } => {
                let l = self.eval(&args[0])?;
                let r = self.eval(&args[1])?;
                l.intersect(r)
            }
            ExprKind::Nary { op: MathOp::Or, args } => {
                let l = self.eval(&args[0])?;
                let r = self.eval(&args[1])?;
                l.union(r)
            }
            ExprKind::Nary { op, .. } if op.is_comparison() => {
                if !pred.mentions(&self.iter, &self.tbl) {
                    return Ok(IterSpace::filter(&self.iter, pred.clone()));
                }
                match infer_bounds(&self.iter, pred, &self.tbl, self.solver)? {
                    Some(b) => Ok(IterSpace::bounded(&self.iter, b.lower, b.upper)),
                    None => Ok(IterSpace::filter(&self.iter, pred.clone())),
                }
            }
            ExprKind::In { iter, vec } if self.is_iter(iter) => {
                Ok(IterSpace::over_vector(&self.iter, (**vec).clone())?)
            }
            ExprKind::NotNull(elem) => match elem.kind() {
                ExprKind::Element { vec, iters } if iters.len() == 1 && self.is_iter(&iters[0]) => {
                    let mut s = IterSpace::over_vector(&self.iter, (**vec).clone())?;
                    s.residual = Some(pred.clone());
                    Ok(s)
                }
                _ => Ok(IterSpace::filter(&self.iter, pred.clone())),
            },
            _ => Ok(IterSpace::filter(&self.iter, pred.clone())),
        }
    }
}
