//! Bound inference for one comparison over an iterator.
//!
//! A closed comparison (mentioning only the iterator and literals) is sent
//! to the solver: the lower bound is the `p` satisfying
//! `forall t. (t >= p -> phi) and (t < p -> not phi)`, the upper bound the
//! `p` satisfying the mirrored query. A comparison against a loop-invariant
//! expression (an input or an enclosing iterator) has no constant bound; it
//! is turned into a symbolic bound directly from its shape.

use std::rc::Rc;

use tracing::trace;

use crate::error::PassError;
use crate::ir::visit::visit_expr;
use crate::ir::{Expr, ExprKind, MathOp, Sym, SymTable};
use crate::iter::fold;
use crate::pass::rewrite::{walk_sym, RewriteCtx, Rewriter};
use crate::solver::{SolveResult, Solver};

/// Inclusive bounds inferred for an iterator. At least one side is set.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    pub lower: Option<Expr>,
    pub upper: Option<Expr>,
}

/// Substitutes every table-bound symbol by its definition, leaving inputs
/// and iterators in place.
struct Inliner {
    ctx: RewriteCtx,
}

impl Rewriter for Inliner {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn ctx(&mut self) -> &mut RewriteCtx {
        &mut self.ctx
    }

    fn visit_sym(&mut self, sym: &Sym) -> Result<Expr, PassError> {
        if self.ctx.in_tbl.contains(sym) {
            walk_sym(self, sym)
        } else {
            Ok(Expr::sym(sym))
        }
    }

    fn assign(&mut self, _sym: &Sym, val: Expr) -> Result<Expr, PassError> {
        Ok(val)
    }
}

/// `e` with its table bindings substituted, or `None` when it contains a
/// declarative node, which has no closed form.
fn inline(e: &Expr, tbl: &Rc<SymTable>) -> Result<Option<Expr>, PassError> {
    let mut inliner = Inliner {
        ctx: RewriteCtx::shared(Rc::clone(tbl)),
    };
    match inliner.eval(e) {
        Ok(inlined) => Ok(Some(inlined)),
        Err(PassError::Unsupported { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

fn free_syms(e: &Expr) -> Vec<Sym> {
    let mut out: Vec<Sym> = Vec::new();
    visit_expr(e, &mut |node: &Expr| {
        if let ExprKind::Sym(s) = node.kind() {
            if !out.contains(s) {
                out.push(s.clone());
            }
        }
    });
    out
}

fn solve_bound(iter: &Sym, phi: &Expr, solver: &dyn Solver, lower: bool) -> Result<Option<Expr>, PassError> {
    let p = iter.derive("p", iter.ty().clone());
    let t = Expr::sym(iter);
    let pe = Expr::sym(&p);
    let (inside, outside) = if lower {
        (Expr::gte(t.clone(), pe.clone())?, Expr::lt(t, pe)?)
    } else {
        (Expr::lte(t.clone(), pe.clone())?, Expr::gt(t, pe)?)
    };
    let body = Expr::and(
        Expr::implies(inside, phi.clone())?,
        Expr::implies(outside, Expr::not(phi.clone())?)?,
    )?;
    let query = Expr::forall(iter, body)?;

    match solver.solve(&query) {
        Ok(SolveResult::Sat(model)) => match model.get(&p) {
            Some(v) => Ok(Some(Expr::int(iter.ty().clone(), v)?)),
            None => Ok(None),
        },
        Ok(SolveResult::Unsat) => Ok(None),
        Err(err) => {
            trace!(solver = solver.name(), %err, "bound query rejected");
            Ok(None)
        }
    }
}

/// Reads `t op e` (or `e op t`) with `e` free of `t` as a bound on `t`.
fn syntactic_bound(iter: &Sym, cmp: &Expr, tbl: &Rc<SymTable>) -> Result<Option<Bounds>, PassError> {
    let ExprKind::Nary { op, args } = cmp.kind() else {
        return Ok(None);
    };
    let (Some(lhs), Some(rhs)) = (inline(&args[0], tbl)?, inline(&args[1], tbl)?) else {
        return Ok(None);
    };
    let is_t = |e: &Expr| e.as_sym() == Some(iter);
    let free_of_t = |e: &Expr| !free_syms(e).contains(iter);

    let (op, other) = if is_t(&lhs) && free_of_t(&rhs) {
        (*op, args[1].clone())
    } else if is_t(&rhs) && free_of_t(&lhs) {
        (op.flip(), args[0].clone())
    } else {
        return Ok(None);
    };

    // `t < MIN` and `t > MAX` have no representable bound.
    let bounds = match op {
        MathOp::Lt => match fold::pred(other)? {
            Some(ub) => Bounds {
                lower: None,
                upper: Some(ub),
            },
            None => return Ok(None),
        },
        MathOp::Lte => Bounds {
            lower: None,
            upper: Some(other),
        },
        MathOp::Gt => match fold::succ(other)? {
            Some(lb) => Bounds {
                lower: Some(lb),
                upper: None,
            },
            None => return Ok(None),
        },
        MathOp::Gte => Bounds {
            lower: Some(other),
            upper: None,
        },
        MathOp::Eq => Bounds {
            lower: Some(other.clone()),
            upper: Some(other),
        },
        _ => return Ok(None),
    };
    Ok(Some(bounds))
}

/// Infers bounds on `iter` from the comparison `cmp`. Returns `None` when
/// neither the solver nor the comparison's shape yields one; the caller then
/// keeps `cmp` as a row filter.
pub fn infer_bounds(
    iter: &Sym,
    cmp: &Expr,
    tbl: &Rc<SymTable>,
    solver: &dyn Solver,
) -> Result<Option<Bounds>, PassError> {
    if !iter.ty().is_integral() {
        return Ok(None);
    }

    if let Some(phi) = inline(cmp, tbl)? {
        let closed = free_syms(&phi).iter().all(|s| s == iter);
        if closed {
            if let Some(lb) = solve_bound(iter, &phi, solver, true)? {
                trace!(iter = %iter, lower = %lb, "solver bound");
                return Ok(Some(Bounds {
                    lower: Some(lb),
                    upper: None,
                }));
            }
            if let Some(ub) = solve_bound(iter, &phi, solver, false)? {
                trace!(iter = %iter, upper = %ub, "solver bound");
                return Ok(Some(Bounds {
                    lower: None,
                    upper: Some(ub),
                }));
            }
        }
    }

    let bounds = syntactic_bound(iter, cmp, tbl)?;
    if let Some(b) = &bounds {
        trace!(
            iter = %iter,
            lower = ?b.lower.as_ref().map(|e| e.to_string()),
            upper = ?b.upper.as_ref().map(|e| e.to_string()),
            "symbolic bound"
        );
    }
    Ok(bounds)
}
