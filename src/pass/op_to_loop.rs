//! Op→Loop lowering.
//!
//! Every `Op` becomes a loop that writes its rows into a fresh output
//! vector; every `Reduce` becomes a loop that folds rows into a state cell.
//! Loop bounds come from the iteration space of the op predicate; whatever
//! part of the predicate did not become a bound is kept as the loop's body
//! condition. Element accesses turn into loads at the storage position the
//! enclosing loop is visiting.

use std::rc::Rc;

use tracing::debug;

use crate::error::PassError;
use crate::ir::storage;
use crate::ir::{DataType, Expr, ExprKind, Func, Loop, Op, Reduce, Stmt, Sym};
use crate::iter::{fold, IterSpace, SpaceBuilder};
use crate::pass::rewrite::{default_assign, eval_all, rewrite_func, RewriteCtx, Rewriter};
use crate::pass::Pass;
use crate::solver::{IntervalSolver, Solver};

/// One enclosing loop under construction.
struct Frame {
    /// Input-side iterator of the op.
    iter: Sym,
    /// Output-side iterator bound to the value at the loop index.
    iter_out: Sym,
    /// Input-side vector driving the loop, if any.
    vec: Option<Expr>,
    idx_addr: Sym,
    /// Input symbols rebound for the duration of this loop.
    scoped: Vec<Sym>,
}

/// Index-driven skeleton shared by op and reduce loops.
struct Skeleton {
    idx_addr: Sym,
    start: Expr,
    /// Number of positions the walk can visit.
    capacity: Expr,
    exit_cond: Expr,
    body_cond: Option<Expr>,
    incr: Stmt,
}

struct LoopGen<'s> {
    ctx: RewriteCtx,
    solver: &'s dyn Solver,
    frames: Vec<Frame>,
}

impl<'s> LoopGen<'s> {
    fn new(func: &Func, solver: &'s dyn Solver) -> Self {
        LoopGen {
            ctx: RewriteCtx::new(&func.tbl),
            solver,
            frames: Vec::new(),
        }
    }

    /// Computes the iteration space of `op`, pushes a frame and binds the
    /// iterator to the value at the loop index. The caller closes the frame
    /// once the loop body is built.
    fn open(&mut self, op: &Op) -> Result<Skeleton, PassError> {
        if op.iters().len() != 1 {
            return Err(PassError::MultipleIterators {
                count: op.iters().len(),
            });
        }
        let iter = op.iters()[0].clone();
        let space = SpaceBuilder::new(&iter, Rc::clone(&self.ctx.in_tbl), self.solver).build(op.pred())?;

        // Bounds and domain are loop-invariant; lower them before the
        // iterator is bound.
        let residual = space.residual.clone();
        let invariant = IterSpace {
            residual: None,
            ..space.clone()
        };
        let lowered = invariant.try_map(|e| self.eval(e))?;

        let idx_addr = Sym::new(format!("{}_idx", iter.name()), DataType::Idx.ptr());
        self.ctx.declare(&idx_addr, Expr::alloc_one(DataType::Idx)?)?;
        let idx = Expr::load(Expr::sym(&idx_addr))?;

        let start = lowered.start_idx()?.ok_or_else(|| PassError::UnboundedIteration {
            iter: iter.name().to_owned(),
            side: "lower",
        })?;
        let (exit_cond, capacity) = match lowered.end_idx()? {
            Some(end) => (Expr::gte(idx.clone(), end.clone())?, fold::sub(end, start.clone())?),
            None => {
                let last = lowered.last_idx()?.ok_or_else(|| PassError::UnboundedIteration {
                    iter: iter.name().to_owned(),
                    side: "upper",
                })?;
                // The last position is the top of the index type: the index
                // wraps below the start instead of reaching a successor.
                let outside = Expr::or(
                    Expr::lt(idx.clone(), start.clone())?,
                    Expr::gt(idx.clone(), last.clone())?,
                )?;
                let span = fold::sub(last, start.clone())?;
                let capacity = fold::succ(span)?.ok_or_else(|| {
                    PassError::unsupported(self.name(), "iteration range wider than the index type")
                })?;
                (outside, capacity)
            }
        };
        let incr = Stmt::store(Expr::sym(&idx_addr), lowered.advance(idx.clone())?)?;

        debug!(
            iter = %iter,
            start = %start,
            exit = %exit_cond,
            filtered = residual.is_some(),
            "lowering iteration"
        );

        // The residual may access the driving vector at the loop index.
        self.frames.push(Frame {
            iter: iter.clone(),
            iter_out: iter.clone(),
            vec: space.vector().cloned(),
            idx_addr: idx_addr.clone(),
            scoped: Vec::new(),
        });
        let iter_out = self.bind_scoped(&iter, lowered.idx_to_iter(idx)?)?;
        if let Some(frame) = self.frames.last_mut() {
            frame.iter_out = iter_out;
        }
        let body_cond = residual.map(|r| self.eval(&r)).transpose()?;
        Ok(Skeleton {
            idx_addr,
            start,
            capacity,
            exit_cond,
            body_cond,
            incr,
        })
    }

    /// Binds a fresh output symbol standing for `sym` until the innermost
    /// loop is closed.
    fn bind_scoped(&mut self, sym: &Sym, val: Expr) -> Result<Sym, PassError> {
        let out = Sym::typed_like(sym.name(), &val);
        self.ctx.declare(&out, val)?;
        self.ctx.map_sym(sym, Expr::sym(&out));
        if let Some(frame) = self.frames.last_mut() {
            frame.scoped.push(sym.clone());
        }
        Ok(out)
    }

    /// Pops the innermost frame and forgets every rewrite that depends on a
    /// symbol scoped to it, so a later loop over the same symbols rebuilds
    /// them.
    fn close(&mut self) -> Option<Frame> {
        let frame = self.frames.pop()?;
        let in_tbl = Rc::clone(&self.ctx.in_tbl);
        self.ctx.sym_map.retain(|sym, _| {
            if frame.scoped.contains(sym) {
                return false;
            }
            match in_tbl.get(sym) {
                Some(def) => !frame.scoped.iter().any(|s| def.mentions(s, &in_tbl)),
                None => true,
            }
        });
        Some(frame)
    }

    /// Output vector and its storage position for `vec[iter]`: the loop
    /// index when `vec` drives an enclosing loop over `iter`, a locate
    /// otherwise.
    fn position(&mut self, vec: &Expr, iter: &Expr) -> Result<(Expr, Expr), PassError> {
        let vec_out = self.eval(vec)?;
        let driving = self
            .frames
            .iter()
            .rev()
            .find(|f| iter.as_sym() == Some(&f.iter) && f.vec.as_ref() == Some(vec))
            .map(|f| f.idx_addr.clone());
        let pos = match driving {
            Some(idx_addr) => Expr::load(Expr::sym(&idx_addr))?,
            None => {
                let iter_out = self.eval(iter)?;
                storage::vector_locate(vec_out.clone(), iter_out)?
            }
        };
        Ok((vec_out, pos))
    }

    fn element_parts(&mut self, vec: &Expr, iters: &[Expr]) -> Result<(Expr, Expr), PassError> {
        if iters.len() != 1 {
            return Err(PassError::MultipleIterators { count: iters.len() });
        }
        self.position(vec, &iters[0])
    }
}

impl Rewriter for LoopGen<'_> {
    fn name(&self) -> &'static str {
        "op-to-loop"
    }

    fn ctx(&mut self) -> &mut RewriteCtx {
        &mut self.ctx
    }

    fn assign(&mut self, sym: &Sym, val: Expr) -> Result<Expr, PassError> {
        // Loop-dependent bindings are rebuilt once per loop that uses them.
        if self.ctx.out_tbl.contains(sym) {
            let fresh = Sym::typed_like(sym.name(), &val);
            self.ctx.out_tbl.bind(fresh.clone(), val)?;
            return Ok(Expr::sym(&fresh));
        }
        default_assign(self, sym, val)
    }

    fn visit_op(&mut self, op: &Op) -> Result<Expr, PassError> {
        let sk = self.open(op)?;
        let outputs = eval_all(self, op.outputs());
        let frame = self.close();
        let outputs = outputs?;
        let Some(Frame { iter, iter_out, .. }) = frame else {
            return Err(PassError::unsupported(self.name(), "unbalanced loop frames"));
        };
        if let Some(bad) = outputs.iter().find(|o| o.ty().is_struct()) {
            return Err(PassError::unsupported(
                self.name(),
                format!("struct-typed op output '{}'", bad.ty()),
            ));
        }

        let out_vec = Sym::new(format!("{}_out", iter.name()), op.ty().clone());
        self.ctx.declare(&out_vec, storage::vector_make(op.ty().clone(), sk.capacity)?)?;
        let out_idx = Sym::new(format!("{}_out_idx", iter.name()), DataType::Idx.ptr());
        self.ctx.declare(&out_idx, Expr::alloc_one(DataType::Idx)?)?;
        let row_pos = || Expr::load(Expr::sym(&out_idx));

        let mut body = Vec::with_capacity(outputs.len() + 2);
        let columns = std::iter::once(Expr::sym(&iter_out)).chain(outputs);
        for (col, val) in columns.enumerate() {
            let addr = Expr::fetch_data_ptr(Expr::sym(&out_vec), row_pos()?, col)?;
            body.push(Stmt::store(addr, val)?);
        }
        body.push(Stmt::store(Expr::sym(&out_idx), fold::add(row_pos()?, Expr::idx(1))?)?);

        let init = Stmt::seq(vec![
            Stmt::store(Expr::sym(&sk.idx_addr), sk.start)?,
            Stmt::store(Expr::sym(&out_idx), Expr::idx(0))?,
            Stmt::Eval(Expr::sym(&out_vec)),
        ]);
        let post = Stmt::Eval(storage::vector_set_len(Expr::sym(&out_vec), row_pos()?)?);

        let lp = Loop {
            init: Some(init),
            incr: Some(sk.incr),
            exit_cond: sk.exit_cond,
            body_cond: sk.body_cond,
            body: Stmt::seq(body),
            post: Some(post),
            output: Expr::sym(&out_vec),
        };
        Ok(Expr::from_loop(lp)?)
    }

    fn visit_reduce(&mut self, red: &Reduce) -> Result<Expr, PassError> {
        let state_ty = red.ty().clone();
        let init_val = self.eval(red.init())?;

        let sk = self.open(red.op())?;
        let state_addr = red.state().derive("addr", state_ty.ptr());
        self.ctx.declare(&state_addr, Expr::alloc_one(state_ty.clone())?)?;
        let next_addr = red.state().derive("next", state_ty.ptr());
        self.ctx.declare(&next_addr, Expr::alloc_one(state_ty.clone())?)?;
        self.bind_scoped(red.state(), Expr::load(Expr::sym(&state_addr))?)?;

        let body = (|| -> Result<Stmt, PassError> {
            let outputs = eval_all(self, red.op().outputs())?;
            self.bind_scoped(red.row(), Expr::new_struct(outputs)?)?;
            let acc = self.eval(red.acc())?;
            Ok(Stmt::seq(vec![
                Stmt::store(Expr::sym(&next_addr), acc)?,
                Stmt::store(Expr::sym(&state_addr), Expr::load(Expr::sym(&next_addr))?)?,
            ]))
        })();
        self.close();
        let body = body?;

        let init = Stmt::seq(vec![
            Stmt::store(Expr::sym(&sk.idx_addr), sk.start)?,
            Stmt::store(Expr::sym(&state_addr), init_val)?,
            Stmt::Eval(Expr::sym(&next_addr)),
        ]);
        let lp = Loop {
            init: Some(init),
            incr: Some(sk.incr),
            exit_cond: sk.exit_cond,
            body_cond: sk.body_cond,
            body,
            post: None,
            output: Expr::sym(&state_addr),
        };
        let loop_sym = red.state().derive("loop", state_ty.ptr());
        self.ctx.declare(&loop_sym, Expr::from_loop(lp)?)?;
        Ok(Expr::load(Expr::sym(&loop_sym))?)
    }

    fn visit_element(&mut self, vec: &Expr, iters: &[Expr]) -> Result<Expr, PassError> {
        let (vec_out, pos) = self.element_parts(vec, iters)?;
        let ty = vec.ty().clone();
        let cols = ty.columns()?;
        let mut fields = Vec::with_capacity(cols.len() - ty.dim());
        for col in ty.dim()..cols.len() {
            let addr = Expr::fetch_data_ptr(vec_out.clone(), pos.clone(), col)?;
            fields.push(Expr::load(addr)?);
        }
        Ok(Expr::new_struct(fields)?)
    }

    fn visit_not_null(&mut self, elem: &Expr) -> Result<Expr, PassError> {
        let ExprKind::Element { vec, iters } = elem.kind() else {
            return Err(PassError::unsupported(self.name(), "notnull over a non-element"));
        };
        let (vec_out, pos) = self.element_parts(vec, iters)?;
        let ty = vec.ty().clone();
        let mut cond = None;
        for col in ty.dim()..ty.columns()?.len() {
            let valid = storage::vector_is_valid(vec_out.clone(), pos.clone(), col)?;
            cond = fold::and_opt(cond, Some(valid))?;
        }
        Ok(cond.unwrap_or_else(|| Expr::bool(true)))
    }

    fn visit_in(&mut self, iter: &Expr, vec: &Expr) -> Result<Expr, PassError> {
        let vec_out = self.eval(vec)?;
        let iter_out = self.eval(iter)?;
        let pos = storage::vector_locate(vec_out.clone(), iter_out.clone())?;
        let in_range = Expr::lt(pos.clone(), storage::vector_len(vec_out.clone())?)?;
        let found = Expr::eq(storage::vector_lookup(vec_out, pos)?, iter_out)?;
        Ok(Expr::select(in_range, found, Expr::bool(false))?)
    }
}

/// Lowers every `Op` and `Reduce` of a function into loops.
pub struct OpToLoopPass {
    solver: Box<dyn Solver>,
}

impl OpToLoopPass {
    pub fn new() -> Self {
        Self::with_solver(IntervalSolver::new())
    }

    pub fn with_solver(solver: impl Solver + 'static) -> Self {
        OpToLoopPass {
            solver: Box::new(solver),
        }
    }
}

impl Default for OpToLoopPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for OpToLoopPass {
    fn name(&self) -> &'static str {
        "op-to-loop"
    }

    fn run(&mut self, func: &Func) -> Result<Func, PassError> {
        let mut gen = LoopGen::new(func, self.solver.as_ref());
        rewrite_func(&mut gen, func)
    }
}
