use crate::error::PassError;
use crate::ir::{Expr, Func, Op, Reduce, Sym};
use crate::pass::rewrite::{eval_all, rewrite_func, RewriteCtx, Rewriter};
use crate::pass::Pass;

/// Identity rewrite. Keeps only the bindings reachable from the output.
struct Cloner {
    ctx: RewriteCtx,
}

impl Cloner {
    fn rebuild_op(&mut self, op: &Op) -> Result<Op, PassError> {
        for it in op.iters() {
            self.ctx.map_sym(it, Expr::sym(it));
        }
        let pred = self.eval(op.pred())?;
        let outputs = eval_all(self, op.outputs())?;
        Ok(Op::new(op.iters().to_vec(), pred, outputs)?)
    }

    fn bind_local(&mut self, sym: &Sym) {
        self.ctx.map_sym(sym, Expr::sym(sym));
    }
}

impl Rewriter for Cloner {
    fn name(&self) -> &'static str {
        "clone"
    }

    fn ctx(&mut self) -> &mut RewriteCtx {
        &mut self.ctx
    }

    fn visit_op(&mut self, op: &Op) -> Result<Expr, PassError> {
        Ok(Expr::op(self.rebuild_op(op)?))
    }

    fn visit_reduce(&mut self, red: &Reduce) -> Result<Expr, PassError> {
        let op = self.rebuild_op(red.op())?;
        let init = self.eval(red.init())?;
        self.bind_local(red.state());
        self.bind_local(red.row());
        let acc = self.eval(red.acc())?;
        let red = Reduce::from_parts(op, init, red.state().clone(), red.row().clone(), acc)?;
        Ok(Expr::reduce(red))
    }

    fn visit_element(&mut self, vec: &Expr, iters: &[Expr]) -> Result<Expr, PassError> {
        let vec = self.eval(vec)?;
        Ok(Expr::element(vec, eval_all(self, iters)?)?)
    }

    fn visit_in(&mut self, iter: &Expr, vec: &Expr) -> Result<Expr, PassError> {
        let iter = self.eval(iter)?;
        Ok(Expr::in_vec(iter, self.eval(vec)?)?)
    }

    fn visit_not_null(&mut self, elem: &Expr) -> Result<Expr, PassError> {
        Ok(Expr::not_null(self.eval(elem)?)?)
    }
}

#[derive(Debug, Default)]
pub struct ClonePass;

impl Pass for ClonePass {
    fn name(&self) -> &'static str {
        "clone"
    }

    fn run(&mut self, func: &Func) -> Result<Func, PassError> {
        let mut cloner = Cloner {
            ctx: RewriteCtx::new(&func.tbl),
        };
        rewrite_func(&mut cloner, func)
    }
}
