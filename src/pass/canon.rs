//! Loop canonicalization.
//!
//! Folds the `incr` statement into the end of the body so a loop is just
//! `init; while !exit { body }; post`. A loop that still carries a
//! `body_cond` gets its body guarded by it first; the increment stays
//! outside the guard so skipped rows still advance the index.

use crate::error::PassError;
use crate::ir::{Expr, Func, Loop, Stmt};
use crate::pass::rewrite::{rewrite_func, walk_loop, RewriteCtx, Rewriter};
use crate::pass::Pass;

struct Canonicalizer {
    ctx: RewriteCtx,
}

impl Rewriter for Canonicalizer {
    fn name(&self) -> &'static str {
        "canon"
    }

    fn ctx(&mut self) -> &mut RewriteCtx {
        &mut self.ctx
    }

    fn visit_loop(&mut self, lp: &Loop) -> Result<Expr, PassError> {
        let mut lp = walk_loop(self, lp)?;
        if let Some(cond) = lp.body_cond.take() {
            let body = std::mem::replace(&mut lp.body, Stmt::NoOp);
            lp.body = Stmt::if_else(cond, body, Stmt::NoOp)?;
        }
        if let Some(incr) = lp.incr.take() {
            let body = std::mem::replace(&mut lp.body, Stmt::NoOp);
            lp.body = Stmt::seq(vec![body, incr]);
        }
        Ok(Expr::from_loop(lp)?)
    }
}

#[derive(Debug, Default)]
pub struct CanonPass;

impl Pass for CanonPass {
    fn name(&self) -> &'static str {
        "canon"
    }

    fn run(&mut self, func: &Func) -> Result<Func, PassError> {
        let mut canon = Canonicalizer {
            ctx: RewriteCtx::new(&func.tbl),
        };
        rewrite_func(&mut canon, func)
    }
}
