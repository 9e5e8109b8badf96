//! Struct scalarization.
//!
//! Two passes turn struct values into their fields so that only registers
//! and memory cells of primitive type remain:
//!
//! 1. [`LoadStoreExpandPass`] splits struct loads and stores into per-field
//!    accesses through `StructGep`.
//! 2. [`NewGetEliminationPass`] resolves every field projection `Get` to the
//!    component it selects, splitting struct-valued symbols into one symbol
//!    per field and struct selects into one select per field.

use tracing::trace;

use crate::error::PassError;
use crate::ir::{DataType, Expr, ExprKind, Func, Stmt, Store, Sym};
use crate::pass::rewrite::{default_assign, eval_all, rewrite_func, RewriteCtx, Rewriter};
use crate::pass::Pass;

struct LoadStoreExpand {
    ctx: RewriteCtx,
}

/// Field-wise load of the struct behind `addr`.
fn expand_load(addr: Expr) -> Result<Expr, PassError> {
    let Some(fields) = addr.ty().deref()?.fields().map(<[DataType]>::len) else {
        return Ok(Expr::load(addr)?);
    };
    let mut vals = Vec::with_capacity(fields);
    for col in 0..fields {
        vals.push(expand_load(Expr::struct_gep(addr.clone(), col)?)?);
    }
    Ok(Expr::new_struct(vals)?)
}

/// Field-wise store of struct `val` through `addr`.
fn expand_store(addr: Expr, val: Expr, out: &mut Vec<Stmt>) -> Result<(), PassError> {
    let Some(fields) = val.ty().fields().map(<[DataType]>::len) else {
        out.push(Stmt::store(addr, val)?);
        return Ok(());
    };
    for col in 0..fields {
        let field_addr = Expr::struct_gep(addr.clone(), col)?;
        expand_store(field_addr, Expr::get(val.clone(), col)?, out)?;
    }
    Ok(())
}

impl Rewriter for LoadStoreExpand {
    fn name(&self) -> &'static str {
        "load-store-expand"
    }

    fn ctx(&mut self) -> &mut RewriteCtx {
        &mut self.ctx
    }

    fn visit_load(&mut self, addr: &Expr) -> Result<Expr, PassError> {
        expand_load(self.eval(addr)?)
    }

    fn visit_store(&mut self, st: &Store) -> Result<Stmt, PassError> {
        let addr = self.eval(st.addr())?;
        let val = self.eval(st.val())?;
        if !val.ty().is_struct() {
            return Ok(Stmt::store(addr, val)?);
        }
        let mut stores = Vec::new();
        expand_store(addr, val, &mut stores)?;
        Ok(Stmt::Stmts(stores))
    }
}

#[derive(Debug, Default)]
pub struct LoadStoreExpandPass;

impl Pass for LoadStoreExpandPass {
    fn name(&self) -> &'static str {
        "load-store-expand"
    }

    fn run(&mut self, func: &Func) -> Result<Func, PassError> {
        let mut pass = LoadStoreExpand {
            ctx: RewriteCtx::new(&func.tbl),
        };
        rewrite_func(&mut pass, func)
    }
}

struct NewGetElimination {
    ctx: RewriteCtx,
}

fn projection_error(detail: impl Into<String>) -> PassError {
    PassError::StructProjection {
        detail: detail.into(),
    }
}

/// Components of a struct value that has already been rewritten.
fn components(e: &Expr) -> Result<&[Expr], PassError> {
    match e.kind() {
        ExprKind::New(vals) => Ok(vals),
        _ => Err(projection_error(format!("'{}' is not a known struct construction", e))),
    }
}

impl NewGetElimination {
    /// Binds each component of `val` to its own symbol `name_i`, recursing
    /// into nested constructions, and returns the construction of those
    /// symbols.
    fn split(&mut self, sym: &Sym, name: &str, val: Expr) -> Result<Expr, PassError> {
        let ExprKind::New(vals) = val.kind() else {
            let out = Sym::new(name, val.ty().clone());
            self.ctx.out_tbl.bind(out.clone(), val)?;
            return Ok(Expr::sym(&out));
        };
        let mut fields = Vec::with_capacity(vals.len());
        for (i, v) in vals.iter().enumerate() {
            fields.push(self.split(sym, &format!("{}_{}", name, i), v.clone())?);
        }
        trace!(sym = %sym, fields = fields.len(), "split struct binding");
        Ok(Expr::new_struct(fields)?)
    }
}

impl Rewriter for NewGetElimination {
    fn name(&self) -> &'static str {
        "new-get-elim"
    }

    fn ctx(&mut self) -> &mut RewriteCtx {
        &mut self.ctx
    }

    fn visit_input(&mut self, sym: &Sym) -> Result<Sym, PassError> {
        if sym.ty().is_struct() {
            return Err(projection_error(format!(
                "function input '{}' has struct type '{}'",
                sym.name(),
                sym.ty()
            )));
        }
        self.ctx.map_sym(sym, Expr::sym(sym));
        Ok(sym.clone())
    }

    fn assign(&mut self, sym: &Sym, val: Expr) -> Result<Expr, PassError> {
        if !val.ty().is_struct() {
            return default_assign(self, sym, val);
        }
        components(&val)?;
        self.split(sym, sym.name(), val)
    }

    fn visit_get(&mut self, val: &Expr, col: usize) -> Result<Expr, PassError> {
        let val = self.eval(val)?;
        if val.ty().is_primitive() && col == 0 {
            return Ok(val);
        }
        let fields = components(&val)?;
        fields
            .get(col)
            .cloned()
            .ok_or_else(|| projection_error(format!("field {} of '{}'", col, val)))
    }

    fn visit_select(&mut self, cond: &Expr, then: &Expr, otherwise: &Expr) -> Result<Expr, PassError> {
        let cond = self.eval(cond)?;
        let then = self.eval(then)?;
        let otherwise = self.eval(otherwise)?;
        select_fields(cond, then, otherwise)
    }

    fn visit_new(&mut self, vals: &[Expr]) -> Result<Expr, PassError> {
        Ok(Expr::new_struct(eval_all(self, vals)?)?)
    }
}

fn select_fields(cond: Expr, then: Expr, otherwise: Expr) -> Result<Expr, PassError> {
    if !then.ty().is_struct() {
        return Ok(Expr::select(cond, then, otherwise)?);
    }
    let t = components(&then)?;
    let o = components(&otherwise)?;
    let mut fields = Vec::with_capacity(t.len());
    for (a, b) in t.iter().zip(o) {
        fields.push(select_fields(cond.clone(), a.clone(), b.clone())?);
    }
    Ok(Expr::new_struct(fields)?)
}

#[derive(Debug, Default)]
pub struct NewGetEliminationPass;

impl Pass for NewGetEliminationPass {
    fn name(&self) -> &'static str {
        "new-get-elim"
    }

    fn run(&mut self, func: &Func) -> Result<Func, PassError> {
        let mut pass = NewGetElimination {
            ctx: RewriteCtx::new(&func.tbl),
        };
        rewrite_func(&mut pass, func)
    }
}
