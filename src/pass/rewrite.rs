//! Generic, memoizing IR rewriter.
//!
//! A pass implements [`Rewriter`] and overrides the `visit_*` hooks for the
//! node kinds it transforms; every other node is rebuilt structurally by the
//! matching `walk_*` helper. Symbol references are memoized: the expression
//! bound to a symbol in the input table is rewritten once per pass instance,
//! however often the symbol is referenced, and the result is bound in the
//! output table.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::PassError;
use crate::ir::{
    DataType, Expr, ExprKind, Func, IfElse, Loop, MathOp, Op, Reduce, Stmt, Store, Sym, SymTable,
};

/// Per-pass rewrite state.
///
/// `in_tbl` is the read-only table of the function being rewritten;
/// `out_tbl` receives the bindings of the function being built. `sym_map`
/// maps every input symbol already visited to its replacement.
#[derive(Debug)]
pub struct RewriteCtx {
    pub in_tbl: Rc<SymTable>,
    pub out_tbl: SymTable,
    pub sym_map: HashMap<Sym, Expr>,
}

impl RewriteCtx {
    pub fn new(in_tbl: &SymTable) -> Self {
        Self::shared(Rc::new(in_tbl.clone()))
    }

    pub fn shared(in_tbl: Rc<SymTable>) -> Self {
        RewriteCtx {
            in_tbl,
            out_tbl: SymTable::new(),
            sym_map: HashMap::new(),
        }
    }

    pub fn map_sym(&mut self, from: &Sym, to: Expr) {
        self.sym_map.insert(from.clone(), to);
    }

    /// Binds a symbol minted by the pass itself and maps it to itself, so
    /// expressions that mention it can be passed through `eval`.
    pub fn declare(&mut self, sym: &Sym, val: Expr) -> Result<(), PassError> {
        self.out_tbl.bind(sym.clone(), val)?;
        self.map_sym(sym, Expr::sym(sym));
        Ok(())
    }
}

pub trait Rewriter {
    fn name(&self) -> &'static str;

    fn ctx(&mut self) -> &mut RewriteCtx;

    fn eval(&mut self, e: &Expr) -> Result<Expr, PassError> {
        match e.kind() {
            ExprKind::Sym(s) => self.visit_sym(s),
            ExprKind::Const(_) => Ok(e.clone()),
            ExprKind::Cast(arg) => self.visit_cast(e.ty(), arg),
            ExprKind::Nary { op, args } => self.visit_nary(*op, args),
            ExprKind::Select {
                cond,
                then,
                otherwise,
            } => self.visit_select(cond, then, otherwise),
            ExprKind::Get { val, col } => self.visit_get(val, *col),
            ExprKind::New(vals) => self.visit_new(vals),
            ExprKind::Call { name, args } => self.visit_call(name, e.ty(), args),
            ExprKind::Op(op) => self.visit_op(op),
            ExprKind::Reduce(red) => self.visit_reduce(red),
            ExprKind::Element { vec, iters } => self.visit_element(vec, iters),
            ExprKind::In { iter, vec } => self.visit_in(iter, vec),
            ExprKind::NotNull(elem) => self.visit_not_null(elem),
            ExprKind::Alloc { elem, size } => self.visit_alloc(elem, size),
            ExprKind::Load(addr) => self.visit_load(addr),
            ExprKind::StructGep { addr, col } => self.visit_struct_gep(addr, *col),
            ExprKind::FetchDataPtr { vec, idx, col } => self.visit_fetch_data_ptr(vec, idx, *col),
            ExprKind::Loop(lp) => self.visit_loop(lp),
            ExprKind::Stmt(s) => Ok(Expr::stmt(self.eval_stmt(s)?)),
        }
    }

    fn eval_stmt(&mut self, s: &Stmt) -> Result<Stmt, PassError> {
        match s {
            Stmt::Stmts(stmts) => {
                let mut out = Vec::with_capacity(stmts.len());
                for s in stmts {
                    out.push(self.eval_stmt(s)?);
                }
                Ok(Stmt::Stmts(out))
            }
            Stmt::Store(st) => self.visit_store(st),
            Stmt::IfElse(ie) => self.visit_if_else(ie),
            Stmt::Eval(e) => Ok(Stmt::Eval(self.eval(e)?)),
            Stmt::NoOp => Ok(Stmt::NoOp),
        }
    }

    /// Records the rewritten value of input symbol `sym` and returns the
    /// expression that stands for it from now on.
    fn assign(&mut self, sym: &Sym, val: Expr) -> Result<Expr, PassError> {
        default_assign(self, sym, val)
    }

    /// Maps a function input. Inputs are kept as they are by default.
    fn visit_input(&mut self, sym: &Sym) -> Result<Sym, PassError> {
        self.ctx().map_sym(sym, Expr::sym(sym));
        Ok(sym.clone())
    }

    fn visit_sym(&mut self, sym: &Sym) -> Result<Expr, PassError> {
        walk_sym(self, sym)
    }

    fn visit_cast(&mut self, ty: &DataType, arg: &Expr) -> Result<Expr, PassError> {
        Ok(Expr::cast(ty.clone(), self.eval(arg)?)?)
    }

    fn visit_nary(&mut self, op: MathOp, args: &[Expr]) -> Result<Expr, PassError> {
        let args = eval_all(self, args)?;
        Ok(Expr::nary(op, args)?)
    }

    fn visit_select(&mut self, cond: &Expr, then: &Expr, otherwise: &Expr) -> Result<Expr, PassError> {
        let cond = self.eval(cond)?;
        let then = self.eval(then)?;
        let otherwise = self.eval(otherwise)?;
        Ok(Expr::select(cond, then, otherwise)?)
    }

    fn visit_get(&mut self, val: &Expr, col: usize) -> Result<Expr, PassError> {
        Ok(Expr::get(self.eval(val)?, col)?)
    }

    fn visit_new(&mut self, vals: &[Expr]) -> Result<Expr, PassError> {
        Ok(Expr::new_struct(eval_all(self, vals)?)?)
    }

    fn visit_call(&mut self, name: &str, ty: &DataType, args: &[Expr]) -> Result<Expr, PassError> {
        Ok(Expr::call(name, ty.clone(), eval_all(self, args)?))
    }

    fn visit_op(&mut self, _op: &Op) -> Result<Expr, PassError> {
        Err(PassError::unsupported(self.name(), "op"))
    }

    fn visit_reduce(&mut self, _red: &Reduce) -> Result<Expr, PassError> {
        Err(PassError::unsupported(self.name(), "reduce"))
    }

    fn visit_element(&mut self, _vec: &Expr, _iters: &[Expr]) -> Result<Expr, PassError> {
        Err(PassError::unsupported(self.name(), "element"))
    }

    fn visit_in(&mut self, _iter: &Expr, _vec: &Expr) -> Result<Expr, PassError> {
        Err(PassError::unsupported(self.name(), "in"))
    }

    fn visit_not_null(&mut self, _elem: &Expr) -> Result<Expr, PassError> {
        Err(PassError::unsupported(self.name(), "notnull"))
    }

    fn visit_alloc(&mut self, elem: &DataType, size: &Expr) -> Result<Expr, PassError> {
        Ok(Expr::alloc(elem.clone(), self.eval(size)?)?)
    }

    fn visit_load(&mut self, addr: &Expr) -> Result<Expr, PassError> {
        Ok(Expr::load(self.eval(addr)?)?)
    }

    fn visit_struct_gep(&mut self, addr: &Expr, col: usize) -> Result<Expr, PassError> {
        Ok(Expr::struct_gep(self.eval(addr)?, col)?)
    }

    fn visit_fetch_data_ptr(&mut self, vec: &Expr, idx: &Expr, col: usize) -> Result<Expr, PassError> {
        let vec = self.eval(vec)?;
        let idx = self.eval(idx)?;
        Ok(Expr::fetch_data_ptr(vec, idx, col)?)
    }

    fn visit_loop(&mut self, lp: &Loop) -> Result<Expr, PassError> {
        Ok(Expr::from_loop(walk_loop(self, lp)?)?)
    }

    fn visit_store(&mut self, st: &Store) -> Result<Stmt, PassError> {
        let addr = self.eval(st.addr())?;
        let val = self.eval(st.val())?;
        Ok(Stmt::store(addr, val)?)
    }

    fn visit_if_else(&mut self, ie: &IfElse) -> Result<Stmt, PassError> {
        let cond = self.eval(ie.cond())?;
        let then = self.eval_stmt(ie.then())?;
        let otherwise = self.eval_stmt(ie.otherwise())?;
        Ok(Stmt::if_else(cond, then, otherwise)?)
    }
}

pub fn eval_all<R: Rewriter + ?Sized>(r: &mut R, exprs: &[Expr]) -> Result<Vec<Expr>, PassError> {
    exprs.iter().map(|e| r.eval(e)).collect()
}

/// Memoized symbol evaluation shared by every pass.
pub fn walk_sym<R: Rewriter + ?Sized>(r: &mut R, sym: &Sym) -> Result<Expr, PassError> {
    if let Some(mapped) = r.ctx().sym_map.get(sym) {
        return Ok(mapped.clone());
    }
    let in_tbl = Rc::clone(&r.ctx().in_tbl);
    let bound = in_tbl.get(sym).ok_or_else(|| PassError::UndefinedSymbol {
        pass: r.name().to_owned(),
        name: sym.name().to_owned(),
    })?;
    let val = r.eval(bound)?;
    let rep = r.assign(sym, val)?;
    r.ctx().map_sym(sym, rep.clone());
    Ok(rep)
}

/// Binds `val` under `sym` itself when the type is unchanged, otherwise
/// under a fresh symbol of the same name.
pub fn default_assign<R: Rewriter + ?Sized>(r: &mut R, sym: &Sym, val: Expr) -> Result<Expr, PassError> {
    let out = if val.ty() == sym.ty() {
        sym.clone()
    } else {
        Sym::typed_like(sym.name(), &val)
    };
    r.ctx().out_tbl.bind(out.clone(), val)?;
    Ok(Expr::sym(&out))
}

pub fn walk_loop<R: Rewriter + ?Sized>(r: &mut R, lp: &Loop) -> Result<Loop, PassError> {
    let init = lp.init.as_ref().map(|s| r.eval_stmt(s)).transpose()?;
    let exit_cond = r.eval(&lp.exit_cond)?;
    let body_cond = lp.body_cond.as_ref().map(|e| r.eval(e)).transpose()?;
    let body = r.eval_stmt(&lp.body)?;
    let incr = lp.incr.as_ref().map(|s| r.eval_stmt(s)).transpose()?;
    let post = lp.post.as_ref().map(|s| r.eval_stmt(s)).transpose()?;
    let output = r.eval(&lp.output)?;
    Ok(Loop {
        init,
        incr,
        exit_cond,
        body_cond,
        body,
        post,
        output,
    })
}

/// Runs `pass` over `func`: inputs first, then the output expression, which
/// pulls in every reachable binding.
pub fn rewrite_func<R: Rewriter + ?Sized>(pass: &mut R, func: &Func) -> Result<Func, PassError> {
    let mut inputs = Vec::with_capacity(func.inputs.len());
    for input in &func.inputs {
        inputs.push(pass.visit_input(input)?);
    }
    let output = pass.eval(&func.output)?;
    let tbl = std::mem::take(&mut pass.ctx().out_tbl);
    Ok(Func::new(func.name.clone(), output, inputs, tbl))
}

/// Memo table for passes that compute something other than an expression
/// per symbol.
#[derive(Debug)]
pub struct SymMemo<V> {
    done: HashMap<Sym, V>,
}

impl<V: Clone> SymMemo<V> {
    pub fn new() -> Self {
        SymMemo {
            done: HashMap::new(),
        }
    }

    pub fn get(&self, sym: &Sym) -> Option<&V> {
        self.done.get(sym)
    }

    pub fn insert(&mut self, sym: &Sym, v: V) {
        self.done.insert(sym.clone(), v);
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }
}

impl<V: Clone> Default for SymMemo<V> {
    fn default() -> Self {
        Self::new()
    }
}
