use crate::error::IrError;
use crate::ir::expr::Expr;
use crate::ir::types::DataType;

/// Write of `val` through the pointer `addr`.
#[derive(Debug, Clone, PartialEq)]
pub struct Store {
    addr: Expr,
    val: Expr,
}

impl Store {
    pub fn new(addr: Expr, val: Expr) -> Result<Store, IrError> {
        let elem = addr.ty().deref()?;
        if elem != val.ty() {
            return Err(IrError::mismatch("store", elem, val.ty()));
        }
        Ok(Store { addr, val })
    }

    pub fn addr(&self) -> &Expr {
        &self.addr
    }

    pub fn val(&self) -> &Expr {
        &self.val
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfElse {
    cond: Expr,
    then: Box<Stmt>,
    otherwise: Box<Stmt>,
}

impl IfElse {
    pub fn new(cond: Expr, then: Stmt, otherwise: Stmt) -> Result<IfElse, IrError> {
        if !cond.ty().is_bool() {
            return Err(IrError::mismatch("if condition", DataType::Bool, cond.ty()));
        }
        Ok(IfElse {
            cond,
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    pub fn cond(&self) -> &Expr {
        &self.cond
    }

    pub fn then(&self) -> &Stmt {
        &self.then
    }

    pub fn otherwise(&self) -> &Stmt {
        &self.otherwise
    }
}

/// Untyped statement node.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Stmts(Vec<Stmt>),
    Store(Store),
    IfElse(IfElse),
    /// Evaluates an expression for its effects.
    Eval(Expr),
    NoOp,
}

impl Stmt {
    pub fn store(addr: Expr, val: Expr) -> Result<Stmt, IrError> {
        Ok(Stmt::Store(Store::new(addr, val)?))
    }

    pub fn if_else(cond: Expr, then: Stmt, otherwise: Stmt) -> Result<Stmt, IrError> {
        Ok(Stmt::IfElse(IfElse::new(cond, then, otherwise)?))
    }

    /// Sequence of statements, flattening nested sequences and dropping
    /// `NoOp`s. A single survivor is returned as is.
    pub fn seq(stmts: Vec<Stmt>) -> Stmt {
        let mut flat = Vec::with_capacity(stmts.len());
        for s in stmts {
            match s {
                Stmt::Stmts(inner) => flat.extend(inner.into_iter().filter(|s| !s.is_noop())),
                Stmt::NoOp => {}
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Stmt::NoOp,
            1 => flat.pop().unwrap_or(Stmt::NoOp),
            _ => Stmt::Stmts(flat),
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Stmt::NoOp)
    }
}
