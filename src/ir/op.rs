use crate::error::IrError;
use crate::ir::expr::Expr;
use crate::ir::sym::Sym;
use crate::ir::types::DataType;

/// A set comprehension: every value of `iters` satisfying `pred`, in
/// ascending storage order, produces one row `iters ++ outputs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Op {
    iters: Vec<Sym>,
    pred: Expr,
    outputs: Vec<Expr>,
    ty: DataType,
}

impl Op {
    pub fn new(iters: Vec<Sym>, pred: Expr, outputs: Vec<Expr>) -> Result<Op, IrError> {
        if iters.is_empty() {
            return Err(IrError::operand("op", "at least one iterator is required"));
        }
        if !pred.ty().is_bool() {
            return Err(IrError::mismatch("op predicate", DataType::Bool, pred.ty()));
        }
        if outputs.is_empty() {
            return Err(IrError::operand("op", "at least one output is required"));
        }
        let mut dtypes: Vec<DataType> = iters.iter().map(|s| s.ty().clone()).collect();
        for it in &iters {
            if !it.ty().is_primitive() {
                return Err(IrError::operand(
                    "op",
                    format!("iterator '{}' has non-scalar type '{}'", it.name(), it.ty()),
                ));
            }
        }
        for out in &outputs {
            if !out.ty().is_val() {
                return Err(IrError::operand(
                    "op",
                    format!("output of type '{}' is not a value", out.ty()),
                ));
            }
            dtypes.push(out.ty().clone());
        }
        let ty = DataType::vector(dtypes, iters.len())?;
        Ok(Op {
            iters,
            pred,
            outputs,
            ty,
        })
    }

    pub fn iters(&self) -> &[Sym] {
        &self.iters
    }

    pub fn pred(&self) -> &Expr {
        &self.pred
    }

    pub fn outputs(&self) -> &[Expr] {
        &self.outputs
    }

    pub fn ty(&self) -> &DataType {
        &self.ty
    }
}

/// A left fold over the rows of an [`Op`].
///
/// `init` and `acc` are captured symbolically at construction; `acc` is an
/// expression over the `state` and `row` symbols.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduce {
    op: Op,
    init: Expr,
    state: Sym,
    row: Sym,
    acc: Expr,
}

impl Reduce {
    pub fn new<I, A>(op: Op, init_fn: I, acc_fn: A) -> Result<Reduce, IrError>
    where
        I: FnOnce() -> Result<Expr, IrError>,
        A: FnOnce(Expr, Expr) -> Result<Expr, IrError>,
    {
        let init = init_fn()?;
        if !init.ty().is_val() {
            return Err(IrError::operand(
                "reduce",
                format!("state of type '{}' is not a value", init.ty()),
            ));
        }
        let state = Sym::new("state", init.ty().clone());
        let row = Sym::new("row", op.ty().rowty()?);
        let acc = acc_fn(Expr::sym(&state), Expr::sym(&row))?;
        if acc.ty() != init.ty() {
            return Err(IrError::mismatch("reduce accumulator", init.ty(), acc.ty()));
        }
        Ok(Reduce {
            op,
            init,
            state,
            row,
            acc,
        })
    }

    /// Rebuilds a fold from parts already in symbolic form. Used by passes
    /// that rewrite the operands of an existing `Reduce`.
    pub fn from_parts(op: Op, init: Expr, state: Sym, row: Sym, acc: Expr) -> Result<Reduce, IrError> {
        if state.ty() != init.ty() {
            return Err(IrError::mismatch("reduce state", init.ty(), state.ty()));
        }
        let rowty = op.ty().rowty()?;
        if row.ty() != &rowty {
            return Err(IrError::mismatch("reduce row", rowty, row.ty()));
        }
        if acc.ty() != init.ty() {
            return Err(IrError::mismatch("reduce accumulator", init.ty(), acc.ty()));
        }
        Ok(Reduce {
            op,
            init,
            state,
            row,
            acc,
        })
    }

    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn init(&self) -> &Expr {
        &self.init
    }

    pub fn state(&self) -> &Sym {
        &self.state
    }

    pub fn row(&self) -> &Sym {
        &self.row
    }

    pub fn acc(&self) -> &Expr {
        &self.acc
    }

    pub fn ty(&self) -> &DataType {
        self.init.ty()
    }
}
