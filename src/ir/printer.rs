//! Single-line text form of expressions and statements, used by IR dumps
//! and error messages. Output is deterministic.

use std::fmt;

use crate::ir::expr::{ConstVal, Expr, ExprKind};
use crate::ir::stmt::Stmt;

fn list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, e) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", e)?;
    }
    Ok(())
}

impl fmt::Display for ConstVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstVal::Bool(b) => write!(f, "{}", b),
            ConstVal::Int(v) => write!(f, "{}", v),
            ConstVal::Float(v) => write!(f, "{:?}", v),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Sym(s) => write!(f, "{}", s),
            ExprKind::Const(c) => write!(f, "{}", c),
            ExprKind::Cast(a) => write!(f, "({}){}", self.ty(), a),
            ExprKind::Nary { op, args } => {
                write!(f, "{}(", op)?;
                list(f, args)?;
                write!(f, ")")
            }
            ExprKind::Select {
                cond,
                then,
                otherwise,
            } => write!(f, "select({}, {}, {})", cond, then, otherwise),
            ExprKind::Get { val, col } => write!(f, "{}.{}", val, col),
            ExprKind::New(vals) => {
                write!(f, "new(")?;
                list(f, vals)?;
                write!(f, ")")
            }
            ExprKind::Call { name, args } => {
                write!(f, "@{}(", name)?;
                list(f, args)?;
                write!(f, ")")
            }
            ExprKind::Op(op) => {
                write!(f, "op[")?;
                for (i, it) in op.iters().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", it)?;
                }
                write!(f, "]({} -> ", op.pred())?;
                list(f, op.outputs())?;
                write!(f, ")")
            }
            ExprKind::Reduce(red) => write!(
                f,
                "reduce({}, {}, ({}, {}) -> {})",
                Expr::op(red.op().clone()),
                red.init(),
                red.state(),
                red.row(),
                red.acc()
            ),
            ExprKind::Element { vec, iters } => {
                write!(f, "{}[", vec)?;
                list(f, iters)?;
                write!(f, "]")
            }
            ExprKind::In { iter, vec } => write!(f, "in({}, {})", iter, vec),
            ExprKind::NotNull(e) => write!(f, "notnull({})", e),
            ExprKind::Alloc { elem, size } => write!(f, "alloc({}, {})", elem, size),
            ExprKind::Load(a) => write!(f, "load({})", a),
            ExprKind::StructGep { addr, col } => write!(f, "gep({}, {})", addr, col),
            ExprKind::FetchDataPtr { vec, idx, col } => {
                write!(f, "dataptr({}, {}, {})", vec, idx, col)
            }
            ExprKind::Loop(lp) => {
                write!(f, "loop {{ ")?;
                if let Some(init) = &lp.init {
                    write!(f, "init: {}; ", init)?;
                }
                write!(f, "exit: {}; ", lp.exit_cond)?;
                if let Some(bc) = &lp.body_cond {
                    write!(f, "cond: {}; ", bc)?;
                }
                write!(f, "body: {}; ", lp.body)?;
                if let Some(incr) = &lp.incr {
                    write!(f, "incr: {}; ", incr)?;
                }
                if let Some(post) = &lp.post {
                    write!(f, "post: {}; ", post)?;
                }
                write!(f, "out: {} }}", lp.output)
            }
            ExprKind::Stmt(s) => write!(f, "{{ {} }}", s),
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Stmts(stmts) => {
                for (i, s) in stmts.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", s)?;
                }
                Ok(())
            }
            Stmt::Store(st) => write!(f, "store({}, {})", st.addr(), st.val()),
            Stmt::IfElse(ie) => write!(
                f,
                "if {} {{ {} }} else {{ {} }}",
                ie.cond(),
                ie.then(),
                ie.otherwise()
            ),
            Stmt::Eval(e) => write!(f, "{}", e),
            Stmt::NoOp => write!(f, "nop"),
        }
    }
}
