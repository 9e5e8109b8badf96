//! Read-only pre-order traversal over expressions and statements.
//!
//! Descends into statements, loop parts and fold operands. Symbol bindings
//! are not followed.

use crate::ir::expr::{Expr, ExprKind};
use crate::ir::stmt::Stmt;

pub fn visit_expr(expr: &Expr, f: &mut dyn FnMut(&Expr)) {
    f(expr);
    match expr.kind() {
        ExprKind::Sym(_) | ExprKind::Const(_) => {}
        ExprKind::Cast(a) | ExprKind::Load(a) | ExprKind::NotNull(a) => visit_expr(a, f),
        ExprKind::Nary { args, .. } | ExprKind::Call { args, .. } | ExprKind::New(args) => {
            for a in args {
                visit_expr(a, f);
            }
        }
        ExprKind::Select {
            cond,
            then,
            otherwise,
        } => {
            visit_expr(cond, f);
            visit_expr(then, f);
            visit_expr(otherwise, f);
        }
        ExprKind::Get { val, .. } => visit_expr(val, f),
        ExprKind::Op(op) => {
            visit_expr(op.pred(), f);
            for o in op.outputs() {
                visit_expr(o, f);
            }
        }
        ExprKind::Reduce(red) => {
            visit_expr(red.op().pred(), f);
            for o in red.op().outputs() {
                visit_expr(o, f);
            }
            visit_expr(red.init(), f);
            visit_expr(red.acc(), f);
        }
        ExprKind::Element { vec, iters } => {
            visit_expr(vec, f);
            for it in iters {
                visit_expr(it, f);
            }
        }
        ExprKind::In { iter, vec } => {
            visit_expr(iter, f);
            visit_expr(vec, f);
        }
        ExprKind::Alloc { size, .. } => visit_expr(size, f),
        ExprKind::StructGep { addr, .. } => visit_expr(addr, f),
        ExprKind::FetchDataPtr { vec, idx, .. } => {
            visit_expr(vec, f);
            visit_expr(idx, f);
        }
        ExprKind::Loop(lp) => {
            if let Some(init) = &lp.init {
                visit_stmt(init, f);
            }
            visit_expr(&lp.exit_cond, f);
            if let Some(bc) = &lp.body_cond {
                visit_expr(bc, f);
            }
            visit_stmt(&lp.body, f);
            if let Some(incr) = &lp.incr {
                visit_stmt(incr, f);
            }
            if let Some(post) = &lp.post {
                visit_stmt(post, f);
            }
            visit_expr(&lp.output, f);
        }
        ExprKind::Stmt(s) => visit_stmt(s, f),
    }
}

pub fn visit_stmt(stmt: &Stmt, f: &mut dyn FnMut(&Expr)) {
    match stmt {
        Stmt::Stmts(stmts) => {
            for s in stmts {
                visit_stmt(s, f);
            }
        }
        Stmt::Store(st) => {
            visit_expr(st.addr(), f);
            visit_expr(st.val(), f);
        }
        Stmt::IfElse(ie) => {
            visit_expr(ie.cond(), f);
            visit_stmt(ie.then(), f);
            visit_stmt(ie.otherwise(), f);
        }
        Stmt::Eval(e) => visit_expr(e, f),
        Stmt::NoOp => {}
    }
}
