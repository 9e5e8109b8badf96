use crate::ir::expr::Expr;
use crate::ir::stmt::Stmt;

/// Imperative loop.
///
/// Runs `init; loop { if exit_cond break; if body_cond { body }; incr }
/// post;` and then yields `output`. Canonical loops have neither `incr`
/// nor `body_cond`.
#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    pub init: Option<Stmt>,
    pub incr: Option<Stmt>,
    pub exit_cond: Expr,
    pub body_cond: Option<Expr>,
    pub body: Stmt,
    pub post: Option<Stmt>,
    pub output: Expr,
}

impl Loop {
    pub fn new(exit_cond: Expr, body: Stmt, output: Expr) -> Self {
        Loop {
            init: None,
            incr: None,
            exit_cond,
            body_cond: None,
            body,
            post: None,
            output,
        }
    }

    pub fn is_canonical(&self) -> bool {
        self.incr.is_none() && self.body_cond.is_none()
    }
}
