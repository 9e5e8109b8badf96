use crate::error::PassError;
use crate::ir::visit::visit_expr;
use crate::ir::{Expr, ExprKind, Func};
use crate::pass::Pass;

/// Checks that a function is ready for code generation: fully lowered,
/// canonical and scalar.
///
/// Rejects any surviving `Op`, `Reduce`, `Element`, `In` or `NotNull`, any
/// loop that still has an `incr` or a `body_cond`, any `New` or `Get`, and
/// any struct-typed value. Pointers to structs are allowed.
#[derive(Debug, Default)]
pub struct ValidateLoweredPass;

fn offence(e: &Expr) -> Option<String> {
    let what = match e.kind() {
        ExprKind::Op(_) => "an unlowered op",
        ExprKind::Reduce(_) => "an unlowered reduce",
        ExprKind::Element { .. } => "an element access",
        ExprKind::In { .. } => "a membership test",
        ExprKind::NotNull(_) => "a validity test",
        ExprKind::New(_) => "a struct construction",
        ExprKind::Get { .. } => "a struct projection",
        ExprKind::Loop(lp) if lp.incr.is_some() => "a loop with a separate increment",
        ExprKind::Loop(lp) if lp.body_cond.is_some() => "a loop with a body condition",
        _ if e.ty().is_struct() => "a struct-typed value",
        _ => return None,
    };
    Some(format!("found {} in '{}'", what, e))
}

impl Pass for ValidateLoweredPass {
    fn name(&self) -> &'static str {
        "validate-lowered"
    }

    fn run(&mut self, func: &Func) -> Result<Func, PassError> {
        let fail = |detail: String| PassError::Validation {
            func: func.name.clone(),
            detail,
        };
        func.check().map_err(|e| fail(e.to_string()))?;

        if let Some(input) = func.inputs.iter().find(|s| s.ty().is_struct()) {
            return Err(fail(format!("input '{}' has struct type", input.name())));
        }

        let mut first = None;
        let mut check = |e: &Expr| {
            if first.is_none() {
                first = offence(e);
            }
        };
        visit_expr(&func.output, &mut check);
        for (_, bound) in func.tbl.iter() {
            visit_expr(bound, &mut check);
        }
        match first {
            Some(detail) => Err(fail(detail)),
            None => Ok(func.clone()),
        }
    }
}
