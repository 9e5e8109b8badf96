use std::collections::HashSet;

use crate::error::IrError;
use crate::ir::expr::{Expr, ExprKind};
use crate::ir::sym::{Sym, SymTable};
use crate::ir::visit::visit_expr;

/// A unit of lowering: an output expression over `inputs`, with every
/// intermediate symbol bound in `tbl`.
///
/// `output.ty()` is the return type. A `void` output marks the procedure
/// form, whose effects are its stores.
#[derive(Debug, Clone, PartialEq)]
pub struct Func {
    pub name: String,
    pub output: Expr,
    pub inputs: Vec<Sym>,
    pub tbl: SymTable,
}

impl Func {
    pub fn new(name: impl Into<String>, output: Expr, inputs: Vec<Sym>, tbl: SymTable) -> Self {
        Func {
            name: name.into(),
            output,
            inputs,
            tbl,
        }
    }

    pub fn is_procedure(&self) -> bool {
        self.output.is_void()
    }

    /// Checks that every referenced symbol is an input, a table binding, or
    /// bound by an enclosing `Op`/`Reduce`, and that no input is also bound.
    pub fn check(&self) -> Result<(), IrError> {
        let mut inputs = HashSet::new();
        for input in &self.inputs {
            if !inputs.insert(input.clone()) || self.tbl.contains(input) {
                return Err(IrError::DuplicateBinding {
                    name: input.name().to_owned(),
                });
            }
        }

        let mut scoped: HashSet<Sym> = HashSet::new();
        let mut refs: Vec<Sym> = Vec::new();
        let mut collect = |e: &Expr| match e.kind() {
            ExprKind::Sym(s) => refs.push(s.clone()),
            ExprKind::Op(op) => scoped.extend(op.iters().iter().cloned()),
            ExprKind::Reduce(red) => {
                scoped.extend(red.op().iters().iter().cloned());
                scoped.insert(red.state().clone());
                scoped.insert(red.row().clone());
            }
            _ => {}
        };
        visit_expr(&self.output, &mut collect);
        for (_, bound) in self.tbl.iter() {
            visit_expr(bound, &mut collect);
        }

        for s in refs {
            if !inputs.contains(&s) && !self.tbl.contains(&s) && !scoped.contains(&s) {
                return Err(IrError::UnboundSymbol {
                    name: s.name().to_owned(),
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Func {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "def {}(", self.name)?;
        for (i, input) in self.inputs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", input, input.ty())?;
        }
        writeln!(f, ") -> {} {{", self.output.ty())?;
        for (sym, expr) in self.tbl.iter() {
            writeln!(f, "    {} = {}", sym, expr)?;
        }
        writeln!(f, "    return {}", self.output)?;
        write!(f, "}}")
    }
}
