use crate::error::IrError;
use crate::ir::loops::Loop;
use crate::ir::op::{Op, Reduce};
use crate::ir::stmt::Stmt;
use crate::ir::sym::{Sym, SymTable};
use crate::ir::types::DataType;
use crate::ir::visit::visit_expr;

/// Arithmetic, comparison and logical operators of `Nary` expressions.
///
/// `Implies`, `ForAll` and `Exists` only appear in solver formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Max,
    Min,
    Neg,
    Abs,
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Not,
    And,
    Or,
    Implies,
    ForAll,
    Exists,
}

impl MathOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            MathOp::Lt | MathOp::Lte | MathOp::Gt | MathOp::Gte | MathOp::Eq
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, MathOp::Not | MathOp::And | MathOp::Or | MathOp::Implies)
    }

    pub fn is_quantifier(self) -> bool {
        matches!(self, MathOp::ForAll | MathOp::Exists)
    }

    /// The comparison with its operands swapped: `a < b` ⇔ `b > a`.
    pub fn flip(self) -> MathOp {
        match self {
            MathOp::Lt => MathOp::Gt,
            MathOp::Lte => MathOp::Gte,
            MathOp::Gt => MathOp::Lt,
            MathOp::Gte => MathOp::Lte,
            other => other,
        }
    }

    fn arity(self) -> usize {
        match self {
            MathOp::Neg | MathOp::Abs | MathOp::Not => 1,
            _ => 2,
        }
    }
}

impl std::fmt::Display for MathOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MathOp::Add => "add",
            MathOp::Sub => "sub",
            MathOp::Mul => "mul",
            MathOp::Div => "div",
            MathOp::Mod => "mod",
            MathOp::Max => "max",
            MathOp::Min => "min",
            MathOp::Neg => "neg",
            MathOp::Abs => "abs",
            MathOp::Lt => "lt",
            MathOp::Lte => "lte",
            MathOp::Gt => "gt",
            MathOp::Gte => "gte",
            MathOp::Eq => "eq",
            MathOp::Not => "not",
            MathOp::And => "and",
            MathOp::Or => "or",
            MathOp::Implies => "implies",
            MathOp::ForAll => "forall",
            MathOp::Exists => "exists",
        };
        f.write_str(s)
    }
}

/// Literal payload of a `Const` node. All integer widths and `Idx` share
/// `Int`; the node's `DataType` carries the width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstVal {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl ConstVal {
    pub fn as_int(self) -> Option<i64> {
        match self {
            ConstVal::Int(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Sym(Sym),
    Const(ConstVal),
    Cast(Box<Expr>),
    Nary { op: MathOp, args: Vec<Expr> },
    Select {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// Projection of field `col` out of a struct value.
    Get { val: Box<Expr>, col: usize },
    /// Struct literal.
    New(Vec<Expr>),
    /// Opaque external call, resolved by the code generator by name.
    Call { name: String, args: Vec<Expr> },
    Op(Box<Op>),
    Reduce(Box<Reduce>),
    /// Payload of the row of `vec` at coordinates `iters`.
    Element { vec: Box<Expr>, iters: Vec<Expr> },
    /// Membership predicate: `iter` is a coordinate of a row of `vec`.
    In { iter: Box<Expr>, vec: Box<Expr> },
    /// Validity predicate over an `Element`.
    NotNull(Box<Expr>),
    Alloc { elem: DataType, size: Box<Expr> },
    Load(Box<Expr>),
    StructGep { addr: Box<Expr>, col: usize },
    /// Address of column `col` at position `idx` of a stored vector.
    FetchDataPtr {
        vec: Box<Expr>,
        idx: Box<Expr>,
        col: usize,
    },
    Loop(Box<Loop>),
    /// A statement in expression position; typed `void`.
    Stmt(Box<Stmt>),
}

/// An expression node with its semantic type.
///
/// The fields are private: every `Expr` is built by one of the checked
/// constructors below, so holding an `Expr` means holding well-typed IR.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    ty: DataType,
    kind: ExprKind,
}

impl Expr {
    pub fn ty(&self) -> &DataType {
        &self.ty
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    pub fn is_void(&self) -> bool {
        self.ty.is_void()
    }

    pub fn as_sym(&self) -> Option<&Sym> {
        match &self.kind {
            ExprKind::Sym(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_const(&self) -> Option<ConstVal> {
        match &self.kind {
            ExprKind::Const(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        self.as_const().and_then(ConstVal::as_int)
    }

    // ---- Leaves ----

    pub fn sym(sym: &Sym) -> Expr {
        Expr {
            ty: sym.ty().clone(),
            kind: ExprKind::Sym(sym.clone()),
        }
    }

    pub fn constant(ty: DataType, val: ConstVal) -> Result<Expr, IrError> {
        let ok = match val {
            ConstVal::Bool(_) => ty.is_bool(),
            ConstVal::Int(_) => ty.is_integral(),
            ConstVal::Float(_) => ty.is_float(),
        };
        if !ok {
            return Err(IrError::operand(
                "constant",
                format!("{:?} cannot have type '{}'", val, ty),
            ));
        }
        Ok(Expr {
            ty,
            kind: ExprKind::Const(val),
        })
    }

    /// Integer or index constant of type `ty`.
    pub fn int(ty: DataType, v: i64) -> Result<Expr, IrError> {
        Expr::constant(ty, ConstVal::Int(v))
    }

    pub fn float(ty: DataType, v: f64) -> Result<Expr, IrError> {
        Expr::constant(ty, ConstVal::Float(v))
    }

    pub fn i64(v: i64) -> Expr {
        Expr {
            ty: DataType::Int64,
            kind: ExprKind::Const(ConstVal::Int(v)),
        }
    }

    pub fn i32(v: i32) -> Expr {
        Expr {
            ty: DataType::Int32,
            kind: ExprKind::Const(ConstVal::Int(v as i64)),
        }
    }

    pub fn f64(v: f64) -> Expr {
        Expr {
            ty: DataType::Float64,
            kind: ExprKind::Const(ConstVal::Float(v)),
        }
    }

    pub fn idx(v: i64) -> Expr {
        Expr {
            ty: DataType::Idx,
            kind: ExprKind::Const(ConstVal::Int(v)),
        }
    }

    pub fn bool(v: bool) -> Expr {
        Expr {
            ty: DataType::Bool,
            kind: ExprKind::Const(ConstVal::Bool(v)),
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self.kind, ExprKind::Const(ConstVal::Bool(true)))
    }

    // ---- Scalar operations ----

    pub fn cast(ty: DataType, arg: Expr) -> Result<Expr, IrError> {
        if !ty.is_primitive() || !arg.ty.is_primitive() {
            return Err(IrError::operand(
                "cast",
                format!("cannot cast '{}' to '{}'", arg.ty, ty),
            ));
        }
        Ok(Expr {
            ty,
            kind: ExprKind::Cast(Box::new(arg)),
        })
    }

    pub fn nary(op: MathOp, args: Vec<Expr>) -> Result<Expr, IrError> {
        let ctx = op.to_string();
        if args.len() != op.arity() {
            return Err(IrError::operand(
                ctx,
                format!("expected {} operands, got {}", op.arity(), args.len()),
            ));
        }
        let ty = match op {
            MathOp::Add | MathOp::Sub | MathOp::Mul | MathOp::Div | MathOp::Max | MathOp::Min => {
                same_type(&ctx, &args)?;
                numeric(&ctx, &args[0])?;
                args[0].ty.clone()
            }
            MathOp::Mod => {
                same_type(&ctx, &args)?;
                if !args[0].ty.is_integral() {
                    return Err(IrError::mismatch(ctx, "integer", &args[0].ty));
                }
                args[0].ty.clone()
            }
            MathOp::Neg | MathOp::Abs => {
                numeric(&ctx, &args[0])?;
                args[0].ty.clone()
            }
            MathOp::Lt | MathOp::Lte | MathOp::Gt | MathOp::Gte | MathOp::Eq => {
                same_type(&ctx, &args)?;
                if !args[0].ty.is_primitive() {
                    return Err(IrError::mismatch(ctx, "primitive", &args[0].ty));
                }
                DataType::Bool
            }
            MathOp::Not | MathOp::And | MathOp::Or | MathOp::Implies => {
                for a in &args {
                    if !a.ty.is_bool() {
                        return Err(IrError::mismatch(ctx, DataType::Bool, &a.ty));
                    }
                }
                DataType::Bool
            }
            MathOp::ForAll | MathOp::Exists => {
                if args[0].as_sym().is_none() {
                    return Err(IrError::operand(ctx, "the bound variable must be a symbol"));
                }
                if !args[1].ty.is_bool() {
                    return Err(IrError::mismatch(ctx, DataType::Bool, &args[1].ty));
                }
                DataType::Bool
            }
        };
        Ok(Expr {
            ty,
            kind: ExprKind::Nary { op, args },
        })
    }

    pub fn add(a: Expr, b: Expr) -> Result<Expr, IrError> {
        Expr::nary(MathOp::Add, vec![a, b])
    }

    pub fn sub(a: Expr, b: Expr) -> Result<Expr, IrError> {
        Expr::nary(MathOp::Sub, vec![a, b])
    }

    pub fn mul(a: Expr, b: Expr) -> Result<Expr, IrError> {
        Expr::nary(MathOp::Mul, vec![a, b])
    }

    pub fn div(a: Expr, b: Expr) -> Result<Expr, IrError> {
        Expr::nary(MathOp::Div, vec![a, b])
    }

    pub fn max(a: Expr, b: Expr) -> Result<Expr, IrError> {
        Expr::nary(MathOp::Max, vec![a, b])
    }

    pub fn min(a: Expr, b: Expr) -> Result<Expr, IrError> {
        Expr::nary(MathOp::Min, vec![a, b])
    }

    pub fn lt(a: Expr, b: Expr) -> Result<Expr, IrError> {
        Expr::nary(MathOp::Lt, vec![a, b])
    }

    pub fn lte(a: Expr, b: Expr) -> Result<Expr, IrError> {
        Expr::nary(MathOp::Lte, vec![a, b])
    }

    pub fn gt(a: Expr, b: Expr) -> Result<Expr, IrError> {
        Expr::nary(MathOp::Gt, vec![a, b])
    }

    pub fn gte(a: Expr, b: Expr) -> Result<Expr, IrError> {
        Expr::nary(MathOp::Gte, vec![a, b])
    }

    pub fn eq(a: Expr, b: Expr) -> Result<Expr, IrError> {
        Expr::nary(MathOp::Eq, vec![a, b])
    }

    pub fn and(a: Expr, b: Expr) -> Result<Expr, IrError> {
        Expr::nary(MathOp::And, vec![a, b])
    }

    pub fn or(a: Expr, b: Expr) -> Result<Expr, IrError> {
        Expr::nary(MathOp::Or, vec![a, b])
    }

    pub fn not(a: Expr) -> Result<Expr, IrError> {
        Expr::nary(MathOp::Not, vec![a])
    }

    pub fn implies(a: Expr, b: Expr) -> Result<Expr, IrError> {
        Expr::nary(MathOp::Implies, vec![a, b])
    }

    pub fn forall(var: &Sym, body: Expr) -> Result<Expr, IrError> {
        Expr::nary(MathOp::ForAll, vec![Expr::sym(var), body])
    }

    pub fn exists(var: &Sym, body: Expr) -> Result<Expr, IrError> {
        Expr::nary(MathOp::Exists, vec![Expr::sym(var), body])
    }

    pub fn select(cond: Expr, then: Expr, otherwise: Expr) -> Result<Expr, IrError> {
        if !cond.ty.is_bool() {
            return Err(IrError::mismatch("select condition", DataType::Bool, &cond.ty));
        }
        if then.ty != otherwise.ty {
            return Err(IrError::mismatch("select branches", &then.ty, &otherwise.ty));
        }
        Ok(Expr {
            ty: then.ty.clone(),
            kind: ExprKind::Select {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
        })
    }

    // ---- Structs ----

    /// Field `col` of a struct. A primitive value is its own field 0.
    pub fn get(val: Expr, col: usize) -> Result<Expr, IrError> {
        let ty = match &val.ty {
            DataType::Struct(fields) => fields
                .get(col)
                .cloned()
                .ok_or_else(|| IrError::ColumnOutOfRange {
                    col,
                    ty: val.ty.to_string(),
                })?,
            t if t.is_primitive() && col == 0 => t.clone(),
            t => {
                return Err(IrError::ColumnOutOfRange {
                    col,
                    ty: t.to_string(),
                })
            }
        };
        Ok(Expr {
            ty,
            kind: ExprKind::Get {
                val: Box::new(val),
                col,
            },
        })
    }

    pub fn new_struct(vals: Vec<Expr>) -> Result<Expr, IrError> {
        if let Some(bad) = vals.iter().find(|v| !v.ty.is_val()) {
            return Err(IrError::operand(
                "struct literal",
                format!("field of type '{}' is not a value", bad.ty),
            ));
        }
        let ty = DataType::struct_of(vals.iter().map(|v| v.ty.clone()).collect())?;
        Ok(Expr {
            ty,
            kind: ExprKind::New(vals),
        })
    }

    pub fn call(name: impl Into<String>, ty: DataType, args: Vec<Expr>) -> Expr {
        Expr {
            ty,
            kind: ExprKind::Call {
                name: name.into(),
                args,
            },
        }
    }

    // ---- Declarative operators ----

    pub fn op(op: Op) -> Expr {
        Expr {
            ty: op.ty().clone(),
            kind: ExprKind::Op(Box::new(op)),
        }
    }

    pub fn reduce(red: Reduce) -> Expr {
        Expr {
            ty: red.ty().clone(),
            kind: ExprKind::Reduce(Box::new(red)),
        }
    }

    pub fn element(vec: Expr, iters: Vec<Expr>) -> Result<Expr, IrError> {
        let cols = vec.ty.columns()?;
        let dim = vec.ty.dim();
        if iters.len() != dim {
            return Err(IrError::operand(
                "element",
                format!("vector of dimension {} indexed with {} iterators", dim, iters.len()),
            ));
        }
        for (i, it) in iters.iter().enumerate() {
            if it.ty != cols[i] {
                return Err(IrError::mismatch("element coordinate", &cols[i], &it.ty));
            }
        }
        let ty = vec.ty.valty()?;
        Ok(Expr {
            ty,
            kind: ExprKind::Element {
                vec: Box::new(vec),
                iters,
            },
        })
    }

    pub fn in_vec(iter: Expr, vec: Expr) -> Result<Expr, IrError> {
        let iterty = vec.ty.iterty()?;
        if vec.ty.dim() != 1 {
            return Err(IrError::operand(
                "membership",
                "only one-dimensional vectors can drive an iterator",
            ));
        }
        if iter.ty != iterty {
            return Err(IrError::mismatch("membership", iterty, &iter.ty));
        }
        Ok(Expr {
            ty: DataType::Bool,
            kind: ExprKind::In {
                iter: Box::new(iter),
                vec: Box::new(vec),
            },
        })
    }

    pub fn not_null(elem: Expr) -> Result<Expr, IrError> {
        if !matches!(elem.kind, ExprKind::Element { .. }) {
            return Err(IrError::operand("not-null", "operand must be a vector element"));
        }
        Ok(Expr {
            ty: DataType::Bool,
            kind: ExprKind::NotNull(Box::new(elem)),
        })
    }

    // ---- Memory ----

    pub fn alloc(elem: DataType, size: Expr) -> Result<Expr, IrError> {
        if !size.ty.is_integral() {
            return Err(IrError::mismatch("alloc size", "integer", &size.ty));
        }
        if !elem.is_val() {
            return Err(IrError::operand("alloc", format!("cannot allocate '{}'", elem)));
        }
        Ok(Expr {
            ty: elem.ptr(),
            kind: ExprKind::Alloc {
                elem,
                size: Box::new(size),
            },
        })
    }

    /// A single cell of `elem`.
    pub fn alloc_one(elem: DataType) -> Result<Expr, IrError> {
        Expr::alloc(elem, Expr::idx(1))
    }

    pub fn load(addr: Expr) -> Result<Expr, IrError> {
        let ty = addr.ty.deref()?.clone();
        Ok(Expr {
            ty,
            kind: ExprKind::Load(Box::new(addr)),
        })
    }

    pub fn struct_gep(addr: Expr, col: usize) -> Result<Expr, IrError> {
        let field = match addr.ty.deref()? {
            DataType::Struct(fields) => fields.get(col).cloned(),
            _ => None,
        }
        .ok_or_else(|| IrError::ColumnOutOfRange {
            col,
            ty: addr.ty.to_string(),
        })?;
        Ok(Expr {
            ty: field.ptr(),
            kind: ExprKind::StructGep {
                addr: Box::new(addr),
                col,
            },
        })
    }

    pub fn fetch_data_ptr(vec: Expr, idx: Expr, col: usize) -> Result<Expr, IrError> {
        if !idx.ty.is_idx() {
            return Err(IrError::mismatch("vector position", DataType::Idx, &idx.ty));
        }
        let col_ty = vec
            .ty
            .columns()?
            .get(col)
            .cloned()
            .ok_or_else(|| IrError::ColumnOutOfRange {
                col,
                ty: vec.ty.to_string(),
            })?;
        Ok(Expr {
            ty: col_ty.ptr(),
            kind: ExprKind::FetchDataPtr {
                vec: Box::new(vec),
                idx: Box::new(idx),
                col,
            },
        })
    }

    // ---- Control ----

    pub fn from_loop(lp: Loop) -> Result<Expr, IrError> {
        if !lp.exit_cond.ty.is_bool() {
            return Err(IrError::mismatch("loop exit condition", DataType::Bool, &lp.exit_cond.ty));
        }
        if let Some(bc) = &lp.body_cond {
            if !bc.ty.is_bool() {
                return Err(IrError::mismatch("loop body condition", DataType::Bool, &bc.ty));
            }
        }
        Ok(Expr {
            ty: lp.output.ty.clone(),
            kind: ExprKind::Loop(Box::new(lp)),
        })
    }

    pub fn stmt(stmt: Stmt) -> Expr {
        Expr {
            ty: DataType::Void,
            kind: ExprKind::Stmt(Box::new(stmt)),
        }
    }

    /// Whether `sym` occurs in this expression, looking through bindings in
    /// `tbl` for any other symbol reached.
    pub fn mentions(&self, sym: &Sym, tbl: &SymTable) -> bool {
        let mut seen: Vec<Sym> = Vec::new();
        let mut work: Vec<&Expr> = vec![self];
        while let Some(e) = work.pop() {
            let mut refs = Vec::new();
            visit_expr(e, &mut |node: &Expr| {
                if let ExprKind::Sym(s) = &node.kind {
                    refs.push(s.clone());
                }
            });
            for s in refs {
                if &s == sym {
                    return true;
                }
                if seen.contains(&s) {
                    continue;
                }
                if let Some(bound) = tbl.get(&s) {
                    work.push(bound);
                }
                seen.push(s);
            }
        }
        false
    }
}

fn same_type(ctx: &str, args: &[Expr]) -> Result<(), IrError> {
    if args[0].ty != args[1].ty {
        return Err(IrError::mismatch(ctx, &args[0].ty, &args[1].ty));
    }
    Ok(())
}

fn numeric(ctx: &str, arg: &Expr) -> Result<(), IrError> {
    if arg.ty.is_int() || arg.ty.is_float() || arg.ty.is_idx() {
        Ok(())
    } else {
        Err(IrError::mismatch(ctx, "numeric", &arg.ty))
    }
}
