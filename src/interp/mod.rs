//! Reference evaluator for lowered loop IR.
//!
//! The evaluator is a tree walker over `Func` and its symbol table. It is
//! the oracle the tests compare lowered functions against, not an execution
//! engine: the declarative nodes (`Op`, `Reduce`, `Element`, `In`,
//! `NotNull`) and quantifiers are rejected, so a function must go through
//! [`lower_func`](crate::pass::lower_func) first.
//!
//! Symbols are evaluated the first time they are referenced and cached in
//! the innermost scope. Every loop iteration runs in a scope of its own, so
//! symbols that depend on the iterator are recomputed per iteration, while
//! `init` runs in the enclosing scope and its allocations survive the loop.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::config::InterpConfig;
use crate::error::InterpError;
use crate::ir::storage;
use crate::ir::{ConstVal, DataType, Expr, ExprKind, Func, Loop, MathOp, Stmt, Sym};

/// A column-major vector: coordinate columns first, then payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnVector {
    ty: DataType,
    columns: Vec<Vec<Value>>,
    validity: Vec<Vec<bool>>,
    len: usize,
}

impl ColumnVector {
    /// An empty vector of vector type `ty`.
    pub fn new(ty: DataType) -> Result<Self, InterpError> {
        let ncols = ty
            .columns()
            .map_err(|e| InterpError::TypeError {
                detail: e.to_string(),
            })?
            .len();
        Ok(ColumnVector {
            ty,
            columns: vec![Vec::new(); ncols],
            validity: vec![Vec::new(); ncols],
            len: 0,
        })
    }

    /// Builds a vector from whole columns. All columns must have the same
    /// length and every value starts out valid.
    pub fn from_columns(ty: DataType, columns: Vec<Vec<Value>>) -> Result<Self, InterpError> {
        let mut vec = ColumnVector::new(ty)?;
        if columns.len() != vec.columns.len() {
            return Err(InterpError::TypeError {
                detail: format!(
                    "vector of type '{}' needs {} columns, got {}",
                    vec.ty,
                    vec.columns.len(),
                    columns.len()
                ),
            });
        }
        let len = columns.first().map_or(0, Vec::len);
        if columns.iter().any(|c| c.len() != len) {
            return Err(InterpError::TypeError {
                detail: "vector columns differ in length".into(),
            });
        }
        vec.validity = vec![vec![true; len]; columns.len()];
        vec.columns = columns;
        vec.len = len;
        Ok(vec)
    }

    /// Marks one cell as null.
    pub fn with_null(mut self, row: usize, col: usize) -> Self {
        if let Some(v) = self.validity.get_mut(col).and_then(|c| c.get_mut(row)) {
            *v = false;
        }
        self
    }

    pub fn ty(&self) -> &DataType {
        &self.ty
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Value> {
        if row >= self.len {
            return None;
        }
        self.columns.get(col).and_then(|c| c.get(row))
    }

    /// The first `len` values of column `col`.
    pub fn column(&self, col: usize) -> Vec<Value> {
        self.columns
            .get(col)
            .map(|c| c.iter().take(self.len).cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        row < self.len
            && self
                .validity
                .get(col)
                .and_then(|c| c.get(row))
                .copied()
                .unwrap_or(false)
    }

    /// Position of the first row whose column-0 value is not less than
    /// `iter`. Rows are sorted on the iterator column.
    fn locate(&self, iter: &Value) -> Result<usize, InterpError> {
        let keys = &self.columns[0][..self.len];
        let mut err = None;
        let pos = keys.partition_point(|k| match compare(k, iter) {
            Ok(ord) => ord == Ordering::Less,
            Err(e) => {
                err = Some(e);
                false
            }
        });
        match err {
            Some(e) => Err(e),
            None => Ok(pos),
        }
    }

    fn write(&mut self, row: usize, col: usize, val: Value) -> Result<(), InterpError> {
        let dtypes = self.ty.columns().map_err(|e| InterpError::TypeError {
            detail: e.to_string(),
        })?;
        let Some(col_ty) = dtypes.get(col).cloned() else {
            return Err(InterpError::TypeError {
                detail: format!("column {} of '{}'", col, self.ty),
            });
        };
        let column = &mut self.columns[col];
        if row >= column.len() {
            column.resize(row + 1, Value::zero(&col_ty));
            self.validity[col].resize(row + 1, false);
        }
        column[row] = val;
        self.validity[col][row] = true;
        Ok(())
    }

    fn set_len(&mut self, len: usize) -> Result<(), InterpError> {
        let dtypes = self
            .ty
            .columns()
            .map_err(|e| InterpError::TypeError {
                detail: e.to_string(),
            })?
            .to_vec();
        for (col, ty) in dtypes.iter().enumerate() {
            if self.columns[col].len() < len {
                self.columns[col].resize(len, Value::zero(ty));
                self.validity[col].resize(len, false);
            }
        }
        self.len = len;
        Ok(())
    }
}

pub type VectorRef = Rc<RefCell<ColumnVector>>;

/// Address of a memory cell or of one vector cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Ptr {
    /// Allocation `cell`, then struct field `path` inside it.
    Cell { cell: usize, path: Vec<usize> },
    Data { vec: VectorRef, row: usize, col: usize },
}

/// A runtime value produced by the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Struct(Vec<Value>),
    Ptr(Ptr),
    Vector(VectorRef),
    /// Result of statements and `vector_set_len`.
    Unit,
}

impl Value {
    pub fn vector(vec: ColumnVector) -> Value {
        Value::Vector(Rc::new(RefCell::new(vec)))
    }

    /// The zero value of `ty`, used for fresh allocations and vector growth.
    pub fn zero(ty: &DataType) -> Value {
        match ty {
            DataType::Bool => Value::Bool(false),
            DataType::Float32 | DataType::Float64 => Value::Float(0.0),
            DataType::Struct(fields) => Value::Struct(fields.iter().map(Value::zero).collect()),
            t if t.is_integral() => Value::Int(0),
            _ => Value::Unit,
        }
    }

    pub fn as_bool(&self) -> Result<bool, InterpError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(type_error("bool", other)),
        }
    }

    pub fn as_int(&self) -> Result<i64, InterpError> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(type_error("integer", other)),
        }
    }

    pub fn as_float(&self) -> Result<f64, InterpError> {
        match self {
            Value::Float(v) => Ok(*v),
            other => Err(type_error("float", other)),
        }
    }

    pub fn as_vector(&self) -> Result<&VectorRef, InterpError> {
        match self {
            Value::Vector(v) => Ok(v),
            other => Err(type_error("vector", other)),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Struct(vals) => {
                write!(f, "{{")?;
                for (i, v) in vals.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "}}")
            }
            Value::Ptr(Ptr::Cell { cell, path }) => write!(f, "&cell{}{:?}", cell, path),
            Value::Ptr(Ptr::Data { row, col, .. }) => write!(f, "&vec[{}][{}]", row, col),
            Value::Vector(v) => {
                let v = v.borrow();
                write!(f, "<{} x {}>", v.len(), v.ty())
            }
            Value::Unit => write!(f, "()"),
        }
    }
}

fn type_error(expected: &str, found: &Value) -> InterpError {
    InterpError::TypeError {
        detail: format!("expected {} but found '{}'", expected, found),
    }
}

fn to_row(idx: i64, len: usize) -> Result<usize, InterpError> {
    usize::try_from(idx).map_err(|_| InterpError::IndexOutOfBounds { idx, len })
}

/// Evaluates `func` on `args` with the default limits.
pub fn eval_func(func: &Func, args: &[Value]) -> Result<Value, InterpError> {
    eval_func_with(func, args, &InterpConfig::default())
}

/// Evaluates `func` on `args`. Returns `Value::Unit` for procedures.
pub fn eval_func_with(
    func: &Func,
    args: &[Value],
    config: &InterpConfig,
) -> Result<Value, InterpError> {
    if args.len() != func.inputs.len() {
        return Err(InterpError::TypeError {
            detail: format!(
                "'{}' takes {} arguments but {} were supplied",
                func.name,
                func.inputs.len(),
                args.len()
            ),
        });
    }
    let mut globals = HashMap::new();
    for (input, arg) in func.inputs.iter().zip(args) {
        globals.insert(input.clone(), arg.clone());
    }
    let mut interp = Interpreter {
        func,
        scopes: vec![globals],
        cells: Vec::new(),
        steps: 0,
        max_steps: config.max_steps,
    };
    let out = interp.eval(&func.output)?;
    debug!(func = %func.name, steps = interp.steps, cells = interp.cells.len(), "evaluated");
    Ok(out)
}

struct Interpreter<'f> {
    func: &'f Func,
    scopes: Vec<HashMap<Sym, Value>>,
    /// Memory behind `Alloc`.
    cells: Vec<Value>,
    steps: usize,
    max_steps: usize,
}

impl<'f> Interpreter<'f> {
    fn lookup(&mut self, sym: &Sym) -> Result<Value, InterpError> {
        if let Some(v) = self.scopes.iter().rev().find_map(|s| s.get(sym)) {
            return Ok(v.clone());
        }
        let func = self.func;
        let bound = func.tbl.get(sym).ok_or_else(|| InterpError::UndefinedSymbol {
            name: sym.name().to_owned(),
        })?;
        let val = self.eval(bound)?;
        trace!(sym = %sym, val = %val, depth = self.scopes.len(), "bind");
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(sym.clone(), val.clone());
        }
        Ok(val)
    }

    fn eval(&mut self, e: &Expr) -> Result<Value, InterpError> {
        match e.kind() {
            ExprKind::Sym(sym) => self.lookup(sym),
            ExprKind::Const(c) => Ok(match c {
                ConstVal::Bool(b) => Value::Bool(*b),
                ConstVal::Int(v) => Value::Int(wrap(e.ty(), *v)),
                ConstVal::Float(v) => Value::Float(*v),
            }),
            ExprKind::Cast(arg) => {
                let v = self.eval(arg)?;
                eval_cast(&v, e.ty())
            }
            ExprKind::Nary { op, args } => self.eval_nary(*op, args, e.ty()),
            ExprKind::Select {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond)?.as_bool()? {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            ExprKind::Get { val, col } => match self.eval(val)? {
                Value::Struct(mut fields) if *col < fields.len() => Ok(fields.swap_remove(*col)),
                prim @ (Value::Bool(_) | Value::Int(_) | Value::Float(_)) if *col == 0 => Ok(prim),
                other => Err(type_error(&format!("struct with field {}", col), &other)),
            },
            ExprKind::New(vals) => {
                let mut fields = Vec::with_capacity(vals.len());
                for v in vals {
                    fields.push(self.eval(v)?);
                }
                Ok(Value::Struct(fields))
            }
            ExprKind::Call { name, args } => {
                let mut vals = Vec::with_capacity(args.len());
                for a in args {
                    vals.push(self.eval(a)?);
                }
                eval_call(name, &vals, e.ty())
            }
            ExprKind::Op(_)
            | ExprKind::Reduce(_)
            | ExprKind::Element { .. }
            | ExprKind::In { .. }
            | ExprKind::NotNull(_) => Err(InterpError::Unsupported {
                detail: format!("declarative node '{}' must be lowered before evaluation", e),
            }),
            ExprKind::Alloc { elem, size } => {
                let size = self.eval(size)?.as_int()?;
                if size != 1 {
                    return Err(InterpError::Unsupported {
                        detail: format!("allocation of {} cells", size),
                    });
                }
                self.cells.push(Value::zero(elem));
                Ok(Value::Ptr(Ptr::Cell {
                    cell: self.cells.len() - 1,
                    path: Vec::new(),
                }))
            }
            ExprKind::Load(addr) => {
                let ptr = self.eval(addr)?;
                self.read(&ptr)
            }
            ExprKind::StructGep { addr, col } => match self.eval(addr)? {
                Value::Ptr(Ptr::Cell { cell, mut path }) => {
                    path.push(*col);
                    Ok(Value::Ptr(Ptr::Cell { cell, path }))
                }
                other => Err(type_error("pointer to a struct cell", &other)),
            },
            ExprKind::FetchDataPtr { vec, idx, col } => {
                let vec = self.eval(vec)?.as_vector()?.clone();
                let idx = self.eval(idx)?.as_int()?;
                let row = to_row(idx, vec.borrow().len())?;
                Ok(Value::Ptr(Ptr::Data { vec, row, col: *col }))
            }
            ExprKind::Loop(lp) => self.eval_loop(lp),
            ExprKind::Stmt(s) => {
                self.exec(s)?;
                Ok(Value::Unit)
            }
        }
    }

    fn eval_loop(&mut self, lp: &Loop) -> Result<Value, InterpError> {
        if let Some(init) = &lp.init {
            self.exec(init)?;
        }
        loop {
            self.steps += 1;
            if self.steps > self.max_steps {
                return Err(InterpError::StepLimit {
                    limit: self.max_steps,
                });
            }
            self.scopes.push(HashMap::new());
            let res = self.iteration(lp);
            self.scopes.pop();
            if !res? {
                break;
            }
        }
        if let Some(post) = &lp.post {
            self.exec(post)?;
        }
        self.eval(&lp.output)
    }

    /// Runs one iteration; `false` once the exit condition holds.
    fn iteration(&mut self, lp: &Loop) -> Result<bool, InterpError> {
        if self.eval(&lp.exit_cond)?.as_bool()? {
            return Ok(false);
        }
        let run = match &lp.body_cond {
            Some(cond) => self.eval(cond)?.as_bool()?,
            None => true,
        };
        if run {
            self.exec(&lp.body)?;
        }
        if let Some(incr) = &lp.incr {
            self.exec(incr)?;
        }
        Ok(true)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<(), InterpError> {
        match stmt {
            Stmt::Stmts(stmts) => {
                for s in stmts {
                    self.exec(s)?;
                }
                Ok(())
            }
            Stmt::Store(st) => {
                let ptr = self.eval(st.addr())?;
                let val = self.eval(st.val())?;
                self.write(&ptr, val)
            }
            Stmt::IfElse(ie) => {
                if self.eval(ie.cond())?.as_bool()? {
                    self.exec(ie.then())
                } else {
                    self.exec(ie.otherwise())
                }
            }
            Stmt::Eval(e) => self.eval(e).map(|_| ()),
            Stmt::NoOp => Ok(()),
        }
    }

    fn read(&self, ptr: &Value) -> Result<Value, InterpError> {
        match ptr {
            Value::Ptr(Ptr::Cell { cell, path }) => {
                let mut cur = self.cells.get(*cell).ok_or_else(|| InterpError::TypeError {
                    detail: format!("dangling pointer to cell {}", cell),
                })?;
                for &col in path {
                    cur = match cur {
                        Value::Struct(fields) if col < fields.len() => &fields[col],
                        other => return Err(type_error("struct cell", other)),
                    };
                }
                Ok(cur.clone())
            }
            Value::Ptr(Ptr::Data { vec, row, col }) => {
                let vec = vec.borrow();
                vec.get(*row, *col)
                    .cloned()
                    .ok_or(InterpError::IndexOutOfBounds {
                        idx: *row as i64,
                        len: vec.len(),
                    })
            }
            other => Err(type_error("pointer", other)),
        }
    }

    fn write(&mut self, ptr: &Value, val: Value) -> Result<(), InterpError> {
        match ptr {
            Value::Ptr(Ptr::Cell { cell, path }) => {
                let mut cur = self.cells.get_mut(*cell).ok_or_else(|| InterpError::TypeError {
                    detail: format!("dangling pointer to cell {}", cell),
                })?;
                for &col in path {
                    if !matches!(&*cur, Value::Struct(fields) if col < fields.len()) {
                        return Err(type_error("struct cell", cur));
                    }
                    cur = match cur {
                        Value::Struct(fields) => &mut fields[col],
                        _ => {
                            return Err(InterpError::TypeError {
                                detail: format!("cell path step {} is not a struct field", col),
                            })
                        }
                    };
                }
                *cur = val;
                Ok(())
            }
            Value::Ptr(Ptr::Data { vec, row, col }) => vec.borrow_mut().write(*row, *col, val),
            other => Err(type_error("pointer", other)),
        }
    }

    fn eval_nary(&mut self, op: MathOp, args: &[Expr], ty: &DataType) -> Result<Value, InterpError> {
        match op {
            MathOp::And => {
                if !self.eval(&args[0])?.as_bool()? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval(&args[1])?.as_bool()?))
            }
            MathOp::Or => {
                if self.eval(&args[0])?.as_bool()? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval(&args[1])?.as_bool()?))
            }
            MathOp::Implies => {
                if !self.eval(&args[0])?.as_bool()? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval(&args[1])?.as_bool()?))
            }
            MathOp::Not => Ok(Value::Bool(!self.eval(&args[0])?.as_bool()?)),
            MathOp::ForAll | MathOp::Exists => Err(InterpError::Unsupported {
                detail: format!("quantifier '{}' outside the solver", op),
            }),
            MathOp::Neg | MathOp::Abs => {
                let v = self.eval(&args[0])?;
                eval_unary(op, &v, ty)
            }
            _ => {
                let lv = self.eval(&args[0])?;
                let rv = self.eval(&args[1])?;
                eval_binop(op, &lv, &rv, ty)
            }
        }
    }
}

/// Truncates `v` to the width of integer type `ty`.
fn wrap(ty: &DataType, v: i64) -> i64 {
    match ty {
        DataType::Int8 => v as i8 as i64,
        DataType::Int16 => v as i16 as i64,
        DataType::Int32 => v as i32 as i64,
        DataType::UInt8 => v as u8 as i64,
        DataType::UInt16 => v as u16 as i64,
        DataType::UInt32 => v as u32 as i64,
        _ => v,
    }
}

fn eval_cast(v: &Value, to: &DataType) -> Result<Value, InterpError> {
    let out = match (v, to) {
        (Value::Bool(b), DataType::Bool) => Value::Bool(*b),
        (Value::Int(x), DataType::Bool) => Value::Bool(*x != 0),
        (Value::Float(x), DataType::Bool) => Value::Bool(*x != 0.0),
        (Value::Bool(b), t) if t.is_integral() => Value::Int(*b as i64),
        (Value::Int(x), t) if t.is_integral() => Value::Int(wrap(t, *x)),
        (Value::Float(x), t) if t.is_integral() => Value::Int(wrap(t, *x as i64)),
        (Value::Bool(b), t) if t.is_float() => Value::Float(*b as i64 as f64),
        (Value::Int(x), t) if t.is_float() => Value::Float(*x as f64),
        (Value::Float(x), DataType::Float32) => Value::Float(*x as f32 as f64),
        (Value::Float(x), t) if t.is_float() => Value::Float(*x),
        (other, _) => {
            return Err(InterpError::TypeError {
                detail: format!("cannot cast '{}' to '{}'", other, to),
            })
        }
    };
    Ok(out)
}

fn eval_unary(op: MathOp, v: &Value, ty: &DataType) -> Result<Value, InterpError> {
    match (op, v) {
        (MathOp::Neg, Value::Int(x)) => Ok(Value::Int(wrap(ty, x.wrapping_neg()))),
        (MathOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (MathOp::Abs, Value::Int(x)) => Ok(Value::Int(wrap(ty, x.wrapping_abs()))),
        (MathOp::Abs, Value::Float(x)) => Ok(Value::Float(x.abs())),
        _ => Err(InterpError::TypeError {
            detail: format!("cannot apply '{}' to '{}'", op, v),
        }),
    }
}

fn compare(lv: &Value, rv: &Value) -> Result<Ordering, InterpError> {
    match (lv, rv) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b).ok_or_else(|| InterpError::TypeError {
            detail: "comparison with NaN".into(),
        }),
        _ => Err(InterpError::TypeError {
            detail: format!("cannot compare '{}' with '{}'", lv, rv),
        }),
    }
}

fn eval_binop(op: MathOp, lv: &Value, rv: &Value, ty: &DataType) -> Result<Value, InterpError> {
    if op.is_comparison() {
        let ord = compare(lv, rv)?;
        let b = match op {
            MathOp::Lt => ord == Ordering::Less,
            MathOp::Lte => ord != Ordering::Greater,
            MathOp::Gt => ord == Ordering::Greater,
            MathOp::Gte => ord != Ordering::Less,
            _ => ord == Ordering::Equal,
        };
        return Ok(Value::Bool(b));
    }
    match (lv, rv) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            let r = match op {
                MathOp::Add => a.wrapping_add(b),
                MathOp::Sub => a.wrapping_sub(b),
                MathOp::Mul => a.wrapping_mul(b),
                MathOp::Div | MathOp::Mod if b == 0 => return Err(InterpError::DivisionByZero),
                MathOp::Div => a.wrapping_div(b),
                MathOp::Mod => a.wrapping_rem(b),
                MathOp::Max => a.max(b),
                MathOp::Min => a.min(b),
                _ => {
                    return Err(InterpError::TypeError {
                        detail: format!("'{}' is not an integer operator", op),
                    })
                }
            };
            Ok(Value::Int(wrap(ty, r)))
        }
        (Value::Float(a), Value::Float(b)) => {
            let r = match op {
                MathOp::Add => a + b,
                MathOp::Sub => a - b,
                MathOp::Mul => a * b,
                MathOp::Div => a / b,
                MathOp::Mod => a % b,
                MathOp::Max => a.max(*b),
                MathOp::Min => a.min(*b),
                _ => {
                    return Err(InterpError::TypeError {
                        detail: format!("'{}' is not a float operator", op),
                    })
                }
            };
            Ok(Value::Float(r))
        }
        _ => Err(InterpError::TypeError {
            detail: format!("'{}' on '{}' and '{}'", op, lv, rv),
        }),
    }
}

fn eval_call(name: &str, args: &[Value], ty: &DataType) -> Result<Value, InterpError> {
    let arg = |i: usize| {
        args.get(i).ok_or_else(|| InterpError::TypeError {
            detail: format!("'{}' is missing argument {}", name, i),
        })
    };
    match name {
        storage::VECTOR_LEN => {
            let vec = arg(0)?.as_vector()?.borrow();
            Ok(Value::Int(vec.len() as i64))
        }
        storage::VECTOR_LOOKUP => {
            let vec = arg(0)?.as_vector()?.borrow();
            let idx = arg(1)?.as_int()?;
            let row = to_row(idx, vec.len())?;
            vec.get(row, 0).cloned().ok_or(InterpError::IndexOutOfBounds {
                idx,
                len: vec.len(),
            })
        }
        storage::VECTOR_LOCATE => {
            let vec = arg(0)?.as_vector()?.borrow();
            Ok(Value::Int(vec.locate(arg(1)?)? as i64))
        }
        storage::VECTOR_IS_VALID => {
            let vec = arg(0)?.as_vector()?.borrow();
            let idx = arg(1)?.as_int()?;
            let col = to_row(arg(2)?.as_int()?, vec.len())?;
            let row = to_row(idx, vec.len())?;
            Ok(Value::Bool(vec.is_valid(row, col)))
        }
        storage::VECTOR_MAKE => {
            let capacity = arg(0)?.as_int()?.max(0) as usize;
            let mut vec = ColumnVector::new(ty.clone())?;
            for (col, valid) in vec.columns.iter_mut().zip(vec.validity.iter_mut()) {
                col.reserve(capacity);
                valid.reserve(capacity);
            }
            Ok(Value::vector(vec))
        }
        storage::VECTOR_SET_LEN => {
            let vec = arg(0)?.as_vector()?;
            let len = arg(1)?.as_int()?;
            let len = to_row(len, vec.borrow().len())?;
            vec.borrow_mut().set_len(len)?;
            Ok(Value::Unit)
        }
        other => Err(InterpError::Unsupported {
            detail: format!("call to unknown function '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::SymTable;

    fn ints(ty: DataType, cols: Vec<Vec<i64>>) -> ColumnVector {
        let cols = cols
            .into_iter()
            .map(|c| c.into_iter().map(Value::Int).collect())
            .collect();
        ColumnVector::from_columns(ty, cols).unwrap()
    }

    #[test]
    fn locate_finds_first_row_not_below() {
        let ty = DataType::vector(vec![DataType::Int64], 1).unwrap();
        let v = ints(ty, vec![vec![2, 4, 4, 9]]);
        assert_eq!(v.locate(&Value::Int(4)).unwrap(), 1);
        assert_eq!(v.locate(&Value::Int(5)).unwrap(), 3);
        assert_eq!(v.locate(&Value::Int(10)).unwrap(), 4);
    }

    #[test]
    fn integer_ops_wrap_to_width() {
        let r = eval_binop(MathOp::Add, &Value::Int(i32::MAX as i64), &Value::Int(1), &DataType::Int32);
        assert_eq!(r.unwrap(), Value::Int(i32::MIN as i64));
        let r = eval_binop(MathOp::Div, &Value::Int(1), &Value::Int(0), &DataType::Int64);
        assert_eq!(r, Err(InterpError::DivisionByZero));
    }

    #[test]
    fn rejects_wrong_arity() {
        let x = Sym::new("x", DataType::Int64);
        let f = Func::new("id", Expr::sym(&x), vec![x], SymTable::new());
        assert!(matches!(eval_func(&f, &[]), Err(InterpError::TypeError { .. })));
        assert_eq!(eval_func(&f, &[Value::Int(7)]).unwrap(), Value::Int(7));
    }

    #[test]
    fn scalar_bindings_are_evaluated_once_per_scope() {
        let x = Sym::new("x", DataType::Int64);
        let y = Sym::new("y", DataType::Int64);
        let mut tbl = SymTable::new();
        tbl.bind(y.clone(), Expr::mul(Expr::sym(&x), Expr::i64(3)).unwrap())
            .unwrap();
        let out = Expr::add(Expr::sym(&y), Expr::sym(&y)).unwrap();
        let f = Func::new("f", out, vec![x], tbl);
        assert_eq!(eval_func(&f, &[Value::Int(5)]).unwrap(), Value::Int(30));
    }

    #[test]
    fn writes_follow_struct_cell_paths() {
        let f = Func::new("unit", Expr::i64(0), vec![], SymTable::new());
        let mut interp = Interpreter {
            func: &f,
            scopes: vec![HashMap::new()],
            cells: vec![Value::Struct(vec![Value::Int(1), Value::Struct(vec![Value::Int(2)])])],
            steps: 0,
            max_steps: 0,
        };
        let field = Value::Ptr(Ptr::Cell {
            cell: 0,
            path: vec![1, 0],
        });
        interp.write(&field, Value::Int(9)).unwrap();
        assert_eq!(interp.read(&field).unwrap(), Value::Int(9));

        let through_scalar = Value::Ptr(Ptr::Cell {
            cell: 0,
            path: vec![0, 0],
        });
        let err = interp.write(&through_scalar, Value::Int(3)).unwrap_err();
        assert!(matches!(err, InterpError::TypeError { .. }));
    }
}
