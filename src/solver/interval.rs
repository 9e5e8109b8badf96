//! Reference solver for linear integer formulas with at most one
//! quantifier.
//!
//! Every atom is a comparison between integer terms linear in the
//! quantified variable and the parameters. Once the parameters are fixed,
//! each atom changes truth value only around one threshold, so checking the
//! quantifier on the integers next to every threshold (and beyond the
//! outermost ones) decides it exactly. Parameter candidates are taken from
//! the same thresholds.

use std::collections::HashMap;

use tracing::trace;

use crate::error::SolverError;
use crate::ir::{ConstVal, Expr, ExprKind, MathOp, Sym};
use crate::solver::{Model, SolveResult, Solver};

/// Integer linear term `sum(coeff * var) + constant`.
#[derive(Debug, Clone, Default)]
struct Linear {
    coeffs: Vec<(Sym, i128)>,
    constant: i128,
}

impl Linear {
    fn constant(c: i128) -> Self {
        Linear {
            coeffs: Vec::new(),
            constant: c,
        }
    }

    fn var(s: &Sym) -> Self {
        Linear {
            coeffs: vec![(s.clone(), 1)],
            constant: 0,
        }
    }

    fn coeff(&self, s: &Sym) -> i128 {
        self.coeffs
            .iter()
            .filter(|(v, _)| v == s)
            .map(|(_, c)| *c)
            .sum()
    }

    fn is_constant(&self) -> bool {
        self.coeffs.iter().all(|(_, c)| *c == 0)
    }

    fn add(mut self, other: Linear, sign: i128) -> Linear {
        for (s, c) in other.coeffs {
            match self.coeffs.iter_mut().find(|(v, _)| *v == s) {
                Some((_, existing)) => *existing += sign * c,
                None => self.coeffs.push((s, sign * c)),
            }
        }
        self.constant += sign * other.constant;
        self
    }

    fn scale(mut self, k: i128) -> Linear {
        for (_, c) in &mut self.coeffs {
            *c *= k;
        }
        self.constant *= k;
        self
    }

    /// Value with every variable except `keep` substituted from `env`
    /// (missing entries read as 0): returns `(coeff of keep, constant)`.
    fn partial(&self, keep: &Sym, env: &HashMap<Sym, i128>) -> (i128, i128) {
        let mut a = 0;
        let mut c = self.constant;
        for (s, k) in &self.coeffs {
            if s == keep {
                a += k;
            } else {
                c += k * env.get(s).copied().unwrap_or(0);
            }
        }
        (a, c)
    }

    fn eval(&self, env: &HashMap<Sym, i128>) -> i128 {
        self.coeffs
            .iter()
            .map(|(s, k)| k * env.get(s).copied().unwrap_or(0))
            .sum::<i128>()
            + self.constant
    }
}

#[derive(Debug, Clone, Copy)]
enum Cmp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

/// Quantifier-free formula; atoms compare a linear term against zero.
#[derive(Debug, Clone)]
enum Formula {
    Const(bool),
    Atom(Linear, Cmp),
    Not(Box<Formula>),
    And(Box<Formula>, Box<Formula>),
    Or(Box<Formula>, Box<Formula>),
    Implies(Box<Formula>, Box<Formula>),
}

impl Formula {
    fn eval(&self, env: &HashMap<Sym, i128>) -> bool {
        match self {
            Formula::Const(b) => *b,
            Formula::Atom(lin, cmp) => {
                let v = lin.eval(env);
                match cmp {
                    Cmp::Lt => v < 0,
                    Cmp::Le => v <= 0,
                    Cmp::Gt => v > 0,
                    Cmp::Ge => v >= 0,
                    Cmp::Eq => v == 0,
                }
            }
            Formula::Not(f) => !f.eval(env),
            Formula::And(a, b) => a.eval(env) && b.eval(env),
            Formula::Or(a, b) => a.eval(env) || b.eval(env),
            Formula::Implies(a, b) => !a.eval(env) || b.eval(env),
        }
    }

    fn atoms<'a>(&'a self, out: &mut Vec<&'a Linear>) {
        match self {
            Formula::Const(_) => {}
            Formula::Atom(lin, _) => out.push(lin),
            Formula::Not(f) => f.atoms(out),
            Formula::And(a, b) | Formula::Or(a, b) | Formula::Implies(a, b) => {
                a.atoms(out);
                b.atoms(out);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Quant {
    ForAll,
    Exists,
}

fn unsupported(detail: impl Into<String>) -> SolverError {
    SolverError::Unsupported {
        detail: detail.into(),
    }
}

fn linear(e: &Expr, vars: &mut Vec<Sym>) -> Result<Linear, SolverError> {
    match e.kind() {
        ExprKind::Const(ConstVal::Int(v)) => Ok(Linear::constant(*v as i128)),
        ExprKind::Sym(s) if s.ty().is_integral() => {
            if !vars.contains(s) {
                vars.push(s.clone());
            }
            Ok(Linear::var(s))
        }
        ExprKind::Cast(arg) if e.ty().is_integral() && arg.ty().is_integral() => linear(arg, vars),
        ExprKind::Nary { op, args } => match op {
            MathOp::Add => Ok(linear(&args[0], vars)?.add(linear(&args[1], vars)?, 1)),
            MathOp::Sub => Ok(linear(&args[0], vars)?.add(linear(&args[1], vars)?, -1)),
            MathOp::Neg => Ok(linear(&args[0], vars)?.scale(-1)),
            MathOp::Mul => {
                let a = linear(&args[0], vars)?;
                let b = linear(&args[1], vars)?;
                if a.is_constant() {
                    Ok(b.scale(a.constant))
                } else if b.is_constant() {
                    Ok(a.scale(b.constant))
                } else {
                    Err(unsupported(format!("non-linear product '{}'", e)))
                }
            }
            _ => Err(unsupported(format!("operator '{}' in term '{}'", op, e))),
        },
        _ => Err(unsupported(format!("term '{}'", e))),
    }
}

fn formula(e: &Expr, vars: &mut Vec<Sym>) -> Result<Formula, SolverError> {
    match e.kind() {
        ExprKind::Const(ConstVal::Bool(b)) => Ok(Formula::Const(*b)),
        ExprKind::Nary { op, args } => {
            let cmp = match op {
                MathOp::Lt => Some(Cmp::Lt),
                MathOp::Lte => Some(Cmp::Le),
                MathOp::Gt => Some(Cmp::Gt),
                MathOp::Gte => Some(Cmp::Ge),
                MathOp::Eq => Some(Cmp::Eq),
                _ => None,
            };
            if let Some(cmp) = cmp {
                let lhs = linear(&args[0], vars)?;
                let rhs = linear(&args[1], vars)?;
                return Ok(Formula::Atom(lhs.add(rhs, -1), cmp));
            }
            match op {
                MathOp::Not => Ok(Formula::Not(Box::new(formula(&args[0], vars)?))),
                MathOp::And => Ok(Formula::And(
                    Box::new(formula(&args[0], vars)?),
                    Box::new(formula(&args[1], vars)?),
                )),
                MathOp::Or => Ok(Formula::Or(
                    Box::new(formula(&args[0], vars)?),
                    Box::new(formula(&args[1], vars)?),
                )),
                MathOp::Implies => Ok(Formula::Implies(
                    Box::new(formula(&args[0], vars)?),
                    Box::new(formula(&args[1], vars)?),
                )),
                MathOp::ForAll | MathOp::Exists => {
                    Err(unsupported("nested quantifiers"))
                }
                _ => Err(unsupported(format!("operator '{}' in formula", op))),
            }
        }
        _ => Err(unsupported(format!("formula '{}'", e))),
    }
}

fn floor_div(a: i128, b: i128) -> i128 {
    let q = a / b;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

fn ceil_div(a: i128, b: i128) -> i128 {
    -floor_div(-a, b)
}

/// Integers around the point where `a * x + c` crosses zero.
fn push_threshold(a: i128, c: i128, out: &mut Vec<i128>) {
    if a == 0 {
        return;
    }
    let lo = floor_div(-c, a);
    let hi = ceil_div(-c, a);
    out.extend([lo - 1, lo, hi, hi + 1]);
}

/// Decides one-quantifier linear integer formulas by critical-point
/// enumeration.
#[derive(Debug, Clone, Default)]
pub struct IntervalSolver;

impl IntervalSolver {
    pub fn new() -> Self {
        IntervalSolver
    }

    fn holds(
        &self,
        body: &Formula,
        quant: Option<(Quant, &Sym)>,
        env: &mut HashMap<Sym, i128>,
    ) -> bool {
        let Some((quant, x)) = quant else {
            return body.eval(env);
        };
        let mut atoms = Vec::new();
        body.atoms(&mut atoms);
        let mut samples = Vec::new();
        for lin in atoms {
            let (a, c) = lin.partial(x, env);
            push_threshold(a, c, &mut samples);
        }
        let lo = samples.iter().copied().min().unwrap_or(0) - 1;
        let hi = samples.iter().copied().max().unwrap_or(0) + 1;
        samples.extend([lo, hi, 0]);
        samples.sort_unstable();
        samples.dedup();

        let mut check = |s: i128| {
            env.insert(x.clone(), s);
            body.eval(env)
        };
        let result = match quant {
            Quant::ForAll => samples.iter().all(|s| check(*s)),
            Quant::Exists => samples.iter().any(|s| check(*s)),
        };
        env.remove(x);
        result
    }

    /// Candidate values for `param`: the thresholds of every atom it occurs
    /// in, with the quantified variable set to each of its own critical
    /// points.
    fn candidates(&self, body: &Formula, param: &Sym, quant_var: Option<&Sym>) -> Vec<i128> {
        let mut atoms = Vec::new();
        body.atoms(&mut atoms);
        let empty = HashMap::new();

        let mut xs = vec![0];
        if let Some(x) = quant_var {
            for lin in &atoms {
                if lin.coeff(param) == 0 {
                    let (a, c) = lin.partial(x, &empty);
                    push_threshold(a, c, &mut xs);
                }
            }
        }

        let mut out = Vec::new();
        for lin in &atoms {
            for &xv in &xs {
                let mut env = HashMap::new();
                if let Some(x) = quant_var {
                    env.insert(x.clone(), xv);
                }
                let (b, c) = lin.partial(param, &env);
                push_threshold(b, c, &mut out);
            }
        }
        out.push(0);
        out.sort_unstable();
        out.dedup();
        out
    }

    fn search(
        &self,
        body: &Formula,
        quant: Option<(Quant, &Sym)>,
        params: &[Sym],
        env: &mut HashMap<Sym, i128>,
    ) -> bool {
        let Some((param, rest)) = params.split_first() else {
            return self.holds(body, quant, env);
        };
        for cand in self.candidates(body, param, quant.map(|(_, x)| x)) {
            env.insert(param.clone(), cand);
            if self.search(body, quant, rest, env) {
                return true;
            }
        }
        env.remove(param);
        false
    }
}

impl Solver for IntervalSolver {
    fn name(&self) -> &'static str {
        "interval"
    }

    fn solve(&self, e: &Expr) -> Result<SolveResult, SolverError> {
        if !e.ty().is_bool() {
            return Err(unsupported(format!("non-boolean formula '{}'", e)));
        }
        let (quant, body_expr) = match e.kind() {
            ExprKind::Nary {
                op: op @ (MathOp::ForAll | MathOp::Exists),
                args,
            } => {
                let var = args[0]
                    .as_sym()
                    .ok_or_else(|| unsupported("quantifier without a bound variable"))?;
                if !var.ty().is_integral() {
                    return Err(unsupported(format!("quantified variable of type '{}'", var.ty())));
                }
                let q = if *op == MathOp::ForAll {
                    Quant::ForAll
                } else {
                    Quant::Exists
                };
                (Some((q, var)), &args[1])
            }
            _ => (None, e),
        };

        let mut vars = Vec::new();
        let body = formula(body_expr, &mut vars)?;
        let params: Vec<Sym> = vars
            .into_iter()
            .filter(|v| quant.map_or(true, |(_, x)| v != x))
            .collect();

        let mut env = HashMap::new();
        if !self.search(&body, quant, &params, &mut env) {
            trace!(formula = %e, "unsat");
            return Ok(SolveResult::Unsat);
        }

        let mut model = Model::new();
        for p in &params {
            let v = env.get(p).copied().unwrap_or(0);
            let v = i64::try_from(v).map_err(|_| unsupported("model value out of range"))?;
            model.set(p, v);
        }
        trace!(formula = %e, params = params.len(), "sat");
        Ok(SolveResult::Sat(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::DataType;

    #[test]
    fn floor_and_ceil_division() {
        assert_eq!(floor_div(7, 2), 3);
        assert_eq!(floor_div(-7, 2), -4);
        assert_eq!(ceil_div(7, 2), 4);
        assert_eq!(ceil_div(-7, 2), -3);
    }

    #[test]
    fn ground_formula_is_evaluated() {
        let f = Expr::lt(Expr::i64(1), Expr::i64(2)).unwrap();
        assert!(IntervalSolver::new().solve(&f).unwrap().is_sat());
    }

    #[test]
    fn exists_finds_witness() {
        let x = Sym::new("x", DataType::Int64);
        let body = Expr::and(
            Expr::gt(Expr::sym(&x), Expr::i64(3)).unwrap(),
            Expr::lt(Expr::sym(&x), Expr::i64(5)).unwrap(),
        )
        .unwrap();
        let f = Expr::exists(&x, body).unwrap();
        assert!(IntervalSolver::new().solve(&f).unwrap().is_sat());
    }
}
