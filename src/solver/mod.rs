//! Constraint-solver seam used by bound inference.
//!
//! A formula is a boolean [`Expr`]. Quantified variables are bound by
//! `ForAll`/`Exists`; every other symbol is a free parameter, read
//! existentially: `Sat` carries a model assigning each parameter.

pub mod interval;

use std::collections::HashMap;

use crate::error::SolverError;
use crate::ir::{Expr, Sym};

pub use interval::IntervalSolver;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    values: HashMap<Sym, i64>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, sym: &Sym, val: i64) {
        self.values.insert(sym.clone(), val);
    }

    pub fn get(&self, sym: &Sym) -> Option<i64> {
        self.values.get(sym).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SolveResult {
    Sat(Model),
    Unsat,
}

impl SolveResult {
    pub fn is_sat(&self) -> bool {
        matches!(self, SolveResult::Sat(_))
    }
}

/// A decision procedure. Each call is an independent query; implementations
/// keep no state between calls.
pub trait Solver {
    fn name(&self) -> &'static str;

    fn solve(&self, formula: &Expr) -> Result<SolveResult, SolverError>;
}
