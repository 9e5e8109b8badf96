//! iterloop: lowering declarative iteration IR to explicit loops.
//!
//! Pipeline:
//!
//! ```text
//! Func (Op / Reduce / Element) → OpToLoop → [Loop IR] → Canon
//!   → LoadStoreExpand → NewGetElimination → ValidateLowered → Func
//! ```
//!
//! Passes (in order):
//! 1. `OpToLoopPass`         : iteration-space inference and loop synthesis
//! 2. `CanonPass`            : folds `body_cond` and `incr` into the body
//! 3. `LoadStoreExpandPass`  : struct loads and stores become per-field accesses
//! 4. `NewGetEliminationPass`: struct values become one symbol per field
//! 5. `ValidateLoweredPass`  : terminal invariants for code generation
//!
//! Iteration bounds come from a [`solver::Solver`]; the bundled
//! [`solver::IntervalSolver`] decides the linear integer queries lowering
//! asks. [`interp`] evaluates lowered functions and serves as the reference
//! semantics in tests.

pub mod config;
pub mod error;
pub mod interp;
pub mod ir;
pub mod iter;
pub mod pass;
pub mod solver;

pub use config::{InterpConfig, PipelineConfig};
pub use error::Error;
pub use pass::lower_func;
