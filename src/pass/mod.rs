pub mod canon;
pub mod clone;
pub mod op_to_loop;
pub mod rewrite;
pub mod scalar;
pub mod validate;

pub use canon::CanonPass;
pub use clone::ClonePass;
pub use op_to_loop::OpToLoopPass;
pub use rewrite::{rewrite_func, RewriteCtx, Rewriter, SymMemo};
pub use scalar::{LoadStoreExpandPass, NewGetEliminationPass};
pub use validate::ValidateLoweredPass;

use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::{Error, PassError};
use crate::ir::Func;

/// A lowering pass from one `Func` to the next.
///
/// Passes must be deterministic: given the same `Func`, the output must be
/// identical across runs (no global mutable state, no randomness). The input
/// is never modified; every pass builds a fresh function and symbol table.
pub trait Pass {
    /// Human-readable name, used in error messages and diagnostics.
    fn name(&self) -> &'static str;

    fn run(&mut self, func: &Func) -> Result<Func, PassError>;
}

/// Manages and executes an ordered sequence of passes.
///
/// Passes run in the order they were registered. The pipeline aborts at the
/// first error.
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
    /// If set, logs the function after the pass with this name completes.
    dump_after: Option<String>,
}

impl PassManager {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            dump_after: None,
        }
    }

    /// The standard lowering pipeline for `config`.
    pub fn standard(config: &PipelineConfig) -> Self {
        let mut pm = PassManager::new();
        pm.add_pass(OpToLoopPass::new());
        pm.add_pass(CanonPass);
        if config.scalarize {
            pm.add_pass(LoadStoreExpandPass);
            pm.add_pass(NewGetEliminationPass);
        }
        if config.validate {
            pm.add_pass(ValidateLoweredPass);
        }
        if let Some(name) = &config.dump_after {
            pm.set_dump_after(name.clone());
        }
        pm
    }

    /// Appends a pass to the end of the pipeline.
    pub fn add_pass(&mut self, pass: impl Pass + 'static) {
        self.passes.push(Box::new(pass));
    }

    /// Configures the manager to log the function after the named pass.
    pub fn set_dump_after(&mut self, pass_name: impl Into<String>) {
        self.dump_after = Some(pass_name.into());
    }

    /// Runs all passes in registration order, threading each pass's output
    /// into the next.
    ///
    /// Returns `Err((pass_name, error))` at the first failure.
    pub fn run(&mut self, func: &Func) -> Result<Func, (String, PassError)> {
        let mut cur = func.clone();
        for pass in &mut self.passes {
            debug!(pass = pass.name(), func = %cur.name, bindings = cur.tbl.len(), "running pass");
            cur = pass.run(&cur).map_err(|e| (pass.name().to_owned(), e))?;
            if let Some(ref target) = self.dump_after {
                if pass.name() == target.as_str() {
                    debug!(pass = pass.name(), "IR after pass:\n{}", cur);
                }
            }
        }
        Ok(cur)
    }

    /// Returns the names of all registered passes in pipeline order.
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowers a declarative function into canonical, scalar loop IR.
pub fn lower_func(func: &Func, config: &PipelineConfig) -> Result<Func, Error> {
    let mut pm = PassManager::standard(config);
    pm.run(func).map_err(|(_, e)| Error::Pass(e))
}
