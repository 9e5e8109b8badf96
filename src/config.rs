/// Options for [`lower_func`](crate::pass::lower_func).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Log the function (at `debug` level) after the pass with this name.
    pub dump_after: Option<String>,
    /// Run load/store expansion and construction/projection elimination.
    pub scalarize: bool,
    /// Check the terminal invariants before returning. Requires `scalarize`.
    pub validate: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            dump_after: None,
            scalarize: true,
            validate: true,
        }
    }
}

impl PipelineConfig {
    /// Lowering and canonicalization only; struct values are kept.
    pub fn unscalarized() -> Self {
        PipelineConfig {
            dump_after: None,
            scalarize: false,
            validate: false,
        }
    }
}

/// Limits for the reference evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpConfig {
    /// Maximum number of loop iterations across a whole evaluation.
    pub max_steps: usize,
}

impl Default for InterpConfig {
    fn default() -> Self {
        InterpConfig { max_steps: 1_000_000 }
    }
}
