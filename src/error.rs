use thiserror::Error;

/// Top-level error type for the lowering pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{}", format_error_pretty("ir error", &format!("{}", _0)))]
    Ir(#[from] IrError),

    #[error("{}", format_error_pretty("lowering error", &format!("{}", _0)))]
    Pass(#[from] PassError),

    #[error("{}", format_error_pretty("solver error", &format!("{}", _0)))]
    Solver(#[from] SolverError),

    #[error("{}", format_error_pretty("runtime error", &format!("{}", _0)))]
    Interp(#[from] InterpError),
}

/// Formats a pipeline error with its category prefix.
fn format_error_pretty(category: &str, msg: &str) -> String {
    format!("[{}] {}", category, msg)
}

// ---------------------------------------------------------------------------
// IR construction errors
// ---------------------------------------------------------------------------

/// Raised by the checked node constructors. An `IrError` always means an
/// earlier stage tried to build ill-typed IR; no node is produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IrError {
    #[error("type mismatch in {context} — expected '{expected}' but found '{found}'")]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },

    #[error("invalid type — {detail}")]
    InvalidType { detail: String },

    #[error("invalid operand for {context} — {detail}")]
    InvalidOperand { context: String, detail: String },

    #[error("column {col} is out of range for type '{ty}'")]
    ColumnOutOfRange { col: usize, ty: String },

    #[error("symbol '{name}' is bound more than once in the same table")]
    DuplicateBinding { name: String },

    #[error("symbol '{name}' is referenced but neither bound nor a function input")]
    UnboundSymbol { name: String },
}

impl IrError {
    pub(crate) fn mismatch(
        context: impl Into<String>,
        expected: impl std::fmt::Display,
        found: impl std::fmt::Display,
    ) -> Self {
        IrError::TypeMismatch {
            context: context.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub(crate) fn operand(context: impl Into<String>, detail: impl Into<String>) -> Self {
        IrError::InvalidOperand {
            context: context.into(),
            detail: detail.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pass errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PassError {
    #[error("operation '{node}' is not supported by the {pass} pass")]
    Unsupported { pass: String, node: String },

    #[error("in the {pass} pass: symbol '{name}' is referenced but never bound")]
    UndefinedSymbol { pass: String, name: String },

    #[error("op over {count} iterators — only single-iterator ops can be lowered, nest ops to add dimensions")]
    MultipleIterators { count: usize },

    #[error("unable to determine iteration bounds for iterator '{iter}' — the predicate does not bound the {side} side")]
    UnboundedIteration { iter: String, side: &'static str },

    #[error("unable to eliminate struct projection — {detail}")]
    StructProjection { detail: String },

    #[error("lowered function '{func}' is not ready for code generation — {detail}")]
    Validation { func: String, detail: String },

    #[error(transparent)]
    Ir(#[from] IrError),
}

impl PassError {
    pub(crate) fn unsupported(pass: &str, node: impl Into<String>) -> Self {
        PassError::Unsupported {
            pass: pass.to_owned(),
            node: node.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Solver errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("formula is outside the supported fragment — {detail}")]
    Unsupported { detail: String },
}

// ---------------------------------------------------------------------------
// Interpreter errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpError {
    #[error("internal error: symbol '{name}' has no binding — this is a compiler bug, please report it")]
    UndefinedSymbol { name: String },

    #[error("division by zero — cannot divide a number by zero")]
    DivisionByZero,

    #[error("index out of bounds — tried to access position {idx} but the vector only has {len} rows")]
    IndexOutOfBounds { idx: i64, len: usize },

    #[error("type error — {detail}")]
    TypeError { detail: String },

    #[error("not yet supported — {detail}")]
    Unsupported { detail: String },

    #[error("exceeded step limit of {limit} loop iterations (infinite loop?)")]
    StepLimit { limit: usize },
}

impl Error {
    /// Returns a short diagnostic code for this error.
    pub fn diagnostic_code(&self) -> &'static str {
        match self {
            Error::Ir(i) => match i {
                IrError::TypeMismatch { .. } => "E0100",
                IrError::InvalidType { .. } => "E0101",
                IrError::InvalidOperand { .. } => "E0102",
                IrError::ColumnOutOfRange { .. } => "E0103",
                IrError::DuplicateBinding { .. } => "E0104",
                IrError::UnboundSymbol { .. } => "E0105",
            },
            Error::Pass(p) => match p {
                PassError::Unsupported { .. } => "E0200",
                PassError::UndefinedSymbol { .. } => "E0201",
                PassError::MultipleIterators { .. } => "E0202",
                PassError::UnboundedIteration { .. } => "E0203",
                PassError::StructProjection { .. } => "E0204",
                PassError::Validation { .. } => "E0205",
                PassError::Ir(_) => "E0206",
            },
            Error::Solver(_) => "E0300",
            Error::Interp(_) => "E0400",
        }
    }
}
