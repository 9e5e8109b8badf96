pub mod expr;
pub mod func;
pub mod loops;
pub mod op;
pub mod printer;
pub mod stmt;
pub mod storage;
pub mod sym;
pub mod types;
pub mod visit;

pub use expr::{ConstVal, Expr, ExprKind, MathOp};
pub use func::Func;
pub use loops::Loop;
pub use op::{Op, Reduce};
pub use stmt::{IfElse, Stmt, Store};
pub use sym::{Sym, SymTable};
pub use types::DataType;
