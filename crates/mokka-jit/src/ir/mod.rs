//! Tree-shaped intermediate representation
//!
//! The translator converts each basic block's bytecodes into statements
//! over typed expression trees, driving a symbolic operand stack whose
//! elements are expressions rather than runtime values.

pub mod expr;
pub mod stmt;
pub mod translate;

pub use expr::{BinOp, Expr, InvokeKind};
pub use stmt::{Stmt, StmtKind};
