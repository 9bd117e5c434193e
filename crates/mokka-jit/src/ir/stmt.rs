//! IR statements
//!
//! The statement kinds a basic block holds after translation. Branch
//! targets are resolved block ids, never bytecode offsets.

use mokka_classfile::constant_pool::ClassRef;

use crate::ir::expr::Expr;
use crate::unit::BlockId;

/// A statement plus the bytecode offset it was translated from (used for
/// exception-table mapping and diagnostics).
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub bytecode_offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `dest` is a local, field, array element, or temporary;
    /// `type(dest) == type(src)` modulo int widening.
    Store { dest: Expr, src: Expr },
    /// Conditional branch on a comparison expression
    If { cond: Expr, target: BlockId },
    Goto { target: BlockId },
    /// `None` for void returns
    Return { value: Option<Expr> },
    /// Expression evaluated for effect (void invoke, resolution stub)
    Expression(Expr),
    /// Null-pointer guard on an object reference
    NullCheck(Expr),
    /// Bounds guard on an `ArrayDeref` expression
    ArrayCheck(Expr),
    Athrow(Expr),
    MonitorEnter(Expr),
    MonitorExit(Expr),
    Checkcast { object: Expr, class: ClassRef },
    /// aastore element-type guard: value being stored, target array
    ArrayStoreCheck { src: Expr, array: Expr },
}

impl Stmt {
    pub fn new(kind: StmtKind, bytecode_offset: usize) -> Stmt {
        Stmt {
            kind,
            bytecode_offset,
        }
    }

    /// Store constructor; asserts the type-consistency invariant.
    pub fn store(dest: Expr, src: Expr, bytecode_offset: usize) -> Stmt {
        debug_assert_eq!(
            dest.ty().widened(),
            src.ty().widened(),
            "store type mismatch at offset {bytecode_offset}"
        );
        Stmt::new(StmtKind::Store { dest, src }, bytecode_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mokka_classfile::VmType;

    #[test]
    fn test_store_accepts_widened_match() {
        // byte widens to int; storing an int into a byte local is legal IR
        let dest = Expr::Local(VmType::Byte, 0);
        let src = Expr::Value(VmType::Int, 1);
        let stmt = Stmt::store(dest, src, 0);
        assert!(matches!(stmt.kind, StmtKind::Store { .. }));
    }

    #[test]
    #[should_panic(expected = "store type mismatch")]
    #[cfg(debug_assertions)]
    fn test_store_rejects_type_mismatch() {
        let dest = Expr::Local(VmType::Int, 0);
        let src = Expr::FValue(VmType::Double, 1.0);
        let _ = Stmt::store(dest, src, 0);
    }
}
