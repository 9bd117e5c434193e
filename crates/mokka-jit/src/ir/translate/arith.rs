//! Arithmetic, logic, shift, and compare conversion

use mokka_classfile::VmType;

use crate::errors::CompileError;
use crate::ir::expr::{BinOp, Expr};
use crate::ir::translate::BlockCx;

/// Pop two operands and push `binop(ty, op, l, r)`.
pub fn convert_binop(cx: &mut BlockCx, ty: VmType, op: BinOp) -> Result<(), CompileError> {
    let right = cx.pop()?;
    let left = cx.pop()?;
    cx.push(Expr::Binop(ty, op, Box::new(left), Box::new(right)));
    Ok(())
}

/// Shifts take an int count regardless of the value type; the logical
/// families share the binop shape.
pub fn convert_shift_or_logic(cx: &mut BlockCx, ty: VmType, op: BinOp) -> Result<(), CompileError> {
    convert_binop(cx, ty, op)
}

/// Negation is subtraction from the typed zero; the selector recognizes
/// the floating form and flips the sign bit instead.
pub fn convert_neg(cx: &mut BlockCx, ty: VmType) -> Result<(), CompileError> {
    let value = cx.pop()?;
    let zero = if ty.is_float() {
        Expr::FValue(ty, 0.0)
    } else {
        Expr::Value(ty, 0)
    };
    cx.push(Expr::Binop(ty, BinOp::Sub, Box::new(zero), Box::new(value)));
    Ok(())
}

/// `iinc` is a store of `local + delta` back into the local.
pub fn convert_iinc(cx: &mut BlockCx, index: u16, delta: i64) -> Result<(), CompileError> {
    cx.spill_local_uses(index);
    let sum = Expr::Binop(
        VmType::Int,
        BinOp::Add,
        Box::new(Expr::Local(VmType::Int, index)),
        Box::new(Expr::Value(VmType::Int, delta)),
    );
    cx.emit_store(Expr::Local(VmType::Int, index), sum);
    Ok(())
}

/// lcmp/fcmpl/fcmpg/dcmpl/dcmpg: three-way compare producing -1/0/1.
pub fn convert_cmp3(cx: &mut BlockCx, op: BinOp) -> Result<(), CompileError> {
    let right = cx.pop()?;
    let left = cx.pop()?;
    cx.push(Expr::Binop(VmType::Int, op, Box::new(left), Box::new(right)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::stmt::StmtKind;
    use crate::ir::translate::tests::block_cx_fixture;

    #[test]
    fn test_binop_pops_right_then_left() {
        block_cx_fixture(|cx| {
            cx.push(Expr::Value(VmType::Int, 1));
            cx.push(Expr::Value(VmType::Int, 2));
            convert_binop(cx, VmType::Int, BinOp::Sub).unwrap();

            match cx.pop().unwrap() {
                Expr::Binop(VmType::Int, BinOp::Sub, l, r) => {
                    assert_eq!(*l, Expr::Value(VmType::Int, 1));
                    assert_eq!(*r, Expr::Value(VmType::Int, 2));
                }
                other => panic!("unexpected {other:?}"),
            }
        });
    }

    #[test]
    fn test_neg_is_zero_minus_value() {
        block_cx_fixture(|cx| {
            cx.push(Expr::Value(VmType::Int, 5));
            convert_neg(cx, VmType::Int).unwrap();
            match cx.pop().unwrap() {
                Expr::Binop(VmType::Int, BinOp::Sub, l, _) => {
                    assert_eq!(*l, Expr::Value(VmType::Int, 0));
                }
                other => panic!("unexpected {other:?}"),
            }
        });
    }

    #[test]
    fn test_iinc_emits_store_of_sum() {
        block_cx_fixture(|cx| {
            convert_iinc(cx, 1, 3).unwrap();
            let block = cx.block;
            let stmts = &cx.cu.block(block).stmts;
            assert_eq!(stmts.len(), 1);
            match &stmts[0].kind {
                StmtKind::Store { dest, src } => {
                    assert_eq!(*dest, Expr::Local(VmType::Int, 1));
                    assert!(matches!(src, Expr::Binop(VmType::Int, BinOp::Add, _, _)));
                }
                other => panic!("unexpected {other:?}"),
            }
        });
    }

    #[test]
    fn test_cmp3_produces_int() {
        block_cx_fixture(|cx| {
            cx.push(Expr::Value(VmType::Long, 10));
            cx.push(Expr::Value(VmType::Long, 20));
            convert_cmp3(cx, BinOp::CmpL).unwrap();
            let result = cx.pop().unwrap();
            assert_eq!(result.ty(), VmType::Int);
        });
    }

    #[test]
    fn test_underflow_is_reported() {
        block_cx_fixture(|cx| {
            cx.push(Expr::Value(VmType::Int, 1));
            let err = convert_binop(cx, VmType::Int, BinOp::Add).unwrap_err();
            assert!(matches!(err, CompileError::StackUnderflow { .. }));
        });
    }
}
