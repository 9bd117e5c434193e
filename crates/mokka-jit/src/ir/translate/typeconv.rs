//! Type-conversion bytecodes
//!
//! All fifteen `x2y` forms pop one expression and push a conversion node
//! tagged with the target type; the sub-int targets (i2b/i2c/i2s) tag
//! byte/char/short, which widen back to int on the stack.

use mokka_classfile::VmType;

use crate::errors::CompileError;
use crate::ir::expr::Expr;
use crate::ir::translate::BlockCx;

pub fn convert_conversion(cx: &mut BlockCx, to: VmType) -> Result<(), CompileError> {
    let from = cx.pop()?;
    cx.push(Expr::Conversion(to, Box::new(from)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::translate::tests::block_cx_fixture;

    #[test]
    fn test_conversion_tags_target_type() {
        block_cx_fixture(|cx| {
            cx.push(Expr::Value(VmType::Int, 7));
            convert_conversion(cx, VmType::Long).unwrap();
            let e = cx.pop().unwrap();
            assert_eq!(e.ty(), VmType::Long);
            assert!(matches!(e, Expr::Conversion(VmType::Long, _)));
        });
    }

    #[test]
    fn test_i2b_widens_back_to_int() {
        block_cx_fixture(|cx| {
            cx.push(Expr::Value(VmType::Int, 300));
            convert_conversion(cx, VmType::Byte).unwrap();
            let e = cx.pop().unwrap();
            assert_eq!(e.ty(), VmType::Byte);
            assert_eq!(e.ty().widened(), VmType::Int);
        });
    }
}
