//! Object, field, and array access conversion
//!
//! Field and method references come pre-resolved from the constant pool;
//! entries the reader could not resolve degrade to resolution stubs so
//! the method still compiles and fails only if the access executes.

use mokka_classfile::constant_pool::{CpEntry, FieldRef};
use mokka_classfile::VmType;

use crate::errors::CompileError;
use crate::ir::expr::{Expr, RuntimeHook};
use crate::ir::stmt::StmtKind;
use crate::ir::translate::BlockCx;
use crate::runtime::layout;

fn push_stub(cx: &mut BlockCx, cp_index: u16) {
    cx.push(Expr::ResolutionStub {
        ty: VmType::Reference,
        cp_index,
    });
}

/// Synthetic field reference for the array length word.
fn length_field() -> FieldRef {
    FieldRef {
        class_name: String::new(),
        name: "length".to_string(),
        ty: VmType::Int,
        is_static: false,
        offset: layout::ARRAY_LENGTH_OFFSET as u32,
        static_addr: 0,
    }
}

pub fn convert_getstatic(cx: &mut BlockCx, cp_index: u16) -> Result<(), CompileError> {
    let pool = cx.cu.pool.clone();
    match pool.get(cp_index) {
        Some(CpEntry::Field(field)) if field.is_static => {
            cx.push(Expr::Field {
                ty: field.ty,
                field: field.clone(),
                object: None,
            });
        }
        _ => push_stub(cx, cp_index),
    }
    Ok(())
}

pub fn convert_putstatic(cx: &mut BlockCx, cp_index: u16) -> Result<(), CompileError> {
    let pool = cx.cu.pool.clone();
    let src = cx.pop()?;
    cx.materialize_impure_stack();
    match pool.get(cp_index) {
        Some(CpEntry::Field(field)) if field.is_static => {
            let dest = Expr::Field {
                ty: field.ty,
                field: field.clone(),
                object: None,
            };
            cx.emit_store(dest, src);
        }
        _ => cx.emit(StmtKind::Expression(Expr::ResolutionStub {
            ty: VmType::Void,
            cp_index,
        })),
    }
    Ok(())
}

pub fn convert_getfield(cx: &mut BlockCx, cp_index: u16) -> Result<(), CompileError> {
    let pool = cx.cu.pool.clone();
    let object = cx.pop()?;
    match pool.get(cp_index) {
        Some(CpEntry::Field(field)) if !field.is_static => {
            let object = cx.materialize(object);
            cx.emit(StmtKind::NullCheck(object.clone()));
            cx.push(Expr::Field {
                ty: field.ty,
                field: field.clone(),
                object: Some(Box::new(object)),
            });
        }
        _ => push_stub(cx, cp_index),
    }
    Ok(())
}

pub fn convert_putfield(cx: &mut BlockCx, cp_index: u16) -> Result<(), CompileError> {
    let pool = cx.cu.pool.clone();
    let src = cx.pop()?;
    let object = cx.pop()?;
    cx.materialize_impure_stack();
    match pool.get(cp_index) {
        Some(CpEntry::Field(field)) if !field.is_static => {
            let object = cx.materialize(object);
            cx.emit(StmtKind::NullCheck(object.clone()));
            let dest = Expr::Field {
                ty: field.ty,
                field: field.clone(),
                object: Some(Box::new(object)),
            };
            cx.emit_store(dest, src);
        }
        _ => cx.emit(StmtKind::Expression(Expr::ResolutionStub {
            ty: VmType::Void,
            cp_index,
        })),
    }
    Ok(())
}

/// Array loads: the deref is guarded by an array-check statement over the
/// same materialized array and index.
pub fn convert_array_load(cx: &mut BlockCx, elem_ty: VmType) -> Result<(), CompileError> {
    let index = cx.pop()?;
    let array = cx.pop()?;
    let array = cx.materialize(array);
    let index = cx.materialize(index);

    cx.emit(StmtKind::ArrayCheck(Expr::ArrayDeref(
        elem_ty,
        Box::new(array.clone()),
        Box::new(index.clone()),
    )));
    cx.push(Expr::ArrayDeref(elem_ty, Box::new(array), Box::new(index)));
    Ok(())
}

pub fn convert_array_store(cx: &mut BlockCx, elem_ty: VmType) -> Result<(), CompileError> {
    let value = cx.pop()?;
    let index = cx.pop()?;
    let array = cx.pop()?;
    cx.materialize_impure_stack();
    let array = cx.materialize(array);
    let index = cx.materialize(index);

    cx.emit(StmtKind::ArrayCheck(Expr::ArrayDeref(
        elem_ty,
        Box::new(array.clone()),
        Box::new(index.clone()),
    )));
    if elem_ty == VmType::Reference {
        let value_m = cx.materialize(value);
        cx.emit(StmtKind::ArrayStoreCheck {
            src: value_m.clone(),
            array: array.clone(),
        });
        let dest = Expr::ArrayDeref(elem_ty, Box::new(array), Box::new(index));
        cx.emit_store(dest, value_m);
    } else {
        let dest = Expr::ArrayDeref(elem_ty, Box::new(array), Box::new(index));
        cx.emit_store(dest, value);
    }
    Ok(())
}

pub fn convert_arraylength(cx: &mut BlockCx) -> Result<(), CompileError> {
    let array = cx.pop()?;
    let array = cx.materialize(array);
    cx.emit(StmtKind::NullCheck(array.clone()));
    cx.push(Expr::Field {
        ty: VmType::Int,
        field: length_field(),
        object: Some(Box::new(array)),
    });
    Ok(())
}

pub fn convert_new(cx: &mut BlockCx, cp_index: u16) -> Result<(), CompileError> {
    let pool = cx.cu.pool.clone();
    match pool.get(cp_index) {
        Some(CpEntry::Class(class)) => {
            cx.push(Expr::RuntimeCall {
                ty: VmType::Reference,
                hook: RuntimeHook::AllocObject {
                    class_id: class.class_id,
                },
                args: Box::new(Expr::NoArgs),
            });
        }
        _ => push_stub(cx, cp_index),
    }
    Ok(())
}

pub fn convert_newarray(cx: &mut BlockCx, atype: u8) -> Result<(), CompileError> {
    let length = cx.pop()?;
    cx.push(Expr::RuntimeCall {
        ty: VmType::Reference,
        hook: RuntimeHook::AllocPrimArray { atype },
        args: Box::new(Expr::Arg(Box::new(length))),
    });
    Ok(())
}

pub fn convert_anewarray(cx: &mut BlockCx, cp_index: u16) -> Result<(), CompileError> {
    let pool = cx.cu.pool.clone();
    let length = cx.pop()?;
    match pool.get(cp_index) {
        Some(CpEntry::Class(class)) => {
            cx.push(Expr::RuntimeCall {
                ty: VmType::Reference,
                hook: RuntimeHook::AllocRefArray {
                    class_id: class.class_id,
                },
                args: Box::new(Expr::Arg(Box::new(length))),
            });
        }
        _ => push_stub(cx, cp_index),
    }
    Ok(())
}

pub fn convert_multianewarray(cx: &mut BlockCx, cp_index: u16, dims: u8) -> Result<(), CompileError> {
    if dims == 0 || dims > 3 {
        return Err(CompileError::UnsupportedOpcode {
            opcode: mokka_classfile::opcodes::OPC_MULTIANEWARRAY,
            offset: cx.offset,
        });
    }
    let pool = cx.cu.pool.clone();
    let mut args = None;
    for _ in 0..dims {
        let dim = cx.pop()?;
        args = Some(crate::ir::expr::insert_arg(args, dim));
    }
    match pool.get(cp_index) {
        Some(CpEntry::Class(class)) => {
            cx.push(Expr::RuntimeCall {
                ty: VmType::Reference,
                hook: RuntimeHook::AllocMultiArray {
                    class_id: class.class_id,
                    dims,
                },
                args: Box::new(args.expect("dims >= 1")),
            });
        }
        _ => push_stub(cx, cp_index),
    }
    Ok(())
}

pub fn convert_checkcast(cx: &mut BlockCx, cp_index: u16) -> Result<(), CompileError> {
    let pool = cx.cu.pool.clone();
    let object = cx.pop()?;
    let object = cx.materialize(object);
    match pool.get(cp_index) {
        Some(CpEntry::Class(class)) => {
            cx.emit(StmtKind::Checkcast {
                object: object.clone(),
                class: class.clone(),
            });
            cx.push(object);
        }
        _ => {
            cx.emit(StmtKind::Expression(Expr::ResolutionStub {
                ty: VmType::Void,
                cp_index,
            }));
            cx.push(object);
        }
    }
    Ok(())
}

pub fn convert_instanceof(cx: &mut BlockCx, cp_index: u16) -> Result<(), CompileError> {
    let pool = cx.cu.pool.clone();
    let object = cx.pop()?;
    match pool.get(cp_index) {
        Some(CpEntry::Class(class)) => {
            cx.push(Expr::RuntimeCall {
                ty: VmType::Int,
                hook: RuntimeHook::Instanceof {
                    class_id: class.class_id,
                },
                args: Box::new(Expr::Arg(Box::new(object))),
            });
        }
        _ => push_stub(cx, cp_index),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::translate::tests::block_cx_fixture;
    use crate::unit::Vreg;

    #[test]
    fn test_array_load_emits_check_before_deref() {
        block_cx_fixture(|cx| {
            cx.push(Expr::Local(VmType::Reference, 0));
            cx.push(Expr::Value(VmType::Int, 3));
            convert_array_load(cx, VmType::Int).unwrap();

            let block = cx.block;
            let stmts = &cx.cu.block(block).stmts;
            // Two materializations then the array check
            assert!(matches!(
                stmts.last().unwrap().kind,
                StmtKind::ArrayCheck(Expr::ArrayDeref(VmType::Int, _, _))
            ));
            assert!(matches!(
                cx.stack.last().unwrap(),
                Expr::ArrayDeref(VmType::Int, _, _)
            ));
        });
    }

    #[test]
    fn test_ref_array_store_emits_store_check() {
        block_cx_fixture(|cx| {
            cx.push(Expr::Local(VmType::Reference, 0));
            cx.push(Expr::Value(VmType::Int, 0));
            cx.push(Expr::Local(VmType::Reference, 1));
            convert_array_store(cx, VmType::Reference).unwrap();

            let block = cx.block;
            let kinds: Vec<_> = cx.cu.block(block).stmts.iter().map(|s| &s.kind).collect();
            assert!(kinds
                .iter()
                .any(|k| matches!(k, StmtKind::ArrayStoreCheck { .. })));
            assert!(matches!(kinds.last().unwrap(), StmtKind::Store { .. }));
        });
    }

    #[test]
    fn test_int_array_store_has_no_store_check() {
        block_cx_fixture(|cx| {
            cx.push(Expr::Local(VmType::Reference, 0));
            cx.push(Expr::Value(VmType::Int, 0));
            cx.push(Expr::Value(VmType::Int, 42));
            convert_array_store(cx, VmType::Int).unwrap();

            let block = cx.block;
            let kinds: Vec<_> = cx.cu.block(block).stmts.iter().map(|s| &s.kind).collect();
            assert!(!kinds
                .iter()
                .any(|k| matches!(k, StmtKind::ArrayStoreCheck { .. })));
        });
    }

    #[test]
    fn test_arraylength_is_length_field_load() {
        block_cx_fixture(|cx| {
            cx.push(Expr::Local(VmType::Reference, 0));
            convert_arraylength(cx).unwrap();
            match cx.pop().unwrap() {
                Expr::Field { ty, field, object } => {
                    assert_eq!(ty, VmType::Int);
                    assert_eq!(field.offset, layout::ARRAY_LENGTH_OFFSET as u32);
                    assert!(matches!(*object.unwrap(), Expr::Temporary(_, Vreg(_))));
                }
                other => panic!("unexpected {other:?}"),
            }
        });
    }

    #[test]
    fn test_unresolved_field_degrades_to_stub() {
        block_cx_fixture(|cx| {
            // cp index 9 does not exist in the fixture pool
            convert_getstatic(cx, 9).unwrap();
            assert!(matches!(
                cx.pop().unwrap(),
                Expr::ResolutionStub { cp_index: 9, .. }
            ));
        });
    }

    #[test]
    fn test_multianewarray_dims_limit() {
        block_cx_fixture(|cx| {
            for _ in 0..4 {
                cx.push(Expr::Value(VmType::Int, 1));
            }
            assert!(matches!(
                convert_multianewarray(cx, 1, 4),
                Err(CompileError::UnsupportedOpcode { .. })
            ));
        });
    }
}
