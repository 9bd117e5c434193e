//! Invocation conversion
//!
//! Pops the argument expressions (receiver included for instance calls),
//! builds the args-list chain, and pushes or emits the invoke according
//! to the return type.

use mokka_classfile::constant_pool::{CpEntry, MethodRef};
use mokka_classfile::opcodes::{OPC_INVOKEINTERFACE, OPC_INVOKESPECIAL, OPC_INVOKEVIRTUAL};
use mokka_classfile::VmType;

use crate::errors::CompileError;
use crate::ir::expr::{insert_arg, Expr, InvokeKind};
use crate::ir::stmt::StmtKind;
use crate::ir::translate::BlockCx;

fn invoke_kind(opcode: u8) -> InvokeKind {
    match opcode {
        OPC_INVOKEVIRTUAL => InvokeKind::Virtual,
        OPC_INVOKESPECIAL => InvokeKind::Special,
        OPC_INVOKEINTERFACE => InvokeKind::Interface,
        _ => InvokeKind::Static,
    }
}

pub fn convert_invoke(cx: &mut BlockCx, opcode: u8, cp_index: u16) -> Result<(), CompileError> {
    let pool = cx.cu.pool.clone();
    let method = match pool.get(cp_index) {
        Some(CpEntry::Method(m)) | Some(CpEntry::InterfaceMethod(m)) => m.clone(),
        _ => {
            // Unknown arity; the stub throws before anything downstream runs.
            cx.materialize_impure_stack();
            cx.emit(StmtKind::Expression(Expr::ResolutionStub {
                ty: VmType::Void,
                cp_index,
            }));
            return Ok(());
        }
    };

    let kind = invoke_kind(opcode);
    let args = convert_args(cx, &method, kind)?;
    let ret = method.descriptor.return_type;
    let invoke = Expr::Invoke {
        kind,
        ret,
        method,
        args: Box::new(args),
    };

    if ret == VmType::Void {
        cx.materialize_impure_stack();
        cx.emit(StmtKind::Expression(invoke));
    } else {
        cx.push(invoke);
    }
    Ok(())
}

/// Pop the call's arguments into a right-leaning args list. Arguments are
/// popped last-first; the receiver, popped last, ends up leftmost.
fn convert_args(
    cx: &mut BlockCx,
    method: &MethodRef,
    kind: InvokeKind,
) -> Result<Expr, CompileError> {
    let mut count = method.descriptor.args.len();
    if kind != InvokeKind::Static {
        count += 1;
    }
    if count == 0 {
        return Ok(Expr::NoArgs);
    }
    let mut root = None;
    for _ in 0..count {
        let expr = cx.pop()?;
        root = Some(insert_arg(root, expr));
    }
    Ok(root.expect("count >= 1"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::expr::flatten_args;
    use crate::ir::translate::tests::{block_cx_fixture, test_method_ref};
    use mokka_classfile::opcodes::OPC_INVOKESTATIC;

    #[test]
    fn test_static_invoke_pops_descriptor_args() {
        block_cx_fixture(|cx| {
            // fixture pool index 1: static (II)I
            cx.push(Expr::Value(VmType::Int, 1));
            cx.push(Expr::Value(VmType::Int, 2));
            convert_invoke(cx, OPC_INVOKESTATIC, 1).unwrap();

            match cx.pop().unwrap() {
                Expr::Invoke { kind, ret, args, .. } => {
                    assert_eq!(kind, InvokeKind::Static);
                    assert_eq!(ret, VmType::Int);
                    let flat = flatten_args(&args);
                    assert_eq!(flat.len(), 2);
                    assert_eq!(*flat[0], Expr::Value(VmType::Int, 1));
                    assert_eq!(*flat[1], Expr::Value(VmType::Int, 2));
                }
                other => panic!("unexpected {other:?}"),
            }
        });
    }

    #[test]
    fn test_virtual_invoke_includes_receiver() {
        block_cx_fixture(|cx| {
            // fixture pool index 2: virtual ()V
            cx.push(Expr::Local(VmType::Reference, 0));
            convert_invoke(cx, OPC_INVOKEVIRTUAL, 2).unwrap();

            let block = cx.block;
            let stmts = &cx.cu.block(block).stmts;
            match &stmts.last().unwrap().kind {
                StmtKind::Expression(Expr::Invoke { kind, args, .. }) => {
                    assert_eq!(*kind, InvokeKind::Virtual);
                    assert_eq!(flatten_args(args).len(), 1);
                }
                other => panic!("unexpected {other:?}"),
            }
            assert!(cx.stack.is_empty());
        });
    }

    #[test]
    fn test_no_args_invoke() {
        let m = test_method_ref("()I", true);
        assert_eq!(m.descriptor.args.len(), 0);
        block_cx_fixture(|cx| {
            // fixture pool index 3: static ()I
            convert_invoke(cx, OPC_INVOKESTATIC, 3).unwrap();
            match cx.pop().unwrap() {
                Expr::Invoke { args, .. } => assert_eq!(*args, Expr::NoArgs),
                other => panic!("unexpected {other:?}"),
            }
        });
    }

    #[test]
    fn test_unresolved_invoke_emits_stub() {
        block_cx_fixture(|cx| {
            convert_invoke(cx, OPC_INVOKESTATIC, 40).unwrap();
            let block = cx.block;
            let stmts = &cx.cu.block(block).stmts;
            assert!(matches!(
                stmts.last().unwrap().kind,
                StmtKind::Expression(Expr::ResolutionStub { cp_index: 40, .. })
            ));
        });
    }
}
