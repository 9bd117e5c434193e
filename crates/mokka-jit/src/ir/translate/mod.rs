//! Bytecode-to-IR conversion
//!
//! Walks each block's bytecodes in reverse-postorder over the CFG,
//! driving a symbolic operand stack whose elements are expression trees.
//! At block boundaries the outgoing stack is materialized into
//! temporaries: the first predecessor to reach a successor records the
//! temporaries as that successor's entry stack, later predecessors emit
//! stores into the same temporaries.

mod arith;
mod invoke;
mod object;
mod typeconv;

use log::trace;
use rustc_hash::FxHashMap;

use mokka_classfile::opcodes::*;
use mokka_classfile::{bytes, CpEntry, VmType};

use crate::errors::CompileError;
use crate::ir::expr::{BinOp, Expr};
use crate::ir::stmt::{Stmt, StmtKind};
use crate::unit::{BlockId, CompilationUnit, Vreg};

/// Entry stacks recorded at block boundaries: the temporaries (and their
/// types) a block's operand stack starts from.
type EntryStacks = FxHashMap<BlockId, Vec<(Vreg, VmType)>>;

/// Translation context for a single basic block.
pub(crate) struct BlockCx<'a> {
    pub cu: &'a mut CompilationUnit,
    pub block: BlockId,
    pub stack: Vec<Expr>,
    pub offset: usize,
    terminated: bool,
}

impl<'a> BlockCx<'a> {
    pub fn push(&mut self, expr: Expr) {
        self.stack.push(expr);
    }

    pub fn pop(&mut self) -> Result<Expr, CompileError> {
        self.stack.pop().ok_or(CompileError::StackUnderflow {
            offset: self.offset,
        })
    }

    pub fn emit(&mut self, kind: StmtKind) {
        let stmt = Stmt::new(kind, self.offset);
        self.cu.block_mut(self.block).stmts.push(stmt);
    }

    pub fn emit_store(&mut self, dest: Expr, src: Expr) {
        let stmt = Stmt::store(dest, src, self.offset);
        self.cu.block_mut(self.block).stmts.push(stmt);
    }

    /// Expressions that can be re-evaluated or reordered freely.
    pub fn is_pure(expr: &Expr) -> bool {
        matches!(
            expr,
            Expr::Value(_, _) | Expr::FValue(_, _) | Expr::Local(_, _) | Expr::Temporary(_, _)
        )
    }

    /// Evaluate `expr` into a fresh temporary now, returning the
    /// temporary reference. Expressions that already are temporaries pass
    /// through.
    pub fn materialize(&mut self, expr: Expr) -> Expr {
        if let Expr::Temporary(_, _) = expr {
            return expr;
        }
        let ty = expr.ty();
        let vreg = self.cu.alloc_var(ty);
        self.emit_store(Expr::Temporary(ty, vreg), expr);
        Expr::Temporary(ty, vreg)
    }

    /// Pin down every side-effecting expression still sitting on the
    /// stack, in push order, so a statement emitted now cannot be
    /// reordered ahead of them.
    pub fn materialize_impure_stack(&mut self) {
        for i in 0..self.stack.len() {
            if !Self::is_pure(&self.stack[i]) {
                let expr = std::mem::replace(&mut self.stack[i], Expr::NoArgs);
                self.stack[i] = self.materialize(expr);
            }
        }
    }

    /// A store to local `index` invalidates any stack expression that
    /// still reads it; evaluate those first.
    pub fn spill_local_uses(&mut self, index: u16) {
        for i in 0..self.stack.len() {
            if uses_local(&self.stack[i], index) {
                let expr = std::mem::replace(&mut self.stack[i], Expr::NoArgs);
                self.stack[i] = self.materialize(expr);
            }
        }
    }
}

fn uses_local(expr: &Expr, index: u16) -> bool {
    match expr {
        Expr::Local(_, i) => *i == index,
        Expr::Value(_, _)
        | Expr::FValue(_, _)
        | Expr::Temporary(_, _)
        | Expr::NoArgs
        | Expr::ResolutionStub { .. } => false,
        Expr::Field { object, .. } => object.as_deref().is_some_and(|o| uses_local(o, index)),
        Expr::ArrayDeref(_, a, b) | Expr::Binop(_, _, a, b) | Expr::ArgsList(a, b) => {
            uses_local(a, index) || uses_local(b, index)
        }
        Expr::Conversion(_, e) | Expr::Arg(e) => uses_local(e, index),
        Expr::Invoke { args, .. } => uses_local(args, index),
        Expr::RuntimeCall { args, .. } => uses_local(args, index),
    }
}

/// Convert every block's bytecode into IR statements.
pub fn convert_to_ir(cu: &mut CompilationUnit) -> Result<(), CompileError> {
    let method = cu.method.clone();
    let mut entry_stacks: EntryStacks = FxHashMap::default();
    entry_stacks.insert(cu.entry, Vec::new());

    for id in reverse_postorder(cu) {
        if id == cu.exit {
            continue;
        }
        let init_stack = entry_stacks
            .get(&id)
            .map(|temps| {
                temps
                    .iter()
                    .map(|(vreg, ty)| Expr::Temporary(*ty, *vreg))
                    .collect()
            })
            .unwrap_or_default();
        translate_block(cu, &method.code, id, init_stack, &mut entry_stacks)?;
        trace!(
            "ir: {} translated, {} stmts",
            id,
            cu.block(id).stmts.len()
        );
    }
    Ok(())
}

/// Reverse-postorder over the CFG from the entry block; unreachable
/// blocks are appended afterwards in arena order.
fn reverse_postorder(cu: &CompilationUnit) -> Vec<BlockId> {
    let nr = cu.blocks.len();
    let mut visited = vec![false; nr];
    let mut postorder = Vec::with_capacity(nr);
    // Iterative DFS; the second stack element tracks the next successor
    // to visit.
    let mut stack: Vec<(BlockId, usize)> = vec![(cu.entry, 0)];
    visited[cu.entry.0 as usize] = true;
    while let Some((id, succ_idx)) = stack.pop() {
        let succs = &cu.block(id).successors;
        if succ_idx < succs.len() {
            stack.push((id, succ_idx + 1));
            let next = succs[succ_idx];
            if !visited[next.0 as usize] {
                visited[next.0 as usize] = true;
                stack.push((next, 0));
            }
        } else {
            postorder.push(id);
        }
    }
    postorder.reverse();
    for i in 0..nr {
        if !visited[i] {
            postorder.push(BlockId(i as u32));
        }
    }
    postorder
}

/// Materialize the outgoing stack and carry it into every non-exit
/// successor, per the join rule.
fn flush_outgoing(cx: &mut BlockCx, entry_stacks: &mut EntryStacks) -> Result<(), CompileError> {
    let successors: Vec<BlockId> = cx.cu.block(cx.block).successors.clone();
    let exit = cx.cu.exit;

    let exprs = std::mem::take(&mut cx.stack);
    let mut carried: Vec<(Vreg, VmType)> = Vec::with_capacity(exprs.len());
    for expr in exprs {
        let ty = expr.ty();
        match cx.materialize(expr) {
            Expr::Temporary(_, vreg) => carried.push((vreg, ty)),
            _ => unreachable!("materialize always yields a temporary"),
        }
    }

    for succ in successors {
        if succ == exit {
            continue;
        }
        match entry_stacks.get(&succ) {
            None => {
                entry_stacks.insert(succ, carried.clone());
            }
            Some(temps) => {
                if temps.len() != carried.len() {
                    return Err(CompileError::StackHeightMismatch { offset: cx.offset });
                }
                let temps = temps.clone();
                for ((dest, dest_ty), (src, src_ty)) in temps.iter().zip(&carried) {
                    if dest == src {
                        continue;
                    }
                    cx.emit_store(
                        Expr::Temporary(*dest_ty, *dest),
                        Expr::Temporary(*src_ty, *src),
                    );
                }
            }
        }
    }
    Ok(())
}

fn translate_block(
    cu: &mut CompilationUnit,
    code: &[u8],
    id: BlockId,
    init_stack: Vec<Expr>,
    entry_stacks: &mut EntryStacks,
) -> Result<(), CompileError> {
    let (start, end) = {
        let bb = cu.block(id);
        (bb.start, bb.end)
    };
    let mut cx = BlockCx {
        cu,
        block: id,
        stack: init_stack,
        offset: start,
        terminated: false,
    };

    let mut offset = start;
    while offset < end {
        cx.offset = offset;
        let size = insn_size(code, offset)?;
        dispatch(&mut cx, code, offset, entry_stacks)?;
        offset += size;
    }

    if !cx.terminated {
        flush_outgoing(&mut cx, entry_stacks)?;
    }
    Ok(())
}

fn local_ty(opcode: u8, base: u8) -> VmType {
    match (opcode - base) / 4 {
        0 => VmType::Int,
        1 => VmType::Long,
        2 => VmType::Float,
        3 => VmType::Double,
        _ => VmType::Reference,
    }
}

fn push_local(cx: &mut BlockCx, ty: VmType, index: u16) {
    cx.push(Expr::Local(ty, index));
}

fn store_local(cx: &mut BlockCx, ty: VmType, index: u16) -> Result<(), CompileError> {
    let src = cx.pop()?;
    cx.spill_local_uses(index);
    cx.materialize_impure_stack();
    debug_assert_eq!(src.ty().widened(), ty.widened());
    cx.emit_store(Expr::Local(src.ty(), index), src);
    Ok(())
}

fn target_block(cx: &BlockCx, code: &[u8], offset: usize) -> Result<BlockId, CompileError> {
    let target = branch_target(code, offset)?;
    cx.cu
        .find_block(target as usize)
        .ok_or(CompileError::BranchOutOfRange { target, offset })
}

fn emit_if(
    cx: &mut BlockCx,
    code: &[u8],
    offset: usize,
    cond: Expr,
    entry_stacks: &mut EntryStacks,
) -> Result<(), CompileError> {
    let target = target_block(cx, code, offset)?;
    flush_outgoing(cx, entry_stacks)?;
    cx.emit(StmtKind::If { cond, target });
    cx.terminated = true;
    Ok(())
}

/// The `dup` family, generalized: copy the top `dup_slots` worth of
/// values, reinserting the copies below `skip_slots` worth of values.
fn convert_dup(cx: &mut BlockCx, dup_slots: u32, skip_slots: u32) -> Result<(), CompileError> {
    cx.materialize_impure_stack();

    let take = |cx: &mut BlockCx, want: u32| -> Result<Vec<Expr>, CompileError> {
        let mut group = Vec::new();
        let mut slots = 0;
        while slots < want {
            let expr = cx.pop()?;
            slots += if expr.ty().is_wide() { 2 } else { 1 };
            group.push(expr);
        }
        Ok(group)
    };

    // Top-first groups
    let dup_group = take(cx, dup_slots)?;
    let skip_group = take(cx, skip_slots)?;

    // Copies go below the skipped values; the originals return on top.
    for expr in dup_group.iter().rev() {
        cx.push(expr.clone());
    }
    for expr in skip_group.into_iter().rev() {
        cx.push(expr);
    }
    for expr in dup_group.into_iter().rev() {
        cx.push(expr);
    }
    Ok(())
}

fn dispatch(
    cx: &mut BlockCx,
    code: &[u8],
    offset: usize,
    entry_stacks: &mut EntryStacks,
) -> Result<(), CompileError> {
    let opcode = code[offset];
    match opcode {
        OPC_NOP => {}

        // Constants
        OPC_ACONST_NULL => cx.push(Expr::Value(VmType::Reference, 0)),
        OPC_ICONST_M1..=OPC_ICONST_5 => {
            cx.push(Expr::Value(VmType::Int, opcode as i64 - OPC_ICONST_0 as i64))
        }
        OPC_LCONST_0 | OPC_LCONST_1 => {
            cx.push(Expr::Value(VmType::Long, (opcode - OPC_LCONST_0) as i64))
        }
        OPC_FCONST_0..=OPC_FCONST_2 => cx.push(Expr::FValue(
            VmType::Float,
            (opcode - OPC_FCONST_0) as f64,
        )),
        OPC_DCONST_0 | OPC_DCONST_1 => cx.push(Expr::FValue(
            VmType::Double,
            (opcode - OPC_DCONST_0) as f64,
        )),
        OPC_BIPUSH => cx.push(Expr::Value(
            VmType::Int,
            bytes::read_u8(code, offset + 1)? as i8 as i64,
        )),
        OPC_SIPUSH => cx.push(Expr::Value(
            VmType::Int,
            bytes::read_s16(code, offset + 1)? as i64,
        )),
        OPC_LDC => {
            let index = bytes::read_u8(code, offset + 1)? as u16;
            convert_ldc(cx, index)?;
        }
        OPC_LDC_W | OPC_LDC2_W => {
            let index = bytes::read_u16(code, offset + 1)?;
            convert_ldc(cx, index)?;
        }

        // Local loads
        OPC_ILOAD | OPC_LLOAD | OPC_FLOAD | OPC_DLOAD | OPC_ALOAD => {
            let index = bytes::read_u8(code, offset + 1)? as u16;
            push_local(cx, load_ty(opcode), index);
        }
        OPC_ILOAD_0..=OPC_ALOAD_3 => {
            let ty = local_ty(opcode, OPC_ILOAD_0);
            let index = ((opcode - OPC_ILOAD_0) % 4) as u16;
            push_local(cx, ty, index);
        }

        // Array loads
        OPC_IALOAD..=OPC_SALOAD => object::convert_array_load(cx, array_elem_ty(opcode))?,

        // Local stores
        OPC_ISTORE | OPC_LSTORE | OPC_FSTORE | OPC_DSTORE | OPC_ASTORE => {
            let index = bytes::read_u8(code, offset + 1)? as u16;
            store_local(cx, store_ty(opcode), index)?;
        }
        OPC_ISTORE_0..=OPC_ASTORE_3 => {
            let ty = local_ty(opcode, OPC_ISTORE_0);
            let index = ((opcode - OPC_ISTORE_0) % 4) as u16;
            store_local(cx, ty, index)?;
        }

        // Array stores
        OPC_IASTORE..=OPC_SASTORE => {
            object::convert_array_store(cx, array_store_elem_ty(opcode))?
        }

        // Stack manipulation
        OPC_POP => {
            let expr = cx.pop()?;
            if !BlockCx::is_pure(&expr) {
                cx.emit(StmtKind::Expression(expr));
            }
        }
        OPC_POP2 => {
            let top = cx.pop()?;
            let wide = top.ty().is_wide();
            if !BlockCx::is_pure(&top) {
                cx.emit(StmtKind::Expression(top));
            }
            if !wide {
                let next = cx.pop()?;
                if !BlockCx::is_pure(&next) {
                    cx.emit(StmtKind::Expression(next));
                }
            }
        }
        OPC_DUP => convert_dup(cx, 1, 0)?,
        OPC_DUP_X1 => convert_dup(cx, 1, 1)?,
        OPC_DUP_X2 => convert_dup(cx, 1, 2)?,
        OPC_DUP2 => convert_dup(cx, 2, 0)?,
        OPC_DUP2_X1 => convert_dup(cx, 2, 1)?,
        OPC_DUP2_X2 => convert_dup(cx, 2, 2)?,
        OPC_SWAP => {
            cx.materialize_impure_stack();
            let v1 = cx.pop()?;
            let v2 = cx.pop()?;
            cx.push(v1);
            cx.push(v2);
        }

        // Arithmetic and logic
        OPC_IADD..=OPC_DREM => {
            let ty = arith_ty(opcode);
            let op = arith_op(opcode);
            arith::convert_binop(cx, ty, op)?;
        }
        OPC_INEG..=OPC_DNEG => arith::convert_neg(cx, arith_ty(opcode))?,
        OPC_ISHL..=OPC_LXOR => {
            let ty = arith_ty(opcode);
            let op = arith_op(opcode);
            arith::convert_shift_or_logic(cx, ty, op)?;
        }
        OPC_IINC => {
            let index = bytes::read_u8(code, offset + 1)? as u16;
            let delta = bytes::read_u8(code, offset + 2)? as i8 as i64;
            arith::convert_iinc(cx, index, delta)?;
        }

        // Conversions
        OPC_I2L..=OPC_I2S => typeconv::convert_conversion(cx, conversion_target(opcode))?,

        // Three-way compares
        OPC_LCMP => arith::convert_cmp3(cx, BinOp::CmpL)?,
        OPC_FCMPL | OPC_DCMPL => arith::convert_cmp3(cx, BinOp::CmpL)?,
        OPC_FCMPG | OPC_DCMPG => arith::convert_cmp3(cx, BinOp::CmpG)?,

        // Branches
        OPC_IFEQ..=OPC_IFLE => {
            let value = cx.pop()?;
            let op = if_zero_op(opcode);
            let cond = Expr::Binop(
                VmType::Int,
                op,
                Box::new(value),
                Box::new(Expr::Value(VmType::Int, 0)),
            );
            emit_if(cx, code, offset, cond, entry_stacks)?;
        }
        OPC_IF_ICMPEQ..=OPC_IF_ICMPLE => {
            let right = cx.pop()?;
            let left = cx.pop()?;
            let op = if_icmp_op(opcode);
            let cond = Expr::Binop(VmType::Int, op, Box::new(left), Box::new(right));
            emit_if(cx, code, offset, cond, entry_stacks)?;
        }
        OPC_IF_ACMPEQ | OPC_IF_ACMPNE => {
            let right = cx.pop()?;
            let left = cx.pop()?;
            let op = if opcode == OPC_IF_ACMPEQ { BinOp::Eq } else { BinOp::Ne };
            let cond = Expr::Binop(VmType::Int, op, Box::new(left), Box::new(right));
            emit_if(cx, code, offset, cond, entry_stacks)?;
        }
        OPC_IFNULL | OPC_IFNONNULL => {
            let value = cx.pop()?;
            let op = if opcode == OPC_IFNULL { BinOp::Eq } else { BinOp::Ne };
            let cond = Expr::Binop(
                VmType::Int,
                op,
                Box::new(value),
                Box::new(Expr::Value(VmType::Reference, 0)),
            );
            emit_if(cx, code, offset, cond, entry_stacks)?;
        }
        OPC_GOTO | OPC_GOTO_W => {
            let target = target_block(cx, code, offset)?;
            flush_outgoing(cx, entry_stacks)?;
            cx.emit(StmtKind::Goto { target });
            cx.terminated = true;
        }
        OPC_TABLESWITCH | OPC_LOOKUPSWITCH => {
            convert_switch(cx, code, offset, entry_stacks)?;
        }

        // Returns
        OPC_IRETURN..=OPC_ARETURN => {
            let value = cx.pop()?;
            cx.emit(StmtKind::Return { value: Some(value) });
            cx.terminated = true;
        }
        OPC_RETURN => {
            cx.emit(StmtKind::Return { value: None });
            cx.terminated = true;
        }

        // Object access
        OPC_GETSTATIC => object::convert_getstatic(cx, bytes::read_u16(code, offset + 1)?)?,
        OPC_PUTSTATIC => object::convert_putstatic(cx, bytes::read_u16(code, offset + 1)?)?,
        OPC_GETFIELD => object::convert_getfield(cx, bytes::read_u16(code, offset + 1)?)?,
        OPC_PUTFIELD => object::convert_putfield(cx, bytes::read_u16(code, offset + 1)?)?,

        // Invocations
        OPC_INVOKEVIRTUAL | OPC_INVOKESPECIAL | OPC_INVOKESTATIC | OPC_INVOKEINTERFACE => {
            invoke::convert_invoke(cx, opcode, bytes::read_u16(code, offset + 1)?)?;
        }

        // Allocation
        OPC_NEW => object::convert_new(cx, bytes::read_u16(code, offset + 1)?)?,
        OPC_NEWARRAY => object::convert_newarray(cx, bytes::read_u8(code, offset + 1)?)?,
        OPC_ANEWARRAY => object::convert_anewarray(cx, bytes::read_u16(code, offset + 1)?)?,
        OPC_MULTIANEWARRAY => {
            let index = bytes::read_u16(code, offset + 1)?;
            let dims = bytes::read_u8(code, offset + 3)?;
            object::convert_multianewarray(cx, index, dims)?;
        }
        OPC_ARRAYLENGTH => object::convert_arraylength(cx)?,

        // Type tests, monitors, throw
        OPC_CHECKCAST => object::convert_checkcast(cx, bytes::read_u16(code, offset + 1)?)?,
        OPC_INSTANCEOF => object::convert_instanceof(cx, bytes::read_u16(code, offset + 1)?)?,
        OPC_MONITORENTER => {
            let object = cx.pop()?;
            cx.materialize_impure_stack();
            cx.emit(StmtKind::MonitorEnter(object));
        }
        OPC_MONITOREXIT => {
            let object = cx.pop()?;
            cx.materialize_impure_stack();
            cx.emit(StmtKind::MonitorExit(object));
        }
        OPC_ATHROW => {
            let exception = cx.pop()?;
            cx.emit(StmtKind::Athrow(exception));
            cx.terminated = true;
        }

        // The wide prefix re-dispatches its modified instruction
        OPC_WIDE => {
            let modified = bytes::read_u8(code, offset + 1)?;
            let index = bytes::read_u16(code, offset + 2)?;
            match modified {
                OPC_ILOAD | OPC_LLOAD | OPC_FLOAD | OPC_DLOAD | OPC_ALOAD => {
                    push_local(cx, load_ty(modified), index);
                }
                OPC_ISTORE | OPC_LSTORE | OPC_FSTORE | OPC_DSTORE | OPC_ASTORE => {
                    store_local(cx, store_ty(modified), index)?;
                }
                OPC_IINC => {
                    let delta = bytes::read_s16(code, offset + 4)? as i64;
                    arith::convert_iinc(cx, index, delta)?;
                }
                other => {
                    return Err(CompileError::UnsupportedOpcode {
                        opcode: other,
                        offset,
                    })
                }
            }
        }

        // Subroutines predate this compiler's input format
        OPC_JSR | OPC_JSR_W | OPC_RET | OPC_INVOKEDYNAMIC => {
            return Err(CompileError::UnsupportedOpcode { opcode, offset })
        }

        other => return Err(CompileError::InvalidOpcode { opcode: other, offset }),
    }
    Ok(())
}

fn convert_ldc(cx: &mut BlockCx, index: u16) -> Result<(), CompileError> {
    let pool = cx.cu.pool.clone();
    match pool.get(index) {
        Some(CpEntry::Integer(v)) => cx.push(Expr::Value(VmType::Int, *v as i64)),
        Some(CpEntry::Float(v)) => cx.push(Expr::FValue(VmType::Float, *v as f64)),
        Some(CpEntry::Long(v)) => cx.push(Expr::Value(VmType::Long, *v)),
        Some(CpEntry::Double(v)) => cx.push(Expr::FValue(VmType::Double, *v)),
        Some(CpEntry::StringConst(addr)) => {
            cx.push(Expr::Value(VmType::Reference, *addr as i64))
        }
        _ => cx.push(Expr::ResolutionStub {
            ty: VmType::Reference,
            cp_index: index,
        }),
    }
    Ok(())
}

/// Lower a switch to an equality chain over the materialized key,
/// ending in a goto to the default target.
fn convert_switch(
    cx: &mut BlockCx,
    code: &[u8],
    offset: usize,
    entry_stacks: &mut EntryStacks,
) -> Result<(), CompileError> {
    let key = cx.pop()?;
    let key = cx.materialize(key);
    flush_outgoing(cx, entry_stacks)?;

    let targets = switch_targets(code, offset)?;
    let keys = switch_keys(code, offset)?;
    debug_assert_eq!(targets.len(), keys.len() + 1);

    for (case_key, target) in keys.iter().zip(&targets[1..]) {
        let target_bb = cx
            .cu
            .find_block(*target as usize)
            .ok_or(CompileError::BranchOutOfRange {
                target: *target,
                offset,
            })?;
        let cond = Expr::Binop(
            VmType::Int,
            BinOp::Eq,
            Box::new(key.clone()),
            Box::new(Expr::Value(VmType::Int, *case_key as i64)),
        );
        cx.emit(StmtKind::If {
            cond,
            target: target_bb,
        });
    }
    let default_bb =
        cx.cu
            .find_block(targets[0] as usize)
            .ok_or(CompileError::BranchOutOfRange {
                target: targets[0],
                offset,
            })?;
    cx.emit(StmtKind::Goto { target: default_bb });
    cx.terminated = true;
    Ok(())
}

fn load_ty(opcode: u8) -> VmType {
    match opcode {
        OPC_ILOAD => VmType::Int,
        OPC_LLOAD => VmType::Long,
        OPC_FLOAD => VmType::Float,
        OPC_DLOAD => VmType::Double,
        _ => VmType::Reference,
    }
}

fn store_ty(opcode: u8) -> VmType {
    match opcode {
        OPC_ISTORE => VmType::Int,
        OPC_LSTORE => VmType::Long,
        OPC_FSTORE => VmType::Float,
        OPC_DSTORE => VmType::Double,
        _ => VmType::Reference,
    }
}

fn array_elem_ty(opcode: u8) -> VmType {
    match opcode {
        OPC_IALOAD => VmType::Int,
        OPC_LALOAD => VmType::Long,
        OPC_FALOAD => VmType::Float,
        OPC_DALOAD => VmType::Double,
        OPC_AALOAD => VmType::Reference,
        OPC_BALOAD => VmType::Byte,
        OPC_CALOAD => VmType::Char,
        _ => VmType::Short,
    }
}

fn array_store_elem_ty(opcode: u8) -> VmType {
    match opcode {
        OPC_IASTORE => VmType::Int,
        OPC_LASTORE => VmType::Long,
        OPC_FASTORE => VmType::Float,
        OPC_DASTORE => VmType::Double,
        OPC_AASTORE => VmType::Reference,
        OPC_BASTORE => VmType::Byte,
        OPC_CASTORE => VmType::Char,
        _ => VmType::Short,
    }
}

/// Operand/result type for the arithmetic families (grouped in fours).
fn arith_ty(opcode: u8) -> VmType {
    if (OPC_ISHL..=OPC_LUSHR).contains(&opcode) {
        // Shift families alternate int/long
        return if (opcode - OPC_ISHL) % 2 == 0 {
            VmType::Int
        } else {
            VmType::Long
        };
    }
    if (OPC_IAND..=OPC_LXOR).contains(&opcode) {
        return if (opcode - OPC_IAND) % 2 == 0 {
            VmType::Int
        } else {
            VmType::Long
        };
    }
    match (opcode - OPC_IADD) % 4 {
        0 => VmType::Int,
        1 => VmType::Long,
        2 => VmType::Float,
        _ => VmType::Double,
    }
}

fn arith_op(opcode: u8) -> BinOp {
    match opcode {
        OPC_IADD..=OPC_DADD => BinOp::Add,
        OPC_ISUB..=OPC_DSUB => BinOp::Sub,
        OPC_IMUL..=OPC_DMUL => BinOp::Mul,
        OPC_IDIV..=OPC_DDIV => BinOp::Div,
        OPC_IREM..=OPC_DREM => BinOp::Rem,
        OPC_ISHL | OPC_LSHL => BinOp::Shl,
        OPC_ISHR | OPC_LSHR => BinOp::Shr,
        OPC_IUSHR | OPC_LUSHR => BinOp::Ushr,
        OPC_IAND | OPC_LAND => BinOp::And,
        OPC_IOR | OPC_LOR => BinOp::Or,
        _ => BinOp::Xor,
    }
}

fn conversion_target(opcode: u8) -> VmType {
    match opcode {
        OPC_I2L | OPC_F2L | OPC_D2L => VmType::Long,
        OPC_I2F | OPC_L2F | OPC_D2F => VmType::Float,
        OPC_I2D | OPC_L2D | OPC_F2D => VmType::Double,
        OPC_L2I | OPC_F2I | OPC_D2I => VmType::Int,
        OPC_I2B => VmType::Byte,
        OPC_I2C => VmType::Char,
        _ => VmType::Short,
    }
}

fn if_zero_op(opcode: u8) -> BinOp {
    match opcode {
        OPC_IFEQ => BinOp::Eq,
        OPC_IFNE => BinOp::Ne,
        OPC_IFLT => BinOp::Lt,
        OPC_IFGE => BinOp::Ge,
        OPC_IFGT => BinOp::Gt,
        _ => BinOp::Le,
    }
}

fn if_icmp_op(opcode: u8) -> BinOp {
    match opcode {
        OPC_IF_ICMPEQ => BinOp::Eq,
        OPC_IF_ICMPNE => BinOp::Ne,
        OPC_IF_ICMPLT => BinOp::Lt,
        OPC_IF_ICMPGE => BinOp::Ge,
        OPC_IF_ICMPGT => BinOp::Gt,
        _ => BinOp::Le,
    }
}
