//! Machine-code emission
//!
//! Serializes the allocated instruction streams into an executable
//! buffer: prolog (frame setup, argument spill, optional method-level
//! monitor enter), basic blocks in emission order, the exit block with
//! the epilog, then back-patch resolution, native exception-table
//! construction, and placement into the text heap with call relocation
//! and fix-up registration.

pub mod encode;

use log::{debug, trace};

use mokka_classfile::descriptor::MethodDescriptor;
use mokka_classfile::{CpEntry, VmType};

use crate::errors::CompileError;
use crate::isel::{MachInsn, MachOp, MachReg, Operand, Rv, Width, ARG_REGS, FP_ARG_REGS};
use crate::runtime::trampoline::FixupSite;
use crate::runtime::{hooks, registry, text};
use crate::support::Buffer;
use crate::unit::{BlockId, CodeRange, CompilationUnit, InlineCacheSite, NativeExceptionEntry};

use self::encode::{EncodeNote, Encoder};

/// A call displacement awaiting relocation against the final address.
struct CallSite {
    disp_offset: usize,
    target: u64,
    /// Direct method calls record the callee for trampoline fix-up
    method_id: Option<u32>,
}

pub fn emit_machine_code(cu: &mut CompilationUnit) -> Result<(), CompileError> {
    let method = cu.method.clone();
    let descriptor = MethodDescriptor::parse(&method.descriptor).map_err(|_| {
        CompileError::InvalidDescriptor {
            descriptor: method.descriptor.clone(),
        }
    })?;

    let mut buf = Buffer::new();
    let mut call_sites: Vec<CallSite> = Vec::new();
    let mut ic_sites: Vec<InlineCacheSite> = Vec::new();

    emit_prolog(cu, &descriptor, &mut buf);

    let order: Vec<BlockId> = cu.emission_order().collect();
    for &id in &order {
        // Branch targets are 16-byte aligned; fall-through paths execute
        // the nop padding.
        let is_branch_target = cu
            .block(id)
            .predecessors
            .iter()
            .any(|pred| cu.block(*pred).has_branch);
        if is_branch_target {
            buf.align(16);
        }
        let mach_offset = buf.len();
        {
            let bb = cu.block_mut(id);
            bb.mach_offset = mach_offset;
        }
        // Forward branches recorded against this block resolve now
        let sites = std::mem::take(&mut cu.block_mut(id).backpatch_sites);
        for site in sites {
            let disp = mach_offset as i64 - (site as i64 + 4);
            buf.patch_u32(site, disp as i64 as u32);
        }

        if id == cu.exit {
            emit_epilog(cu, &descriptor, &mut buf);
            continue;
        }

        for insn_idx in 0..cu.block(id).insns.len() {
            let offset = buf.len();
            cu.block_mut(id).insns[insn_idx].mach_offset = offset;
            let insn = cu.block(id).insns[insn_idx].clone();
            let note = Encoder::new(&mut buf).encode(&insn);
            match note {
                EncodeNote::None => {}
                EncodeNote::Branch {
                    target,
                    disp_offset,
                } => {
                    let target_bb = cu.block(target);
                    let emitted = order.iter().position(|&b| b == target)
                        < order.iter().position(|&b| b == id)
                        || (target == id && target_bb.mach_offset <= offset);
                    if emitted || target == id {
                        let disp = target_bb.mach_offset as i64 - (disp_offset as i64 + 4);
                        buf.patch_u32(disp_offset, disp as u32);
                    } else {
                        cu.block_mut(target).backpatch_sites.push(disp_offset);
                    }
                }
                EncodeNote::CallRel {
                    target,
                    disp_offset,
                } => {
                    let method_id = insn.operands.get(1).and_then(|op| match op {
                        Operand::Imm(id) => Some(*id as u32),
                        _ => None,
                    });
                    call_sites.push(CallSite {
                        disp_offset,
                        target,
                        method_id,
                    });
                }
                EncodeNote::IcSite {
                    class_id_offset,
                    target_offset,
                } => {
                    ic_sites.push(InlineCacheSite {
                        class_id_offset,
                        target_offset,
                    });
                }
            }
        }
    }

    for bb in &cu.blocks {
        assert!(
            bb.backpatch_sites.is_empty(),
            "unresolved back-patch sites after emission"
        );
    }

    build_exception_table(cu, buf.len());

    // Place the finished buffer in the text heap, then resolve call
    // displacements against the final address.
    let addr = text::alloc(buf.len())?;
    for site in &call_sites {
        let method_target = site
            .method_id
            .and_then(registry::lookup)
            .map(|callee| callee.entry_point() as u64);
        let target = method_target.unwrap_or(site.target);
        let rel = target as i64 - (addr as i64 + site.disp_offset as i64 + 4);
        buf.patch_u32(site.disp_offset, rel as i32 as u32);
    }
    unsafe {
        text::write_at(addr, buf.as_slice());
    }

    // Record call sites on not-yet-compiled callees so they get rewritten
    // to the real body when it exists.
    for site in &call_sites {
        let Some(method_id) = site.method_id else { continue };
        let Some(callee) = registry::lookup(method_id) else { continue };
        if !callee.is_compiled.load(std::sync::atomic::Ordering::Acquire) {
            callee.trampoline().add_fixup_site(FixupSite {
                site_addr: addr + site.disp_offset,
            });
        }
    }

    for entry in &mut cu.exception_table {
        entry.start_mach += addr;
        entry.end_mach += addr;
        entry.handler_mach += addr;
    }
    cu.ic_sites = ic_sites
        .iter()
        .map(|site| InlineCacheSite {
            class_id_offset: site.class_id_offset + addr,
            target_offset: site.target_offset + addr,
        })
        .collect();
    cu.code = Some(CodeRange {
        addr,
        len: buf.len(),
    });

    debug!(
        "emit: {}.{} -> {} bytes at {addr:#x}",
        method.class_name,
        method.name,
        buf.len()
    );
    Ok(())
}

fn encode_raw(buf: &mut Buffer, insn: MachInsn) {
    let note = Encoder::new(buf).encode(&insn);
    debug_assert_eq!(note, EncodeNote::None);
}

fn preg(reg: MachReg) -> Operand {
    Operand::Reg(Rv::Phys(reg))
}

fn rbp_disp(disp: i32) -> Operand {
    Operand::Membase {
        base: Rv::Phys(MachReg::Rbp),
        disp,
    }
}

/// Argument value types in order: receiver (for instance methods), then
/// the descriptor's parameters.
fn arg_values(cu: &CompilationUnit, descriptor: &MethodDescriptor) -> Vec<VmType> {
    let mut values = Vec::new();
    if !cu.method.is_static() {
        values.push(VmType::Reference);
    }
    values.extend(descriptor.args.iter().copied());
    values
}

/// Prolog: establish the frame, reserve locals + spills, spill incoming
/// arguments to their slots, and take the method monitor when the method
/// is synchronized.
fn emit_prolog(cu: &mut CompilationUnit, descriptor: &MethodDescriptor, buf: &mut Buffer) {
    // push rbp; mov rbp, rsp
    encode_raw(buf, MachInsn::new(MachOp::PushReg, Width::W64, vec![preg(MachReg::Rbp)]));
    buf.emit_bytes(&[0x48, 0x89, 0xE5]);

    let frame_size = cu.frame.frame_size_x64();
    if frame_size > 0 {
        encode_raw(
            buf,
            MachInsn::new(
                MachOp::SubImmReg,
                Width::W64,
                vec![Operand::Imm(frame_size as i64), preg(MachReg::Rsp)],
            ),
        );
    }

    // Copy register- and stack-passed arguments into their frame slots
    let mut int_idx = 0;
    let mut fp_idx = 0;
    let mut stack_arg = 0;
    let mut slot = 0u32;
    for ty in arg_values(cu, descriptor) {
        let disp = cu.frame.slot_offset_x64(cu.frame.local_slot(slot));
        if ty.is_float() {
            if fp_idx < FP_ARG_REGS.len() {
                encode_raw(
                    buf,
                    MachInsn::new(
                        MachOp::MovfRegMembase,
                        if ty == VmType::Double { Width::W64 } else { Width::W32 },
                        vec![preg(FP_ARG_REGS[fp_idx]), rbp_disp(disp)],
                    ),
                );
                fp_idx += 1;
            } else {
                copy_stack_arg(buf, stack_arg, disp);
                stack_arg += 1;
            }
        } else if int_idx < ARG_REGS.len() {
            encode_raw(
                buf,
                MachInsn::new(
                    MachOp::MovRegMembase,
                    Width::W64,
                    vec![preg(ARG_REGS[int_idx]), rbp_disp(disp)],
                ),
            );
            int_idx += 1;
        } else {
            copy_stack_arg(buf, stack_arg, disp);
            stack_arg += 1;
        }
        slot += if ty.is_wide() { 2 } else { 1 };
    }

    if cu.method.is_synchronized() {
        emit_monitor_call(cu, buf, true);
    }
    trace!("emit: prolog {} bytes", buf.len());
}

/// Incoming stack argument k lives at [rbp + 16 + 8k]; stage through r10.
fn copy_stack_arg(buf: &mut Buffer, k: usize, dest_disp: i32) {
    encode_raw(
        buf,
        MachInsn::new(
            MachOp::MovMembaseReg,
            Width::W64,
            vec![rbp_disp(16 + 8 * k as i32), preg(MachReg::R10)],
        ),
    );
    encode_raw(
        buf,
        MachInsn::new(
            MachOp::MovRegMembase,
            Width::W64,
            vec![preg(MachReg::R10), rbp_disp(dest_disp)],
        ),
    );
}

/// Call the monitor enter/exit hook for a synchronized method.
fn emit_monitor_call(cu: &CompilationUnit, buf: &mut Buffer, enter: bool) {
    let hooks = hooks::get();
    if cu.method.is_static() {
        let name = &cu.method.class_name;
        let hook = if enter {
            hooks.monitor_enter_static as usize
        } else {
            hooks.monitor_exit_static as usize
        };
        encode_raw(
            buf,
            MachInsn::new(
                MachOp::MovImmReg,
                Width::W64,
                vec![Operand::Imm(name.as_ptr() as i64), preg(MachReg::Rdi)],
            ),
        );
        encode_raw(
            buf,
            MachInsn::new(
                MachOp::MovImmReg,
                Width::W64,
                vec![Operand::Imm(name.len() as i64), preg(MachReg::Rsi)],
            ),
        );
        emit_absolute_call(buf, hook);
    } else {
        // Receiver was spilled to the first local slot
        let disp = cu.frame.slot_offset_x64(cu.frame.local_slot(0));
        let hook = if enter {
            hooks.monitor_enter as usize
        } else {
            hooks.monitor_exit as usize
        };
        encode_raw(
            buf,
            MachInsn::new(
                MachOp::MovMembaseReg,
                Width::W64,
                vec![rbp_disp(disp), preg(MachReg::Rdi)],
            ),
        );
        emit_absolute_call(buf, hook);
    }
}

fn emit_absolute_call(buf: &mut Buffer, target: usize) {
    encode_raw(
        buf,
        MachInsn::new(
            MachOp::MovImmReg,
            Width::W64,
            vec![Operand::Imm(target as i64), preg(MachReg::R11)],
        ),
    );
    encode_raw(
        buf,
        MachInsn::new(MachOp::CallReg, Width::W64, vec![preg(MachReg::R11)]),
    );
}

/// Epilog: release the method monitor (preserving the return value),
/// tear down the frame, and return.
fn emit_epilog(cu: &CompilationUnit, descriptor: &MethodDescriptor, buf: &mut Buffer) {
    if cu.method.is_synchronized() {
        let fp_ret = descriptor.return_type.is_float();
        if fp_ret {
            // sub rsp, 16; movsd [rsp], xmm0
            buf.emit_bytes(&[0x48, 0x83, 0xEC, 0x10]);
            buf.emit_bytes(&[0xF2, 0x0F, 0x11, 0x04, 0x24]);
        } else {
            // push rax twice to keep 16-byte call alignment
            buf.emit_bytes(&[0x50, 0x50]);
        }
        emit_monitor_call(cu, buf, false);
        if fp_ret {
            buf.emit_bytes(&[0xF2, 0x0F, 0x10, 0x04, 0x24]);
            buf.emit_bytes(&[0x48, 0x83, 0xC4, 0x10]);
        } else {
            buf.emit_bytes(&[0x58, 0x58]);
        }
    }
    // mov rsp, rbp; pop rbp; ret
    buf.emit_bytes(&[0x48, 0x89, 0xEC, 0x5D, 0xC3]);
}

/// Map the bytecode-offset exception table to machine offsets
/// (buffer-relative here; the caller rebases to absolute addresses).
fn build_exception_table(cu: &mut CompilationUnit, code_end: usize) {
    let mut table = Vec::with_capacity(cu.method.exception_table.len());
    let pool = cu.pool.clone();

    for entry in &cu.method.exception_table {
        if entry.end_pc <= entry.start_pc {
            continue;
        }
        let Some(start_bb) = cu.find_block(entry.start_pc as usize) else {
            continue;
        };
        let start_mach = cu.block(start_bb).mach_offset;

        // The guarded range ends at the block starting at end_pc; when
        // end_pc falls inside a block the range widens to that block's end.
        let end_mach = match cu.find_block(entry.end_pc as usize) {
            Some(bb) if cu.block(bb).start == entry.end_pc as usize => cu.block(bb).mach_offset,
            _ => match cu.find_block(entry.end_pc as usize - 1) {
                Some(bb) if (bb.0 as usize + 1) < cu.blocks.len() => {
                    cu.block(BlockId(bb.0 + 1)).mach_offset
                }
                _ => code_end,
            },
        };
        let Some(handler_bb) = cu.find_block(entry.handler_pc as usize) else {
            continue;
        };
        let handler_mach = cu.block(handler_bb).mach_offset;

        let catch_type_id = match pool.get(entry.catch_type) {
            Some(CpEntry::Class(class)) => class.class_id,
            _ => 0,
        };
        table.push(NativeExceptionEntry {
            start_mach,
            end_mach,
            handler_mach,
            catch_type_id,
        });
    }
    table.sort_by_key(|entry| entry.start_mach);
    cu.exception_table = table;
}

/// Binary search the native exception table for the entry covering a
/// faulting instruction pointer.
pub fn find_exception_entry(
    table: &[NativeExceptionEntry],
    ip: usize,
) -> Option<&NativeExceptionEntry> {
    let mut lo = 0;
    let mut hi = table.len();
    while lo < hi {
        let mid = (lo + hi) / 2;
        if table[mid].start_mach <= ip {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    // Last entry starting at or before ip; scan back over nested ranges
    table[..lo]
        .iter()
        .rev()
        .find(|entry| entry.start_mach <= ip && ip < entry.end_mach)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_cfg;
    use crate::ir::translate::convert_to_ir;
    use crate::isel::select::select_instructions;
    use crate::regalloc::{allocate_registers, analyze_liveness, compute_insn_positions, RegisterSet};
    use mokka_classfile::opcodes::*;
    use mokka_classfile::ConstantPool;
    use std::sync::Arc;

    fn test_method(
        descriptor: &str,
        code: Vec<u8>,
        args_count: u16,
        max_locals: u16,
    ) -> Arc<mokka_classfile::MethodInfo> {
        Arc::new(mokka_classfile::MethodInfo {
            class_name: "Test".to_string(),
            name: "m".to_string(),
            descriptor: descriptor.to_string(),
            access_flags: mokka_classfile::method::ACC_STATIC,
            max_stack: 8,
            max_locals,
            args_count,
            code,
            exception_table: vec![],
        })
    }

    fn compile_unit(
        descriptor: &str,
        code: Vec<u8>,
        args_count: u16,
        max_locals: u16,
    ) -> CompilationUnit {
        let method = test_method(descriptor, code, args_count, max_locals);
        let mut cu = CompilationUnit::new(method, Arc::new(ConstantPool::new()));
        build_cfg(&mut cu).unwrap();
        convert_to_ir(&mut cu).unwrap();
        select_instructions(&mut cu);
        compute_insn_positions(&mut cu);
        let mut intervals = analyze_liveness(&mut cu);
        allocate_registers(&mut cu, &mut intervals, &RegisterSet::default());
        emit_machine_code(&mut cu).unwrap();
        cu
    }

    #[cfg(all(unix, target_arch = "x86_64"))]
    #[test]
    fn test_emitted_blocks_have_offsets() {
        let cu = compile_unit("(II)I", vec![OPC_ILOAD_0, OPC_ILOAD_1, OPC_IADD, OPC_IRETURN], 2, 2);
        let code = cu.code.unwrap();
        assert!(code.len > 0);
        // Entry block sits after the prolog, exit after the body
        assert!(cu.block(cu.entry).mach_offset > 0);
        assert!(cu.block(cu.exit).mach_offset >= cu.block(cu.entry).mach_offset);
        for bb in &cu.blocks {
            assert!(bb.backpatch_sites.is_empty());
        }
    }

    #[cfg(all(unix, target_arch = "x86_64"))]
    #[test]
    fn test_forward_branch_backpatched() {
        let code = vec![
            OPC_ILOAD_0,
            OPC_IFLE, 0x00, 0x08,
            OPC_ICONST_1,
            OPC_GOTO, 0x00, 0x09,
            OPC_ICONST_0,
            OPC_IRETURN,
        ];
        let cu = compile_unit("(I)Z", code, 1, 1);
        let base = cu.code.unwrap().addr;

        // Locate the jle in the entry block and decode its displacement
        let entry = cu.block(cu.entry);
        let jcc = entry
            .insns
            .iter()
            .find(|i| matches!(i.op, MachOp::Jcc(_)))
            .unwrap();
        let target_bb = jcc.branch_target().unwrap();
        let disp_site = base + jcc.mach_offset + 2;
        let disp = unsafe { std::ptr::read_unaligned(disp_site as *const i32) };
        let resolved = (disp_site + 4).wrapping_add(disp as usize);
        assert_eq!(resolved, base + cu.block(target_bb).mach_offset);
    }

    #[cfg(all(unix, target_arch = "x86_64"))]
    #[test]
    fn test_compiled_add_executes() {
        let cu = compile_unit("(II)I", vec![OPC_ILOAD_0, OPC_ILOAD_1, OPC_IADD, OPC_IRETURN], 2, 2);
        let code = cu.code.unwrap();
        unsafe {
            let f: extern "C" fn(i32, i32) -> i32 = std::mem::transmute(code.addr);
            assert_eq!(f(1, 2), 3);
            assert_eq!(f(0, 1), 1);
            assert_eq!(f(-5, 3), -2);
        }
    }

    #[cfg(all(unix, target_arch = "x86_64"))]
    #[test]
    fn test_compiled_branch_executes() {
        // boolean greaterThanZero(int i) { return i > 0; }
        let code = vec![
            OPC_ILOAD_0,
            OPC_IFLE, 0x00, 0x08,
            OPC_ICONST_1,
            OPC_GOTO, 0x00, 0x09,
            OPC_ICONST_0,
            OPC_IRETURN,
        ];
        let cu = compile_unit("(I)Z", code, 1, 1);
        unsafe {
            let f: extern "C" fn(i32) -> i32 = std::mem::transmute(cu.code.unwrap().addr);
            assert_eq!(f(5), 1);
            assert_eq!(f(0), 0);
            assert_eq!(f(-3), 0);
        }
    }

    #[cfg(all(unix, target_arch = "x86_64"))]
    #[test]
    fn test_compiled_loop_executes() {
        // int sumTo(int n): sum = 0; i = 1; while (i <= n) { sum += i; i++ } return sum
        // 0: iconst_0, 1: istore_1, 2: iconst_1, 3: istore_2
        // 4: iload_2, 5: iload_0, 6: if_icmpgt 17
        // 9: iload_1, 10: iload_2, 11: iadd, 12: istore_1
        // 13: iinc 2 1, 16: goto 4
        // 17(0x11): iload_1, 18: ireturn
        let code = vec![
            OPC_ICONST_0,
            OPC_ISTORE_1,
            OPC_ICONST_1,
            OPC_ISTORE_2,
            OPC_ILOAD_2,
            OPC_ILOAD_0,
            OPC_IF_ICMPGT, 0x00, 0x11,
            OPC_ILOAD_1,
            OPC_ILOAD_2,
            OPC_IADD,
            OPC_ISTORE_1,
            OPC_IINC, 0x02, 0x01,
            OPC_GOTO, 0x00, 0x04,
            OPC_ILOAD_1,
            OPC_IRETURN,
        ];
        let cu = compile_unit("(I)I", code, 1, 3);
        unsafe {
            let f: extern "C" fn(i32) -> i32 = std::mem::transmute(cu.code.unwrap().addr);
            assert_eq!(f(0), 0);
            assert_eq!(f(1), 1);
            assert_eq!(f(10), 55);
            assert_eq!(f(100), 5050);
        }
    }

    #[cfg(all(unix, target_arch = "x86_64"))]
    #[test]
    fn test_compiled_division_executes() {
        let code = vec![OPC_ILOAD_0, OPC_ILOAD_1, OPC_IDIV, OPC_IRETURN];
        let cu = compile_unit("(II)I", code, 2, 2);
        unsafe {
            let f: extern "C" fn(i32, i32) -> i32 = std::mem::transmute(cu.code.unwrap().addr);
            assert_eq!(f(42, 6), 7);
            assert_eq!(f(-9, 2), -4);
        }
    }

    #[cfg(all(unix, target_arch = "x86_64"))]
    #[test]
    fn test_compiled_long_arithmetic_executes() {
        // long mul(long a, long b) { return a * b; }
        // locals: a at 0-1, b at 2-3
        let code = vec![OPC_LLOAD_0, OPC_LLOAD_2, OPC_LMUL, OPC_LRETURN];
        let cu = compile_unit("(JJ)J", code, 4, 4);
        unsafe {
            let f: extern "C" fn(i64, i64) -> i64 = std::mem::transmute(cu.code.unwrap().addr);
            assert_eq!(f(1_000_000_007, 3), 3_000_000_021);
            assert_eq!(f(-4, 5), -20);
        }
    }

    #[cfg(all(unix, target_arch = "x86_64"))]
    #[test]
    fn test_compiled_double_add_executes() {
        // double add(double a, double b) { return a + b; }
        let code = vec![OPC_DLOAD_0, OPC_DLOAD_2, OPC_DADD, OPC_DRETURN];
        let cu = compile_unit("(DD)D", code, 4, 4);
        unsafe {
            let f: extern "C" fn(f64, f64) -> f64 = std::mem::transmute(cu.code.unwrap().addr);
            assert_eq!(f(1.5, 2.25), 3.75);
        }
    }

    #[cfg(all(unix, target_arch = "x86_64"))]
    #[test]
    fn test_native_exception_table_mapping() {
        use mokka_classfile::method::ExceptionTableEntry;

        // try { iconst_0; istore_1 } catch { ... } around offsets [0, 2)
        let code = vec![
            OPC_ICONST_0, // 0
            OPC_ISTORE_1, // 1
            OPC_GOTO, 0x00, 0x07, // 2
            OPC_ICONST_1, // 5  (handler)
            OPC_ISTORE_1, // 6
            OPC_RETURN, // 7
        ];
        let mut method = (*test_method("()V", code, 1, 2)).clone();
        method.exception_table = vec![ExceptionTableEntry {
            start_pc: 0,
            end_pc: 2,
            handler_pc: 5,
            catch_type: 0,
        }];
        let mut cu = CompilationUnit::new(Arc::new(method), Arc::new(ConstantPool::new()));
        build_cfg(&mut cu).unwrap();
        convert_to_ir(&mut cu).unwrap();
        select_instructions(&mut cu);
        compute_insn_positions(&mut cu);
        let mut intervals = analyze_liveness(&mut cu);
        allocate_registers(&mut cu, &mut intervals, &RegisterSet::default());
        emit_machine_code(&mut cu).unwrap();

        let code_range = cu.code.unwrap();
        assert_eq!(cu.exception_table.len(), 1);
        let entry = cu.exception_table[0];
        assert!(entry.start_mach >= code_range.addr);
        assert!(entry.end_mach > entry.start_mach);
        assert!(code_range.contains(entry.handler_mach));
        assert_eq!(entry.catch_type_id, 0);

        // An IP inside the guarded range resolves to the handler
        let rel_table: Vec<NativeExceptionEntry> = cu.exception_table.clone();
        let found = find_exception_entry(&rel_table, entry.start_mach).unwrap();
        assert_eq!(found.handler_mach, entry.handler_mach);
        assert!(find_exception_entry(&rel_table, entry.end_mach).is_none());
    }

    #[test]
    fn test_find_exception_entry_binary_search() {
        let table = vec![
            NativeExceptionEntry {
                start_mach: 0x10,
                end_mach: 0x20,
                handler_mach: 0x100,
                catch_type_id: 0,
            },
            NativeExceptionEntry {
                start_mach: 0x30,
                end_mach: 0x40,
                handler_mach: 0x200,
                catch_type_id: 0,
            },
        ];
        assert_eq!(find_exception_entry(&table, 0x10).unwrap().handler_mach, 0x100);
        assert_eq!(find_exception_entry(&table, 0x1F).unwrap().handler_mach, 0x100);
        assert_eq!(find_exception_entry(&table, 0x35).unwrap().handler_mach, 0x200);
        assert!(find_exception_entry(&table, 0x25).is_none());
        assert!(find_exception_entry(&table, 0x05).is_none());
    }
}
