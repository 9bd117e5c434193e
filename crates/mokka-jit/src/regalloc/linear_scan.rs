//! Linear-scan register allocation
//!
//! Walks intervals in start order with an active set. Fixed intervals
//! evict the current holder of their register by splitting it at the
//! walk point and spilling the remainder; under pressure the active
//! interval with the furthest end is spilled. Intervals that live across
//! a call are spilled outright since the register file is caller-saved.
//!
//! After assignment, register operands are rewritten through each
//! interval's back-references, and spilled variables get a reload before
//! every use and a store after every def through reserved scratch
//! registers (r9/r10/r11, xmm6/xmm7).

use log::{debug, trace};
use rustc_hash::FxHashMap;

use mokka_classfile::VmType;

use crate::frame::StackSlot;
use crate::isel::{MachInsn, MachOp, MachReg, Operand, Rv, Width};
use crate::regalloc::interval::LiveInterval;
use crate::unit::{BlockId, CompilationUnit, Vreg};

/// Scratch registers reserved for spill rewriting, never allocated.
const GP_SCRATCH: [MachReg; 3] = [MachReg::R10, MachReg::R11, MachReg::R9];
const FP_SCRATCH: [MachReg; 2] = [MachReg::Xmm6, MachReg::Xmm7];

/// The allocatable register file, split by bank.
#[derive(Debug, Clone)]
pub struct RegisterSet {
    pub gp: Vec<MachReg>,
    pub fp: Vec<MachReg>,
}

impl Default for RegisterSet {
    /// Caller-saved x86-64 registers, minus the spill scratch set.
    fn default() -> RegisterSet {
        RegisterSet {
            gp: vec![
                MachReg::Rax,
                MachReg::Rcx,
                MachReg::Rdx,
                MachReg::Rsi,
                MachReg::Rdi,
                MachReg::R8,
            ],
            fp: vec![
                MachReg::Xmm0,
                MachReg::Xmm1,
                MachReg::Xmm2,
                MachReg::Xmm3,
                MachReg::Xmm4,
                MachReg::Xmm5,
            ],
        }
    }
}

/// A register-to-slot store pending at a split position.
struct SplitStore {
    pos: u32,
    reg: MachReg,
    slot: StackSlot,
    ty: VmType,
}

/// Assign every live interval a register or spill slot, then rewrite the
/// block instruction streams accordingly.
pub fn allocate_registers(
    cu: &mut CompilationUnit,
    intervals: &mut Vec<LiveInterval>,
    regs: &RegisterSet,
) {
    let split_stores = run_scan(cu, intervals, regs);
    rewrite_operands(cu, intervals);
    insert_spill_code(cu, intervals, split_stores);
    debug!(
        "regalloc: {} intervals, {} spilled, {} spill slots",
        intervals.len(),
        intervals.iter().filter(|i| i.spill_slot.is_some()).count(),
        cu.frame.nr_spill_slots()
    );
}

fn var_ty(cu: &CompilationUnit, vreg: Vreg) -> VmType {
    cu.var(vreg).ty
}

/// Reuse the variable's existing slot across split pieces; allocate on
/// first spill.
fn spill_slot_for(cu: &mut CompilationUnit, intervals: &[LiveInterval], vreg: Vreg) -> StackSlot {
    if let Some(slot) = intervals
        .iter()
        .filter(|iv| iv.vreg == vreg)
        .find_map(|iv| iv.spill_slot)
    {
        return slot;
    }
    if var_ty(cu, vreg).is_wide() {
        cu.frame.spill_slot_64()
    } else {
        cu.frame.spill_slot_32()
    }
}

fn run_scan(
    cu: &mut CompilationUnit,
    intervals: &mut Vec<LiveInterval>,
    regs: &RegisterSet,
) -> Vec<SplitStore> {
    let mut queue: Vec<usize> = (0..intervals.len())
        .filter(|&i| intervals[i].is_live())
        .collect();
    queue.sort_by_key(|&i| intervals[i].range.start);

    let mut active: Vec<usize> = Vec::new();
    let mut split_stores = Vec::new();

    for &cur in &queue {
        let start = intervals[cur].range.start;
        active.retain(|&a| intervals[a].range.end > start);

        let vreg = intervals[cur].vreg;
        let fixed = cu.var(vreg).fixed;
        let is_fp = var_ty(cu, vreg).is_float();

        if let Some(required) = fixed {
            evict(cu, intervals, &mut active, &mut split_stores, required, start);
            intervals[cur].reg = Some(required);
            active.push(cur);
            continue;
        }

        // Everything allocatable is caller-saved; a value live across a
        // call can only live in memory.
        let crosses_call = cu.call_positions.iter().any(|&c| {
            intervals[cur].range.start < c && c + 1 < intervals[cur].range.end
        });
        if crosses_call {
            let slot = spill_slot_for(cu, intervals, vreg);
            intervals[cur].spill_slot = Some(slot);
            trace!("regalloc: {} spans a call, spilled", vreg);
            continue;
        }

        let pool = if is_fp { &regs.fp } else { &regs.gp };
        let free = pool
            .iter()
            .copied()
            .find(|reg| !active.iter().any(|&a| intervals[a].reg == Some(*reg)));

        if let Some(reg) = free {
            intervals[cur].reg = Some(reg);
            active.push(cur);
            continue;
        }

        // Pressure: spill whichever same-bank unfixed interval lives longest
        let victim = active
            .iter()
            .copied()
            .filter(|&a| {
                intervals[a].reg.is_some_and(|r| r.is_fp() == is_fp)
                    && cu.var(intervals[a].vreg).fixed.is_none()
            })
            .max_by_key(|&a| intervals[a].range.end);

        match victim {
            Some(v) if intervals[v].range.end > intervals[cur].range.end => {
                let reg = intervals[v].reg.take().expect("active interval holds a register");
                let slot = spill_slot_for(cu, intervals, intervals[v].vreg);
                intervals[v].spill_slot = Some(slot);
                active.retain(|&a| a != v);
                intervals[cur].reg = Some(reg);
                active.push(cur);
            }
            _ => {
                let slot = spill_slot_for(cu, intervals, vreg);
                intervals[cur].spill_slot = Some(slot);
            }
        }
    }
    split_stores
}

/// Free `required` by splitting whatever active interval holds it at
/// `pos` and spilling the tail.
fn evict(
    cu: &mut CompilationUnit,
    intervals: &mut Vec<LiveInterval>,
    active: &mut Vec<usize>,
    split_stores: &mut Vec<SplitStore>,
    required: MachReg,
    pos: u32,
) {
    let Some(idx_in_active) = active
        .iter()
        .position(|&a| intervals[a].reg == Some(required))
    else {
        return;
    };
    let victim = active.remove(idx_in_active);

    if intervals[victim].range.start < pos && pos < intervals[victim].range.end {
        // The register-resident head keeps its assignment; the tail goes
        // to memory, with the boundary store flushing the live value.
        let mut child = intervals[victim].split_at(pos, victim);
        child.reg = None;
        let slot = spill_slot_for(cu, intervals, child.vreg);
        child.spill_slot = Some(slot);
        split_stores.push(SplitStore {
            pos,
            reg: required,
            slot,
            ty: var_ty(cu, child.vreg),
        });
        intervals.push(child);
    } else {
        intervals[victim].reg = None;
        let slot = spill_slot_for(cu, intervals, intervals[victim].vreg);
        intervals[victim].spill_slot = Some(slot);
    }
}

/// Rewrite every register-assigned interval's operand back-references.
fn rewrite_operands(cu: &mut CompilationUnit, intervals: &[LiveInterval]) {
    for interval in intervals {
        let Some(reg) = interval.reg else { continue };
        let vreg = interval.vreg;
        for site in &interval.sites {
            let insn = &mut cu.block_mut(site.block).insns[site.insn_idx];
            rewrite_operand(&mut insn.operands[site.operand_idx], vreg, reg);
        }
    }
}

fn rewrite_operand(operand: &mut Operand, vreg: Vreg, reg: MachReg) {
    let swap = |rv: &mut Rv| {
        if *rv == Rv::Virt(vreg) {
            *rv = Rv::Phys(reg);
        }
    };
    match operand {
        Operand::Reg(rv) => swap(rv),
        Operand::Membase { base, .. } => swap(base),
        Operand::Memindex { base, index, .. } => {
            swap(base);
            swap(index);
        }
        _ => {}
    }
}

/// Replace remaining virtual operands (spilled variables) with scratch
/// registers, inserting reloads before uses and stores after defs.
fn insert_spill_code(
    cu: &mut CompilationUnit,
    intervals: &[LiveInterval],
    split_stores: Vec<SplitStore>,
) {
    let mut by_vreg: FxHashMap<Vreg, Vec<usize>> = FxHashMap::default();
    for (idx, interval) in intervals.iter().enumerate() {
        by_vreg.entry(interval.vreg).or_default().push(idx);
    }
    let slot_at = |vreg: Vreg, pos: u32| -> Option<StackSlot> {
        by_vreg.get(&vreg)?.iter().find_map(|&idx| {
            let iv = &intervals[idx];
            if iv.range.covers(pos) && iv.reg.is_none() {
                iv.spill_slot
            } else {
                None
            }
        })
    };

    let order: Vec<BlockId> = cu.emission_order().collect();
    for id in order {
        let old = std::mem::take(&mut cu.block_mut(id).insns);
        let mut new_insns = Vec::with_capacity(old.len());

        for mut insn in old {
            let pos = insn.lir_pos;

            for store in split_stores.iter().filter(|s| s.pos == pos) {
                new_insns.push(slot_store(cu, store.reg, store.slot, store.ty));
            }

            let uses = insn.uses();
            let defs = insn.defs();

            // Scratch assignment per distinct spilled vreg in this insn
            let mut assigned: Vec<(Vreg, MachReg, StackSlot)> = Vec::new();
            let mut gp_next = 0;
            let mut fp_next = 0;
            {
                let mut resolve = |vreg: Vreg| -> Option<MachReg> {
                    if let Some((_, reg, _)) = assigned.iter().find(|(v, _, _)| *v == vreg) {
                        return Some(*reg);
                    }
                    let slot = slot_at(vreg, pos)?;
                    let reg = if cu.var(vreg).ty.is_float() {
                        let reg = FP_SCRATCH[fp_next];
                        fp_next += 1;
                        reg
                    } else {
                        let reg = GP_SCRATCH[gp_next];
                        gp_next += 1;
                        reg
                    };
                    assigned.push((vreg, reg, slot));
                    Some(reg)
                };

                for operand in &mut insn.operands {
                    let mut swap = |rv: &mut Rv| {
                        if let Rv::Virt(v) = *rv {
                            let reg = resolve(v).unwrap_or_else(|| {
                                panic!("virtual register {v} survived allocation unspilled")
                            });
                            *rv = Rv::Phys(reg);
                        }
                    };
                    match operand {
                        Operand::Reg(rv) => swap(rv),
                        Operand::Membase { base, .. } => swap(base),
                        Operand::Memindex { base, index, .. } => {
                            swap(base);
                            swap(index);
                        }
                        _ => {}
                    }
                }
            }

            for (vreg, reg, slot) in &assigned {
                if uses.contains(vreg) {
                    new_insns.push(slot_load(cu, *slot, *reg, cu.var(*vreg).ty));
                }
            }
            let spills: Vec<MachInsn> = assigned
                .iter()
                .filter(|(vreg, _, _)| defs.contains(vreg))
                .map(|(vreg, reg, slot)| slot_store(cu, *reg, *slot, cu.var(*vreg).ty))
                .collect();

            new_insns.push(insn);
            new_insns.extend(spills);
        }
        cu.block_mut(id).insns = new_insns;
    }
}

fn slot_mem(cu: &CompilationUnit, slot: StackSlot) -> Operand {
    Operand::Membase {
        base: Rv::Phys(MachReg::Rbp),
        disp: cu.frame.slot_offset_x64(slot),
    }
}

fn slot_load(cu: &CompilationUnit, slot: StackSlot, reg: MachReg, ty: VmType) -> MachInsn {
    let (op, width) = if ty.is_float() {
        (MachOp::MovfMembaseReg, fp_width(ty))
    } else {
        (MachOp::MovMembaseReg, int_width(ty))
    };
    MachInsn::new(op, width, vec![slot_mem(cu, slot), Operand::Reg(Rv::Phys(reg))])
}

fn slot_store(cu: &CompilationUnit, reg: MachReg, slot: StackSlot, ty: VmType) -> MachInsn {
    let (op, width) = if ty.is_float() {
        (MachOp::MovfRegMembase, fp_width(ty))
    } else {
        (MachOp::MovRegMembase, int_width(ty))
    };
    MachInsn::new(op, width, vec![Operand::Reg(Rv::Phys(reg)), slot_mem(cu, slot)])
}

fn int_width(ty: VmType) -> Width {
    match ty.widened() {
        VmType::Long | VmType::Reference => Width::W64,
        _ => Width::W32,
    }
}

fn fp_width(ty: VmType) -> Width {
    if ty == VmType::Double {
        Width::W64
    } else {
        Width::W32
    }
}
