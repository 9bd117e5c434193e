//! Liveness analysis
//!
//! Per-block def and use bitsets, a fixed-point dataflow for
//! live-in/live-out, and one live interval per virtual register over the
//! global `lir_pos` ordering.

use log::trace;

use crate::isel::{Operand, Rv};
use crate::regalloc::interval::{LiveInterval, OperandSite};
use crate::support::Bitset;
use crate::unit::{BlockId, CompilationUnit, Vreg};

/// Assign `lir_pos` to every instruction in strict program order and
/// record the positions of call instructions. Must run before liveness.
pub fn compute_insn_positions(cu: &mut CompilationUnit) {
    let order: Vec<BlockId> = cu.emission_order().collect();
    let mut pos = 0u32;
    let mut call_positions = Vec::new();
    for id in order {
        for insn in &mut cu.block_mut(id).insns {
            insn.lir_pos = pos;
            if insn.is_call() {
                call_positions.push(pos);
            }
            pos += 1;
        }
    }
    cu.call_positions = call_positions;
}

/// Compute def/use/live-in/live-out sets and per-variable intervals.
pub fn analyze_liveness(cu: &mut CompilationUnit) -> Vec<LiveInterval> {
    let nr_vregs = cu.vars.len();
    let order: Vec<BlockId> = cu.emission_order().collect();

    // Per-block def and upward-exposed use sets
    for &id in &order {
        let bb = cu.block_mut(id);
        let mut def_set = Bitset::new(nr_vregs);
        let mut use_set = Bitset::new(nr_vregs);
        for insn in &bb.insns {
            for vreg in insn.uses() {
                if !def_set.test(vreg.0 as usize) {
                    use_set.set(vreg.0 as usize);
                }
            }
            for vreg in insn.defs() {
                def_set.set(vreg.0 as usize);
            }
        }
        bb.live_in = Bitset::new(nr_vregs);
        bb.live_out = Bitset::new(nr_vregs);
        bb.def_set = def_set;
        bb.use_set = use_set;
    }

    // Fixed point: live_out = U live_in(succ); live_in = use + (live_out - def)
    let mut changed = true;
    while changed {
        changed = false;
        for &id in order.iter().rev() {
            let mut live_out = Bitset::new(nr_vregs);
            for succ in cu.block(id).successors.clone() {
                live_out.union_with(&cu.block(succ).live_in);
            }
            let bb = cu.block(id);
            let mut live_in = live_out.clone();
            live_in.subtract(&bb.def_set);
            live_in.union_with(&bb.use_set);

            if live_out != bb.live_out || live_in != bb.live_in {
                changed = true;
                let bb = cu.block_mut(id);
                bb.live_out = live_out;
                bb.live_in = live_in;
            }
        }
    }

    // Intervals over the global position space, with operand
    // back-references for the allocator's rewriting pass
    let mut intervals: Vec<LiveInterval> = cu
        .vars
        .iter()
        .map(|var| LiveInterval::new(var.vreg))
        .collect();

    let extend = |intervals: &mut Vec<LiveInterval>, v: usize, start: u32, end: u32| {
        let range = &mut intervals[v].range;
        range.start = range.start.min(start);
        range.end = range.end.max(end);
    };

    for &id in &order {
        let (first_pos, last_pos) = {
            let bb = cu.block(id);
            match (bb.insns.first(), bb.insns.last()) {
                (Some(first), Some(last)) => (first.lir_pos, last.lir_pos),
                _ => continue,
            }
        };

        for insn_idx in 0..cu.block(id).insns.len() {
            let insn = &cu.block(id).insns[insn_idx];
            let pos = insn.lir_pos;
            let uses = insn.uses();
            let defs = insn.defs();

            // Back-references to every explicit operand occurrence
            let mut sites: Vec<(usize, OperandSite)> = Vec::new();
            for (operand_idx, operand) in insn.operands.iter().enumerate() {
                let mut note = |v: Vreg| {
                    sites.push((
                        v.0 as usize,
                        OperandSite {
                            block: id,
                            insn_idx,
                            operand_idx,
                            lir_pos: pos,
                        },
                    ))
                };
                match operand {
                    Operand::Reg(Rv::Virt(v)) => note(*v),
                    Operand::Membase {
                        base: Rv::Virt(v), ..
                    } => note(*v),
                    Operand::Memindex { base, index, .. } => {
                        if let Rv::Virt(v) = base {
                            note(*v);
                        }
                        if let Rv::Virt(v) = index {
                            note(*v);
                        }
                    }
                    _ => {}
                }
            }
            for (v, site) in sites {
                intervals[v].sites.push(site);
            }

            for vreg in uses {
                extend(&mut intervals, vreg.0 as usize, pos, pos + 1);
            }
            for vreg in defs {
                extend(&mut intervals, vreg.0 as usize, pos, pos + 1);
            }
        }

        // Live-in variables are live from the block's first position;
        // live-out variables stay live through its last.
        let live_in: Vec<usize> = cu.block(id).live_in.iter().collect();
        let live_out: Vec<usize> = cu.block(id).live_out.iter().collect();
        for v in live_in {
            extend(&mut intervals, v, first_pos, first_pos + 1);
        }
        for v in live_out {
            extend(&mut intervals, v, first_pos, last_pos + 1);
        }
    }

    trace!(
        "liveness: {} vregs, {} live intervals",
        nr_vregs,
        intervals.iter().filter(|i| i.is_live()).count()
    );
    intervals
}
