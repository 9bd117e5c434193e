//! Control-flow graph construction over the bytecode stream
//!
//! Two linear passes: the first splits a block after every branch
//! instruction while recording branch targets in a bitset, the second
//! splits blocks at the recorded targets. A synthesized exit block closes
//! the graph; returns and athrow edge to it. Successor and predecessor
//! edges are wired from each block's terminating instruction.

use log::debug;
use mokka_classfile::opcodes::{
    self, branch_target, insn_size, is_athrow, is_branch, is_cond_branch, is_goto, is_return,
    is_switch, switch_targets,
};

use crate::errors::CompileError;
use crate::support::Bitset;
use crate::unit::{BasicBlock, BlockId, CompilationUnit};

/// Build the unit's basic blocks and successor edges from its bytecode.
pub fn build_cfg(cu: &mut CompilationUnit) -> Result<(), CompileError> {
    let method = cu.method.clone();
    let code = &method.code;
    let code_size = code.len();

    cu.blocks.clear();
    cu.blocks.push(BasicBlock::new(0, code_size));

    let mut branch_targets = Bitset::new(code_size.max(1));
    split_after_branches(cu, code, &mut branch_targets)?;
    split_at_branch_targets(cu, code, &branch_targets)?;

    let exit = BlockId(cu.blocks.len() as u32);
    cu.blocks.push(BasicBlock::new(code_size, code_size));
    cu.entry = BlockId(0);
    cu.exit = exit;

    connect_blocks(cu, code)?;

    debug!(
        "cfg: {}.{} -> {} blocks",
        method.class_name,
        method.name,
        cu.nr_bblocks()
    );
    Ok(())
}

fn check_target(target: i64, code_size: usize, offset: usize) -> Result<usize, CompileError> {
    if target < 0 || target as usize >= code_size {
        return Err(CompileError::BranchOutOfRange { target, offset });
    }
    Ok(target as usize)
}

/// Pass 1: end a block after every branch instruction, recording every
/// branch target. The tail block always spans to the end of the code.
fn split_after_branches(
    cu: &mut CompilationUnit,
    code: &[u8],
    branch_targets: &mut Bitset,
) -> Result<(), CompileError> {
    let code_size = code.len();
    let mut offset = 0;
    while offset < code_size {
        let size = insn_size(code, offset)?;
        let opcode = code[offset];

        if is_branch(opcode) {
            if is_switch(opcode) {
                for target in switch_targets(code, offset)? {
                    branch_targets.set(check_target(target, code_size, offset)?);
                }
            } else {
                let target = branch_target(code, offset)?;
                branch_targets.set(check_target(target, code_size, offset)?);
            }

            let next = offset + size;
            if next < code_size {
                let tail = cu.blocks.last_mut().expect("pass 1 always has a tail block");
                let old_end = tail.end;
                tail.end = next;
                cu.blocks.push(BasicBlock::new(next, old_end));
            }
        }
        offset += size;
    }
    Ok(())
}

/// Pass 2: start a block at every branch target that is not already a
/// block start. A target that never coincides with an instruction start
/// is malformed.
fn split_at_branch_targets(
    cu: &mut CompilationUnit,
    code: &[u8],
    branch_targets: &Bitset,
) -> Result<(), CompileError> {
    let mut seen = Bitset::new(code.len().max(1));
    let mut offset = 0;
    while offset < code.len() {
        seen.set(offset);
        if branch_targets.test(offset) {
            let idx = cu
                .blocks
                .iter()
                .position(|bb| bb.contains(offset))
                .expect("target inside code range lies in some block");
            if cu.blocks[idx].start != offset {
                let old_end = cu.blocks[idx].end;
                cu.blocks[idx].end = offset;
                cu.blocks.insert(idx + 1, BasicBlock::new(offset, old_end));
            }
        }
        offset += insn_size(code, offset)?;
    }

    for target in branch_targets.iter() {
        if !seen.test(target) {
            return Err(CompileError::BranchOutOfRange {
                target: target as i64,
                offset: target,
            });
        }
    }
    Ok(())
}

/// Offset of the last instruction within `[start, end)`.
fn last_insn_offset(code: &[u8], start: usize, end: usize) -> Result<usize, CompileError> {
    let mut offset = start;
    loop {
        let size = insn_size(code, offset)?;
        if offset + size >= end {
            return Ok(offset);
        }
        offset += size;
    }
}

/// Pass 3: wire successor and predecessor edges from each block's
/// terminating instruction.
fn connect_blocks(cu: &mut CompilationUnit, code: &[u8]) -> Result<(), CompileError> {
    let exit = cu.exit;
    let nr_blocks = cu.blocks.len() as u32 - 1;

    let block_at = |cu: &CompilationUnit, offset: usize| -> BlockId {
        cu.find_block(offset)
            .expect("branch target verified to lie on a block start")
    };

    for idx in 0..nr_blocks {
        let id = BlockId(idx);
        let (start, end) = {
            let bb = cu.block(id);
            (bb.start, bb.end)
        };
        if start == end {
            continue;
        }
        let last = last_insn_offset(code, start, end)?;
        let opcode = code[last];

        let mut successors: Vec<BlockId> = Vec::new();
        let mut has_branch = false;

        if is_return(opcode) || is_athrow(opcode) {
            successors.push(exit);
        } else if is_goto(opcode) {
            has_branch = true;
            let target = branch_target(code, last)?;
            successors.push(block_at(cu, target as usize));
        } else if is_cond_branch(opcode) {
            has_branch = true;
            if end >= code.len() {
                return Err(CompileError::TruncatedInstruction { offset: end });
            }
            successors.push(block_at(cu, end));
            let target = branch_target(code, last)?;
            successors.push(block_at(cu, target as usize));
        } else if is_switch(opcode) {
            has_branch = true;
            for target in switch_targets(code, last)? {
                let target_bb = block_at(cu, target as usize);
                if !successors.contains(&target_bb) {
                    successors.push(target_bb);
                }
            }
        } else if opcode == opcodes::OPC_JSR || opcode == opcodes::OPC_JSR_W {
            return Err(CompileError::UnsupportedOpcode {
                opcode,
                offset: last,
            });
        } else {
            // Plain fall-through into the next block
            if end >= code.len() {
                return Err(CompileError::TruncatedInstruction { offset: end });
            }
            successors.push(block_at(cu, end));
        }

        for succ in &successors {
            cu.block_mut(*succ).predecessors.push(id);
        }
        let bb = cu.block_mut(id);
        bb.successors = successors;
        bb.has_branch = has_branch;
    }

    // A method with no bytecode still has a well-formed graph.
    if code.is_empty() {
        cu.block_mut(BlockId(0)).successors.push(exit);
        cu.block_mut(exit).predecessors.push(BlockId(0));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mokka_classfile::opcodes::*;
    use mokka_classfile::ConstantPool;
    use std::sync::Arc;

    fn unit_for(code: Vec<u8>) -> CompilationUnit {
        let method = crate::unit::tests::test_method(code, 0, 0);
        CompilationUnit::new(method, Arc::new(ConstantPool::new()))
    }

    fn assert_block(cu: &CompilationUnit, id: u32, start: usize, end: usize) {
        let bb = cu.block(BlockId(id));
        assert_eq!((bb.start, bb.end), (start, end), "block {id}");
    }

    // public String defaultString(String s) { if (s == null) { s = ""; } return s; }
    fn default_string() -> Vec<u8> {
        vec![
            /* 0 */ OPC_ALOAD_1,
            /* 1 */ OPC_IFNONNULL, 0x00, 0x07,
            /* 4 */ OPC_LDC, 0x02,
            /* 6 */ OPC_ASTORE_1,
            /* 7 */ OPC_ALOAD_1,
            /* 8 */ OPC_ARETURN,
        ]
    }

    #[test]
    fn test_branch_opcode_ends_basic_block() {
        let mut cu = unit_for(default_string());
        build_cfg(&mut cu).unwrap();

        assert_eq!(cu.nr_bblocks(), 3);
        assert_block(&cu, 0, 0, 4);
        assert_block(&cu, 1, 4, 7);
        assert_block(&cu, 2, 7, 9);
    }

    #[test]
    fn test_conditional_branch_has_fallthrough_then_target() {
        let mut cu = unit_for(default_string());
        build_cfg(&mut cu).unwrap();

        let entry = cu.block(cu.entry);
        assert!(entry.has_branch);
        assert_eq!(entry.successors, vec![BlockId(1), BlockId(2)]);

        assert_eq!(cu.block(BlockId(1)).successors, vec![BlockId(2)]);
        assert_eq!(cu.block(BlockId(2)).successors, vec![cu.exit]);
    }

    #[test]
    fn test_predecessors_mirror_successors() {
        let mut cu = unit_for(default_string());
        build_cfg(&mut cu).unwrap();

        assert_eq!(cu.block(BlockId(1)).predecessors, vec![BlockId(0)]);
        assert_eq!(
            cu.block(BlockId(2)).predecessors,
            vec![BlockId(0), BlockId(1)]
        );
        assert_eq!(cu.block(cu.exit).predecessors, vec![BlockId(2)]);
    }

    // public boolean greaterThanZero(int i) { return i > 0; }
    fn greater_than_zero() -> Vec<u8> {
        vec![
            /* 0 */ OPC_ILOAD_1,
            /* 1 */ OPC_IFLE, 0x00, 0x08,
            /* 4 */ OPC_ICONST_1,
            /* 5 */ OPC_GOTO, 0x00, 0x09,
            /* 8 */ OPC_ICONST_0,
            /* 9 */ OPC_IRETURN,
        ]
    }

    #[test]
    fn test_multiple_branches() {
        let mut cu = unit_for(greater_than_zero());
        build_cfg(&mut cu).unwrap();
        assert_eq!(cu.nr_bblocks(), 4);
    }

    #[test]
    fn test_block_ranges_cover_code_disjointly() {
        for code in [default_string(), greater_than_zero()] {
            let code_size = code.len();
            let mut cu = unit_for(code);
            build_cfg(&mut cu).unwrap();

            let mut next = 0;
            for idx in 0..cu.nr_bblocks() {
                let bb = cu.block(BlockId(idx as u32));
                assert_eq!(bb.start, next, "gap or overlap before block {idx}");
                assert!(bb.end > bb.start);
                next = bb.end;
            }
            assert_eq!(next, code_size);
        }
    }

    #[test]
    fn test_branch_to_own_start_yields_self_edge() {
        // 0: iconst_0, 1: ifeq -> 1 (self-loop on block [1,4)), 4: return
        let code = vec![OPC_ICONST_0, OPC_IFEQ, 0x00, 0x01, OPC_RETURN];
        let mut cu = unit_for(code);
        build_cfg(&mut cu).unwrap();

        let loop_bb = cu.find_block(1).unwrap();
        assert!(cu.block(loop_bb).successors.contains(&loop_bb));
        assert!(cu.block(loop_bb).predecessors.contains(&loop_bb));
    }

    #[test]
    fn test_goto_block_has_single_successor() {
        let mut cu = unit_for(greater_than_zero());
        build_cfg(&mut cu).unwrap();

        // Block [4,8) ends in goto 9
        let goto_bb = cu.find_block(4).unwrap();
        let target = cu.find_block(9).unwrap();
        assert_eq!(cu.block(goto_bb).successors, vec![target]);
        assert!(cu.block(goto_bb).has_branch);
    }

    #[test]
    fn test_tableswitch_successors() {
        // 0: iconst_0
        // 1: tableswitch (2 pad bytes, operands at 4, ends at 24)
        // 24..26: one return per target
        let mut code = vec![OPC_ICONST_0, OPC_TABLESWITCH];
        while code.len() % 4 != 0 {
            code.push(0);
        }
        code.extend_from_slice(&24i32.to_be_bytes()); // default
        code.extend_from_slice(&0i32.to_be_bytes()); // low
        code.extend_from_slice(&1i32.to_be_bytes()); // high
        code.extend_from_slice(&25i32.to_be_bytes()); // case 0
        code.extend_from_slice(&26i32.to_be_bytes()); // case 1
        code.push(OPC_RETURN); // 24 (default)
        code.push(OPC_RETURN); // 25
        code.push(OPC_RETURN); // 26

        let mut cu = unit_for(code);
        build_cfg(&mut cu).unwrap();

        let switch_bb = cu.find_block(1).unwrap();
        let succs = cu.block(switch_bb).successors.clone();
        assert_eq!(succs.len(), 3);
        assert_eq!(succs[0], cu.find_block(24).unwrap());
        assert_eq!(succs[1], cu.find_block(25).unwrap());
        assert_eq!(succs[2], cu.find_block(26).unwrap());
    }

    #[test]
    fn test_out_of_range_branch_is_malformed() {
        let code = vec![OPC_GOTO, 0x00, 0x40];
        let mut cu = unit_for(code);
        let err = build_cfg(&mut cu).unwrap_err();
        assert!(matches!(err, CompileError::BranchOutOfRange { .. }));
        assert!(err.is_malformed_bytecode());
    }

    #[test]
    fn test_branch_into_middle_of_instruction_is_malformed() {
        // goto 4 lands inside the sipush at 3
        let code = vec![
            OPC_GOTO, 0x00, 0x04, OPC_SIPUSH, 0x00, 0x01, OPC_RETURN,
        ];
        let mut cu = unit_for(code);
        assert!(matches!(
            build_cfg(&mut cu),
            Err(CompileError::BranchOutOfRange { .. })
        ));
    }

    #[test]
    fn test_unknown_opcode_is_malformed() {
        let code = vec![0xcb];
        let mut cu = unit_for(code);
        assert!(matches!(
            build_cfg(&mut cu),
            Err(CompileError::InvalidOpcode { opcode: 0xcb, .. })
        ));
    }

    #[test]
    fn test_truncated_instruction_is_malformed() {
        let code = vec![OPC_SIPUSH, 0x01];
        let mut cu = unit_for(code);
        assert!(matches!(
            build_cfg(&mut cu),
            Err(CompileError::TruncatedInstruction { .. })
        ));
    }

    #[test]
    fn test_returns_edge_to_exit() {
        let code = vec![OPC_ICONST_0, OPC_IRETURN];
        let mut cu = unit_for(code);
        build_cfg(&mut cu).unwrap();
        assert_eq!(cu.nr_bblocks(), 1);
        assert_eq!(cu.block(cu.entry).successors, vec![cu.exit]);
        let exit = cu.block(cu.exit);
        assert_eq!(exit.start, exit.end);
    }
}
