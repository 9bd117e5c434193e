//! The per-method compilation unit
//!
//! Owns everything the pipeline produces for one method: the basic-block
//! arena (blocks reference each other by index, since the graph has
//! cycles), the virtual-register pool, the frame descriptor, and the
//! finished code range. Compilation is serialized externally by the
//! prepared-method lock; the unit itself is plain data.

use std::sync::Arc;

use mokka_classfile::{ConstantPool, MethodInfo, VmType};

use crate::frame::StackFrame;
use crate::ir::Stmt;
use crate::isel::{MachInsn, MachReg};
use crate::support::Bitset;

/// Index of a basic block within its unit's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// A virtual register number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Vreg(pub u32);

impl std::fmt::Display for Vreg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A virtual register and its allocation constraints
#[derive(Debug, Clone)]
pub struct VarInfo {
    pub vreg: Vreg,
    pub ty: VmType,
    /// Physical register this variable is pinned to by the calling
    /// convention or an instruction requirement
    pub fixed: Option<MachReg>,
}

/// A straight-line region of bytecode with a single entry
#[derive(Debug)]
pub struct BasicBlock {
    /// Bytecode range `[start, end)`; the exit block has an empty range
    pub start: usize,
    pub end: usize,
    pub stmts: Vec<Stmt>,
    pub insns: Vec<MachInsn>,
    pub successors: Vec<BlockId>,
    pub predecessors: Vec<BlockId>,
    pub has_branch: bool,
    /// Buffer offsets of forward-branch displacement fields that target
    /// this block and await back-patching
    pub backpatch_sites: Vec<usize>,
    pub def_set: Bitset,
    pub use_set: Bitset,
    pub live_in: Bitset,
    pub live_out: Bitset,
    /// Offset of this block's first instruction in the emitted buffer
    pub mach_offset: usize,
}

impl BasicBlock {
    pub fn new(start: usize, end: usize) -> BasicBlock {
        BasicBlock {
            start,
            end,
            stmts: Vec::new(),
            insns: Vec::new(),
            successors: Vec::new(),
            predecessors: Vec::new(),
            has_branch: false,
            backpatch_sites: Vec::new(),
            def_set: Bitset::new(0),
            use_set: Bitset::new(0),
            live_in: Bitset::new(0),
            live_out: Bitset::new(0),
            mach_offset: 0,
        }
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

/// One row of the native (machine-offset) exception table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeExceptionEntry {
    pub start_mach: usize,
    pub end_mach: usize,
    pub handler_mach: usize,
    /// Runtime class id of the catch type; 0 catches everything
    pub catch_type_id: u32,
}

/// The placed, executable code of a compiled unit
#[derive(Debug, Clone, Copy)]
pub struct CodeRange {
    pub addr: usize,
    pub len: usize,
}

impl CodeRange {
    pub fn contains(&self, ip: usize) -> bool {
        ip >= self.addr && ip < self.addr + self.len
    }
}

/// An 8-byte-aligned patchable word pair at a virtual/interface call site
#[derive(Debug, Clone, Copy)]
pub struct InlineCacheSite {
    /// Buffer offset of the class-id immediate
    pub class_id_offset: usize,
    /// Buffer offset of the target-address immediate
    pub target_offset: usize,
}

/// Per-method work item for the whole pipeline
pub struct CompilationUnit {
    pub method: Arc<MethodInfo>,
    pub pool: Arc<ConstantPool>,
    /// Block arena in emission order; edges are indices into this vector
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
    pub exit: BlockId,
    pub frame: StackFrame,
    pub vars: Vec<VarInfo>,
    /// lir positions holding a call instruction (caller-saved registers
    /// are clobbered across these)
    pub call_positions: Vec<u32>,
    pub exception_table: Vec<NativeExceptionEntry>,
    pub ic_sites: Vec<InlineCacheSite>,
    pub code: Option<CodeRange>,
}

impl CompilationUnit {
    pub fn new(method: Arc<MethodInfo>, pool: Arc<ConstantPool>) -> CompilationUnit {
        let frame = StackFrame::new(method.args_count as u32, method.max_locals as u32);
        CompilationUnit {
            method,
            pool,
            blocks: Vec::new(),
            entry: BlockId(0),
            exit: BlockId(0),
            frame,
            vars: Vec::new(),
            call_positions: Vec::new(),
            exception_table: Vec::new(),
            ic_sites: Vec::new(),
            code: None,
        }
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0 as usize]
    }

    /// Number of blocks excluding the exit block.
    pub fn nr_bblocks(&self) -> usize {
        self.blocks.len().saturating_sub(1)
    }

    /// The block whose bytecode range contains `offset`.
    pub fn find_block(&self, offset: usize) -> Option<BlockId> {
        self.blocks
            .iter()
            .position(|bb| bb.contains(offset))
            .map(|i| BlockId(i as u32))
    }

    /// Allocate a fresh virtual register.
    pub fn alloc_var(&mut self, ty: VmType) -> Vreg {
        let vreg = Vreg(self.vars.len() as u32);
        self.vars.push(VarInfo {
            vreg,
            ty,
            fixed: None,
        });
        vreg
    }

    /// Allocate a virtual register pinned to a physical register.
    pub fn alloc_fixed_var(&mut self, ty: VmType, reg: MachReg) -> Vreg {
        let vreg = Vreg(self.vars.len() as u32);
        self.vars.push(VarInfo {
            vreg,
            ty,
            fixed: Some(reg),
        });
        vreg
    }

    pub fn var(&self, vreg: Vreg) -> &VarInfo {
        &self.vars[vreg.0 as usize]
    }

    /// Blocks in emission order (everything but the exit block, then exit).
    pub fn emission_order(&self) -> impl Iterator<Item = BlockId> + '_ {
        let exit = self.exit;
        let nr = self.blocks.len() as u32;
        (0..nr)
            .map(BlockId)
            .filter(move |id| *id != exit)
            .chain(std::iter::once(exit).filter(move |id| id.0 < nr))
    }
}
