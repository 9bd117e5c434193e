//! Machine-instruction model and instruction selection
//!
//! The selector lowers each block's statement list into a linear sequence
//! of x86-64 instructions over virtual registers; the allocator later
//! rewrites the virtual operands to physical registers and spill code.

pub mod select;

use crate::unit::{BlockId, Vreg};

/// Physical x86-64 registers.
///
/// The general-purpose file is split into an allocatable caller-saved set,
/// reserved scratch registers used by spill rewriting, and the frame
/// registers. XMM0-5 are allocatable, XMM6/7 are scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachReg {
    Rax,
    Rcx,
    Rdx,
    Rbx,
    Rsp,
    Rbp,
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Xmm0,
    Xmm1,
    Xmm2,
    Xmm3,
    Xmm4,
    Xmm5,
    Xmm6,
    Xmm7,
}

impl MachReg {
    /// Hardware register number (ModRM/REX encoding).
    pub fn encoding(self) -> u8 {
        match self {
            MachReg::Rax => 0,
            MachReg::Rcx => 1,
            MachReg::Rdx => 2,
            MachReg::Rbx => 3,
            MachReg::Rsp => 4,
            MachReg::Rbp => 5,
            MachReg::Rsi => 6,
            MachReg::Rdi => 7,
            MachReg::R8 => 8,
            MachReg::R9 => 9,
            MachReg::R10 => 10,
            MachReg::R11 => 11,
            MachReg::R12 => 12,
            MachReg::R13 => 13,
            MachReg::R14 => 14,
            MachReg::R15 => 15,
            MachReg::Xmm0 => 0,
            MachReg::Xmm1 => 1,
            MachReg::Xmm2 => 2,
            MachReg::Xmm3 => 3,
            MachReg::Xmm4 => 4,
            MachReg::Xmm5 => 5,
            MachReg::Xmm6 => 6,
            MachReg::Xmm7 => 7,
        }
    }

    pub fn is_fp(self) -> bool {
        matches!(
            self,
            MachReg::Xmm0
                | MachReg::Xmm1
                | MachReg::Xmm2
                | MachReg::Xmm3
                | MachReg::Xmm4
                | MachReg::Xmm5
                | MachReg::Xmm6
                | MachReg::Xmm7
        )
    }

    pub fn is_caller_saved(self) -> bool {
        matches!(
            self,
            MachReg::Rax
                | MachReg::Rcx
                | MachReg::Rdx
                | MachReg::Rsi
                | MachReg::Rdi
                | MachReg::R8
                | MachReg::R9
                | MachReg::R10
                | MachReg::R11
        ) || self.is_fp()
    }
}

/// System V integer argument registers, in order.
pub const ARG_REGS: [MachReg; 6] = [
    MachReg::Rdi,
    MachReg::Rsi,
    MachReg::Rdx,
    MachReg::Rcx,
    MachReg::R8,
    MachReg::R9,
];

/// System V floating-point argument registers, in order.
pub const FP_ARG_REGS: [MachReg; 6] = [
    MachReg::Xmm0,
    MachReg::Xmm1,
    MachReg::Xmm2,
    MachReg::Xmm3,
    MachReg::Xmm4,
    MachReg::Xmm5,
];

/// A register value: physical after allocation, virtual before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rv {
    Phys(MachReg),
    Virt(Vreg),
}

impl Rv {
    pub fn phys(self) -> MachReg {
        match self {
            Rv::Phys(reg) => reg,
            Rv::Virt(v) => panic!("unallocated virtual register {v} survived allocation"),
        }
    }

    pub fn virt(self) -> Option<Vreg> {
        match self {
            Rv::Virt(v) => Some(v),
            Rv::Phys(_) => None,
        }
    }
}

/// Instruction operand
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Reg(Rv),
    /// `[base + disp]`
    Membase { base: Rv, disp: i32 },
    /// `[base + index * (1 << shift)]`
    Memindex { base: Rv, index: Rv, shift: u8 },
    Imm(i64),
    /// Absolute call-target address; the emitter computes the rel32 form
    Rel(u64),
    Branch(BlockId),
}

/// Operand size. `W32` covers int-class values and single floats, `W64`
/// longs, references, and doubles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    W32,
    W64,
}

/// Branch/set condition codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    E,
    Ne,
    L,
    Ge,
    G,
    Le,
    B,
    Ae,
    A,
    Be,
}

impl Cond {
    pub fn negate(self) -> Cond {
        match self {
            Cond::E => Cond::Ne,
            Cond::Ne => Cond::E,
            Cond::L => Cond::Ge,
            Cond::Ge => Cond::L,
            Cond::G => Cond::Le,
            Cond::Le => Cond::G,
            Cond::B => Cond::Ae,
            Cond::Ae => Cond::B,
            Cond::A => Cond::Be,
            Cond::Be => Cond::A,
        }
    }

    /// The `cc` nibble in `0F 8x`/`0F 9x` encodings.
    pub fn encoding(self) -> u8 {
        match self {
            Cond::B => 0x2,
            Cond::Ae => 0x3,
            Cond::E => 0x4,
            Cond::Ne => 0x5,
            Cond::Be => 0x6,
            Cond::A => 0x7,
            Cond::L => 0xC,
            Cond::Ge => 0xD,
            Cond::Le => 0xE,
            Cond::G => 0xF,
        }
    }
}

/// Machine opcodes. Operand order is `[source..., destination]`; for
/// read-modify-write ALU forms the destination is both a use and a def.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MachOp {
    // Integer moves
    MovImmReg,
    MovImmMembase,
    MovMembaseReg,
    MovRegMembase,
    MovMemindexReg,
    MovRegMemindex,
    MovRegReg,
    // Sign/zero extensions
    MovsxdRegReg,
    MovsxByteRegReg,
    MovsxWordRegReg,
    MovzxWordRegReg,
    // Sub-word memory access (byte and short fields and array elements)
    MovsxByteMembaseReg,
    MovzxByteMembaseReg,
    MovsxWordMembaseReg,
    MovzxWordMembaseReg,
    MovsxByteMemindexReg,
    MovzxByteMemindexReg,
    MovsxWordMemindexReg,
    MovzxWordMemindexReg,
    MovByteRegMembase,
    MovWordRegMembase,
    MovByteRegMemindex,
    MovWordRegMemindex,
    // Integer ALU, two-operand RMW
    AddRegReg,
    AddImmReg,
    SubRegReg,
    SubImmReg,
    ImulRegReg,
    AndRegReg,
    OrRegReg,
    XorRegReg,
    NegReg,
    NotReg,
    // Division pins rax/rdx
    Cdq,
    IdivReg,
    // Shift count in cl
    ShlRegReg,
    SarRegReg,
    ShrRegReg,
    // Flags
    CmpRegReg,
    CmpImmReg,
    TestRegReg,
    Setcc(Cond),
    MovzxByteRegReg,
    // Control flow
    Jcc(Cond),
    Jmp,
    CallRel,
    CallReg,
    /// Patchable virtual-dispatch call site: 8-byte-aligned class-id and
    /// target-address immediates, separately addressable
    IcCall,
    Ret,
    PushReg,
    PushImm,
    PopReg,
    /// `ud2` reached when `cond` holds; the signal handler maps the trap
    /// back to the runtime exception
    TrapIf(Cond),
    // Floating point (scalar SSE; width selects ss/sd)
    MovfMembaseReg,
    MovfRegMembase,
    MovfMemindexReg,
    MovfRegMemindex,
    MovfRegReg,
    FaddRegReg,
    FsubRegReg,
    FmulRegReg,
    FdivRegReg,
    UcomifRegReg,
    XorpsRegReg,
    /// General-purpose to XMM bit move
    MovqGprXmm,
    // Conversions (width is the integer side)
    Cvtsi2ss,
    Cvtsi2sd,
    Cvttss2si,
    Cvttsd2si,
    Cvtss2sd,
    Cvtsd2ss,
}

/// How an instruction treats its destination operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DestRole {
    /// Pure definition (moves into a register)
    Def,
    /// Read-modify-write (two-operand ALU)
    UseDef,
    /// No destination; every operand is a use (stores, compares, control)
    NoDest,
}

fn dest_role(op: MachOp) -> DestRole {
    match op {
        MachOp::MovImmReg
        | MachOp::MovMembaseReg
        | MachOp::MovMemindexReg
        | MachOp::MovRegReg
        | MachOp::MovsxdRegReg
        | MachOp::MovsxByteRegReg
        | MachOp::MovsxWordRegReg
        | MachOp::MovzxWordRegReg
        | MachOp::MovzxByteRegReg
        | MachOp::MovsxByteMembaseReg
        | MachOp::MovzxByteMembaseReg
        | MachOp::MovsxWordMembaseReg
        | MachOp::MovzxWordMembaseReg
        | MachOp::MovsxByteMemindexReg
        | MachOp::MovzxByteMemindexReg
        | MachOp::MovsxWordMemindexReg
        | MachOp::MovzxWordMemindexReg
        | MachOp::Setcc(_)
        | MachOp::PopReg
        | MachOp::MovfMembaseReg
        | MachOp::MovfMemindexReg
        | MachOp::MovfRegReg
        | MachOp::MovqGprXmm
        | MachOp::Cvtsi2ss
        | MachOp::Cvtsi2sd
        | MachOp::Cvttss2si
        | MachOp::Cvttsd2si
        | MachOp::Cvtss2sd
        | MachOp::Cvtsd2ss => DestRole::Def,
        MachOp::AddRegReg
        | MachOp::AddImmReg
        | MachOp::SubRegReg
        | MachOp::SubImmReg
        | MachOp::ImulRegReg
        | MachOp::AndRegReg
        | MachOp::OrRegReg
        | MachOp::XorRegReg
        | MachOp::NegReg
        | MachOp::NotReg
        | MachOp::ShlRegReg
        | MachOp::SarRegReg
        | MachOp::ShrRegReg
        | MachOp::FaddRegReg
        | MachOp::FsubRegReg
        | MachOp::FmulRegReg
        | MachOp::FdivRegReg
        | MachOp::XorpsRegReg => DestRole::UseDef,
        MachOp::MovImmMembase
        | MachOp::MovRegMembase
        | MachOp::MovRegMemindex
        | MachOp::MovByteRegMembase
        | MachOp::MovWordRegMembase
        | MachOp::MovByteRegMemindex
        | MachOp::MovWordRegMemindex
        | MachOp::MovfRegMembase
        | MachOp::MovfRegMemindex
        | MachOp::Cdq
        | MachOp::IdivReg
        | MachOp::CmpRegReg
        | MachOp::CmpImmReg
        | MachOp::TestRegReg
        | MachOp::UcomifRegReg
        | MachOp::Jcc(_)
        | MachOp::Jmp
        | MachOp::CallRel
        | MachOp::CallReg
        | MachOp::IcCall
        | MachOp::Ret
        | MachOp::PushReg
        | MachOp::PushImm
        | MachOp::TrapIf(_) => DestRole::NoDest,
    }
}

/// A machine instruction: opcode plus up to three operands, with the
/// linear position and emitted offset filled in by later stages.
#[derive(Debug, Clone)]
pub struct MachInsn {
    pub op: MachOp,
    pub width: Width,
    pub operands: Vec<Operand>,
    /// Variables read/written through implicit register constraints
    /// (call arguments and returns, cdq/idiv's rax:rdx pair)
    pub implicit_uses: Vec<Vreg>,
    pub implicit_defs: Vec<Vreg>,
    pub lir_pos: u32,
    pub mach_offset: usize,
}

impl MachInsn {
    pub fn new(op: MachOp, width: Width, operands: Vec<Operand>) -> MachInsn {
        debug_assert!(operands.len() <= 3);
        MachInsn {
            op,
            width,
            operands,
            implicit_uses: Vec::new(),
            implicit_defs: Vec::new(),
            lir_pos: 0,
            mach_offset: 0,
        }
    }

    pub fn with_implicit(mut self, uses: Vec<Vreg>, defs: Vec<Vreg>) -> MachInsn {
        self.implicit_uses = uses;
        self.implicit_defs = defs;
        self
    }

    pub fn is_branch(&self) -> bool {
        matches!(self.op, MachOp::Jcc(_) | MachOp::Jmp)
    }

    pub fn is_call(&self) -> bool {
        matches!(self.op, MachOp::CallRel | MachOp::CallReg | MachOp::IcCall)
    }

    pub fn branch_target(&self) -> Option<BlockId> {
        self.operands.iter().find_map(|operand| match operand {
            Operand::Branch(target) => Some(*target),
            _ => None,
        })
    }

    /// Virtual registers this instruction defines.
    pub fn defs(&self) -> Vec<Vreg> {
        let mut out = self.implicit_defs.clone();
        if dest_role(self.op) != DestRole::NoDest {
            if let Some(Operand::Reg(Rv::Virt(v))) = self.operands.last() {
                out.push(*v);
            }
        }
        out
    }

    /// Virtual registers this instruction uses. For RMW forms the
    /// destination is a use as well; memory bases and indices are always
    /// uses.
    pub fn uses(&self) -> Vec<Vreg> {
        let mut out = self.implicit_uses.clone();
        let role = dest_role(self.op);
        let last = self.operands.len().wrapping_sub(1);
        for (i, operand) in self.operands.iter().enumerate() {
            match operand {
                Operand::Reg(Rv::Virt(v)) => {
                    let is_pure_def = role == DestRole::Def && i == last;
                    if !is_pure_def {
                        out.push(*v);
                    }
                }
                Operand::Membase { base, .. } => {
                    if let Rv::Virt(v) = base {
                        out.push(*v);
                    }
                }
                Operand::Memindex { base, index, .. } => {
                    if let Rv::Virt(v) = base {
                        out.push(*v);
                    }
                    if let Rv::Virt(v) = index {
                        out.push(*v);
                    }
                }
                _ => {}
            }
        }
        out
    }
}
