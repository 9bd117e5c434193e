//! x86-64 instruction encoding
//!
//! Serializes machine instructions (all operands physical by now) into
//! the emission buffer: legacy prefixes, REX, ModRM/SIB, displacements,
//! immediates. Control-flow instructions report their displacement
//! fields so the emitter can back-patch and relocate them.

use crate::isel::{MachInsn, MachOp, MachReg, Operand, Width};
use crate::support::Buffer;
use crate::unit::BlockId;

/// What the emitter must resolve after encoding one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeNote {
    None,
    /// rel32 at `disp_offset` targeting `target`
    Branch { target: BlockId, disp_offset: usize },
    /// rel32 call at `disp_offset` to absolute `target`
    CallRel { target: u64, disp_offset: usize },
    /// Patchable inline-cache immediates (8-byte aligned)
    IcSite {
        class_id_offset: usize,
        target_offset: usize,
    },
}

pub struct Encoder<'a> {
    pub buf: &'a mut Buffer,
}

fn phys(operand: &Operand) -> MachReg {
    match operand {
        Operand::Reg(rv) => rv.phys(),
        other => panic!("register operand expected, found {other:?}"),
    }
}

fn imm(operand: &Operand) -> i64 {
    match operand {
        Operand::Imm(v) => *v,
        other => panic!("immediate operand expected, found {other:?}"),
    }
}

impl<'a> Encoder<'a> {
    pub fn new(buf: &'a mut Buffer) -> Encoder<'a> {
        Encoder { buf }
    }

    fn rex(&mut self, wide: bool, reg: u8, index: u8, base: u8) {
        let rex = 0x40u8
            | ((wide as u8) << 3)
            | (((reg >> 3) & 1) << 2)
            | (((index >> 3) & 1) << 1)
            | ((base >> 3) & 1);
        if rex != 0x40 {
            self.buf.emit_u8(rex);
        }
    }

    /// REX for byte-register access: also required to reach sil/dil.
    fn rex_byte(&mut self, reg: u8, base: u8) {
        let rex = 0x40u8 | (((reg >> 3) & 1) << 2) | ((base >> 3) & 1);
        if rex != 0x40 || (4..=7).contains(&(reg & 7)) || (4..=7).contains(&(base & 7)) {
            self.buf.emit_u8(rex);
        }
    }

    fn modrm(&mut self, mode: u8, reg: u8, rm: u8) {
        self.buf.emit_u8((mode << 6) | ((reg & 7) << 3) | (rm & 7));
    }

    /// ModRM (+SIB) for a `[base + disp]` effective address.
    fn mem_membase(&mut self, reg: u8, base: u8, disp: i32) {
        let base_low = base & 7;
        let need_sib = base_low == 4;
        let mode = if disp == 0 && base_low != 5 {
            0
        } else if (-128..=127).contains(&disp) {
            1
        } else {
            2
        };
        self.modrm(mode, reg, if need_sib { 4 } else { base });
        if need_sib {
            // scale 0, no index
            self.buf.emit_u8(0x24 | (base_low & 7));
        }
        match mode {
            1 => self.buf.emit_u8(disp as i8 as u8),
            2 => self.buf.emit_u32(disp as u32),
            _ => {}
        }
    }

    /// ModRM+SIB for `[base + index << shift]`.
    fn mem_memindex(&mut self, reg: u8, base: u8, index: u8, shift: u8) {
        debug_assert_ne!(index & 7, 4, "rsp cannot index");
        let base_low = base & 7;
        let mode = if base_low == 5 { 1 } else { 0 };
        self.modrm(mode, reg, 4);
        self.buf
            .emit_u8((shift << 6) | ((index & 7) << 3) | base_low);
        if mode == 1 {
            self.buf.emit_u8(0);
        }
    }

    /// Memory-form instruction: prefix/REX/opcode against a membase or
    /// memindex operand with `reg` in the ModRM reg field.
    fn mem_op(&mut self, opcode: &[u8], wide: bool, reg: MachReg, mem: &Operand) {
        match mem {
            Operand::Membase { base, disp } => {
                let base = base.phys();
                self.rex(wide, reg.encoding(), 0, base.encoding());
                self.buf.emit_bytes(opcode);
                self.mem_membase(reg.encoding(), base.encoding(), *disp);
            }
            Operand::Memindex { base, index, shift } => {
                let base = base.phys();
                let index = index.phys();
                self.rex(wide, reg.encoding(), index.encoding(), base.encoding());
                self.buf.emit_bytes(opcode);
                self.mem_memindex(reg.encoding(), base.encoding(), index.encoding(), *shift);
            }
            other => panic!("memory operand expected, found {other:?}"),
        }
    }

    fn reg_reg(&mut self, opcode: &[u8], wide: bool, reg: MachReg, rm: MachReg) {
        self.rex(wide, reg.encoding(), 0, rm.encoding());
        self.buf.emit_bytes(opcode);
        self.modrm(3, reg.encoding(), rm.encoding());
    }

    /// `F3`/`F2`-prefixed SSE op between registers.
    fn sse_reg_reg(&mut self, prefix: Option<u8>, opcode: &[u8], wide: bool, reg: MachReg, rm: MachReg) {
        if let Some(p) = prefix {
            self.buf.emit_u8(p);
        }
        self.reg_reg(opcode, wide, reg, rm);
    }

    fn sse_mem(&mut self, prefix: u8, opcode: &[u8], reg: MachReg, mem: &Operand) {
        self.buf.emit_u8(prefix);
        self.mem_op(opcode, false, reg, mem);
    }

    fn fp_prefix(width: Width) -> u8 {
        match width {
            Width::W32 => 0xF3,
            Width::W64 => 0xF2,
        }
    }

    /// Encode one instruction at the current buffer position.
    pub fn encode(&mut self, insn: &MachInsn) -> EncodeNote {
        let wide = insn.width == Width::W64;
        let ops = &insn.operands;
        match insn.op {
            MachOp::MovImmReg => {
                let value = imm(&ops[0]);
                let dest = phys(&ops[1]);
                if wide {
                    if i32::try_from(value).is_ok() {
                        self.rex(true, 0, 0, dest.encoding());
                        self.buf.emit_u8(0xC7);
                        self.modrm(3, 0, dest.encoding());
                        self.buf.emit_u32(value as u32);
                    } else {
                        self.rex(true, 0, 0, dest.encoding());
                        self.buf.emit_u8(0xB8 | (dest.encoding() & 7));
                        self.buf.emit_u64(value as u64);
                    }
                } else {
                    self.rex(false, 0, 0, dest.encoding());
                    self.buf.emit_u8(0xB8 | (dest.encoding() & 7));
                    self.buf.emit_u32(value as u32);
                }
                EncodeNote::None
            }
            MachOp::MovImmMembase => {
                let value = imm(&ops[0]);
                self.mem_op(&[0xC7], wide, MachReg::Rax, &ops[1]);
                self.buf.emit_u32(value as u32);
                EncodeNote::None
            }
            MachOp::MovMembaseReg | MachOp::MovMemindexReg => {
                self.mem_op(&[0x8B], wide, phys(&ops[1]), &ops[0]);
                EncodeNote::None
            }
            MachOp::MovRegMembase | MachOp::MovRegMemindex => {
                self.mem_op(&[0x89], wide, phys(&ops[0]), &ops[1]);
                EncodeNote::None
            }
            MachOp::MovByteRegMembase | MachOp::MovByteRegMemindex => {
                let src = phys(&ops[0]);
                // 88 /r needs byte-register REX handling
                match &ops[1] {
                    Operand::Membase { base, disp } => {
                        let base = base.phys();
                        self.rex_byte(src.encoding(), base.encoding());
                        self.buf.emit_u8(0x88);
                        self.mem_membase(src.encoding(), base.encoding(), *disp);
                    }
                    Operand::Memindex { base, index, shift } => {
                        let base = base.phys();
                        let index = index.phys();
                        let rex = 0x40u8
                            | (((src.encoding() >> 3) & 1) << 2)
                            | (((index.encoding() >> 3) & 1) << 1)
                            | ((base.encoding() >> 3) & 1);
                        if rex != 0x40 || (4..=7).contains(&(src.encoding() & 7)) {
                            self.buf.emit_u8(rex);
                        }
                        self.buf.emit_u8(0x88);
                        self.mem_memindex(src.encoding(), base.encoding(), index.encoding(), *shift);
                    }
                    other => panic!("memory operand expected, found {other:?}"),
                }
                EncodeNote::None
            }
            MachOp::MovWordRegMembase | MachOp::MovWordRegMemindex => {
                self.buf.emit_u8(0x66);
                self.mem_op(&[0x89], false, phys(&ops[0]), &ops[1]);
                EncodeNote::None
            }
            MachOp::MovRegReg => {
                self.reg_reg(&[0x8B], wide, phys(&ops[1]), phys(&ops[0]));
                EncodeNote::None
            }
            MachOp::MovsxdRegReg => {
                self.reg_reg(&[0x63], true, phys(&ops[1]), phys(&ops[0]));
                EncodeNote::None
            }
            MachOp::MovsxByteRegReg => {
                let src = phys(&ops[0]);
                let dest = phys(&ops[1]);
                self.rex_byte(dest.encoding(), src.encoding());
                self.buf.emit_bytes(&[0x0F, 0xBE]);
                self.modrm(3, dest.encoding(), src.encoding());
                EncodeNote::None
            }
            MachOp::MovzxByteRegReg => {
                let src = phys(&ops[0]);
                let dest = phys(&ops[1]);
                self.rex_byte(dest.encoding(), src.encoding());
                self.buf.emit_bytes(&[0x0F, 0xB6]);
                self.modrm(3, dest.encoding(), src.encoding());
                EncodeNote::None
            }
            MachOp::MovsxWordRegReg => {
                self.reg_reg(&[0x0F, 0xBF], false, phys(&ops[1]), phys(&ops[0]));
                EncodeNote::None
            }
            MachOp::MovzxWordRegReg => {
                self.reg_reg(&[0x0F, 0xB7], false, phys(&ops[1]), phys(&ops[0]));
                EncodeNote::None
            }
            MachOp::MovsxByteMembaseReg | MachOp::MovsxByteMemindexReg => {
                self.mem_op(&[0x0F, 0xBE], false, phys(&ops[1]), &ops[0]);
                EncodeNote::None
            }
            MachOp::MovzxByteMembaseReg | MachOp::MovzxByteMemindexReg => {
                self.mem_op(&[0x0F, 0xB6], false, phys(&ops[1]), &ops[0]);
                EncodeNote::None
            }
            MachOp::MovsxWordMembaseReg | MachOp::MovsxWordMemindexReg => {
                self.mem_op(&[0x0F, 0xBF], false, phys(&ops[1]), &ops[0]);
                EncodeNote::None
            }
            MachOp::MovzxWordMembaseReg | MachOp::MovzxWordMemindexReg => {
                self.mem_op(&[0x0F, 0xB7], false, phys(&ops[1]), &ops[0]);
                EncodeNote::None
            }
            MachOp::AddRegReg => {
                self.reg_reg(&[0x01], wide, phys(&ops[0]), phys(&ops[1]));
                EncodeNote::None
            }
            MachOp::SubRegReg => {
                self.reg_reg(&[0x29], wide, phys(&ops[0]), phys(&ops[1]));
                EncodeNote::None
            }
            MachOp::AndRegReg => {
                self.reg_reg(&[0x21], wide, phys(&ops[0]), phys(&ops[1]));
                EncodeNote::None
            }
            MachOp::OrRegReg => {
                self.reg_reg(&[0x09], wide, phys(&ops[0]), phys(&ops[1]));
                EncodeNote::None
            }
            MachOp::XorRegReg => {
                self.reg_reg(&[0x31], wide, phys(&ops[0]), phys(&ops[1]));
                EncodeNote::None
            }
            MachOp::ImulRegReg => {
                self.reg_reg(&[0x0F, 0xAF], wide, phys(&ops[1]), phys(&ops[0]));
                EncodeNote::None
            }
            MachOp::AddImmReg | MachOp::SubImmReg => {
                let value = imm(&ops[0]);
                let dest = phys(&ops[1]);
                let ext = if insn.op == MachOp::AddImmReg { 0 } else { 5 };
                self.rex(wide, 0, 0, dest.encoding());
                self.buf.emit_u8(0x81);
                self.modrm(3, ext, dest.encoding());
                self.buf.emit_u32(value as u32);
                EncodeNote::None
            }
            MachOp::NegReg | MachOp::NotReg => {
                let dest = phys(&ops[0]);
                let ext = if insn.op == MachOp::NegReg { 3 } else { 2 };
                self.rex(wide, 0, 0, dest.encoding());
                self.buf.emit_u8(0xF7);
                self.modrm(3, ext, dest.encoding());
                EncodeNote::None
            }
            MachOp::Cdq => {
                if wide {
                    self.buf.emit_u8(0x48);
                }
                self.buf.emit_u8(0x99);
                EncodeNote::None
            }
            MachOp::IdivReg => {
                let divisor = phys(&ops[0]);
                self.rex(wide, 0, 0, divisor.encoding());
                self.buf.emit_u8(0xF7);
                self.modrm(3, 7, divisor.encoding());
                EncodeNote::None
            }
            MachOp::ShlRegReg | MachOp::SarRegReg | MachOp::ShrRegReg => {
                // Count is in cl by construction
                debug_assert_eq!(phys(&ops[0]), MachReg::Rcx);
                let dest = phys(&ops[1]);
                let ext = match insn.op {
                    MachOp::ShlRegReg => 4,
                    MachOp::ShrRegReg => 5,
                    _ => 7,
                };
                self.rex(wide, 0, 0, dest.encoding());
                self.buf.emit_u8(0xD3);
                self.modrm(3, ext, dest.encoding());
                EncodeNote::None
            }
            MachOp::CmpRegReg => {
                self.reg_reg(&[0x39], wide, phys(&ops[1]), phys(&ops[0]));
                EncodeNote::None
            }
            MachOp::CmpImmReg => {
                let value = imm(&ops[0]);
                let dest = phys(&ops[1]);
                self.rex(wide, 0, 0, dest.encoding());
                self.buf.emit_u8(0x81);
                self.modrm(3, 7, dest.encoding());
                self.buf.emit_u32(value as u32);
                EncodeNote::None
            }
            MachOp::TestRegReg => {
                self.reg_reg(&[0x85], wide, phys(&ops[1]), phys(&ops[0]));
                EncodeNote::None
            }
            MachOp::Setcc(cond) => {
                let dest = phys(&ops[0]);
                self.rex_byte(0, dest.encoding());
                self.buf.emit_bytes(&[0x0F, 0x90 | cond.encoding()]);
                self.modrm(3, 0, dest.encoding());
                EncodeNote::None
            }
            MachOp::Jcc(cond) => {
                self.buf.emit_bytes(&[0x0F, 0x80 | cond.encoding()]);
                let disp_offset = self.buf.len();
                self.buf.emit_u32(0);
                EncodeNote::Branch {
                    target: insn.branch_target().expect("jcc targets a block"),
                    disp_offset,
                }
            }
            MachOp::Jmp => {
                self.buf.emit_u8(0xE9);
                let disp_offset = self.buf.len();
                self.buf.emit_u32(0);
                EncodeNote::Branch {
                    target: insn.branch_target().expect("jmp targets a block"),
                    disp_offset,
                }
            }
            MachOp::CallRel => {
                let target = match ops[0] {
                    Operand::Rel(addr) => addr,
                    ref other => panic!("call target expected, found {other:?}"),
                };
                self.buf.emit_u8(0xE8);
                let disp_offset = self.buf.len();
                self.buf.emit_u32(0);
                EncodeNote::CallRel {
                    target,
                    disp_offset,
                }
            }
            MachOp::CallReg => {
                let target = phys(&ops[0]);
                self.rex(false, 0, 0, target.encoding());
                self.buf.emit_u8(0xFF);
                self.modrm(3, 2, target.encoding());
                EncodeNote::None
            }
            MachOp::IcCall => {
                // movabs rax, class_id / movabs r11, target / call r11,
                // with both 8-byte immediates aligned for atomic patching.
                let class_id = imm(&ops[0]);
                let target = match ops[1] {
                    Operand::Rel(addr) => addr,
                    ref other => panic!("ic target expected, found {other:?}"),
                };
                while (self.buf.len() + 2) % 8 != 0 {
                    self.buf.emit_u8(0x90);
                }
                self.buf.emit_bytes(&[0x48, 0xB8]);
                let class_id_offset = self.buf.len();
                self.buf.emit_u64(class_id as u64);
                while (self.buf.len() + 2) % 8 != 0 {
                    self.buf.emit_u8(0x90);
                }
                self.buf.emit_bytes(&[0x49, 0xBB]);
                let target_offset = self.buf.len();
                self.buf.emit_u64(target);
                self.buf.emit_bytes(&[0x41, 0xFF, 0xD3]);
                EncodeNote::IcSite {
                    class_id_offset,
                    target_offset,
                }
            }
            MachOp::Ret => {
                self.buf.emit_u8(0xC3);
                EncodeNote::None
            }
            MachOp::PushReg => {
                let reg = phys(&ops[0]);
                self.rex(false, 0, 0, reg.encoding());
                self.buf.emit_u8(0x50 | (reg.encoding() & 7));
                EncodeNote::None
            }
            MachOp::PopReg => {
                let reg = phys(&ops[0]);
                self.rex(false, 0, 0, reg.encoding());
                self.buf.emit_u8(0x58 | (reg.encoding() & 7));
                EncodeNote::None
            }
            MachOp::PushImm => {
                self.buf.emit_u8(0x68);
                self.buf.emit_u32(imm(&ops[0]) as u32);
                EncodeNote::None
            }
            MachOp::TrapIf(cond) => {
                // Skip the ud2 when the trap condition does not hold
                self.buf
                    .emit_bytes(&[0x70 | cond.negate().encoding(), 0x02, 0x0F, 0x0B]);
                EncodeNote::None
            }
            MachOp::MovfMembaseReg | MachOp::MovfMemindexReg => {
                self.sse_mem(Self::fp_prefix(insn.width), &[0x0F, 0x10], phys(&ops[1]), &ops[0]);
                EncodeNote::None
            }
            MachOp::MovfRegMembase | MachOp::MovfRegMemindex => {
                self.sse_mem(Self::fp_prefix(insn.width), &[0x0F, 0x11], phys(&ops[0]), &ops[1]);
                EncodeNote::None
            }
            MachOp::MovfRegReg => {
                self.sse_reg_reg(
                    Some(Self::fp_prefix(insn.width)),
                    &[0x0F, 0x10],
                    false,
                    phys(&ops[1]),
                    phys(&ops[0]),
                );
                EncodeNote::None
            }
            MachOp::FaddRegReg | MachOp::FsubRegReg | MachOp::FmulRegReg | MachOp::FdivRegReg => {
                let opcode = match insn.op {
                    MachOp::FaddRegReg => 0x58,
                    MachOp::FmulRegReg => 0x59,
                    MachOp::FsubRegReg => 0x5C,
                    _ => 0x5E,
                };
                self.sse_reg_reg(
                    Some(Self::fp_prefix(insn.width)),
                    &[0x0F, opcode],
                    false,
                    phys(&ops[1]),
                    phys(&ops[0]),
                );
                EncodeNote::None
            }
            MachOp::UcomifRegReg => {
                if insn.width == Width::W64 {
                    self.buf.emit_u8(0x66);
                }
                self.reg_reg(&[0x0F, 0x2E], false, phys(&ops[0]), phys(&ops[1]));
                EncodeNote::None
            }
            MachOp::XorpsRegReg => {
                self.reg_reg(&[0x0F, 0x57], false, phys(&ops[1]), phys(&ops[0]));
                EncodeNote::None
            }
            MachOp::MovqGprXmm => {
                self.buf.emit_u8(0x66);
                self.reg_reg(&[0x0F, 0x6E], wide, phys(&ops[1]), phys(&ops[0]));
                EncodeNote::None
            }
            MachOp::Cvtsi2ss | MachOp::Cvtsi2sd => {
                let prefix = if insn.op == MachOp::Cvtsi2ss { 0xF3 } else { 0xF2 };
                self.buf.emit_u8(prefix);
                self.reg_reg(&[0x0F, 0x2A], wide, phys(&ops[1]), phys(&ops[0]));
                EncodeNote::None
            }
            MachOp::Cvttss2si | MachOp::Cvttsd2si => {
                let prefix = if insn.op == MachOp::Cvttss2si { 0xF3 } else { 0xF2 };
                self.buf.emit_u8(prefix);
                self.reg_reg(&[0x0F, 0x2C], wide, phys(&ops[1]), phys(&ops[0]));
                EncodeNote::None
            }
            MachOp::Cvtss2sd | MachOp::Cvtsd2ss => {
                let prefix = if insn.op == MachOp::Cvtss2sd { 0xF3 } else { 0xF2 };
                self.buf.emit_u8(prefix);
                self.reg_reg(&[0x0F, 0x5A], false, phys(&ops[1]), phys(&ops[0]));
                EncodeNote::None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_one(insn: MachInsn) -> Vec<u8> {
        let mut buf = Buffer::new();
        Encoder::new(&mut buf).encode(&insn);
        buf.as_slice().to_vec()
    }

    fn preg(reg: MachReg) -> Operand {
        Operand::Reg(Rv::Phys(reg))
    }

    fn membase(base: MachReg, disp: i32) -> Operand {
        Operand::Membase {
            base: Rv::Phys(base),
            disp,
        }
    }

    #[test]
    fn test_mov_imm32_reg() {
        // mov eax, 42
        let insn = MachInsn::new(
            MachOp::MovImmReg,
            Width::W32,
            vec![Operand::Imm(42), preg(MachReg::Rax)],
        );
        assert_eq!(encode_one(insn), vec![0xB8, 0x2A, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_mov_imm64_reg_uses_movabs() {
        let insn = MachInsn::new(
            MachOp::MovImmReg,
            Width::W64,
            vec![Operand::Imm(0x1122_3344_5566_7788), preg(MachReg::Rdi)],
        );
        assert_eq!(
            encode_one(insn),
            vec![0x48, 0xBF, 0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11]
        );
    }

    #[test]
    fn test_load_from_rbp_disp8() {
        // mov eax, [rbp - 8]
        let insn = MachInsn::new(
            MachOp::MovMembaseReg,
            Width::W32,
            vec![membase(MachReg::Rbp, -8), preg(MachReg::Rax)],
        );
        assert_eq!(encode_one(insn), vec![0x8B, 0x45, 0xF8]);
    }

    #[test]
    fn test_store_to_rbp_disp8() {
        // mov [rbp - 16], edi
        let insn = MachInsn::new(
            MachOp::MovRegMembase,
            Width::W32,
            vec![preg(MachReg::Rdi), membase(MachReg::Rbp, -16)],
        );
        assert_eq!(encode_one(insn), vec![0x89, 0x7D, 0xF0]);
    }

    #[test]
    fn test_wide_load_gets_rex_w() {
        // mov rax, [rbp - 8]
        let insn = MachInsn::new(
            MachOp::MovMembaseReg,
            Width::W64,
            vec![membase(MachReg::Rbp, -8), preg(MachReg::Rax)],
        );
        assert_eq!(encode_one(insn), vec![0x48, 0x8B, 0x45, 0xF8]);
    }

    #[test]
    fn test_extended_reg_gets_rex_b() {
        // mov r10d, [rbp - 8]
        let insn = MachInsn::new(
            MachOp::MovMembaseReg,
            Width::W32,
            vec![membase(MachReg::Rbp, -8), preg(MachReg::R10)],
        );
        assert_eq!(encode_one(insn), vec![0x44, 0x8B, 0x55, 0xF8]);
    }

    #[test]
    fn test_rsp_base_needs_sib() {
        // mov [rsp + 8], eax
        let insn = MachInsn::new(
            MachOp::MovRegMembase,
            Width::W32,
            vec![preg(MachReg::Rax), membase(MachReg::Rsp, 8)],
        );
        assert_eq!(encode_one(insn), vec![0x89, 0x44, 0x24, 0x08]);
    }

    #[test]
    fn test_add_reg_reg() {
        // add eax, ecx  (ecx -> eax)
        let insn = MachInsn::new(
            MachOp::AddRegReg,
            Width::W32,
            vec![preg(MachReg::Rcx), preg(MachReg::Rax)],
        );
        assert_eq!(encode_one(insn), vec![0x01, 0xC8]);
    }

    #[test]
    fn test_cmp_reg_reg() {
        // flags from eax - ecx: cmp eax, ecx
        let insn = MachInsn::new(
            MachOp::CmpRegReg,
            Width::W32,
            vec![preg(MachReg::Rax), preg(MachReg::Rcx)],
        );
        assert_eq!(encode_one(insn), vec![0x39, 0xC8]);
    }

    #[test]
    fn test_memindex_scaled() {
        // mov eax, [rcx + rdx*4]
        let insn = MachInsn::new(
            MachOp::MovMemindexReg,
            Width::W32,
            vec![
                Operand::Memindex {
                    base: Rv::Phys(MachReg::Rcx),
                    index: Rv::Phys(MachReg::Rdx),
                    shift: 2,
                },
                preg(MachReg::Rax),
            ],
        );
        assert_eq!(encode_one(insn), vec![0x8B, 0x04, 0x91]);
    }

    #[test]
    fn test_jcc_emits_placeholder_disp() {
        let insn = MachInsn::new(
            MachOp::Jcc(Cond::E),
            Width::W32,
            vec![Operand::Branch(BlockId(2))],
        );
        let mut buf = Buffer::new();
        let note = Encoder::new(&mut buf).encode(&insn);
        assert_eq!(buf.as_slice(), &[0x0F, 0x84, 0, 0, 0, 0]);
        assert_eq!(
            note,
            EncodeNote::Branch {
                target: BlockId(2),
                disp_offset: 2
            }
        );
    }

    #[test]
    fn test_call_rel_reports_site() {
        let insn = MachInsn::new(MachOp::CallRel, Width::W64, vec![Operand::Rel(0x4000)]);
        let mut buf = Buffer::new();
        let note = Encoder::new(&mut buf).encode(&insn);
        assert_eq!(buf.as_slice(), &[0xE8, 0, 0, 0, 0]);
        assert_eq!(
            note,
            EncodeNote::CallRel {
                target: 0x4000,
                disp_offset: 1
            }
        );
    }

    #[test]
    fn test_trap_if_skips_over_ud2() {
        let insn = MachInsn::new(MachOp::TrapIf(Cond::Ae), Width::W32, vec![]);
        // jb +2; ud2
        assert_eq!(encode_one(insn), vec![0x72, 0x02, 0x0F, 0x0B]);
    }

    #[test]
    fn test_setcc_on_sil_needs_rex() {
        let insn = MachInsn::new(MachOp::Setcc(Cond::L), Width::W32, vec![preg(MachReg::Rsi)]);
        assert_eq!(encode_one(insn), vec![0x40, 0x0F, 0x9C, 0xC6]);
    }

    #[test]
    fn test_idiv_and_cqo() {
        let cqo = MachInsn::new(MachOp::Cdq, Width::W64, vec![]);
        assert_eq!(encode_one(cqo), vec![0x48, 0x99]);

        let idiv = MachInsn::new(MachOp::IdivReg, Width::W32, vec![preg(MachReg::Rcx)]);
        assert_eq!(encode_one(idiv), vec![0xF7, 0xF9]);
    }

    #[test]
    fn test_movsd_load() {
        // movsd xmm0, [rbp - 8]
        let insn = MachInsn::new(
            MachOp::MovfMembaseReg,
            Width::W64,
            vec![membase(MachReg::Rbp, -8), preg(MachReg::Xmm0)],
        );
        assert_eq!(encode_one(insn), vec![0xF2, 0x0F, 0x10, 0x45, 0xF8]);
    }

    #[test]
    fn test_addss_reg_reg() {
        // addss xmm0, xmm1
        let insn = MachInsn::new(
            MachOp::FaddRegReg,
            Width::W32,
            vec![preg(MachReg::Xmm1), preg(MachReg::Xmm0)],
        );
        assert_eq!(encode_one(insn), vec![0xF3, 0x0F, 0x58, 0xC1]);
    }

    #[test]
    fn test_ic_site_immediates_are_aligned() {
        let insn = MachInsn::new(
            MachOp::IcCall,
            Width::W64,
            vec![Operand::Imm(7), Operand::Rel(0x5000)],
        );
        let mut buf = Buffer::new();
        buf.emit_u8(0x90); // start from an odd offset
        let note = Encoder::new(&mut buf).encode(&insn);
        match note {
            EncodeNote::IcSite {
                class_id_offset,
                target_offset,
            } => {
                assert_eq!(class_id_offset % 8, 0);
                assert_eq!(target_offset % 8, 0);
            }
            other => panic!("unexpected note {other:?}"),
        }
    }

    #[test]
    fn test_ret_and_push_pop() {
        assert_eq!(
            encode_one(MachInsn::new(MachOp::Ret, Width::W64, vec![])),
            vec![0xC3]
        );
        assert_eq!(
            encode_one(MachInsn::new(
                MachOp::PushReg,
                Width::W64,
                vec![preg(MachReg::Rbp)]
            )),
            vec![0x55]
        );
        assert_eq!(
            encode_one(MachInsn::new(
                MachOp::PopReg,
                Width::W64,
                vec![preg(MachReg::Rbp)]
            )),
            vec![0x5D]
        );
    }
}
