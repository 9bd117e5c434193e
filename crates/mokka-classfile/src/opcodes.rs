//! JVM bytecode opcode table
//!
//! Instruction sizing (including the alignment-dependent `tableswitch` and
//! `lookupswitch` forms), branch predicates, and branch-target extraction.
//! The CFG builder walks bytecode exclusively through this module; getting
//! the variable-length sizing rule wrong would desynchronize block
//! boundaries from instruction boundaries.

use crate::bytes::{read_s16, read_s32, read_u8, TruncatedInput};

pub const OPC_NOP: u8 = 0x00;
pub const OPC_ACONST_NULL: u8 = 0x01;
pub const OPC_ICONST_M1: u8 = 0x02;
pub const OPC_ICONST_0: u8 = 0x03;
pub const OPC_ICONST_1: u8 = 0x04;
pub const OPC_ICONST_2: u8 = 0x05;
pub const OPC_ICONST_3: u8 = 0x06;
pub const OPC_ICONST_4: u8 = 0x07;
pub const OPC_ICONST_5: u8 = 0x08;
pub const OPC_LCONST_0: u8 = 0x09;
pub const OPC_LCONST_1: u8 = 0x0a;
pub const OPC_FCONST_0: u8 = 0x0b;
pub const OPC_FCONST_1: u8 = 0x0c;
pub const OPC_FCONST_2: u8 = 0x0d;
pub const OPC_DCONST_0: u8 = 0x0e;
pub const OPC_DCONST_1: u8 = 0x0f;
pub const OPC_BIPUSH: u8 = 0x10;
pub const OPC_SIPUSH: u8 = 0x11;
pub const OPC_LDC: u8 = 0x12;
pub const OPC_LDC_W: u8 = 0x13;
pub const OPC_LDC2_W: u8 = 0x14;
pub const OPC_ILOAD: u8 = 0x15;
pub const OPC_LLOAD: u8 = 0x16;
pub const OPC_FLOAD: u8 = 0x17;
pub const OPC_DLOAD: u8 = 0x18;
pub const OPC_ALOAD: u8 = 0x19;
pub const OPC_ILOAD_0: u8 = 0x1a;
pub const OPC_ILOAD_1: u8 = 0x1b;
pub const OPC_ILOAD_2: u8 = 0x1c;
pub const OPC_ILOAD_3: u8 = 0x1d;
pub const OPC_LLOAD_0: u8 = 0x1e;
pub const OPC_LLOAD_1: u8 = 0x1f;
pub const OPC_LLOAD_2: u8 = 0x20;
pub const OPC_LLOAD_3: u8 = 0x21;
pub const OPC_FLOAD_0: u8 = 0x22;
pub const OPC_FLOAD_1: u8 = 0x23;
pub const OPC_FLOAD_2: u8 = 0x24;
pub const OPC_FLOAD_3: u8 = 0x25;
pub const OPC_DLOAD_0: u8 = 0x26;
pub const OPC_DLOAD_1: u8 = 0x27;
pub const OPC_DLOAD_2: u8 = 0x28;
pub const OPC_DLOAD_3: u8 = 0x29;
pub const OPC_ALOAD_0: u8 = 0x2a;
pub const OPC_ALOAD_1: u8 = 0x2b;
pub const OPC_ALOAD_2: u8 = 0x2c;
pub const OPC_ALOAD_3: u8 = 0x2d;
pub const OPC_IALOAD: u8 = 0x2e;
pub const OPC_LALOAD: u8 = 0x2f;
pub const OPC_FALOAD: u8 = 0x30;
pub const OPC_DALOAD: u8 = 0x31;
pub const OPC_AALOAD: u8 = 0x32;
pub const OPC_BALOAD: u8 = 0x33;
pub const OPC_CALOAD: u8 = 0x34;
pub const OPC_SALOAD: u8 = 0x35;
pub const OPC_ISTORE: u8 = 0x36;
pub const OPC_LSTORE: u8 = 0x37;
pub const OPC_FSTORE: u8 = 0x38;
pub const OPC_DSTORE: u8 = 0x39;
pub const OPC_ASTORE: u8 = 0x3a;
pub const OPC_ISTORE_0: u8 = 0x3b;
pub const OPC_ISTORE_1: u8 = 0x3c;
pub const OPC_ISTORE_2: u8 = 0x3d;
pub const OPC_ISTORE_3: u8 = 0x3e;
pub const OPC_LSTORE_0: u8 = 0x3f;
pub const OPC_LSTORE_1: u8 = 0x40;
pub const OPC_LSTORE_2: u8 = 0x41;
pub const OPC_LSTORE_3: u8 = 0x42;
pub const OPC_FSTORE_0: u8 = 0x43;
pub const OPC_FSTORE_1: u8 = 0x44;
pub const OPC_FSTORE_2: u8 = 0x45;
pub const OPC_FSTORE_3: u8 = 0x46;
pub const OPC_DSTORE_0: u8 = 0x47;
pub const OPC_DSTORE_1: u8 = 0x48;
pub const OPC_DSTORE_2: u8 = 0x49;
pub const OPC_DSTORE_3: u8 = 0x4a;
pub const OPC_ASTORE_0: u8 = 0x4b;
pub const OPC_ASTORE_1: u8 = 0x4c;
pub const OPC_ASTORE_2: u8 = 0x4d;
pub const OPC_ASTORE_3: u8 = 0x4e;
pub const OPC_IASTORE: u8 = 0x4f;
pub const OPC_LASTORE: u8 = 0x50;
pub const OPC_FASTORE: u8 = 0x51;
pub const OPC_DASTORE: u8 = 0x52;
pub const OPC_AASTORE: u8 = 0x53;
pub const OPC_BASTORE: u8 = 0x54;
pub const OPC_CASTORE: u8 = 0x55;
pub const OPC_SASTORE: u8 = 0x56;
pub const OPC_POP: u8 = 0x57;
pub const OPC_POP2: u8 = 0x58;
pub const OPC_DUP: u8 = 0x59;
pub const OPC_DUP_X1: u8 = 0x5a;
pub const OPC_DUP_X2: u8 = 0x5b;
pub const OPC_DUP2: u8 = 0x5c;
pub const OPC_DUP2_X1: u8 = 0x5d;
pub const OPC_DUP2_X2: u8 = 0x5e;
pub const OPC_SWAP: u8 = 0x5f;
pub const OPC_IADD: u8 = 0x60;
pub const OPC_LADD: u8 = 0x61;
pub const OPC_FADD: u8 = 0x62;
pub const OPC_DADD: u8 = 0x63;
pub const OPC_ISUB: u8 = 0x64;
pub const OPC_LSUB: u8 = 0x65;
pub const OPC_FSUB: u8 = 0x66;
pub const OPC_DSUB: u8 = 0x67;
pub const OPC_IMUL: u8 = 0x68;
pub const OPC_LMUL: u8 = 0x69;
pub const OPC_FMUL: u8 = 0x6a;
pub const OPC_DMUL: u8 = 0x6b;
pub const OPC_IDIV: u8 = 0x6c;
pub const OPC_LDIV: u8 = 0x6d;
pub const OPC_FDIV: u8 = 0x6e;
pub const OPC_DDIV: u8 = 0x6f;
pub const OPC_IREM: u8 = 0x70;
pub const OPC_LREM: u8 = 0x71;
pub const OPC_FREM: u8 = 0x72;
pub const OPC_DREM: u8 = 0x73;
pub const OPC_INEG: u8 = 0x74;
pub const OPC_LNEG: u8 = 0x75;
pub const OPC_FNEG: u8 = 0x76;
pub const OPC_DNEG: u8 = 0x77;
pub const OPC_ISHL: u8 = 0x78;
pub const OPC_LSHL: u8 = 0x79;
pub const OPC_ISHR: u8 = 0x7a;
pub const OPC_LSHR: u8 = 0x7b;
pub const OPC_IUSHR: u8 = 0x7c;
pub const OPC_LUSHR: u8 = 0x7d;
pub const OPC_IAND: u8 = 0x7e;
pub const OPC_LAND: u8 = 0x7f;
pub const OPC_IOR: u8 = 0x80;
pub const OPC_LOR: u8 = 0x81;
pub const OPC_IXOR: u8 = 0x82;
pub const OPC_LXOR: u8 = 0x83;
pub const OPC_IINC: u8 = 0x84;
pub const OPC_I2L: u8 = 0x85;
pub const OPC_I2F: u8 = 0x86;
pub const OPC_I2D: u8 = 0x87;
pub const OPC_L2I: u8 = 0x88;
pub const OPC_L2F: u8 = 0x89;
pub const OPC_L2D: u8 = 0x8a;
pub const OPC_F2I: u8 = 0x8b;
pub const OPC_F2L: u8 = 0x8c;
pub const OPC_F2D: u8 = 0x8d;
pub const OPC_D2I: u8 = 0x8e;
pub const OPC_D2L: u8 = 0x8f;
pub const OPC_D2F: u8 = 0x90;
pub const OPC_I2B: u8 = 0x91;
pub const OPC_I2C: u8 = 0x92;
pub const OPC_I2S: u8 = 0x93;
pub const OPC_LCMP: u8 = 0x94;
pub const OPC_FCMPL: u8 = 0x95;
pub const OPC_FCMPG: u8 = 0x96;
pub const OPC_DCMPL: u8 = 0x97;
pub const OPC_DCMPG: u8 = 0x98;
pub const OPC_IFEQ: u8 = 0x99;
pub const OPC_IFNE: u8 = 0x9a;
pub const OPC_IFLT: u8 = 0x9b;
pub const OPC_IFGE: u8 = 0x9c;
pub const OPC_IFGT: u8 = 0x9d;
pub const OPC_IFLE: u8 = 0x9e;
pub const OPC_IF_ICMPEQ: u8 = 0x9f;
pub const OPC_IF_ICMPNE: u8 = 0xa0;
pub const OPC_IF_ICMPLT: u8 = 0xa1;
pub const OPC_IF_ICMPGE: u8 = 0xa2;
pub const OPC_IF_ICMPGT: u8 = 0xa3;
pub const OPC_IF_ICMPLE: u8 = 0xa4;
pub const OPC_IF_ACMPEQ: u8 = 0xa5;
pub const OPC_IF_ACMPNE: u8 = 0xa6;
pub const OPC_GOTO: u8 = 0xa7;
pub const OPC_JSR: u8 = 0xa8;
pub const OPC_RET: u8 = 0xa9;
pub const OPC_TABLESWITCH: u8 = 0xaa;
pub const OPC_LOOKUPSWITCH: u8 = 0xab;
pub const OPC_IRETURN: u8 = 0xac;
pub const OPC_LRETURN: u8 = 0xad;
pub const OPC_FRETURN: u8 = 0xae;
pub const OPC_DRETURN: u8 = 0xaf;
pub const OPC_ARETURN: u8 = 0xb0;
pub const OPC_RETURN: u8 = 0xb1;
pub const OPC_GETSTATIC: u8 = 0xb2;
pub const OPC_PUTSTATIC: u8 = 0xb3;
pub const OPC_GETFIELD: u8 = 0xb4;
pub const OPC_PUTFIELD: u8 = 0xb5;
pub const OPC_INVOKEVIRTUAL: u8 = 0xb6;
pub const OPC_INVOKESPECIAL: u8 = 0xb7;
pub const OPC_INVOKESTATIC: u8 = 0xb8;
pub const OPC_INVOKEINTERFACE: u8 = 0xb9;
pub const OPC_INVOKEDYNAMIC: u8 = 0xba;
pub const OPC_NEW: u8 = 0xbb;
pub const OPC_NEWARRAY: u8 = 0xbc;
pub const OPC_ANEWARRAY: u8 = 0xbd;
pub const OPC_ARRAYLENGTH: u8 = 0xbe;
pub const OPC_ATHROW: u8 = 0xbf;
pub const OPC_CHECKCAST: u8 = 0xc0;
pub const OPC_INSTANCEOF: u8 = 0xc1;
pub const OPC_MONITORENTER: u8 = 0xc2;
pub const OPC_MONITOREXIT: u8 = 0xc3;
pub const OPC_WIDE: u8 = 0xc4;
pub const OPC_MULTIANEWARRAY: u8 = 0xc5;
pub const OPC_IFNULL: u8 = 0xc6;
pub const OPC_IFNONNULL: u8 = 0xc7;
pub const OPC_GOTO_W: u8 = 0xc8;
pub const OPC_JSR_W: u8 = 0xc9;

/// Error while sizing or decoding a bytecode instruction
#[derive(Debug, thiserror::Error)]
pub enum OpcodeError {
    #[error("unknown opcode {opcode:#04x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },
    #[error("truncated instruction at offset {0}")]
    Truncated(usize),
}

impl From<TruncatedInput> for OpcodeError {
    fn from(e: TruncatedInput) -> Self {
        OpcodeError::Truncated(e.0)
    }
}

/// Fixed instruction sizes; 0 marks variable-length or invalid opcodes,
/// which `insn_size` handles separately.
fn fixed_size(opcode: u8) -> usize {
    match opcode {
        OPC_NOP..=OPC_DCONST_1 => 1,
        OPC_BIPUSH | OPC_LDC | OPC_NEWARRAY => 2,
        OPC_SIPUSH | OPC_LDC_W | OPC_LDC2_W => 3,
        OPC_ILOAD..=OPC_ALOAD => 2,
        OPC_ILOAD_0..=OPC_SALOAD => 1,
        OPC_ISTORE..=OPC_ASTORE => 2,
        OPC_ISTORE_0..=OPC_LXOR => 1,
        OPC_IINC => 3,
        OPC_I2L..=OPC_DCMPG => 1,
        OPC_IFEQ..=OPC_JSR => 3,
        OPC_RET => 2,
        OPC_IRETURN..=OPC_RETURN => 1,
        OPC_GETSTATIC..=OPC_INVOKESTATIC => 3,
        OPC_INVOKEINTERFACE | OPC_INVOKEDYNAMIC => 5,
        OPC_NEW | OPC_ANEWARRAY | OPC_CHECKCAST | OPC_INSTANCEOF => 3,
        OPC_ARRAYLENGTH | OPC_ATHROW | OPC_MONITORENTER | OPC_MONITOREXIT => 1,
        OPC_MULTIANEWARRAY => 4,
        OPC_IFNULL | OPC_IFNONNULL => 3,
        OPC_GOTO_W | OPC_JSR_W => 5,
        _ => 0,
    }
}

/// Padding after a switch opcode so its operands are 4-byte aligned within
/// the code array.
fn switch_pad(pc: usize) -> usize {
    (4 - ((pc + 1) % 4)) % 4
}

/// Size in bytes of the instruction starting at `pc`.
///
/// `tableswitch` and `lookupswitch` are sized from their on-wire layout;
/// the `wide` prefix extends its modified instruction.
pub fn insn_size(code: &[u8], pc: usize) -> Result<usize, OpcodeError> {
    let opcode = read_u8(code, pc)?;
    match opcode {
        OPC_TABLESWITCH => {
            let pad = switch_pad(pc);
            let base = pc + 1 + pad;
            let low = read_s32(code, base + 4)?;
            let high = read_s32(code, base + 8)?;
            if high < low {
                return Err(OpcodeError::Truncated(pc));
            }
            let count = (high as i64 - low as i64 + 1) as usize;
            let size = 1 + pad + 12 + count * 4;
            if pc + size > code.len() {
                return Err(OpcodeError::Truncated(pc));
            }
            Ok(size)
        }
        OPC_LOOKUPSWITCH => {
            let pad = switch_pad(pc);
            let base = pc + 1 + pad;
            let npairs = read_s32(code, base + 4)?;
            if npairs < 0 {
                return Err(OpcodeError::Truncated(pc));
            }
            let size = 1 + pad + 8 + npairs as usize * 8;
            if pc + size > code.len() {
                return Err(OpcodeError::Truncated(pc));
            }
            Ok(size)
        }
        OPC_WIDE => {
            let modified = read_u8(code, pc + 1)?;
            let size = match modified {
                OPC_ILOAD..=OPC_ALOAD | OPC_ISTORE..=OPC_ASTORE | OPC_RET => 4,
                OPC_IINC => 6,
                _ => {
                    return Err(OpcodeError::UnknownOpcode {
                        opcode: modified,
                        offset: pc + 1,
                    })
                }
            };
            if pc + size > code.len() {
                return Err(OpcodeError::Truncated(pc));
            }
            Ok(size)
        }
        _ => {
            let size = fixed_size(opcode);
            if size == 0 {
                return Err(OpcodeError::UnknownOpcode { opcode, offset: pc });
            }
            if pc + size > code.len() {
                return Err(OpcodeError::Truncated(pc));
            }
            Ok(size)
        }
    }
}

/// Whether this opcode transfers control to an explicit target
/// (conditional branches, gotos, and both switch forms).
pub fn is_branch(opcode: u8) -> bool {
    matches!(
        opcode,
        OPC_IFEQ..=OPC_JSR
            | OPC_TABLESWITCH
            | OPC_LOOKUPSWITCH
            | OPC_IFNULL
            | OPC_IFNONNULL
            | OPC_GOTO_W
            | OPC_JSR_W
    )
}

pub fn is_cond_branch(opcode: u8) -> bool {
    matches!(opcode, OPC_IFEQ..=OPC_IF_ACMPNE | OPC_IFNULL | OPC_IFNONNULL)
}

pub fn is_goto(opcode: u8) -> bool {
    opcode == OPC_GOTO || opcode == OPC_GOTO_W
}

pub fn is_switch(opcode: u8) -> bool {
    opcode == OPC_TABLESWITCH || opcode == OPC_LOOKUPSWITCH
}

pub fn is_return(opcode: u8) -> bool {
    matches!(opcode, OPC_IRETURN..=OPC_RETURN)
}

pub fn is_athrow(opcode: u8) -> bool {
    opcode == OPC_ATHROW
}

/// Target offset of a simple (non-switch) branch at `pc`. Branch operands
/// carry the absolute bytecode offset of the target.
pub fn branch_target(code: &[u8], pc: usize) -> Result<i64, OpcodeError> {
    let opcode = read_u8(code, pc)?;
    let target = match opcode {
        OPC_GOTO_W | OPC_JSR_W => read_s32(code, pc + 1)? as i64,
        _ => read_s16(code, pc + 1)? as i64,
    };
    Ok(target)
}

/// All target offsets of a `tableswitch`/`lookupswitch` at `pc`, default
/// target first.
pub fn switch_targets(code: &[u8], pc: usize) -> Result<Vec<i64>, OpcodeError> {
    let opcode = read_u8(code, pc)?;
    let base = pc + 1 + switch_pad(pc);
    let mut targets = Vec::new();
    match opcode {
        OPC_TABLESWITCH => {
            targets.push(read_s32(code, base)? as i64);
            let low = read_s32(code, base + 4)? as i64;
            let high = read_s32(code, base + 8)? as i64;
            for i in 0..(high - low + 1) as usize {
                targets.push(read_s32(code, base + 12 + i * 4)? as i64);
            }
        }
        OPC_LOOKUPSWITCH => {
            targets.push(read_s32(code, base)? as i64);
            let npairs = read_s32(code, base + 4)? as usize;
            for i in 0..npairs {
                targets.push(read_s32(code, base + 8 + i * 8 + 4)? as i64);
            }
        }
        _ => {
            return Err(OpcodeError::UnknownOpcode { opcode, offset: pc });
        }
    }
    Ok(targets)
}

/// The match keys of a `tableswitch` (low..=high) or `lookupswitch` at `pc`,
/// in target order (parallel to `switch_targets` minus the default).
pub fn switch_keys(code: &[u8], pc: usize) -> Result<Vec<i32>, OpcodeError> {
    let opcode = read_u8(code, pc)?;
    let base = pc + 1 + switch_pad(pc);
    let mut keys = Vec::new();
    match opcode {
        OPC_TABLESWITCH => {
            let low = read_s32(code, base + 4)? as i64;
            let high = read_s32(code, base + 8)? as i64;
            for k in low..=high {
                keys.push(k as i32);
            }
        }
        OPC_LOOKUPSWITCH => {
            let npairs = read_s32(code, base + 4)? as usize;
            for i in 0..npairs {
                keys.push(read_s32(code, base + 8 + i * 8)?);
            }
        }
        _ => {
            return Err(OpcodeError::UnknownOpcode { opcode, offset: pc });
        }
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_byte_sizes() {
        assert_eq!(insn_size(&[OPC_NOP], 0).unwrap(), 1);
        assert_eq!(insn_size(&[OPC_IADD], 0).unwrap(), 1);
        assert_eq!(insn_size(&[OPC_IRETURN], 0).unwrap(), 1);
        assert_eq!(insn_size(&[OPC_ALOAD_1], 0).unwrap(), 1);
    }

    #[test]
    fn test_operand_sizes() {
        assert_eq!(insn_size(&[OPC_BIPUSH, 0x05], 0).unwrap(), 2);
        assert_eq!(insn_size(&[OPC_SIPUSH, 0x01, 0x00], 0).unwrap(), 3);
        assert_eq!(insn_size(&[OPC_GOTO, 0x00, 0x03], 0).unwrap(), 3);
        assert_eq!(
            insn_size(&[OPC_INVOKEINTERFACE, 0, 1, 1, 0], 0).unwrap(),
            5
        );
    }

    #[test]
    fn test_wide_sizes() {
        let wide_iload = [OPC_WIDE, OPC_ILOAD, 0x01, 0x00];
        assert_eq!(insn_size(&wide_iload, 0).unwrap(), 4);

        let wide_iinc = [OPC_WIDE, OPC_IINC, 0x01, 0x00, 0x00, 0x05];
        assert_eq!(insn_size(&wide_iinc, 0).unwrap(), 6);
    }

    #[test]
    fn test_unknown_opcode() {
        assert!(matches!(
            insn_size(&[0xcb], 0),
            Err(OpcodeError::UnknownOpcode { opcode: 0xcb, .. })
        ));
    }

    #[test]
    fn test_truncated_instruction() {
        assert!(matches!(
            insn_size(&[OPC_SIPUSH, 0x01], 0),
            Err(OpcodeError::Truncated(_))
        ));
    }

    /// tableswitch at offset 0: 3 pad bytes, default, low=0, high=1, 2 entries
    fn build_tableswitch(at: usize) -> Vec<u8> {
        let mut code = vec![OPC_NOP; at];
        code.push(OPC_TABLESWITCH);
        while (code.len() % 4) != 0 {
            code.push(0);
        }
        code.extend_from_slice(&20i32.to_be_bytes()); // default
        code.extend_from_slice(&0i32.to_be_bytes()); // low
        code.extend_from_slice(&1i32.to_be_bytes()); // high
        code.extend_from_slice(&24i32.to_be_bytes()); // case 0
        code.extend_from_slice(&28i32.to_be_bytes()); // case 1
        code
    }

    #[test]
    fn test_tableswitch_size_depends_on_alignment() {
        // At offset 0, 3 pad bytes: 1 + 3 + 12 + 2*4 = 24
        let code = build_tableswitch(0);
        assert_eq!(insn_size(&code, 0).unwrap(), 24);

        // At offset 3, no pad bytes: 1 + 0 + 12 + 2*4 = 21
        let code = build_tableswitch(3);
        assert_eq!(insn_size(&code, 3).unwrap(), 21);
    }

    #[test]
    fn test_tableswitch_targets() {
        let code = build_tableswitch(0);
        let targets = switch_targets(&code, 0).unwrap();
        assert_eq!(targets, vec![20, 24, 28]);
        assert_eq!(switch_keys(&code, 0).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_lookupswitch_size_and_targets() {
        let mut code = vec![OPC_LOOKUPSWITCH];
        while (code.len() % 4) != 0 {
            code.push(0);
        }
        code.extend_from_slice(&16i32.to_be_bytes()); // default
        code.extend_from_slice(&2i32.to_be_bytes()); // npairs
        code.extend_from_slice(&5i32.to_be_bytes()); // key 5
        code.extend_from_slice(&20i32.to_be_bytes());
        code.extend_from_slice(&9i32.to_be_bytes()); // key 9
        code.extend_from_slice(&24i32.to_be_bytes());

        assert_eq!(insn_size(&code, 0).unwrap(), 1 + 3 + 8 + 16);
        assert_eq!(switch_targets(&code, 0).unwrap(), vec![16, 20, 24]);
        assert_eq!(switch_keys(&code, 0).unwrap(), vec![5, 9]);
    }

    #[test]
    fn test_branch_predicates() {
        assert!(is_branch(OPC_IFNONNULL));
        assert!(is_branch(OPC_GOTO));
        assert!(is_branch(OPC_TABLESWITCH));
        assert!(!is_branch(OPC_IADD));
        assert!(is_cond_branch(OPC_IFLE));
        assert!(!is_cond_branch(OPC_GOTO));
        assert!(is_goto(OPC_GOTO_W));
        assert!(is_return(OPC_ARETURN));
        assert!(is_athrow(OPC_ATHROW));
    }

    #[test]
    fn test_branch_target_is_absolute() {
        // IFNONNULL at offset 1 targeting offset 7
        let code = [OPC_ALOAD_1, OPC_IFNONNULL, 0x00, 0x07, OPC_NOP];
        assert_eq!(branch_target(&code, 1).unwrap(), 7);
    }

    #[test]
    fn test_backward_branch_target() {
        let code = [OPC_NOP, OPC_NOP, OPC_GOTO, 0x00, 0x00];
        assert_eq!(branch_target(&code, 2).unwrap(), 0);
    }

    #[test]
    fn test_goto_w_target() {
        let code = [OPC_GOTO_W, 0x00, 0x00, 0x00, 0x05];
        assert_eq!(branch_target(&code, 0).unwrap(), 5);
    }
}
