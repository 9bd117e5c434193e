//! Big-endian readers over class-file byte slices
//!
//! Everything in a class file (and in method bytecode) is big-endian; the
//! JIT reads all multi-byte fields through these accessors so host
//! endianness never leaks into bytecode decoding.

/// Error when a read runs past the end of the input
#[derive(Debug, thiserror::Error)]
#[error("unexpected end of input at offset {0}")]
pub struct TruncatedInput(pub usize);

pub fn read_u8(code: &[u8], pos: usize) -> Result<u8, TruncatedInput> {
    code.get(pos).copied().ok_or(TruncatedInput(pos))
}

pub fn read_u16(code: &[u8], pos: usize) -> Result<u16, TruncatedInput> {
    if pos + 2 > code.len() {
        return Err(TruncatedInput(pos));
    }
    Ok(u16::from_be_bytes([code[pos], code[pos + 1]]))
}

pub fn read_s16(code: &[u8], pos: usize) -> Result<i16, TruncatedInput> {
    read_u16(code, pos).map(|v| v as i16)
}

pub fn read_u32(code: &[u8], pos: usize) -> Result<u32, TruncatedInput> {
    if pos + 4 > code.len() {
        return Err(TruncatedInput(pos));
    }
    Ok(u32::from_be_bytes([
        code[pos],
        code[pos + 1],
        code[pos + 2],
        code[pos + 3],
    ]))
}

pub fn read_s32(code: &[u8], pos: usize) -> Result<i32, TruncatedInput> {
    read_u32(code, pos).map(|v| v as i32)
}

pub fn read_u64(code: &[u8], pos: usize) -> Result<u64, TruncatedInput> {
    if pos + 8 > code.len() {
        return Err(TruncatedInput(pos));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&code[pos..pos + 8]);
    Ok(u64::from_be_bytes(buf))
}
