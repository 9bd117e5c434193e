//! Object-model layout contract
//!
//! The byte offsets compiled code assumes when touching heap objects.
//! These mirror the runtime collaborator's object headers; the JIT never
//! allocates or walks objects itself.

use mokka_classfile::VmType;

/// Offset of the 32-bit length word in an array object
pub const ARRAY_LENGTH_OFFSET: i32 = 8;

/// Offset of the first element in an array object
pub const ARRAY_DATA_OFFSET: i32 = 16;

/// log2 of the element size, the SIB scale for indexed access.
pub fn array_shift(ty: VmType) -> u8 {
    match ty {
        VmType::Byte | VmType::Boolean => 0,
        VmType::Short | VmType::Char => 1,
        VmType::Int | VmType::Float => 2,
        VmType::Long | VmType::Double | VmType::Reference => 3,
        VmType::Void | VmType::ReturnAddress => unreachable!("no arrays of {ty}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_shifts() {
        assert_eq!(array_shift(VmType::Byte), 0);
        assert_eq!(array_shift(VmType::Char), 1);
        assert_eq!(array_shift(VmType::Int), 2);
        assert_eq!(array_shift(VmType::Long), 3);
        assert_eq!(array_shift(VmType::Reference), 3);
    }
}
