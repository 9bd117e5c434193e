//! Resolved constant-pool model
//!
//! The class-file reader resolves symbolic references before handing a
//! pool to the JIT; entries the reader could not resolve stay
//! `Unresolved` and the translator degrades them to resolution-failure
//! stubs instead of failing the whole compilation.

use crate::descriptor::MethodDescriptor;
use crate::types::VmType;

/// A resolved class reference
#[derive(Debug, Clone, PartialEq)]
pub struct ClassRef {
    pub name: String,
    /// Runtime class id, used by checkcast/instanceof lowerings and
    /// inline-cache call sites
    pub class_id: u32,
}

/// A resolved field reference
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRef {
    pub class_name: String,
    pub name: String,
    pub ty: VmType,
    pub is_static: bool,
    /// Instance fields: byte offset within the object
    pub offset: u32,
    /// Static fields: absolute address of the storage word
    pub static_addr: usize,
}

/// A resolved method reference
#[derive(Debug, Clone, PartialEq)]
pub struct MethodRef {
    pub class_name: String,
    pub name: String,
    pub descriptor: MethodDescriptor,
    /// Key into the JIT's prepared-method registry
    pub method_id: u32,
    pub is_static: bool,
}

impl MethodRef {
    /// Argument slots popped at a call site (includes the receiver for
    /// instance methods).
    pub fn arg_slots(&self) -> u16 {
        self.descriptor.arg_slots(self.is_static)
    }
}

/// A constant-pool entry in resolved form
#[derive(Debug, Clone, PartialEq)]
pub enum CpEntry {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    /// Interned string object address (what `ldc` of a string pushes)
    StringConst(usize),
    Class(ClassRef),
    Field(FieldRef),
    Method(MethodRef),
    InterfaceMethod(MethodRef),
    /// Entry the reader could not resolve; carries the original tag
    Unresolved(u8),
}

/// The per-class constant pool, 1-indexed as in the class-file format.
#[derive(Debug, Default)]
pub struct ConstantPool {
    entries: Vec<CpEntry>,
}

impl ConstantPool {
    pub fn new() -> ConstantPool {
        ConstantPool::default()
    }

    /// Append an entry, returning its 1-based index.
    pub fn push(&mut self, entry: CpEntry) -> u16 {
        self.entries.push(entry);
        self.entries.len() as u16
    }

    /// Look up an entry by its 1-based index.
    pub fn get(&self, index: u16) -> Option<&CpEntry> {
        if index == 0 {
            return None;
        }
        self.entries.get(index as usize - 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_based_indexing() {
        let mut pool = ConstantPool::new();
        let idx = pool.push(CpEntry::Integer(42));
        assert_eq!(idx, 1);
        assert_eq!(pool.get(1), Some(&CpEntry::Integer(42)));
        assert_eq!(pool.get(0), None);
        assert_eq!(pool.get(2), None);
    }

    #[test]
    fn test_method_ref_arg_slots() {
        let m = MethodRef {
            class_name: "Foo".to_string(),
            name: "bar".to_string(),
            descriptor: MethodDescriptor::parse("(IJ)V").unwrap(),
            method_id: 7,
            is_static: false,
        };
        // receiver + int + long
        assert_eq!(m.arg_slots(), 4);
    }
}
