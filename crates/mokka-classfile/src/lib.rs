//! Class-file data model consumed by the Mokka JIT.
//!
//! This crate is the boundary between the class-file reader and the JIT
//! compiler: constant-pool entries in their resolved form, the per-method
//! code model, method-descriptor parsing, and the bytecode opcode tables
//! (instruction sizes, branch predicates, branch-target extraction). It
//! does not parse class files; it defines what a parser hands the JIT.

pub mod bytes;
pub mod constant_pool;
pub mod descriptor;
pub mod method;
pub mod opcodes;
pub mod types;

pub use constant_pool::{ConstantPool, CpEntry, FieldRef, MethodRef};
pub use descriptor::MethodDescriptor;
pub use method::{ExceptionTableEntry, MethodInfo};
pub use types::VmType;
