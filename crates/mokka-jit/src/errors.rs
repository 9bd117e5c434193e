//! Pipeline error surface
//!
//! Malformed-bytecode conditions abort compilation of the method and are
//! surfaced to the runtime as a class-format error; code-space exhaustion
//! is surfaced to the caller as-is. Unresolved references are not errors
//! (the translator degrades them to resolution-failure stubs), and
//! pipeline postcondition failures are panics, not `Err`s.

use mokka_classfile::bytes::TruncatedInput;
use mokka_classfile::opcodes::OpcodeError;

/// Error compiling a single method
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("invalid opcode {opcode:#04x} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },
    #[error("truncated instruction at offset {offset}")]
    TruncatedInstruction { offset: usize },
    #[error("unsupported opcode {opcode:#04x} at offset {offset}")]
    UnsupportedOpcode { opcode: u8, offset: usize },
    #[error("branch target {target} out of range at offset {offset}")]
    BranchOutOfRange { target: i64, offset: usize },
    #[error("operand stack underflow at offset {offset}")]
    StackUnderflow { offset: usize },
    #[error("operand stack height mismatch at block boundary {offset}")]
    StackHeightMismatch { offset: usize },
    #[error("malformed method descriptor {descriptor:?}")]
    InvalidDescriptor { descriptor: String },
    #[error("out of executable code space")]
    OutOfCodeSpace,
}

impl CompileError {
    /// Whether this error reflects malformed input bytecode (as opposed to
    /// resource exhaustion). The runtime maps these to a class-format
    /// error condition.
    pub fn is_malformed_bytecode(&self) -> bool {
        !matches!(self, CompileError::OutOfCodeSpace)
    }
}

impl From<TruncatedInput> for CompileError {
    fn from(e: TruncatedInput) -> Self {
        CompileError::TruncatedInstruction { offset: e.0 }
    }
}

impl From<OpcodeError> for CompileError {
    fn from(e: OpcodeError) -> Self {
        match e {
            OpcodeError::UnknownOpcode { opcode, offset } => {
                CompileError::InvalidOpcode { opcode, offset }
            }
            OpcodeError::Truncated(offset) => CompileError::TruncatedInstruction { offset },
        }
    }
}
