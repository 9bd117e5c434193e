//! Method-at-a-time JIT compiler for a JVM-class bytecode VM.
//!
//! Given a method's bytecode and constant pool, produces native x86-64
//! code callable as an ordinary function. The pipeline runs as a chain
//! of transformations over a per-method [`unit::CompilationUnit`]:
//!
//! 1. [`cfg`] - linear bytecode scan into basic blocks and successor edges
//! 2. [`ir`] - bytecode to typed expression-tree IR over a symbolic
//!    operand stack
//! 3. [`isel`] - tree-pattern lowering to machine instructions over
//!    virtual registers
//! 4. [`regalloc`] - liveness analysis and linear-scan allocation with
//!    interval splitting and spill code
//! 5. [`emit`] - encoding into an executable buffer with forward-branch
//!    back-patching and the native exception table
//!
//! Methods compile lazily: [`compile::prepare_method`] installs a small
//! trampoline stub as the method's entry point, and the first call runs
//! the pipeline under the unit's lock ([`compile::magic_trampoline`]),
//! then rewrites recorded call sites to the finished body.

pub mod cfg;
pub mod compile;
pub mod emit;
pub mod errors;
pub mod frame;
pub mod ir;
pub mod isel;
pub mod regalloc;
pub mod runtime;
pub mod support;
pub mod unit;

pub use compile::{compile, magic_trampoline, prepare_method};
pub use errors::CompileError;
pub use unit::{BasicBlock, BlockId, CompilationUnit, Vreg};
