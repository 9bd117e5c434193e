//! Liveness analysis and linear-scan register allocation
//!
//! Runs after instruction selection: positions are assigned in strict
//! program order, per-block def/use sets feed a fixed-point dataflow,
//! intervals are built over the global position space, and the linear
//! scan assigns physical registers or spill slots, rewriting operands
//! through the intervals' back-references.

pub mod interval;
pub mod linear_scan;
pub mod liveness;

pub use interval::{LiveInterval, LiveRange, OperandSite};
pub use linear_scan::{allocate_registers, RegisterSet};
pub use liveness::{analyze_liveness, compute_insn_positions};
