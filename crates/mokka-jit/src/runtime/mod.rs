//! Process-wide runtime state and the interpreter/runtime boundary:
//! the executable-text heap, runtime hook table, native-method table,
//! prepared-method registry, lazy trampolines, the address-to-unit map,
//! and signal-side fault resolution.

pub mod cu_map;
pub mod hooks;
pub mod layout;
pub mod natives;
pub mod registry;
pub mod signal;
pub mod text;
pub mod trampoline;
