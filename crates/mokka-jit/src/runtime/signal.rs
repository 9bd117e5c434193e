//! Signal-side fault resolution
//!
//! Null-pointer and divide-by-zero conditions surface as hardware traps
//! inside compiled code; bounds checks trap through `ud2`. The process
//! signal handler classifies the fault, maps the faulting instruction
//! pointer back to its compilation unit, and looks up the handler in the
//! unit's native exception table. Everything on this path reads
//! published, immutable state: no allocation, no unit lock.

use std::sync::Arc;

use crate::emit::find_exception_entry;
use crate::runtime::cu_map;
use crate::runtime::registry::PreparedMethod;

/// What kind of runtime condition a hardware trap represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// SIGSEGV with a near-null fault address
    NullPointer,
    /// SIGFPE from idiv
    DivideByZero,
    /// SIGILL from a bounds-check ud2
    ArrayIndexOutOfBounds,
    /// Anything else; not a JIT-mapped condition
    Unknown,
}

/// Classify a fault from its signal number and faulting data address.
#[cfg(unix)]
pub fn classify_fault(signo: i32, fault_addr: usize) -> FaultKind {
    let page = crate::support::exec::page_size();
    match signo {
        libc::SIGSEGV | libc::SIGBUS if fault_addr < page => FaultKind::NullPointer,
        libc::SIGFPE => FaultKind::DivideByZero,
        libc::SIGILL => FaultKind::ArrayIndexOutOfBounds,
        _ => FaultKind::Unknown,
    }
}

#[cfg(not(unix))]
pub fn classify_fault(_signo: i32, _fault_addr: usize) -> FaultKind {
    FaultKind::Unknown
}

/// Result of mapping a faulting instruction pointer
pub struct FaultResolution {
    pub method: Arc<PreparedMethod>,
    /// Handler address when a table entry covers the fault; `None` means
    /// the unwinder keeps walking frames
    pub handler_mach: Option<usize>,
}

/// Map a faulting IP to its unit and handler. `catch_matches` is the
/// runtime's class-hierarchy test for the thrown exception against a
/// catch type id (id 0 catches everything).
pub fn resolve_fault(
    ip: usize,
    catch_matches: impl Fn(u32) -> bool,
) -> Option<FaultResolution> {
    let method = cu_map::lookup(ip)?;
    let handler_mach = method
        .native_exception_table()
        .iter()
        .filter(|entry| entry.start_mach <= ip && ip < entry.end_mach)
        .find(|entry| entry.catch_type_id == 0 || catch_matches(entry.catch_type_id))
        .map(|entry| entry.handler_mach);
    Some(FaultResolution {
        method,
        handler_mach,
    })
}

/// Covering entry regardless of catch type; the common single-table case
/// goes through the shared binary search.
pub fn find_any_handler(ip: usize) -> Option<usize> {
    let method = cu_map::lookup(ip)?;
    find_exception_entry(method.native_exception_table(), ip).map(|entry| entry.handler_mach)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_classify_null_pointer() {
        assert_eq!(classify_fault(libc::SIGSEGV, 0), FaultKind::NullPointer);
        assert_eq!(classify_fault(libc::SIGSEGV, 8), FaultKind::NullPointer);
    }

    #[cfg(unix)]
    #[test]
    fn test_classify_divide_and_bounds() {
        assert_eq!(classify_fault(libc::SIGFPE, 0), FaultKind::DivideByZero);
        assert_eq!(
            classify_fault(libc::SIGILL, 0),
            FaultKind::ArrayIndexOutOfBounds
        );
    }

    #[test]
    fn test_resolve_unknown_ip() {
        assert!(resolve_fault(0x1234, |_| true).is_none());
        assert!(find_any_handler(0x1234).is_none());
    }
}
