//! Native-address to compilation-unit mapping
//!
//! A radix tree keyed by each unit's code start address. Signal handlers
//! and stack unwinders resolve an arbitrary instruction pointer to the
//! owning unit with a preceding-key lookup plus a range check. Writers
//! only append (compilation) or remove (class unload); the read path
//! takes the shared lock and allocates nothing.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::runtime::registry::PreparedMethod;
use crate::support::RadixTree;

static UNITS: Lazy<RwLock<RadixTree<Arc<PreparedMethod>>>> =
    Lazy::new(|| RwLock::new(RadixTree::new()));

/// Publish a compiled unit's code range.
pub fn insert(code_addr: usize, prepared: Arc<PreparedMethod>) {
    UNITS.write().insert(code_addr, prepared);
}

/// The unit whose emitted code contains `ip`, if any. Takes no lock a
/// faulting thread could already hold.
pub fn lookup(ip: usize) -> Option<Arc<PreparedMethod>> {
    let units = UNITS.read();
    let (start, prepared) = units.lookup_preceding(ip)?;
    let code = prepared.code_range()?;
    debug_assert_eq!(code.addr, start);
    if code.contains(ip) {
        Some(prepared.clone())
    } else {
        None
    }
}

/// Remove a unit (class unload).
pub fn remove(code_addr: usize) {
    UNITS.write().remove(code_addr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::CodeRange;

    fn prepared_with_range(addr: usize, len: usize) -> Arc<PreparedMethod> {
        let method = crate::unit::tests::test_method(vec![], 0, 0);
        let pool = Arc::new(mokka_classfile::ConstantPool::new());
        let mut unit = crate::unit::CompilationUnit::new(method.clone(), pool.clone());
        unit.code = Some(CodeRange { addr, len });
        let prepared = PreparedMethod::new(0, method, pool, unit);
        prepared.install_trampoline(crate::runtime::trampoline::tests_stub());
        prepared.publish_body(addr, len);
        Arc::new(prepared)
    }

    #[test]
    fn test_lookup_by_interior_pointer() {
        let prepared = prepared_with_range(0x7_0000_0000, 0x40);
        insert(0x7_0000_0000, prepared);

        assert!(lookup(0x7_0000_0000).is_some());
        assert!(lookup(0x7_0000_003F).is_some());
        assert!(lookup(0x7_0000_0040).is_none());
        assert!(lookup(0x6_FFFF_FFFF).is_none());

        remove(0x7_0000_0000);
        assert!(lookup(0x7_0000_0000).is_none());
    }
}
