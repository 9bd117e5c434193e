//! Native-method table
//!
//! Process-wide mapping from `(class_name, method_name)` to a native
//! function pointer, registered at VM bring-up and read by the magic
//! trampoline when a native method is first called.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

static NATIVES: Lazy<RwLock<FxHashMap<(String, String), usize>>> =
    Lazy::new(|| RwLock::new(FxHashMap::default()));

/// Register a native implementation for `class_name.method_name`.
pub fn register(class_name: &str, method_name: &str, fn_ptr: usize) {
    NATIVES
        .write()
        .insert((class_name.to_string(), method_name.to_string()), fn_ptr);
}

/// Look up a native implementation.
pub fn lookup(class_name: &str, method_name: &str) -> Option<usize> {
    NATIVES
        .read()
        .get(&(class_name.to_string(), method_name.to_string()))
        .copied()
}

/// Drop every registration (VM teardown).
pub fn clear() {
    NATIVES.write().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        register("java/lang/StrictMath", "nat_sin", 0x1234);
        assert_eq!(lookup("java/lang/StrictMath", "nat_sin"), Some(0x1234));
        assert_eq!(lookup("java/lang/StrictMath", "nat_cos"), None);
    }
}
