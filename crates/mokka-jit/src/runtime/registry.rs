//! Prepared-method registry
//!
//! Maps the method ids found in constant-pool references to their
//! prepared state: the compilation unit, its lock, the lazy trampoline,
//! and the current callable entry point. Call-site lowering resolves
//! callees through this table.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use mokka_classfile::{ConstantPool, MethodInfo};

use crate::runtime::trampoline::JitTrampoline;
use crate::unit::CompilationUnit;

/// Per-method JIT state: the unit, its compile lock, and entry pointers.
///
/// `is_compiled` is written with release ordering after the body pointer
/// is published; lock-free readers pair it with an acquire load.
pub struct PreparedMethod {
    pub method_id: u32,
    pub method: Arc<MethodInfo>,
    pub pool: Arc<ConstantPool>,
    pub unit: Mutex<CompilationUnit>,
    /// Set once right after construction; the stub needs a stable pointer
    /// to this struct, so it cannot be built before the struct exists.
    trampoline: OnceCell<JitTrampoline>,
    pub is_compiled: AtomicBool,
    pub failed: AtomicBool,
    body: AtomicUsize,
    /// Emitted code length; with `body` this gives the code range without
    /// touching the unit lock (signal-side lookups must stay lock-free)
    code_len: AtomicUsize,
    /// Native exception table published after emission, readable from the
    /// signal path without the unit lock
    exception_table: OnceCell<Vec<crate::unit::NativeExceptionEntry>>,
}

impl PreparedMethod {
    pub fn new(
        method_id: u32,
        method: Arc<MethodInfo>,
        pool: Arc<ConstantPool>,
        unit: CompilationUnit,
    ) -> PreparedMethod {
        PreparedMethod {
            method_id,
            method,
            pool,
            unit: Mutex::new(unit),
            trampoline: OnceCell::new(),
            is_compiled: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            body: AtomicUsize::new(0),
            code_len: AtomicUsize::new(0),
            exception_table: OnceCell::new(),
        }
    }

    /// Publish the native exception table exactly once, at emission time.
    pub fn publish_exception_table(&self, table: Vec<crate::unit::NativeExceptionEntry>) {
        let _ = self.exception_table.set(table);
    }

    pub fn native_exception_table(&self) -> &[crate::unit::NativeExceptionEntry] {
        self.exception_table.get().map_or(&[], |t| t.as_slice())
    }

    pub fn install_trampoline(&self, trampoline: JitTrampoline) {
        if self.trampoline.set(trampoline).is_err() {
            panic!("trampoline installed twice");
        }
    }

    pub fn trampoline(&self) -> &JitTrampoline {
        self.trampoline.get().expect("trampoline installed at prepare time")
    }

    /// The address callers should target right now: the compiled body if
    /// published, the lazy stub otherwise.
    pub fn entry_point(&self) -> usize {
        if self.is_compiled.load(Ordering::Acquire) {
            self.body.load(Ordering::Relaxed)
        } else {
            self.trampoline().entry()
        }
    }

    /// Publish the compiled body. Called under the unit lock.
    pub fn publish_body(&self, body: usize, len: usize) {
        self.body.store(body, Ordering::Relaxed);
        self.code_len.store(len, Ordering::Relaxed);
        self.is_compiled.store(true, Ordering::Release);
    }

    pub fn body(&self) -> usize {
        self.body.load(Ordering::Relaxed)
    }

    /// The published code range, if compiled. Lock-free.
    pub fn code_range(&self) -> Option<crate::unit::CodeRange> {
        if !self.is_compiled.load(Ordering::Acquire) {
            return None;
        }
        Some(crate::unit::CodeRange {
            addr: self.body.load(Ordering::Relaxed),
            len: self.code_len.load(Ordering::Relaxed),
        })
    }
}

static METHODS: Lazy<RwLock<FxHashMap<u32, Arc<PreparedMethod>>>> =
    Lazy::new(|| RwLock::new(FxHashMap::default()));

/// Register a prepared method under its id, replacing any previous entry.
pub fn register(method_id: u32, prepared: Arc<PreparedMethod>) {
    METHODS.write().insert(method_id, prepared);
}

pub fn lookup(method_id: u32) -> Option<Arc<PreparedMethod>> {
    METHODS.read().get(&method_id).cloned()
}

/// Drop a method's registration (class unload).
pub fn unregister(method_id: u32) {
    METHODS.write().remove(&method_id);
}
