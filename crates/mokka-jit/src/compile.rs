//! Compilation driver and lazy trampoline dispatch
//!
//! Chains the pipeline stages over a compilation unit, and implements the
//! magic trampoline: the single process-wide routine a lazy stub calls on
//! a method's first invocation. Per-unit serialization is the unit's
//! mutex; the unit state machine is NotCompiled -> Compiling ->
//! {Compiled, Failed}, with Failed terminal (no retry).

use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::{debug, warn};

use mokka_classfile::{ConstantPool, MethodInfo};

use crate::cfg::build_cfg;
use crate::emit::emit_machine_code;
use crate::errors::CompileError;
use crate::ir::translate::convert_to_ir;
use crate::isel::select::select_instructions;
use crate::regalloc::{allocate_registers, analyze_liveness, compute_insn_positions, RegisterSet};
use crate::runtime::registry::{self, PreparedMethod};
use crate::runtime::trampoline::build_trampoline;
use crate::runtime::{cu_map, hooks, natives, text};
use crate::unit::CompilationUnit;

/// Run the whole pipeline over one unit: CFG, IR, selection, positions,
/// liveness, allocation, emission.
pub fn compile(cu: &mut CompilationUnit) -> Result<(), CompileError> {
    build_cfg(cu)?;
    convert_to_ir(cu)?;
    select_instructions(cu);
    compute_insn_positions(cu);
    let mut intervals = analyze_liveness(cu);
    allocate_registers(cu, &mut intervals, &RegisterSet::default());
    emit_machine_code(cu)?;
    Ok(())
}

/// Prepare a method for lazy compilation: allocate its unit, emit its
/// trampoline stub, and register it so call sites can resolve it. The
/// trampoline entry is the method's callable pointer until it compiles.
pub fn prepare_method(
    method_id: u32,
    method: Arc<MethodInfo>,
    pool: Arc<ConstantPool>,
) -> Result<Arc<PreparedMethod>, CompileError> {
    text::init()?;
    let unit = CompilationUnit::new(method.clone(), pool.clone());
    let prepared = Arc::new(PreparedMethod::new(method_id, method, pool, unit));

    let ctx = Arc::as_ptr(&prepared) as *const ();
    let trampoline = build_trampoline(magic_trampoline, ctx)?;
    prepared.install_trampoline(trampoline);

    registry::register(method_id, prepared.clone());
    Ok(prepared)
}

/// First-call dispatcher. Takes the unit lock, compiles (or resolves the
/// native symbol) if nobody has yet, rewrites the recorded call sites,
/// and returns the pointer the stub should jump to.
///
/// # Safety
/// `ctx` must point to a live `PreparedMethod`, which the registry keeps
/// alive until class unload.
pub unsafe extern "C" fn magic_trampoline(ctx: *const ()) -> *const u8 {
    let prepared = &*(ctx as *const PreparedMethod);
    let mut unit = prepared.unit.lock();

    if prepared.is_compiled.load(Ordering::Acquire) {
        return prepared.body() as *const u8;
    }
    if prepared.failed.load(Ordering::Relaxed) {
        return hooks::get().compile_failed as usize as *const u8;
    }

    if prepared.method.is_native() {
        let method = &prepared.method;
        return match natives::lookup(&method.class_name, &method.name) {
            // The native symbol can live anywhere in the address space, so
            // it is never published as a body: call sites keep targeting
            // the trampoline, which jumps to whatever this returns.
            Some(fn_ptr) => fn_ptr as *const u8,
            None => {
                warn!(
                    "no native registered for {}.{}",
                    method.class_name, method.name
                );
                prepared.failed.store(true, Ordering::Relaxed);
                hooks::get().compile_failed as usize as *const u8
            }
        };
    }

    match compile(&mut unit) {
        Ok(()) => {
            let code = unit.code.expect("successful compile produced code");
            // Publish the lookup state first, then rewrite recorded call
            // sites, all before the lock drops: a caller that observes the
            // compiled state sees its own site rewritten, and any thread
            // entering the body can already be mapped by the signal path.
            prepared.publish_exception_table(unit.exception_table.clone());
            if let Some(registered) = registry::lookup(prepared.method_id) {
                if std::ptr::eq(Arc::as_ptr(&registered), prepared) {
                    cu_map::insert(code.addr, registered);
                }
            }
            prepared.publish_body(code.addr, code.len);
            prepared.trampoline().drain_fixup_sites(code.addr);
            debug!(
                "jit: {}.{} compiled to {:#x}",
                prepared.method.class_name, prepared.method.name, code.addr
            );
            code.addr as *const u8
        }
        Err(err) => {
            warn!(
                "jit: failed to compile {}.{}: {err}",
                prepared.method.class_name, prepared.method.name
            );
            prepared.failed.store(true, Ordering::Relaxed);
            hooks::get().compile_failed as usize as *const u8
        }
    }
}
