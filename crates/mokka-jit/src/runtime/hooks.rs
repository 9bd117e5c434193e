//! Runtime helper table
//!
//! Compiled code reaches the object model, monitors, and thrown
//! conditions through C-ABI function pointers registered here at VM
//! bring-up. The table is installed once; the selector bakes the
//! pointer values into emitted code, so replacing them after any method
//! has compiled is not supported.

use once_cell::sync::OnceCell;

/// C-ABI helper functions the runtime provides to compiled code.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeHooks {
    /// (class_id) -> object address
    pub alloc_object: unsafe extern "C" fn(u32) -> usize,
    /// (atype, length) -> array address
    pub alloc_prim_array: unsafe extern "C" fn(u32, i32) -> usize,
    /// (class_id, length) -> array address
    pub alloc_ref_array: unsafe extern "C" fn(u32, i32) -> usize,
    /// (class_id, nr_dims, d1, d2, d3) -> array address
    pub alloc_multi_array: unsafe extern "C" fn(u32, u32, i32, i32, i32) -> usize,
    /// (object, class_id) -> 0 or 1
    pub instanceof: unsafe extern "C" fn(usize, u32) -> i32,
    /// (object, class_id); throws on failure
    pub checkcast: unsafe extern "C" fn(usize, u32),
    /// (array, value); throws on failure
    pub array_store_check: unsafe extern "C" fn(usize, usize),
    pub monitor_enter: unsafe extern "C" fn(usize),
    pub monitor_exit: unsafe extern "C" fn(usize),
    /// (class_name ptr, len) for static synchronized methods
    pub monitor_enter_static: unsafe extern "C" fn(*const u8, usize),
    pub monitor_exit_static: unsafe extern "C" fn(*const u8, usize),
    /// (exception object); unwinds via the native exception tables
    pub throw: unsafe extern "C" fn(usize) -> !,
    /// (constant-pool index); raises the matching linkage error
    pub resolution_error: unsafe extern "C" fn(u32) -> !,
    /// Entry returned by the trampoline for a unit in the Failed state
    pub compile_failed: unsafe extern "C" fn() -> !,
    pub f32_rem: unsafe extern "C" fn(f32, f32) -> f32,
    pub f64_rem: unsafe extern "C" fn(f64, f64) -> f64,
}

static HOOKS: OnceCell<RuntimeHooks> = OnceCell::new();

/// Install the process-wide hook table. Returns `Err` if already installed.
pub fn install(hooks: RuntimeHooks) -> Result<(), RuntimeHooks> {
    HOOKS.set(hooks)
}

/// The installed table, or an aborting placeholder when the embedding
/// runtime never registered one (unit tests of the pipeline itself).
pub fn get() -> &'static RuntimeHooks {
    HOOKS.get_or_init(aborting_hooks)
}

unsafe extern "C" fn abort_usize_u32(_: usize, _: u32) {
    std::process::abort();
}

unsafe extern "C" fn abort_usize_usize(_: usize, _: usize) {
    std::process::abort();
}

unsafe extern "C" fn abort_usize(_: usize) {
    std::process::abort();
}

unsafe extern "C" fn abort_ptr_len(_: *const u8, _: usize) {
    std::process::abort();
}

unsafe extern "C" fn abort_alloc_object(_: u32) -> usize {
    std::process::abort();
}

unsafe extern "C" fn abort_alloc_array(_: u32, _: i32) -> usize {
    std::process::abort();
}

unsafe extern "C" fn abort_alloc_multi(_: u32, _: u32, _: i32, _: i32, _: i32) -> usize {
    std::process::abort();
}

unsafe extern "C" fn abort_instanceof(_: usize, _: u32) -> i32 {
    std::process::abort();
}

unsafe extern "C" fn abort_throw(_: usize) -> ! {
    std::process::abort();
}

unsafe extern "C" fn abort_resolution(_: u32) -> ! {
    std::process::abort();
}

unsafe extern "C" fn abort_compile_failed() -> ! {
    std::process::abort();
}

unsafe extern "C" fn frem_f32(a: f32, b: f32) -> f32 {
    a % b
}

unsafe extern "C" fn frem_f64(a: f64, b: f64) -> f64 {
    a % b
}

fn aborting_hooks() -> RuntimeHooks {
    RuntimeHooks {
        alloc_object: abort_alloc_object,
        alloc_prim_array: abort_alloc_array,
        alloc_ref_array: abort_alloc_array,
        alloc_multi_array: abort_alloc_multi,
        instanceof: abort_instanceof,
        checkcast: abort_usize_u32,
        array_store_check: abort_usize_usize,
        monitor_enter: abort_usize,
        monitor_exit: abort_usize,
        monitor_enter_static: abort_ptr_len,
        monitor_exit_static: abort_ptr_len,
        throw: abort_throw,
        resolution_error: abort_resolution,
        compile_failed: abort_compile_failed,
        f32_rem: frem_f32,
        f64_rem: frem_f64,
    }
}
