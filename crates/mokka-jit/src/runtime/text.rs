//! Process-wide executable-text heap
//!
//! All compiled bodies and trampoline stubs are carved out of W+X
//! regions owned here, with 16-byte function alignment. The heap is
//! append-only during normal operation so code pointers stay stable;
//! regions are released only by `shutdown` at VM teardown.

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::errors::CompileError;
use crate::support::exec::ExecRegion;

/// Granularity of the underlying mappings
const REGION_SIZE: usize = 1 << 20;

/// Hard cap on a single allocation; anything larger is code-space
/// exhaustion by definition.
const MAX_ALLOC: usize = 64 << 20;

struct TextHeap {
    regions: Vec<ExecRegion>,
    /// Bump offset within the last region
    cursor: usize,
}

static TEXT: Lazy<Mutex<TextHeap>> = Lazy::new(|| {
    Mutex::new(TextHeap {
        regions: Vec::new(),
        cursor: 0,
    })
});

/// Reserve the initial region. Idempotent; `alloc` also maps on demand.
pub fn init() -> Result<(), CompileError> {
    let mut heap = TEXT.lock();
    if heap.regions.is_empty() {
        let region = ExecRegion::alloc(REGION_SIZE).map_err(|_| CompileError::OutOfCodeSpace)?;
        heap.regions.push(region);
        heap.cursor = 0;
    }
    Ok(())
}

/// Release every region. Only valid once no thread can re-enter JIT code.
pub fn shutdown() {
    let mut heap = TEXT.lock();
    heap.regions.clear();
    heap.cursor = 0;
}

/// Carve a 16-byte-aligned sub-range of `size` bytes, returning its
/// address.
pub fn alloc(size: usize) -> Result<usize, CompileError> {
    if size == 0 || size > MAX_ALLOC {
        return Err(CompileError::OutOfCodeSpace);
    }
    let mut heap = TEXT.lock();

    let need_new = match heap.regions.last() {
        None => true,
        Some(region) => {
            let aligned = (heap.cursor + 15) & !15;
            aligned + size > region.size()
        }
    };
    if need_new {
        let region_size = REGION_SIZE.max(size);
        let region = ExecRegion::alloc(region_size).map_err(|_| CompileError::OutOfCodeSpace)?;
        heap.regions.push(region);
        heap.cursor = 0;
    }

    let aligned = (heap.cursor + 15) & !15;
    let region = heap.regions.last().expect("region mapped above");
    let addr = region.as_ptr() as usize + aligned;
    heap.cursor = aligned + size;
    Ok(addr)
}

/// Copy finished code into a range previously returned by `alloc`.
///
/// # Safety
/// `addr` must come from `alloc` with room for `bytes`, and no thread may
/// be executing in the target range.
pub unsafe fn write_at(addr: usize, bytes: &[u8]) {
    std::ptr::copy_nonoverlapping(bytes.as_ptr(), addr as *mut u8, bytes.len());
}

/// Whether `addr` points into JIT-emitted text. Used by unwinders to
/// decide when a frame belongs to compiled code.
pub fn is_jit_text(addr: usize) -> bool {
    let heap = TEXT.lock();
    heap.regions.iter().any(|region| region.contains(addr))
}
