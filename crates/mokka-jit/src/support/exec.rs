//! Executable memory regions
//!
//! Page-aligned W+X mappings that compiled code is copied into. On x86-64
//! the mapping is requested below the 4 GiB boundary so 32-bit call
//! displacements between JIT bodies stay valid.

use std::ptr;

/// Error allocating executable memory
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("mmap of {size} executable bytes failed")]
    MapFailed { size: usize },
    #[error("executable memory is not supported on this platform")]
    Unsupported,
}

/// A page-aligned region mapped PROT_READ | PROT_WRITE | PROT_EXEC
#[derive(Debug)]
pub struct ExecRegion {
    ptr: *mut u8,
    size: usize,
}

// The region's address and length never change after mapping; writes are
// serialized by the text-heap lock.
unsafe impl Send for ExecRegion {}
unsafe impl Sync for ExecRegion {}

#[cfg(unix)]
pub fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

#[cfg(not(unix))]
pub fn page_size() -> usize {
    4096
}

impl ExecRegion {
    /// Map a W+X region of at least `size` bytes, rounded up to page size.
    #[cfg(unix)]
    pub fn alloc(size: usize) -> Result<ExecRegion, ExecError> {
        let page = page_size();
        let size = size.div_ceil(page) * page;

        #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
        let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_32BIT;
        #[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
        let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                flags,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(ExecError::MapFailed { size });
        }
        Ok(ExecRegion {
            ptr: ptr as *mut u8,
            size,
        })
    }

    #[cfg(not(unix))]
    pub fn alloc(_size: usize) -> Result<ExecRegion, ExecError> {
        Err(ExecError::Unsupported)
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn contains(&self, addr: usize) -> bool {
        let start = self.ptr as usize;
        addr >= start && addr < start + self.size
    }

    /// Copy `bytes` into the region at `offset`.
    ///
    /// # Safety
    /// The caller must ensure no thread is executing in the target range.
    pub unsafe fn write(&self, offset: usize, bytes: &[u8]) {
        assert!(offset + bytes.len() <= self.size);
        ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.add(offset), bytes.len());
    }
}

impl Drop for ExecRegion {
    fn drop(&mut self) {
        #[cfg(unix)]
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.size);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_rounds_to_page() {
        let region = ExecRegion::alloc(1).unwrap();
        assert_eq!(region.size() % page_size(), 0);
        assert!(region.size() >= page_size());
    }

    #[test]
    fn test_contains() {
        let region = ExecRegion::alloc(64).unwrap();
        let base = region.as_ptr() as usize;
        assert!(region.contains(base));
        assert!(region.contains(base + region.size() - 1));
        assert!(!region.contains(base + region.size()));
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_written_code_is_executable() {
        // mov eax, 42; ret
        let code = [0xB8, 0x2A, 0x00, 0x00, 0x00, 0xC3];
        let region = ExecRegion::alloc(code.len()).unwrap();
        unsafe {
            region.write(0, &code);
            let f: extern "C" fn() -> i32 = std::mem::transmute(region.as_ptr());
            assert_eq!(f(), 42);
        }
    }

    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    #[test]
    fn test_mapped_below_4gib() {
        let region = ExecRegion::alloc(64).unwrap();
        assert!((region.as_ptr() as usize) < (1usize << 32));
    }
}
