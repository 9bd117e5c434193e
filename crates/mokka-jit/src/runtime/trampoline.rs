//! Per-method lazy trampoline stubs
//!
//! Until a method compiles, its callable entry point is a small stub
//! that preserves the incoming argument registers, calls the magic
//! trampoline with the prepared-method pointer, and jumps to whatever
//! body pointer comes back. Direct call sites that were emitted against
//! the stub are recorded here and rewritten once the real body exists.

use parking_lot::Mutex;

use crate::errors::CompileError;
use crate::runtime::text;
use crate::support::Buffer;
use crate::unit::CodeRange;

/// The magic-trampoline signature the stub calls into.
pub type MagicTrampoline = unsafe extern "C" fn(*const ()) -> *const u8;

/// A direct-call displacement field inside some unit's emitted buffer
/// that currently targets this trampoline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixupSite {
    /// Address of the rel32 displacement (the byte after the call opcode)
    pub site_addr: usize,
}

/// Lazy-entry stub plus the call sites awaiting fix-up
pub struct JitTrampoline {
    code: CodeRange,
    fixup_sites: Mutex<Vec<FixupSite>>,
}

impl JitTrampoline {
    /// Address callers jump to while the method is uncompiled.
    pub fn entry(&self) -> usize {
        self.code.addr
    }

    /// Record a direct-call site to rewrite when the method compiles.
    pub fn add_fixup_site(&self, site: FixupSite) {
        self.fixup_sites.lock().push(site);
    }

    pub fn nr_fixup_sites(&self) -> usize {
        self.fixup_sites.lock().len()
    }

    /// Rewrite every recorded call site to target `body`, draining the
    /// list. Called with the owning unit's lock held, before the lock is
    /// released, so a caller that observes the compiled state also sees
    /// its own call site rewritten.
    pub fn drain_fixup_sites(&self, body: usize) {
        let sites = std::mem::take(&mut *self.fixup_sites.lock());
        for site in sites {
            let rel = body as i64 - (site.site_addr as i64 + 4);
            unsafe {
                std::ptr::write_unaligned(site.site_addr as *mut i32, rel as i32);
            }
        }
    }
}

/// Emit the lazy-entry stub for one method.
///
/// The stub keeps the System V argument registers (six integer, six
/// floating) intact across the compile, then tail-jumps to the returned
/// body so the caller enters it with its original arguments.
pub fn build_trampoline(
    magic: MagicTrampoline,
    ctx: *const (),
) -> Result<JitTrampoline, CompileError> {
    let mut buf = Buffer::new();

    // push rdi / rsi / rdx / rcx / r8 / r9
    buf.emit_bytes(&[0x57, 0x56, 0x52, 0x51, 0x41, 0x50, 0x41, 0x51]);
    // sub rsp, 56 (seven 8-byte cells: six xmm saves plus alignment)
    buf.emit_bytes(&[0x48, 0x83, 0xEC, 0x38]);
    for i in 0..6u8 {
        // movsd [rsp + 8*i], xmm_i
        buf.emit_bytes(&[0xF2, 0x0F, 0x11, 0x44 | (i << 3), 0x24, 8 * i]);
    }

    // movabs rdi, ctx; movabs rax, magic; call rax
    buf.emit_bytes(&[0x48, 0xBF]);
    buf.emit_u64(ctx as u64);
    buf.emit_bytes(&[0x48, 0xB8]);
    buf.emit_u64(magic as usize as u64);
    buf.emit_bytes(&[0xFF, 0xD0]);

    for i in 0..6u8 {
        // movsd xmm_i, [rsp + 8*i]
        buf.emit_bytes(&[0xF2, 0x0F, 0x10, 0x44 | (i << 3), 0x24, 8 * i]);
    }
    // add rsp, 56
    buf.emit_bytes(&[0x48, 0x83, 0xC4, 0x38]);
    // pop r9 / r8 / rcx / rdx / rsi / rdi
    buf.emit_bytes(&[0x41, 0x59, 0x41, 0x58, 0x59, 0x5A, 0x5E, 0x5F]);
    // jmp rax
    buf.emit_bytes(&[0xFF, 0xE0]);

    let addr = text::alloc(buf.len())?;
    unsafe {
        text::write_at(addr, buf.as_slice());
    }
    Ok(JitTrampoline {
        code: CodeRange {
            addr,
            len: buf.len(),
        },
        fixup_sites: Mutex::new(Vec::new()),
    })
}

/// A trampoline with no stub, for tests that never execute it.
#[cfg(test)]
pub(crate) fn tests_stub() -> JitTrampoline {
    JitTrampoline {
        code: CodeRange { addr: 0, len: 0 },
        fixup_sites: Mutex::new(Vec::new()),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    unsafe extern "C" fn fake_magic(ctx: *const ()) -> *const u8 {
        // The "body" address was stashed in the context by the test.
        *(ctx as *const usize) as *const u8
    }

    #[test]
    fn test_stub_preserves_args_and_enters_body() {
        text::init().unwrap();

        // Body: lea eax, [rdi + rsi] (add the first two int args); ret
        let body = [0x8D, 0x04, 0x37, 0xC3];
        let body_addr = text::alloc(body.len()).unwrap();
        unsafe { text::write_at(body_addr, &body) };

        let ctx = Box::new(body_addr);
        let tramp = build_trampoline(fake_magic, &*ctx as *const usize as *const ()).unwrap();

        unsafe {
            let f: extern "C" fn(i32, i32) -> i32 = std::mem::transmute(tramp.entry());
            assert_eq!(f(30, 12), 42);
        }
    }

    #[test]
    fn test_fixup_sites_drain_and_rewrite() {
        text::init().unwrap();

        // A call site: e8 xx xx xx xx; the displacement field starts at +1.
        let call_site = text::alloc(5).unwrap();
        unsafe { text::write_at(call_site, &[0xE8, 0, 0, 0, 0]) };

        let ctx = 0usize;
        let tramp = build_trampoline(fake_magic, &ctx as *const usize as *const ()).unwrap();
        tramp.add_fixup_site(FixupSite {
            site_addr: call_site + 1,
        });
        assert_eq!(tramp.nr_fixup_sites(), 1);

        let body = call_site + 0x100;
        tramp.drain_fixup_sites(body);
        assert_eq!(tramp.nr_fixup_sites(), 0);

        let rel = unsafe { std::ptr::read_unaligned((call_site + 1) as *const i32) };
        assert_eq!(rel as i64, body as i64 - (call_site as i64 + 5));
    }
}
