//! The real allocator underneath the tracker.

use libc::{c_char, c_void, dlsym, RTLD_NEXT};
use once_cell::sync::Lazy;

/// A malloc-style allocator that the tracker forwards to.
///
/// # Safety
///
/// `malloc` and `realloc` must return either null or a pointer to a live
/// block of at least `size` bytes that stays valid until passed to `free` or
/// `realloc`.
pub unsafe trait RawAlloc {
    /// Allocates `size` bytes.  Returns null on failure.
    ///
    /// # Safety
    ///
    /// Same contract as C `malloc`.
    unsafe fn malloc(&self, size: usize) -> *mut u8;

    /// # Safety
    ///
    /// `ptr` must be null or a live block obtained from this allocator.
    unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8;

    /// # Safety
    ///
    /// `ptr` must be null or a live block obtained from this allocator.
    unsafe fn free(&self, ptr: *mut u8);
}

/// The C library's `malloc`, `realloc` and `free`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Malloc;

unsafe impl RawAlloc for Malloc {
    unsafe fn malloc(&self, size: usize) -> *mut u8 {
        libc::malloc(size as libc::size_t) as *mut u8
    }

    unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        libc::realloc(ptr as *mut c_void, size as libc::size_t) as *mut u8
    }

    unsafe fn free(&self, ptr: *mut u8) {
        libc::free(ptr as *mut c_void)
    }
}

/// The `malloc`, `realloc` and `free` that the dynamic linker would have
/// picked had this library not been preloaded.  Calling `libc::malloc` from
/// inside an interposed `malloc` would recurse forever.
#[derive(Clone, Copy, Debug, Default)]
pub struct NextMalloc;

type MallocFunc = unsafe extern "C" fn(size: libc::size_t) -> *mut c_void;
type ReallocFunc = unsafe extern "C" fn(ptr: *mut c_void, size: libc::size_t) -> *mut c_void;
type FreeFunc = unsafe extern "C" fn(ptr: *mut c_void);

fn next_symbol(name: &'static [u8]) -> usize {
    let sym = unsafe { dlsym(RTLD_NEXT, name.as_ptr() as *const c_char) };
    if sym.is_null() {
        // Nothing sensible can be done without the real allocator.
        unsafe { libc::abort() };
    }
    sym as usize
}

static REAL_MALLOC: Lazy<usize> = Lazy::new(|| next_symbol(b"malloc\0"));
static REAL_REALLOC: Lazy<usize> = Lazy::new(|| next_symbol(b"realloc\0"));
static REAL_FREE: Lazy<usize> = Lazy::new(|| next_symbol(b"free\0"));

unsafe impl RawAlloc for NextMalloc {
    unsafe fn malloc(&self, size: usize) -> *mut u8 {
        let real_malloc: MallocFunc = std::mem::transmute(*REAL_MALLOC);
        real_malloc(size as libc::size_t) as *mut u8
    }

    unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        let real_realloc: ReallocFunc = std::mem::transmute(*REAL_REALLOC);
        real_realloc(ptr as *mut c_void, size as libc::size_t) as *mut u8
    }

    unsafe fn free(&self, ptr: *mut u8) {
        let real_free: FreeFunc = std::mem::transmute(*REAL_FREE);
        real_free(ptr as *mut c_void)
    }
}
