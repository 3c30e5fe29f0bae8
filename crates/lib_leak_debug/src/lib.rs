//! Companion crate to [`leak_debug`].  This crate compiles into a dynamic library that can be
//! loaded via `LD_PRELOAD` to intercept the `malloc`, `realloc` and `free` calls issued by the
//! program and book them in a leak ledger before invoking the original `libc` functions.
//!
//! Tracking starts with the first allocation.  Nothing is logged unless `LEAK_DEBUG_CLOG` or
//! `LEAK_DEBUG_CERR` name the events to log.  At exit the outstanding allocations are written
//! to `leak_debug.<pid>.yaml` in `LEAK_DEBUG_DIR` (default: the working directory), ready for
//! `ld_print`.
//!
//! `calloc` is not interposed: `dlsym` itself may call it while the real allocator is being
//! looked up.  Blocks obtained from `calloc` show up as untracked frees.

use std::{ffi::CStr, sync::Once};

use leak_debug::{
    raw::{NextMalloc, RawAlloc},
    Config, LogPolicy, Report, Tracker,
};
use libc::{c_char, c_uint, c_void};
use once_cell::sync::Lazy;

static CONFIG: Lazy<Config> = Lazy::new(|| {
    let defaults = Config {
        policy: LogPolicy::QUIET,
        active: true,
        report_dir: None,
    };
    defaults.overlay(|name| std::env::var(name).ok())
});

static TRACKER: Lazy<Tracker<NextMalloc>> = Lazy::new(|| Tracker::with_config(NextMalloc, &CONFIG));

static AT_EXIT: Once = Once::new();

extern "C" fn write_report() {
    leak_debug::untracked(|| {
        let dir = CONFIG.report_dir_or_cwd();
        TRACKER.stop();
        if let Err(e) = Report::capture(&TRACKER.leaks()).write_to_dir(&dir) {
            eprintln!("leak_debug: {}", e);
        }
    });
}

fn tracker() -> &'static Tracker<NextMalloc> {
    AT_EXIT.call_once(|| unsafe {
        libc::atexit(write_report);
    });
    &TRACKER
}

/// When this library is loaded with `LD_PRELOAD`, this `malloc` implementation
/// records each block in the ledger before returning it.
///
/// # Safety
///
/// Same contract as C `malloc`.
#[no_mangle]
pub unsafe extern "C" fn malloc(size: libc::size_t) -> *mut c_void {
    leak_debug::intercept(
        || NextMalloc.malloc(size),
        || {
            let tracker = tracker();
            tracker.allocate_or_null(size, tracker.policy())
        },
    ) as *mut c_void
}

/// # Safety
///
/// Same contract as C `realloc`.
#[no_mangle]
pub unsafe extern "C" fn realloc(ptr: *mut c_void, size: libc::size_t) -> *mut c_void {
    leak_debug::intercept(
        || NextMalloc.realloc(ptr as *mut u8, size),
        || {
            let tracker = tracker();
            tracker.reallocate(ptr as *mut u8, size, tracker.policy())
        },
    ) as *mut c_void
}

/// # Safety
///
/// Same contract as C `free`.
#[no_mangle]
pub unsafe extern "C" fn free(ptr: *mut c_void) {
    leak_debug::intercept(
        || NextMalloc.free(ptr as *mut u8),
        || {
            let tracker = tracker();
            tracker.deallocate(ptr as *mut u8, tracker.policy());
        },
    )
}

/// Records `file` and `line` as the call site of the calling thread's next `malloc`,
/// `realloc` or `free`.  Meant to be wrapped in a macro that passes `__FILE__` and
/// `__LINE__`.
///
/// # Safety
///
/// `file` must be null or a NUL-terminated string that lives until the process exits,
/// such as a string literal.
#[no_mangle]
pub unsafe extern "C" fn leak_debug_store_file_line(file: *const c_char, line: c_uint) {
    if file.is_null() {
        return;
    }
    // Non-UTF-8 names are dropped rather than guessed at.
    if let Ok(file) = CStr::from_ptr(file).to_str() {
        let file: &'static str = &*(file as *const str);
        leak_debug::store_file_line(file, line as u32);
    }
}
