//! The process-wide tracker and the functions that report on it.
//!
//! Every function here is available whether or not the crate was built
//! with the `tracking` feature.  Without it nothing is intercepted, the
//! reports are empty and the `tracked_*` functions call the C allocator
//! directly, so callers never need conditional compilation of their own.

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    ptr::NonNull,
};

use crate::{
    config::Config,
    error::{OutOfMemory, ReportError},
    flags::LogPolicy,
    ledger::Leaks,
    report::Report,
    tracker::Deallocation,
};

#[cfg(feature = "tracking")]
pub use enabled::*;

#[cfg(not(feature = "tracking"))]
pub use disabled::*;

#[cfg(feature = "tracking")]
mod enabled {
    use once_cell::sync::Lazy;

    use crate::{provenance::Provenance, raw::Malloc, tracker::Tracker};

    use super::*;

    // Created on first use, which may be from inside the global allocator,
    // and never torn down: frees keep arriving until the process exits.
    static TRACKER: Lazy<Tracker> = Lazy::new(|| Tracker::with_config(Malloc, &Config::from_env()));

    /// The process-wide tracker used by [`crate::TrackingAllocator`].
    pub fn tracker() -> &'static Tracker {
        &TRACKER
    }

    /// Snapshot of every outstanding tracked allocation, ordered by address.
    pub fn get_leaks() -> Leaks {
        TRACKER.leaks()
    }

    /// Writes one line per outstanding allocation to `out`.
    pub fn dump_leaks_to<W: Write + ?Sized>(out: &mut W) -> io::Result<()> {
        TRACKER.dump_leaks_to(out)
    }

    pub fn start() {
        TRACKER.start();
    }

    pub fn start_with(policy: LogPolicy) {
        TRACKER.start_with(policy);
    }

    pub fn stop() {
        TRACKER.stop();
    }

    pub fn is_on() -> bool {
        TRACKER.is_on()
    }

    pub fn set_policy(policy: LogPolicy) {
        TRACKER.set_policy(policy);
    }

    /// Allocates `size` bytes from the C allocator, recording the caller as
    /// its provenance.
    #[track_caller]
    pub fn tracked_alloc(size: usize) -> Result<NonNull<u8>, OutOfMemory> {
        crate::provenance::store(Provenance::caller());
        TRACKER.allocate(size, TRACKER.policy())
    }

    /// Like [`tracked_alloc`], but returns null on failure.
    #[track_caller]
    pub fn tracked_alloc_or_null(size: usize) -> *mut u8 {
        crate::provenance::store(Provenance::caller());
        TRACKER.allocate_or_null(size, TRACKER.policy())
    }

    /// Releases a block obtained from [`tracked_alloc`].
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live block from the C allocator.
    #[track_caller]
    pub unsafe fn tracked_free(ptr: *mut u8) -> Deallocation {
        crate::provenance::store(Provenance::caller());
        TRACKER.deallocate(ptr, TRACKER.policy())
    }
}

#[cfg(not(feature = "tracking"))]
mod disabled {
    use super::*;

    pub fn get_leaks() -> Leaks {
        Leaks::default()
    }

    pub fn dump_leaks_to<W: Write + ?Sized>(_out: &mut W) -> io::Result<()> {
        Ok(())
    }

    pub fn start() {}

    pub fn start_with(_policy: LogPolicy) {}

    pub fn stop() {}

    pub fn is_on() -> bool {
        false
    }

    pub fn set_policy(_policy: LogPolicy) {}

    pub fn tracked_alloc(size: usize) -> Result<NonNull<u8>, OutOfMemory> {
        NonNull::new(tracked_alloc_or_null(size)).ok_or(OutOfMemory { size })
    }

    pub fn tracked_alloc_or_null(size: usize) -> *mut u8 {
        unsafe { libc::malloc(size) as *mut u8 }
    }

    /// # Safety
    ///
    /// `ptr` must be null or a live block from the C allocator.
    pub unsafe fn tracked_free(ptr: *mut u8) -> Deallocation {
        if ptr.is_null() {
            return Deallocation::Null;
        }
        libc::free(ptr as *mut libc::c_void);
        Deallocation::Untracked
    }
}

/// Writes one line per outstanding allocation to standard output.
pub fn dump_leaks() -> io::Result<()> {
    dump_leaks_to(&mut io::stdout().lock())
}

/// Saves the outstanding allocations as a YAML report in `dir`, returning
/// the path written.
pub fn write_report<P: AsRef<Path>>(dir: P) -> Result<PathBuf, ReportError> {
    Report::capture(&get_leaks()).write_to_dir(dir)
}

/// Like [`write_report`], into `LEAK_DEBUG_DIR` or the working directory.
pub fn write_configured_report() -> Result<PathBuf, ReportError> {
    write_report(Config::from_env().report_dir_or_cwd())
}
